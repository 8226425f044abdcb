use std::error::Error;
use std::ffi::OsStr;
use std::io::{stdout, Write};
use std::time::Instant;

use bfcc::{analyze, compile_to_rust, source_lines, ArtifactEmitter, CompiledJitModule, Compilation, CompilerConfig, JitConfig, RustEmitter};

use crate::utils::{print_progress, print_translation_stats, print_warnings, read_input, report};

/// Output of the compile command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// Native executable
    Artifact,
    /// Instruction listing
    Ir,
    /// Cranelift IR of the JIT
    Clir,
    /// Rust source
    Rust,
}

impl Format {
    pub fn from_name(name: &str) -> Format {
        match name {
            "ir" => Format::Ir,
            "clir" => Format::Clir,
            "rust" => Format::Rust,
            _ => Format::Artifact,
        }
    }
}

pub fn compile_file(
    config: CompilerConfig,
    format: Format,
    explicit_output: bool,
    jit_level: Option<String>,
    verbose: bool,
    path: &OsStr,
) -> Result<(), Box<dyn Error>> {
    let source = read_input(path)?;
    let lines = source_lines(&source);

    let mut ts = Instant::now();

    let session = Compilation::build(config).map_err(|error| report(error, &source, path))?;
    let session = session.parse(&lines).map_err(|error| report(error, &source, path))?;

    if verbose {
        print_translation_stats(session.translation(), ts)?;
        ts = Instant::now();
    }

    print_warnings(&analyze(session.translation()), &source, path)?;

    match format {
        Format::Ir => {
            let mut out = stdout().lock();
            session.program().dump(&mut out, session.config().debug)?;
            out.flush()?;
        }
        Format::Clir => {
            let module = CompiledJitModule::new(
                session.program(),
                &JitConfig {
                    pause_on_exit: session.config().pause_on_exit,
                    jit_level,
                },
            )
            .map_err(|error| report(error, &source, path))?;

            println!("{}", module.get_clir());
        }
        Format::Rust if !explicit_output => {
            let code = compile_to_rust(session.program(), session.config().pause_on_exit)
                .map_err(|error| report(error, &source, path))?;

            print!("{}", code);
        }
        Format::Rust => {
            session
                .compile(&RustEmitter)
                .map_err(|error| report(error, &source, path))?;
        }
        Format::Artifact => {
            let emitter = ArtifactEmitter::current_exe().map_err(|error| report(error, &source, path))?;
            let output = session.config().output.clone();

            session.compile(&emitter).map_err(|error| report(error, &source, path))?;

            if verbose {
                print_progress(&format!("Wrote {}", output.display()), ts)?;
            }
        }
    }

    Ok(())
}
