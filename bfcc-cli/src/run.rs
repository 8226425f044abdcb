use std::error::Error;
use std::ffi::OsStr;
use std::io::{stdin, stdout, BufWriter};
use std::time::Instant;

use bfcc::{analyze, execute, source_lines, load_embedded, CompiledJitModule, Compilation, CompilerConfig, Interpreter, JitConfig, RuntimeError};
use log::debug;

use crate::utils::{print_progress, print_translation_stats, print_warnings, read_input, report};

pub fn run_file(
    config: CompilerConfig,
    jit: bool,
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

    let pause_on_exit = session.config().pause_on_exit;

    if jit {
        let module = CompiledJitModule::new(
            session.program(),
            &JitConfig {
                pause_on_exit,
                jit_level,
            },
        )
        .map_err(|error| report(error, &source, path))?;

        if verbose {
            print_progress("Compiled program", ts)?;
            ts = Instant::now();
        }

        module.execute(stdin().lock(), BufWriter::new(stdout().lock()))?;
    } else {
        let mut interpreter = Interpreter::new(stdin().lock(), BufWriter::new(stdout().lock()));
        interpreter.set_pause_on_exit(pause_on_exit);
        interpreter.execute(session.program())?;
    }

    if verbose {
        print_progress("Executed program", ts)?;
    }

    Ok(())
}

/// Execute the program embedded into the running executable
///
/// Returns false if this executable is the plain compiler.
pub fn run_embedded() -> Result<bool, Box<dyn Error>> {
    let path = match std::env::current_exe() {
        Ok(path) => path,
        Err(_) => return Ok(false),
    };

    let payload = match load_embedded(&path) {
        Ok(Some(payload)) => payload,
        Ok(None) | Err(RuntimeError::IoError { .. }) => return Ok(false),
        Err(error) => return Err(Box::new(error)),
    };

    debug!("Running embedded program with the {} engine", payload.engine);

    execute(
        &payload.program,
        payload.engine,
        payload.pause_on_exit,
        stdin().lock(),
        BufWriter::new(stdout().lock()),
    )?;

    Ok(true)
}
