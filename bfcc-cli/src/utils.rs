use std::error::Error;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{stdin, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use bfcc::{BfccError, CompileError, CompilerConfig, Engine, OptimizeLevel, Translation, Warning};
use clap::ArgMatches;
use codespan_reporting::term::termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::errors::CliError;

pub fn read_input(path: &OsStr) -> Result<String, CliError> {
    let mut source = "".to_owned();

    let result = if path == "-" {
        stdin().read_to_string(&mut source)
    } else {
        File::open(path).and_then(|mut file| file.read_to_string(&mut source))
    };

    match result {
        Ok(_) => Ok(source),
        Err(error) => Err(match error.kind() {
            ErrorKind::NotFound => CliError::SourceFileNotFound(path.to_owned()),
            ErrorKind::PermissionDenied => CliError::SourceFilePermissionDenied(path.to_owned()),
            _ => CliError::SourceReadError(path.to_owned(), error),
        }),
    }
}

/// Name shown in diagnostics
pub fn display_name(path: &OsStr) -> String {
    if path == "-" {
        "<stdin>".to_owned()
    } else {
        path.to_string_lossy().into_owned()
    }
}

pub fn get_source_path(matches: &ArgMatches) -> Result<&OsStr, Box<dyn Error>> {
    matches
        .get_one::<std::ffi::OsString>("FILE")
        .map(|path| path.as_os_str())
        .ok_or_else(|| "Missing source file".into())
}

pub fn get_jit_level(matches: &ArgMatches) -> Option<String> {
    matches.get_one::<String>("JIT_LEVEL").cloned()
}

pub fn is_verbose(matches: &ArgMatches) -> bool {
    matches.get_flag("VERBOSE")
}

/// Build the compiler configuration from the translation flags
pub fn get_compiler_config_from_args(matches: &ArgMatches) -> Result<CompilerConfig, CompileError> {
    let mut config = CompilerConfig::default();

    if let Some(size) = matches.get_one::<u32>("BUFFER_SIZE") {
        config.buffer_size = *size;
    }

    if let Some(optimize) = matches.get_one::<String>("OPTIMIZE") {
        config.optimize = OptimizeLevel::from_str(optimize)?;
    }

    if let Ok(Some(engine)) = matches.try_get_one::<String>("ENGINE") {
        config.engine = Engine::from_str(engine)?;
    }

    if let Ok(Some(output)) = matches.try_get_one::<std::ffi::OsString>("OUTPUT") {
        config.output = PathBuf::from(output);
    }

    config.debug = matches.get_flag("DEBUG");
    config.pause_on_exit = matches.get_flag("PAUSE");

    Ok(config)
}

/// Print an error with source context and turn it into [`CliError::Reported`]
pub fn report<E: BfccError + 'static>(error: E, source: &str, path: &OsStr) -> Box<dyn Error> {
    match error.pretty_print(source, Some(&display_name(path))) {
        Ok(()) => Box::new(CliError::Reported),
        Err(_) => Box::new(error),
    }
}

pub fn print_warnings(warnings: &[Warning], source: &str, path: &OsStr) -> Result<(), Box<dyn Error>> {
    if !warnings.is_empty() {
        Warning::pretty_print(warnings, source, Some(&display_name(path)))?;
    }

    Ok(())
}

/// Print a progress line in yellow to stderr
pub fn print_progress(message: &str, ts: Instant) -> Result<(), Box<dyn Error>> {
    let mut writer = StandardStream::stderr(ColorChoice::Auto);
    writer.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;

    writeln!(writer, "{} in {}ms", message, ts.elapsed().as_micros() as f32 / 1000.0)?;

    writer.reset()?;

    Ok(())
}

pub fn print_translation_stats(translation: &Translation, ts: Instant) -> Result<(), Box<dyn Error>> {
    let stats = translation.program.get_statistics();

    print_progress(
        &format!(
            "Translated {} characters into {} instructions ({} pointer, {} value, {} io) with {} loops, {} instructions without folding",
            translation.stats.total_chars,
            stats.instructions,
            stats.pointer_ops,
            stats.value_ops,
            stats.io_ops,
            stats.loops,
            translation.stats.unfolded_instructions
        ),
        ts,
    )
}
