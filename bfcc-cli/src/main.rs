use std::error::Error;
use std::ffi::OsString;
use std::process::exit;

use bfcc::{DEFAULT_BUFFER_SIZE, DEFAULT_OUTPUT};
use clap::{crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};

mod compile;
mod errors;
mod run;
mod utils;

use crate::compile::{compile_file, Format};
use crate::errors::CliError;
use crate::run::{run_embedded, run_file};
use crate::utils::{get_compiler_config_from_args, get_jit_level, get_source_path, is_verbose};

fn main() {
    // Generated artifacts are copies of this binary carrying a program
    match run_embedded() {
        Ok(true) => exit(0),
        Ok(false) => {}
        Err(error) => {
            eprintln!("{}", error);
            exit(1)
        }
    }

    let matches = create_clap_app().get_matches();

    if let Err(error) = match matches.subcommand() {
        Some(("run", arg_matches)) => run(arg_matches),
        Some(("compile", arg_matches)) => compile(arg_matches),
        _ => {
            eprintln!("{}", create_clap_app().render_usage());
            Ok(())
        }
    } {
        if !matches!(error.downcast_ref::<CliError>(), Some(CliError::Reported)) {
            eprintln!("{}", error);
        }
        exit(1)
    }
}

fn create_clap_app() -> Command {
    Command::new(crate_name!())
        .bin_name("bfcc")
        .version(crate_version!())
        .about(crate_description!())
        .subcommand(
            Command::new("run")
                .about("Run application")
                .arg(get_source_file())
                .arg(
                    Arg::new("JIT")
                        .short('j')
                        .long("jit")
                        .action(ArgAction::SetTrue)
                        .help("Use JIT compiler"),
                )
                .args(get_translation_args())
                .arg(get_jit_level_arg())
                .arg(get_verbose_arg()),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile application")
                .arg(get_source_file())
                .arg(
                    Arg::new("OUTPUT")
                        .value_parser(value_parser!(OsString))
                        .help(format!("Output path. Defaults to {}", DEFAULT_OUTPUT)),
                )
                .arg(
                    Arg::new("FORMAT")
                        .short('f')
                        .long("format")
                        .value_parser(["artifact", "ir", "clir", "rust"])
                        .value_name("format")
                        .default_value("artifact")
                        .help("Format of compiled code"),
                )
                .arg(
                    Arg::new("ENGINE")
                        .long("engine")
                        .value_name("engine")
                        .help("Engine used by the artifact: jit or interpreter"),
                )
                .args(get_translation_args())
                .arg(get_jit_level_arg())
                .arg(get_verbose_arg()),
        )
}

fn get_source_file() -> Arg {
    Arg::new("FILE")
        .required(true)
        .value_parser(value_parser!(OsString))
        .help("Brainfuck source file. Use - to read from stdin")
}

fn get_translation_args() -> Vec<Arg> {
    vec![
        Arg::new("BUFFER_SIZE")
            .long("buffer-size")
            .value_parser(value_parser!(u32))
            .value_name("cells")
            .help(format!("Number of 16 bit cells. Defaults to {}", DEFAULT_BUFFER_SIZE)),
        Arg::new("OPTIMIZE")
            .short('O')
            .long("optimize")
            .value_name("level")
            .default_value("none")
            .help("Fold runs of operators: none, ptr, value or both"),
        Arg::new("DEBUG")
            .long("debug")
            .action(ArgAction::SetTrue)
            .help("Enable ? to print the pointer and the current cell"),
        Arg::new("PAUSE")
            .long("pause")
            .action(ArgAction::SetTrue)
            .help("Wait for a key before the program exits"),
    ]
}

fn get_jit_level_arg() -> Arg {
    Arg::new("JIT_LEVEL")
        .long("jit-level")
        .value_parser(["none", "speed", "speed_and_size"])
        .value_name("level")
        .help("Optimization level for JIT")
}

fn get_verbose_arg() -> Arg {
    Arg::new("VERBOSE")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Print progress and statistics")
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let path = get_source_path(matches)?;
    let verbose = is_verbose(matches);
    let jit = matches.get_flag("JIT");

    init_logger(verbose);

    let config = get_compiler_config_from_args(matches)?;

    run_file(config, jit, get_jit_level(matches), verbose, path)
}

fn compile(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let path = get_source_path(matches)?;
    let verbose = is_verbose(matches);
    let format = Format::from_name(matches.get_one::<String>("FORMAT").map(|s| s.as_str()).unwrap_or("artifact"));
    let explicit_output = matches.contains_id("OUTPUT");

    init_logger(verbose);

    let config = get_compiler_config_from_args(matches)?;

    compile_file(config, format, explicit_output, get_jit_level(matches), verbose, path)
}
