use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::str::FromStr;

use crate::config::CompilerConfig;
use crate::errors::{BfccError, CodeGenError, ConfigurationError, RuntimeError};
use crate::ir::program::Program;

pub mod cranelift;
pub mod interpreter;
pub mod rust;

/// Strategy used to execute a program
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Engine {
    /// Step through the instructions one by one
    Interpreter,
    /// Compile the instructions to machine code with cranelift
    #[default]
    Jit,
}

impl FromStr for Engine {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "interpreter" => Ok(Engine::Interpreter),
            "jit" => Ok(Engine::Jit),
            _ => Err(ConfigurationError::UnknownEngine {
                value: value.to_owned(),
            }),
        }
    }
}

impl Display for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Interpreter => write!(f, "interpreter"),
            Engine::Jit => write!(f, "jit"),
        }
    }
}

/// Backend lowering a finished program into some output
pub trait CodeGenerator {
    fn generate(&self, program: &Program, config: &CompilerConfig) -> Result<(), CodeGenError>;
}

/// Error of [`execute`]
#[derive(Debug)]
pub enum ExecuteError {
    /// The JIT was unable to compile the program
    CodeGen(CodeGenError),
    Runtime(RuntimeError),
}

impl std::error::Error for ExecuteError {}

impl Display for ExecuteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteError::CodeGen(error) => Display::fmt(error, f),
            ExecuteError::Runtime(error) => Display::fmt(error, f),
        }
    }
}

impl BfccError for ExecuteError {
    fn get_message(&self) -> (Option<std::ops::Range<usize>>, String, Option<String>) {
        match self {
            ExecuteError::CodeGen(error) => error.get_message(),
            ExecuteError::Runtime(error) => error.get_message(),
        }
    }
}

impl From<CodeGenError> for ExecuteError {
    fn from(error: CodeGenError) -> Self {
        ExecuteError::CodeGen(error)
    }
}

impl From<RuntimeError> for ExecuteError {
    fn from(error: RuntimeError) -> Self {
        ExecuteError::Runtime(error)
    }
}

/// Run a program with the given engine
pub fn execute<R: Read, W: Write>(
    program: &Program,
    engine: Engine,
    pause_on_exit: bool,
    input: R,
    output: W,
) -> Result<(), ExecuteError> {
    match engine {
        Engine::Interpreter => {
            let mut interpreter = interpreter::Interpreter::new(input, output);
            interpreter.set_pause_on_exit(pause_on_exit);
            interpreter.execute(program)?;
        }
        Engine::Jit => {
            let module = cranelift::CompiledJitModule::new(program, &cranelift::JitConfig {
                pause_on_exit,
                ..cranelift::JitConfig::default()
            })?;
            module.execute(input, output)?;
        }
    }

    Ok(())
}
