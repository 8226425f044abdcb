use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::path::PathBuf;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use crate::ir::program::Position;

/// Trait all internal errors must implement
pub trait BfccError: Error {
    /// Return error message with optional source position and optional source label
    fn get_message(&self) -> (Option<Range<usize>>, String, Option<String>);

    /// Print error to stderr with colors and other fancy stuff
    fn pretty_print(&self, source: &str, filename: Option<&str>) -> Result<(), Box<dyn Error>> {
        let mut files = SimpleFiles::new();

        let file_id = files.add(filename.unwrap_or(""), source);

        let (range, message, label_message) = self.get_message();

        let diagnostic = match range {
            Some(range) => Diagnostic::error().with_message(message).with_labels(vec![
                match label_message {
                    Some(message) => Label::primary(file_id, range).with_message(message),
                    None => Label::primary(file_id, range),
                },
            ]),
            None => Diagnostic::error().with_message(message),
        };

        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = codespan_reporting::term::Config::default();

        codespan_reporting::term::emit(&mut writer.lock(), &config, &files, &diagnostic)?;

        Ok(())
    }
}

/// Stage of a compilation run
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Validating the configuration and emitting the startup instructions
    Build,
    /// Translating source lines into instructions
    Parse,
    /// Lowering instructions into the output
    Compile,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Build => write!(f, "BUILD"),
            Stage::Parse => write!(f, "PARSE"),
            Stage::Compile => write!(f, "COMPILE"),
        }
    }
}

/// Invalid values in a [`CompilerConfig`][crate::CompilerConfig]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The cell buffer needs at least one cell
    InvalidBufferSize { size: u32 },

    /// No path for the artifact was given
    EmptyOutputPath,

    UnknownOptimizeLevel { value: String },

    UnknownEngine { value: String },
}

impl Error for ConfigurationError {}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::InvalidBufferSize { size } => {
                write!(f, "Invalid buffer size {}: at least one cell is required", size)
            }
            ConfigurationError::EmptyOutputPath => write!(f, "Output path is empty"),
            ConfigurationError::UnknownOptimizeLevel { value } => write!(
                f,
                "Unknown optimize level '{}': expected one of NONE, PTR, VALUE, BOTH",
                value
            ),
            ConfigurationError::UnknownEngine { value } => write!(
                f,
                "Unknown engine '{}': expected one of interpreter, jit",
                value
            ),
        }
    }
}

impl BfccError for ConfigurationError {
    fn get_message(&self) -> (Option<Range<usize>>, String, Option<String>) {
        (None, self.to_string(), None)
    }
}

/// Error type for unbalanced loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// There is still an unclosed loop at the end of the source
    UnmatchedOpenBracket { position: Position },

    /// A closing ] without matching [ was found
    UnmatchedCloseBracket { position: Position },
}

impl SyntaxError {
    /// Position of the offending bracket
    pub fn position(&self) -> Position {
        match self {
            SyntaxError::UnmatchedOpenBracket { position } => *position,
            SyntaxError::UnmatchedCloseBracket { position } => *position,
        }
    }
}

impl Error for SyntaxError {}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxError::UnmatchedOpenBracket { position } => {
                write!(f, "Unclosed loop at row {}, column {}", position.row, position.column)
            }
            SyntaxError::UnmatchedCloseBracket { position } => {
                write!(f, "Badly closed loop at row {}, column {}", position.row, position.column)
            }
        }
    }
}

impl BfccError for SyntaxError {
    fn get_message(&self) -> (Option<Range<usize>>, String, Option<String>) {
        match self {
            SyntaxError::UnmatchedOpenBracket { position } => (
                Some(position.span()),
                self.to_string(),
                Some("Expected ] found end of file".to_owned()),
            ),
            SyntaxError::UnmatchedCloseBracket { position } => (
                Some(position.span()),
                self.to_string(),
                Some("Expected matching [".to_owned()),
            ),
        }
    }
}

/// Error while lowering a program
#[derive(Debug)]
pub enum CodeGenError {
    /// The program violates an invariant of the instruction model
    MalformedProgram { index: usize, message: String },

    /// Some unknown and unexpected shit happened during compilation
    InternalCompilerError { message: String },

    /// The artifact could not be written
    ArtifactWrite { path: PathBuf, error: std::io::Error },
}

impl Error for CodeGenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CodeGenError::ArtifactWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl Display for CodeGenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::MalformedProgram { index, message } => {
                write!(f, "Malformed program at instruction {}: {}", index, message)
            }
            CodeGenError::InternalCompilerError { message } => {
                write!(f, "Internal compiler Error: {}", message)
            }
            CodeGenError::ArtifactWrite { path, error } => {
                write!(f, "Unable to write {}: {}", path.display(), error)
            }
        }
    }
}

impl BfccError for CodeGenError {
    fn get_message(&self) -> (Option<Range<usize>>, String, Option<String>) {
        (None, self.to_string(), None)
    }
}

/// Runtime errors of an executed program
#[derive(Debug)]
pub enum RuntimeError {
    /// A cell outside of the buffer was accessed
    PointerOutOfBounds { pointer: i64, buffer_size: usize },

    /// Reading or writing with ops , . or ? failed
    IoError { error: std::io::Error },

    /// The payload embedded into an artifact is damaged
    CorruptArtifact { message: String },
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RuntimeError::IoError { error } => Some(error),
            _ => None,
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::PointerOutOfBounds {
                pointer,
                buffer_size,
            } => write!(
                f,
                "Pointer {} is outside of the buffer with {} cells",
                pointer, buffer_size
            ),
            RuntimeError::IoError { error } => Display::fmt(&error, f),
            RuntimeError::CorruptArtifact { message } => write!(f, "Corrupt artifact: {}", message),
        }
    }
}

impl BfccError for RuntimeError {
    fn get_message(&self) -> (Option<Range<usize>>, String, Option<String>) {
        (None, self.to_string(), None)
    }
}

/// Any error aborting a compilation run
#[derive(Debug)]
pub enum CompileError {
    Configuration(ConfigurationError),
    Syntax(SyntaxError),
    CodeGen(CodeGenError),
}

impl CompileError {
    /// Stage the compilation failed in
    pub fn stage(&self) -> Stage {
        match self {
            CompileError::Configuration(_) => Stage::Build,
            CompileError::Syntax(_) => Stage::Parse,
            CompileError::CodeGen(_) => Stage::Compile,
        }
    }

    fn inner(&self) -> &dyn BfccError {
        match self {
            CompileError::Configuration(error) => error,
            CompileError::Syntax(error) => error,
            CompileError::CodeGen(error) => error,
        }
    }
}

impl Error for CompileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CompileError::Configuration(error) => Some(error),
            CompileError::Syntax(error) => Some(error),
            CompileError::CodeGen(error) => Some(error),
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.stage(), self.inner())
    }
}

impl BfccError for CompileError {
    fn get_message(&self) -> (Option<Range<usize>>, String, Option<String>) {
        let (range, _, label) = self.inner().get_message();
        (range, self.to_string(), label)
    }
}

impl From<ConfigurationError> for CompileError {
    fn from(error: ConfigurationError) -> Self {
        CompileError::Configuration(error)
    }
}

impl From<SyntaxError> for CompileError {
    fn from(error: SyntaxError) -> Self {
        CompileError::Syntax(error)
    }
}

impl From<CodeGenError> for CompileError {
    fn from(error: CodeGenError) -> Self {
        CompileError::CodeGen(error)
    }
}
