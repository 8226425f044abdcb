pub use backends::cranelift::{CompiledJitModule, JitConfig};
pub use backends::interpreter::Interpreter;
pub use backends::rust::{compile_to_rust, RustEmitter};
pub use backends::{execute, CodeGenerator, Engine, ExecuteError};
pub use errors::{BfccError, CodeGenError, CompileError, ConfigurationError, RuntimeError, Stage, SyntaxError};

pub use crate::analyzer::{analyze, Warning, WarningType};
pub use crate::artifact::{load_embedded, ArtifactEmitter, Payload};
pub use crate::compiler::{compile, Compilation, ParsedCompilation};
pub use crate::config::{CompilerConfig, OptimizeLevel, DEFAULT_BUFFER_SIZE, DEFAULT_OUTPUT};
pub use crate::ir::instruction::{Instruction, Label};
pub use crate::ir::program::{LoopPair, Position, Program, Statistics};
pub use crate::translator::{source_lines, translate, Translation, TranslationStats, Translator};

mod analyzer;
pub mod artifact;
pub mod backends;
mod compiler;
mod config;
mod errors;
pub mod ir;
mod runtime;
mod translator;
