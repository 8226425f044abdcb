use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use crate::backends::Engine;
use crate::errors::ConfigurationError;

/// Default number of cells
pub const DEFAULT_BUFFER_SIZE: u32 = 65536;

/// Default file name of the generated artifact
pub const DEFAULT_OUTPUT: &str = "a.exe";

/// Which operator runs are folded into a single instruction
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OptimizeLevel {
    /// Emit one instruction per operator
    #[default]
    None,
    /// Fold runs of `>` and `<`
    Ptr,
    /// Fold runs of `+` and `-`
    Value,
    /// Fold both
    Both,
}

impl OptimizeLevel {
    pub fn folds_pointer(&self) -> bool {
        matches!(self, OptimizeLevel::Ptr | OptimizeLevel::Both)
    }

    pub fn folds_value(&self) -> bool {
        matches!(self, OptimizeLevel::Value | OptimizeLevel::Both)
    }

    pub fn all() -> [OptimizeLevel; 4] {
        [OptimizeLevel::None, OptimizeLevel::Ptr, OptimizeLevel::Value, OptimizeLevel::Both]
    }
}

impl FromStr for OptimizeLevel {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "NONE" => Ok(OptimizeLevel::None),
            "PTR" => Ok(OptimizeLevel::Ptr),
            "VALUE" => Ok(OptimizeLevel::Value),
            "BOTH" => Ok(OptimizeLevel::Both),
            _ => Err(ConfigurationError::UnknownOptimizeLevel {
                value: value.to_owned(),
            }),
        }
    }
}

impl Display for OptimizeLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizeLevel::None => write!(f, "NONE"),
            OptimizeLevel::Ptr => write!(f, "PTR"),
            OptimizeLevel::Value => write!(f, "VALUE"),
            OptimizeLevel::Both => write!(f, "BOTH"),
        }
    }
}

/// Configuration of a single compilation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Number of 16 bit cells allocated by the program
    pub buffer_size: u32,

    pub optimize: OptimizeLevel,

    /// Accept `?` to print pointer and current cell
    pub debug: bool,

    /// Wait for a key before the program exits
    pub pause_on_exit: bool,

    /// Path of the generated artifact
    pub output: PathBuf,

    /// Engine used by the artifact to execute the program
    pub engine: Engine,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            optimize: OptimizeLevel::None,
            debug: false,
            pause_on_exit: false,
            output: PathBuf::from(DEFAULT_OUTPUT),
            engine: Engine::default(),
        }
    }
}

impl CompilerConfig {
    pub fn with_optimize(optimize: OptimizeLevel) -> CompilerConfig {
        CompilerConfig {
            optimize,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.buffer_size == 0 {
            return Err(ConfigurationError::InvalidBufferSize {
                size: self.buffer_size,
            });
        }

        if self.output.as_os_str().is_empty() {
            return Err(ConfigurationError::EmptyOutputPath);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ConfigurationError;

    use super::{CompilerConfig, OptimizeLevel};

    #[test]
    fn test_parse_optimize_level() {
        assert_eq!("both".parse::<OptimizeLevel>().unwrap(), OptimizeLevel::Both);
        assert_eq!("Ptr".parse::<OptimizeLevel>().unwrap(), OptimizeLevel::Ptr);
        assert_eq!("VALUE".parse::<OptimizeLevel>().unwrap(), OptimizeLevel::Value);
        assert_eq!("none".parse::<OptimizeLevel>().unwrap(), OptimizeLevel::None);
        assert_eq!(
            "fast".parse::<OptimizeLevel>(),
            Err(ConfigurationError::UnknownOptimizeLevel {
                value: "fast".to_owned()
            })
        );
    }

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();

        assert_eq!(config.buffer_size, 65536);
        assert_eq!(config.optimize, OptimizeLevel::None);
        assert!(!config.debug);
        assert!(!config.pause_on_exit);
        assert_eq!(config.output.to_str(), Some("a.exe"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reject_empty_buffer() {
        let config = CompilerConfig {
            buffer_size: 0,
            ..CompilerConfig::default()
        };

        assert_eq!(config.validate(), Err(ConfigurationError::InvalidBufferSize { size: 0 }));
    }
}
