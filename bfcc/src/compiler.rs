//! Compilation sessions
//!
//! A session passes the stages BUILD, PARSE and COMPILE in this order.
//! Every stage consumes the session of the previous one, so no stage can be entered twice.

use log::info;

use crate::backends::CodeGenerator;
use crate::config::CompilerConfig;
use crate::errors::{CompileError, Stage};
use crate::ir::program::Program;
use crate::translator::{Translation, Translator};

/// Session with a validated configuration
#[derive(Debug)]
pub struct Compilation {
    config: CompilerConfig,
}

impl Compilation {
    /// Validate the configuration
    pub fn build(config: CompilerConfig) -> Result<Compilation, CompileError> {
        info!("[{}] buffer size {}, optimize {}", Stage::Build, config.buffer_size, config.optimize);

        config.validate()?;

        Ok(Compilation {
            config,
        })
    }

    pub fn stage(&self) -> Stage {
        Stage::Build
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Translate the source lines
    pub fn parse<S: AsRef<str>>(self, lines: &[S]) -> Result<ParsedCompilation, CompileError> {
        info!("[{}] {} lines", Stage::Parse, lines.len());

        let translation = Translator::new(&self.config).translate(lines)?;

        Ok(ParsedCompilation {
            config: self.config,
            translation,
        })
    }
}

/// Session holding the translated program
#[derive(Debug)]
pub struct ParsedCompilation {
    config: CompilerConfig,
    translation: Translation,
}

impl ParsedCompilation {
    pub fn stage(&self) -> Stage {
        Stage::Parse
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    pub fn program(&self) -> &Program {
        &self.translation.program
    }

    /// Hand the program to a code generator
    ///
    /// Returns the translation so callers can report statistics.
    pub fn compile(self, generator: &dyn CodeGenerator) -> Result<Translation, CompileError> {
        info!(
            "[{}] {} instructions to {}",
            Stage::Compile,
            self.translation.program.len(),
            self.config.output.display()
        );

        generator.generate(&self.translation.program, &self.config)?;

        Ok(self.translation)
    }
}

/// Run all stages in order
pub fn compile<S: AsRef<str>>(
    config: CompilerConfig,
    lines: &[S],
    generator: &dyn CodeGenerator,
) -> Result<Translation, CompileError> {
    Compilation::build(config)?.parse(lines)?.compile(generator)
}
