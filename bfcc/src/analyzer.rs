use std::error::Error;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use crate::ir::instruction::Instruction;
use crate::ir::program::{LoopPair, Program};
use crate::runtime::wrapping_add;
use crate::translator::Translation;

/// WarningType found in a call to [analyze]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningType {
    /// A loop never changes the cell it tests
    InfiniteLoop,

    /// A `?` was skipped because debug output is disabled
    DebugTokenIgnored,
}

/// Warning found in a call to [analyze]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Code position the warning was found
    pub span: Range<usize>,

    /// Type of the warning
    pub warning_type: WarningType,
}

impl Warning {
    pub fn infinite_loop(span: Range<usize>) -> Warning {
        Warning {
            span,
            warning_type: WarningType::InfiniteLoop,
        }
    }

    pub fn debug_token_ignored(span: Range<usize>) -> Warning {
        Warning {
            span,
            warning_type: WarningType::DebugTokenIgnored,
        }
    }

    pub fn pretty_print(warnings: &[Warning], source: &str, filename: Option<&str>) -> Result<(), Box<dyn Error>> {
        let mut files = SimpleFiles::new();

        let file_id = files.add(filename.unwrap_or(""), source);

        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = codespan_reporting::term::Config::default();

        for warning in warnings {
            let span = warning.span.clone();

            let diagnostic = match &warning.warning_type {
                WarningType::InfiniteLoop => Diagnostic::warning()
                    .with_message("Possible infinite loop")
                    .with_labels(vec![Label::primary(file_id, span)]),
                WarningType::DebugTokenIgnored => Diagnostic::warning()
                    .with_message("Debug output is disabled")
                    .with_labels(vec![Label::primary(file_id, span).with_message("Ignored")]),
            };

            codespan_reporting::term::emit(&mut writer.lock(), &config, &files, &diagnostic)?;
        }

        Ok(())
    }
}

/// Analyze a translation for possible errors
pub fn analyze(translation: &Translation) -> Vec<Warning> {
    let mut warnings = vec![];

    for pair in &translation.loops {
        if never_changes_condition(&translation.program, pair) {
            warnings.push(Warning::infinite_loop(pair.open.offset..pair.close.offset + 1));
        }
    }

    for position in &translation.ignored_debug_tokens {
        warnings.push(Warning::debug_token_ignored(position.span()));
    }

    warnings.sort_by_key(|warning| warning.span.start);

    warnings
}

/// Check if the body of a loop without inner loops leaves the tested cell untouched
fn never_changes_condition(program: &Program, pair: &LoopPair) -> bool {
    let body = &program.instructions[pair.open_index + 2..pair.close_index];

    let mut offset = 0i64;
    let mut cell = 0u16;

    for instruction in body {
        match instruction {
            Instruction::PointerAdd(delta) => offset += delta,
            Instruction::ValueAdd(delta) if offset == 0 => cell = wrapping_add(cell, *delta),
            Instruction::Read if offset == 0 => return false,
            Instruction::JumpIfZero(_) => return false,
            _ => {}
        }
    }

    offset == 0 && cell == 0
}
