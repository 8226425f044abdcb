use std::collections::HashMap;
use std::error::Error;
use std::io::Write;
use std::ops::Range;

use crate::errors::CodeGenError;
use crate::ir::instruction::{Instruction, Label};

/// Location of a character in the source lines
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Position {
    /// 1-based line number
    pub row: usize,
    /// 1-based character number inside the line
    pub column: usize,
    /// Byte offset into the lines joined with `\n`
    pub offset: usize,
}

impl Position {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + 1
    }
}

/// Indices of the slots reserved for a matching `[` and `]`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoopPair {
    pub open_index: usize,
    pub close_index: usize,
    pub open: Position,
    pub close: Position,
}

impl LoopPair {
    /// Check if both pairs overlap without one containing the other
    pub fn crosses(&self, other: &LoopPair) -> bool {
        let (a, b) = (self.open_index, self.close_index);
        let (c, d) = (other.open_index, other.close_index);

        (a < c && c < b && b < d) || (c < a && a < d && d < b)
    }
}

/// Number of instructions by kind
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub instructions: usize,
    pub pointer_ops: usize,
    pub value_ops: usize,
    pub io_ops: usize,
    pub loops: usize,
}

/// An executable program
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Program {
        Program {
            instructions,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get_statistics(&self) -> Statistics {
        let mut stats = Statistics {
            instructions: self.instructions.len(),
            ..Statistics::default()
        };

        for instruction in &self.instructions {
            match instruction {
                Instruction::PointerAdd(_) => stats.pointer_ops += 1,
                Instruction::ValueAdd(_) => stats.value_ops += 1,
                Instruction::JumpIfZero(_) => stats.loops += 1,
                instruction if instruction.is_io() => stats.io_ops += 1,
                _ => {}
            }
        }

        stats
    }

    /// Map every label to the index of its definition
    pub fn label_table(&self) -> Result<HashMap<Label, usize>, CodeGenError> {
        let mut labels = HashMap::new();

        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Instruction::Label(label) = instruction {
                if labels.insert(*label, index).is_some() {
                    return Err(CodeGenError::MalformedProgram {
                        index,
                        message: format!("Label {} is defined twice", label),
                    });
                }
            }
        }

        Ok(labels)
    }

    /// Check that the program can be handed to a backend
    ///
    /// All jump targets must be defined exactly once and no reserved slot may be left.
    pub fn verify(&self) -> Result<(), CodeGenError> {
        let labels = self.label_table()?;

        for (index, instruction) in self.instructions.iter().enumerate() {
            if *instruction == Instruction::Nop {
                return Err(CodeGenError::MalformedProgram {
                    index,
                    message: "Unresolved placeholder".to_owned(),
                });
            }

            if let Some(label) = instruction.jump_target() {
                if !labels.contains_key(&label) {
                    return Err(CodeGenError::MalformedProgram {
                        index,
                        message: format!("Jump to undefined label {}", label),
                    });
                }
            }
        }

        Ok(())
    }

    /// Dump program into a assembly like structure
    pub fn dump<W: Write>(&self, mut output: W, debug: bool) -> Result<(), Box<dyn Error>> {
        let mut ptr_offset = 0;
        let mut indent = 0;

        for (index, instruction) in self.instructions.iter().enumerate() {
            write!(output, "{:<8}", format!("{:04x}", index))?;

            if debug {
                write!(output, "{:<6}", ptr_offset)?;
                if let Some(offset) = instruction.get_ptr_offset() {
                    ptr_offset += offset;
                }
            }

            if let Instruction::JumpIfNotZero(_) = instruction {
                indent -= 1;
            }

            for _ in 0..indent {
                if debug {
                    write!(output, "| ")?;
                } else {
                    write!(output, "  ")?;
                }
            }

            writeln!(output, "{}", instruction)?;

            if let Instruction::JumpIfZero(_) = instruction {
                indent += 1;
            }
        }

        Ok(())
    }
}
