use std::fmt::Write;

use log::debug;

use crate::artifact::write_file;
use crate::backends::CodeGenerator;
use crate::config::CompilerConfig;
use crate::errors::CodeGenError;
use crate::ir::instruction::Instruction;
use crate::ir::program::Program;

/// Compile program into a rust file that can be compiled with rustc
///
/// Loops are lowered back into `while` blocks, so the program must be structured the way the translator emits it.
pub fn compile_to_rust(program: &Program, pause_on_exit: bool) -> Result<String, CodeGenError> {
    program.verify()?;

    let mut code = "".to_owned();

    print_instructions(&mut code, &program.instructions)?;

    Ok(include_str!("rust.tpl")
        .replace("{{PAUSE}}", if pause_on_exit { "true" } else { "false" })
        .replace("{{CODE}}", &code))
}

fn print_instructions(out: &mut String, instructions: &[Instruction]) -> Result<(), CodeGenError> {
    let mut depth = 1;

    for (index, instruction) in instructions.iter().enumerate() {
        if let Instruction::JumpIfNotZero(_) = instruction {
            if depth == 1 {
                return Err(CodeGenError::MalformedProgram {
                    index,
                    message: "Backward jump without loop".to_owned(),
                });
            }
            depth -= 1;
        }

        let line = match instruction {
            Instruction::PointerInit => "rt.pointer = 0;".to_owned(),
            Instruction::BufferInit(size) => format!("rt.buffer_init({});", size),
            Instruction::PointerAdd(delta) => format!("rt.ptr_add({});", delta),
            Instruction::ValueAdd(delta) => format!("rt.add({});", delta),
            Instruction::Print => "rt.put();".to_owned(),
            Instruction::PrintDebug => "rt.put_debug();".to_owned(),
            Instruction::Read => "rt.get();".to_owned(),
            Instruction::JumpIfZero(_) => "while rt.value() != 0 {".to_owned(),
            Instruction::JumpIfNotZero(_) => "}".to_owned(),
            Instruction::Halt => "rt.halt();".to_owned(),
            Instruction::Label(_) | Instruction::Nop => {
                // ignore
                continue;
            }
        };

        writeln!(out, "{:indent$}{}", "", line, indent = depth * 4).map_err(|error| {
            CodeGenError::InternalCompilerError {
                message: error.to_string(),
            }
        })?;

        if let Instruction::JumpIfZero(_) = instruction {
            depth += 1;
        }
    }

    if depth != 1 {
        return Err(CodeGenError::MalformedProgram {
            index: instructions.len(),
            message: "Loop is never closed".to_owned(),
        });
    }

    Ok(())
}

/// Writes the program as rust source to the configured output
pub struct RustEmitter;

impl CodeGenerator for RustEmitter {
    fn generate(&self, program: &Program, config: &CompilerConfig) -> Result<(), CodeGenError> {
        let code = compile_to_rust(program, config.pause_on_exit)?;

        write_file(&config.output, code.as_bytes(), false)?;

        debug!("Wrote rust source to {}", config.output.display());

        Ok(())
    }
}
