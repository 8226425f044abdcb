use std::collections::HashMap;
use std::io::{Read, Write};

use crate::backends::ExecuteError;
use crate::errors::RuntimeError;
use crate::ir::instruction::{Instruction, Label};
use crate::ir::program::Program;
use crate::runtime::{wrapping_add, Console};

/// Interpreter to execute a program
pub struct Interpreter<R: Read, W: Write> {
    pub(crate) buffer: Vec<u16>,
    pointer: i64,
    console: Console<R, W>,
    pause_on_exit: bool,
}

impl<R: Read, W: Write> Interpreter<R, W> {
    /// Create a default interpreter
    pub fn new(input: R, output: W) -> Interpreter<R, W> {
        Interpreter {
            buffer: vec![],
            pointer: 0,
            console: Console::new(input, output),
            pause_on_exit: false,
        }
    }

    /// Wait for a key when the program halts
    pub fn set_pause_on_exit(&mut self, pause_on_exit: bool) {
        self.pause_on_exit = pause_on_exit;
    }

    pub fn buffer(&self) -> &[u16] {
        &self.buffer
    }

    pub fn pointer(&self) -> i64 {
        self.pointer
    }

    /// Execute program
    pub fn execute(&mut self, program: &Program) -> Result<(), ExecuteError> {
        program.verify()?;
        let labels = program.label_table()?;

        self.execute_instructions(&program.instructions, &labels)?;

        Ok(())
    }

    fn execute_instructions(&mut self, instructions: &[Instruction], labels: &HashMap<Label, usize>) -> Result<(), RuntimeError> {
        let mut pc = 0;

        while pc < instructions.len() {
            match instructions[pc] {
                Instruction::PointerInit => self.pointer = 0,
                Instruction::BufferInit(size) => self.buffer = vec![0; size as usize],
                Instruction::PointerAdd(delta) => self.pointer = self.pointer.wrapping_add(delta),
                Instruction::ValueAdd(delta) => {
                    let index = self.index()?;
                    self.buffer[index] = wrapping_add(self.buffer[index], delta);
                }
                Instruction::Print => {
                    let index = self.index()?;
                    self.console.print(self.buffer[index])?;
                }
                Instruction::PrintDebug => {
                    let index = self.index()?;
                    self.console.print_debug(self.pointer, self.buffer[index])?;
                }
                Instruction::Read => {
                    let index = self.index()?;
                    self.buffer[index] = self.console.read()?;
                }
                Instruction::JumpIfZero(label) => {
                    let index = self.index()?;
                    if self.buffer[index] == 0 {
                        pc = labels[&label];
                    }
                }
                Instruction::JumpIfNotZero(label) => {
                    let index = self.index()?;
                    if self.buffer[index] != 0 {
                        pc = labels[&label];
                    }
                }
                Instruction::Label(_) | Instruction::Nop => {
                    // ignore
                }
                Instruction::Halt => break,
            }

            pc += 1;
        }

        if self.pause_on_exit {
            self.console.pause()?;
        }

        self.console.flush()
    }

    fn index(&self) -> Result<usize, RuntimeError> {
        if self.pointer < 0 || self.pointer as u64 >= self.buffer.len() as u64 {
            return Err(RuntimeError::PointerOutOfBounds {
                pointer: self.pointer,
                buffer_size: self.buffer.len(),
            });
        }

        Ok(self.pointer as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::backends::ExecuteError;
    use crate::config::{CompilerConfig, OptimizeLevel};
    use crate::errors::RuntimeError;
    use crate::ir::program::Program;
    use crate::translator::translate;

    use super::Interpreter;

    fn parse(source: &str, optimize: OptimizeLevel, debug: bool) -> Program {
        let config = CompilerConfig {
            optimize,
            debug,
            ..CompilerConfig::default()
        };
        let lines: Vec<&str> = source.lines().collect();

        translate(&config, &lines).unwrap().program
    }

    fn run(source: &str, input: &[u8]) -> (Vec<u16>, Vec<u8>) {
        let program = parse(source, OptimizeLevel::Both, false);
        let mut output = Vec::new();

        let buffer = {
            let mut interpreter = Interpreter::new(Cursor::new(input), &mut output);
            interpreter.execute(&program).unwrap();
            interpreter.buffer
        };

        (buffer, output)
    }

    #[test]
    fn test_simple() {
        let (buffer, _) = run("++>>++++-<-", b"");

        assert_eq!(buffer[0], 2);
        assert_eq!(buffer[1], 65535);
        assert_eq!(buffer[2], 3);
    }

    #[test]
    fn test_wraparound() {
        let (buffer, _) = run(&"+".repeat(65536), b"");
        assert_eq!(buffer[0], 0);

        let program = parse(&"+".repeat(65536), OptimizeLevel::None, false);
        let mut interpreter = Interpreter::new(Cursor::new(b""), Vec::new());
        interpreter.execute(&program).unwrap();
        assert_eq!(interpreter.buffer()[0], 0);
    }

    #[test]
    fn test_16_bit_cells() {
        let (buffer, _) = run("++++++++[>++++++++<-]>[>++++<-]>[>++++<-]", b"");

        assert_eq!(buffer[3], 1024);
    }

    #[test]
    fn test_pow_5_3() {
        let (buffer, _) = run("+++++[>+++++[>+++++<-]<-]", b"");

        assert_eq!(buffer[0], 0);
        assert_eq!(buffer[1], 0);
        assert_eq!(buffer[2], 125);
    }

    #[test]
    fn test_loop_output() {
        let (buffer, output) = run(",[.-]", &[3]);

        assert_eq!(output, vec![3, 2, 1]);
        assert_eq!(buffer[0], 0);
    }

    #[test]
    fn test_io() {
        let (_, output) = run(",[.,]", b"0123456789aZ");

        assert_eq!(output, b"0123456789aZ");
    }

    #[test]
    fn test_unicode_io() {
        let (buffer, output) = run(",.>,.", "ä€".as_bytes());

        assert_eq!(buffer[0], 0xe4);
        assert_eq!(buffer[1], 0x20ac);
        assert_eq!(String::from_utf8(output).unwrap(), "ä€");
    }

    #[test]
    fn test_debug_print() {
        let program = parse("+++?", OptimizeLevel::None, true);
        let mut output = Vec::new();

        Interpreter::new(Cursor::new(b""), &mut output).execute(&program).unwrap();

        assert_eq!(output, b"[0:3]");
    }

    #[test]
    fn test_debug_print_moved_pointer() {
        let program = parse("?>>-?", OptimizeLevel::Both, true);
        let mut output = Vec::new();

        Interpreter::new(Cursor::new(b""), &mut output).execute(&program).unwrap();

        assert_eq!(output, b"[0:0][2:65535]");
    }

    #[test]
    fn test_hello_world() {
        for optimize in OptimizeLevel::all() {
            let program = parse(include_str!("../../../test_programs/hello.bf"), optimize, false);
            let mut output = Vec::new();

            Interpreter::new(Cursor::new(b""), &mut output).execute(&program).unwrap();

            assert_eq!(output, include_bytes!("../../../test_programs/hello.bf.out"));
        }
    }

    #[test]
    fn test_optimization_is_transparent() {
        let sources = [
            ">+>++>+++[<]>.",
            "+>-<[->+<]>.",
            "++++[>+++++<-]>[<+++>-]<.,[->+>+<<]>>.<.",
            "+++[>++[>+<-]<-]>>.<<>>>++<<<+.",
            "-->--<[>+<++]>.",
        ];

        for source in sources {
            let outputs: Vec<Vec<u8>> = OptimizeLevel::all()
                .iter()
                .map(|optimize| {
                    let program = parse(source, *optimize, false);
                    let mut output = Vec::new();

                    Interpreter::new(Cursor::new(b"A"), &mut output).execute(&program).unwrap();

                    output
                })
                .collect();

            for output in &outputs[1..] {
                assert_eq!(&outputs[0], output, "{}", source);
            }
        }
    }

    #[test]
    fn test_pointer_out_of_bounds() {
        let program = parse("<+", OptimizeLevel::None, false);

        let result = Interpreter::new(Cursor::new(b""), Vec::new()).execute(&program);

        assert!(matches!(
            result,
            Err(ExecuteError::Runtime(RuntimeError::PointerOutOfBounds {
                pointer: -1,
                buffer_size: 65536
            }))
        ));
    }

    #[test]
    fn test_pointer_beyond_buffer() {
        let config = CompilerConfig {
            buffer_size: 4,
            ..CompilerConfig::default()
        };
        let program = translate(&config, &[">>>+>+"]).unwrap().program;

        let mut interpreter = Interpreter::new(Cursor::new(b""), Vec::new());
        let result = interpreter.execute(&program);

        assert!(matches!(
            result,
            Err(ExecuteError::Runtime(RuntimeError::PointerOutOfBounds {
                pointer: 4,
                buffer_size: 4
            }))
        ));
        assert_eq!(interpreter.buffer()[3], 1);
    }

    #[test]
    fn test_moving_outside_without_access() {
        let (buffer, _) = run("<<>>+", b"");

        assert_eq!(buffer[0], 1);
    }

    #[test]
    fn test_pause_reads_key() {
        let program = parse(",.", OptimizeLevel::None, false);
        let mut input = Cursor::new(b"xy".to_vec());
        let mut output = Vec::new();

        let mut interpreter = Interpreter::new(&mut input, &mut output);
        interpreter.set_pause_on_exit(true);
        interpreter.execute(&program).unwrap();
        drop(interpreter);

        assert_eq!(output, b"x");
        assert_eq!(input.position(), 2);
    }
}
