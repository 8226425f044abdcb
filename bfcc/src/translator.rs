use log::{debug, trace};

use crate::config::CompilerConfig;
use crate::errors::SyntaxError;
use crate::ir::instruction::{Instruction, Label};
use crate::ir::program::{LoopPair, Position, Program};

/// Cell values are 16 bit wide
const CELL_MODULUS: i32 = 0x10000;

/// Counters collected while translating a source
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslationStats {
    /// Every character of the source
    pub total_chars: usize,

    /// Characters that are brainfuck operators
    pub token_chars: usize,

    /// Instructions the program would have without folding
    pub unfolded_instructions: usize,

    /// Instructions actually emitted
    pub instructions: usize,

    /// Maximum depth of nested loops
    pub max_depth: usize,
}

/// Result of a successful translation
#[derive(Clone, Debug)]
pub struct Translation {
    pub program: Program,

    /// All matched brackets in order of their closing bracket
    pub loops: Vec<LoopPair>,

    /// Positions of `?` found while debug output was disabled
    pub ignored_debug_tokens: Vec<Position>,

    pub stats: TranslationStats,
}

/// Single pass translator from source lines into instructions
///
/// Runs of pointer or value operators are accumulated and only emitted when
/// an instruction depends on the current pointer or cell.
pub struct Translator {
    fold_pointer: bool,
    fold_value: bool,
    debug: bool,
    instructions: Vec<Instruction>,
    pointer_delta: i64,
    value_delta: i32,
    open_loops: Vec<(usize, Position)>,
    loops: Vec<LoopPair>,
    ignored_debug_tokens: Vec<Position>,
    stats: TranslationStats,
}

impl Translator {
    /// Create a translator that starts with the pointer and buffer initialization
    pub fn new(config: &CompilerConfig) -> Translator {
        let mut translator = Translator {
            fold_pointer: config.optimize.folds_pointer(),
            fold_value: config.optimize.folds_value(),
            debug: config.debug,
            instructions: vec![],
            pointer_delta: 0,
            value_delta: 0,
            open_loops: vec![],
            loops: vec![],
            ignored_debug_tokens: vec![],
            stats: TranslationStats::default(),
        };

        translator.emit(Instruction::PointerInit);
        translator.emit(Instruction::BufferInit(config.buffer_size));

        translator
    }

    /// Translate all lines and resolve the loops
    pub fn translate<S: AsRef<str>>(mut self, lines: &[S]) -> Result<Translation, SyntaxError> {
        let mut offset = 0;

        for (row, line) in lines.iter().enumerate() {
            let line = line.as_ref();

            for (column, (byte, char)) in line.char_indices().enumerate() {
                let position = Position {
                    row: row + 1,
                    column: column + 1,
                    offset: offset + byte,
                };

                self.translate_char(char, position)?;
            }

            offset += line.len() + 1;
        }

        self.finish()
    }

    fn translate_char(&mut self, char: char, position: Position) -> Result<(), SyntaxError> {
        self.stats.total_chars += 1;

        match char {
            '>' => self.move_pointer(1),
            '<' => self.move_pointer(-1),
            '+' => self.add_value(1),
            '-' => self.add_value(-1),
            '.' => self.io(Instruction::Print),
            ',' => self.io(Instruction::Read),
            '?' if self.debug => self.io(Instruction::PrintDebug),
            '?' => {
                self.ignored_debug_tokens.push(position);
                return Ok(());
            }
            '[' => self.open_loop(position),
            ']' => self.close_loop(position)?,
            _ => {
                // Ignore comment char
                return Ok(());
            }
        }

        self.stats.token_chars += 1;

        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
        self.stats.unfolded_instructions += 1;
    }

    fn flush_pointer(&mut self) {
        if self.pointer_delta != 0 {
            self.instructions.push(Instruction::PointerAdd(self.pointer_delta));
            self.pointer_delta = 0;
        }
    }

    fn flush_value(&mut self) {
        if self.value_delta != 0 {
            self.instructions.push(Instruction::ValueAdd(self.value_delta));
            self.value_delta = 0;
        }
    }

    fn flush(&mut self) {
        self.flush_value();
        self.flush_pointer();
    }

    fn move_pointer(&mut self, delta: i64) {
        self.flush_value();

        if self.fold_pointer {
            self.pointer_delta += delta;
            self.stats.unfolded_instructions += 1;
        } else {
            self.emit(Instruction::PointerAdd(delta));
        }
    }

    fn add_value(&mut self, delta: i32) {
        self.flush_pointer();

        if self.fold_value {
            self.value_delta = (self.value_delta + delta) % CELL_MODULUS;
            self.stats.unfolded_instructions += 1;
        } else {
            self.emit(Instruction::ValueAdd(delta));
        }
    }

    fn io(&mut self, instruction: Instruction) {
        self.flush();
        self.emit(instruction);
    }

    fn open_loop(&mut self, position: Position) {
        self.flush();

        self.open_loops.push((self.instructions.len(), position));
        self.stats.max_depth = self.stats.max_depth.max(self.open_loops.len());

        // Replaced by the jump and the loop head label in resolve_loops
        self.emit(Instruction::Nop);
        self.emit(Instruction::Nop);
    }

    fn close_loop(&mut self, position: Position) -> Result<(), SyntaxError> {
        self.flush();

        let (open_index, open) = self
            .open_loops
            .pop()
            .ok_or(SyntaxError::UnmatchedCloseBracket { position })?;

        self.loops.push(LoopPair {
            open_index,
            close_index: self.instructions.len(),
            open,
            close: position,
        });

        self.emit(Instruction::Nop);
        self.emit(Instruction::Nop);

        Ok(())
    }

    fn finish(mut self) -> Result<Translation, SyntaxError> {
        if let Some((_, position)) = self.open_loops.last() {
            return Err(SyntaxError::UnmatchedOpenBracket {
                position: *position,
            });
        }

        self.flush();
        self.emit(Instruction::Halt);

        self.resolve_loops();

        self.stats.instructions = self.instructions.len();

        debug!(
            "Translated {} characters ({} operators) into {} instructions ({} without folding), loop depth {}",
            self.stats.total_chars,
            self.stats.token_chars,
            self.stats.instructions,
            self.stats.unfolded_instructions,
            self.stats.max_depth
        );

        Ok(Translation {
            program: Program::new(self.instructions),
            loops: self.loops,
            ignored_debug_tokens: self.ignored_debug_tokens,
            stats: self.stats,
        })
    }

    /// Overwrite the reserved slots of every loop with jumps and labels
    ///
    /// `[` jumps behind the matching `]` if the current cell is zero, `]` jumps back
    /// behind the matching `[` if it is not.
    fn resolve_loops(&mut self) {
        let mut next_label = 0;

        for pair in &self.loops {
            let head = Label(next_label);
            let exit = Label(next_label + 1);
            next_label += 2;

            trace!("Loop {}..{} uses labels {} and {}", pair.open_index, pair.close_index, head, exit);

            self.instructions[pair.open_index] = Instruction::JumpIfZero(exit);
            self.instructions[pair.open_index + 1] = Instruction::Label(head);
            self.instructions[pair.close_index] = Instruction::JumpIfNotZero(head);
            self.instructions[pair.close_index + 1] = Instruction::Label(exit);
        }
    }
}

/// Split a source into lines for [`translate`]
///
/// Only `\n` separates lines. A `\r` in front of it stays in the line as a comment
/// char, so offsets of later lines still point at the right byte of the source.
pub fn source_lines(source: &str) -> Vec<&str> {
    source.split('\n').collect()
}

/// Translate source lines into a program
pub fn translate<S: AsRef<str>>(config: &CompilerConfig, lines: &[S]) -> Result<Translation, SyntaxError> {
    Translator::new(config).translate(lines)
}

#[cfg(test)]
mod tests {
    use crate::config::{CompilerConfig, OptimizeLevel};
    use crate::errors::SyntaxError;
    use crate::ir::instruction::{Instruction, Label};
    use crate::ir::program::Position;

    use super::{source_lines, translate, Translation};

    use Instruction::*;

    fn translate_with(source: &str, optimize: OptimizeLevel, debug: bool) -> Result<Translation, SyntaxError> {
        let config = CompilerConfig {
            optimize,
            debug,
            ..CompilerConfig::default()
        };
        let lines: Vec<&str> = source.lines().collect();

        translate(&config, &lines)
    }

    /// Instructions without the initialization prefix
    fn body(source: &str, optimize: OptimizeLevel) -> Vec<Instruction> {
        let translation = translate_with(source, optimize, false).unwrap();
        let instructions = translation.program.instructions;

        assert_eq!(instructions[0], PointerInit);
        assert_eq!(instructions[1], BufferInit(65536));

        instructions[2..].to_vec()
    }

    #[test]
    fn test_without_folding() {
        assert_eq!(
            body("++>-", OptimizeLevel::None),
            vec![ValueAdd(1), ValueAdd(1), PointerAdd(1), ValueAdd(-1), Halt]
        );
    }

    #[test]
    fn test_fold_runs() {
        assert_eq!(
            body(">>>+++<<", OptimizeLevel::Both),
            vec![PointerAdd(3), ValueAdd(3), PointerAdd(-2), Halt]
        );
    }

    #[test]
    fn test_fold_pointer_only() {
        assert_eq!(
            body(">>++<", OptimizeLevel::Ptr),
            vec![PointerAdd(2), ValueAdd(1), ValueAdd(1), PointerAdd(-1), Halt]
        );
    }

    #[test]
    fn test_fold_value_only() {
        assert_eq!(
            body(">>++-", OptimizeLevel::Value),
            vec![PointerAdd(1), PointerAdd(1), ValueAdd(1), Halt]
        );
    }

    #[test]
    fn test_fold_to_zero() {
        assert_eq!(body("+-+-+-", OptimizeLevel::Value), vec![Halt]);
        assert_eq!(body("><<>", OptimizeLevel::Ptr), vec![Halt]);
    }

    #[test]
    fn test_fold_wraps_around() {
        assert_eq!(body(&"+".repeat(65536), OptimizeLevel::Value), vec![Halt]);
        assert_eq!(body(&"+".repeat(65537), OptimizeLevel::Value), vec![ValueAdd(1), Halt]);
        assert_eq!(body(&"-".repeat(65537), OptimizeLevel::Both), vec![ValueAdd(-1), Halt]);
    }

    #[test]
    fn test_eager_flush_of_other_dimension() {
        assert_eq!(
            body("+>-", OptimizeLevel::Both),
            vec![ValueAdd(1), PointerAdd(1), ValueAdd(-1), Halt]
        );
    }

    #[test]
    fn test_flush_before_io() {
        assert_eq!(
            body("++.>>,<", OptimizeLevel::Both),
            vec![ValueAdd(2), Print, PointerAdd(2), Read, PointerAdd(-1), Halt]
        );
    }

    #[test]
    fn test_flush_before_loop_boundaries() {
        assert_eq!(
            body(">>[<<]", OptimizeLevel::Both),
            vec![
                PointerAdd(2),
                JumpIfZero(Label(1)),
                Instruction::Label(Label(0)),
                PointerAdd(-2),
                JumpIfNotZero(Label(0)),
                Instruction::Label(Label(1)),
                Halt,
            ]
        );
    }

    #[test]
    fn test_resolve_loop() {
        assert_eq!(
            body("+[-]", OptimizeLevel::None),
            vec![
                ValueAdd(1),
                JumpIfZero(Label(1)),
                Instruction::Label(Label(0)),
                ValueAdd(-1),
                JumpIfNotZero(Label(0)),
                Instruction::Label(Label(1)),
                Halt,
            ]
        );
    }

    #[test]
    fn test_resolve_nested_loops() {
        assert_eq!(
            body("[[]]", OptimizeLevel::None),
            vec![
                JumpIfZero(Label(3)),
                Instruction::Label(Label(2)),
                JumpIfZero(Label(1)),
                Instruction::Label(Label(0)),
                JumpIfNotZero(Label(0)),
                Instruction::Label(Label(1)),
                JumpIfNotZero(Label(2)),
                Instruction::Label(Label(3)),
                Halt,
            ]
        );
    }

    #[test]
    fn test_loops_are_well_nested() {
        let translation = translate_with("+[>[-]<[>+<-]]>[[-][+]]", OptimizeLevel::Both, false).unwrap();

        assert_eq!(translation.loops.len(), 6);

        for a in &translation.loops {
            for b in &translation.loops {
                assert!(!a.crosses(b), "{:?} crosses {:?}", a, b);
            }
        }

        translation.program.verify().unwrap();
    }

    #[test]
    fn test_unmatched_open_bracket() {
        let err = translate_with("[+", OptimizeLevel::None, false).unwrap_err();

        assert_eq!(
            err,
            SyntaxError::UnmatchedOpenBracket {
                position: Position { row: 1, column: 1, offset: 0 }
            }
        );
    }

    #[test]
    fn test_unmatched_open_bracket_reports_innermost() {
        let err = translate_with("[[]\n [", OptimizeLevel::None, false).unwrap_err();

        assert_eq!(
            err,
            SyntaxError::UnmatchedOpenBracket {
                position: Position { row: 2, column: 2, offset: 5 }
            }
        );
    }

    #[test]
    fn test_error_offset_with_crlf() {
        let source = "+\r\n+]";
        let err = translate(&CompilerConfig::default(), &source_lines(source)).unwrap_err();

        assert_eq!(
            err,
            SyntaxError::UnmatchedCloseBracket {
                position: Position { row: 2, column: 2, offset: 4 }
            }
        );
        assert_eq!(&source[err.position().span()], "]");
    }

    #[test]
    fn test_unmatched_close_bracket() {
        let err = translate_with("+]", OptimizeLevel::None, false).unwrap_err();

        assert_eq!(
            err,
            SyntaxError::UnmatchedCloseBracket {
                position: Position { row: 1, column: 2, offset: 1 }
            }
        );
    }

    #[test]
    fn test_position_counts_characters() {
        let err = translate_with("++\nää ]", OptimizeLevel::None, false).unwrap_err();

        assert_eq!(
            err,
            SyntaxError::UnmatchedCloseBracket {
                position: Position { row: 2, column: 4, offset: 8 }
            }
        );
    }

    #[test]
    fn test_debug_token() {
        assert_eq!(
            translate_with("+++?", OptimizeLevel::Value, true).unwrap().program.instructions[2..],
            [ValueAdd(3), PrintDebug, Halt]
        );

        let translation = translate_with("+++?", OptimizeLevel::Value, false).unwrap();

        assert_eq!(translation.program.instructions[2..], [ValueAdd(3), Halt]);
        assert_eq!(
            translation.ignored_debug_tokens,
            vec![Position { row: 1, column: 4, offset: 3 }]
        );
    }

    #[test]
    fn test_statistics() {
        let translation = translate_with("ab >>>\n[-] c", OptimizeLevel::Both, false).unwrap();
        let stats = translation.stats;

        assert_eq!(stats.total_chars, 11);
        assert_eq!(stats.token_chars, 6);
        assert_eq!(stats.max_depth, 1);
        // init, 3 moves, 2 loop slots, dec, 2 loop slots, halt
        assert_eq!(stats.unfolded_instructions, 11);
        assert_eq!(stats.instructions, 9);
    }

    #[test]
    fn test_buffer_size() {
        let config = CompilerConfig {
            buffer_size: 30000,
            ..CompilerConfig::default()
        };

        let translation = translate(&config, &["+"]).unwrap();

        assert_eq!(translation.program.instructions[1], BufferInit(30000));
    }
}
