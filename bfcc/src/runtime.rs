//! Support routines shared by all engines executing a program

use std::io::{ErrorKind, Read, Write};

use crate::errors::RuntimeError;

/// Value stored for input that is not valid UTF-8
pub const REPLACEMENT: u16 = 0xfffd;

/// Add a delta to a cell modulo 2^16
pub fn wrapping_add(cell: u16, delta: i32) -> u16 {
    cell.wrapping_add(delta as u16)
}

/// Text written by `?`
pub fn debug_text(pointer: i64, value: u16) -> String {
    format!("[{}:{}]", pointer, value)
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 0,
    }
}

/// Reads single UTF-8 encoded characters from a byte stream
pub struct CharReader<R: Read> {
    input: R,
}

impl<R: Read> CharReader<R> {
    pub fn new(input: R) -> CharReader<R> {
        CharReader {
            input,
        }
    }

    fn read_byte(&mut self, byte: &mut u8) -> std::io::Result<bool> {
        loop {
            match self.input.read(std::slice::from_mut(byte)) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    /// Read the next character and return its first UTF-16 code unit
    ///
    /// Returns `None` at the end of the input.
    pub fn read_char(&mut self) -> std::io::Result<Option<u16>> {
        let mut buf = [0u8; 4];

        if !self.read_byte(&mut buf[0])? {
            return Ok(None);
        }

        let len = utf8_len(buf[0]);
        if len == 0 {
            return Ok(Some(REPLACEMENT));
        }

        for index in 1..len {
            if !self.read_byte(&mut buf[index])? {
                return Ok(Some(REPLACEMENT));
            }
        }

        let value = match std::str::from_utf8(&buf[..len]).ok().and_then(|s| s.chars().next()) {
            Some(char) => {
                let mut units = [0u16; 2];
                char.encode_utf16(&mut units)[0]
            }
            None => REPLACEMENT,
        };

        Ok(Some(value))
    }
}

/// Character based input and output of a running program
pub struct Console<R: Read, W: Write> {
    input: CharReader<R>,
    output: W,
}

impl<R: Read, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Console<R, W> {
        Console {
            input: CharReader::new(input),
            output,
        }
    }

    /// Block for the next character
    ///
    /// In case of EOF the program will read 0 as a fallback.
    pub fn read(&mut self) -> Result<u16, RuntimeError> {
        self.flush()?;

        match self.input.read_char() {
            Ok(value) => Ok(value.unwrap_or(0)),
            Err(error) => Err(RuntimeError::IoError { error }),
        }
    }

    /// Write a cell as unicode character
    pub fn print(&mut self, value: u16) -> Result<(), RuntimeError> {
        let char = char::from_u32(value as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut buf = [0u8; 4];

        self.output
            .write_all(char.encode_utf8(&mut buf).as_bytes())
            .map_err(|error| RuntimeError::IoError { error })
    }

    pub fn print_debug(&mut self, pointer: i64, value: u16) -> Result<(), RuntimeError> {
        self.output
            .write_all(debug_text(pointer, value).as_bytes())
            .map_err(|error| RuntimeError::IoError { error })
    }

    /// Wait for a single key before the program exits
    pub fn pause(&mut self) -> Result<(), RuntimeError> {
        self.read().map(|_| ())
    }

    pub fn flush(&mut self) -> Result<(), RuntimeError> {
        self.output.flush().map_err(|error| RuntimeError::IoError { error })
    }
}
