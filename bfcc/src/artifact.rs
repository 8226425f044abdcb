//! Native artifacts
//!
//! An artifact is a copy of a runner executable with the program appended as bytecode.
//! The layout of the appended data is:
//!
//! ```text
//! payload: "BFCC" version:u8 flags:u8 engine:u8 count:u32 (tag:u8 operand)*
//! trailer: payload_length:u64 "BFCCART1"
//! ```
//!
//! All numbers are little endian.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::backends::{CodeGenerator, Engine};
use crate::config::CompilerConfig;
use crate::errors::{CodeGenError, RuntimeError};
use crate::ir::instruction::{Instruction, Label};
use crate::ir::program::Program;

const MAGIC: &[u8; 4] = b"BFCC";
const VERSION: u8 = 1;
const MARKER: &[u8; 8] = b"BFCCART1";
const TRAILER_LEN: usize = 16;

const FLAG_PAUSE_ON_EXIT: u8 = 0b1;

const TAG_POINTER_INIT: u8 = 0;
const TAG_BUFFER_INIT: u8 = 1;
const TAG_POINTER_ADD: u8 = 2;
const TAG_VALUE_ADD: u8 = 3;
const TAG_PRINT: u8 = 4;
const TAG_PRINT_DEBUG: u8 = 5;
const TAG_READ: u8 = 6;
const TAG_JUMP_IF_ZERO: u8 = 7;
const TAG_JUMP_IF_NOT_ZERO: u8 = 8;
const TAG_LABEL: u8 = 9;
const TAG_HALT: u8 = 10;

/// Program and execution settings stored in an artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub program: Program,
    pub engine: Engine,
    pub pause_on_exit: bool,
}

fn engine_byte(engine: Engine) -> u8 {
    match engine {
        Engine::Interpreter => 0,
        Engine::Jit => 1,
    }
}

/// Serialize payload into bytecode
///
/// The program must not contain unresolved placeholders.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, CodeGenError> {
    let mut out = Vec::with_capacity(11 + payload.program.len() * 5);

    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(if payload.pause_on_exit { FLAG_PAUSE_ON_EXIT } else { 0 });
    out.push(engine_byte(payload.engine));
    out.extend_from_slice(&(payload.program.len() as u32).to_le_bytes());

    for (index, instruction) in payload.program.instructions.iter().enumerate() {
        match *instruction {
            Instruction::PointerInit => out.push(TAG_POINTER_INIT),
            Instruction::BufferInit(size) => {
                out.push(TAG_BUFFER_INIT);
                out.extend_from_slice(&size.to_le_bytes());
            }
            Instruction::PointerAdd(delta) => {
                out.push(TAG_POINTER_ADD);
                out.extend_from_slice(&delta.to_le_bytes());
            }
            Instruction::ValueAdd(delta) => {
                out.push(TAG_VALUE_ADD);
                out.extend_from_slice(&delta.to_le_bytes());
            }
            Instruction::Print => out.push(TAG_PRINT),
            Instruction::PrintDebug => out.push(TAG_PRINT_DEBUG),
            Instruction::Read => out.push(TAG_READ),
            Instruction::JumpIfZero(label) => {
                out.push(TAG_JUMP_IF_ZERO);
                out.extend_from_slice(&label.0.to_le_bytes());
            }
            Instruction::JumpIfNotZero(label) => {
                out.push(TAG_JUMP_IF_NOT_ZERO);
                out.extend_from_slice(&label.0.to_le_bytes());
            }
            Instruction::Label(label) => {
                out.push(TAG_LABEL);
                out.extend_from_slice(&label.0.to_le_bytes());
            }
            Instruction::Halt => out.push(TAG_HALT),
            Instruction::Nop => {
                return Err(CodeGenError::MalformedProgram {
                    index,
                    message: "Unresolved placeholder".to_owned(),
                })
            }
        }
    }

    Ok(out)
}

struct PayloadReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], RuntimeError> {
        if self.bytes.len() - self.offset < N {
            return Err(corrupt("unexpected end of payload"));
        }

        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;

        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, RuntimeError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, RuntimeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, RuntimeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64, RuntimeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }
}

fn corrupt(message: &str) -> RuntimeError {
    RuntimeError::CorruptArtifact {
        message: message.to_owned(),
    }
}

/// Deserialize bytecode created by [`encode`]
pub fn decode(bytes: &[u8]) -> Result<Payload, RuntimeError> {
    let mut reader = PayloadReader {
        bytes,
        offset: 0,
    };

    if &reader.take::<4>()? != MAGIC {
        return Err(corrupt("bad magic"));
    }

    let version = reader.u8()?;
    if version != VERSION {
        return Err(RuntimeError::CorruptArtifact {
            message: format!("unsupported version {}", version),
        });
    }

    let flags = reader.u8()?;

    let engine = match reader.u8()? {
        0 => Engine::Interpreter,
        1 => Engine::Jit,
        other => {
            return Err(RuntimeError::CorruptArtifact {
                message: format!("unknown engine {}", other),
            })
        }
    };

    let count = reader.u32()? as usize;

    // Every instruction takes at least one byte
    if count > bytes.len() {
        return Err(corrupt("instruction count exceeds payload"));
    }

    let mut instructions = Vec::with_capacity(count);

    for _ in 0..count {
        let instruction = match reader.u8()? {
            TAG_POINTER_INIT => Instruction::PointerInit,
            TAG_BUFFER_INIT => Instruction::BufferInit(reader.u32()?),
            TAG_POINTER_ADD => Instruction::PointerAdd(reader.i64()?),
            TAG_VALUE_ADD => Instruction::ValueAdd(reader.i32()?),
            TAG_PRINT => Instruction::Print,
            TAG_PRINT_DEBUG => Instruction::PrintDebug,
            TAG_READ => Instruction::Read,
            TAG_JUMP_IF_ZERO => Instruction::JumpIfZero(Label(reader.u32()?)),
            TAG_JUMP_IF_NOT_ZERO => Instruction::JumpIfNotZero(Label(reader.u32()?)),
            TAG_LABEL => Instruction::Label(Label(reader.u32()?)),
            TAG_HALT => Instruction::Halt,
            tag => {
                return Err(RuntimeError::CorruptArtifact {
                    message: format!("unknown instruction tag {}", tag),
                })
            }
        };

        instructions.push(instruction);
    }

    if reader.offset != bytes.len() {
        return Err(corrupt("trailing bytes after the last instruction"));
    }

    Ok(Payload {
        program: Program::new(instructions),
        engine,
        pause_on_exit: flags & FLAG_PAUSE_ON_EXIT != 0,
    })
}

/// Parse a trailer and return the length of the payload in front of it
fn parse_trailer(trailer: &[u8]) -> Option<u64> {
    if trailer.len() != TRAILER_LEN || &trailer[8..] != MARKER {
        return None;
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&trailer[..8]);

    Some(u64::from_le_bytes(len))
}

/// Location of an embedded payload inside the bytes of an executable
pub fn find_payload(bytes: &[u8]) -> Result<Option<Range<usize>>, RuntimeError> {
    if bytes.len() < TRAILER_LEN {
        return Ok(None);
    }

    let end = bytes.len() - TRAILER_LEN;

    let len = match parse_trailer(&bytes[end..]) {
        Some(len) => len,
        None => return Ok(None),
    };

    if len > end as u64 {
        return Err(corrupt("payload length exceeds file size"));
    }

    Ok(Some(end - len as usize..end))
}

/// Read the payload embedded into an executable
///
/// Returns `None` if the file is a plain executable without a payload.
pub fn load_embedded(path: &Path) -> Result<Option<Payload>, RuntimeError> {
    let io_error = |error| RuntimeError::IoError { error };

    let mut file = File::open(path).map_err(io_error)?;
    let file_len = file.metadata().map_err(io_error)?.len();

    if file_len < TRAILER_LEN as u64 {
        return Ok(None);
    }

    let mut trailer = [0u8; TRAILER_LEN];
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64))).map_err(io_error)?;
    file.read_exact(&mut trailer).map_err(io_error)?;

    let len = match parse_trailer(&trailer) {
        Some(len) => len,
        None => return Ok(None),
    };

    if len > file_len - TRAILER_LEN as u64 {
        return Err(corrupt("payload length exceeds file size"));
    }

    let mut bytes = vec![0u8; len as usize];
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64) - len as i64))
        .map_err(io_error)?;
    file.read_exact(&mut bytes).map_err(io_error)?;

    let payload = decode(&bytes)?;

    debug!(
        "Loaded {} instructions for the {} engine from {}",
        payload.program.len(),
        payload.engine,
        path.display()
    );

    Ok(Some(payload))
}

#[cfg(unix)]
fn make_executable(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Atomically replace `path` with `bytes`
///
/// The data is written to a temporary file in the same directory that is renamed on success.
/// On failure no file is left behind.
pub fn write_file(path: &Path, bytes: &[u8], executable: bool) -> Result<(), CodeGenError> {
    let error = |error| CodeGenError::ArtifactWrite {
        path: path.to_owned(),
        error,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(error)?;

    file.write_all(bytes).map_err(error)?;
    file.flush().map_err(error)?;

    if executable {
        make_executable(file.as_file()).map_err(error)?;
    }

    file.persist(path).map_err(|persist| error(persist.error))?;

    Ok(())
}

/// Emits native artifacts by appending the program to a runner executable
pub struct ArtifactEmitter {
    runner: PathBuf,
}

impl ArtifactEmitter {
    /// Use the executable at `runner` to execute the program
    pub fn new(runner: PathBuf) -> ArtifactEmitter {
        ArtifactEmitter {
            runner,
        }
    }

    /// Use the currently running executable as runner
    pub fn current_exe() -> Result<ArtifactEmitter, CodeGenError> {
        let runner = std::env::current_exe().map_err(|error| CodeGenError::InternalCompilerError {
            message: format!("Unable to locate runner executable: {}", error),
        })?;

        Ok(ArtifactEmitter::new(runner))
    }
}

impl CodeGenerator for ArtifactEmitter {
    fn generate(&self, program: &Program, config: &CompilerConfig) -> Result<(), CodeGenError> {
        program.verify()?;

        let payload = encode(&Payload {
            program: program.clone(),
            engine: config.engine,
            pause_on_exit: config.pause_on_exit,
        })?;

        let mut bytes = fs::read(&self.runner).map_err(|error| CodeGenError::InternalCompilerError {
            message: format!("Unable to read runner {}: {}", self.runner.display(), error),
        })?;

        // A runner that is itself an artifact only contributes the executable part
        if let Ok(Some(range)) = find_payload(&bytes) {
            bytes.truncate(range.start);
        }

        let runner_len = bytes.len();

        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(MARKER);

        write_file(&config.output, &bytes, true)?;

        info!(
            "Wrote artifact {} ({} bytes runner, {} bytes payload)",
            config.output.display(),
            runner_len,
            payload.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::backends::{CodeGenerator, Engine};
    use crate::config::{CompilerConfig, OptimizeLevel};
    use crate::errors::{CodeGenError, RuntimeError};
    use crate::ir::instruction::Instruction;
    use crate::ir::program::Program;
    use crate::translator::translate;

    use super::{decode, encode, find_payload, load_embedded, ArtifactEmitter, Payload};

    fn payload(source: &str) -> Payload {
        let config = CompilerConfig {
            optimize: OptimizeLevel::Both,
            debug: true,
            ..CompilerConfig::default()
        };

        Payload {
            program: translate(&config, &[source]).unwrap().program,
            engine: Engine::Interpreter,
            pause_on_exit: true,
        }
    }

    #[test]
    fn test_decode_encoded() {
        let payload = payload(",[->>+<<]>>>>>.<<<-?");

        let bytes = encode(&payload).unwrap();

        assert_eq!(&bytes[..4], b"BFCC");
        assert_eq!(bytes[4], 1);
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[6], 0);
        assert_eq!(decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_encode_rejects_placeholder() {
        let payload = Payload {
            program: Program::new(vec![Instruction::Nop]),
            engine: Engine::Jit,
            pause_on_exit: false,
        };

        assert!(matches!(
            encode(&payload),
            Err(CodeGenError::MalformedProgram { index: 0, .. })
        ));
    }

    #[test]
    fn test_decode_corrupt() {
        let bytes = encode(&payload("+.")).unwrap();

        assert!(matches!(decode(b"ELF!"), Err(RuntimeError::CorruptArtifact { .. })));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(RuntimeError::CorruptArtifact { .. })
        ));

        let mut unknown_tag = bytes.clone();
        unknown_tag[11] = 0xff;
        assert!(matches!(decode(&unknown_tag), Err(RuntimeError::CorruptArtifact { .. })));

        let mut trailing = bytes;
        trailing.push(0);
        assert!(matches!(decode(&trailing), Err(RuntimeError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_find_payload() {
        assert_eq!(find_payload(b"plain executable").unwrap(), None);

        let mut bytes = b"runner".to_vec();
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u64.to_le_bytes());
        bytes.extend_from_slice(b"BFCCART1");
        assert_eq!(find_payload(&bytes).unwrap(), Some(6..10));

        let mut broken = b"x".to_vec();
        broken.extend_from_slice(&100u64.to_le_bytes());
        broken.extend_from_slice(b"BFCCART1");
        assert!(find_payload(&broken).is_err());
    }

    #[test]
    fn test_emit_and_load() {
        let dir = tempdir().unwrap();
        let runner = dir.path().join("runner");
        fs::write(&runner, b"#!runner executable").unwrap();

        let config = CompilerConfig {
            output: dir.path().join("hello"),
            engine: Engine::Interpreter,
            ..CompilerConfig::default()
        };
        let program = translate(&config, &["++[>+<-]>."]).unwrap().program;

        ArtifactEmitter::new(runner.clone()).generate(&program, &config).unwrap();

        let bytes = fs::read(dir.path().join("hello")).unwrap();
        assert!(bytes.starts_with(b"#!runner executable"));
        assert!(bytes.ends_with(b"BFCCART1"));

        let payload = load_embedded(&dir.path().join("hello")).unwrap().unwrap();
        assert_eq!(payload.program, program);
        assert_eq!(payload.engine, Engine::Interpreter);
        assert!(!payload.pause_on_exit);

        assert_eq!(load_embedded(&runner).unwrap(), None);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = fs::metadata(dir.path().join("hello")).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_artifact_as_runner() {
        let dir = tempdir().unwrap();
        let runner = dir.path().join("runner");
        fs::write(&runner, b"runner").unwrap();

        let mut config = CompilerConfig {
            output: dir.path().join("first"),
            ..CompilerConfig::default()
        };
        let first = translate(&config, &["+."]).unwrap().program;
        ArtifactEmitter::new(runner).generate(&first, &config).unwrap();

        let second = translate(&config, &["-."]).unwrap().program;
        let first_path = config.output.clone();
        config.output = dir.path().join("second");
        ArtifactEmitter::new(first_path).generate(&second, &config).unwrap();

        let bytes = fs::read(dir.path().join("second")).unwrap();
        assert_eq!(bytes.windows(8).filter(|window| *window == b"BFCCART1").count(), 1);
        assert_eq!(load_embedded(&dir.path().join("second")).unwrap().unwrap().program, second);
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempdir().unwrap();
        let runner = dir.path().join("runner");
        fs::write(&runner, b"runner").unwrap();

        let config = CompilerConfig {
            output: dir.path().join("missing").join("hello"),
            ..CompilerConfig::default()
        };
        let program = translate(&config, &["+."]).unwrap().program;

        let result = ArtifactEmitter::new(runner).generate(&program, &config);

        assert!(matches!(result, Err(CodeGenError::ArtifactWrite { .. })));
        assert!(!dir.path().join("missing").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
