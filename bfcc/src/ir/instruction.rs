use std::fmt::{Display, Formatter};

/// Jump target inside a [`Program`][crate::Program]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Set the pointer register to 0
    PointerInit,

    /// Allocate a zeroed cell buffer with the given number of cells
    BufferInit(u32),

    PointerAdd(i64),

    /// Add to the current cell modulo 2^16
    ValueAdd(i32),

    Print,
    PrintDebug,
    Read,

    /// Continue at label if the current cell is zero
    JumpIfZero(Label),

    /// Continue at label if the current cell is not zero
    JumpIfNotZero(Label),

    Label(Label),

    Halt,

    /// Reserved slot that gets overwritten while resolving loops
    Nop,
}

impl Instruction {
    /// Return label referenced by a jump
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::JumpIfZero(label) | Instruction::JumpIfNotZero(label) => Some(*label),
            _ => None,
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Instruction::Print | Instruction::PrintDebug | Instruction::Read)
    }

    /// Number of cells the pointer is moved by this instruction
    pub fn get_ptr_offset(&self) -> Option<i64> {
        match self {
            Instruction::PointerAdd(delta) => Some(*delta),
            _ => None,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::PointerInit => write!(f, "PTR_INIT"),
            Instruction::BufferInit(size) => write!(f, "BUF_INIT {}", size),
            Instruction::PointerAdd(delta) => write!(f, "PTR_ADD {}", delta),
            Instruction::ValueAdd(delta) => write!(f, "ADD {}", delta),
            Instruction::Print => write!(f, "PUT"),
            Instruction::PrintDebug => write!(f, "PUT_DEBUG"),
            Instruction::Read => write!(f, "GET"),
            Instruction::JumpIfZero(label) => write!(f, "JZ {}", label),
            Instruction::JumpIfNotZero(label) => write!(f, "JNZ {}", label),
            Instruction::Label(label) => write!(f, "{}:", label),
            Instruction::Halt => write!(f, "HALT"),
            Instruction::Nop => write!(f, "NOP"),
        }
    }
}
