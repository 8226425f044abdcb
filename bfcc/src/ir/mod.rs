pub mod instruction;
pub mod program;
