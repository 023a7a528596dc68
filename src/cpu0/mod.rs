//! Cpu0 target description used by the legalization passes.
//!
//! - [`opcodes`] - opcode table with branch properties and sizes
//! - [`registers`] - physical register names
//! - [`instr_info`] - the [`crate::core::InstrInfo`] implementation

pub mod instr_info;
pub mod opcodes;
pub mod registers;

pub use instr_info::Cpu0InstrInfo;
pub use opcodes::{OpInfo, Opcode, INST_WORD_BYTES};
pub use registers::Reg;
