// This module is the hub of the shared infrastructure the legalization passes are built
// on: the arena-backed block graph (function), the target query trait (instr_info), the
// error enums (error) and the cumulative counters (stats). Nothing here knows about a
// particular algorithm; the relaxation engine, the fixup lowering and the textual IR
// all build on these types.

//! Core legalization infrastructure.
//!
//! # Key Components
//!
//! ## Block graph (`function`)
//! - Arena of blocks addressed by stable [`BlockId`]
//! - Explicit layout order with renumbering checkpoints
//! - Instructions with register, immediate, block and symbol operands
//!
//! ## Target queries (`instr_info`)
//! - Size, branch kind and delay slot predicates behind one trait
//!
//! ## Errors (`error`), statistics (`stats`) and integer helpers (`bits`)

pub mod bits;
pub mod error;
pub mod function;
pub mod instr_info;
pub mod stats;

pub use error::{LegalizeError, LegalizeResult, MaterializeError};
pub use function::{
    BlockId, InstLoc, MachineBlock, MachineFunction, MachineInst, Operand, SymbolModifier,
};
pub use instr_info::InstrInfo;
pub use stats::LegalizeStats;
