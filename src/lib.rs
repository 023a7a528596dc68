//! Cpu0 encoding legalization.
//!
//! This crate is the last step of the Cpu0 machine-code backend before encoding. It
//! makes sure every instruction it is given can actually be encoded:
//! branches whose targets lie beyond the 16-bit word displacement field are rewritten
//! into long-branch sequences, and constants are built from the shortest sequence of
//! 16-bit immediate instructions.
//!
//! # Primary Usage
//!
//! ```ignore
//! use cpu0_legalize::cpu0::Cpu0InstrInfo;
//! use cpu0_legalize::relax::{BranchExpansion, BranchExpansionOptions};
//!
//! let ii = Cpu0InstrInfo::new();
//! let mut pass = BranchExpansion::new(&ii, BranchExpansionOptions::new().pic(true));
//! let result = pass.run_on_function(&mut func)?;
//! cpu0_legalize::fixup::lower_long_branch_pseudos(&mut func, &ii)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Block graph, target query trait, errors, statistics
//! - [`cpu0`] - Cpu0 opcodes, registers and [`core::InstrInfo`] implementation
//! - [`relax`] - Branch relaxation (splitting, fixpoint, long-branch expansion)
//! - [`immediate`] - Shortest immediate materialization sequences
//! - [`fixup`] - Encoding-time resolution of long-branch pseudos
//! - [`mir`] - Textual machine IR and FileCheck-style test runner
//! - [`driver`] - Text-in/text-out entry points used by the CLI and filetests

pub mod core;
pub mod cpu0;
pub mod driver;
pub mod fixup;
pub mod immediate;
pub mod mir;
pub mod relax;

pub use core::{
    BlockId, InstLoc, InstrInfo, LegalizeError, LegalizeResult, LegalizeStats, MachineBlock,
    MachineFunction, MachineInst, MaterializeError, Operand,
};
pub use immediate::{materialize, ImmInst, ImmOpcode, InstSeq};
pub use relax::{expand_branches, BranchExpansion, BranchExpansionOptions, ExpansionResult};
