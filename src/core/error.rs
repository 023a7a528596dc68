// This module defines the error types of the legalization layer using the thiserror crate.
// LegalizeError covers every way the branch expansion pass can abort: graph invariants
// broken by an earlier pass (a second branch that is indirect, a branch without a block
// operand, a conditional branch with nowhere to fall through), a target that cannot
// invert a branch condition, a long-branch sequence whose size disagrees with the cost
// the fixpoint loop assumed, a fixpoint that never settles, and a PC-relative
// displacement too wide for a hi/lo pair. MaterializeError is the recoverable failure
// of the immediate search. Each variant carries enough context to locate the problem.

//! Error types for the legalization passes.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use super::function::BlockId;
use crate::cpu0::Opcode;

/// Fatal errors raised by the branch expansion pass.
///
/// None of these are recoverable: they mean the incoming graph was malformed or the
/// pass broke one of its own invariants, so no partial output is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LegalizeError {
    #[error("Invariant violation in block {block}: {reason}")]
    InvariantViolation { block: String, reason: String },

    #[error("Branch {opcode:?} in block {block} has no block operand")]
    MissingBranchTarget { block: String, opcode: Opcode },

    #[error("Conditional branch in block {block} has no fallthrough block")]
    NoFallthrough { block: String },

    #[error("No opposite branch for {opcode:?}")]
    MissingOppositeBranch { opcode: Opcode },

    #[error("Long branch sequence is {actual} bytes, expected {expected}")]
    SequenceSizeMismatch { expected: u64, actual: u64 },

    #[error("Branch relaxation did not converge after {iterations} iterations")]
    RelaxationDiverged { iterations: usize },

    #[error("Displacement {displacement} from {anchor:?} to {target:?} does not fit in 32 bits")]
    DisplacementOutOfRange {
        target: BlockId,
        anchor: BlockId,
        displacement: i64,
    },
}

/// Result type alias for legalization passes.
pub type LegalizeResult<T> = Result<T, LegalizeError>;

/// Failure to materialize an immediate under the requested constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("Unsupported immediate width: {width} bits")]
    InvalidWidth { width: u32 },

    #[error("Shortest sequence for {value:#x} needs {len} instructions, limit is {max}")]
    SequenceTooLong { value: u64, len: usize, max: usize },
}
