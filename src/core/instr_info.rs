// This module defines the InstrInfo trait, the query interface the legalization passes
// use to learn about instructions without knowing the target. It answers how many bytes
// an instruction encodes to and which control-flow capabilities it has: branch,
// conditional, unconditional, indirect, debug-only, delay slot. It also maps a
// conditional branch opcode to the opcode testing the inverse condition. The passes
// only ever touch instructions through these predicates plus generic operand edits, so
// a test can substitute an implementation with different sizes or delay-slot rules.

//! Target instruction queries.
//!
//! The branch expansion pass consults an [`InstrInfo`] for every decision that
//! depends on the instruction set. Provided methods derive the composite predicates
//! from the primitive ones; implementations normally override only the primitives.

use super::function::MachineInst;
use crate::cpu0::Opcode;

pub trait InstrInfo {
    /// Encoded size of the instruction in bytes.
    fn inst_size(&self, inst: &MachineInst) -> u64;

    /// Any control transfer other than a return, direct or indirect.
    fn is_branch(&self, inst: &MachineInst) -> bool;

    /// Control transfer that may fall through to the next instruction.
    fn is_conditional_branch(&self, inst: &MachineInst) -> bool;

    fn is_indirect_branch(&self, inst: &MachineInst) -> bool;

    /// Control never continues with the next instruction.
    fn is_barrier(&self, inst: &MachineInst) -> bool;

    /// Pseudo instruction that produces no code and is skipped by layout scans.
    fn is_debug(&self, inst: &MachineInst) -> bool;

    fn has_delay_slot(&self, inst: &MachineInst) -> bool;

    /// Opcode of the branch testing the inverse condition.
    fn opposite_branch_opcode(&self, opcode: Opcode) -> Option<Opcode>;

    /// Direct branch that always transfers control.
    fn is_unconditional_branch(&self, inst: &MachineInst) -> bool {
        self.is_branch(inst) && self.is_barrier(inst) && !self.is_indirect_branch(inst)
    }

    /// Direct branch, conditional or not. These are the branches with a block operand.
    fn is_direct_branch(&self, inst: &MachineInst) -> bool {
        self.is_conditional_branch(inst) || self.is_unconditional_branch(inst)
    }

    /// Total size of a sequence of instructions.
    fn insts_size(&self, insts: &[MachineInst]) -> u64 {
        insts.iter().map(|inst| self.inst_size(inst)).sum()
    }
}
