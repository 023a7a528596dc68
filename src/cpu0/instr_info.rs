//! Cpu0 implementation of [`InstrInfo`].

use crate::core::function::MachineInst;
use crate::core::instr_info::InstrInfo;

use super::opcodes::Opcode;

/// Answers instruction queries from the static opcode table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cpu0InstrInfo;

impl Cpu0InstrInfo {
    pub fn new() -> Self {
        Self
    }
}

impl InstrInfo for Cpu0InstrInfo {
    fn inst_size(&self, inst: &MachineInst) -> u64 {
        inst.opcode.info().size
    }

    fn is_branch(&self, inst: &MachineInst) -> bool {
        inst.opcode.info().is_branch
    }

    fn is_conditional_branch(&self, inst: &MachineInst) -> bool {
        let info = inst.opcode.info();
        info.is_branch && info.is_conditional && !info.is_indirect
    }

    fn is_indirect_branch(&self, inst: &MachineInst) -> bool {
        inst.opcode.info().is_indirect
    }

    fn is_barrier(&self, inst: &MachineInst) -> bool {
        inst.opcode.info().is_barrier
    }

    fn is_debug(&self, inst: &MachineInst) -> bool {
        inst.opcode.info().is_debug
    }

    fn has_delay_slot(&self, inst: &MachineInst) -> bool {
        inst.opcode.info().delay_slot
    }

    fn opposite_branch_opcode(&self, opcode: Opcode) -> Option<Opcode> {
        opcode.opposite_branch()
    }
}
