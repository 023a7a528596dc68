// This module performs the encoding-time step that follows branch expansion. Once the
// layout is final, block byte offsets are known exactly, so the PIC long-branch pseudos
// can be resolved: long_branch_lui becomes a lui of the high half and long_branch_addiu
// an addiu of the low half of the distance from the bal anchor to the target. The high
// half is rounded so that adding the sign-extended low half reproduces the distance.
// A range check reports short branches that still cannot encode their displacement.

//! Fixup values and long-branch pseudo lowering.

use hashbrown::HashMap;
use log::{debug, warn};

use crate::core::bits::{is_int, sign_extend};
use crate::core::{BlockId, InstrInfo, LegalizeError, LegalizeResult, MachineFunction, MachineInst};
use crate::cpu0::{Opcode, INST_WORD_BYTES};

/// Relocation kinds used by the Cpu0 encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixupKind {
    /// High 16 bits, rounded for a sign-extended low half.
    Hi16,
    /// Low 16 bits.
    Lo16,
    /// 16-bit PC-relative branch displacement.
    Pc16,
    /// 24-bit PC-relative jump displacement.
    Pc24,
}

impl FixupKind {
    /// Turn a resolved value into the field value for this kind.
    pub fn adjust(self, value: i64) -> i64 {
        match self {
            FixupKind::Hi16 => (value.wrapping_add(0x8000) >> 16) & 0xffff,
            FixupKind::Lo16 => value & 0xffff,
            // Displacements count from the instruction after the branch.
            FixupKind::Pc16 | FixupKind::Pc24 => value - INST_WORD_BYTES as i64,
        }
    }

    /// Width of the encoded field, in bits.
    pub const fn field_bits(self) -> u32 {
        match self {
            FixupKind::Hi16 | FixupKind::Lo16 | FixupKind::Pc16 => 16,
            FixupKind::Pc24 => 24,
        }
    }
}

/// Byte offset of every block in the current layout.
pub fn block_offsets<I: InstrInfo + ?Sized>(
    func: &MachineFunction,
    ii: &I,
) -> HashMap<BlockId, u64> {
    let mut offsets = HashMap::with_capacity(func.num_blocks());
    let mut offset = 0;
    for (id, block) in func.blocks() {
        offsets.insert(id, offset);
        offset += ii.insts_size(block.insts());
    }
    offsets
}

fn offset_of(
    offsets: &HashMap<BlockId, u64>,
    func: &MachineFunction,
    block: BlockId,
    user: BlockId,
) -> LegalizeResult<i64> {
    offsets
        .get(&block)
        .map(|&offset| offset as i64)
        .ok_or_else(|| LegalizeError::InvariantViolation {
            block: func.block(user).name().to_string(),
            reason: format!("{} is not in the layout", block),
        })
}

/// Rewrite every `long_branch_lui` / `long_branch_addiu` into `lui` / `addiu`
/// with the final hi/lo halves of `target - anchor`. Returns the number rewritten.
pub fn lower_long_branch_pseudos<I: InstrInfo + ?Sized>(
    func: &mut MachineFunction,
    ii: &I,
) -> LegalizeResult<usize> {
    let offsets = block_offsets(func, ii);
    let mut lowered = 0;

    let layout: Vec<BlockId> = func.layout().to_vec();
    for id in layout {
        for index in 0..func.block(id).insts().len() {
            let inst = &func.block(id).insts()[index];
            if !matches!(inst.opcode, Opcode::LongBranchLui | Opcode::LongBranchAddiu) {
                continue;
            }

            let regs: Vec<_> = inst.reg_operands().collect();
            let blocks: Vec<_> = inst.block_operands().collect();
            let expected_regs = if inst.opcode == Opcode::LongBranchLui { 1 } else { 2 };
            if regs.len() != expected_regs || blocks.len() != 2 {
                return Err(LegalizeError::InvariantViolation {
                    block: func.block(id).name().to_string(),
                    reason: format!("malformed {}", inst.opcode),
                });
            }

            let (target, anchor) = (blocks[0], blocks[1]);
            let displacement =
                offset_of(&offsets, func, target, id)? - offset_of(&offsets, func, anchor, id)?;
            if !is_int(32, displacement) {
                return Err(LegalizeError::DisplacementOutOfRange {
                    target,
                    anchor,
                    displacement,
                });
            }

            let mut lowered_inst = if inst.opcode == Opcode::LongBranchLui {
                MachineInst::new(Opcode::Lui)
                    .reg(regs[0])
                    .imm(FixupKind::Hi16.adjust(displacement))
            } else {
                let lo = FixupKind::Lo16.adjust(displacement) as u64;
                MachineInst::new(Opcode::Addiu)
                    .reg(regs[0])
                    .reg(regs[1])
                    .imm(sign_extend(16, lo))
            };
            lowered_inst.bundled_with_succ = inst.bundled_with_succ;

            debug!(
                "Lowered {} in {} (displacement {})",
                inst.opcode,
                func.block(id).name(),
                displacement
            );
            func.block_mut(id).insts_mut()[index] = lowered_inst;
            lowered += 1;
        }
    }

    Ok(lowered)
}

/// A short branch whose final displacement does not fit its field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfRangeBranch {
    pub block: String,
    pub opcode: Opcode,
    /// Displacement in instruction words from the instruction after the branch.
    pub displacement_words: i64,
}

/// Check every conditional branch and `bal` against the 16-bit word field.
///
/// Unconditional `jmp` is excluded: after expansion it is the absolute jump of a
/// long-branch block.
pub fn check_branch_ranges<I: InstrInfo + ?Sized>(
    func: &MachineFunction,
    ii: &I,
) -> Vec<OutOfRangeBranch> {
    let offsets = block_offsets(func, ii);
    let mut out_of_range = Vec::new();

    for (id, block) in func.blocks() {
        let mut address = offsets.get(&id).copied().unwrap_or(0);
        for inst in block.insts() {
            let checked = ii.is_conditional_branch(inst) || inst.opcode == Opcode::Bal;
            if let (true, Some(target)) = (checked, inst.target_block()) {
                if let Some(&target_offset) = offsets.get(&target) {
                    let value = FixupKind::Pc16.adjust(target_offset as i64 - address as i64);
                    let words = value / INST_WORD_BYTES as i64;
                    if !is_int(FixupKind::Pc16.field_bits(), words) {
                        warn!(
                            "{} in {} is out of range ({} words)",
                            inst.opcode,
                            block.name(),
                            words
                        );
                        out_of_range.push(OutOfRangeBranch {
                            block: block.name().to_string(),
                            opcode: inst.opcode,
                            displacement_words: words,
                        });
                    }
                }
            }
            address += ii.inst_size(inst);
        }
    }

    out_of_range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu0::{Cpu0InstrInfo, Reg};

    #[test]
    fn test_adjust() {
        assert_eq!(FixupKind::Hi16.adjust(0x1234_5678), 0x1234);
        // Bit 15 set: the high half absorbs the borrow of the negative low half.
        assert_eq!(FixupKind::Hi16.adjust(0x1234_8000), 0x1235);
        assert_eq!(FixupKind::Lo16.adjust(0x1234_8000), 0x8000);
        assert_eq!(FixupKind::Hi16.adjust(-8), 0);
        assert_eq!(FixupKind::Lo16.adjust(-8), 0xfff8);
        assert_eq!(FixupKind::Pc16.adjust(12), 8);
        assert_eq!(FixupKind::Pc16.field_bits(), 16);
        assert_eq!(FixupKind::Pc24.field_bits(), 24);
    }

    #[test]
    fn test_lower_pseudos() {
        let ii = Cpu0InstrInfo::new();
        let mut func = MachineFunction::new("f");
        let target = func.push_block("target");
        let longbr = func.push_block("longbr");
        let anchor = func.push_block("anchor");

        func.block_mut(target).push(MachineInst::new(Opcode::Nop));
        func.block_mut(longbr).push(
            MachineInst::new(Opcode::LongBranchLui)
                .reg(Reg::At)
                .block(target)
                .block(anchor),
        );
        func.block_mut(longbr).push(
            MachineInst::new(Opcode::LongBranchAddiu)
                .reg(Reg::At)
                .reg(Reg::At)
                .block(target)
                .block(anchor),
        );
        func.block_mut(longbr).push(MachineInst::new(Opcode::Bal).block(anchor));
        func.block_mut(anchor).push(MachineInst::new(Opcode::Ret).reg(Reg::Lr));

        assert_eq!(lower_long_branch_pseudos(&mut func, &ii).unwrap(), 2);

        // target at 0, anchor at 16.
        let insts = func.block(longbr).insts();
        assert_eq!(insts[0], MachineInst::new(Opcode::Lui).reg(Reg::At).imm(0));
        assert_eq!(
            insts[1],
            MachineInst::new(Opcode::Addiu).reg(Reg::At).reg(Reg::At).imm(-16)
        );
        assert!(check_branch_ranges(&func, &ii).is_empty());
    }

    #[test]
    fn test_range_check_reports_far_branch() {
        let ii = Cpu0InstrInfo::new();
        let mut func = MachineFunction::new("f");
        let b0 = func.push_block("b0");
        let b1 = func.push_block("b1");
        let b2 = func.push_block("b2");
        func.block_mut(b0)
            .push(MachineInst::new(Opcode::Bne).reg(Reg::A0).reg(Reg::Zero).block(b2));
        for _ in 0..32_768 {
            func.block_mut(b1).push(MachineInst::new(Opcode::Nop));
        }

        let report = check_branch_ranges(&func, &ii);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].opcode, Opcode::Bne);
        assert_eq!(report[0].displacement_words, 32_768);
    }
}
