// This module rewrites a branch selected by the fixpoint loop into its long form. A new
// block (".longbr") is placed right after the branch's block and holds an unconditional
// transfer to the original target. Non-PIC code uses a single absolute jump with a nop
// in its delay slot. PIC code cannot encode an absolute address, so it saves the link
// register, forms the target's distance from a bal-established anchor in $at via the
// long_branch_lui/long_branch_addiu pseudos, and jumps through the sum of the anchor
// address and that distance from a second block (".baltgt").
//
// The original branch is then redirected: an unconditional branch simply retargets to
// the new block, while a conditional branch is replaced by the inverse-condition branch
// to the old fallthrough block so that the taken path falls into the long sequence.

use log::{debug, warn};

use crate::core::bits::is_int;
use crate::core::{
    BlockId, InstLoc, InstrInfo, LegalizeError, LegalizeResult, MachineFunction, MachineInst,
    Operand, SymbolModifier,
};
use crate::cpu0::{Opcode, Reg, INST_WORD_BYTES};

use super::layout::BlockLayoutInfo;

/// Symbol the PIC prologue uses to establish the global pointer.
pub const GP_DISP_SYMBOL: &str = "_gp_disp";

/// Words in the PIC long-branch sequence that follow the `bal` anchor.
const PIC_WORDS_AFTER_ANCHOR: u64 = 5;

/// Insert the `_gp_disp` global pointer setup at the top of the entry block.
/// Returns false if the function has no blocks.
pub(crate) fn emit_gp_disp(func: &mut MachineFunction) -> bool {
    let Some(entry) = func.entry_block() else {
        return false;
    };
    let setup = [
        MachineInst::new(Opcode::Lui)
            .reg(Reg::V0)
            .symbol(GP_DISP_SYMBOL, SymbolModifier::Hi),
        MachineInst::new(Opcode::Addiu)
            .reg(Reg::V0)
            .reg(Reg::V0)
            .symbol(GP_DISP_SYMBOL, SymbolModifier::Lo),
    ];
    func.block_mut(entry).insts_mut().splice(0..0, setup);
    true
}

/// Replace the conditional branch at `loc` with its inverse branching to `new_target`.
///
/// Register operands are copied up to the first block operand. The replacement takes
/// the original's place, so an instruction bundled behind it stays in its delay slot.
pub(crate) fn replace_branch<I: InstrInfo + ?Sized>(
    func: &mut MachineFunction,
    ii: &I,
    loc: InstLoc,
    new_target: BlockId,
) -> LegalizeResult<()> {
    let old = func.inst(loc);
    let new_opcode = ii
        .opposite_branch_opcode(old.opcode)
        .ok_or(LegalizeError::MissingOppositeBranch { opcode: old.opcode })?;

    let mut new = MachineInst::new(new_opcode);
    for op in &old.operands {
        match op {
            Operand::Reg(reg) => new = new.reg(*reg),
            Operand::Block(_) => break,
            other => {
                return Err(LegalizeError::InvariantViolation {
                    block: func.block(loc.block).name().to_string(),
                    reason: format!("unexpected operand {other:?} before branch target"),
                })
            }
        }
    }
    new = new.block(new_target);
    new.bundled_with_succ = old.bundled_with_succ;

    if ii.has_delay_slot(old) && !old.bundled_with_succ {
        warn!(
            "{} in {} has an unfilled delay slot",
            old.opcode,
            func.block(loc.block).name()
        );
    }

    *func.inst_mut(loc) = new;
    Ok(())
}

/// Expand the branch recorded in `info` to a long-branch sequence.
///
/// `infos` must hold the estimates the branch was selected with; for PIC code their
/// offsets must be populated.
pub(crate) fn expand_to_long_branch<I: InstrInfo + ?Sized>(
    func: &mut MachineFunction,
    ii: &I,
    infos: &[BlockLayoutInfo],
    info: &BlockLayoutInfo,
    position_independent: bool,
    seq_words: u64,
) -> LegalizeResult<()> {
    let Some(loc) = info.branch else {
        return Ok(());
    };
    let block = loc.block;
    let branch = func.inst(loc).clone();
    let target = branch
        .target_block()
        .ok_or_else(|| LegalizeError::MissingBranchTarget {
            block: func.block(block).name().to_string(),
            opcode: branch.opcode,
        })?;
    let fallthrough = if ii.is_unconditional_branch(&branch) {
        None
    } else {
        let next = func.layout_successor(block).ok_or_else(|| LegalizeError::NoFallthrough {
            block: func.block(block).name().to_string(),
        })?;
        Some(next)
    };

    let long_br = func.create_derived_block(block, "longbr");
    func.insert_block_after(block, long_br);
    func.block_mut(block).replace_successor(target, long_br);

    let emitted = if position_independent {
        let bal_tgt = func.create_derived_block(block, "baltgt");
        func.insert_block_after(long_br, bal_tgt);
        func.block_mut(long_br).add_successor(bal_tgt);
        func.block_mut(bal_tgt).add_successor(target);

        let anchor_offset = info.offset + info.size - PIC_WORDS_AFTER_ANCHOR * INST_WORD_BYTES;
        let target_offset = infos[func.block(target).number()].offset;
        let displacement = target_offset as i64 - anchor_offset as i64;
        if !is_int(32, displacement) {
            return Err(LegalizeError::DisplacementOutOfRange {
                target,
                anchor: bal_tgt,
                displacement,
            });
        }
        debug!(
            "PIC long branch {} -> {}: estimated displacement {}",
            func.block(block).name(),
            func.block(target).name(),
            displacement
        );

        let long_br_insts = [
            MachineInst::new(Opcode::Addiu).reg(Reg::Sp).reg(Reg::Sp).imm(-8),
            MachineInst::new(Opcode::St).reg(Reg::Lr).reg(Reg::Sp).imm(0),
            MachineInst::new(Opcode::LongBranchLui)
                .reg(Reg::At)
                .block(target)
                .block(bal_tgt),
            MachineInst::new(Opcode::LongBranchAddiu)
                .reg(Reg::At)
                .reg(Reg::At)
                .block(target)
                .block(bal_tgt),
            MachineInst::new(Opcode::Bal).block(bal_tgt),
        ];
        let bal_tgt_insts = [
            MachineInst::new(Opcode::Addu).reg(Reg::At).reg(Reg::Lr).reg(Reg::At),
            MachineInst::new(Opcode::Ld).reg(Reg::Lr).reg(Reg::Sp).imm(0),
            MachineInst::new(Opcode::Addiu).reg(Reg::Sp).reg(Reg::Sp).imm(8),
            MachineInst::new(Opcode::Jr).reg(Reg::At).bundled(),
            MachineInst::new(Opcode::Nop),
        ];
        func.block_mut(long_br).insts_mut().extend(long_br_insts);
        func.block_mut(bal_tgt).insts_mut().extend(bal_tgt_insts);

        ii.insts_size(func.block(long_br).insts()) + ii.insts_size(func.block(bal_tgt).insts())
    } else {
        func.block_mut(long_br).add_successor(target);
        func.block_mut(long_br).push(MachineInst::new(Opcode::Jmp).block(target).bundled());
        func.block_mut(long_br).push(MachineInst::new(Opcode::Nop));

        ii.insts_size(func.block(long_br).insts())
    };

    let expected = seq_words * INST_WORD_BYTES;
    if emitted != expected {
        return Err(LegalizeError::SequenceSizeMismatch {
            expected,
            actual: emitted,
        });
    }

    match fallthrough {
        None => {
            func.inst_mut(loc).set_target_block(long_br);
        }
        Some(fallthrough) => {
            replace_branch(func, ii, loc, fallthrough)?;
            func.block_mut(block).add_successor(fallthrough);
        }
    }

    Ok(())
}
