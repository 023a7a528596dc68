// This module splits blocks that end in two branches. A block of the shape
// "conditional branch to T; unconditional branch to U" is cut after the conditional
// branch: the unconditional branch (with its bundled delay slot, if any) moves into a
// fresh block placed right after the original in the layout. The original keeps the
// conditional branch and gains two successors, the new block and T; the new block
// inherits every other successor. Afterwards each block has at most one terminating
// branch, which is the one the layout bookkeeping records.
//
// Scans work on bundle heads and skip debug instructions, so a delay-slot filler is
// never mistaken for a terminator.

use log::trace;

use crate::core::{BlockId, InstrInfo, LegalizeError, LegalizeResult, MachineFunction, MachineInst};

/// Index of the last non-debug bundle head strictly before `end`.
pub(crate) fn last_bundle_head<I: InstrInfo + ?Sized>(
    ii: &I,
    insts: &[MachineInst],
    end: usize,
) -> Option<usize> {
    (0..end.min(insts.len())).rev().find(|&i| {
        let inside_bundle = i > 0 && insts[i - 1].bundled_with_succ;
        !inside_bundle && !ii.is_debug(&insts[i])
    })
}

/// Split `block` if it ends in two branches.
///
/// Returns the new block, or `None` when the block has fewer than two trailing
/// branches or its last branch is not direct.
pub(crate) fn split_block<I: InstrInfo + ?Sized>(
    func: &mut MachineFunction,
    ii: &I,
    block: BlockId,
) -> LegalizeResult<Option<BlockId>> {
    let insts = func.block(block).insts();

    let Some(last) = last_bundle_head(ii, insts, insts.len()) else {
        return Ok(None);
    };
    if !ii.is_direct_branch(&insts[last]) {
        return Ok(None);
    }

    let Some(first) = last_bundle_head(ii, insts, last) else {
        return Ok(None);
    };
    if !ii.is_branch(&insts[first]) {
        return Ok(None);
    }
    if ii.is_indirect_branch(&insts[first]) {
        return Err(LegalizeError::InvariantViolation {
            block: func.block(block).name().to_string(),
            reason: format!(
                "indirect branch {} is followed by another branch",
                insts[first].opcode
            ),
        });
    }

    let first_target =
        insts[first]
            .target_block()
            .ok_or_else(|| LegalizeError::MissingBranchTarget {
                block: func.block(block).name().to_string(),
                opcode: insts[first].opcode,
            })?;

    let new_block = func.create_derived_block(block, "split");
    trace!(
        "Splitting {} before {} into {}",
        func.block(block).name(),
        func.block(block).insts()[last].opcode,
        func.block(new_block).name()
    );

    func.transfer_successors(block, new_block);
    func.block_mut(new_block).remove_successor(first_target);
    // The tail may still branch to the same block.
    let tail_targets: Vec<BlockId> = func.block(block).insts()[last..]
        .iter()
        .flat_map(|inst| inst.block_operands())
        .collect();
    for target in tail_targets {
        func.block_mut(new_block).add_successor(target);
    }

    func.block_mut(block).add_successor(new_block);
    func.block_mut(block).add_successor(first_target);

    func.insert_block_after(block, new_block);
    func.splice_tail(block, last, new_block);

    Ok(Some(new_block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu0::{Cpu0InstrInfo, Opcode, Reg};

    fn beq(target: BlockId) -> MachineInst {
        MachineInst::new(Opcode::Beq).reg(Reg::A0).reg(Reg::Zero).block(target)
    }

    #[test]
    fn test_split_double_branch() {
        let ii = Cpu0InstrInfo::new();
        let mut func = MachineFunction::new("f");
        let entry = func.push_block("entry");
        let then = func.push_block("then");
        let other = func.push_block("other");

        func.block_mut(entry).push(beq(then).bundled());
        func.block_mut(entry).push(MachineInst::new(Opcode::Nop));
        func.block_mut(entry).push(MachineInst::new(Opcode::Jmp).block(other).bundled());
        func.block_mut(entry).push(MachineInst::new(Opcode::Nop));
        func.block_mut(entry).add_successor(then);
        func.block_mut(entry).add_successor(other);

        let new = split_block(&mut func, &ii, entry).unwrap().unwrap();

        assert_eq!(func.layout(), &[entry, new, then, other]);
        assert_eq!(func.block(entry).insts().len(), 2);
        assert_eq!(func.block(new).insts()[0].opcode, Opcode::Jmp);
        assert_eq!(func.block(new).insts()[1].opcode, Opcode::Nop);
        assert_eq!(func.block(entry).successors(), &[new, then]);
        assert_eq!(func.block(new).successors(), &[other]);
    }

    #[test]
    fn test_no_split_for_single_branch_with_delay_slot() {
        let ii = Cpu0InstrInfo::new();
        let mut func = MachineFunction::new("f");
        let entry = func.push_block("entry");
        let exit = func.push_block("exit");

        func.block_mut(entry).push(MachineInst::new(Opcode::Addiu).reg(Reg::A0).reg(Reg::A0).imm(1));
        func.block_mut(entry).push(MachineInst::new(Opcode::Jmp).block(exit).bundled());
        func.block_mut(entry).push(MachineInst::new(Opcode::Nop));
        func.block_mut(entry).add_successor(exit);

        assert_eq!(split_block(&mut func, &ii, entry).unwrap(), None);
        assert_eq!(func.num_blocks(), 2);
    }

    #[test]
    fn test_debug_instructions_are_skipped() {
        let ii = Cpu0InstrInfo::new();
        let mut func = MachineFunction::new("f");
        let entry = func.push_block("entry");
        let a = func.push_block("a");
        let b = func.push_block("b");

        func.block_mut(entry).push(MachineInst::new(Opcode::Jeq).reg(Reg::Sw).block(a));
        func.block_mut(entry).push(MachineInst::new(Opcode::DbgValue));
        func.block_mut(entry).push(MachineInst::new(Opcode::Jmp).block(b));
        func.block_mut(entry).push(MachineInst::new(Opcode::DbgValue));
        func.block_mut(entry).add_successor(a);
        func.block_mut(entry).add_successor(b);

        let new = split_block(&mut func, &ii, entry).unwrap().unwrap();
        assert_eq!(func.block(entry).insts().len(), 2);
        assert_eq!(func.block(new).insts()[0].opcode, Opcode::Jmp);
    }

    #[test]
    fn test_indirect_first_branch_is_rejected() {
        let ii = Cpu0InstrInfo::new();
        let mut func = MachineFunction::new("f");
        let entry = func.push_block("entry");
        let exit = func.push_block("exit");

        func.block_mut(entry).push(MachineInst::new(Opcode::Jr).reg(Reg::At));
        func.block_mut(entry).push(MachineInst::new(Opcode::Jmp).block(exit));

        let err = split_block(&mut func, &ii, entry).unwrap_err();
        assert!(matches!(err, LegalizeError::InvariantViolation { .. }));
    }
}
