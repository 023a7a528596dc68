//! Per-block layout bookkeeping for branch relaxation.
//!
//! One [`BlockLayoutInfo`] exists per block, indexed by layout number. Sizes are
//! estimates: they start as the sum of the block's instruction sizes and grow by the
//! long-branch sequence size when the block's branch is marked long, before any code
//! is actually inserted.

use crate::core::{InstLoc, InstrInfo, LegalizeError, LegalizeResult, MachineFunction};

use super::split::last_bundle_head;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLayoutInfo {
    /// Estimated size in bytes, including a pending long-branch sequence.
    pub size: u64,

    /// The block's branch has been selected for long-branch expansion.
    pub has_long_branch: bool,

    /// The block's terminating direct branch, if any.
    pub branch: Option<InstLoc>,

    /// Byte offset of the block from the function start, filled in for PIC only.
    pub offset: u64,
}

/// Build one record per block, in layout order. Block numbers must be current.
pub fn collect_layout_infos<I: InstrInfo + ?Sized>(
    func: &MachineFunction,
    ii: &I,
) -> LegalizeResult<Vec<BlockLayoutInfo>> {
    let mut infos = Vec::with_capacity(func.num_blocks());

    for (id, block) in func.blocks() {
        let insts = block.insts();
        let mut info = BlockLayoutInfo {
            size: ii.insts_size(insts),
            ..Default::default()
        };

        if let Some(index) = last_bundle_head(ii, insts, insts.len()) {
            let inst = &insts[index];
            if ii.is_direct_branch(inst) {
                if inst.target_block().is_none() {
                    return Err(LegalizeError::MissingBranchTarget {
                        block: block.name().to_string(),
                        opcode: inst.opcode,
                    });
                }
                info.branch = Some(InstLoc { block: id, index });
            }
        }

        infos.push(info);
    }

    Ok(infos)
}

/// Estimated displacement, in bytes, of the branch at `loc` to its target.
///
/// Forward branches span every block strictly between the branch's block and the
/// target; backward branches span the target through the branch's own block. The
/// displacement is taken from the word after the branch, so both directions are
/// biased by the bytes that follow the branch in its block: one word when a delay
/// slot is filled, nothing for the `j<cc>` branches.
pub fn compute_offset<I: InstrInfo + ?Sized>(
    func: &MachineFunction,
    ii: &I,
    infos: &[BlockLayoutInfo],
    loc: InstLoc,
) -> LegalizeResult<i64> {
    let inst = func.inst(loc);
    let target = inst
        .target_block()
        .ok_or_else(|| LegalizeError::MissingBranchTarget {
            block: func.block(loc.block).name().to_string(),
            opcode: inst.opcode,
        })?;

    let this_num = func.block(loc.block).number();
    let target_num = func.block(target).number();
    let trailing = ii.insts_size(&func.block(loc.block).insts()[loc.index + 1..]) as i64;

    if this_num < target_num {
        let span: u64 = infos[this_num + 1..target_num].iter().map(|i| i.size).sum();
        Ok(span as i64 + trailing)
    } else {
        let span: u64 = infos[target_num..=this_num].iter().map(|i| i.size).sum();
        Ok(-(span as i64) + trailing)
    }
}

/// Fill in each record's offset from the start of the function.
pub fn compute_offset_from_start(infos: &mut [BlockLayoutInfo]) {
    let mut offset = 0;
    for info in infos {
        info.offset = offset;
        offset += info.size;
    }
}

/// Sum of all estimated block sizes.
pub fn function_size(infos: &[BlockLayoutInfo]) -> u64 {
    infos.iter().map(|i| i.size).sum()
}
