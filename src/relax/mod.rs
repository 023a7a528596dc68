// This module is the branch relaxation engine. Cpu0 conditional and unconditional
// branches encode a signed 16-bit word displacement, so a branch whose target lies
// further away has to be rewritten as a longer sequence. Because inserting a sequence
// makes the function bigger, other branches can fall out of range in turn; the pass
// therefore estimates block sizes, marks branches long one sweep at a time until a
// sweep marks nothing, and only then edits the code.
//
// run_on_function drives the whole pass: optional _gp_disp prologue, splitting of
// double-branch blocks (split), the size/offset bookkeeping (layout), the fixpoint
// sweep, and the long-branch rewrite (expand). Block numbers are refreshed after
// splitting and after expansion.

//! Branch relaxation for Cpu0.
//!
//! ```ignore
//! let ii = Cpu0InstrInfo::new();
//! let mut pass = BranchExpansion::new(&ii, BranchExpansionOptions::new().pic(true));
//! let result = pass.run_on_function(&mut func)?;
//! ```

pub mod expand;
pub mod layout;
pub mod split;

use log::{debug, info, trace};

use crate::core::bits::is_int;
use crate::core::{InstrInfo, LegalizeError, LegalizeResult, LegalizeStats, MachineFunction};
use crate::cpu0::INST_WORD_BYTES;
use crate::fixup::FixupKind;

pub use expand::GP_DISP_SYMBOL;
pub use layout::{compute_offset, compute_offset_from_start, BlockLayoutInfo};

/// Width of the signed word displacement field of a short branch.
pub const BRANCH_DISPLACEMENT_BITS: u32 = FixupKind::Pc16.field_bits();

/// Words emitted for a non-PIC long branch: `jmp` plus its delay slot.
pub const NON_PIC_LONG_BRANCH_WORDS: u64 = 2;

/// Words emitted for a PIC long branch across its two blocks.
pub const PIC_LONG_BRANCH_WORDS: u64 = 10;

/// Configuration of the branch expansion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchExpansionOptions {
    /// Leave the function untouched.
    pub skip_long_branch: bool,

    /// Expand every recorded branch regardless of distance.
    pub force_long_branch: bool,

    /// Generate position-independent sequences.
    pub position_independent: bool,

    /// The function uses a global base register, so PIC code needs the
    /// `_gp_disp` prologue.
    pub global_base_reg_set: bool,
}

impl BranchExpansionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip_long_branch = skip;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force_long_branch = force;
        self
    }

    pub fn pic(mut self, pic: bool) -> Self {
        self.position_independent = pic;
        self
    }

    pub fn global_base_reg(mut self, set: bool) -> Self {
        self.global_base_reg_set = set;
        self
    }

    /// Size of one long-branch sequence in instruction words.
    pub fn long_branch_seq_words(&self) -> u64 {
        if self.position_independent {
            PIC_LONG_BRANCH_WORDS
        } else {
            NON_PIC_LONG_BRANCH_WORDS
        }
    }
}

/// What one run of the pass did to a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionResult {
    pub blocks_split: usize,
    pub long_branches: usize,
    /// Fixpoint sweeps, including the final sweep that marked nothing.
    pub iterations: usize,
    pub gp_disp_emitted: bool,
}

impl ExpansionResult {
    /// True if the function was modified.
    pub fn changed(&self) -> bool {
        self.blocks_split > 0 || self.long_branches > 0 || self.gp_disp_emitted
    }
}

/// The branch expansion pass.
///
/// A pass instance can be run on many functions; statistics accumulate across runs.
pub struct BranchExpansion<'a, I: InstrInfo + ?Sized> {
    ii: &'a I,
    options: BranchExpansionOptions,
    infos: Vec<BlockLayoutInfo>,
    stats: LegalizeStats,
}

impl<'a, I: InstrInfo + ?Sized> BranchExpansion<'a, I> {
    pub fn new(ii: &'a I, options: BranchExpansionOptions) -> Self {
        Self {
            ii,
            options,
            infos: Vec::new(),
            stats: LegalizeStats::default(),
        }
    }

    pub fn options(&self) -> &BranchExpansionOptions {
        &self.options
    }

    pub fn stats(&self) -> &LegalizeStats {
        &self.stats
    }

    pub fn into_stats(self) -> LegalizeStats {
        self.stats
    }

    /// Layout records as of the last run, indexed by block number.
    pub fn layout_infos(&self) -> &[BlockLayoutInfo] {
        &self.infos
    }

    /// Run the pass on one function.
    ///
    /// On error the function may be partially modified and should be discarded.
    pub fn run_on_function(&mut self, func: &mut MachineFunction) -> LegalizeResult<ExpansionResult> {
        let mut result = ExpansionResult::default();

        if self.options.skip_long_branch {
            debug!("Skipping long branch expansion for {}", func.name());
            self.stats.functions_skipped += 1;
            return Ok(result);
        }

        if self.options.position_independent && self.options.global_base_reg_set {
            result.gp_disp_emitted = expand::emit_gp_disp(func);
        }

        result.blocks_split = self.init_layout_infos(func)?;

        let ceiling = self.infos.iter().filter(|i| i.branch.is_some()).count() + 1;
        let (iterations, long_branches) = self.relax(func, ceiling)?;
        result.iterations = iterations;
        result.long_branches = long_branches;
        self.stats.fixpoint_iterations += iterations;

        let size = layout::function_size(&self.infos);
        self.stats.record_function(func.name(), size);

        if long_branches == 0 {
            debug!("{}: all branches in range ({} bytes)", func.name(), size);
            return Ok(result);
        }

        if self.options.position_independent {
            compute_offset_from_start(&mut self.infos);
        }

        let seq_words = self.options.long_branch_seq_words();
        for n in 0..self.infos.len() {
            if !self.infos[n].has_long_branch {
                continue;
            }
            let info = self.infos[n].clone();
            expand::expand_to_long_branch(
                func,
                self.ii,
                &self.infos,
                &info,
                self.options.position_independent,
                seq_words,
            )?;
        }

        func.renumber_blocks();

        info!(
            "{}: expanded {} long branches in {} iterations ({} bytes)",
            func.name(),
            long_branches,
            iterations,
            size
        );

        Ok(result)
    }

    /// Split double-branch blocks, renumber, and rebuild the layout records.
    /// Returns the number of blocks created.
    fn init_layout_infos(&mut self, func: &mut MachineFunction) -> LegalizeResult<usize> {
        let mut split_count = 0;
        let mut pos = 0;

        // Visits the blocks created by splitting too; they never split again.
        while pos < func.num_blocks() {
            let block = func.layout()[pos];
            if split::split_block(func, self.ii, block)?.is_some() {
                split_count += 1;
            }
            pos += 1;
        }

        func.renumber_blocks();
        self.stats.blocks_split += split_count;

        self.infos = layout::collect_layout_infos(func, self.ii)?;
        Ok(split_count)
    }

    /// Mark out-of-range branches until a sweep marks nothing.
    ///
    /// Returns the number of sweeps and the number of branches marked. Every sweep
    /// but the last marks at least one branch, so a well-formed function needs at
    /// most `ceiling` sweeps.
    fn relax(&mut self, func: &MachineFunction, ceiling: usize) -> LegalizeResult<(usize, usize)> {
        let mut iterations = 0;
        let mut long_branches = 0;

        loop {
            if iterations == ceiling {
                return Err(LegalizeError::RelaxationDiverged { iterations });
            }
            iterations += 1;

            let marked = self.sweep(func)?;
            if marked == 0 {
                return Ok((iterations, long_branches));
            }
            long_branches += marked;
        }
    }

    /// One pass over the layout records. A branch marked long grows its block by the
    /// sequence size right away, so later branches in the same sweep see it.
    fn sweep(&mut self, func: &MachineFunction) -> LegalizeResult<usize> {
        let seq_bytes = self.options.long_branch_seq_words() * INST_WORD_BYTES;
        let word = INST_WORD_BYTES as i64;
        let mut marked = 0;

        for n in 0..self.infos.len() {
            let Some(loc) = self.infos[n].branch else {
                continue;
            };
            if self.infos[n].has_long_branch {
                continue;
            }

            let offset = compute_offset(func, self.ii, &self.infos, loc)?;
            if !self.options.force_long_branch && is_int(BRANCH_DISPLACEMENT_BITS, offset / word) {
                continue;
            }

            trace!(
                "{} in {}: offset {} bytes needs a long branch",
                func.inst(loc).opcode,
                func.block(loc.block).name(),
                offset
            );
            self.infos[n].has_long_branch = true;
            self.infos[n].size += seq_bytes;
            self.stats.record_long_branch(func.inst(loc).opcode.name());
            marked += 1;
        }

        Ok(marked)
    }
}

/// Run branch expansion on `func` with a fresh pass instance.
pub fn expand_branches<I: InstrInfo + ?Sized>(
    func: &mut MachineFunction,
    ii: &I,
    options: BranchExpansionOptions,
) -> LegalizeResult<ExpansionResult> {
    BranchExpansion::new(ii, options).run_on_function(func)
}
