// This module tracks statistics across runs of the legalization passes. LegalizeStats
// counts functions processed and skipped, blocks created by splitting, branches
// converted to long form (broken down by the opcode of the original branch), fixpoint
// iterations, long-branch pseudos lowered at fixup time and the largest function seen.
// The Display implementation prints a short report for the command line driver.

//! Legalization statistics.

use hashbrown::HashMap;
use std::fmt;

/// Counters accumulated over every function a pass instance processes.
#[derive(Debug, Default, Clone)]
pub struct LegalizeStats {
    /// Functions the branch expansion pass ran on.
    pub functions_processed: usize,

    /// Functions left alone because the pass was disabled.
    pub functions_skipped: usize,

    /// Blocks created by splitting double-branch blocks.
    pub blocks_split: usize,

    /// Branches converted to long form.
    pub long_branches: usize,

    /// Long branches by the opcode of the branch that was converted.
    pub long_branch_counts: HashMap<String, usize>,

    /// Outer fixpoint iterations summed over all functions.
    pub fixpoint_iterations: usize,

    /// Long-branch pseudos rewritten to real instructions.
    pub pseudos_lowered: usize,

    /// Largest function seen after legalization (bytes).
    pub largest_function_size: u64,

    pub largest_function_name: String,
}

impl LegalizeStats {
    pub fn record_long_branch(&mut self, opcode: &str) {
        self.long_branches += 1;
        *self
            .long_branch_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_function(&mut self, name: &str, code_size: u64) {
        self.functions_processed += 1;
        if self.largest_function_size < code_size {
            self.largest_function_size = code_size;
            self.largest_function_name = name.to_string();
        }
    }
}

impl fmt::Display for LegalizeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Legalization Statistics:")?;
        writeln!(f, "  Functions processed: {}", self.functions_processed)?;
        writeln!(f, "  Functions skipped: {}", self.functions_skipped)?;
        writeln!(f, "  Blocks split: {}", self.blocks_split)?;
        writeln!(f, "  Long branches: {}", self.long_branches)?;
        writeln!(f, "  Fixpoint iterations: {}", self.fixpoint_iterations)?;
        writeln!(f, "  Pseudos lowered: {}", self.pseudos_lowered)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} bytes)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        if !self.long_branch_counts.is_empty() {
            writeln!(f, "  Long branches by opcode:")?;
            let mut sorted: Vec<_> = self.long_branch_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (opcode, count) in sorted {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}
