// This module holds the text-in/text-out entry points shared by the command line
// driver and the MIR filetest runner. relax_text parses every function in a MIR
// module, runs branch expansion with one pass instance so statistics accumulate,
// optionally lowers the long-branch pseudos and range-checks the result, and prints
// the module back. materialize_text runs the immediate search for one value and
// prints the sequence both abstractly and as a MIR function writing $v0.

//! Shared driver for the CLI and the filetest runner.

use log::debug;

use crate::core::MachineFunction;
use crate::cpu0::{Cpu0InstrInfo, Reg};
use crate::fixup::{check_branch_ranges, lower_long_branch_pseudos};
use crate::immediate::materialize;
use crate::mir::{parse_functions, print_function};
use crate::relax::{BranchExpansion, BranchExpansionOptions};

#[derive(Debug, Clone, Copy, Default)]
pub struct RelaxConfig {
    pub options: BranchExpansionOptions,
    /// Resolve long-branch pseudos to `lui`/`addiu` after expansion.
    pub lower_pseudos: bool,
    /// Append the statistics report.
    pub print_stats: bool,
}

/// Relax every function in `text` and print the result.
pub fn relax_text(text: &str, config: &RelaxConfig) -> Result<String, String> {
    let ii = Cpu0InstrInfo::new();
    let mut funcs = parse_functions(text, &ii)?;
    let mut pass = BranchExpansion::new(&ii, config.options);
    let mut lowered = 0;
    let mut out = String::new();

    for func in &mut funcs {
        let result = pass
            .run_on_function(func)
            .map_err(|e| format!("{}: {}", func.name(), e))?;
        debug!("{}: {:?}", func.name(), result);

        if config.lower_pseudos {
            lowered += lower_long_branch_pseudos(func, &ii)
                .map_err(|e| format!("{}: {}", func.name(), e))?;
            for branch in check_branch_ranges(func, &ii) {
                out.push_str(&format!(
                    "; out of range: {} in {} ({} words)\n",
                    branch.opcode, branch.block, branch.displacement_words
                ));
            }
        }

        out.push_str(&print_function(func, &ii));
    }

    if config.print_stats {
        let mut stats = pass.into_stats();
        stats.pseudos_lowered += lowered;
        out.push_str(&stats.to_string());
    }

    Ok(out)
}

/// Parse a decimal or `0x` hexadecimal value; a leading `-` gives two's complement.
pub fn parse_value(text: &str) -> Result<u64, String> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    }
    .map_err(|e| format!("Invalid value '{}': {}", text, e))?;

    Ok(if negative { value.wrapping_neg() } else { value })
}

/// Materialize one value and print the sequence.
pub fn materialize_text(value: u64, width: u32, end_in_add: bool) -> Result<String, String> {
    let seq = materialize(value, width, end_in_add).map_err(|e| e.to_string())?;
    let ii = Cpu0InstrInfo::new();

    let mut func = MachineFunction::new("materialize");
    let entry = func.push_block("entry");
    for inst in seq.emit(Reg::V0) {
        func.block_mut(entry).push(inst);
    }

    let mut out = format!(
        "; value {:#x}, width {}, {} instructions\n",
        seq.evaluate(width),
        width,
        seq.len()
    );
    for inst in &seq {
        out.push_str(&format!("; {}\n", inst));
    }
    out.push_str(&print_function(&func, &ii));
    Ok(out)
}
