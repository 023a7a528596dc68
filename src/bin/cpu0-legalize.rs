//! Command line driver for Cpu0 encoding legalization.
//!
//! `relax` reads a MIR file (or stdin when the path is `-`) and prints it after
//! branch expansion; `materialize` prints the shortest sequence for a constant.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use cpu0_legalize::driver::{materialize_text, parse_value, relax_text, RelaxConfig};
use cpu0_legalize::relax::BranchExpansionOptions;

#[derive(Parser)]
#[command(name = "cpu0-legalize", bin_name = "cpu0-legalize", version)]
#[command(about = "Branch relaxation and immediate materialization for Cpu0")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand out-of-range branches in a MIR module
    Relax {
        /// MIR file, or `-` for stdin
        file: PathBuf,

        /// Emit position-independent long branches
        #[arg(long)]
        pic: bool,

        /// Insert the _gp_disp prologue (PIC only)
        #[arg(long)]
        gp_disp: bool,

        /// Expand every branch regardless of distance
        #[arg(long)]
        force_long_branch: bool,

        /// Leave the module unchanged
        #[arg(long)]
        skip_long_branch: bool,

        /// Resolve long-branch pseudos to lui/addiu
        #[arg(long)]
        lower_pseudos: bool,

        /// Print statistics after the module
        #[arg(long)]
        stats: bool,
    },

    /// Print the shortest instruction sequence for a constant
    Materialize {
        /// Decimal or 0x-prefixed value; a leading '-' gives two's complement
        #[arg(allow_hyphen_values = true)]
        value: String,

        /// Register width in bits
        #[arg(long, default_value_t = 32)]
        width: u32,

        /// Require the sequence to end in addiu
        #[arg(long)]
        end_in_add: bool,
    },
}

fn read_input(path: &Path) -> io::Result<String> {
    if path.to_str() == Some("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let output = match cli.command {
        Command::Relax {
            file,
            pic,
            gp_disp,
            force_long_branch,
            skip_long_branch,
            lower_pseudos,
            stats,
        } => {
            let text = read_input(&file)?;
            let config = RelaxConfig {
                options: BranchExpansionOptions::new()
                    .pic(pic)
                    .global_base_reg(gp_disp)
                    .force(force_long_branch)
                    .skip(skip_long_branch),
                lower_pseudos,
                print_stats: stats,
            };
            relax_text(&text, &config)?
        }
        Command::Materialize {
            value,
            width,
            end_in_add,
        } => materialize_text(parse_value(&value)?, width, end_in_add)?,
    };

    print!("{}", output);
    Ok(())
}
