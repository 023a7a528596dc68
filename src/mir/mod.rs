//! Textual machine IR (MIR) for writing legalization tests.
//!
//! The format mirrors the in-memory block graph closely enough that the printer's
//! output parses back to an equivalent function. It is designed to be:
//! - Human-readable and writable
//! - Line oriented: one instruction or label per line
//! - Explicit about delay slots, via a leading `+` on the bundled instruction
//!
//! # MIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! func_name {
//! entry:
//!   addiu $sp, $sp, -8
//!   beq $a0, $zero, ^exit
//!   + nop
//! exit:
//!   ret $lr
//! }
//! ```
//!
//! Operands are registers (`$sp`), integers (`-8`, `0xff`), block references
//! (`^exit`) and symbol halves (`%hi(_gp_disp)`). Successor edges are not written;
//! the parser derives them from branch targets plus the layout fallthrough of every
//! block that does not end in a barrier.

use std::fmt::Write;

use crate::core::{InstrInfo, MachineFunction, MachineInst, Operand};

pub mod check;
pub mod parser;

pub use check::{CheckDirective, RunDirective, TestRunner, TestSpec};
pub use parser::parse_functions;

/// Parse text holding exactly one function.
pub fn parse_function<I: InstrInfo + ?Sized>(text: &str, ii: &I) -> Result<MachineFunction, String> {
    let mut funcs = parse_functions(text, ii)?;
    match funcs.len() {
        1 => Ok(funcs.remove(0)),
        n => Err(format!("Expected one function, found {}", n)),
    }
}

fn format_operand(func: &MachineFunction, operand: &Operand) -> String {
    match operand {
        Operand::Reg(reg) => reg.to_string(),
        Operand::Imm(imm) => imm.to_string(),
        Operand::Block(id) => format!("^{}", func.block(*id).name()),
        Operand::Symbol { name, modifier } => format!("%{}({})", modifier.name(), name),
    }
}

pub fn format_inst(func: &MachineFunction, inst: &MachineInst) -> String {
    let mut line = inst.opcode.to_string();
    for (i, operand) in inst.operands.iter().enumerate() {
        line.push_str(if i == 0 { " " } else { ", " });
        line.push_str(&format_operand(func, operand));
    }
    line
}

/// Print `func` in MIR syntax, annotating each block with its number, size and
/// successors.
pub fn print_function<I: InstrInfo + ?Sized>(func: &MachineFunction, ii: &I) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {{", func.name());

    for (_, block) in func.blocks() {
        let succs: Vec<&str> = block
            .successors()
            .iter()
            .map(|&succ| func.block(succ).name())
            .collect();
        let _ = writeln!(
            out,
            "{}:  ; bb.{}, size {}, succs: {}",
            block.name(),
            block.number(),
            ii.insts_size(block.insts()),
            if succs.is_empty() { "none".to_string() } else { succs.join(", ") }
        );

        let mut bundled = false;
        for inst in block.insts() {
            let prefix = if bundled { "+ " } else { "" };
            let _ = writeln!(out, "  {}{}", prefix, format_inst(func, inst));
            bundled = inst.bundled_with_succ;
        }
    }

    out.push_str("}\n");
    out
}
