// This module finds the shortest Cpu0 instruction sequence that builds an arbitrary
// constant in a register using only addiu (sign-extended 16-bit add), ori (zero-extended
// 16-bit or), shl (shift left) and lui (load upper immediate). The search works from the
// low end of the value: a non-zero low half is peeled off by a final addiu (rounding the
// remainder so the sign extension cancels out) or, when bit 15 is set, alternatively by a
// final ori; a zero low half is peeled off by a final shl over the trailing zero bits.
// Each choice recurses on the remainder, and every complete path becomes one candidate
// sequence. A leading "addiu; shl >= 16" pair is folded into one lui when the shifted
// immediate still fits in 16 bits, and the shortest candidate wins (first found on ties).
//
// Candidate lists live in a per-call bumpalo arena; the winning sequence is copied out
// into an owned InstSeq.

//! Immediate materialization.
//!
//! ```
//! use cpu0_legalize::immediate::{materialize, ImmOpcode};
//!
//! let seq = materialize(0x1234_5678, 32, false).unwrap();
//! assert_eq!(seq.len(), 2);
//! assert_eq!(seq.insts()[0].opcode, ImmOpcode::Lui);
//! assert_eq!(seq.evaluate(32), 0x1234_5678);
//! ```

use std::fmt;

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use crate::core::bits::{is_int, low_mask, sign_extend};
use crate::core::{MachineInst, MaterializeError};
use crate::cpu0::{Opcode, Reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmOpcode {
    /// Add a sign-extended 16-bit immediate.
    Addiu,
    /// Or a zero-extended 16-bit immediate.
    Ori,
    /// Shift left by the immediate.
    Shl,
    /// Load a sign-extended 16-bit immediate into the upper half.
    Lui,
}

impl ImmOpcode {
    pub fn opcode(self) -> Opcode {
        match self {
            ImmOpcode::Addiu => Opcode::Addiu,
            ImmOpcode::Ori => Opcode::Ori,
            ImmOpcode::Shl => Opcode::Shl,
            ImmOpcode::Lui => Opcode::Lui,
        }
    }
}

/// One step of a materialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmInst {
    pub opcode: ImmOpcode,
    /// 16-bit payload for addiu/ori/lui, shift amount for shl.
    pub imm: u64,
}

impl ImmInst {
    pub fn new(opcode: ImmOpcode, imm: u64) -> Self {
        Self { opcode, imm }
    }

    /// Apply this step to a register value.
    fn apply(self, value: u64) -> u64 {
        match self.opcode {
            ImmOpcode::Addiu => value.wrapping_add(sign_extend(16, self.imm) as u64),
            ImmOpcode::Ori => value | (self.imm & 0xffff),
            ImmOpcode::Shl => value << self.imm,
            ImmOpcode::Lui => (sign_extend(16, self.imm) as u64) << 16,
        }
    }
}

impl fmt::Display for ImmInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            ImmOpcode::Shl => write!(f, "{} {}", self.opcode.opcode(), self.imm),
            _ => write!(f, "{} {:#x}", self.opcode.opcode(), self.imm),
        }
    }
}

/// A sequence that materializes a constant, executed starting from a zero register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstSeq {
    insts: Vec<ImmInst>,
}

impl InstSeq {
    pub fn insts(&self) -> &[ImmInst] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImmInst> {
        self.insts.iter()
    }

    /// Value the sequence leaves in its register, truncated to `width` bits.
    pub fn evaluate(&self, width: u32) -> u64 {
        let value = self.insts.iter().fold(0u64, |value, inst| inst.apply(value));
        value & low_mask(width)
    }

    /// Lower the sequence to machine instructions writing `dst`.
    ///
    /// The first instruction reads `$zero`; the rest update `dst` in place.
    pub fn emit(&self, dst: Reg) -> Vec<MachineInst> {
        self.insts
            .iter()
            .enumerate()
            .map(|(i, inst)| {
                let src = if i == 0 { Reg::Zero } else { dst };
                let machine = MachineInst::new(inst.opcode.opcode()).reg(dst);
                match inst.opcode {
                    ImmOpcode::Addiu => machine.reg(src).imm(sign_extend(16, inst.imm)),
                    ImmOpcode::Ori => machine.reg(src).imm((inst.imm & 0xffff) as i64),
                    ImmOpcode::Shl => machine.reg(src).imm(inst.imm as i64),
                    ImmOpcode::Lui => machine.imm((inst.imm & 0xffff) as i64),
                }
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a InstSeq {
    type Item = &'a ImmInst;
    type IntoIter = std::slice::Iter<'a, ImmInst>;

    fn into_iter(self) -> Self::IntoIter {
        self.insts.iter()
    }
}

impl fmt::Display for InstSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for inst in &self.insts {
            writeln!(f, "{}", inst)?;
        }
        Ok(())
    }
}

/// Longest sequence the search can produce for a `width`-bit value: one
/// add/or per 16-bit chunk plus a shift between consecutive chunks.
pub fn max_sequence_len(width: u32) -> usize {
    let chunks = width.div_ceil(16) as usize;
    2 * chunks - 1
}

type SeqList<'b> = BumpVec<'b, BumpVec<'b, ImmInst>>;

struct Search<'b> {
    bump: &'b Bump,
    width: u32,
}

impl<'b> Search<'b> {
    /// Append `inst` to every candidate, or start the first candidate.
    fn add_instr(&self, list: &mut SeqList<'b>, inst: ImmInst) {
        if list.is_empty() {
            let mut seq = BumpVec::new_in(self.bump);
            seq.push(inst);
            list.push(seq);
            return;
        }
        for seq in list.iter_mut() {
            seq.push(inst);
        }
    }

    fn seq_ls_addiu(&self, imm: u64, rem: u32, list: &mut SeqList<'b>) {
        self.seq_ls(imm.wrapping_add(0x8000) & !0xffff, rem, list);
        self.add_instr(list, ImmInst::new(ImmOpcode::Addiu, imm & 0xffff));
    }

    fn seq_ls_ori(&self, imm: u64, rem: u32, list: &mut SeqList<'b>) {
        self.seq_ls(imm & !0xffff, rem, list);
        self.add_instr(list, ImmInst::new(ImmOpcode::Ori, imm & 0xffff));
    }

    fn seq_ls_shl(&self, imm: u64, rem: u32, list: &mut SeqList<'b>) {
        let shamt = imm.trailing_zeros();
        self.seq_ls(imm >> shamt, rem.saturating_sub(shamt), list);
        self.add_instr(list, ImmInst::new(ImmOpcode::Shl, shamt as u64));
    }

    /// Collect every candidate for `imm` with `rem` significant bits left.
    fn seq_ls(&self, imm: u64, rem: u32, list: &mut SeqList<'b>) {
        let masked = imm & low_mask(self.width);
        if masked == 0 {
            return;
        }

        if rem <= 16 {
            self.add_instr(list, ImmInst::new(ImmOpcode::Addiu, masked & 0xffff));
            return;
        }

        if masked & 0xffff == 0 {
            self.seq_ls_shl(masked, rem, list);
            return;
        }

        self.seq_ls_addiu(masked, rem, list);

        // With bit 15 clear, ori and addiu agree; only search the ori form otherwise.
        if masked & 0x8000 != 0 {
            let mut ori = BumpVec::new_in(self.bump);
            self.seq_ls_ori(masked, rem, &mut ori);
            list.extend(ori);
        }
    }
}

/// Fold a leading `addiu a; shl s` with `s >= 16` into `lui`.
fn fold_addiu_shl(seq: &mut BumpVec<'_, ImmInst>) {
    if seq.len() < 2
        || seq[0].opcode != ImmOpcode::Addiu
        || seq[1].opcode != ImmOpcode::Shl
        || seq[1].imm < 16
    {
        return;
    }

    let shifted = sign_extend(16, seq[0].imm).wrapping_shl((seq[1].imm - 16) as u32);
    if !is_int(16, shifted) {
        return;
    }

    seq[0] = ImmInst::new(ImmOpcode::Lui, (shifted as u64) & 0xffff);
    seq.remove(1);
}

/// Shortest sequence that leaves the low `width` bits of `value` in a register.
///
/// With `must_end_in_add` the last instruction is an addiu, which lets a caller
/// patch its immediate later. Zero materializes as a single `addiu 0`.
pub fn materialize(value: u64, width: u32, must_end_in_add: bool) -> Result<InstSeq, MaterializeError> {
    if width == 0 || width > 64 {
        return Err(MaterializeError::InvalidWidth { width });
    }

    let value = value & low_mask(width);
    let bump = Bump::new();
    let search = Search { bump: &bump, width };
    let mut list: SeqList<'_> = BumpVec::new_in(&bump);

    if must_end_in_add || value == 0 {
        search.seq_ls_addiu(value, width, &mut list);
    } else {
        search.seq_ls(value, width, &mut list);
    }

    for seq in list.iter_mut() {
        fold_addiu_shl(seq);
    }
    let mut best: Option<&BumpVec<'_, ImmInst>> = None;
    for seq in list.iter() {
        if best.map_or(true, |b| seq.len() < b.len()) {
            best = Some(seq);
        }
    }
    let insts: Vec<ImmInst> = best.map(|seq| seq.iter().copied().collect()).unwrap_or_default();

    let max = max_sequence_len(width);
    if insts.len() > max {
        return Err(MaterializeError::SequenceTooLong {
            value,
            len: insts.len(),
            max,
        });
    }

    Ok(InstSeq { insts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(seq: &InstSeq) -> Vec<(ImmOpcode, u64)> {
        seq.iter().map(|inst| (inst.opcode, inst.imm)).collect()
    }

    #[test]
    fn test_upper_and_lower_halves() {
        let seq = materialize(0x1234_5678, 32, false).unwrap();
        assert_eq!(
            ops(&seq),
            vec![(ImmOpcode::Lui, 0x1234), (ImmOpcode::Addiu, 0x5678)]
        );
    }

    #[test]
    fn test_zero_is_single_addiu() {
        let seq = materialize(0, 32, false).unwrap();
        assert_eq!(ops(&seq), vec![(ImmOpcode::Addiu, 0)]);
        assert_eq!(seq.evaluate(32), 0);
    }

    #[test]
    fn test_small_values() {
        assert_eq!(ops(&materialize(5, 32, false).unwrap()), vec![(ImmOpcode::Addiu, 5)]);
        // All ones is a sign-extended -1.
        assert_eq!(
            ops(&materialize(0xffff_ffff, 32, false).unwrap()),
            vec![(ImmOpcode::Addiu, 0xffff)]
        );
    }

    #[test]
    fn test_bit_15_prefers_ori() {
        let seq = materialize(0x8000, 32, false).unwrap();
        assert_eq!(ops(&seq), vec![(ImmOpcode::Ori, 0x8000)]);

        let seq = materialize(0x8000, 32, true).unwrap();
        assert_eq!(
            ops(&seq),
            vec![(ImmOpcode::Lui, 1), (ImmOpcode::Addiu, 0x8000)]
        );
        assert_eq!(seq.evaluate(32), 0x8000);
    }

    #[test]
    fn test_upper_half_only() {
        let seq = materialize(0xffff_0000, 32, false).unwrap();
        assert_eq!(ops(&seq), vec![(ImmOpcode::Lui, 0xffff)]);
        assert_eq!(seq.evaluate(32), 0xffff_0000);
    }

    #[test]
    fn test_wide_value_uses_shift() {
        let seq = materialize(0xffff << 32, 64, false).unwrap();
        assert_eq!(ops(&seq), vec![(ImmOpcode::Ori, 0xffff), (ImmOpcode::Shl, 32)]);
        assert_eq!(seq.evaluate(64), 0xffff << 32);
    }

    #[test]
    fn test_invalid_width() {
        assert_eq!(
            materialize(1, 0, false),
            Err(MaterializeError::InvalidWidth { width: 0 })
        );
        assert_eq!(
            materialize(1, 65, false),
            Err(MaterializeError::InvalidWidth { width: 65 })
        );
    }

    #[test]
    fn test_value_is_truncated_to_width() {
        let seq = materialize(0x1_0000_0005, 32, false).unwrap();
        assert_eq!(ops(&seq), vec![(ImmOpcode::Addiu, 5)]);
    }

    #[test]
    fn test_emit_machine_instructions() {
        let seq = materialize(0x1234_5678, 32, false).unwrap();
        let insts = seq.emit(Reg::T0);
        assert_eq!(
            insts,
            vec![
                MachineInst::new(Opcode::Lui).reg(Reg::T0).imm(0x1234),
                MachineInst::new(Opcode::Addiu).reg(Reg::T0).reg(Reg::T0).imm(0x5678),
            ]
        );

        let insts = materialize(0xffff_ffff, 32, false).unwrap().emit(Reg::V0);
        assert_eq!(
            insts,
            vec![MachineInst::new(Opcode::Addiu).reg(Reg::V0).reg(Reg::Zero).imm(-1)]
        );
    }

    #[test]
    fn test_display() {
        let seq = materialize(0x1234_5678, 32, false).unwrap();
        assert_eq!(seq.to_string(), "lui 0x1234\naddiu 0x5678\n");
    }

    #[test]
    fn test_max_sequence_len() {
        assert_eq!(max_sequence_len(16), 1);
        assert_eq!(max_sequence_len(32), 3);
        assert_eq!(max_sequence_len(64), 7);
    }
}
