//! Cpu0 opcodes and their static descriptions.
//!
//! Every opcode carries an [`OpInfo`] record with the properties the legalization
//! passes query: branch kind, barrier, delay slot and encoded size.

use std::fmt;

/// Width of every real Cpu0 instruction in bytes.
pub const INST_WORD_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Addiu,
    Addu,
    Subu,
    Ori,
    Shl,
    Lui,
    Ld,
    St,
    Cmp,
    Beq,
    Bne,
    Jeq,
    Jne,
    Jlt,
    Jge,
    Jgt,
    Jle,
    Jmp,
    Bal,
    Jr,
    Ret,
    Nop,
    /// `lui` whose immediate is `%hi(target - anchor)`, resolved at fixup time.
    LongBranchLui,
    /// `addiu` whose immediate is `%lo(target - anchor)`, resolved at fixup time.
    LongBranchAddiu,
    DbgValue,
}

#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub is_branch: bool,
    pub is_conditional: bool,
    pub is_indirect: bool,
    /// Control never falls through to the next instruction.
    pub is_barrier: bool,
    pub is_return: bool,
    pub is_debug: bool,
    pub delay_slot: bool,
    pub size: u64,
}

impl OpInfo {
    const fn plain(name: &'static str) -> Self {
        OpInfo {
            name,
            is_branch: false,
            is_conditional: false,
            is_indirect: false,
            is_barrier: false,
            is_return: false,
            is_debug: false,
            delay_slot: false,
            size: INST_WORD_BYTES,
        }
    }

    const fn cond_branch(name: &'static str, delay_slot: bool) -> Self {
        OpInfo {
            is_branch: true,
            is_conditional: true,
            delay_slot,
            ..OpInfo::plain(name)
        }
    }
}

impl Opcode {
    pub const ALL: [Opcode; 25] = [
        Opcode::Addiu,
        Opcode::Addu,
        Opcode::Subu,
        Opcode::Ori,
        Opcode::Shl,
        Opcode::Lui,
        Opcode::Ld,
        Opcode::St,
        Opcode::Cmp,
        Opcode::Beq,
        Opcode::Bne,
        Opcode::Jeq,
        Opcode::Jne,
        Opcode::Jlt,
        Opcode::Jge,
        Opcode::Jgt,
        Opcode::Jle,
        Opcode::Jmp,
        Opcode::Bal,
        Opcode::Jr,
        Opcode::Ret,
        Opcode::Nop,
        Opcode::LongBranchLui,
        Opcode::LongBranchAddiu,
        Opcode::DbgValue,
    ];

    pub const fn info(self) -> OpInfo {
        use Opcode::*;
        match self {
            Addiu => OpInfo::plain("addiu"),
            Addu => OpInfo::plain("addu"),
            Subu => OpInfo::plain("subu"),
            Ori => OpInfo::plain("ori"),
            Shl => OpInfo::plain("shl"),
            Lui => OpInfo::plain("lui"),
            Ld => OpInfo::plain("ld"),
            St => OpInfo::plain("st"),
            Cmp => OpInfo::plain("cmp"),
            Beq => OpInfo::cond_branch("beq", true),
            Bne => OpInfo::cond_branch("bne", true),
            Jeq => OpInfo::cond_branch("jeq", false),
            Jne => OpInfo::cond_branch("jne", false),
            Jlt => OpInfo::cond_branch("jlt", false),
            Jge => OpInfo::cond_branch("jge", false),
            Jgt => OpInfo::cond_branch("jgt", false),
            Jle => OpInfo::cond_branch("jle", false),
            Jmp => OpInfo { is_branch: true, is_barrier: true, delay_slot: true, ..OpInfo::plain("jmp") },
            Bal => OpInfo { is_branch: true, is_barrier: true, ..OpInfo::plain("bal") },
            Jr => OpInfo {
                is_branch: true,
                is_indirect: true,
                is_barrier: true,
                delay_slot: true,
                ..OpInfo::plain("jr")
            },
            Ret => OpInfo { is_return: true, is_barrier: true, ..OpInfo::plain("ret") },
            Nop => OpInfo::plain("nop"),
            LongBranchLui => OpInfo::plain("long_branch_lui"),
            LongBranchAddiu => OpInfo::plain("long_branch_addiu"),
            DbgValue => OpInfo { is_debug: true, size: 0, ..OpInfo::plain("dbg_value") },
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == s)
    }

    /// Branch testing the inverse condition, if this is a conditional branch.
    pub fn opposite_branch(self) -> Option<Self> {
        use Opcode::*;
        match self {
            Beq => Some(Bne),
            Bne => Some(Beq),
            Jeq => Some(Jne),
            Jne => Some(Jeq),
            Jlt => Some(Jge),
            Jge => Some(Jlt),
            Jgt => Some(Jle),
            Jle => Some(Jgt),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
