//! Cpu0 general purpose registers.
//!
//! Only the register names matter at this level: the legalization passes run after
//! register allocation, so operands already name physical registers.

use std::fmt;

/// Physical Cpu0 register, in hardware numbering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Zero,
    At,
    V0,
    V1,
    A0,
    A1,
    T9,
    T0,
    T1,
    S0,
    S1,
    Gp,
    Fp,
    Sp,
    Lr,
    Sw,
}

impl Reg {
    pub const ALL: [Reg; 16] = [
        Reg::Zero, Reg::At, Reg::V0, Reg::V1, Reg::A0, Reg::A1, Reg::T9, Reg::T0,
        Reg::T1, Reg::S0, Reg::S1, Reg::Gp, Reg::Fp, Reg::Sp, Reg::Lr, Reg::Sw,
    ];

    /// Assembly name without the `$` sigil.
    pub fn name(self) -> &'static str {
        match self {
            Reg::Zero => "zero",
            Reg::At => "at",
            Reg::V0 => "v0",
            Reg::V1 => "v1",
            Reg::A0 => "a0",
            Reg::A1 => "a1",
            Reg::T9 => "t9",
            Reg::T0 => "t0",
            Reg::T1 => "t1",
            Reg::S0 => "s0",
            Reg::S1 => "s1",
            Reg::Gp => "gp",
            Reg::Fp => "fp",
            Reg::Sp => "sp",
            Reg::Lr => "lr",
            Reg::Sw => "sw",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|reg| reg.name() == name)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names_round_trip() {
        for reg in Reg::ALL {
            assert_eq!(Reg::from_name(reg.name()), Some(reg));
        }
        assert_eq!(Reg::from_name("r99"), None);
    }

    #[test]
    fn test_register_display() {
        assert_eq!(Reg::Zero.to_string(), "$zero");
        assert_eq!(Reg::Lr.to_string(), "$lr");
    }
}
