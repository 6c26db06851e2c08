// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Decoded 6502 instructions.
//!
//! Block formation hands each instruction over already decoded: an opcode, an
//! operand and the set of tracked machine-state slots it reads and writes. The
//! default effect table lives here; callers may narrow `writes` per call site
//! (for example a `JSR` whose callee is known to clobber only `A`).

use crate::ssa::{BaseSet, SsaBase};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 6502 mnemonics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        use Op::*;
        match self {
            Adc => "ADC",
            And => "AND",
            Asl => "ASL",
            Bcc => "BCC",
            Bcs => "BCS",
            Beq => "BEQ",
            Bit => "BIT",
            Bmi => "BMI",
            Bne => "BNE",
            Bpl => "BPL",
            Brk => "BRK",
            Bvc => "BVC",
            Bvs => "BVS",
            Clc => "CLC",
            Cld => "CLD",
            Cli => "CLI",
            Clv => "CLV",
            Cmp => "CMP",
            Cpx => "CPX",
            Cpy => "CPY",
            Dec => "DEC",
            Dex => "DEX",
            Dey => "DEY",
            Eor => "EOR",
            Inc => "INC",
            Inx => "INX",
            Iny => "INY",
            Jmp => "JMP",
            Jsr => "JSR",
            Lda => "LDA",
            Ldx => "LDX",
            Ldy => "LDY",
            Lsr => "LSR",
            Nop => "NOP",
            Ora => "ORA",
            Pha => "PHA",
            Php => "PHP",
            Pla => "PLA",
            Plp => "PLP",
            Rol => "ROL",
            Ror => "ROR",
            Rti => "RTI",
            Rts => "RTS",
            Sbc => "SBC",
            Sec => "SEC",
            Sed => "SED",
            Sei => "SEI",
            Sta => "STA",
            Stx => "STX",
            Sty => "STY",
            Tax => "TAX",
            Tay => "TAY",
            Tsx => "TSX",
            Txa => "TXA",
            Txs => "TXS",
            Tya => "TYA",
        }
    }

    /// Conditional branches.
    pub fn is_branch(self) -> bool {
        self.branch_flag().is_some()
    }

    pub fn is_jump(self) -> bool {
        self == Op::Jmp
    }

    /// Instructions that leave the function (or halt it).
    pub fn is_return(self) -> bool {
        matches!(self, Op::Rts | Op::Rti | Op::Brk)
    }

    /// Instructions that only transfer control and carry no data effect.
    pub fn is_control(self) -> bool {
        self.is_branch() || self.is_jump() || self.is_return()
    }

    pub fn is_compare(self) -> bool {
        matches!(self, Op::Cmp | Op::Cpx | Op::Cpy | Op::Bit)
    }

    /// The flag a conditional branch tests.
    pub fn branch_flag(self) -> Option<SsaBase> {
        match self {
            Op::Beq | Op::Bne => Some(SsaBase::FlagZero),
            Op::Bcs | Op::Bcc => Some(SsaBase::FlagCarry),
            Op::Bmi | Op::Bpl => Some(SsaBase::FlagNegative),
            Op::Bvs | Op::Bvc => Some(SsaBase::FlagOverflow),
            _ => None,
        }
    }

    /// The flag value for which a conditional branch is taken.
    pub fn branch_polarity(self) -> Option<bool> {
        match self {
            Op::Beq | Op::Bcs | Op::Bmi | Op::Bvs => Some(true),
            Op::Bne | Op::Bcc | Op::Bpl | Op::Bvc => Some(false),
            _ => None,
        }
    }

    /// Whether `self` and `other` test the same flag with opposite polarity, so
    /// that exactly one of them is taken.
    pub fn complements(self, other: Op) -> bool {
        match (self.branch_flag(), other.branch_flag()) {
            (Some(a), Some(b)) => a == b && self.branch_polarity() != other.branch_polarity(),
            _ => false,
        }
    }

    /// Instructions counted as loop-body work when they appear in a loop
    /// header ahead of its test. Loads and compares only set up the
    /// condition.
    pub fn modifies_loop_state(self) -> bool {
        matches!(
            self,
            Op::Inx
                | Op::Iny
                | Op::Dex
                | Op::Dey
                | Op::Inc
                | Op::Dec
                | Op::Asl
                | Op::Lsr
                | Op::Rol
                | Op::Ror
                | Op::Sta
                | Op::Stx
                | Op::Sty
                | Op::Tax
                | Op::Tay
                | Op::Txa
                | Op::Tya
                | Op::Pha
                | Op::Php
                | Op::Pla
                | Op::Plp
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Addressing information kept for an instruction. Only the forms needed to
/// describe tracked-state effects are distinguished.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    #[default]
    Implied,
    Accumulator,
    Immediate(u8),
    Address(u16),
    AddressX(u16),
    AddressY(u16),
    /// A symbolic target: branch/jump destinations, subroutines, or named
    /// memory locations.
    Label(String),
}

impl Operand {
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Operand::Address(_) | Operand::AddressX(_) | Operand::AddressY(_) | Operand::Label(_)
        )
    }

    pub fn index_register(&self) -> Option<SsaBase> {
        match self {
            Operand::AddressX(_) => Some(SsaBase::RegisterX),
            Operand::AddressY(_) => Some(SsaBase::RegisterY),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Operand::Label(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Implied => Ok(()),
            Operand::Accumulator => write!(f, "A"),
            Operand::Immediate(v) => write!(f, "#${:02X}", v),
            Operand::Address(a) => write!(f, "${:04X}", a),
            Operand::AddressX(a) => write!(f, "${:04X},X", a),
            Operand::AddressY(a) => write!(f, "${:04X},Y", a),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}

/// Tracked state read and written by one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Affects {
    pub reads: BaseSet,
    pub writes: BaseSet,
}

impl Affects {
    /// The built-in effect table.
    pub fn of(op: Op, operand: &Operand) -> Self {
        use SsaBase::*;
        let nz = BaseSet::of(&[FlagZero, FlagNegative]);
        let mut reads = BaseSet::empty();
        let mut writes = BaseSet::empty();
        if let Some(index) = operand.index_register() {
            reads.insert(index);
        }
        match op {
            Op::Lda => writes = nz.with(RegisterA),
            Op::Ldx => writes = nz.with(RegisterX),
            Op::Ldy => writes = nz.with(RegisterY),
            Op::Sta => reads.insert(RegisterA),
            Op::Stx => reads.insert(RegisterX),
            Op::Sty => reads.insert(RegisterY),
            Op::Tax | Op::Tay => {
                reads.insert(RegisterA);
                writes = nz.with(if op == Op::Tax { RegisterX } else { RegisterY });
            }
            Op::Txa => {
                reads.insert(RegisterX);
                writes = nz.with(RegisterA);
            }
            Op::Tya => {
                reads.insert(RegisterY);
                writes = nz.with(RegisterA);
            }
            Op::Tsx => writes = nz.with(RegisterX),
            Op::Txs => reads.insert(RegisterX),
            Op::Inx | Op::Dex => {
                reads.insert(RegisterX);
                writes = nz.with(RegisterX);
            }
            Op::Iny | Op::Dey => {
                reads.insert(RegisterY);
                writes = nz.with(RegisterY);
            }
            Op::Adc | Op::Sbc => {
                reads = reads.with(RegisterA).with(FlagCarry);
                writes = nz.with(RegisterA).with(FlagCarry).with(FlagOverflow);
            }
            Op::And | Op::Ora | Op::Eor => {
                reads.insert(RegisterA);
                writes = nz.with(RegisterA);
            }
            Op::Asl | Op::Lsr | Op::Rol | Op::Ror => {
                if matches!(op, Op::Rol | Op::Ror) {
                    reads.insert(FlagCarry);
                }
                writes = nz.with(FlagCarry);
                if !operand.is_memory() {
                    reads.insert(RegisterA);
                    writes.insert(RegisterA);
                }
            }
            Op::Cmp | Op::Cpx | Op::Cpy => {
                reads.insert(match op {
                    Op::Cmp => RegisterA,
                    Op::Cpx => RegisterX,
                    _ => RegisterY,
                });
                writes = nz.with(FlagCarry);
            }
            Op::Bit => {
                reads.insert(RegisterA);
                writes = nz.with(FlagOverflow);
            }
            Op::Inc | Op::Dec => writes = nz,
            Op::Sec | Op::Clc => writes.insert(FlagCarry),
            Op::Clv => writes.insert(FlagOverflow),
            Op::Pha => reads.insert(RegisterA),
            Op::Php => reads = BaseSet::flags(),
            Op::Pla => writes = nz.with(RegisterA),
            Op::Plp => writes = BaseSet::flags(),
            Op::Jsr => {
                reads = BaseSet::all();
                writes = BaseSet::all();
            }
            op if op.is_branch() => {
                if let Some(flag) = op.branch_flag() {
                    reads.insert(flag);
                }
            }
            _ => {}
        }
        Affects { reads, writes }
    }
}

/// One decoded instruction and its effect on tracked state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operand: Operand,
    pub affects: Affects,
}

impl Instruction {
    pub fn new(op: Op, operand: Operand) -> Self {
        let affects = Affects::of(op, &operand);
        Self {
            op,
            operand,
            affects,
        }
    }

    pub fn implied(op: Op) -> Self {
        Self::new(op, Operand::Implied)
    }

    /// Replaces the written set, e.g. with a callee's clobber summary.
    pub fn with_writes(mut self, writes: BaseSet) -> Self {
        self.affects.writes = writes;
        self
    }

    pub fn writes(&self, base: SsaBase) -> bool {
        self.affects.writes.contains(base)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::Implied => write!(f, "{}", self.op),
            _ => write!(f, "{} {}", self.op, self.operand),
        }
    }
}
