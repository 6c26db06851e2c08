// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Per-instruction value semantics: the expression each written base receives.

use super::types::{BinaryOp, SsaBase, SsaExpr, SsaState};
use crate::instruction::{Instruction, Op, Operand};
use std::collections::BTreeMap;

fn current(state: &SsaState, base: SsaBase) -> SsaExpr {
    state
        .get(base)
        .map_or(SsaExpr::Param(base), |value| value.as_operand())
}

fn byte(expr: SsaExpr) -> SsaExpr {
    SsaExpr::binary(BinaryOp::And, expr, SsaExpr::Const(0xFF))
}

fn bit_set(expr: SsaExpr, mask: u8) -> SsaExpr {
    SsaExpr::binary(
        BinaryOp::Ne,
        SsaExpr::binary(BinaryOp::And, expr, SsaExpr::Const(mask)),
        SsaExpr::Const(0),
    )
}

fn is_zero(expr: SsaExpr) -> SsaExpr {
    SsaExpr::binary(BinaryOp::Eq, expr, SsaExpr::Const(0))
}

/// The value read by an instruction's operand.
fn operand_value(operand: &Operand, state: &SsaState) -> SsaExpr {
    match operand {
        Operand::Immediate(value) => SsaExpr::Const(*value),
        Operand::Address(address) => SsaExpr::Memory {
            address: *address,
            index: None,
        },
        Operand::AddressX(address) | Operand::AddressY(address) => SsaExpr::Memory {
            address: *address,
            index: operand
                .index_register()
                .and_then(|index| state.get(index))
                .map(|value| value.name()),
        },
        Operand::Label(label) => SsaExpr::Symbol(label.clone()),
        Operand::Implied | Operand::Accumulator => current(state, SsaBase::RegisterA),
    }
}

/// Sets `target` and the Z/N flags from `result`.
fn load(defs: &mut BTreeMap<SsaBase, SsaExpr>, target: Option<SsaBase>, result: SsaExpr) {
    defs.insert(SsaBase::FlagZero, is_zero(result.clone()));
    defs.insert(SsaBase::FlagNegative, bit_set(result.clone(), 0x80));
    if let Some(target) = target {
        defs.insert(target, result);
    }
}

/// Binary add with carry, shared by ADC and SBC (which adds the complement).
fn add_with_carry(defs: &mut BTreeMap<SsaBase, SsaExpr>, a: SsaExpr, m: SsaExpr, carry: SsaExpr) {
    let sum = SsaExpr::binary(BinaryOp::Add, SsaExpr::binary(BinaryOp::Add, a.clone(), m.clone()), carry);
    let result = byte(sum.clone());
    defs.insert(
        SsaBase::FlagCarry,
        SsaExpr::binary(BinaryOp::Gt, sum, SsaExpr::Const(0xFF)),
    );
    // Signed overflow: both operands differ in sign from the result.
    let overflow = SsaExpr::binary(
        BinaryOp::And,
        SsaExpr::binary(BinaryOp::Xor, a, result.clone()),
        SsaExpr::binary(BinaryOp::Xor, m, result.clone()),
    );
    defs.insert(SsaBase::FlagOverflow, bit_set(overflow, 0x80));
    load(defs, Some(SsaBase::RegisterA), result);
}

/// The expressions `instr` assigns to the bases it writes, evaluated against
/// the state in front of it. Written bases without a modelled effect are
/// clobbered.
pub fn definitions(instr: &Instruction, state: &SsaState) -> Vec<(SsaBase, SsaExpr)> {
    use SsaBase::*;
    let a = || current(state, RegisterA);
    let x = || current(state, RegisterX);
    let y = || current(state, RegisterY);
    let carry = || current(state, FlagCarry);
    let m = || operand_value(&instr.operand, state);
    let mut defs: BTreeMap<SsaBase, SsaExpr> = BTreeMap::new();

    match instr.op {
        Op::Lda => load(&mut defs, Some(RegisterA), m()),
        Op::Ldx => load(&mut defs, Some(RegisterX), m()),
        Op::Ldy => load(&mut defs, Some(RegisterY), m()),
        Op::Tax => load(&mut defs, Some(RegisterX), a()),
        Op::Tay => load(&mut defs, Some(RegisterY), a()),
        Op::Txa => load(&mut defs, Some(RegisterA), x()),
        Op::Tya => load(&mut defs, Some(RegisterA), y()),
        Op::Tsx => load(&mut defs, Some(RegisterX), SsaExpr::StackPointer),
        Op::Pla => load(&mut defs, Some(RegisterA), SsaExpr::StackPull(RegisterA)),
        Op::Plp => {
            for flag in [FlagZero, FlagNegative, FlagCarry, FlagOverflow] {
                defs.insert(flag, SsaExpr::StackPull(flag));
            }
        }
        Op::Inx => load(&mut defs, Some(RegisterX), byte(SsaExpr::binary(BinaryOp::Add, x(), SsaExpr::Const(1)))),
        Op::Dex => load(&mut defs, Some(RegisterX), byte(SsaExpr::binary(BinaryOp::Sub, x(), SsaExpr::Const(1)))),
        Op::Iny => load(&mut defs, Some(RegisterY), byte(SsaExpr::binary(BinaryOp::Add, y(), SsaExpr::Const(1)))),
        Op::Dey => load(&mut defs, Some(RegisterY), byte(SsaExpr::binary(BinaryOp::Sub, y(), SsaExpr::Const(1)))),
        Op::Inc => load(&mut defs, None, byte(SsaExpr::binary(BinaryOp::Add, m(), SsaExpr::Const(1)))),
        Op::Dec => load(&mut defs, None, byte(SsaExpr::binary(BinaryOp::Sub, m(), SsaExpr::Const(1)))),
        Op::And => load(&mut defs, Some(RegisterA), SsaExpr::binary(BinaryOp::And, a(), m())),
        Op::Ora => load(&mut defs, Some(RegisterA), SsaExpr::binary(BinaryOp::Or, a(), m())),
        Op::Eor => load(&mut defs, Some(RegisterA), SsaExpr::binary(BinaryOp::Xor, a(), m())),
        Op::Adc => add_with_carry(&mut defs, a(), m(), carry()),
        Op::Sbc => add_with_carry(
            &mut defs,
            a(),
            SsaExpr::binary(BinaryOp::Xor, m(), SsaExpr::Const(0xFF)),
            carry(),
        ),
        Op::Cmp | Op::Cpx | Op::Cpy => {
            let register = match instr.op {
                Op::Cmp => a(),
                Op::Cpx => x(),
                _ => y(),
            };
            defs.insert(FlagCarry, SsaExpr::binary(BinaryOp::Ge, register.clone(), m()));
            defs.insert(FlagZero, SsaExpr::binary(BinaryOp::Eq, register.clone(), m()));
            defs.insert(
                FlagNegative,
                bit_set(SsaExpr::binary(BinaryOp::Sub, register, m()), 0x80),
            );
        }
        Op::Bit => {
            defs.insert(FlagZero, is_zero(SsaExpr::binary(BinaryOp::And, a(), m())));
            defs.insert(FlagNegative, bit_set(m(), 0x80));
            defs.insert(FlagOverflow, bit_set(m(), 0x40));
        }
        Op::Asl | Op::Lsr | Op::Rol | Op::Ror => {
            let before = m();
            let target = (!instr.operand.is_memory()).then_some(RegisterA);
            let (result, carry_out) = match instr.op {
                Op::Asl => (
                    byte(SsaExpr::binary(BinaryOp::Shl, before.clone(), SsaExpr::Const(1))),
                    bit_set(before, 0x80),
                ),
                Op::Rol => (
                    byte(SsaExpr::binary(
                        BinaryOp::Or,
                        SsaExpr::binary(BinaryOp::Shl, before.clone(), SsaExpr::Const(1)),
                        carry(),
                    )),
                    bit_set(before, 0x80),
                ),
                Op::Lsr => (
                    SsaExpr::binary(BinaryOp::Shr, before.clone(), SsaExpr::Const(1)),
                    bit_set(before, 0x01),
                ),
                _ => (
                    SsaExpr::binary(
                        BinaryOp::Or,
                        SsaExpr::binary(BinaryOp::Shr, before.clone(), SsaExpr::Const(1)),
                        SsaExpr::binary(BinaryOp::Shl, carry(), SsaExpr::Const(7)),
                    ),
                    bit_set(before, 0x01),
                ),
            };
            load(&mut defs, target, result);
            defs.insert(FlagCarry, carry_out);
            if instr.op == Op::Lsr {
                defs.insert(FlagNegative, SsaExpr::Bool(false));
            }
        }
        Op::Sec => {
            defs.insert(FlagCarry, SsaExpr::Bool(true));
        }
        Op::Clc => {
            defs.insert(FlagCarry, SsaExpr::Bool(false));
        }
        Op::Clv => {
            defs.insert(FlagOverflow, SsaExpr::Bool(false));
        }
        _ => {}
    }

    let callee = instr.operand.label().map(str::to_string);
    instr
        .affects
        .writes
        .iter()
        .map(|base| {
            let expr = defs.remove(&base).unwrap_or_else(|| SsaExpr::Clobbered {
                callee: callee.clone(),
                base,
            });
            (base, expr)
        })
        .collect()
}
