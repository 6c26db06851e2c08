// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Runs each structured function and checks it against the block graph.

mod common;

use common::*;
use mos6502_flow::control_flow_structuring::{ControlNode, LoopKind};
use mos6502_flow::instruction::Op;
use mos6502_flow::listing::Listing;
use mos6502_flow::ssa::{BaseSet, SsaBase};

fn memory(address: u16, bytes: &[u8]) -> Machine {
    Machine::default().with_memory(address, bytes)
}

#[test]
fn test_straight_line_arithmetic() {
    let listing = Listing::new().block(
        "main",
        vec![
            abs(Op::Lda, 0x10),
            op(Op::Clc),
            imm(Op::Adc, 0x05),
            abs(Op::Sta, 0x11),
            op(Op::Tax),
            op(Op::Inx),
            abs(Op::Stx, 0x12),
            imm(Op::Sbc, 0x40),
            op(Op::Rts),
        ],
    );
    let (_, analysis) = assert_round_trip(
        listing,
        &[memory(0x10, &[0x00]), memory(0x10, &[0x7D]), memory(0x10, &[0xFE])],
    );
    assert!(analysis.ssa.phi_nodes.is_empty());
    assert_eq!(analysis.control_nodes.len(), 1);
}

#[test]
fn test_if_then_with_empty_else() {
    let listing = Listing::new()
        .block("start", vec![abs(Op::Lda, 0x10), imm(Op::Cmp, 0x80), to(Op::Bcc, "join")])
        .block("big", vec![imm(Op::Lda, 0xFF), abs(Op::Sta, 0x11)])
        .block("join", vec![abs(Op::Ldx, 0x11), op(Op::Rts)]);
    let (_, analysis) = assert_round_trip(listing, &[memory(0x10, &[0x10]), memory(0x10, &[0x90])]);
    assert!(analysis.structure.report.is_fully_structured());
    assert!(matches!(
        &analysis.control_nodes[1],
        ControlNode::If { else_nodes, .. } if else_nodes.is_empty()
    ));
}

#[test]
fn test_while_loop_sums_table() {
    let listing = Listing::new()
        .block("start", vec![imm(Op::Ldx, 0), imm(Op::Lda, 0)])
        .block("head", vec![abs(Op::Cpx, 0x10), to(Op::Beq, "done")])
        .block("body", vec![op(Op::Clc), abs_x(Op::Adc, 0x20), op(Op::Inx), to(Op::Jmp, "head")])
        .block("done", vec![abs(Op::Sta, 0x11), op(Op::Rts)]);
    let (_, analysis) = assert_round_trip(
        listing,
        &[
            memory(0x10, &[0]),
            memory(0x10, &[3]).with_memory(0x20, &[1, 2, 3]),
            memory(0x10, &[4]).with_memory(0x20, &[0x80, 0x80, 0x7F, 0x01]),
        ],
    );
    assert!(analysis
        .control_nodes
        .iter()
        .any(|n| matches!(n, ControlNode::Loop { kind: LoopKind::PreTest, .. })));
}

#[test]
fn test_do_while_countdown() {
    let listing = Listing::new()
        .block("start", vec![imm(Op::Ldy, 4), imm(Op::Lda, 0)])
        .block("loop", vec![op(Op::Clc), imm(Op::Adc, 3), op(Op::Dey), to(Op::Bne, "loop")])
        .block("done", vec![abs(Op::Sta, 0x11), op(Op::Rts)]);
    let (_, analysis) = assert_round_trip(listing, &[Machine::default()]);
    assert!(analysis
        .control_nodes
        .iter()
        .any(|n| matches!(n, ControlNode::Loop { kind: LoopKind::PostTest, .. })));
}

#[test]
fn test_shift_then_branch_on_carry() {
    let listing = Listing::new()
        .block("start", vec![abs(Op::Lda, 0x10), acc(Op::Lsr), to(Op::Bcc, "even")])
        .block("odd", vec![imm(Op::Ldx, 1), to(Op::Jmp, "out")])
        .block("even", vec![imm(Op::Ldx, 2), abs(Op::Asl, 0x10)])
        .block("out", vec![abs(Op::Stx, 0x11), op(Op::Rts)]);
    let (program, analysis) = assert_round_trip(
        listing,
        &[memory(0x10, &[0x04]), memory(0x10, &[0x05]), memory(0x10, &[0xC2])],
    );
    assert!(analysis.structure.region.summarize(&program.cfg, 0).contains("IF_THEN_ELSE"));
}

#[test]
fn test_complementary_branches_skip_dead_code() {
    let listing = Listing::new()
        .block("start", vec![abs(Op::Lda, 0x10), to(Op::Bpl, "pos")])
        .block("minus", vec![to(Op::Bmi, "neg")])
        .block("dead", vec![imm(Op::Ldx, 0xEE)])
        .block("pos", vec![imm(Op::Ldx, 1), abs(Op::Stx, 0x11), op(Op::Rts)])
        .block("neg", vec![imm(Op::Ldx, 2), abs(Op::Stx, 0x11), op(Op::Rts)]);
    let (program, analysis) = assert_round_trip(listing, &[memory(0x10, &[0x01]), memory(0x10, &[0x81])]);
    let dead = program.cfg.block_by_label("dead").unwrap();
    assert!(analysis.control_nodes.iter().any(|n| n.contains_block(dead)));
    assert!(analysis.structure.report.is_complete());
}

#[test]
fn test_branch_and_fall_through_into_complementary_branch() {
    // Both edges of `count` enter `again`, so the fall-through of `again` is live.
    let listing = Listing::new()
        .block("count", vec![op(Op::Inx), op(Op::Txa), to(Op::Beq, "again")])
        .block("again", vec![to(Op::Bne, "count")])
        .block("out", vec![abs(Op::Stx, 0x11), op(Op::Rts)]);
    let (program, analysis) = assert_round_trip(
        listing,
        &[
            Machine::default().with_register(SsaBase::RegisterX, 0xFD),
            Machine::default().with_register(SsaBase::RegisterX, 0xFF),
        ],
    );
    let out = program.cfg.block_by_label("out").unwrap();
    assert!(analysis.control_nodes.iter().any(|n| n.contains_block(out)));
    assert!(!analysis.structure.region.summarize(&program.cfg, 0).contains("LOOSE"));
    assert!(analysis.structure.report.is_fully_structured());
}

#[test]
fn test_loop_with_two_back_edges() {
    let listing = Listing::new()
        .block("start", vec![imm(Op::Ldx, 0), imm(Op::Ldy, 0)])
        .block("head", vec![op(Op::Inx), abs(Op::Cpx, 0x10), to(Op::Beq, "done")])
        .block("body", vec![op(Op::Txa), imm(Op::And, 1), to(Op::Beq, "even")])
        .block("odd", vec![op(Op::Iny), to(Op::Jmp, "head")])
        .block("even", vec![op(Op::Iny), op(Op::Iny), to(Op::Jmp, "head")])
        .block("done", vec![abs(Op::Sty, 0x11), op(Op::Rts)]);
    let (program, analysis) = assert_round_trip(listing, &[memory(0x10, &[1]), memory(0x10, &[5])]);
    let head = program.cfg.block_by_label("head").unwrap();
    let y_phi = analysis
        .ssa
        .phis_at(head)
        .iter()
        .find(|p| p.target == SsaBase::RegisterY)
        .unwrap();
    assert_eq!(y_phi.sources.len(), 3);
    assert!(analysis.structure.region.is_fully_structured());
}

#[test]
fn test_compare_chain_switch() {
    let listing = Listing::new()
        .block("dispatch", vec![abs(Op::Lda, 0x10), imm(Op::Cmp, 0), to(Op::Beq, "zero")])
        .block("test1", vec![imm(Op::Cmp, 1), to(Op::Beq, "one")])
        .block("test2", vec![imm(Op::Cmp, 2), to(Op::Beq, "two")])
        .block("other", vec![imm(Op::Ldx, 9), to(Op::Jmp, "end")])
        .block("zero", vec![imm(Op::Ldx, 1), to(Op::Jmp, "end")])
        .block("one", vec![imm(Op::Ldx, 2), to(Op::Jmp, "end")])
        .block("two", vec![imm(Op::Ldx, 3)])
        .block("end", vec![abs(Op::Stx, 0x11), op(Op::Rts)]);
    let inputs: Vec<Machine> = [0u8, 1, 2, 7].iter().map(|v| memory(0x10, &[*v])).collect();
    let (_, analysis) = assert_round_trip(listing, &inputs);
    assert!(analysis
        .control_nodes
        .iter()
        .any(|n| matches!(n, ControlNode::Switch { cases, .. } if cases.len() == 3)));
}

#[test]
fn test_irreducible_cycle_falls_back_to_goto() {
    let listing = Listing::new()
        .block("start", vec![imm(Op::Ldx, 0), abs(Op::Lda, 0x10), to(Op::Beq, "b")])
        .block("a", vec![op(Op::Inx), imm(Op::Cpx, 4), to(Op::Bcs, "out")])
        .block("b", vec![op(Op::Inx), op(Op::Inx), imm(Op::Cpx, 4), to(Op::Bcc, "a")])
        .block("out", vec![abs(Op::Stx, 0x11), op(Op::Rts)]);
    let (_, analysis) = assert_round_trip(listing, &[memory(0x10, &[0]), memory(0x10, &[5])]);
    assert!(analysis.loops.is_empty());
    assert!(!analysis.structure.region.is_fully_structured());
    assert!(analysis.structure.report.is_complete());
}

#[test]
fn test_loop_at_function_entry() {
    let listing = Listing::new()
        .block("top", vec![op(Op::Dey), abs(Op::Sty, 0x11), to(Op::Bne, "top")])
        .block("out", vec![op(Op::Rts)])
        .function("countdown", "top", BaseSet::of(&[SsaBase::RegisterY]), BaseSet::empty());
    let (_, analysis) = assert_round_trip(
        listing,
        &[
            Machine::default().with_register(SsaBase::RegisterY, 3),
            Machine::default().with_register(SsaBase::RegisterY, 1),
        ],
    );
    let y = analysis
        .phi_elimination
        .declarations()
        .iter()
        .find(|d| d.name.base == SsaBase::RegisterY)
        .unwrap();
    assert_eq!(y.block, analysis.function.entry);
}

#[test]
fn test_polling_loop_with_break() {
    let listing = Listing::new()
        .block("start", vec![imm(Op::Ldx, 0)])
        .block("poll", vec![abs_x(Op::Lda, 0x20), to(Op::Bne, "work")])
        .block("idle", vec![op(Op::Inx), to(Op::Jmp, "poll")])
        .block("work", vec![imm(Op::Cmp, 0xFF), to(Op::Beq, "out")])
        .block("back", vec![op(Op::Inx), to(Op::Jmp, "poll")])
        .block("out", vec![abs(Op::Stx, 0x11), op(Op::Rts)]);
    assert_round_trip(
        listing,
        &[
            memory(0x20, &[0, 5, 0, 0xFF]),
            memory(0x20, &[0xFF]),
        ],
    );
}

#[test]
fn test_nested_loops_merge_accumulator() {
    let listing = Listing::new()
        .block("start", vec![imm(Op::Ldx, 0), imm(Op::Lda, 0)])
        .block("outer", vec![imm(Op::Ldy, 0)])
        .block("inner", vec![op(Op::Clc), imm(Op::Adc, 1), op(Op::Iny), imm(Op::Cpy, 3), to(Op::Bne, "inner")])
        .block("latch", vec![op(Op::Inx), abs(Op::Cpx, 0x10), to(Op::Bne, "outer")])
        .block("done", vec![abs(Op::Sta, 0x11), op(Op::Rts)]);
    let (program, analysis) = assert_round_trip(listing, &[memory(0x10, &[1]), memory(0x10, &[2])]);
    assert_eq!(analysis.loops.len(), 2);
    for label in ["outer", "inner"] {
        let block = program.cfg.block_by_label(label).unwrap();
        assert!(
            analysis.ssa.phis_at(block).iter().any(|p| p.target == SsaBase::RegisterA),
            "no accumulator phi at {}",
            label
        );
    }
}
