// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

//! Shared fixtures for the round-trip tests: a reference interpreter that
//! runs the block graph directly, and an evaluator that runs the structured
//! control nodes using only SSA definitions and phi copies.

use mos6502_flow::cfg::{BlockId, ControlFlowGraph, Function, Terminator};
use mos6502_flow::control_flow_structuring::{Condition, ControlNode, LoopKind};
use mos6502_flow::dominance::{compute_dominators, verify_dominator_soundness};
use mos6502_flow::instruction::{Instruction, Op, Operand};
use mos6502_flow::listing::{Listing, Program};
use mos6502_flow::options::StructureOptions;
use mos6502_flow::pipeline::{analyze_program, FunctionAnalysis};
use mos6502_flow::ssa::{SsaBase, SsaExpr, SsaName};
use std::collections::BTreeMap;

const STEP_LIMIT: usize = 10_000;

pub fn op(op: Op) -> Instruction {
    Instruction::implied(op)
}

pub fn imm(op: Op, value: u8) -> Instruction {
    Instruction::new(op, Operand::Immediate(value))
}

pub fn abs(op: Op, address: u16) -> Instruction {
    Instruction::new(op, Operand::Address(address))
}

pub fn abs_x(op: Op, address: u16) -> Instruction {
    Instruction::new(op, Operand::AddressX(address))
}

pub fn acc(op: Op) -> Instruction {
    Instruction::new(op, Operand::Accumulator)
}

pub fn to(op: Op, label: &str) -> Instruction {
    Instruction::new(op, Operand::Label(label.into()))
}

/// Registers, flags (as 0 or 1) and the memory touched by a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Machine {
    pub registers: BTreeMap<SsaBase, i64>,
    pub memory: BTreeMap<u16, u8>,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            registers: SsaBase::ALL.into_iter().map(|base| (base, 0)).collect(),
            memory: BTreeMap::new(),
        }
    }
}

impl Machine {
    pub fn with_register(mut self, base: SsaBase, value: i64) -> Self {
        self.registers.insert(base, value);
        self
    }

    pub fn with_memory(mut self, address: u16, bytes: &[u8]) -> Self {
        for (offset, byte) in bytes.iter().enumerate() {
            self.memory.insert(address.wrapping_add(offset as u16), *byte);
        }
        self
    }

    pub fn get(&self, base: SsaBase) -> i64 {
        self.registers[&base]
    }

    fn set(&mut self, base: SsaBase, value: i64) {
        self.registers.insert(base, value);
    }

    pub fn read(&self, address: u16) -> i64 {
        self.memory.get(&address).copied().unwrap_or(0) as i64
    }

    fn write(&mut self, address: u16, value: i64) {
        self.memory.insert(address, (value & 0xFF) as u8);
    }
}

fn effective_address(operand: &Operand, x: i64, y: i64) -> Option<u16> {
    match operand {
        Operand::Address(address) => Some(*address),
        Operand::AddressX(address) => Some(address.wrapping_add(x as u16)),
        Operand::AddressY(address) => Some(address.wrapping_add(y as u16)),
        _ => None,
    }
}

fn set_nz(m: &mut Machine, result: i64) {
    m.set(SsaBase::FlagZero, (result == 0) as i64);
    m.set(SsaBase::FlagNegative, (result & 0x80 != 0) as i64);
}

/// Executes one instruction on the machine.
fn execute(m: &mut Machine, instr: &Instruction) {
    use SsaBase::*;
    let (a, x, y, carry) = (m.get(RegisterA), m.get(RegisterX), m.get(RegisterY), m.get(FlagCarry));
    let address = effective_address(&instr.operand, x, y);
    let operand = match &instr.operand {
        Operand::Immediate(value) => *value as i64,
        Operand::Implied | Operand::Accumulator => a,
        // Transfer targets and subroutines carry no data.
        Operand::Label(_) => 0,
        _ => m.read(address.expect("memory operand")),
    };
    match instr.op {
        Op::Lda | Op::Ldx | Op::Ldy | Op::Tax | Op::Tay | Op::Txa | Op::Tya => {
            let (target, value) = match instr.op {
                Op::Lda => (RegisterA, operand),
                Op::Ldx => (RegisterX, operand),
                Op::Ldy => (RegisterY, operand),
                Op::Tax => (RegisterX, a),
                Op::Tay => (RegisterY, a),
                Op::Txa => (RegisterA, x),
                _ => (RegisterA, y),
            };
            m.set(target, value);
            set_nz(m, value);
        }
        Op::Sta => m.write(address.expect("store address"), a),
        Op::Stx => m.write(address.expect("store address"), x),
        Op::Sty => m.write(address.expect("store address"), y),
        Op::Inx | Op::Dex | Op::Iny | Op::Dey => {
            let (target, value) = match instr.op {
                Op::Inx => (RegisterX, x + 1),
                Op::Dex => (RegisterX, x - 1),
                Op::Iny => (RegisterY, y + 1),
                _ => (RegisterY, y - 1),
            };
            m.set(target, value & 0xFF);
            set_nz(m, value & 0xFF);
        }
        Op::Inc | Op::Dec => {
            let value = (if instr.op == Op::Inc { operand + 1 } else { operand - 1 }) & 0xFF;
            m.write(address.expect("memory operand"), value);
            set_nz(m, value);
        }
        Op::And | Op::Ora | Op::Eor => {
            let value = match instr.op {
                Op::And => a & operand,
                Op::Ora => a | operand,
                _ => a ^ operand,
            };
            m.set(RegisterA, value);
            set_nz(m, value);
        }
        Op::Adc | Op::Sbc => {
            let addend = if instr.op == Op::Sbc { operand ^ 0xFF } else { operand };
            let sum = a + addend + carry;
            let result = sum & 0xFF;
            m.set(FlagCarry, (sum > 0xFF) as i64);
            m.set(FlagOverflow, ((a ^ result) & (addend ^ result) & 0x80 != 0) as i64);
            m.set(RegisterA, result);
            set_nz(m, result);
        }
        Op::Cmp | Op::Cpx | Op::Cpy => {
            let register = match instr.op {
                Op::Cmp => a,
                Op::Cpx => x,
                _ => y,
            };
            m.set(FlagCarry, (register >= operand) as i64);
            m.set(FlagZero, (register == operand) as i64);
            m.set(FlagNegative, ((register - operand) & 0x80 != 0) as i64);
        }
        Op::Bit => {
            m.set(FlagZero, (a & operand == 0) as i64);
            m.set(FlagNegative, (operand & 0x80 != 0) as i64);
            m.set(FlagOverflow, (operand & 0x40 != 0) as i64);
        }
        Op::Asl | Op::Lsr | Op::Rol | Op::Ror => {
            let (result, carry_out) = match instr.op {
                Op::Asl => ((operand << 1) & 0xFF, operand & 0x80 != 0),
                Op::Rol => (((operand << 1) | carry) & 0xFF, operand & 0x80 != 0),
                Op::Lsr => (operand >> 1, operand & 1 != 0),
                _ => ((operand >> 1) | (carry << 7), operand & 1 != 0),
            };
            match address {
                Some(address) => m.write(address, result),
                None => m.set(RegisterA, result),
            }
            set_nz(m, result);
            m.set(FlagCarry, carry_out as i64);
        }
        Op::Sec => m.set(FlagCarry, 1),
        Op::Clc => m.set(FlagCarry, 0),
        Op::Clv => m.set(FlagOverflow, 0),
        _ => {}
    }
}

/// Runs `function` block by block from its entry.
pub fn interpret(program: &Program, function: &Function, initial: &Machine) -> Machine {
    let cfg = &program.cfg;
    let mut machine = initial.clone();
    let mut block = function.entry;
    for _ in 0..STEP_LIMIT {
        let basic_block = cfg.block(block);
        for instr in &basic_block.instructions {
            execute(&mut machine, instr);
        }
        let next = match basic_block.terminator() {
            Terminator::Return => None,
            Terminator::Jump => basic_block.branch(),
            Terminator::Branch(op) => {
                let flag = machine.get(op.branch_flag().expect("branch flag")) != 0;
                if Some(flag) == op.branch_polarity() {
                    basic_block.branch()
                } else {
                    basic_block.fall_through()
                }
            }
            Terminator::None => basic_block.fall_through(),
        };
        match next.filter(|b| function.contains(*b)) {
            Some(next) => block = next,
            None => return machine,
        }
    }
    panic!("interpreter exceeded {} blocks", STEP_LIMIT);
}

enum Flow {
    Normal,
    Return(BlockId),
    Goto(BlockId),
}

/// Runs the control nodes of an analyzed function. Registers and flags live
/// only as SSA values in `env`; phi variables are assigned by copies.
struct Evaluator<'a> {
    cfg: &'a ControlFlowGraph,
    analysis: &'a FunctionAnalysis,
    env: BTreeMap<SsaName, i64>,
    memory: BTreeMap<u16, u8>,
    steps: usize,
}

impl<'a> Evaluator<'a> {
    fn lookup(&self, name: SsaName) -> i64 {
        *self
            .env
            .get(&name)
            .unwrap_or_else(|| panic!("{} read before assignment", name))
    }

    fn eval(&self, expr: &SsaExpr) -> i64 {
        match expr {
            SsaExpr::Param(base) => self.lookup(SsaName::param(*base)),
            SsaExpr::Value(name) | SsaExpr::Phi(name) => self.lookup(*name),
            SsaExpr::Const(value) => *value as i64,
            SsaExpr::Bool(value) => *value as i64,
            SsaExpr::Memory { address, index } => {
                let offset = index.map_or(0, |name| self.lookup(name));
                let address = address.wrapping_add(offset as u16);
                self.memory.get(&address).copied().unwrap_or(0) as i64
            }
            SsaExpr::Binary(op, lhs, rhs) => op.apply(self.eval(lhs), self.eval(rhs)),
            other => panic!("cannot evaluate {}", other),
        }
    }

    /// Value of `base` in front of instruction `index` of `block`.
    fn before(&self, block: BlockId, index: usize, base: SsaBase) -> i64 {
        let state = self.analysis.ssa.state_before(block, index).expect("renamed block");
        self.lookup(state.get(base).expect("tracked base").name())
    }

    fn store_effect(&mut self, block: BlockId, index: usize, instr: &Instruction) {
        use SsaBase::*;
        let x = self.before(block, index, RegisterX);
        let y = self.before(block, index, RegisterY);
        let Some(address) = effective_address(&instr.operand, x, y) else {
            return;
        };
        let old = self.memory.get(&address).copied().unwrap_or(0) as i64;
        let value = match instr.op {
            Op::Sta => self.before(block, index, RegisterA),
            Op::Stx => x,
            Op::Sty => y,
            Op::Inc => old + 1,
            Op::Dec => old - 1,
            Op::Asl => old << 1,
            Op::Rol => (old << 1) | self.before(block, index, FlagCarry),
            Op::Lsr => old >> 1,
            Op::Ror => (old >> 1) | (self.before(block, index, FlagCarry) << 7),
            _ => return,
        };
        self.memory.insert(address, (value & 0xFF) as u8);
    }

    fn run_block(&mut self, block: BlockId) {
        self.steps += 1;
        assert!(self.steps < STEP_LIMIT, "evaluator exceeded {} blocks", STEP_LIMIT);
        let cfg = self.cfg;
        let analysis = self.analysis;
        for (index, instr) in cfg.block(block).instructions.iter().enumerate() {
            let defs: Vec<(SsaName, i64)> = analysis
                .ssa
                .defined_by(block, index)
                .into_iter()
                .map(|value| (value.name(), self.eval(&value.expr)))
                .collect();
            self.store_effect(block, index, instr);
            self.env.extend(defs);
        }
        for copy in analysis.phi_elimination.copies_for_block(block) {
            let value = self.eval(&copy.value);
            self.env.insert(copy.target, value);
        }
    }

    fn exec_block(&mut self, block: BlockId) -> Flow {
        self.run_block(block);
        let basic_block = self.cfg.block(block);
        if basic_block.terminator() == Terminator::Return
            || self.analysis.function.successors(self.cfg, block).is_empty()
        {
            Flow::Return(block)
        } else {
            Flow::Normal
        }
    }

    fn branch_taken(&self, condition: &Condition) -> bool {
        let flag = condition.op.branch_flag().expect("branch flag");
        let value = self.before(condition.block, condition.line, flag) != 0;
        Some(value) == condition.op.branch_polarity()
    }

    fn exec_list(&mut self, nodes: &[ControlNode], resume: Option<BlockId>) -> Flow {
        let mut resume = resume;
        let mut index = 0;
        if let Some(target) = resume {
            match nodes.iter().position(|n| n.contains_block(target)) {
                Some(position) => index = position,
                None => return Flow::Goto(target),
            }
        }
        while index < nodes.len() {
            match self.exec_node(&nodes[index], resume.take()) {
                Flow::Normal => index += 1,
                Flow::Goto(target) => match nodes.iter().position(|n| n.contains_block(target)) {
                    Some(position) => {
                        index = position;
                        resume = Some(target);
                    }
                    None => return Flow::Goto(target),
                },
                done => return done,
            }
        }
        Flow::Normal
    }

    fn exec_node(&mut self, node: &ControlNode, resume: Option<BlockId>) -> Flow {
        match node {
            ControlNode::Block { block, .. } => self.exec_block(*block),
            ControlNode::If {
                condition,
                then_nodes,
                else_nodes,
                ..
            } => {
                let run_then = match resume {
                    Some(target) => then_nodes.iter().any(|n| n.contains_block(target)),
                    None => self.branch_taken(condition) == condition.sense,
                };
                if run_then {
                    self.exec_list(then_nodes, resume)
                } else {
                    self.exec_list(else_nodes, resume)
                }
            }
            ControlNode::Loop {
                kind,
                header,
                condition,
                body,
                ..
            } => self.exec_loop(*kind, *header, condition.as_ref(), body, resume),
            ControlNode::Switch {
                dispatch,
                cases,
                default,
                ..
            } => {
                let mut start = 0;
                if let Some(target) = resume {
                    match dispatch.iter().position(|test| test.block == target) {
                        Some(position) => start = position,
                        None => {
                            let case = cases
                                .iter()
                                .find(|case| case.nodes.iter().any(|n| n.contains_block(target)));
                            return match case {
                                Some(case) => self.exec_list(&case.nodes, resume),
                                None => self.exec_list(default, resume),
                            };
                        }
                    }
                }
                for test in &dispatch[start..] {
                    if let done @ Flow::Return(_) = self.exec_block(test.block) {
                        return done;
                    }
                    let (line, op) = self.cfg.block(test.block).conditional_branch().expect("dispatch branch");
                    let condition = Condition {
                        block: test.block,
                        line,
                        op,
                        sense: true,
                    };
                    if self.branch_taken(&condition) {
                        let case = cases
                            .iter()
                            .find(|case| case.target == test.target)
                            .expect("case for dispatch target");
                        return self.exec_list(&case.nodes, None);
                    }
                }
                self.exec_list(default, None)
            }
            ControlNode::Goto { target, .. } => Flow::Goto(*target),
        }
    }

    fn exec_loop(
        &mut self,
        kind: LoopKind,
        header: BlockId,
        condition: Option<&Condition>,
        body: &[ControlNode],
        resume: Option<BlockId>,
    ) -> Flow {
        let mut resume = resume.filter(|target| !(kind == LoopKind::PreTest && *target == header));
        loop {
            if kind == LoopKind::PreTest && resume.is_none() {
                if let done @ Flow::Return(_) = self.exec_block(header) {
                    return done;
                }
                let condition = condition.expect("pre-test condition");
                if self.branch_taken(condition) != condition.sense {
                    return Flow::Normal;
                }
            }
            match self.exec_list(body, resume.take()) {
                Flow::Normal => {}
                Flow::Goto(target) if target == header => continue,
                done => return done,
            }
            if kind == LoopKind::PostTest {
                let condition = condition.expect("post-test condition");
                if self.branch_taken(condition) != condition.sense {
                    return Flow::Normal;
                }
            }
        }
    }
}

/// Runs the structured form of an analyzed function.
pub fn evaluate(program: &Program, analysis: &FunctionAnalysis, initial: &Machine) -> Machine {
    let mut evaluator = Evaluator {
        cfg: &program.cfg,
        analysis,
        env: SsaBase::ALL
            .into_iter()
            .map(|base| (SsaName::param(base), initial.get(base)))
            .collect(),
        memory: initial.memory.clone(),
        steps: 0,
    };
    for decl in analysis.phi_elimination.declarations() {
        let value = evaluator.eval(&decl.placeholder);
        evaluator.env.insert(decl.name, value);
    }
    let last = match evaluator.exec_list(&analysis.control_nodes, None) {
        Flow::Return(block) => block,
        Flow::Normal => panic!("control fell off the end of {}", analysis.function.name),
        Flow::Goto(target) => panic!("unresolved goto {}", program.cfg.name(target)),
    };
    let registers = SsaBase::ALL
        .into_iter()
        .map(|base| {
            let value = analysis.ssa.exit_value(last, base).expect("exit value");
            (base, evaluator.lookup(value.name()))
        })
        .collect();
    Machine {
        registers,
        memory: evaluator.memory,
    }
}

/// Links and analyzes a listing, failing on any dropped edge.
pub fn analyze(listing: Listing) -> (Program, Vec<FunctionAnalysis>) {
    let mut program = listing.build().expect("listing links");
    let options = StructureOptions {
        fail_on_missing_edges: true,
        ..StructureOptions::default()
    };
    let analyses = analyze_program(&mut program, &options).expect("analysis succeeds");
    (program, analyses)
}

/// Checks that the structured form of the first function computes what the
/// block graph computes, for every initial machine.
pub fn assert_round_trip(listing: Listing, inputs: &[Machine]) -> (Program, FunctionAnalysis) {
    let (program, mut analyses) = analyze(listing);
    let analysis = analyses.remove(0);
    assert_invariants(&program, &analysis);
    for initial in inputs {
        let expected = interpret(&program, &analysis.function, initial);
        let actual = evaluate(&program, &analysis, initial);
        assert_eq!(
            actual,
            expected,
            "structured run diverged for {:?}\n{}",
            initial,
            analysis.structure.region.summarize(&program.cfg, 0)
        );
    }
    (program, analysis)
}

/// Checks dominator soundness and single assignment of an analyzed function.
/// Dominators are recomputed, since another function of the program may have
/// been analyzed last.
pub fn assert_invariants(program: &Program, analysis: &FunctionAnalysis) {
    let mut cfg = program.cfg.clone();
    compute_dominators(&mut cfg, &analysis.function).unwrap();
    verify_dominator_soundness(&cfg, &analysis.function).unwrap();
    analysis.ssa.verify_single_assignment().unwrap();
}
