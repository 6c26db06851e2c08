// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! 6502 branch idioms recognized before region matching.

use crate::cfg::{BlockId, ControlFlowGraph, Function};
use crate::instruction::{Op, Operand};
use crate::ssa::SsaBase;
use log::debug;
use std::collections::BTreeMap;

/// Adjacent complementary branches on one flag, e.g.
///
/// ```text
/// first:  ...
///         BPL positive
/// second: BMI negative     ; always taken once reached
/// ```
///
/// `second` is entered only along the fall-through of `first`, so its own
/// fall-through can never run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchPair {
    pub first: BlockId,
    pub second: BlockId,
}

/// Finds every complementary branch pair of `function`, keyed by the second
/// block.
pub fn find_branch_pairs(cfg: &ControlFlowGraph, function: &Function) -> BTreeMap<BlockId, BranchPair> {
    let mut pairs = BTreeMap::new();
    for &first in &function.blocks {
        let block = cfg.block(first);
        let Some((_, first_op)) = block.conditional_branch() else {
            continue;
        };
        let Some(second) = block.fall_through().filter(|b| *b != first && function.contains(*b)) else {
            continue;
        };
        let second_block = cfg.block(second);
        let [only] = second_block.instructions.as_slice() else {
            continue;
        };
        if !first_op.complements(only.op)
            || block.branch() == Some(second)
            || function.predecessors(cfg, second) != vec![first]
            || second_block.branch().map_or(true, |t| !function.contains(t))
            || second_block.fall_through() == second_block.branch()
        {
            continue;
        }
        debug!(
            "[structurer] complementary branches {} {} / {} {}",
            block.name(),
            first_op,
            second_block.name(),
            only.op
        );
        pairs.insert(second, BranchPair { first, second });
    }
    pairs
}

/// A chain of `CMP #k; BEQ target` tests on one register, linked by
/// fall-through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompareChain {
    pub register: SsaBase,
    /// `(block, value, target)` per test, in chain order.
    pub tests: Vec<(BlockId, u8, BlockId)>,
    /// Where the last test falls through to.
    pub default: BlockId,
}

impl CompareChain {
    pub fn head(&self) -> BlockId {
        self.tests[0].0
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.tests.iter().map(|(block, _, _)| *block)
    }
}

/// The `(register, value, target)` of a block ending in `CMP #k; BEQ target`.
fn compare_test(cfg: &ControlFlowGraph, function: &Function, block: BlockId) -> Option<(SsaBase, u8, BlockId)> {
    let instrs = &cfg.block(block).instructions;
    let [.., compare, branch] = instrs.as_slice() else {
        return None;
    };
    let register = match compare.op {
        Op::Cmp => SsaBase::RegisterA,
        Op::Cpx => SsaBase::RegisterX,
        Op::Cpy => SsaBase::RegisterY,
        _ => return None,
    };
    let Operand::Immediate(value) = compare.operand else {
        return None;
    };
    if branch.op != Op::Beq {
        return None;
    }
    let target = cfg.block(block).branch().filter(|t| function.contains(*t))?;
    Some((register, value, target))
}

fn is_link(cfg: &ControlFlowGraph, function: &Function, prev: BlockId, next: BlockId, register: SsaBase) -> bool {
    cfg.block(prev).fall_through() == Some(next)
        && cfg.block(next).instructions.len() == 2
        && function.predecessors(cfg, next) == vec![prev]
        && matches!(compare_test(cfg, function, prev), Some((r, _, _)) if r == register)
        && matches!(compare_test(cfg, function, next), Some((r, _, _)) if r == register)
}

/// Finds compare chains of at least `min_cases` tests, keyed by head block.
/// Links after the head hold nothing but the compare and the branch and
/// are entered only from the previous link.
pub fn find_compare_chains(
    cfg: &ControlFlowGraph,
    function: &Function,
    min_cases: usize,
) -> BTreeMap<BlockId, CompareChain> {
    let mut chains = BTreeMap::new();
    for &head in &function.blocks {
        let Some((register, value, target)) = compare_test(cfg, function, head) else {
            continue;
        };
        // A link of a longer chain is never a head of its own.
        if let [pred] = function.predecessors(cfg, head).as_slice() {
            if is_link(cfg, function, *pred, head, register) {
                continue;
            }
        }
        let mut tests = vec![(head, value, target)];
        let mut current = head;
        let default = loop {
            let Some(next) = cfg.block(current).fall_through().filter(|b| function.contains(*b)) else {
                break None;
            };
            if !is_link(cfg, function, current, next, register)
                || tests.iter().any(|(b, _, t)| *b == next || *t == next)
            {
                break Some(next);
            }
            if let Some((_, value, target)) = compare_test(cfg, function, next) {
                tests.push((next, value, target));
            }
            current = next;
        };
        let Some(default) = default else {
            continue;
        };
        if tests.len() < min_cases.max(2) {
            continue;
        }
        debug!(
            "[structurer] compare chain at {} on {} with {} tests",
            cfg.name(head),
            register,
            tests.len()
        );
        chains.insert(head, CompareChain { register, tests, default });
    }
    chains
}
