// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Basic blocks, functions and the block arena they live in.
//!
//! Blocks are addressed by `BlockId` (their index in the arena). Successor
//! edges and the immediate dominator are private; the setters on
//! `ControlFlowGraph` keep the reverse links (`entered_from`, `dominates`)
//! consistent in the same call.

use crate::instruction::{Instruction, Op};
use crate::ssa::BaseSet;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type BlockId = usize;

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: Option<String>,
    pub instructions: Vec<Instruction>,
    fall_through: Option<BlockId>,
    branch: Option<BlockId>,
    entered_from: BTreeSet<BlockId>,
    immediate_dominator: Option<BlockId>,
    dominates: BTreeSet<BlockId>,
}

/// How control leaves a block, judged by its last instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminator {
    Return,
    Jump,
    Branch(Op),
    None,
}

impl BasicBlock {
    pub fn fall_through(&self) -> Option<BlockId> {
        self.fall_through
    }

    pub fn branch(&self) -> Option<BlockId> {
        self.branch
    }

    pub fn entered_from(&self) -> &BTreeSet<BlockId> {
        &self.entered_from
    }

    pub fn immediate_dominator(&self) -> Option<BlockId> {
        self.immediate_dominator
    }

    pub fn dominates(&self) -> &BTreeSet<BlockId> {
        &self.dominates
    }

    pub fn name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("block_{}", self.id),
        }
    }

    pub fn terminator(&self) -> Terminator {
        match self.instructions.last() {
            Some(instr) if instr.op.is_return() => Terminator::Return,
            Some(instr) if instr.op.is_jump() => Terminator::Jump,
            Some(instr) if instr.op.is_branch() => Terminator::Branch(instr.op),
            _ => Terminator::None,
        }
    }

    /// The conditional branch ending this block, with its line.
    pub fn conditional_branch(&self) -> Option<(usize, Op)> {
        match self.terminator() {
            Terminator::Branch(op) => Some((self.instructions.len() - 1, op)),
            _ => None,
        }
    }

    /// Instructions that carry a data effect (everything but the transfer).
    pub fn body(&self) -> &[Instruction] {
        match self.terminator() {
            Terminator::None => &self.instructions,
            _ => &self.instructions[..self.instructions.len() - 1],
        }
    }
}

/// The block arena of a whole program.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    labels: BTreeMap<String, BlockId>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, label: Option<String>, instructions: Vec<Instruction>) -> BlockId {
        let id = self.blocks.len();
        if let Some(label) = &label {
            self.labels.insert(label.clone(), id);
        }
        self.blocks.push(BasicBlock {
            id,
            label,
            instructions,
            fall_through: None,
            branch: None,
            entered_from: BTreeSet::new(),
            immediate_dominator: None,
            dominates: BTreeSet::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_by_label(&self, label: &str) -> Option<BlockId> {
        self.labels.get(label).copied()
    }

    pub fn name(&self, id: BlockId) -> String {
        self.blocks.get(id).map_or_else(|| format!("block_{}", id), BasicBlock::name)
    }

    pub fn set_fall_through(&mut self, from: BlockId, to: Option<BlockId>) {
        let old = std::mem::replace(&mut self.blocks[from].fall_through, to);
        self.relink(from, old, to);
    }

    pub fn set_branch(&mut self, from: BlockId, to: Option<BlockId>) {
        let old = std::mem::replace(&mut self.blocks[from].branch, to);
        self.relink(from, old, to);
    }

    fn relink(&mut self, from: BlockId, old: Option<BlockId>, new: Option<BlockId>) {
        if let Some(old) = old {
            let block = &self.blocks[from];
            if block.fall_through != Some(old) && block.branch != Some(old) {
                self.blocks[old].entered_from.remove(&from);
            }
        }
        if let Some(new) = new {
            self.blocks[new].entered_from.insert(from);
        }
    }

    pub fn set_immediate_dominator(&mut self, block: BlockId, idom: Option<BlockId>) {
        if let Some(old) = std::mem::replace(&mut self.blocks[block].immediate_dominator, idom) {
            self.blocks[old].dominates.remove(&block);
        }
        if let Some(new) = idom {
            self.blocks[new].dominates.insert(block);
        }
    }

    /// Successor blocks of `id`, fall-through first, without duplicates.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let block = &self.blocks[id];
        let mut succs = vec![];
        for target in [block.fall_through, block.branch].into_iter().flatten() {
            if !succs.contains(&target) {
                succs.push(target);
            }
        }
        succs
    }

    /// Checks that successor/predecessor and idom/dominates links mirror each other.
    pub fn validate_consistency(&self) -> anyhow::Result<()> {
        for block in &self.blocks {
            for succ in self.successors(block.id) {
                if !self.blocks[succ].entered_from.contains(&block.id) {
                    bail!(
                        "{} is a successor of {} but does not list it as a predecessor",
                        self.name(succ),
                        block.name()
                    );
                }
            }
            for pred in &block.entered_from {
                let pred_block = &self.blocks[*pred];
                if pred_block.fall_through != Some(block.id) && pred_block.branch != Some(block.id) {
                    bail!(
                        "{} lists {} as a predecessor but has no edge from it",
                        block.name(),
                        pred_block.name()
                    );
                }
            }
            if let Some(idom) = block.immediate_dominator {
                if !self.blocks[idom].dominates.contains(&block.id) {
                    bail!(
                        "{} is dominated by {} but missing from its dominator-tree children",
                        block.name(),
                        self.name(idom)
                    );
                }
            }
            for child in &block.dominates {
                if self.blocks[*child].immediate_dominator != Some(block.id) {
                    bail!(
                        "{} lists {} as a dominator-tree child but is not its immediate dominator",
                        block.name(),
                        self.name(*child)
                    );
                }
            }
        }
        Ok(())
    }
}

/// Registers and flags a function reads on entry, produces on exit, or
/// leaves undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedIo {
    pub inputs: BaseSet,
    pub outputs: BaseSet,
    pub clobbers: BaseSet,
}

/// A function: an entry and the blocks belonging to it.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub entry: BlockId,
    pub blocks: BTreeSet<BlockId>,
    pub io: TrackedIo,
}

impl Function {
    /// A function made of every block reachable from `entry` along
    /// successor edges. Subroutine calls are not followed.
    pub fn reachable(cfg: &ControlFlowGraph, name: impl Into<String>, entry: BlockId, io: TrackedIo) -> Self {
        let mut blocks = BTreeSet::new();
        let mut work = vec![entry];
        while let Some(block) = work.pop() {
            if blocks.insert(block) {
                work.extend(cfg.successors(block));
            }
        }
        Self {
            name: name.into(),
            entry,
            blocks,
            io,
        }
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// In-function successors, fall-through first.
    pub fn successors(&self, cfg: &ControlFlowGraph, block: BlockId) -> Vec<BlockId> {
        cfg.successors(block)
            .into_iter()
            .filter(|succ| self.contains(*succ))
            .collect()
    }

    /// In-function predecessors. Entries from other functions are skipped.
    pub fn predecessors(&self, cfg: &ControlFlowGraph, block: BlockId) -> Vec<BlockId> {
        cfg.block(block)
            .entered_from()
            .iter()
            .copied()
            .filter(|pred| self.contains(*pred))
            .collect()
    }

    pub fn edges(&self, cfg: &ControlFlowGraph) -> Vec<Edge> {
        let mut edges = vec![];
        for &source in &self.blocks {
            let block = cfg.block(source);
            if let Some(target) = block.fall_through().filter(|t| self.contains(*t)) {
                edges.push(Edge::new(source, target, EdgeKind::FallThrough));
            }
            if let Some(target) = block.branch().filter(|t| self.contains(*t)) {
                edges.push(Edge::new(source, target, EdgeKind::Branch));
            }
        }
        edges
    }

    /// Block order used for emission: the entry first, then by id.
    pub fn layout(&self) -> Vec<BlockId> {
        let mut order = vec![self.entry];
        order.extend(self.blocks.iter().copied().filter(|b| *b != self.entry));
        order
    }

    pub fn layout_positions(&self) -> BTreeMap<BlockId, usize> {
        self.layout()
            .into_iter()
            .enumerate()
            .map(|(pos, block)| (block, pos))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    FallThrough,
    Branch,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::FallThrough => write!(f, "FALL_THROUGH"),
            EdgeKind::Branch => write!(f, "BRANCH"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub source: BlockId,
    pub target: BlockId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: BlockId, target: BlockId, kind: EdgeKind) -> Self {
        Self { source, target, kind }
    }
}
