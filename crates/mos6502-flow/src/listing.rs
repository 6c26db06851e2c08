// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Block listings: already-formed basic blocks with symbolic successor
//! labels, as handed over by block formation or written in test fixtures.
//! `Listing::build` links them into a `ControlFlowGraph`.

use crate::cfg::{BlockId, ControlFlowGraph, Function, TrackedIo};
use crate::instruction::{Instruction, Op, Operand};
use crate::ssa::BaseSet;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Listing {
    #[serde(default, rename = "function")]
    pub functions: Vec<ListingFunction>,
    #[serde(default, rename = "block")]
    pub blocks: Vec<ListingBlock>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingFunction {
    pub name: String,
    pub entry: String,
    #[serde(default)]
    pub inputs: BaseSet,
    #[serde(default)]
    pub outputs: BaseSet,
    #[serde(default)]
    pub clobbers: BaseSet,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingBlock {
    pub label: String,
    #[serde(default)]
    pub instructions: Vec<ListingInstruction>,
    /// Overrides the fall-through successor derived from the layout.
    #[serde(default)]
    pub fall_through: Option<String>,
    /// Overrides the branch successor derived from the last instruction.
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingInstruction {
    pub op: Op,
    #[serde(default)]
    pub operand: Operand,
    /// Replaces the default written set (e.g. a callee's clobber summary).
    #[serde(default)]
    pub writes: Option<BaseSet>,
}

impl ListingInstruction {
    pub fn to_instruction(&self) -> Instruction {
        let instr = Instruction::new(self.op, self.operand.clone());
        match self.writes {
            Some(writes) => instr.with_writes(writes),
            None => instr,
        }
    }
}

impl From<Instruction> for ListingInstruction {
    fn from(instr: Instruction) -> Self {
        let default = Instruction::new(instr.op, instr.operand.clone());
        let writes = (default.affects.writes != instr.affects.writes).then_some(instr.affects.writes);
        Self {
            op: instr.op,
            operand: instr.operand,
            writes,
        }
    }
}

/// A linked program: the block arena plus its functions.
#[derive(Clone, Debug)]
pub struct Program {
    pub cfg: ControlFlowGraph,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("failed to parse block listing")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read listing {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in listing {}", path.display()))
    }

    pub fn block(mut self, label: &str, instructions: Vec<Instruction>) -> Self {
        self.blocks.push(ListingBlock {
            label: label.to_string(),
            instructions: instructions.into_iter().map(ListingInstruction::from).collect(),
            fall_through: None,
            branch: None,
        });
        self
    }

    pub fn function(mut self, name: &str, entry: &str, inputs: BaseSet, outputs: BaseSet) -> Self {
        self.functions.push(ListingFunction {
            name: name.to_string(),
            entry: entry.to_string(),
            inputs,
            outputs,
            clobbers: BaseSet::empty(),
        });
        self
    }

    /// Links the blocks and builds each function from its entry.
    ///
    /// Successors follow the layout: a conditional branch targets its label
    /// and falls through to the next block; `JMP` to a listed label is a
    /// branch, to anything else a tail call out of the function; returns have
    /// no successors; any other block falls through.
    pub fn build(&self) -> anyhow::Result<Program> {
        let mut cfg = ControlFlowGraph::new();
        for block in &self.blocks {
            if cfg.block_by_label(&block.label).is_some() {
                bail!("duplicate block label `{}`", block.label);
            }
            cfg.add_block(
                Some(block.label.clone()),
                block.instructions.iter().map(ListingInstruction::to_instruction).collect(),
            );
        }

        let resolve = |cfg: &ControlFlowGraph, label: &str, from: &str| -> anyhow::Result<BlockId> {
            cfg.block_by_label(label)
                .with_context(|| format!("block `{}` refers to unknown label `{}`", from, label))
        };

        for (id, block) in self.blocks.iter().enumerate() {
            let next = (id + 1 < self.blocks.len()).then_some(id + 1);
            let (mut fall_through, mut branch) = match cfg.block(id).instructions.last() {
                Some(last) if last.op.is_return() => (None, None),
                Some(last) if last.op.is_jump() => {
                    let target = last.operand.label().and_then(|l| cfg.block_by_label(l));
                    (None, target)
                }
                Some(last) if last.op.is_branch() => match last.operand.label() {
                    Some(label) => (next, Some(resolve(&cfg, label, &block.label)?)),
                    None => bail!("branch in block `{}` has no label target", block.label),
                },
                _ => (next, None),
            };
            if let Some(label) = &block.fall_through {
                fall_through = Some(resolve(&cfg, label, &block.label)?);
            }
            if let Some(label) = &block.branch {
                branch = Some(resolve(&cfg, label, &block.label)?);
            }
            cfg.set_fall_through(id, fall_through);
            cfg.set_branch(id, branch);
        }

        let mut functions = vec![];
        for function in &self.functions {
            let entry = resolve(&cfg, &function.entry, &function.name)?;
            let io = TrackedIo {
                inputs: function.inputs,
                outputs: function.outputs,
                clobbers: function.clobbers,
            };
            functions.push(Function::reachable(&cfg, function.name.clone(), entry, io));
        }
        if functions.is_empty() && !cfg.is_empty() {
            functions.push(Function::reachable(&cfg, "main", 0, TrackedIo::default()));
        }
        cfg.validate_consistency()?;
        Ok(Program { cfg, functions })
    }
}
