// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Flat control nodes consumed by code emission.
//!
//! A region tree is lowered to ordered lists of nodes. Within a list, control
//! falls from one node to the next; a `Goto` transfers to the node (possibly
//! nested) holding its target block.

use super::regions::{DispatchTest, Region, Selector};
use crate::cfg::{BlockId, ControlFlowGraph};
use crate::instruction::Op;
use anyhow::{anyhow, bail};
use itertools::Itertools;
use std::fmt::Write;

/// A conditional branch deciding an `If` or a loop. The guarded arm (or the
/// next iteration) runs when the branch outcome equals `sense`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Condition {
    pub block: BlockId,
    pub line: usize,
    pub op: Op,
    pub sense: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopKind {
    /// The header runs, then its branch decides whether the body runs.
    PreTest,
    /// The body runs, then the latch branch decides whether to repeat.
    PostTest,
    Infinite,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlCase {
    pub values: Vec<u8>,
    pub target: BlockId,
    pub nodes: Vec<ControlNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlNode {
    Block {
        id: usize,
        block: BlockId,
    },
    /// Follows the `Block` node of `condition.block`.
    If {
        id: usize,
        condition: Condition,
        then_nodes: Vec<ControlNode>,
        else_nodes: Vec<ControlNode>,
        join: Option<BlockId>,
    },
    /// A pre-test loop executes `header` itself; the other kinds hold their
    /// header as the first node of `body`.
    Loop {
        id: usize,
        kind: LoopKind,
        header: BlockId,
        condition: Option<Condition>,
        body: Vec<ControlNode>,
        exit: Option<BlockId>,
    },
    /// Runs the dispatch blocks in order; the first `BEQ` taken selects its
    /// case, otherwise `default` runs.
    Switch {
        id: usize,
        selector: Selector,
        dispatch: Vec<DispatchTest>,
        cases: Vec<ControlCase>,
        default: Vec<ControlNode>,
        join: Option<BlockId>,
    },
    Goto {
        id: usize,
        target: BlockId,
    },
}

impl ControlNode {
    pub fn id(&self) -> usize {
        match self {
            ControlNode::Block { id, .. }
            | ControlNode::If { id, .. }
            | ControlNode::Loop { id, .. }
            | ControlNode::Switch { id, .. }
            | ControlNode::Goto { id, .. } => *id,
        }
    }

    /// Whether control entering this node starts at `block`.
    pub fn starts_at(&self, block: BlockId) -> bool {
        match self {
            ControlNode::Block { block: b, .. } => *b == block,
            ControlNode::Loop { header, .. } => *header == block,
            ControlNode::Switch { selector, .. } => selector.block == block,
            ControlNode::If { .. } | ControlNode::Goto { .. } => false,
        }
    }

    /// Whether `block` is placed in this node, at any depth.
    pub fn contains_block(&self, block: BlockId) -> bool {
        let any = |nodes: &[ControlNode]| nodes.iter().any(|n| n.contains_block(block));
        match self {
            ControlNode::Block { block: b, .. } => *b == block,
            ControlNode::If {
                then_nodes, else_nodes, ..
            } => any(then_nodes) || any(else_nodes),
            ControlNode::Loop { header, body, .. } => *header == block || any(body),
            ControlNode::Switch {
                dispatch,
                cases,
                default,
                ..
            } => {
                dispatch.iter().any(|test| test.block == block)
                    || cases.iter().any(|case| any(&case.nodes))
                    || any(default)
            }
            ControlNode::Goto { .. } => false,
        }
    }
}

struct Flattener<'a> {
    cfg: &'a ControlFlowGraph,
    next_id: usize,
}

/// Lowers a region tree to control nodes, numbering them in preorder.
pub fn flatten(region: &Region, cfg: &ControlFlowGraph) -> anyhow::Result<Vec<ControlNode>> {
    let mut flattener = Flattener { cfg, next_id: 0 };
    let mut nodes = vec![];
    flattener.lower(region, &mut nodes)?;
    Ok(nodes)
}

impl<'a> Flattener<'a> {
    fn id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn condition(&self, block: BlockId, line: usize, sense: bool) -> anyhow::Result<Condition> {
        let instr = self
            .cfg
            .block(block)
            .instructions
            .get(line)
            .ok_or_else(|| anyhow!("condition of {} at missing line {}", self.cfg.name(block), line))?;
        if !instr.op.is_branch() {
            bail!(
                "condition of {} at line {} is {}, not a conditional branch",
                self.cfg.name(block),
                line,
                instr.op
            );
        }
        Ok(Condition {
            block,
            line,
            op: instr.op,
            sense,
        })
    }

    fn lower_list(&mut self, region: &Region) -> anyhow::Result<Vec<ControlNode>> {
        let mut nodes = vec![];
        self.lower(region, &mut nodes)?;
        Ok(nodes)
    }

    fn lower(&mut self, region: &Region, out: &mut Vec<ControlNode>) -> anyhow::Result<()> {
        match region {
            Region::Block(block) => {
                let id = self.id();
                out.push(ControlNode::Block { id, block: *block });
            }
            Region::Sequence(children) => {
                for child in children {
                    self.lower(child, out)?;
                }
            }
            Region::IfThen {
                cond_block,
                cond_line,
                sense,
                then,
                join,
            } => {
                let block_id = self.id();
                out.push(ControlNode::Block {
                    id: block_id,
                    block: *cond_block,
                });
                let id = self.id();
                let condition = self.condition(*cond_block, *cond_line, *sense)?;
                out.push(ControlNode::If {
                    id,
                    condition,
                    then_nodes: self.lower_list(then)?,
                    else_nodes: vec![],
                    join: *join,
                });
            }
            Region::IfThenElse {
                cond_block,
                cond_line,
                sense,
                then,
                otherwise,
                join,
            } => {
                let block_id = self.id();
                out.push(ControlNode::Block {
                    id: block_id,
                    block: *cond_block,
                });
                let id = self.id();
                let condition = self.condition(*cond_block, *cond_line, *sense)?;
                let then_nodes = self.lower_list(then)?;
                let else_nodes = self.lower_list(otherwise)?;
                out.push(ControlNode::If {
                    id,
                    condition,
                    then_nodes,
                    else_nodes,
                    join: *join,
                });
            }
            Region::WhileLoop {
                header,
                cond_line,
                sense,
                body,
                exit,
            } => {
                let id = self.id();
                let condition = self.condition(*header, *cond_line, *sense)?;
                out.push(ControlNode::Loop {
                    id,
                    kind: LoopKind::PreTest,
                    header: *header,
                    condition: Some(condition),
                    body: self.lower_list(body)?,
                    exit: *exit,
                });
            }
            Region::DoWhileLoop {
                header,
                cond_block,
                cond_line,
                sense,
                body,
                exit,
            } => {
                let id = self.id();
                let condition = self.condition(*cond_block, *cond_line, *sense)?;
                out.push(ControlNode::Loop {
                    id,
                    kind: LoopKind::PostTest,
                    header: *header,
                    condition: Some(condition),
                    body: self.lower_list(body)?,
                    exit: *exit,
                });
            }
            Region::InfiniteLoop { header, body } => {
                let id = self.id();
                out.push(ControlNode::Loop {
                    id,
                    kind: LoopKind::Infinite,
                    header: *header,
                    condition: None,
                    body: self.lower_list(body)?,
                    exit: None,
                });
            }
            Region::Switch {
                selector,
                dispatch,
                cases,
                default,
                join,
            } => {
                let id = self.id();
                let mut control_cases = vec![];
                for case in cases {
                    control_cases.push(ControlCase {
                        values: case.values.clone(),
                        target: case.target,
                        nodes: self.lower_list(&case.body)?,
                    });
                }
                out.push(ControlNode::Switch {
                    id,
                    selector: *selector,
                    dispatch: dispatch.clone(),
                    cases: control_cases,
                    default: self.lower_list(default)?,
                    join: *join,
                });
            }
            Region::Unstructured {
                children,
                loose_blocks,
                edges,
            } => {
                for child in children {
                    self.lower(child, out)?;
                }
                for block in loose_blocks {
                    let id = self.id();
                    out.push(ControlNode::Block { id, block: *block });
                }
                for target in edges.iter().map(|edge| edge.target).unique() {
                    let id = self.id();
                    out.push(ControlNode::Goto { id, target });
                }
            }
        }
        Ok(())
    }
}

/// Renders nodes one per line, two spaces per nesting level.
pub fn render_nodes(nodes: &[ControlNode], cfg: &ControlFlowGraph) -> String {
    let mut out = String::new();
    render_into(nodes, cfg, 0, &mut out);
    out
}

fn render_condition(condition: &Condition, cfg: &ControlFlowGraph) -> String {
    format!(
        "{} at {}:{} taken == {}",
        condition.op,
        cfg.name(condition.block),
        condition.line,
        condition.sense
    )
}

fn render_into(nodes: &[ControlNode], cfg: &ControlFlowGraph, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    for node in nodes {
        match node {
            ControlNode::Block { id, block } => {
                let _ = writeln!(out, "{}#{} block {}", pad, id, cfg.name(*block));
            }
            ControlNode::If {
                id,
                condition,
                then_nodes,
                else_nodes,
                ..
            } => {
                let _ = writeln!(out, "{}#{} if {}", pad, id, render_condition(condition, cfg));
                render_into(then_nodes, cfg, depth + 1, out);
                if !else_nodes.is_empty() {
                    let _ = writeln!(out, "{}else", pad);
                    render_into(else_nodes, cfg, depth + 1, out);
                }
            }
            ControlNode::Loop {
                id,
                kind,
                header,
                condition,
                body,
                ..
            } => {
                let test = condition
                    .as_ref()
                    .map(|c| format!(" while {}", render_condition(c, cfg)))
                    .unwrap_or_default();
                let _ = writeln!(out, "{}#{} loop {:?} {}{}", pad, id, kind, cfg.name(*header), test);
                render_into(body, cfg, depth + 1, out);
            }
            ControlNode::Switch {
                id,
                selector,
                cases,
                default,
                ..
            } => {
                let _ = writeln!(
                    out,
                    "{}#{} switch {} at {}",
                    pad,
                    id,
                    selector.register,
                    cfg.name(selector.block)
                );
                for case in cases {
                    let _ = writeln!(
                        out,
                        "{}case {}",
                        pad,
                        case.values.iter().map(|v| format!("#${:02X}", v)).join(", ")
                    );
                    render_into(&case.nodes, cfg, depth + 1, out);
                }
                let _ = writeln!(out, "{}default", pad);
                render_into(default, cfg, depth + 1, out);
            }
            ControlNode::Goto { id, target } => {
                let _ = writeln!(out, "{}#{} goto {}", pad, id, cfg.name(*target));
            }
        }
    }
}
