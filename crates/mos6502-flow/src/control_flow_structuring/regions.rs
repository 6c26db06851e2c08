// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::cfg::{BlockId, ControlFlowGraph};
use crate::ssa::SsaBase;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::Write;

/// An edge lowered to a goto, with the reason it could not be structured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnstructuredEdge {
    pub source: BlockId,
    pub target: BlockId,
    pub reason: String,
}

/// The register a switch dispatches on and the block holding its first test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selector {
    pub block: BlockId,
    pub register: SsaBase,
}

/// One `CMP #value; BEQ target` link of a compare chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchTest {
    pub block: BlockId,
    pub value: u8,
    pub target: BlockId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchCase {
    pub values: Vec<u8>,
    pub target: BlockId,
    pub body: Box<Region>,
}

/// A structured region of a function. `sense` is the branch outcome under
/// which the then-arm (or the next loop iteration) runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Region {
    Block(BlockId),
    Sequence(Vec<Region>),
    IfThen {
        cond_block: BlockId,
        cond_line: usize,
        sense: bool,
        then: Box<Region>,
        join: Option<BlockId>,
    },
    IfThenElse {
        cond_block: BlockId,
        cond_line: usize,
        sense: bool,
        then: Box<Region>,
        otherwise: Box<Region>,
        join: Option<BlockId>,
    },
    /// Pre-test loop: the header runs, then its branch decides.
    WhileLoop {
        header: BlockId,
        cond_line: usize,
        sense: bool,
        body: Box<Region>,
        exit: Option<BlockId>,
    },
    /// Post-test loop: the body (ending with `cond_block`) runs, then the
    /// latch branch decides.
    DoWhileLoop {
        header: BlockId,
        cond_block: BlockId,
        cond_line: usize,
        sense: bool,
        body: Box<Region>,
        exit: Option<BlockId>,
    },
    InfiniteLoop {
        header: BlockId,
        body: Box<Region>,
    },
    Switch {
        selector: Selector,
        dispatch: Vec<DispatchTest>,
        cases: Vec<SwitchCase>,
        default: Box<Region>,
        join: Option<BlockId>,
    },
    /// Children that could not be arranged structurally, blocks unreachable
    /// from the entry, and the edges lowered to gotos.
    Unstructured {
        children: Vec<Region>,
        loose_blocks: Vec<BlockId>,
        edges: Vec<UnstructuredEdge>,
    },
}

impl Region {
    /// A region standing for a goto along `edges` (all sharing one target).
    pub fn goto(edges: Vec<UnstructuredEdge>) -> Self {
        Region::Unstructured {
            children: vec![],
            loose_blocks: vec![],
            edges,
        }
    }

    pub fn sequence(mut children: Vec<Region>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Region::Sequence(children)
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Region::Block(_) => "BLOCK",
            Region::Sequence(_) => "SEQUENCE",
            Region::IfThen { .. } => "IF_THEN",
            Region::IfThenElse { .. } => "IF_THEN_ELSE",
            Region::WhileLoop { .. } => "WHILE",
            Region::DoWhileLoop { .. } => "DO_WHILE",
            Region::InfiniteLoop { .. } => "INFINITE_LOOP",
            Region::Switch { .. } => "SWITCH",
            Region::Unstructured { .. } => "UNSTRUCTURED",
        }
    }

    /// The block control enters first, if any.
    pub fn entry_block(&self) -> Option<BlockId> {
        match self {
            Region::Block(block) => Some(*block),
            Region::Sequence(children) => children.iter().find_map(Region::entry_block),
            Region::IfThen { cond_block, .. } | Region::IfThenElse { cond_block, .. } => Some(*cond_block),
            Region::WhileLoop { header, .. }
            | Region::DoWhileLoop { header, .. }
            | Region::InfiniteLoop { header, .. } => Some(*header),
            Region::Switch { selector, .. } => Some(selector.block),
            Region::Unstructured {
                children,
                loose_blocks,
                ..
            } => children
                .iter()
                .find_map(Region::entry_block)
                .or_else(|| loose_blocks.first().copied()),
        }
    }

    /// Every block placed in this region.
    pub fn blocks(&self) -> BTreeSet<BlockId> {
        let mut blocks = BTreeSet::new();
        self.collect_blocks(&mut blocks);
        blocks
    }

    fn collect_blocks(&self, out: &mut BTreeSet<BlockId>) {
        match self {
            Region::Block(block) => {
                out.insert(*block);
            }
            Region::Sequence(children) => children.iter().for_each(|c| c.collect_blocks(out)),
            Region::IfThen { cond_block, then, .. } => {
                out.insert(*cond_block);
                then.collect_blocks(out);
            }
            Region::IfThenElse {
                cond_block,
                then,
                otherwise,
                ..
            } => {
                out.insert(*cond_block);
                then.collect_blocks(out);
                otherwise.collect_blocks(out);
            }
            Region::WhileLoop { header, body, .. } => {
                out.insert(*header);
                body.collect_blocks(out);
            }
            Region::DoWhileLoop { body, .. } | Region::InfiniteLoop { body, .. } => body.collect_blocks(out),
            Region::Switch {
                dispatch,
                cases,
                default,
                ..
            } => {
                out.extend(dispatch.iter().map(|test| test.block));
                cases.iter().for_each(|case| case.body.collect_blocks(out));
                default.collect_blocks(out);
            }
            Region::Unstructured {
                children,
                loose_blocks,
                ..
            } => {
                children.iter().for_each(|c| c.collect_blocks(out));
                out.extend(loose_blocks.iter().copied());
            }
        }
    }

    fn children(&self) -> Vec<&Region> {
        match self {
            Region::Block(_) => vec![],
            Region::Sequence(children) | Region::Unstructured { children, .. } => children.iter().collect(),
            Region::IfThen { then, .. } => vec![then],
            Region::IfThenElse { then, otherwise, .. } => vec![then, otherwise],
            Region::WhileLoop { body, .. } | Region::DoWhileLoop { body, .. } | Region::InfiniteLoop { body, .. } => {
                vec![body]
            }
            Region::Switch { cases, default, .. } => cases
                .iter()
                .map(|case| case.body.as_ref())
                .chain(std::iter::once(default.as_ref()))
                .collect(),
        }
    }

    pub fn all_unstructured_edges(&self) -> Vec<&UnstructuredEdge> {
        let mut edges: Vec<&UnstructuredEdge> = match self {
            Region::Unstructured { edges, .. } => edges.iter().collect(),
            _ => vec![],
        };
        for child in self.children() {
            edges.extend(child.all_unstructured_edges());
        }
        edges
    }

    pub fn is_fully_structured(&self) -> bool {
        self.all_unstructured_edges().is_empty()
    }

    /// Renders the region-kind tree, two spaces per level.
    pub fn summarize(&self, cfg: &ControlFlowGraph, indent: usize) -> String {
        let mut out = String::new();
        self.summarize_into(cfg, indent, &mut out);
        out
    }

    fn summarize_into(&self, cfg: &ControlFlowGraph, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        let label = self.entry_block().map_or_else(|| "<empty>".to_string(), |b| cfg.name(b));
        let unstructured = self.all_unstructured_edges().len();
        let _ = write!(out, "{}{}: {} ({} blocks)", pad, self.kind_name(), label, self.blocks().len());
        if unstructured > 0 {
            let _ = write!(out, " [{} unstructured]", unstructured);
        }
        out.push('\n');

        let section = |out: &mut String, title: &str, region: &Region| {
            let _ = writeln!(out, "{}  {}", pad, title);
            region.summarize_into(cfg, indent + 2, out);
        };
        match self {
            Region::Block(_) => {}
            Region::Sequence(children) => children.iter().for_each(|c| c.summarize_into(cfg, indent + 1, out)),
            Region::IfThen { then, .. } => section(out, "THEN:", then),
            Region::IfThenElse { then, otherwise, .. } => {
                section(out, "THEN:", then);
                section(out, "ELSE:", otherwise);
            }
            Region::WhileLoop { body, .. } | Region::DoWhileLoop { body, .. } | Region::InfiniteLoop { body, .. } => {
                section(out, "BODY:", body)
            }
            Region::Switch { cases, default, .. } => {
                for case in cases {
                    let title = format!(
                        "CASE [{}]: {}",
                        case.values.iter().map(|v| format!("#${:02X}", v)).join(", "),
                        cfg.name(case.target)
                    );
                    section(out, &title, &case.body);
                }
                section(out, "DEFAULT:", default);
            }
            Region::Unstructured {
                children,
                loose_blocks,
                edges,
            } => {
                children.iter().for_each(|c| c.summarize_into(cfg, indent + 1, out));
                if !loose_blocks.is_empty() {
                    let _ = writeln!(
                        out,
                        "{}  LOOSE: {}",
                        pad,
                        loose_blocks.iter().map(|b| cfg.name(*b)).join(", ")
                    );
                }
                for edge in edges {
                    let _ = writeln!(
                        out,
                        "{}  GOTO: {} -> {} ({})",
                        pad,
                        cfg.name(edge.source),
                        cfg.name(edge.target),
                        edge.reason
                    );
                }
            }
        }
    }
}
