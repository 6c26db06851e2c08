// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Natural loop detection on top of a computed dominator tree.

use crate::cfg::{BlockId, ControlFlowGraph, Function};
use crate::dominance::is_dominated_by;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NaturalLoop {
    pub header: BlockId,
    /// `(tail, header)` pairs.
    pub back_edges: BTreeSet<(BlockId, BlockId)>,
    /// Blocks of the loop, header included.
    pub body: BTreeSet<BlockId>,
    /// Blocks outside the body entered from inside it.
    pub exits: BTreeSet<BlockId>,
}

impl NaturalLoop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }

    pub fn is_single_block(&self) -> bool {
        self.body.len() == 1
    }

    /// Back-edge sources, in id order.
    pub fn latches(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.back_edges.iter().map(|(tail, _)| *tail)
    }
}

/// Finds every natural loop of `function`. Dominators must be computed.
/// Loops sharing a header are merged; the result is ordered by the header's
/// layout position.
pub fn find_natural_loops(cfg: &ControlFlowGraph, function: &Function) -> Vec<NaturalLoop> {
    let reachable = |b: BlockId| b == function.entry || cfg.block(b).immediate_dominator().is_some();
    let mut loops: BTreeMap<BlockId, NaturalLoop> = BTreeMap::new();

    for edge in function.edges(cfg) {
        let (tail, header) = (edge.source, edge.target);
        if !reachable(tail) || !is_dominated_by(cfg, tail, header) {
            continue;
        }
        let body = loop_body(cfg, function, tail, header);
        let natural_loop = loops.entry(header).or_insert_with(|| NaturalLoop {
            header,
            back_edges: BTreeSet::new(),
            body: BTreeSet::new(),
            exits: BTreeSet::new(),
        });
        natural_loop.back_edges.insert((tail, header));
        natural_loop.body.extend(body);
    }

    for natural_loop in loops.values_mut() {
        natural_loop.exits = natural_loop
            .body
            .iter()
            .flat_map(|b| function.successors(cfg, *b))
            .filter(|succ| !natural_loop.body.contains(succ))
            .collect();
        debug!(
            "[loops] {} header={} body={:?} exits={:?}",
            function.name,
            cfg.name(natural_loop.header),
            natural_loop.body,
            natural_loop.exits
        );
    }

    let positions = function.layout_positions();
    let mut result: Vec<NaturalLoop> = loops.into_values().collect();
    result.sort_by_key(|l| positions.get(&l.header).copied().unwrap_or(usize::MAX));
    result
}

/// Blocks reaching `tail` backwards without passing through `header`.
fn loop_body(cfg: &ControlFlowGraph, function: &Function, tail: BlockId, header: BlockId) -> BTreeSet<BlockId> {
    let mut body = BTreeSet::from([header]);
    let mut work = vec![tail];
    while let Some(block) = work.pop() {
        if !body.insert(block) {
            continue;
        }
        for pred in function.predecessors(cfg, block) {
            // Unreachable predecessors are not dominated by the header.
            if !body.contains(&pred) && is_dominated_by(cfg, pred, header) {
                work.push(pred);
            }
        }
    }
    body
}
