// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Dominator trees and dominance frontiers.
//!
//! Immediate dominators are computed with the iterative algorithm of Cooper,
//! Harvey and Kennedy ("A Simple, Fast Dominance Algorithm"): blocks are
//! visited in reverse postorder and each block's idom is the intersection of
//! its already-processed predecessors' dominator chains, until a full pass
//! changes nothing.

use crate::cfg::{BlockId, ControlFlowGraph, Function};
use anyhow::bail;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Reverse postorder of the nodes reachable from `entry`.
fn reverse_postorder_of(node_count: usize, entry: usize, succs: &impl Fn(usize) -> Vec<usize>) -> Vec<usize> {
    let mut visited = vec![false; node_count];
    let mut postorder = Vec::with_capacity(node_count);
    let mut stack: Vec<(usize, Vec<usize>)> = vec![(entry, succs(entry))];
    visited[entry] = true;
    while let Some((node, pending)) = stack.last_mut() {
        let node = *node;
        match pending.pop() {
            Some(next) if !visited[next] => {
                visited[next] = true;
                let next_succs = succs(next);
                stack.push((next, next_succs));
            }
            Some(_) => {}
            None => {
                postorder.push(node);
                stack.pop();
            }
        }
    }
    postorder.reverse();
    postorder
}

/// Computes immediate dominators over nodes `0..node_count`.
///
/// Nodes unreachable from `entry`, and `entry` itself, get `None`. Shared by
/// the dominator tree and by post-dominance, which runs it on the reversed
/// graph.
pub fn solve_idoms(node_count: usize, entry: usize, succs: impl Fn(usize) -> Vec<usize>) -> Vec<Option<usize>> {
    let rpo = reverse_postorder_of(node_count, entry, &succs);
    let mut rpo_index = vec![usize::MAX; node_count];
    for (pos, node) in rpo.iter().enumerate() {
        rpo_index[*node] = pos;
    }
    let mut preds: Vec<Vec<usize>> = vec![vec![]; node_count];
    for &node in &rpo {
        for succ in succs(node) {
            if !preds[succ].contains(&node) {
                preds[succ].push(node);
            }
        }
    }

    let mut idom: Vec<Option<usize>> = vec![None; node_count];
    idom[entry] = Some(entry);
    let intersect = |idom: &[Option<usize>], mut a: usize, mut b: usize| -> usize {
        while a != b {
            while rpo_index[a] > rpo_index[b] {
                a = idom[a].unwrap_or(entry);
            }
            while rpo_index[b] > rpo_index[a] {
                b = idom[b].unwrap_or(entry);
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter().skip(1) {
            let mut new_idom: Option<usize> = None;
            for &pred in &preds[node] {
                if idom[pred].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, pred, current),
                });
            }
            if new_idom.is_some() && idom[node] != new_idom {
                idom[node] = new_idom;
                changed = true;
            }
        }
    }
    idom[entry] = None;
    idom
}

/// Reverse postorder of the function's blocks reachable from its entry.
pub fn reverse_postorder(cfg: &ControlFlowGraph, function: &Function) -> Vec<BlockId> {
    let layout = function.layout();
    let index = function.layout_positions();
    // Visiting the branch first puts the fall-through path earlier in the order.
    let succs = |node: usize| -> Vec<usize> {
        function
            .successors(cfg, layout[node])
            .iter()
            .map(|succ| index[succ])
            .collect()
    };
    reverse_postorder_of(layout.len(), 0, &succs)
        .into_iter()
        .map(|node| layout[node])
        .collect()
}

/// Populates `immediate_dominator`/`dominates` for every block of `function`
/// and checks the resulting tree.
pub fn compute_dominators(cfg: &mut ControlFlowGraph, function: &Function) -> anyhow::Result<()> {
    let layout = function.layout();
    let index = function.layout_positions();
    let idoms = solve_idoms(layout.len(), 0, |node| {
        function
            .successors(cfg, layout[node])
            .iter()
            .map(|succ| index[succ])
            .collect()
    });
    for &block in &layout {
        cfg.set_immediate_dominator(block, None);
    }
    for (node, idom) in idoms.into_iter().enumerate() {
        if let Some(idom) = idom {
            cfg.set_immediate_dominator(layout[node], Some(layout[idom]));
        }
    }
    debug!(
        "[dominance] {}: {} blocks, {} unreachable",
        function.name,
        layout.len(),
        layout
            .iter()
            .filter(|b| **b != function.entry && cfg.block(**b).immediate_dominator().is_none())
            .count()
    );
    verify_dominator_tree(cfg, function)
}

/// Checks that every dominator chain of the function ends at the entry
/// within `blocks.len()` steps, and that the tree links are mutual.
pub fn verify_dominator_tree(cfg: &ControlFlowGraph, function: &Function) -> anyhow::Result<()> {
    let limit = function.blocks.len();
    if cfg.block(function.entry).immediate_dominator().is_some() {
        bail!("entry block {} has an immediate dominator", cfg.name(function.entry));
    }
    for &block in &function.blocks {
        let mut current = block;
        let mut steps = 0;
        while let Some(idom) = cfg.block(current).immediate_dominator() {
            steps += 1;
            if steps > limit {
                bail!("dominator tree has a cycle through block {}", cfg.name(block));
            }
            current = idom;
        }
        if current != block && current != function.entry {
            bail!(
                "dominator chain of {} ends at {} instead of the entry",
                cfg.name(block),
                cfg.name(current)
            );
        }
    }
    cfg.validate_consistency()
}

/// Blocks of `function` reachable from its entry without passing `avoid`.
fn reachable_avoiding(cfg: &ControlFlowGraph, function: &Function, avoid: Option<BlockId>) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut work = vec![function.entry];
    while let Some(block) = work.pop() {
        if Some(block) == avoid || !seen.insert(block) {
            continue;
        }
        work.extend(function.successors(cfg, block));
    }
    seen
}

/// Checks the computed tree against the paths of the graph: every reachable
/// block but the entry has an immediate dominator in the function, and no
/// path from the entry reaches the block around it. Quadratic; meant for
/// tests and diagnostics.
pub fn verify_dominator_soundness(cfg: &ControlFlowGraph, function: &Function) -> anyhow::Result<()> {
    verify_dominator_tree(cfg, function)?;
    for &block in reachable_avoiding(cfg, function, None).iter() {
        if block == function.entry {
            continue;
        }
        let Some(idom) = cfg.block(block).immediate_dominator() else {
            bail!("reachable block {} has no immediate dominator", cfg.name(block));
        };
        if !function.contains(idom) {
            bail!("immediate dominator of {} is outside {}", cfg.name(block), function.name);
        }
        if reachable_avoiding(cfg, function, Some(idom)).contains(&block) {
            bail!(
                "{} is reachable without passing its immediate dominator {}",
                cfg.name(block),
                cfg.name(idom)
            );
        }
    }
    Ok(())
}

/// Whether `block` is dominated by `dominator` (reflexively). The idom chain
/// walk is bounded by the arena size.
pub fn is_dominated_by(cfg: &ControlFlowGraph, block: BlockId, dominator: BlockId) -> bool {
    let mut current = block;
    for _ in 0..=cfg.len() {
        if current == dominator {
            return true;
        }
        match cfg.block(current).immediate_dominator() {
            Some(idom) => current = idom,
            None => return false,
        }
    }
    false
}

/// Dominance frontiers of every reachable block, computed with the runner
/// walk from each predecessor of a join up to the join's idom.
pub fn dominance_frontiers(cfg: &ControlFlowGraph, function: &Function) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    let reachable = |b: BlockId| b == function.entry || cfg.block(b).immediate_dominator().is_some();
    let mut frontiers: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for &block in function.blocks.iter().filter(|b| reachable(**b)) {
        let preds: Vec<BlockId> = function
            .predecessors(cfg, block)
            .into_iter()
            .filter(|p| reachable(*p))
            .collect();
        // Control also enters the entry block from the caller.
        let incoming = preds.len() + usize::from(block == function.entry);
        if incoming < 2 {
            continue;
        }
        let idom = cfg.block(block).immediate_dominator();
        for pred in preds {
            let mut runner = pred;
            for _ in 0..=function.blocks.len() {
                if Some(runner) == idom {
                    break;
                }
                frontiers.entry(runner).or_default().insert(block);
                match cfg.block(runner).immediate_dominator() {
                    Some(next) => runner = next,
                    None => break,
                }
            }
        }
    }
    frontiers
}
