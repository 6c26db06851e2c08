// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::cfg::BlockId;
use crate::dominance::solve_idoms;
use std::collections::{BTreeMap, BTreeSet};

/// Immediate post-dominators inside a region of blocks.
///
/// `exits_of(b)` yields b's successors inside the region and whether b can
/// also leave it (a return, a loop exit, a jump back to the loop header).
/// Leaving edges all meet at one virtual exit; blocks whose only
/// post-dominator is that exit are absent from the result.
pub fn immediate_post_dominators(
    nodes: &[BlockId],
    exits_of: impl Fn(BlockId) -> (Vec<BlockId>, bool),
) -> BTreeMap<BlockId, BlockId> {
    let exit = nodes.len();
    let index: BTreeMap<BlockId, usize> = nodes.iter().enumerate().map(|(i, b)| (*b, i)).collect();
    let mut reversed: Vec<Vec<usize>> = vec![vec![]; nodes.len() + 1];
    for (i, block) in nodes.iter().enumerate() {
        let (inside, leaves) = exits_of(*block);
        for succ in inside {
            if let Some(&j) = index.get(&succ) {
                reversed[j].push(i);
            }
        }
        if leaves {
            reversed[exit].push(i);
        }
    }
    let idoms = solve_idoms(nodes.len() + 1, exit, |n| reversed[n].clone());
    nodes
        .iter()
        .enumerate()
        .filter_map(|(i, block)| match idoms[i] {
            Some(p) if p != exit => Some((*block, nodes[p])),
            _ => None,
        })
        .collect()
}

/// Determines if `start` can reach `target` by searching the graph given by
/// `succs`, entering only blocks accepted by `within`.
pub fn can_reach(
    start: BlockId,
    target: BlockId,
    succs: impl Fn(BlockId) -> Vec<BlockId>,
    within: impl Fn(BlockId) -> bool,
) -> bool {
    if start == target {
        return true;
    }
    let mut work: Vec<BlockId> = vec![start];
    let mut seen: BTreeSet<BlockId> = BTreeSet::new();
    while let Some(current_block) = work.pop() {
        if current_block == target {
            return true;
        }
        if !seen.insert(current_block) {
            continue;
        }
        for next_block in succs(current_block) {
            if next_block == target || (within(next_block) && !seen.contains(&next_block)) {
                work.push(next_block);
            }
        }
    }
    false
}
