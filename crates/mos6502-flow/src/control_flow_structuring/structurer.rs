// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Region reconstruction.
//!
//! The builder walks the CFG from the entry, placing each block exactly once.
//! A walk follows one path until it reaches its continuation (the join the
//! enclosing construct resumes at) or a block it may not place; the latter
//! becomes a goto along the edges that led there. Every edge ends up either
//! consumed by a construct or reported as unstructured.

use super::edge_tracking::{EdgeTracker, EdgeValidationReport};
use super::helpers::{can_reach, immediate_post_dominators};
use super::idioms::{find_branch_pairs, find_compare_chains, BranchPair, CompareChain};
use super::regions::{DispatchTest, Region, Selector, SwitchCase, UnstructuredEdge};
use crate::cfg::{BlockId, ControlFlowGraph, Function};
use crate::natural_loops::NaturalLoop;
use crate::options::StructureOptions;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// The region tree of a function and its edge accounting.
#[derive(Clone, Debug)]
pub struct StructureResult {
    pub region: Region,
    pub report: EdgeValidationReport,
}

/// Blocks a walk may currently place, with their post-dominators.
struct Scope {
    body: BTreeSet<BlockId>,
    header: Option<BlockId>,
    ipdom: BTreeMap<BlockId, BlockId>,
}

/// What placing one block (or the construct it heads) produced, and where
/// the walk goes next along which edges.
struct Step {
    region: Region,
    next: Option<BlockId>,
    pending: Vec<(BlockId, BlockId)>,
}

impl Step {
    fn end(region: Region) -> Self {
        Step {
            region,
            next: None,
            pending: vec![],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopShape {
    PreTest {
        line: usize,
        inside: BlockId,
        outside: BlockId,
    },
    PostTest {
        latch: BlockId,
        line: usize,
        outside: BlockId,
    },
    Infinite,
}

struct StructuringContext<'a> {
    cfg: &'a ControlFlowGraph,
    function: &'a Function,
    loops: BTreeMap<BlockId, &'a NaturalLoop>,
    /// Complementary branch pairs keyed by the always-taken second block.
    pairs: BTreeMap<BlockId, BranchPair>,
    chains: BTreeMap<BlockId, CompareChain>,
    positions: BTreeMap<BlockId, usize>,
    /// Blocks reachable from the entry along feasible edges.
    reachable: BTreeSet<BlockId>,
    tracker: EdgeTracker,
    placed: BTreeSet<BlockId>,
    active_loops: Vec<BlockId>,
    /// Post-test latches, placed last in their loop body.
    reserved: BTreeSet<BlockId>,
    /// Joins of constructs whose arms are being walked.
    pending_joins: Vec<BlockId>,
    scopes: Vec<Scope>,
}

/// Builds the region tree of `function`. Dominators must be computed and
/// `loops` must be the function's natural loops.
pub fn structure_function(
    cfg: &ControlFlowGraph,
    function: &Function,
    loops: &[NaturalLoop],
    options: &StructureOptions,
) -> anyhow::Result<StructureResult> {
    let mut ctx = StructuringContext::new(cfg, function, loops, options);
    let top = ctx.reachable.clone();
    ctx.push_scope(top, None, None);

    let mut main = vec![];
    ctx.walk(&mut main, function.entry, vec![], None);
    let mut children = vec![Region::sequence(main)];

    // Blocks entered only through gotos whose walks never got to place them.
    for block in ctx.feasible_order() {
        if ctx.placed.contains(&block) {
            continue;
        }
        warn!(
            "[structurer] {}: block {} was not placed by the structured walk",
            function.name,
            cfg.name(block)
        );
        let mut seq = vec![];
        ctx.walk(&mut seq, block, vec![], None);
        children.push(Region::sequence(seq));
    }
    ctx.scopes.pop();

    let loose_blocks: Vec<BlockId> = function
        .layout()
        .into_iter()
        .filter(|b| !ctx.reachable.contains(b))
        .collect();
    let mut loose_edges = vec![];
    for &block in &loose_blocks {
        for succ in function.successors(cfg, block) {
            ctx.tracker.mark_unstructured(block, succ, "unreachable block");
            loose_edges.push(UnstructuredEdge {
                source: block,
                target: succ,
                reason: "unreachable block".to_string(),
            });
        }
    }

    let region = if children.len() == 1 && loose_blocks.is_empty() {
        children.remove(0)
    } else {
        Region::Unstructured {
            children,
            loose_blocks,
            edges: loose_edges,
        }
    };

    let report = if options.fail_on_missing_edges {
        ctx.tracker.validate()?
    } else {
        ctx.tracker.validate_soft()
    };
    info!(
        "[structurer] {}: {} edges, {} consumed, {} unstructured, {} missing",
        function.name,
        report.all_edges.len(),
        report.consumed_edges.len(),
        report.unstructured_edges.len(),
        report.missing_edges.len()
    );
    Ok(StructureResult { region, report })
}

impl<'a> StructuringContext<'a> {
    fn new(
        cfg: &'a ControlFlowGraph,
        function: &'a Function,
        loops: &'a [NaturalLoop],
        options: &StructureOptions,
    ) -> Self {
        let pairs = if options.recognize_6502_idioms {
            find_branch_pairs(cfg, function)
        } else {
            BTreeMap::new()
        };
        let chains = if options.recover_switches {
            find_compare_chains(cfg, function, options.min_switch_cases)
        } else {
            BTreeMap::new()
        };
        let mut ctx = Self {
            cfg,
            function,
            loops: loops.iter().map(|l| (l.header, l)).collect(),
            pairs,
            chains,
            positions: function.layout_positions(),
            reachable: BTreeSet::new(),
            tracker: EdgeTracker::new(cfg, function),
            placed: BTreeSet::new(),
            active_loops: vec![],
            reserved: BTreeSet::new(),
            pending_joins: vec![],
            scopes: vec![],
        };
        let mut work = vec![function.entry];
        while let Some(block) = work.pop() {
            if ctx.reachable.insert(block) {
                work.extend(ctx.succs(block));
            }
        }
        ctx
    }

    /// Feasible successors, fall-through first. The fall-through of the
    /// second block of a complementary pair can never run.
    fn succs(&self, block: BlockId) -> Vec<BlockId> {
        if self.pairs.contains_key(&block) {
            return self
                .cfg
                .block(block)
                .branch()
                .filter(|t| self.function.contains(*t))
                .into_iter()
                .collect();
        }
        self.function.successors(self.cfg, block)
    }

    /// Reachable blocks in reverse postorder along feasible edges.
    fn feasible_order(&self) -> Vec<BlockId> {
        let mut visited = BTreeSet::from([self.function.entry]);
        let mut postorder = vec![];
        let mut stack = vec![(self.function.entry, self.succs(self.function.entry))];
        while let Some((block, pending)) = stack.last_mut() {
            let block = *block;
            match pending.pop() {
                Some(next) if visited.insert(next) => {
                    let next_succs = self.succs(next);
                    stack.push((next, next_succs));
                }
                Some(_) => {}
                None => {
                    postorder.push(block);
                    stack.pop();
                }
            }
        }
        postorder.reverse();
        postorder
    }

    fn push_scope(&mut self, body: BTreeSet<BlockId>, header: Option<BlockId>, latch: Option<BlockId>) {
        let nodes: Vec<BlockId> = body.iter().copied().collect();
        let ipdom = immediate_post_dominators(&nodes, |block| {
            if Some(block) == latch {
                return (vec![], true);
            }
            let succs = self.succs(block);
            let inside: Vec<BlockId> = succs
                .iter()
                .copied()
                .filter(|s| body.contains(s) && Some(*s) != header)
                .collect();
            let leaves = succs.is_empty() || inside.len() < succs.len();
            (inside, leaves)
        });
        self.scopes.push(Scope { body, header, ipdom });
    }

    fn in_scope(&self, block: BlockId) -> bool {
        self.scopes
            .last()
            .map_or(self.reachable.contains(&block), |scope| scope.body.contains(&block))
    }

    fn placeable(&self, block: BlockId) -> bool {
        !self.placed.contains(&block)
            && !self.reserved.contains(&block)
            && !self.pending_joins.contains(&block)
            && self.in_scope(block)
    }

    fn enterable(&self, block: BlockId, continuation: Option<BlockId>) -> bool {
        Some(block) == continuation || self.placeable(block)
    }

    fn goto_reason(&self, target: BlockId) -> &'static str {
        if self.active_loops.contains(&target) {
            "loop continue"
        } else if !self.in_scope(target) {
            "loop exit (break)"
        } else if self.reserved.contains(&target) {
            "jump to loop latch"
        } else if self.pending_joins.contains(&target) {
            "jump to enclosing join"
        } else {
            "jump to already structured block"
        }
    }

    fn goto_region(&mut self, edges: &[(BlockId, BlockId)], target: BlockId) -> Region {
        let reason = self.goto_reason(target);
        debug!(
            "[structurer] goto {} ({}) from {:?}",
            self.cfg.name(target),
            reason,
            edges
        );
        Region::goto(
            edges
                .iter()
                .map(|&(source, target)| {
                    self.tracker.mark_unstructured(source, target, reason);
                    UnstructuredEdge {
                        source,
                        target,
                        reason: reason.to_string(),
                    }
                })
                .collect(),
        )
    }

    fn consume_all(&mut self, edges: &[(BlockId, BlockId)]) {
        for &(source, target) in edges {
            self.tracker.consume(source, target);
        }
    }

    /// Places regions into `seq` starting at `start`, entered along
    /// `pending`, until `continuation` or a block that may not be placed.
    fn walk(
        &mut self,
        seq: &mut Vec<Region>,
        start: BlockId,
        pending: Vec<(BlockId, BlockId)>,
        continuation: Option<BlockId>,
    ) {
        let mut cursor = start;
        let mut pending = pending;
        loop {
            if Some(cursor) == continuation {
                self.consume_all(&pending);
                return;
            }
            if !self.placeable(cursor) {
                if !pending.is_empty() {
                    let goto = self.goto_region(&pending, cursor);
                    seq.push(goto);
                }
                return;
            }
            self.consume_all(&pending);
            let step = self.structure_block(cursor, continuation);
            seq.push(step.region);
            match step.next {
                Some(next) => {
                    cursor = next;
                    pending = step.pending;
                }
                None => return,
            }
        }
    }

    /// Walks one arm of a construct entered from `from`.
    fn arm(&mut self, from: BlockId, entry: BlockId, continuation: Option<BlockId>) -> Region {
        let mut seq = vec![];
        self.walk(&mut seq, entry, vec![(from, entry)], continuation);
        Region::sequence(seq)
    }

    fn structure_block(&mut self, block: BlockId, continuation: Option<BlockId>) -> Step {
        if !self.active_loops.contains(&block) {
            if let Some(natural_loop) = self.loops.get(&block).copied() {
                return self.structure_loop(natural_loop);
            }
        }
        if let Some(chain) = self.chains.get(&block).cloned() {
            if chain.blocks().skip(1).all(|link| self.placeable(link)) {
                return self.structure_switch(chain, continuation);
            }
        }

        let succs = self.succs(block);
        if succs.len() == 2 {
            if let Some((line, _)) = self.cfg.block(block).conditional_branch() {
                return self.structure_if(block, line, succs[0], succs[1], continuation);
            }
        }

        self.placed.insert(block);
        if self.pairs.contains_key(&block) {
            if let Some(dead) = self.cfg.block(block).fall_through() {
                debug!(
                    "[structurer] {} -> {} is infeasible after the complementary branch",
                    self.cfg.name(block),
                    self.cfg.name(dead)
                );
                self.tracker.consume(block, dead);
            }
        }
        for &extra in succs.iter().skip(1) {
            self.tracker
                .mark_unstructured(block, extra, "second successor of a non-branching block");
        }
        let next = succs.first().copied();
        Step {
            region: Region::Block(block),
            next,
            pending: next.map(|n| vec![(block, n)]).unwrap_or_default(),
        }
    }

    /// Two-way conditional at `block`, falling through to `not_taken` and
    /// branching to `taken`.
    fn structure_if(
        &mut self,
        block: BlockId,
        line: usize,
        not_taken: BlockId,
        taken: BlockId,
        continuation: Option<BlockId>,
    ) -> Step {
        self.placed.insert(block);

        // One arm leaves the construct: it is a conditional break/continue.
        if !self.enterable(taken, continuation) {
            let then = self.goto_region(&[(block, taken)], taken);
            return Step {
                region: Region::IfThen {
                    cond_block: block,
                    cond_line: line,
                    sense: true,
                    then: Box::new(then),
                    join: Some(not_taken),
                },
                next: Some(not_taken),
                pending: vec![(block, not_taken)],
            };
        }
        if !self.enterable(not_taken, continuation) {
            let then = self.goto_region(&[(block, not_taken)], not_taken);
            return Step {
                region: Region::IfThen {
                    cond_block: block,
                    cond_line: line,
                    sense: false,
                    then: Box::new(then),
                    join: Some(taken),
                },
                next: Some(taken),
                pending: vec![(block, taken)],
            };
        }

        let merge = self.find_merge(block, not_taken, taken, continuation);
        debug!(
            "[structurer] if at {}: not taken {}, taken {}, merge {:?}",
            self.cfg.name(block),
            self.cfg.name(not_taken),
            self.cfg.name(taken),
            merge.map(|m| self.cfg.name(m))
        );
        let Some(merge) = merge else {
            return self.structure_if_without_merge(block, line, not_taken, taken, continuation);
        };

        let joined = Some(merge) != continuation;
        if joined {
            self.pending_joins.push(merge);
        }
        let region = if merge == not_taken {
            self.tracker.consume(block, not_taken);
            Region::IfThen {
                cond_block: block,
                cond_line: line,
                sense: true,
                then: Box::new(self.arm(block, taken, Some(merge))),
                join: Some(merge),
            }
        } else if merge == taken {
            self.tracker.consume(block, taken);
            Region::IfThen {
                cond_block: block,
                cond_line: line,
                sense: false,
                then: Box::new(self.arm(block, not_taken, Some(merge))),
                join: Some(merge),
            }
        } else {
            let then = self.arm(block, not_taken, Some(merge));
            let otherwise = self.arm(block, taken, Some(merge));
            Region::IfThenElse {
                cond_block: block,
                cond_line: line,
                sense: false,
                then: Box::new(then),
                otherwise: Box::new(otherwise),
                join: Some(merge),
            }
        };
        if joined {
            self.pending_joins.pop();
        }
        Step {
            region,
            next: Some(merge),
            pending: vec![],
        }
    }

    /// Neither arm post-dominates the other. An arm that never rejoins (it
    /// returns or loops forever) becomes a guard clause and the other arm
    /// follows the `if`; otherwise both arms run to the enclosing
    /// continuation.
    fn structure_if_without_merge(
        &mut self,
        block: BlockId,
        line: usize,
        not_taken: BlockId,
        taken: BlockId,
        continuation: Option<BlockId>,
    ) -> Step {
        for (arm, follow, sense) in [(not_taken, taken, false), (taken, not_taken, true)] {
            if self.is_closed_arm(arm, follow) {
                let then = self.arm(block, arm, continuation);
                return Step {
                    region: Region::IfThen {
                        cond_block: block,
                        cond_line: line,
                        sense,
                        then: Box::new(then),
                        join: Some(follow),
                    },
                    next: Some(follow),
                    pending: vec![(block, follow)],
                };
            }
        }
        let then = self.arm(block, not_taken, continuation);
        let otherwise = self.arm(block, taken, continuation);
        Step::end(Region::IfThenElse {
            cond_block: block,
            cond_line: line,
            sense: false,
            then: Box::new(then),
            otherwise: Box::new(otherwise),
            join: None,
        })
    }

    /// Whether everything reachable from `entry` can be placed here and
    /// none of it leads to `other` or anywhere else outside.
    fn is_closed_arm(&self, entry: BlockId, other: BlockId) -> bool {
        let mut seen = BTreeSet::new();
        let mut work = vec![entry];
        while let Some(block) = work.pop() {
            if block == other || !self.placeable(block) {
                return false;
            }
            if seen.insert(block) {
                work.extend(self.succs(block));
            }
        }
        true
    }

    /// The join of a two-way branch: its post-dominator in the current scope,
    /// or else the arm the other one reaches.
    fn find_merge(
        &self,
        block: BlockId,
        not_taken: BlockId,
        taken: BlockId,
        continuation: Option<BlockId>,
    ) -> Option<BlockId> {
        let acceptable = |m: &BlockId| self.enterable(*m, continuation);
        let ipdom = self.scopes.last().and_then(|s| s.ipdom.get(&block).copied());
        if let Some(merge) = ipdom.filter(acceptable) {
            return Some(merge);
        }
        let fallback = if self.scope_reaches(not_taken, taken) {
            Some(taken)
        } else if self.scope_reaches(taken, not_taken) {
            Some(not_taken)
        } else {
            None
        };
        fallback.filter(acceptable)
    }

    /// Reachability inside the current scope, not passing its header.
    fn scope_reaches(&self, from: BlockId, to: BlockId) -> bool {
        let header = self.scopes.last().and_then(|s| s.header);
        can_reach(
            from,
            to,
            |b| self.succs(b),
            |b| self.in_scope(b) && Some(b) != header,
        )
    }

    fn loop_shape(&self, natural_loop: &NaturalLoop, body: &BTreeSet<BlockId>) -> LoopShape {
        let header = natural_loop.header;
        let header_block = self.cfg.block(header);

        let pre_test = match (self.succs(header).as_slice(), header_block.conditional_branch()) {
            (&[first, second], Some((line, _))) => {
                match (body.contains(&first) && first != header, body.contains(&second) && second != header) {
                    (true, false) if !body.contains(&second) => Some(LoopShape::PreTest {
                        line,
                        inside: first,
                        outside: second,
                    }),
                    (false, true) if !body.contains(&first) => Some(LoopShape::PreTest {
                        line,
                        inside: second,
                        outside: first,
                    }),
                    _ => None,
                }
            }
            _ => None,
        };

        let latch = natural_loop
            .latches()
            .filter(|t| self.reachable.contains(t))
            .max_by_key(|t| self.positions.get(t).copied().unwrap_or(0));
        let post_test = latch.and_then(|latch| {
            let (line, _) = self.cfg.block(latch).conditional_branch()?;
            match self.succs(latch).as_slice() {
                &[a, b] if a == header && !body.contains(&b) => Some(LoopShape::PostTest {
                    latch,
                    line,
                    outside: b,
                }),
                &[a, b] if b == header && !body.contains(&a) => Some(LoopShape::PostTest {
                    latch,
                    line,
                    outside: a,
                }),
                _ => None,
            }
        });

        let header_does_work = header_block
            .body()
            .iter()
            .take_while(|instr| !instr.op.is_compare())
            .any(|instr| instr.op.modifies_loop_state());
        let same_flag = match (pre_test, post_test) {
            (Some(LoopShape::PreTest { line: h_line, .. }), Some(LoopShape::PostTest { latch, line: t_line, .. })) => {
                let flag = |b: BlockId, line: usize| self.cfg.block(b).instructions[line].op.branch_flag();
                latch != header && flag(header, h_line) == flag(latch, t_line)
            }
            _ => false,
        };

        match (pre_test, post_test) {
            (Some(pre), Some(post)) => {
                if natural_loop.is_single_block() || same_flag || header_does_work {
                    post
                } else {
                    pre
                }
            }
            (Some(pre), None) => pre,
            (None, Some(post)) => post,
            (None, None) => LoopShape::Infinite,
        }
    }

    fn structure_loop(&mut self, natural_loop: &'a NaturalLoop) -> Step {
        let header = natural_loop.header;
        let body: BTreeSet<BlockId> = natural_loop
            .body
            .iter()
            .copied()
            .filter(|b| self.reachable.contains(b))
            .collect();
        let shape = self.loop_shape(natural_loop, &body);
        debug!(
            "[structurer] loop at {} ({} blocks): {:?}",
            self.cfg.name(header),
            body.len(),
            shape
        );
        self.active_loops.push(header);

        let step = match shape {
            LoopShape::PreTest { line, inside, outside } => {
                self.placed.insert(header);
                self.push_scope(body, Some(header), None);
                let mut seq = vec![];
                self.walk(&mut seq, inside, vec![(header, inside)], Some(header));
                self.scopes.pop();
                Step {
                    region: Region::WhileLoop {
                        header,
                        cond_line: line,
                        sense: self.cfg.block(header).branch() == Some(inside),
                        body: Box::new(Region::sequence(seq)),
                        exit: Some(outside),
                    },
                    next: Some(outside),
                    pending: vec![(header, outside)],
                }
            }
            LoopShape::PostTest { latch, line, outside } => {
                self.push_scope(body, Some(header), Some(latch));
                let mut seq = vec![];
                if latch == header {
                    self.placed.insert(header);
                    seq.push(Region::Block(header));
                } else {
                    self.reserved.insert(latch);
                    let first = self.structure_block(header, Some(latch));
                    seq.push(first.region);
                    if let Some(next) = first.next {
                        self.walk(&mut seq, next, first.pending, Some(latch));
                    }
                    self.reserved.remove(&latch);
                    self.placed.insert(latch);
                    seq.push(Region::Block(latch));
                }
                self.tracker.consume(latch, header);
                self.scopes.pop();
                Step {
                    region: Region::DoWhileLoop {
                        header,
                        cond_block: latch,
                        cond_line: line,
                        sense: self.cfg.block(latch).branch() == Some(header),
                        body: Box::new(Region::sequence(seq)),
                        exit: Some(outside),
                    },
                    next: Some(outside),
                    pending: vec![(latch, outside)],
                }
            }
            LoopShape::Infinite => {
                self.push_scope(body, Some(header), None);
                let first = self.structure_block(header, Some(header));
                let mut seq = vec![first.region];
                if let Some(next) = first.next {
                    self.walk(&mut seq, next, first.pending, Some(header));
                }
                self.scopes.pop();
                // Exits were lowered to breaks; resume at the first of them.
                let follow = natural_loop
                    .exits
                    .iter()
                    .copied()
                    .filter(|e| self.reachable.contains(e))
                    .min_by_key(|e| self.positions.get(e).copied().unwrap_or(usize::MAX));
                Step {
                    region: Region::InfiniteLoop {
                        header,
                        body: Box::new(Region::sequence(seq)),
                    },
                    next: follow,
                    pending: vec![],
                }
            }
        };

        self.active_loops.pop();
        step
    }

    fn structure_switch(&mut self, chain: CompareChain, continuation: Option<BlockId>) -> Step {
        let head = chain.head();
        for link in chain.blocks() {
            self.placed.insert(link);
        }
        for pair in chain.tests.windows(2) {
            self.tracker.consume(pair[0].0, pair[1].0);
        }
        let last = chain.tests.last().map_or(head, |(block, _, _)| *block);

        let join = self
            .scopes
            .last()
            .and_then(|s| s.ipdom.get(&head).copied())
            .filter(|j| self.enterable(*j, continuation));
        debug!(
            "[structurer] switch at {} on {} with {} tests, join {:?}",
            self.cfg.name(head),
            chain.register,
            chain.tests.len(),
            join.map(|j| self.cfg.name(j))
        );
        let stop = join.or(continuation);
        let joined = join.is_some() && join != continuation;
        if let (true, Some(join)) = (joined, join) {
            self.pending_joins.push(join);
        }

        // Tests sharing a target share one case.
        let mut groups: Vec<(BlockId, Vec<u8>, Vec<BlockId>)> = vec![];
        for &(block, value, target) in &chain.tests {
            match groups.iter_mut().find(|(t, _, _)| *t == target) {
                Some((_, values, sources)) => {
                    values.push(value);
                    sources.push(block);
                }
                None => groups.push((target, vec![value], vec![block])),
            }
        }

        let mut cases = vec![];
        for (target, values, sources) in groups {
            let edges: Vec<(BlockId, BlockId)> = sources.iter().map(|s| (*s, target)).collect();
            let body = if Some(target) == join {
                self.consume_all(&edges);
                Region::Sequence(vec![])
            } else {
                let mut seq = vec![];
                self.walk(&mut seq, target, edges, stop);
                Region::sequence(seq)
            };
            cases.push(SwitchCase {
                values,
                target,
                body: Box::new(body),
            });
        }

        let default = if Some(chain.default) == join {
            self.tracker.consume(last, chain.default);
            Region::Sequence(vec![])
        } else {
            self.arm(last, chain.default, stop)
        };
        if joined {
            self.pending_joins.pop();
        }

        Step {
            region: Region::Switch {
                selector: Selector {
                    block: head,
                    register: chain.register,
                },
                dispatch: chain
                    .tests
                    .iter()
                    .map(|&(block, value, target)| DispatchTest { block, value, target })
                    .collect(),
                cases,
                default: Box::new(default),
                join,
            },
            next: join,
            pending: vec![],
        }
    }
}
