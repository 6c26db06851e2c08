// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! SSA construction over the tracked machine state.
//!
//! Phi nodes are placed on iterated dominance frontiers of each base's
//! definition sites. Renaming walks the dominator tree in preorder: a block
//! starts from its immediate dominator's exit state plus its own phis, and
//! every instruction derives a fresh state from the previous one. Phi sources
//! are filled last, from each predecessor's exit state.

use super::semantics::definitions;
use super::types::{PhiNode, SsaBase, SsaResult, SsaState, SsaValue};
use crate::cfg::{BlockId, ControlFlowGraph, Function};
use crate::dominance::{dominance_frontiers, verify_dominator_tree};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub struct SsaBuilder<'a> {
    cfg: &'a ControlFlowGraph,
    function: &'a Function,
    frontiers: BTreeMap<BlockId, BTreeSet<BlockId>>,
    next_version: BTreeMap<SsaBase, u32>,
    result: SsaResult,
}

/// Builds SSA form for `function`. Dominators must be computed.
pub fn build_ssa(cfg: &ControlFlowGraph, function: &Function) -> anyhow::Result<SsaResult> {
    SsaBuilder::new(cfg, function)?.build()
}

impl<'a> SsaBuilder<'a> {
    pub fn new(cfg: &'a ControlFlowGraph, function: &'a Function) -> anyhow::Result<Self> {
        verify_dominator_tree(cfg, function)?;
        Ok(Self {
            cfg,
            function,
            frontiers: dominance_frontiers(cfg, function),
            next_version: BTreeMap::new(),
            result: SsaResult::default(),
        })
    }

    pub fn build(mut self) -> anyhow::Result<SsaResult> {
        self.result
            .all_values
            .extend(SsaBase::ALL.into_iter().map(SsaValue::param));
        self.place_phis();
        self.rename();
        self.fill_phi_sources();
        debug!(
            "[ssa] {}: {} phis, {} values",
            self.function.name,
            self.result.phi_count(),
            self.result.all_values.len()
        );
        Ok(self.result)
    }

    fn is_reachable(&self, block: BlockId) -> bool {
        block == self.function.entry || self.cfg.block(block).immediate_dominator().is_some()
    }

    fn allocate_version(&mut self, base: SsaBase) -> u32 {
        let version = self.next_version.entry(base).or_insert(0);
        *version += 1;
        *version
    }

    /// Blocks writing each base. The entry defines the function inputs.
    fn definition_sites(&self) -> BTreeMap<SsaBase, BTreeSet<BlockId>> {
        let mut sites: BTreeMap<SsaBase, BTreeSet<BlockId>> = BTreeMap::new();
        for base in self.function.io.inputs.iter() {
            sites.entry(base).or_default().insert(self.function.entry);
        }
        for &block in self.function.blocks.iter().filter(|b| self.is_reachable(**b)) {
            for instr in &self.cfg.block(block).instructions {
                for base in instr.affects.writes.iter() {
                    sites.entry(base).or_default().insert(block);
                }
            }
        }
        sites
    }

    /// Worklist phi placement. A block joins the worklist of a base at most
    /// once, whether as a definition site or as a new phi.
    fn place_phis(&mut self) {
        let sites = self.definition_sites();
        let mut placed: BTreeMap<BlockId, Vec<PhiNode>> = BTreeMap::new();
        for base in SsaBase::ALL {
            let Some(defs) = sites.get(&base) else {
                continue;
            };
            let mut has_phi: BTreeSet<BlockId> = BTreeSet::new();
            let mut ever_on_worklist: BTreeSet<BlockId> = defs.clone();
            let mut worklist: VecDeque<BlockId> = defs.iter().copied().collect();
            while let Some(block) = worklist.pop_front() {
                let Some(frontier) = self.frontiers.get(&block).cloned() else {
                    continue;
                };
                for join in frontier {
                    if !has_phi.insert(join) {
                        continue;
                    }
                    let version = self.allocate_version(base);
                    debug!("[ssa] phi {}_{} at {}", base, version, self.cfg.name(join));
                    placed.entry(join).or_default().push(PhiNode::new(base, version, join));
                    if ever_on_worklist.insert(join) {
                        worklist.push_back(join);
                    }
                }
            }
        }
        for (block, phis) in placed {
            self.result.all_values.extend(phis.iter().map(PhiNode::value));
            self.result.phi_nodes.insert(block, phis);
        }
    }

    /// Renames definitions along the dominator tree in preorder.
    fn rename(&mut self) {
        let mut stack: Vec<(BlockId, SsaState)> = vec![(self.function.entry, SsaState::with_parameters())];
        while let Some((block, incoming)) = stack.pop() {
            let mut state = incoming.with_all(self.result.phis_at(block).iter().map(PhiNode::value));
            self.result.block_entry_state.insert(block, state.clone());

            let mut before = Vec::with_capacity(self.cfg.block(block).instructions.len());
            for instr in &self.cfg.block(block).instructions {
                before.push(state.clone());
                let mut next = state.clone();
                for (base, expr) in definitions(instr, &state) {
                    let version = self.allocate_version(base);
                    let value = SsaValue::new(base, version, expr, Some(block));
                    self.result.all_values.push(value.clone());
                    next = next.with(value);
                }
                state = next;
            }
            self.result.instruction_states.insert(block, before);
            self.result.block_exit_state.insert(block, state.clone());

            let children: Vec<BlockId> = self
                .cfg
                .block(block)
                .dominates()
                .iter()
                .copied()
                .filter(|child| self.function.contains(*child))
                .collect();
            for child in children.into_iter().rev() {
                stack.push((child, state.clone()));
            }
        }
    }

    fn fill_phi_sources(&mut self) {
        let function = self.function;
        let cfg = self.cfg;
        let exits = &self.result.block_exit_state;
        for (block, phis) in self.result.phi_nodes.iter_mut() {
            for pred in function.predecessors(cfg, *block) {
                for phi in phis.iter_mut() {
                    let source = match exits.get(&pred).and_then(|state| state.get(phi.target)) {
                        Some(value) => value.clone(),
                        None => {
                            warn!(
                                "[ssa] no exit value of {} in {} for phi at {}; using the incoming parameter",
                                phi.target,
                                cfg.name(pred),
                                cfg.name(*block)
                            );
                            SsaValue::param(phi.target)
                        }
                    };
                    phi.sources.insert(pred, source);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dominance::compute_dominators;
    use crate::instruction::{Instruction, Op, Operand};
    use crate::listing::{Listing, Program};
    use crate::ssa::{BaseSet, SsaExpr, SsaName};

    fn to(op: Op, label: &str) -> Instruction {
        Instruction::new(op, Operand::Label(label.into()))
    }

    fn build(listing: Listing) -> (Program, SsaResult) {
        let mut program = listing.build().unwrap();
        let function = program.functions[0].clone();
        compute_dominators(&mut program.cfg, &function).unwrap();
        let ssa = build_ssa(&program.cfg, &function).unwrap();
        (program, ssa)
    }

    #[test]
    fn test_counting_loop_gets_header_phi() {
        let (program, ssa) = build(
            Listing::new()
                .block("start", vec![Instruction::new(Op::Ldx, Operand::Immediate(5))])
                .block("loop", vec![Instruction::implied(Op::Dex), to(Op::Bne, "loop")])
                .block("done", vec![Instruction::implied(Op::Rts)]),
        );
        let header = program.cfg.block_by_label("loop").unwrap();
        let phis = ssa.phis_at(header);
        let x_phi = phis.iter().find(|p| p.target == SsaBase::RegisterX).unwrap();
        assert_eq!(x_phi.sources.len(), 2);
        // From the entry: the LDX value. From the latch: the DEX value.
        let from_start = &x_phi.sources[&0];
        let from_latch = &x_phi.sources[&header];
        assert_eq!(*from_start.expr, SsaExpr::Const(5));
        assert_eq!(from_latch.block, Some(header));
        assert_ne!(from_latch.name(), x_phi.name());
        assert!(phis.iter().all(|p| p.target != SsaBase::RegisterA));
        assert_eq!(ssa.entry_state(header).unwrap().get(SsaBase::RegisterX).unwrap().name(), x_phi.name());
    }

    #[test]
    fn test_diamond_join_merges_both_arms() {
        let (program, ssa) = build(
            Listing::new()
                .block("start", vec![Instruction::implied(Op::Tax), to(Op::Beq, "zero")])
                .block("nonzero", vec![Instruction::new(Op::Lda, Operand::Immediate(1)), to(Op::Jmp, "join")])
                .block("zero", vec![Instruction::new(Op::Lda, Operand::Immediate(2))])
                .block("join", vec![Instruction::implied(Op::Rts)]),
        );
        let join = program.cfg.block_by_label("join").unwrap();
        let a_phi = ssa
            .phis_at(join)
            .iter()
            .find(|p| p.target == SsaBase::RegisterA)
            .unwrap();
        let sources: Vec<SsaExpr> = a_phi.sources.values().map(|v| (*v.expr).clone()).collect();
        assert_eq!(sources, vec![SsaExpr::Const(1), SsaExpr::Const(2)]);
        // X is only written before the split.
        assert!(ssa.phis_at(join).iter().all(|p| p.target != SsaBase::RegisterX));
        assert_eq!(
            a_phi.display_with(|b| program.cfg.name(b)).to_string(),
            format!(
                "{} = phi(A_{} from nonzero, A_{} from zero)",
                a_phi.name(),
                a_phi.sources[&1].version,
                a_phi.sources[&2].version
            )
        );
    }

    #[test]
    fn test_instruction_states_and_definitions() {
        let (_, ssa) = build(
            Listing::new().block(
                "only",
                vec![
                    Instruction::new(Op::Lda, Operand::Immediate(7)),
                    Instruction::implied(Op::Tax),
                    Instruction::implied(Op::Rts),
                ],
            ),
        );
        assert_eq!(ssa.phi_count(), 0);
        let before_tax = ssa.state_before(0, 1).unwrap();
        let a = before_tax.get(SsaBase::RegisterA).unwrap();
        let defs = ssa.defined_by(0, 1);
        let x = defs.iter().find(|v| v.base == SsaBase::RegisterX).unwrap();
        assert_eq!(*x.expr, SsaExpr::Value(a.name()));
        assert!(ssa.defined_by(0, 2).is_empty());
        assert_eq!(ssa.state_before(0, 0).unwrap().get(SsaBase::RegisterY).unwrap().name(), SsaName::param(SsaBase::RegisterY));
        // Seven parameters, three values from LDA, three from TAX.
        assert_eq!(ssa.all_values.len(), 13);
    }

    #[test]
    fn test_loop_at_function_entry_merges_parameters() {
        let (_, ssa) = build(
            Listing::new()
                .block("top", vec![Instruction::implied(Op::Iny), to(Op::Bne, "top")])
                .block("out", vec![Instruction::implied(Op::Rts)])
                .function("f", "top", BaseSet::of(&[SsaBase::RegisterY]), BaseSet::empty()),
        );
        let y_phi = ssa.phis_at(0).iter().find(|p| p.target == SsaBase::RegisterY).unwrap();
        // Only the back edge enters the entry block.
        assert_eq!(y_phi.sources.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(ssa.state_before(0, 0).unwrap().get(SsaBase::RegisterY).unwrap().name(), y_phi.name());
    }
}
