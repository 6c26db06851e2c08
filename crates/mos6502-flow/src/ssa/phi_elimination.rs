// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Lowering phi nodes to variables and predecessor-end copies.
//!
//! Each phi becomes a variable declared at function top, holding its base's
//! incoming parameter until a copy assigns it. Every predecessor of the phi
//! block assigns the value it carries at its end; a copy whose value is the
//! phi itself is dropped.

use super::types::{PhiNode, SsaExpr, SsaName, SsaResult, SsaValue};
use crate::cfg::{BlockId, ControlFlowGraph, Function};
use crate::dominance::is_dominated_by;
use itertools::Itertools;
use log::debug;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhiKind {
    /// Some predecessor is dominated by the phi block: a loop-carried value.
    LoopHeader,
    Join,
}

/// A phi lowered to a mutable variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhiVariable {
    pub name: SsaName,
    pub block: BlockId,
    pub kind: PhiKind,
    /// For a join, the value of the first source. For a loop phi, the value
    /// carried in from outside the loop; the placeholder when entry paths
    /// disagree or control comes straight from the caller.
    pub initial: SsaExpr,
    /// Function-top initializer.
    pub placeholder: SsaExpr,
}

/// `target = value`, executed at the end of a predecessor block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhiCopy {
    pub target: SsaName,
    pub value: SsaExpr,
}

#[derive(Clone, Debug, Default)]
pub struct PhiElimination {
    declarations: Vec<PhiVariable>,
    copies: BTreeMap<BlockId, Vec<PhiCopy>>,
}

impl PhiElimination {
    /// Declarations in `(block, base)` order.
    pub fn declarations(&self) -> &[PhiVariable] {
        &self.declarations
    }

    pub fn copies_for_block(&self, block: BlockId) -> &[PhiCopy] {
        self.copies.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn copy_count(&self) -> usize {
        self.copies.values().map(Vec::len).sum()
    }

    /// Renders declarations then copies grouped by block.
    pub fn render(&self, cfg: &ControlFlowGraph) -> String {
        let mut out = String::new();
        for decl in &self.declarations {
            let kind = match decl.kind {
                PhiKind::LoopHeader => "loop",
                PhiKind::Join => "join",
            };
            let _ = writeln!(
                out,
                "var {} = {}  // {} phi at {}, initially {}",
                decl.name,
                decl.placeholder,
                kind,
                cfg.name(decl.block),
                decl.initial
            );
        }
        for (block, copies) in &self.copies {
            let _ = writeln!(
                out,
                "{}: {}",
                cfg.name(*block),
                copies.iter().map(|c| format!("{} = {}", c.target, c.value)).join("; ")
            );
        }
        out
    }
}

fn classify(cfg: &ControlFlowGraph, phi: &PhiNode) -> PhiKind {
    if phi.sources.keys().any(|pred| is_dominated_by(cfg, *pred, phi.block)) {
        PhiKind::LoopHeader
    } else {
        PhiKind::Join
    }
}

/// Lowers every phi of `ssa` to a variable and its copies.
pub fn eliminate_phis(cfg: &ControlFlowGraph, function: &Function, ssa: &SsaResult) -> PhiElimination {
    let mut elimination = PhiElimination::default();
    for (block, phis) in &ssa.phi_nodes {
        for phi in phis {
            let kind = classify(cfg, phi);
            let placeholder = SsaExpr::Param(phi.target);
            let initial = match kind {
                PhiKind::Join => phi
                    .sources
                    .values()
                    .next()
                    .map_or_else(|| placeholder.clone(), SsaValue::as_operand),
                PhiKind::LoopHeader => {
                    let mut entering = phi
                        .sources
                        .iter()
                        .filter(|(pred, _)| !is_dominated_by(cfg, **pred, *block))
                        .map(|(_, value)| value.name())
                        .unique();
                    match (entering.next(), entering.next()) {
                        (Some(name), None) if *block != function.entry => SsaExpr::Value(name),
                        _ => placeholder.clone(),
                    }
                }
            };
            elimination.declarations.push(PhiVariable {
                name: phi.name(),
                block: *block,
                kind,
                initial,
                placeholder,
            });

            for (pred, value) in &phi.sources {
                if value.name() == phi.name() {
                    continue;
                }
                elimination.copies.entry(*pred).or_default().push(PhiCopy {
                    target: phi.name(),
                    value: SsaExpr::Value(value.name()),
                });
            }
        }
    }
    elimination
        .declarations
        .sort_by_key(|decl| (decl.block, decl.name.base));
    debug!(
        "[ssa] {}: {} phi variables, {} copies",
        function.name,
        elimination.declarations.len(),
        elimination.copy_count()
    );
    elimination
}
