// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Runs the analyses over each function in order: dominators, natural loops,
//! region structuring, control nodes, SSA and phi elimination.

use crate::cfg::{ControlFlowGraph, Function};
use crate::control_flow_structuring::{flatten, structure_function, ControlNode, StructureResult};
use crate::dominance::compute_dominators;
use crate::listing::Program;
use crate::natural_loops::{find_natural_loops, NaturalLoop};
use crate::options::StructureOptions;
use crate::ssa::{build_ssa, eliminate_phis, PhiElimination, SsaResult};
use anyhow::Context;
use log::info;

/// Everything computed for one function.
#[derive(Clone, Debug)]
pub struct FunctionAnalysis {
    pub function: Function,
    pub loops: Vec<NaturalLoop>,
    pub structure: StructureResult,
    pub control_nodes: Vec<ControlNode>,
    pub ssa: SsaResult,
    pub phi_elimination: PhiElimination,
}

/// Analyzes one function. Recomputes the dominators of its blocks in `cfg`.
pub fn analyze_function(
    cfg: &mut ControlFlowGraph,
    function: &Function,
    options: &StructureOptions,
) -> anyhow::Result<FunctionAnalysis> {
    compute_dominators(cfg, function).context("computing dominators")?;
    let cfg = &*cfg;
    let loops = find_natural_loops(cfg, function);
    let structure = structure_function(cfg, function, &loops, options).context("structuring")?;
    let control_nodes = flatten(&structure.region, cfg).context("flattening regions")?;
    let ssa = build_ssa(cfg, function).context("building SSA")?;
    let phi_elimination = eliminate_phis(cfg, function, &ssa);
    info!(
        "[pipeline] {}: {} blocks, {} loops, {} phis",
        function.name,
        function.blocks.len(),
        loops.len(),
        ssa.phi_count()
    );
    Ok(FunctionAnalysis {
        function: function.clone(),
        loops,
        structure,
        control_nodes,
        ssa,
        phi_elimination,
    })
}

/// Analyzes every function of `program`, one after the other.
pub fn analyze_program(program: &mut Program, options: &StructureOptions) -> anyhow::Result<Vec<FunctionAnalysis>> {
    let Program { cfg, functions } = program;
    functions
        .iter()
        .map(|function| {
            analyze_function(cfg, function, options).with_context(|| format!("while analyzing {}", function.name))
        })
        .collect()
}
