// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Edge accounting for the structural builder.
//!
//! Every in-function edge is enumerated up front. Structuring either consumes
//! an edge (a structured construct expresses it) or marks it unstructured
//! (it will be lowered to a goto); anything left over is missing, which means
//! a control path was dropped.

use crate::cfg::{BlockId, ControlFlowGraph, Edge, Function};
use crate::dominance::is_dominated_by;
use anyhow::bail;
use itertools::Itertools;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeStatus {
    Consumed,
    Unstructured(String),
}

pub struct EdgeTracker {
    edges: Vec<Edge>,
    status: BTreeMap<Edge, EdgeStatus>,
    positions: BTreeMap<BlockId, usize>,
    /// Edges whose target dominates their source.
    dominance_back_edges: BTreeSet<Edge>,
    labels: BTreeMap<BlockId, String>,
}

impl EdgeTracker {
    /// Enumerates the edges of `function`. Dominators must be computed.
    pub fn new(cfg: &ControlFlowGraph, function: &Function) -> Self {
        let mut edges = function.edges(cfg);
        edges.sort();
        let dominance_back_edges = edges
            .iter()
            .filter(|e| is_dominated_by(cfg, e.source, e.target))
            .copied()
            .collect();
        Self {
            edges,
            status: BTreeMap::new(),
            positions: function.layout_positions(),
            dominance_back_edges,
            labels: function.blocks.iter().map(|b| (*b, cfg.name(*b))).collect(),
        }
    }

    pub fn all_edges(&self) -> &[Edge] {
        &self.edges
    }

    fn between(&self, source: BlockId, target: BlockId) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| e.source == source && e.target == target)
            .copied()
            .collect()
    }

    /// Marks every edge from `source` to `target` as expressed by a
    /// structured construct.
    pub fn consume(&mut self, source: BlockId, target: BlockId) {
        for edge in self.between(source, target) {
            self.status.insert(edge, EdgeStatus::Consumed);
        }
    }

    /// Marks every edge from `source` to `target` as a goto. Already consumed
    /// edges stay consumed.
    pub fn mark_unstructured(&mut self, source: BlockId, target: BlockId, reason: &str) {
        for edge in self.between(source, target) {
            if self.status.get(&edge) != Some(&EdgeStatus::Consumed) {
                debug!(
                    "[edges] {} -> {} unstructured: {}",
                    self.label(source),
                    self.label(target),
                    reason
                );
                self.status.insert(edge, EdgeStatus::Unstructured(reason.to_string()));
            }
        }
    }

    pub fn status(&self, edge: &Edge) -> Option<&EdgeStatus> {
        self.status.get(edge)
    }

    pub fn missing_edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| !self.status.contains_key(e))
            .copied()
            .collect()
    }

    fn is_layout_backward(&self, edge: &Edge) -> bool {
        match (self.positions.get(&edge.target), self.positions.get(&edge.source)) {
            (Some(target), Some(source)) => target <= source,
            _ => false,
        }
    }

    /// Edges whose target is at or before their source in layout order.
    pub fn back_edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| self.is_layout_backward(e))
            .copied()
            .collect()
    }

    pub fn forward_edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| !self.is_layout_backward(e))
            .copied()
            .collect()
    }

    pub fn edges_from(&self, block: BlockId) -> Vec<Edge> {
        self.edges.iter().filter(|e| e.source == block).copied().collect()
    }

    pub fn edges_to(&self, block: BlockId) -> Vec<Edge> {
        self.edges.iter().filter(|e| e.target == block).copied().collect()
    }

    fn label(&self, block: BlockId) -> String {
        self.labels
            .get(&block)
            .cloned()
            .unwrap_or_else(|| format!("block_{}", block))
    }

    pub fn report(&self) -> EdgeValidationReport {
        let mut consumed_edges = vec![];
        let mut unstructured_edges = vec![];
        for edge in &self.edges {
            match self.status.get(edge) {
                Some(EdgeStatus::Consumed) => consumed_edges.push(*edge),
                Some(EdgeStatus::Unstructured(reason)) => unstructured_edges.push((*edge, reason.clone())),
                None => {}
            }
        }
        EdgeValidationReport {
            all_edges: self.edges.clone(),
            consumed_edges,
            unstructured_edges,
            missing_edges: self.missing_edges(),
            back_edges: self.dominance_back_edges.clone(),
            labels: self.labels.clone(),
        }
    }

    /// Builds the report and fails if any edge is missing.
    pub fn validate(&self) -> anyhow::Result<EdgeValidationReport> {
        let report = self.report();
        if !report.missing_edges.is_empty() {
            bail!(
                "structuring dropped {} edge(s): {}\n{}",
                report.missing_edges.len(),
                report.missing_edges.iter().map(|e| report.describe(e)).join(", "),
                report
            );
        }
        Ok(report)
    }

    /// Builds the report, logging missing edges instead of failing.
    pub fn validate_soft(&self) -> EdgeValidationReport {
        let report = self.report();
        for edge in &report.missing_edges {
            warn!("[edges] missing edge {}", report.describe(edge));
        }
        report
    }
}

/// Outcome of edge accounting for one function.
#[derive(Clone, Debug, Default)]
pub struct EdgeValidationReport {
    pub all_edges: Vec<Edge>,
    pub consumed_edges: Vec<Edge>,
    pub unstructured_edges: Vec<(Edge, String)>,
    pub missing_edges: Vec<Edge>,
    back_edges: BTreeSet<Edge>,
    labels: BTreeMap<BlockId, String>,
}

impl EdgeValidationReport {
    pub fn is_complete(&self) -> bool {
        self.missing_edges.is_empty()
    }

    pub fn is_fully_structured(&self) -> bool {
        self.is_complete() && self.unstructured_edges.is_empty()
    }

    fn label(&self, block: BlockId) -> String {
        self.labels
            .get(&block)
            .cloned()
            .unwrap_or_else(|| format!("block_{}", block))
    }

    pub fn describe(&self, edge: &Edge) -> String {
        let kind = if self.back_edges.contains(edge) {
            "BACK_EDGE".to_string()
        } else {
            edge.kind.to_string()
        };
        format!("{} --[{}]--> {}", self.label(edge.source), kind, self.label(edge.target))
    }
}

impl fmt::Display for EdgeValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Edge Validation Report")?;
        writeln!(f, "======================")?;
        writeln!(f, "Total edges: {}", self.all_edges.len())?;
        writeln!(f, "Consumed by structured constructs: {}", self.consumed_edges.len())?;
        writeln!(f, "Marked as unstructured: {}", self.unstructured_edges.len())?;
        writeln!(f, "Missing (ERROR): {}", self.missing_edges.len())?;
        if !self.missing_edges.is_empty() {
            writeln!(f)?;
            writeln!(f, "MISSING EDGES (these need to be handled):")?;
            for edge in &self.missing_edges {
                writeln!(f, "  - {}", self.describe(edge))?;
            }
        }
        if !self.unstructured_edges.is_empty() {
            writeln!(f)?;
            writeln!(f, "UNSTRUCTURED EDGES (will emit goto):")?;
            for (edge, reason) in &self.unstructured_edges {
                writeln!(f, "  - {}: {}", self.describe(edge), reason)?;
            }
        }
        Ok(())
    }
}
