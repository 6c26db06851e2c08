// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics over block listings: runs the analysis pipeline and renders
//! the edge report, region tree, control nodes, phi nodes and phi plan of
//! every function.

use anyhow::{bail, Context};
use clap::Args;
use itertools::Itertools;
use log::info;
use mos6502_flow::control_flow_structuring::render_nodes;
use mos6502_flow::listing::{Listing, Program};
use mos6502_flow::options::{Options, StructureOptions};
use mos6502_flow::{analyze_program, FunctionAnalysis};
use std::fmt::Write;
use std::path::Path;

/// Structuring options
#[derive(Args, Debug, Default)]
#[clap(next_help_heading = "Structuring Options")]
pub struct StructureConfig {
    /// Report edges left unaccounted for by structuring instead of failing
    #[clap(name = "allow-missing-edges", long)]
    pub allow_missing_edges: bool,

    /// Don't merge adjacent complementary branches on one flag
    #[clap(name = "no-6502-idioms", long)]
    pub no_6502_idioms: bool,

    /// Don't recover `CMP #imm; BEQ` chains as switches
    #[clap(name = "no-switches", long)]
    pub no_switches: bool,
}

impl StructureConfig {
    /// Layers the flags over options read from a file.
    pub fn apply(&self, options: &mut StructureOptions) {
        if self.allow_missing_edges {
            options.fail_on_missing_edges = false;
        }
        if self.no_6502_idioms {
            options.recognize_6502_idioms = false;
        }
        if self.no_switches {
            options.recover_switches = false;
        }
    }
}

/// A linked listing together with the analysis of each of its functions.
pub struct Inspection {
    pub program: Program,
    pub analyses: Vec<FunctionAnalysis>,
}

impl Inspection {
    pub fn from_listing(listing: &Listing, options: &Options) -> anyhow::Result<Self> {
        let mut program = listing.build()?;
        let analyses = analyze_program(&mut program, &options.structure)?;
        info!("[inspect] analyzed {} function(s)", analyses.len());
        Ok(Self { program, analyses })
    }

    pub fn from_file(path: &Path, options: &Options) -> anyhow::Result<Self> {
        let listing = Listing::from_file(path)?;
        Self::from_listing(&listing, options).with_context(|| format!("while inspecting {}", path.display()))
    }

    /// Fails if any function lost an edge during structuring. Only reachable
    /// when missing edges are allowed, since the analysis fails otherwise.
    pub fn check_complete(&self) -> anyhow::Result<()> {
        let incomplete = self
            .analyses
            .iter()
            .filter(|analysis| !analysis.structure.report.is_complete())
            .map(|analysis| analysis.function.name.as_str())
            .collect_vec();
        if !incomplete.is_empty() {
            bail!("structuring dropped edges in {}", incomplete.join(", "));
        }
        Ok(())
    }

    /// Renders every function, title first.
    pub fn render(&self) -> String {
        self.analyses
            .iter()
            .map(|analysis| format!("{}\n{}", self.title(analysis), self.render_function(analysis)))
            .join("\n")
    }

    pub fn title(&self, analysis: &FunctionAnalysis) -> String {
        format!(
            "=== {}: entry {}, {} blocks, {} loops",
            analysis.function.name,
            self.program.cfg.name(analysis.function.entry),
            analysis.function.blocks.len(),
            analysis.loops.len()
        )
    }

    pub fn render_function(&self, analysis: &FunctionAnalysis) -> String {
        let cfg = &self.program.cfg;
        let mut out = String::new();
        section(&mut out, "edges", &analysis.structure.report.to_string());
        section(&mut out, "regions", &analysis.structure.region.summarize(cfg, 0));
        section(&mut out, "control nodes", &render_nodes(&analysis.control_nodes, cfg));
        let phis = analysis
            .ssa
            .phi_nodes
            .iter()
            .flat_map(|(block, phis)| {
                phis.iter()
                    .map(move |phi| format!("{}: {}\n", cfg.name(*block), phi.display_with(|b| cfg.name(b))))
            })
            .join("");
        section(&mut out, "phis", &phis);
        section(&mut out, "phi plan", &analysis.phi_elimination.render(cfg));
        out
    }
}

fn section(out: &mut String, heading: &str, body: &str) {
    let _ = writeln!(out, "-- {}", heading);
    if body.is_empty() {
        let _ = writeln!(out, "(none)");
    } else {
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRANCHY: &str = r#"
[[block]]
label = "start"
instructions = [
  { op = "LDA", operand = { address = 16 } },
  { op = "BPL", operand = { label = "pos" } },
]

[[block]]
label = "minus"
instructions = [{ op = "BMI", operand = { label = "neg" } }]

[[block]]
label = "dead"
instructions = [{ op = "NOP" }]

[[block]]
label = "pos"
instructions = [{ op = "LDX", operand = { immediate = 1 } }, { op = "RTS" }]

[[block]]
label = "neg"
instructions = [{ op = "LDX", operand = { immediate = 2 } }, { op = "RTS" }]
"#;

    #[test]
    fn test_flags_override_file_options() {
        let mut options = Options::from_toml_str("[structure]\nmin_switch_cases = 4\n").unwrap();
        StructureConfig {
            allow_missing_edges: true,
            no_6502_idioms: true,
            ..StructureConfig::default()
        }
        .apply(&mut options.structure);
        assert!(!options.structure.fail_on_missing_edges);
        assert!(!options.structure.recognize_6502_idioms);
        assert!(options.structure.recover_switches);
        assert_eq!(options.structure.min_switch_cases, 4);
    }

    #[test]
    fn test_render_sections() {
        let listing = Listing::from_toml_str(BRANCHY).unwrap();
        let inspection = Inspection::from_listing(&listing, &Options::default()).unwrap();
        let text = inspection.render();
        assert!(text.starts_with("=== main: entry start, 5 blocks, 0 loops\n-- edges\n"));
        for heading in ["-- regions", "-- control nodes", "-- phis", "-- phi plan"] {
            assert!(text.contains(heading), "missing {}", heading);
        }
        assert!(text.contains("Missing (ERROR): 0"));
        assert!(text.contains("unreachable block"));
        inspection.check_complete().unwrap();
    }

    #[test]
    fn test_without_idioms_dead_block_is_structured() {
        let listing = Listing::from_toml_str(BRANCHY).unwrap();
        let mut options = Options::default();
        StructureConfig {
            no_6502_idioms: true,
            ..StructureConfig::default()
        }
        .apply(&mut options.structure);
        let inspection = Inspection::from_listing(&listing, &options).unwrap();
        let report = &inspection.analyses[0].structure.report;
        assert!(report.is_complete());
        assert!(report.unstructured_edges.iter().all(|(_, reason)| reason != "unreachable block"));
    }
}
