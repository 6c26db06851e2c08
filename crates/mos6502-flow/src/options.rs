// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Represents options of the analysis pipeline. Usually read from a toml
/// source; tools may override some of them with command line flags.
///
/// NOTE: any fields carrying structured data must appear at the end for making
/// toml printing work.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Verbosity level for logging.
    pub verbosity_level: LevelFilter,

    /// BEGIN OF STRUCTURED OPTIONS. DO NOT ADD VALUE FIELDS AFTER THIS
    /// Options for the structural region builder.
    pub structure: StructureOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbosity_level: LevelFilter::Info,
            structure: StructureOptions::default(),
        }
    }
}

impl Options {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid options")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructureOptions {
    /// Whether edges left unaccounted for after structuring abort the analysis.
    /// When off they are only logged and left in the report.
    pub fail_on_missing_edges: bool,
    /// Whether adjacent complementary branches on one flag are merged into a
    /// single condition.
    pub recognize_6502_idioms: bool,
    /// Whether `CMP #imm; BEQ` chains are recovered as switches.
    pub recover_switches: bool,
    /// Minimum number of compares in a chain for it to become a switch.
    pub min_switch_cases: usize,
}

impl Default for StructureOptions {
    fn default() -> Self {
        Self {
            fail_on_missing_edges: true,
            recognize_6502_idioms: true,
            recover_switches: true,
            min_switch_cases: 3,
        }
    }
}
