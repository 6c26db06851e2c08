// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Middle end of a 6502 decompiler: dominators, natural loops, structured
//! regions, SSA over registers and flags, and phi elimination.

pub mod cfg;
pub mod control_flow_structuring;
pub mod dominance;
pub mod instruction;
pub mod listing;
pub mod natural_loops;
pub mod options;
pub mod pipeline;
pub mod ssa;

pub use pipeline::{analyze_function, analyze_program, FunctionAnalysis};
