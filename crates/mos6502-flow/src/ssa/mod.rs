// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! SSA reconstruction over registers and flags, and its lowering back to
//! copies.

mod builder;
mod phi_elimination;
mod semantics;
mod types;

pub use builder::{build_ssa, SsaBuilder};
pub use phi_elimination::{eliminate_phis, PhiCopy, PhiElimination, PhiKind, PhiVariable};
pub use semantics::definitions;
pub use types::{BaseSet, BinaryOp, PhiNode, SsaBase, SsaExpr, SsaName, SsaResult, SsaState, SsaValue};
