// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Reconstruction of structured control flow from a function's CFG.

pub mod control_nodes;
pub mod edge_tracking;
mod helpers;
pub mod idioms;
pub mod regions;
mod structurer;

pub use control_nodes::{flatten, render_nodes, Condition, ControlCase, ControlNode, LoopKind};
pub use edge_tracking::{EdgeStatus, EdgeTracker, EdgeValidationReport};
pub use regions::{DispatchTest, Region, Selector, SwitchCase, UnstructuredEdge};
pub use structurer::{structure_function, StructureResult};
