//! Shared deterministic types for the scenario-tree core.
//!
//! These types define stable contracts between the planner, the tree builder
//! and the step executor. They are serialized into `run_state.json`, so variant
//! names are part of the on-disk format.

use serde::{Deserialize, Serialize};

use crate::core::scenario_path::ScenarioPath;

/// Lifecycle status of a scenario node.
///
/// `Solved` and `Void` are terminal: once reached, the node is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Solving,
    Solved,
    Void,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Solved | NodeStatus::Void)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Solving => "solving",
            NodeStatus::Solved => "solved",
            NodeStatus::Void => "void",
        }
    }
}

/// Why a node ended up `void`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoidReason {
    /// The solve left the node's output directory empty (or never created it).
    EmptyOutput,
    /// An ancestor was voided; this node was never submitted.
    AncestorVoid { ancestor: ScenarioPath },
    /// Seeding, propagation or option application failed for this node.
    PrepareFailed { message: String },
    /// The solve produced output but it could not be finalized.
    FinalizeFailed { message: String },
}

impl VoidReason {
    /// True when the node itself failed, as opposed to inheriting a void ancestor.
    pub fn is_own_failure(&self) -> bool {
        !matches!(self, VoidReason::AncestorVoid { .. })
    }
}

/// Per-step status counts, in a stable field order for logs and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub step: usize,
    pub solved: usize,
    pub void: usize,
    pub inherited_void: usize,
}
