//! Scenario tree: per-step node levels, the void ledger and level expansion.
//!
//! The tree is built one level at a time. Level `s` is expanded from level
//! `s-1` only after every node there is terminal, so a failure at step `s-1`
//! is already known when its descendants are created.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::layout::{Layout, NodeLocations};
use crate::core::scenario_path::{OptionLabel, ScenarioPath};
use crate::core::types::{NodeStatus, StepCounts, VoidReason};

/// One scenario at one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioNode {
    pub path: ScenarioPath,
    pub step: usize,
    /// Index of the parent node in the previous level.
    pub parent: Option<usize>,
    pub locations: NodeLocations,
    status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    void_reason: Option<VoidReason>,
}

impl ScenarioNode {
    fn new(step: usize, path: ScenarioPath, parent: Option<usize>, layout: &Layout) -> Self {
        let locations = layout.locate(step, &path);
        Self {
            path,
            step,
            parent,
            locations,
            status: NodeStatus::Pending,
            void_reason: None,
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn void_reason(&self) -> Option<&VoidReason> {
        self.void_reason.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.status == NodeStatus::Pending
    }

    /// `pending -> solving`.
    pub fn begin_solve(&mut self) -> Result<()> {
        self.transition(NodeStatus::Solving)
    }

    /// `solving -> solved`.
    pub fn mark_solved(&mut self) -> Result<()> {
        if self.status != NodeStatus::Solving {
            bail!(
                "node {} at step {}: cannot mark solved from {}",
                self.path,
                self.step,
                self.status.as_str()
            );
        }
        self.transition(NodeStatus::Solved)
    }

    /// `pending | solving -> void`.
    pub fn mark_void(&mut self, reason: VoidReason) -> Result<()> {
        self.transition(NodeStatus::Void)?;
        self.void_reason = Some(reason);
        Ok(())
    }

    /// The path whose own failure voided this node (itself, unless inherited).
    pub fn void_origin(&self) -> Option<&ScenarioPath> {
        match &self.void_reason {
            Some(VoidReason::AncestorVoid { ancestor }) => Some(ancestor),
            Some(_) => Some(&self.path),
            None => None,
        }
    }

    fn transition(&mut self, next: NodeStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, next),
            (NodeStatus::Pending, NodeStatus::Solving)
                | (NodeStatus::Pending, NodeStatus::Void)
                | (NodeStatus::Solving, NodeStatus::Solved)
                | (NodeStatus::Solving, NodeStatus::Void)
        );
        if !allowed {
            return Err(anyhow!(
                "node {} at step {}: illegal transition {} -> {}",
                self.path,
                self.step,
                self.status.as_str(),
                next.as_str()
            ));
        }
        self.status = next;
        Ok(())
    }
}

/// All nodes of one step, in deterministic build order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLevel {
    pub step: usize,
    pub years: Vec<u32>,
    pub nodes: Vec<ScenarioNode>,
}

impl StepLevel {
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|node| node.status().is_terminal())
    }

    pub fn pending_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_pending())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn counts(&self) -> StepCounts {
        let mut counts = StepCounts {
            step: self.step,
            ..StepCounts::default()
        };
        for node in &self.nodes {
            match (node.status(), node.void_reason()) {
                (NodeStatus::Solved, _) => counts.solved += 1,
                (NodeStatus::Void, Some(reason)) if !reason.is_own_failure() => {
                    counts.inherited_void += 1;
                }
                (NodeStatus::Void, _) => counts.void += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Paths voided so far. Any path extending one of them is void on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidLedger {
    voided: Vec<ScenarioPath>,
}

impl VoidLedger {
    pub fn record(&mut self, path: ScenarioPath) {
        if self.covering(&path).is_none() {
            self.voided.push(path);
        }
    }

    /// The recorded path that is a prefix of `path`, if any.
    pub fn covering(&self, path: &ScenarioPath) -> Option<&ScenarioPath> {
        self.voided.iter().find(|voided| voided.is_prefix_of(path))
    }

    pub fn paths(&self) -> &[ScenarioPath] {
        &self.voided
    }
}

/// Node levels for every step built so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioTree {
    pub levels: Vec<StepLevel>,
    pub ledger: VoidLedger,
}

impl ScenarioTree {
    pub fn level(&self, step: usize) -> Option<&StepLevel> {
        self.levels.get(step)
    }

    pub fn parent_of(&self, node: &ScenarioNode) -> Option<&ScenarioNode> {
        let parent = node.parent?;
        let prev = node.step.checked_sub(1)?;
        self.levels.get(prev)?.nodes.get(parent)
    }

    /// Expand the next level from the last one (or from the root at step 0).
    ///
    /// Children of void parents, and children covered by the void ledger, are
    /// created `void` and never become solve work.
    pub fn expand(&mut self, labels: &[OptionLabel], years: Vec<u32>, layout: &Layout) -> Result<()> {
        let step = self.levels.len();
        let labels: Vec<OptionLabel> = if labels.is_empty() {
            vec![OptionLabel::trivial()]
        } else {
            labels.to_vec()
        };

        let mut nodes = Vec::new();
        match self.levels.last() {
            None => {
                for label in &labels {
                    let path = ScenarioPath::root().child(label.clone());
                    nodes.push(self.new_child(step, path, None, None, layout)?);
                }
            }
            Some(prev) => {
                if !prev.is_finished() {
                    bail!(
                        "cannot build step {step}: step {} still has unfinished nodes",
                        prev.step
                    );
                }
                for (parent_idx, parent) in prev.nodes.iter().enumerate() {
                    for label in &labels {
                        let path = parent.path.child(label.clone());
                        nodes.push(self.new_child(
                            step,
                            path,
                            Some(parent_idx),
                            Some(parent),
                            layout,
                        )?);
                    }
                }
            }
        }

        self.levels.push(StepLevel { step, years, nodes });
        Ok(())
    }

    fn new_child(
        &self,
        step: usize,
        path: ScenarioPath,
        parent_idx: Option<usize>,
        parent: Option<&ScenarioNode>,
        layout: &Layout,
    ) -> Result<ScenarioNode> {
        let inherited = parent
            .and_then(ScenarioNode::void_origin)
            .or_else(|| self.ledger.covering(&path))
            .cloned();
        let mut node = ScenarioNode::new(step, path, parent_idx, layout);
        if let Some(ancestor) = inherited {
            node.mark_void(VoidReason::AncestorVoid { ancestor })?;
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<OptionLabel> {
        names.iter().map(|n| OptionLabel::new(*n)).collect()
    }

    fn layout() -> Layout {
        Layout::new("data", "steps", "results", "logs")
    }

    fn finish_all(tree: &mut ScenarioTree, void: &[&str]) {
        let level = tree.levels.last_mut().expect("level");
        for node in &mut level.nodes {
            if !node.is_pending() {
                continue;
            }
            node.begin_solve().expect("begin");
            if void.contains(&node.path.to_string().as_str()) {
                node.mark_void(VoidReason::EmptyOutput).expect("void");
                tree.ledger.record(node.path.clone());
            } else {
                node.mark_solved().expect("solved");
            }
        }
    }

    fn paths(level: &StepLevel) -> Vec<String> {
        level.nodes.iter().map(|n| n.path.to_string()).collect()
    }

    #[test]
    fn step_zero_without_options_gets_one_trivial_node() {
        let mut tree = ScenarioTree::default();
        tree.expand(&[], vec![2020], &layout()).expect("expand");
        let level = tree.level(0).expect("level");
        assert_eq!(level.nodes.len(), 1);
        assert_eq!(level.nodes[0].path.to_string(), "<base>");
        assert!(level.nodes[0].is_pending());
    }

    #[test]
    fn expansion_is_cartesian_and_deterministic() {
        let build = || {
            let mut tree = ScenarioTree::default();
            tree.expand(&labels(&["A0", "A1"]), vec![2020], &layout())
                .expect("expand 0");
            finish_all(&mut tree, &[]);
            tree.expand(&labels(&["B0", "B1"]), vec![2021], &layout())
                .expect("expand 1");
            tree
        };
        let first = build();
        let second = build();
        assert_eq!(first, second);
        let level = first.level(1).expect("level 1");
        assert_eq!(paths(level), vec!["A0B0", "A0B1", "A1B0", "A1B1"]);
        let parents: Vec<Option<usize>> = level.nodes.iter().map(|n| n.parent).collect();
        assert_eq!(parents, vec![Some(0), Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn void_parent_creates_void_children_only() {
        let mut tree = ScenarioTree::default();
        tree.expand(&labels(&["A0", "A1"]), vec![2020], &layout())
            .expect("expand 0");
        finish_all(&mut tree, &["A0"]);
        tree.expand(&labels(&["B0", "B1"]), vec![2021], &layout())
            .expect("expand 1");

        let level = tree.level(1).expect("level 1");
        assert_eq!(level.pending_indices(), vec![2, 3]);
        for node in &level.nodes[..2] {
            assert_eq!(node.status(), NodeStatus::Void);
            assert_eq!(
                node.void_reason(),
                Some(&VoidReason::AncestorVoid {
                    ancestor: ScenarioPath::from_labels(labels(&["A0"]))
                })
            );
        }
    }

    #[test]
    fn cascade_is_transitive_through_trivial_steps() {
        let mut tree = ScenarioTree::default();
        tree.expand(&labels(&["A0", "A1"]), vec![2020], &layout())
            .expect("expand 0");
        finish_all(&mut tree, &["A1"]);
        tree.expand(&[], vec![2021], &layout()).expect("expand 1");
        finish_all(&mut tree, &[]);
        tree.expand(&labels(&["C0", "C1"]), vec![2022], &layout())
            .expect("expand 2");

        let level = tree.level(2).expect("level 2");
        let void: Vec<String> = level
            .nodes
            .iter()
            .filter(|n| n.status() == NodeStatus::Void)
            .map(|n| n.path.to_string())
            .collect();
        assert_eq!(void, vec!["A1C0", "A1C1"]);
        assert_eq!(level.counts().inherited_void, 2);
    }

    #[test]
    fn expand_refuses_unfinished_previous_level() {
        let mut tree = ScenarioTree::default();
        tree.expand(&labels(&["A0"]), vec![2020], &layout())
            .expect("expand 0");
        let err = tree
            .expand(&labels(&["B0"]), vec![2021], &layout())
            .expect_err("unfinished");
        assert!(err.to_string().contains("unfinished"));
    }

    #[test]
    fn terminal_nodes_reject_further_transitions() {
        let mut tree = ScenarioTree::default();
        tree.expand(&labels(&["A0"]), vec![2020], &layout())
            .expect("expand");
        let node = &mut tree.levels[0].nodes[0];
        assert!(node.mark_solved().is_err());
        node.begin_solve().expect("begin");
        node.mark_solved().expect("solved");
        assert!(node.mark_void(VoidReason::EmptyOutput).is_err());
        assert!(node.begin_solve().is_err());
    }

    #[test]
    fn ledger_ignores_paths_already_covered() {
        let mut ledger = VoidLedger::default();
        ledger.record(ScenarioPath::from_labels(labels(&["A0"])));
        ledger.record(ScenarioPath::from_labels(labels(&["A0", "B1"])));
        assert_eq!(ledger.paths().len(), 1);
        assert!(
            ledger
                .covering(&ScenarioPath::from_labels(labels(&["A0", "B0", "C0"])))
                .is_some()
        );
        assert!(
            ledger
                .covering(&ScenarioPath::from_labels(labels(&["A1"])))
                .is_none()
        );
    }
}
