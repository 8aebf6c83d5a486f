//! Semantic invariants of a scenario tree.

use std::collections::HashSet;

use crate::core::scenario_path::ScenarioPath;
use crate::core::tree::ScenarioTree;
use crate::core::types::{NodeStatus, VoidReason};

/// Check the cascading-failure contract and structural consistency:
/// - Levels are numbered by position
/// - Paths are unique within a step and extend their parent's path
/// - `solved` implies the parent is `solved`
/// - A `void` parent (or a ledger-covered path) implies an inherited `void`
/// - `void` nodes carry a reason; other nodes do not
pub fn validate_invariants(tree: &ScenarioTree) -> Vec<String> {
    let mut errors = Vec::new();

    for (idx, level) in tree.levels.iter().enumerate() {
        if level.step != idx {
            errors.push(format!("level {idx} is labelled step {}", level.step));
        }

        let mut seen: HashSet<&ScenarioPath> = HashSet::new();
        for node in &level.nodes {
            let at = format!("step {} node {}", level.step, node.path);
            if !seen.insert(&node.path) {
                errors.push(format!("{at}: duplicate path"));
            }
            if node.path.len() != level.step + 1 {
                errors.push(format!(
                    "{at}: path has {} labels, expected {}",
                    node.path.len(),
                    level.step + 1
                ));
            }

            match (node.status(), node.void_reason()) {
                (NodeStatus::Void, None) => errors.push(format!("{at}: void without reason")),
                (status, Some(_)) if status != NodeStatus::Void => {
                    errors.push(format!("{at}: {} node carries a void reason", status.as_str()));
                }
                _ => {}
            }

            if let Some(covering) = tree.ledger.covering(&node.path)
                && covering != &node.path
                && node.status() != NodeStatus::Void
            {
                errors.push(format!("{at}: descendant of voided {covering} is not void"));
            }

            let parent = match (level.step, node.parent) {
                (0, None) => continue,
                (0, Some(_)) => {
                    errors.push(format!("{at}: step 0 node has a parent"));
                    continue;
                }
                (_, None) => {
                    errors.push(format!("{at}: missing parent"));
                    continue;
                }
                (_, Some(_)) => match tree.parent_of(node) {
                    Some(parent) => parent,
                    None => {
                        errors.push(format!("{at}: parent index out of range"));
                        continue;
                    }
                },
            };

            if node.path.parent().as_ref() != Some(&parent.path) {
                errors.push(format!("{at}: path does not extend parent {}", parent.path));
            }
            if node.status() == NodeStatus::Solved && parent.status() != NodeStatus::Solved {
                errors.push(format!(
                    "{at}: solved but parent is {}",
                    parent.status().as_str()
                ));
            }
            if parent.status() == NodeStatus::Void
                && !matches!(node.void_reason(), Some(VoidReason::AncestorVoid { .. }))
            {
                errors.push(format!("{at}: parent is void but node did not inherit it"));
            }
            if matches!(node.void_reason(), Some(VoidReason::AncestorVoid { .. }))
                && parent.status() != NodeStatus::Void
                && tree.ledger.covering(&node.path).is_none()
            {
                errors.push(format!("{at}: inherited void without a void ancestor"));
            }
        }
    }

    errors
}
