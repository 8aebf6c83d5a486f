//! Option labels and scenario paths.
//!
//! A [`ScenarioPath`] is the ordered list of option labels chosen from step 0 up
//! to the current step. It is the identity key of a scenario node: directory
//! layout, cascading invalidation and reporting all go through it instead of
//! parsing path strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One option label introduced at a step, e.g. `A0` or `A1B0`.
///
/// The empty label is the trivial "no branching" option used for steps that
/// introduce no decisions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionLabel(String);

impl OptionLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn trivial() -> Self {
        Self(String::new())
    }

    pub fn is_trivial(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered option labels, one per step from step 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioPath(Vec<OptionLabel>);

impl ScenarioPath {
    /// The path above step 0 (no labels chosen yet).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_labels(labels: Vec<OptionLabel>) -> Self {
        Self(labels)
    }

    /// Extend this path with the label chosen at the next step.
    pub fn child(&self, label: OptionLabel) -> Self {
        let mut labels = self.0.clone();
        labels.push(label);
        Self(labels)
    }

    pub fn labels(&self) -> &[OptionLabel] {
        &self.0
    }

    /// Number of steps covered by this path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The step index of the last label, if any.
    pub fn step(&self) -> Option<usize> {
        self.0.len().checked_sub(1)
    }

    pub fn parent(&self) -> Option<ScenarioPath> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// True if `self` is an ancestor of (or equal to) `other`.
    ///
    /// Comparison is label-by-label, so `A1` is not a prefix of `A10`.
    pub fn is_prefix_of(&self, other: &ScenarioPath) -> bool {
        self.0.len() <= other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Non-trivial labels in step order; these become directory segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .iter()
            .filter(|label| !label.is_trivial())
            .map(OptionLabel::as_str)
    }

    /// Labels paired with the step that introduced them, skipping trivial ones.
    pub fn labelled_steps(&self) -> impl Iterator<Item = (usize, &OptionLabel)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, label)| !label.is_trivial())
    }
}

impl fmt::Display for ScenarioPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: String = self.segments().collect();
        if joined.is_empty() {
            return f.write_str("<base>");
        }
        f.write_str(&joined)
    }
}
