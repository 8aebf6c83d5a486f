//! Step-length planning: split the model horizon into per-step year groups.

use anyhow::Result;
use serde::Serialize;

use crate::errors::ConfigurationError;

/// How long each step is, in model years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLengthSpec {
    /// Every step has the same length.
    Uniform(i64),
    /// The first step has its own length; all following steps share `rest`.
    FirstThen { first: i64, rest: i64 },
}

impl StepLengthSpec {
    /// Build a spec from the repeated `--step-length` CLI values.
    pub fn from_values(values: &[i64]) -> Result<Self> {
        match values {
            [len] => Ok(Self::Uniform(*len)),
            [first, rest] => Ok(Self::FirstThen {
                first: *first,
                rest: *rest,
            }),
            [] => Err(ConfigurationError::new("at least one step length is required").into()),
            _ => Err(ConfigurationError::new(format!(
                "expected one or two step lengths, got {}",
                values.len()
            ))
            .into()),
        }
    }

    fn lengths(self) -> (i64, i64) {
        match self {
            Self::Uniform(len) => (len, len),
            Self::FirstThen { first, rest } => (first, rest),
        }
    }
}

/// Ordered, gap-free partition of the horizon into steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPlan {
    horizon: Vec<u32>,
    steps: Vec<Vec<u32>>,
}

impl StepPlan {
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn horizon(&self) -> &[u32] {
        &self.horizon
    }

    /// Years owned by step `step`. Panics on an out-of-range index.
    pub fn years(&self, step: usize) -> &[u32] {
        &self.steps[step]
    }

    pub fn steps(&self) -> &[Vec<u32>] {
        &self.steps
    }

    /// Years the model sees when solving `step`: the step's own years plus up to
    /// `lookahead_years` following horizon years.
    pub fn solve_window(&self, step: usize, lookahead_years: usize) -> Vec<u32> {
        let offset: usize = self.steps[..step].iter().map(Vec::len).sum();
        let end = (offset + self.steps[step].len() + lookahead_years).min(self.horizon.len());
        self.horizon[offset..end].to_vec()
    }
}

/// Split `horizon` into consecutive year groups according to `spec`.
///
/// The last group may be shorter than the nominal length.
pub fn plan_steps(spec: StepLengthSpec, horizon: &[u32]) -> Result<StepPlan> {
    if horizon.is_empty() {
        return Err(ConfigurationError::new("model horizon has no years").into());
    }
    let (first, rest) = spec.lengths();
    for len in [first, rest] {
        if len <= 0 {
            return Err(
                ConfigurationError::new(format!("step length must be > 0 (got {len})")).into(),
            );
        }
        if len as u64 > horizon.len() as u64 {
            return Err(ConfigurationError::new(format!(
                "step length {len} exceeds horizon of {} years",
                horizon.len()
            ))
            .into());
        }
    }

    let (first, rest) = (first as usize, rest as usize);
    let mut steps = vec![horizon[..first].to_vec()];
    steps.extend(horizon[first..].chunks(rest).map(<[u32]>::to_vec));

    Ok(StepPlan {
        horizon: horizon.to_vec(),
        steps,
    })
}
