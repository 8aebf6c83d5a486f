//! `stepwise plan`: show the year plan and per-step options without running.

use serde::Serialize;

use crate::step::PreparedRun;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub step: usize,
    pub years: Vec<u32>,
    /// Years the model sees, including look-ahead.
    pub window: Vec<u32>,
    /// Option labels introduced at this step; empty when it does not branch.
    pub labels: Vec<String>,
    /// Scenario count at this step if nothing is voided.
    pub scenarios: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub strategy: &'static str,
    pub solver: Option<String>,
    pub cores: usize,
    pub steps: Vec<PlannedStep>,
}

pub fn plan_report(run: &PreparedRun) -> PlanReport {
    let lookahead = run.options.config.lookahead_years;
    let mut scenarios = 1usize;
    let steps = (0..run.plan.num_steps())
        .map(|step| {
            let labels: Vec<String> = run
                .catalog
                .labels(step)
                .iter()
                .filter(|label| !label.is_trivial())
                .map(|label| label.as_str().to_string())
                .collect();
            scenarios = scenarios.saturating_mul(labels.len().max(1));
            PlannedStep {
                step,
                years: run.plan.years(step).to_vec(),
                window: run.plan.solve_window(step, lookahead),
                labels,
                scenarios,
            }
        })
        .collect();
    PlanReport {
        strategy: if run.options.solver.is_some() {
            "delegated"
        } else {
            "sequential"
        },
        solver: run.options.solver.clone(),
        cores: run.options.cores,
        steps,
    }
}

impl PlanReport {
    /// Plain-text rendering for the terminal.
    pub fn render(&self) -> String {
        let mut out = format!(
            "strategy: {}{}\n",
            self.strategy,
            self.solver
                .as_deref()
                .map(|s| format!(" (solver {s}, {} cores)", self.cores))
                .unwrap_or_default()
        );
        for step in &self.steps {
            let span = match (step.years.first(), step.years.last()) {
                (Some(first), Some(last)) if first != last => format!("{first}-{last}"),
                (Some(first), _) => first.to_string(),
                _ => String::new(),
            };
            let options = if step.labels.is_empty() {
                "-".to_string()
            } else {
                step.labels.join(" ")
            };
            out.push_str(&format!(
                "step {}: {} ({} years, window {}) options: {} scenarios: {}\n",
                step.step,
                span,
                step.years.len(),
                step.window.len(),
                options,
                step.scenarios
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{RunOptions, RunOverrides, StepwiseConfig};
    use crate::step::prepare_run;
    use crate::test_support::{write_csv, write_model_data};

    #[test]
    fn report_multiplies_scenarios_per_step() {
        let temp = tempfile::tempdir().expect("tempdir");
        let input = temp.path().join("input");
        write_model_data(&input, 1990..=1995);
        let catalog = temp.path().join("scenarios");
        write_csv(
            &catalog.join("0/A/CapitalCost.csv"),
            "OPTION,REGION,TECHNOLOGY,YEAR,VALUE\n0,R,E01,1990,1\n1,R,E01,1990,2\n",
        );
        write_csv(
            &catalog.join("2/B/CapitalCost.csv"),
            "OPTION,REGION,TECHNOLOGY,YEAR,VALUE\n0,R,E01,1994,1\n1,R,E01,1994,2\n2,R,E01,1994,3\n",
        );
        let mut config = StepwiseConfig::default();
        config.lookahead_years = 1;
        let options = RunOptions::merge(
            config,
            RunOverrides {
                input_data: Some(input),
                step_length: vec![2],
                path_param: Some(catalog),
                ..RunOverrides::default()
            },
        )
        .expect("merge");

        let report = plan_report(&prepare_run(options).expect("prepare"));
        let scenarios: Vec<usize> = report.steps.iter().map(|s| s.scenarios).collect();
        assert_eq!(scenarios, vec![2, 2, 6]);
        assert_eq!(report.steps[0].window, vec![1990, 1991, 1992]);
        assert_eq!(report.steps[2].window, vec![1994, 1995]);
        assert_eq!(report.strategy, "sequential");

        let text = report.render();
        assert!(text.contains("step 0: 1990-1991 (2 years, window 3) options: A0 A1 scenarios: 2"));
        assert!(text.contains("step 1: 1992-1993 (2 years, window 3) options: - scenarios: 2"));
    }
}
