//! Offline policy evaluation: sample holdout rows, roll the policy out from
//! each, and summarise the observed conversion rates of the candidates.

use campaign_core::{CampaignError, CampaignResult, TrainingTable};
use campaign_rl_engine::PolicySnapshot;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub samples: usize,
    pub average: f64,
    pub median: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl ConversionSummary {
    /// Summary statistics; all zero for an empty slice.
    pub fn from_rates(rates: &[f64]) -> Self {
        if rates.is_empty() {
            return Self::default();
        }
        let mut sorted = rates.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        Self {
            samples: n,
            average: sorted.iter().sum::<f64>() / n as f64,
            median,
            minimum: sorted[0],
            maximum: sorted[n - 1],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    pub summary: ConversionSummary,
    /// Mean candidate conversion rate per evaluated row.
    pub rates: Vec<f64>,
    /// Rows whose rollout diverged, timed out or fell outside the state space.
    pub skipped: usize,
}

pub struct PolicyEvaluator<'a> {
    snapshot: &'a PolicySnapshot,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(snapshot: &'a PolicySnapshot) -> Self {
        Self { snapshot }
    }

    /// Evaluate up to `samples` rows drawn without replacement from `holdout`.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        holdout: &TrainingTable,
        samples: usize,
        rng: &mut R,
    ) -> CampaignResult<EvaluationRun> {
        if holdout.is_empty() {
            return Err(CampaignError::Dataset("holdout table is empty".to_string()));
        }

        let conversions = self.snapshot.conversions();
        let mut rates = Vec::with_capacity(samples);
        let mut skipped = 0usize;

        for row in holdout.rows().choose_multiple(rng, samples) {
            let rollout = match self.snapshot.candidates(row.state()) {
                Ok(rollout) => rollout,
                Err(
                    e @ (CampaignError::PolicyDiverged { .. }
                    | CampaignError::DeadlineExceeded { .. }
                    | CampaignError::Validation(_)),
                ) => {
                    warn!(state = %row.state(), error = %e, "Skipping evaluation row");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let candidate_rates: Vec<f64> = rollout
                .candidates
                .iter()
                .map(|&i| conversions.get(i).conversion_rate())
                .collect();
            rates.push(mean(&candidate_rates));
        }

        let summary = ConversionSummary::from_rates(&rates);
        info!(
            evaluated = summary.samples,
            skipped,
            average = summary.average,
            median = summary.median,
            "Policy evaluation complete"
        );
        Ok(EvaluationRun {
            summary,
            rates,
            skipped,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Plain-text report with one block per named run.
pub fn render_fold_report(folds: &[(String, ConversionSummary)]) -> String {
    let mut out = String::new();
    for (name, s) in folds {
        let _ = writeln!(out, "Model Results for {name}:");
        let _ = writeln!(out, "\t\tAverage Conversion Rate = {:.2}%", s.average * 100.0);
        let _ = writeln!(out, "\t\tMedian Conversion Rate  = {:.2}%", s.median * 100.0);
        let _ = writeln!(out, "\t\tMinimum Conversion Rate  = {:.2}%", s.minimum * 100.0);
        let _ = writeln!(out, "\t\tMaximum Conversion Rate  = {:.2}%", s.maximum * 100.0);
        out.push('\n');
    }
    out
}

pub fn write_fold_report(
    path: impl AsRef<Path>,
    folds: &[(String, ConversionSummary)],
) -> CampaignResult<()> {
    let path = path.as_ref();
    std::fs::write(path, render_fold_report(folds))?;
    info!(path = %path.display(), folds = folds.len(), "Wrote evaluation report");
    Ok(())
}
