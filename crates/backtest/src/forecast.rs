//! Prediction for the issue after the last recorded draw.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::walk_forward::WalkForward;

/// Forecast for the next issue, trained on the whole history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub issue: u32,
    /// Probability per primary value, index `v - 1`.
    pub heatmap: Vec<f32>,
    pub pool: Vec<u8>,
    pub score: f32,
    pub secondary_probs: Vec<f32>,
    /// Secondary values best first.
    pub secondary_ranking: Vec<u8>,
}

impl Forecast {
    pub fn secondary(&self) -> u8 {
        self.secondary_ranking[0]
    }

    /// Human-readable forecast with the `top_k` secondary candidates.
    pub fn render(&self, top_k: usize) -> String {
        let mut out = String::new();
        let pool: Vec<String> = self.pool.iter().map(|v| format!("{v:02}")).collect();
        let _ = writeln!(out, "Forecast for issue {}", self.issue);
        let _ = writeln!(out, "  pool ({}): {}  score {:.4}", self.pool.len(), pool.join(" "), self.score);
        let secondary: Vec<String> = self
            .secondary_ranking
            .iter()
            .take(top_k)
            .map(|&s| format!("{s:02} ({:.3})", self.secondary_probs[s as usize - 1]))
            .collect();
        let _ = writeln!(out, "  secondary: {}", secondary.join(", "));
        out
    }
}

impl WalkForward<'_> {
    /// Forecast the next issue with the configured windows.
    pub fn forecast_next(&self) -> Result<Forecast> {
        let history = self.history();
        let issue = history.next_issue().context("cannot forecast from an empty history")?;
        let p = self.predict(history.len(), self.config().walk_forward.primary_window)?;
        tracing::info!(
            issue,
            primary_targets = p.primary_targets.len(),
            secondary_targets = p.secondary_targets.len(),
            "forecast ready"
        );
        Ok(Forecast {
            issue,
            heatmap: p.heatmap,
            pool: p.selection.pool,
            score: p.selection.score,
            secondary_probs: p.secondary_probs,
            secondary_ranking: p.secondary_ranking,
        })
    }
}
