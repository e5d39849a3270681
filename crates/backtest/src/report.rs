//! Serializable backtest output.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::metrics::HitSummary;

/// Outcome of one evaluated index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub issue: u32,
    /// Selected pool, ascending.
    pub pool: Vec<u8>,
    pub score: f32,
    /// Constrained selection fell back to the top pool.
    pub selector_fallback: bool,
    pub actual: [u8; 6],
    pub hits: usize,
    pub predicted_secondary: u8,
    pub actual_secondary: u8,
    /// Secondary values best first.
    pub secondary_ranking: Vec<u8>,
    /// The actual secondary is within the configured top-k of the ranking.
    pub secondary_top_k_hit: bool,
    pub primary_targets: usize,
    pub secondary_targets: usize,
    /// Zero rows injected for absent classes.
    pub injected_primary: usize,
    pub injected_secondary: usize,
}

/// Run-level counters that are not hit metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub primary_window: String,
    pub secondary_window: String,
    pub lookback: usize,
    pub seed: u64,
    pub steps_with_injection: usize,
    pub injected_rows: usize,
    pub selector_fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub records: Vec<StepRecord>,
    pub summary: HitSummary,
    pub diagnostics: Diagnostics,
}

/// Summary of one primary window policy in a comparison sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowComparison {
    pub window: String,
    pub summary: HitSummary,
}

impl BacktestReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write report to {}", path.display()))
    }

    /// Human-readable summary block.
    pub fn render(&self) -> String {
        let s = &self.summary;
        let d = &self.diagnostics;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Walk-forward: {} steps, lookback {}, primary window {}, secondary window {}",
            s.total, d.lookback, d.primary_window, d.secondary_window
        );
        let _ = writeln!(
            out,
            "  >=4 hits: {:>4}  ({:.2}%)",
            s.hit_4_plus,
            s.rates.hit_4_plus * 100.0
        );
        let _ = writeln!(out, "  =3 hits:  {:>4}  ({:.2}%)", s.hit_3, s.rates.hit_3 * 100.0);
        let _ = writeln!(
            out,
            "  >=3 hits: {:>4}  ({:.2}%)",
            s.hit_3_plus,
            s.rates.hit_3_plus * 100.0
        );
        let _ = writeln!(out, "  histogram: {:?}", s.histogram);
        let _ = writeln!(
            out,
            "  secondary exact: {} ({:.2}%), top-{}: {} ({:.2}%)",
            s.secondary_exact,
            s.rates.secondary_exact * 100.0,
            s.top_k,
            s.secondary_top_k,
            s.rates.secondary_top_k * 100.0
        );
        if d.injected_rows > 0 || d.selector_fallbacks > 0 {
            let _ = writeln!(
                out,
                "  injected rows: {} over {} steps, selector fallbacks: {}",
                d.injected_rows, d.steps_with_injection, d.selector_fallbacks
            );
        }
        out
    }
}

/// Table of window comparison results.
pub fn render_comparison(rows: &[WindowComparison]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<14} {:>6} {:>8} {:>8} {:>8}", "window", "steps", ">=4", "=3", ">=3");
    for row in rows {
        let s = &row.summary;
        let _ = writeln!(
            out,
            "{:<14} {:>6} {:>7.2}% {:>7.2}% {:>7.2}%",
            row.window,
            s.total,
            s.rates.hit_4_plus * 100.0,
            s.rates.hit_3 * 100.0,
            s.rates.hit_3_plus * 100.0
        );
    }
    out
}
