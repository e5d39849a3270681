//! Walk-forward evaluation.
//!
//! For each test index `i` in `[N - test_count, N)`:
//!
//! 1. Build primary and secondary training sets from targets inside each
//!    target's window, all strictly before `i`.
//! 2. Optionally inject zero rows for classes absent from a window.
//! 3. Train fresh classifiers (seeded from the run seed and `i`).
//! 4. Predict the 33-value heatmap and the secondary distribution at `i`.
//! 5. Select a pool and score it against draw `i`.
//!
//! Features are computed once for the whole history; every step reads only
//! bundles `<= i`, which depend only on draws `< i`. Steps share no mutable
//! state, so they may run on the rayon pool and are merged by index.

use std::ops::Range;
use std::time::Instant;

use anyhow::{ensure, Result};
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use ssq_core::config::{AppConfig, WindowPolicy};
use ssq_core::types::{DrawHistory, SECONDARY_DOMAIN};
use ssq_features::RollingFeatures;
use ssq_ml::dataset::{expand_primary, expand_secondary};
use ssq_ml::discriminator::{generate_samples, AcceptanceModel, PoolDiscriminator};
use ssq_ml::model::{train_ensemble, ModelTrainer};

use crate::metrics::MetricsAggregator;
use crate::report::{BacktestReport, Diagnostics, StepRecord, WindowComparison};
use crate::selector::{rank, PoolSelector, Selection};

/// Independent random streams of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SeedStream {
    Primary = 1,
    Secondary = 2,
    Selector = 3,
    Discriminator = 4,
}

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of `stream` at test index `index` for run seed `seed`.
///
/// A function of its arguments only, so results do not depend on the order
/// in which steps run.
pub fn step_seed(seed: u64, index: usize, stream: SeedStream) -> u64 {
    mix(mix(seed ^ mix(index as u64)) ^ stream as u64)
}

/// Everything predicted at one index before it is scored.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub index: usize,
    pub heatmap: Vec<f32>,
    pub selection: Selection,
    pub secondary_probs: Vec<f32>,
    /// Secondary values best first.
    pub secondary_ranking: Vec<u8>,
    pub primary_targets: Range<usize>,
    pub secondary_targets: Range<usize>,
    pub injected_primary: usize,
    pub injected_secondary: usize,
}

/// Walk-forward evaluator over one history.
pub struct WalkForward<'a> {
    history: &'a DrawHistory,
    config: AppConfig,
    features: RollingFeatures,
    selector: PoolSelector,
    trainer: &'a dyn ModelTrainer,
}

impl<'a> WalkForward<'a> {
    /// Validate `config` against `history` and compute the rolling features.
    ///
    /// Fails with a [`ConfigError`](ssq_core::config::ConfigError) before any
    /// training when the configuration cannot be evaluated on this history.
    pub fn new(
        history: &'a DrawHistory,
        config: AppConfig,
        trainer: &'a dyn ModelTrainer,
    ) -> Result<Self> {
        config.validate()?;
        config.walk_forward.first_test_index(history.len())?;
        let selector = PoolSelector::new(config.selector.clone())?;
        let features = RollingFeatures::compute(history, &config.features);
        Ok(Self {
            history,
            config,
            features,
            selector,
            trainer,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn features(&self) -> &RollingFeatures {
        &self.features
    }

    pub fn history(&self) -> &DrawHistory {
        self.history
    }

    /// Evaluated indices.
    pub fn test_range(&self) -> Range<usize> {
        let n = self.history.len();
        n - self.config.walk_forward.test_count..n
    }

    /// Run with the configured primary window.
    pub fn run(&self) -> Result<BacktestReport> {
        self.run_with_window(self.config.walk_forward.primary_window)
    }

    /// Run with `primary_window` in place of the configured one.
    pub fn run_with_window(&self, primary_window: WindowPolicy) -> Result<BacktestReport> {
        let wf = &self.config.walk_forward;
        primary_window.check("primary", wf.lookback)?;
        let range = self.test_range();
        info!(
            steps = range.len(),
            first = range.start,
            lookback = wf.lookback,
            primary_window = %primary_window,
            secondary_window = %wf.secondary_window,
            parallel = wf.parallel,
            "starting walk-forward"
        );
        let started = Instant::now();

        let mut records = if wf.parallel {
            range
                .into_par_iter()
                .map(|i| self.evaluate(i, primary_window))
                .collect::<Result<Vec<_>>>()?
        } else {
            range
                .map(|i| self.evaluate(i, primary_window))
                .collect::<Result<Vec<_>>>()?
        };
        records.sort_by_key(|r| r.index);

        let mut metrics = MetricsAggregator::new(self.config.metrics.secondary_top_k);
        for r in &records {
            metrics.record(&r.pool, &self.history[r.index], &r.secondary_ranking);
        }
        let summary = metrics.summary();

        let diagnostics = Diagnostics {
            primary_window: primary_window.to_string(),
            secondary_window: wf.secondary_window.to_string(),
            lookback: wf.lookback,
            seed: wf.seed,
            steps_with_injection: records
                .iter()
                .filter(|r| r.injected_primary + r.injected_secondary > 0)
                .count(),
            injected_rows: records
                .iter()
                .map(|r| r.injected_primary + r.injected_secondary)
                .sum(),
            selector_fallbacks: records.iter().filter(|r| r.selector_fallback).count(),
        };

        info!(
            steps = summary.total,
            hit_4_plus = summary.hit_4_plus,
            hit_3 = summary.hit_3,
            secondary_exact = summary.secondary_exact,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "walk-forward complete"
        );
        Ok(BacktestReport {
            records,
            summary,
            diagnostics,
        })
    }

    /// Run once per policy, in the given order, reusing the computed features.
    ///
    /// Every policy is checked against the lookback before the first run.
    pub fn compare_windows(&self, policies: &[WindowPolicy]) -> Result<Vec<WindowComparison>> {
        let lookback = self.config.walk_forward.lookback;
        for policy in policies {
            policy.check("primary", lookback)?;
        }
        policies
            .iter()
            .map(|&policy| {
                let report = self.run_with_window(policy)?;
                Ok(WindowComparison {
                    window: policy.to_string(),
                    summary: report.summary,
                })
            })
            .collect()
    }

    /// Predict and score index `i`.
    pub fn evaluate(&self, i: usize, primary_window: WindowPolicy) -> Result<StepRecord> {
        let draw = &self.history[i];
        let _span = info_span!("step", index = i, issue = draw.issue).entered();

        let p = self.predict(i, primary_window)?;
        let hits = draw.overlap(&p.selection.pool);
        let top_k = self.config.metrics.secondary_top_k;
        let secondary_top_k_hit = p
            .secondary_ranking
            .iter()
            .take(top_k)
            .any(|&s| s == draw.secondary());
        debug!(hits, score = p.selection.score, secondary_top_k_hit, "step scored");

        Ok(StepRecord {
            index: i,
            issue: draw.issue,
            pool: p.selection.pool,
            score: p.selection.score,
            selector_fallback: p.selection.fallback,
            actual: *draw.primaries(),
            hits,
            predicted_secondary: p.secondary_ranking[0],
            actual_secondary: draw.secondary(),
            secondary_ranking: p.secondary_ranking,
            secondary_top_k_hit,
            primary_targets: p.primary_targets.len(),
            secondary_targets: p.secondary_targets.len(),
            injected_primary: p.injected_primary,
            injected_secondary: p.injected_secondary,
        })
    }

    /// Train on targets before `i` and predict at `i`.
    ///
    /// `i` may equal the history length, in which case the prediction is for
    /// the next, undrawn issue.
    pub fn predict(&self, i: usize, primary_window: WindowPolicy) -> Result<Prediction> {
        let wf = &self.config.walk_forward;
        let lookback = wf.lookback;
        ensure!(
            i > lookback && i <= self.history.len(),
            "index {i} has no eligible training target"
        );
        primary_window.check("primary", lookback)?;

        let primary_targets = primary_window.window_start(i, lookback)..i;
        let secondary_targets = wf.secondary_window.window_start(i, lookback)..i;

        let mut primary_set =
            expand_primary(self.history, &self.features, primary_targets.clone(), lookback);
        let mut secondary_set =
            expand_secondary(self.history, &self.features, secondary_targets.clone(), lookback);

        let (mut injected_primary, mut injected_secondary) = (0, 0);
        if wf.inject_missing_classes {
            injected_primary = primary_set.inject_missing_classes();
            injected_secondary = secondary_set.inject_missing_classes();
            if injected_primary + injected_secondary > 0 {
                warn!(
                    index = i,
                    primary = injected_primary,
                    secondary = injected_secondary,
                    "injected zero rows for classes absent from the training window"
                );
            }
        }

        let primary_model = train_ensemble(
            self.trainer,
            &primary_set,
            step_seed(wf.seed, i, SeedStream::Primary),
            wf.ensemble_size,
        )?;
        let secondary_model = train_ensemble(
            self.trainer,
            &secondary_set,
            step_seed(wf.seed, i, SeedStream::Secondary),
            wf.ensemble_size,
        )?;

        let heatmap = primary_model.predict_proba(&self.features.primary_sample(i, lookback))?;
        let secondary_probs =
            secondary_model.predict_proba(&self.features.secondary_sample(i, lookback))?;
        ensure!(
            secondary_probs.len() == SECONDARY_DOMAIN,
            "secondary classifier returned {} probabilities, expected {SECONDARY_DOMAIN}",
            secondary_probs.len()
        );
        let secondary_ranking = rank(&secondary_probs);

        let mut state = Vec::new();
        self.features
            .bundle(i)
            .push_primary(self.features.config(), &mut state);
        let discriminator = self.train_discriminator(i, primary_targets.clone())?;
        let selection = self.selector.select(
            &heatmap,
            discriminator.as_ref().map(|d| d as &dyn AcceptanceModel),
            &state,
            step_seed(wf.seed, i, SeedStream::Selector),
        )?;

        Ok(Prediction {
            index: i,
            heatmap,
            selection,
            secondary_probs,
            secondary_ranking,
            primary_targets,
            secondary_targets,
            injected_primary,
            injected_secondary,
        })
    }

    fn train_discriminator(
        &self,
        i: usize,
        targets: Range<usize>,
    ) -> Result<Option<PoolDiscriminator>> {
        let cfg = &self.config.discriminator;
        if !cfg.enabled {
            return Ok(None);
        }
        let seed = step_seed(self.config.walk_forward.seed, i, SeedStream::Discriminator);
        let samples = generate_samples(
            self.history,
            &self.features,
            targets,
            self.config.selector.pool_size,
            cfg,
            seed,
        );
        Ok(Some(PoolDiscriminator::train(&samples, cfg, seed)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssq_core::config::ConfigError;
    use ssq_core::types::Draw;
    use ssq_ml::model::Classifier;
    use ssq_ml::{TrainingSet, UniformTrainer};

    fn history(n: usize) -> DrawHistory {
        let draws = (0..n)
            .map(|k| {
                let p: Vec<u8> = (0..6).map(|m| ((k * 5 + m * 6) % 33) as u8 + 1).collect();
                Draw::new(k as u32 + 1, &p, (k % 16) as u8 + 1, "").unwrap()
            })
            .collect();
        DrawHistory::new(draws).unwrap()
    }

    fn config(lookback: usize, test_count: usize) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.walk_forward.lookback = lookback;
        cfg.walk_forward.test_count = test_count;
        cfg.walk_forward.primary_window = WindowPolicy::All;
        cfg.walk_forward.secondary_window = WindowPolicy::All;
        cfg
    }

    #[test]
    fn test_step_seed_is_stable_and_distinct() {
        let a = step_seed(42, 10, SeedStream::Primary);
        assert_eq!(a, step_seed(42, 10, SeedStream::Primary));
        assert_ne!(a, step_seed(42, 11, SeedStream::Primary));
        assert_ne!(a, step_seed(42, 10, SeedStream::Secondary));
        assert_ne!(a, step_seed(43, 10, SeedStream::Primary));
    }

    #[test]
    fn test_test_range_covers_last_draws() {
        let h = history(30);
        let wf = WalkForward::new(&h, config(3, 10), &UniformTrainer).unwrap();
        assert_eq!(wf.test_range(), 20..30);
    }

    #[test]
    fn test_rejects_history_too_short() {
        let h = history(12);
        let err = WalkForward::new(&h, config(3, 9), &UniformTrainer)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InsufficientHistory { .. })
        ));
    }

    /// Trainer whose classifiers return too few probabilities.
    struct Truncated;

    struct TruncatedClassifier;

    impl Classifier for TruncatedClassifier {
        fn num_classes(&self) -> usize {
            3
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<Vec<f32>> {
            Ok(vec![1.0 / 3.0; 3])
        }
    }

    impl ModelTrainer for Truncated {
        fn train(&self, _set: &TrainingSet, _seed: u64) -> Result<Box<dyn Classifier>> {
            Ok(Box::new(TruncatedClassifier))
        }
    }

    #[test]
    fn test_wrongly_sized_distribution_is_an_error() {
        let h = history(30);
        let wf = WalkForward::new(&h, config(3, 5), &Truncated).unwrap();
        assert!(wf.predict(26, WindowPolicy::All).is_err());
        assert!(wf.run().is_err());
    }

    #[test]
    fn test_prediction_windows() {
        let h = history(40);
        let mut cfg = config(4, 5);
        cfg.walk_forward.secondary_window = WindowPolicy::Recent(10);
        let wf = WalkForward::new(&h, cfg, &UniformTrainer).unwrap();

        let p = wf.predict(36, WindowPolicy::Recent(6)).unwrap();
        assert_eq!(p.primary_targets, 30..36);
        assert_eq!(p.secondary_targets, 26..36);

        let p = wf.predict(36, WindowPolicy::All).unwrap();
        assert_eq!(p.primary_targets, 4..36);
        assert_eq!(p.heatmap.len(), 33);
        assert_eq!(p.secondary_probs.len(), 16);

        let err = wf.predict(36, WindowPolicy::Recent(2)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::WindowShorterThanLookback { window: 2, lookback: 4, .. })
        ));
        assert!(wf.predict(4, WindowPolicy::All).is_err());
        assert!(wf.predict(41, WindowPolicy::All).is_err());
    }
}
