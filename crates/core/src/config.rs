//! Layered configuration for the ssq engine.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults (serde `default` on every section)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `SSQ_`, nested with `__`)
//!
//! Every section can be omitted. After loading, [`AppConfig::validate`] rejects
//! combinations that cannot produce a valid run, before any training starts.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::types::{PRIMARY_DOMAIN, PRIMARY_PICK, SECONDARY_DOMAIN};

/// Largest candidate set the constrained selector will enumerate.
/// C(20, 6) = 38 760 combinations.
pub const MAX_CONSTRAINED_CANDIDATES: usize = 20;

// ── Default value functions ────────────────────────────────────────────

/// Default trailing frequency window: 30 draws.
fn default_freq_window() -> usize {
    30
}

/// Default trailing momentum window: 5 draws.
fn default_momentum_window() -> usize {
    5
}

/// Default gap clamp: gaps of 50 draws or more saturate at 1.0.
fn default_gap_cap() -> f32 {
    50.0
}

/// Default lookback: 15 consecutive bundles per sample.
fn default_lookback() -> usize {
    15
}

/// Default number of evaluated draws.
fn default_test_count() -> usize {
    20
}

fn default_primary_window() -> WindowPolicy {
    WindowPolicy::Recent(50)
}

fn default_secondary_window() -> WindowPolicy {
    WindowPolicy::Recent(1000)
}

fn default_true() -> bool {
    true
}

fn default_ensemble_size() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

/// Default hidden layers for the classifier MLP.
fn default_hidden() -> Vec<usize> {
    vec![64, 32]
}

fn default_epochs() -> usize {
    50
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_weight_decay() -> f64 {
    1e-4
}

/// Default candidate pool size.
fn default_pool_size() -> usize {
    12
}

/// Default number of top-ranked values the search draws from.
fn default_candidates() -> usize {
    20
}

/// Default Monte-Carlo trial count.
fn default_trials() -> usize {
    500
}

fn default_sum_band() -> Band {
    Band { min: 80, max: 120 }
}

fn default_span_band() -> Band {
    Band { min: 20, max: 30 }
}

fn default_odd_band() -> Band {
    Band { min: 2, max: 4 }
}

/// Default random pools generated per training draw for the discriminator.
fn default_samples_per_draw() -> usize {
    8
}

fn default_discriminator_hidden() -> usize {
    32
}

fn default_discriminator_epochs() -> usize {
    30
}

/// A pool counts as a positive discriminator sample at this many hits.
fn default_hit_threshold() -> usize {
    4
}

fn default_secondary_top_k() -> usize {
    3
}

// ── Errors ─────────────────────────────────────────────────────────────

/// A configuration that cannot produce a valid run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("lookback must be at least 1")]
    ZeroLookback,
    #[error("{target} training window of {window} draws is shorter than the lookback of {lookback}")]
    WindowShorterThanLookback {
        target: &'static str,
        window: usize,
        lookback: usize,
    },
    #[error("test_count must be at least 1")]
    NoTestIndices,
    #[error(
        "history of {history_len} draws cannot cover {test_count} test draws after a lookback of {lookback}"
    )]
    InsufficientHistory {
        history_len: usize,
        test_count: usize,
        lookback: usize,
    },
    #[error("feature window `{field}` must be at least 1")]
    ZeroFeatureWindow { field: &'static str },
    #[error("no {target} feature group is enabled")]
    NoFeatureGroups { target: &'static str },
    #[error("pool size must be at least 1")]
    EmptyPool,
    #[error("pool size {pool} exceeds candidate count {candidates}")]
    PoolExceedsCandidates { pool: usize, candidates: usize },
    #[error("candidate count {candidates} exceeds the 33-value domain")]
    CandidatesExceedDomain { candidates: usize },
    #[error("constrained selection over {candidates} candidates exceeds the limit of {limit}")]
    CombinatorialLimit { candidates: usize, limit: usize },
    #[error("sampled selection needs at least one trial")]
    NoTrials,
    #[error("{field} band is inverted: {min} > {max}")]
    InvertedBand {
        field: &'static str,
        min: u32,
        max: u32,
    },
    #[error("ensemble_size must be at least 1")]
    EmptyEnsemble,
    #[error("model training needs at least one epoch and a non-zero batch size")]
    EmptyTraining,
    #[error("discriminator needs at least one sample per draw and one epoch")]
    EmptyDiscriminator,
    #[error("secondary top-k must be within 1..=16, got {0}")]
    InvalidTopK(usize),
}

// ── Configuration structs ──────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rolling feature windows and feature group toggles.
    #[serde(default)]
    pub features: FeatureConfig,
    /// Walk-forward protocol.
    #[serde(default)]
    pub walk_forward: WalkForwardConfig,
    /// Classifier shape and optimizer.
    #[serde(default)]
    pub model: ModelConfig,
    /// Candidate pool selection.
    #[serde(default)]
    pub selector: SelectorConfig,
    /// Pool acceptance model.
    #[serde(default)]
    pub discriminator: DiscriminatorConfig,
    /// Metric options.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Rolling feature engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Trailing window for `freq` (and the secondary frequency).
    #[serde(default = "default_freq_window")]
    pub freq_window: usize,
    /// Trailing window for `momentum`.
    #[serde(default = "default_momentum_window")]
    pub momentum_window: usize,
    /// Gap value at which the model-facing gap saturates.
    #[serde(default = "default_gap_cap")]
    pub gap_cap: f32,
    /// Feature groups included in the model-facing vectors.
    #[serde(default)]
    pub groups: FeatureGroups,
}

/// Optional feature groups. All enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGroups {
    #[serde(default = "default_true")]
    pub gap: bool,
    #[serde(default = "default_true")]
    pub freq: bool,
    #[serde(default = "default_true")]
    pub momentum: bool,
    #[serde(default = "default_true")]
    pub stats: bool,
    #[serde(default = "default_true")]
    pub affinity: bool,
    #[serde(default = "default_true")]
    pub corr: bool,
    #[serde(default = "default_true")]
    pub secondary_gap: bool,
    #[serde(default = "default_true")]
    pub secondary_freq: bool,
}

/// Training-window policy for one target.
///
/// In TOML: `"all"` or `{ recent = 50 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    /// Every eligible target before the test index.
    All,
    /// The most recent `W` targets before the test index.
    Recent(usize),
}

/// Walk-forward protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Consecutive bundles concatenated into one sample vector.
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Number of most recent draws evaluated.
    #[serde(default = "default_test_count")]
    pub test_count: usize,
    /// Training window for the primary classifier.
    #[serde(default = "default_primary_window")]
    pub primary_window: WindowPolicy,
    /// Training window for the secondary classifier.
    #[serde(default = "default_secondary_window")]
    pub secondary_window: WindowPolicy,
    /// Inject an all-zero sample for each label class missing from a window.
    #[serde(default = "default_true")]
    pub inject_missing_classes: bool,
    /// Classifiers trained per target; their distributions are averaged.
    #[serde(default = "default_ensemble_size")]
    pub ensemble_size: usize,
    /// Run seed. Every randomized component derives its seed from this.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Evaluate test indices on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
    /// Primary window policies evaluated by the window comparison sweep.
    #[serde(default)]
    pub compare_windows: Vec<WindowPolicy>,
}

/// Classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden layer widths. Empty gives multinomial logistic regression.
    #[serde(default = "default_hidden")]
    pub hidden: Vec<usize>,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
}

/// Selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Highest-probability values.
    Top,
    /// Best of seeded random draws from the top candidates.
    Sampled,
    /// Best 6-combination inside the composition bands, filled by rank.
    Constrained,
}

/// Inclusive integer band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub min: u32,
    pub max: u32,
}

impl Band {
    #[inline]
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Candidate pool selector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_policy")]
    pub policy: SelectionPolicy,
    /// Values returned per pool (`P`).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Top-ranked values the search draws from (`T`).
    #[serde(default = "default_candidates")]
    pub candidates: usize,
    /// Monte-Carlo trials for [`SelectionPolicy::Sampled`].
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default = "default_sum_band")]
    pub sum_band: Band,
    #[serde(default = "default_span_band")]
    pub span_band: Band,
    #[serde(default = "default_odd_band")]
    pub odd_band: Band,
}

fn default_policy() -> SelectionPolicy {
    SelectionPolicy::Top
}

/// Pool discriminator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Train an acceptance model per step and use it to score sampled pools.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_samples_per_draw")]
    pub samples_per_draw: usize,
    #[serde(default = "default_discriminator_hidden")]
    pub hidden: usize,
    #[serde(default = "default_discriminator_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Minimum overlap for a positive sample.
    #[serde(default = "default_hit_threshold")]
    pub hit_threshold: usize,
}

/// Metric options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Rank cutoff for the secondary top-k hit.
    #[serde(default = "default_secondary_top_k")]
    pub secondary_top_k: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            freq_window: default_freq_window(),
            momentum_window: default_momentum_window(),
            gap_cap: default_gap_cap(),
            groups: FeatureGroups::default(),
        }
    }
}

impl Default for FeatureGroups {
    fn default() -> Self {
        Self {
            gap: true,
            freq: true,
            momentum: true,
            stats: true,
            affinity: true,
            corr: true,
            secondary_gap: true,
            secondary_freq: true,
        }
    }
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            test_count: default_test_count(),
            primary_window: default_primary_window(),
            secondary_window: default_secondary_window(),
            inject_missing_classes: true,
            ensemble_size: default_ensemble_size(),
            seed: default_seed(),
            parallel: false,
            compare_windows: Vec::new(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden: default_hidden(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            weight_decay: default_weight_decay(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            pool_size: default_pool_size(),
            candidates: default_candidates(),
            trials: default_trials(),
            sum_band: default_sum_band(),
            span_band: default_span_band(),
            odd_band: default_odd_band(),
        }
    }
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            samples_per_draw: default_samples_per_draw(),
            hidden: default_discriminator_hidden(),
            epochs: default_discriminator_epochs(),
            learning_rate: default_learning_rate(),
            hit_threshold: default_hit_threshold(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            secondary_top_k: default_secondary_top_k(),
        }
    }
}

impl fmt::Display for WindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowPolicy::All => write!(f, "all"),
            WindowPolicy::Recent(w) => write!(f, "recent({w})"),
        }
    }
}

impl WindowPolicy {
    /// First target index of the training window ending before `test_index`.
    ///
    /// Targets below `lookback` are never eligible.
    pub fn window_start(&self, test_index: usize, lookback: usize) -> usize {
        match *self {
            WindowPolicy::All => lookback,
            WindowPolicy::Recent(w) => test_index.saturating_sub(w).max(lookback),
        }
    }

    /// Reject a `Recent` window shorter than the lookback. `target` names the
    /// classifier in the error.
    pub fn check(&self, target: &'static str, lookback: usize) -> Result<(), ConfigError> {
        match *self {
            WindowPolicy::Recent(window) if window < lookback => {
                Err(ConfigError::WindowShorterThanLookback {
                    target,
                    window,
                    lookback,
                })
            }
            _ => Ok(()),
        }
    }
}

impl FeatureGroups {
    pub fn any_primary(&self) -> bool {
        self.gap || self.freq || self.momentum || self.stats || self.affinity || self.corr
    }

    pub fn any_secondary(&self) -> bool {
        self.secondary_gap || self.secondary_freq
    }
}

impl WalkForwardConfig {
    /// Index of the first evaluated draw in a history of `history_len` draws.
    ///
    /// The first test index must leave at least one eligible training
    /// target, i.e. be strictly greater than the lookback.
    pub fn first_test_index(&self, history_len: usize) -> Result<usize, ConfigError> {
        let insufficient = ConfigError::InsufficientHistory {
            history_len,
            test_count: self.test_count,
            lookback: self.lookback,
        };
        let first = history_len.checked_sub(self.test_count).ok_or(insufficient.clone())?;
        if first <= self.lookback {
            return Err(insufficient);
        }
        Ok(first)
    }
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults.
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment variable overrides with prefix `SSQ_` and `__` as the
    ///    nesting separator (e.g., `SSQ_WALK_FORWARD__TEST_COUNT=50`).
    ///
    /// The loaded configuration is validated before it is returned.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // The prefix separator must be set explicitly to `_`, otherwise the
        // `config` crate reuses the nesting separator and expects `SSQ__`.
        builder = builder.add_source(
            Environment::with_prefix("SSQ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate configuration invariants that do not depend on the history.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let wf = &self.walk_forward;
        if wf.lookback == 0 {
            return Err(ConfigError::ZeroLookback);
        }
        wf.primary_window.check("primary", wf.lookback)?;
        wf.secondary_window.check("secondary", wf.lookback)?;
        for policy in &wf.compare_windows {
            policy.check("primary", wf.lookback)?;
        }
        if wf.test_count == 0 {
            return Err(ConfigError::NoTestIndices);
        }
        if wf.ensemble_size == 0 {
            return Err(ConfigError::EmptyEnsemble);
        }

        let feat = &self.features;
        if feat.freq_window == 0 {
            return Err(ConfigError::ZeroFeatureWindow {
                field: "freq_window",
            });
        }
        if feat.momentum_window == 0 {
            return Err(ConfigError::ZeroFeatureWindow {
                field: "momentum_window",
            });
        }
        if !feat.groups.any_primary() {
            return Err(ConfigError::NoFeatureGroups { target: "primary" });
        }
        if !feat.groups.any_secondary() {
            return Err(ConfigError::NoFeatureGroups {
                target: "secondary",
            });
        }

        if self.model.epochs == 0 || self.model.batch_size == 0 {
            return Err(ConfigError::EmptyTraining);
        }

        self.selector.validate()?;

        let disc = &self.discriminator;
        if disc.enabled && (disc.samples_per_draw == 0 || disc.epochs == 0) {
            return Err(ConfigError::EmptyDiscriminator);
        }

        let k = self.metrics.secondary_top_k;
        if k == 0 || k > SECONDARY_DOMAIN {
            return Err(ConfigError::InvalidTopK(k));
        }
        Ok(())
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if self.candidates > PRIMARY_DOMAIN {
            return Err(ConfigError::CandidatesExceedDomain {
                candidates: self.candidates,
            });
        }
        if self.pool_size > self.candidates {
            return Err(ConfigError::PoolExceedsCandidates {
                pool: self.pool_size,
                candidates: self.candidates,
            });
        }
        match self.policy {
            SelectionPolicy::Top => {}
            SelectionPolicy::Sampled => {
                if self.trials == 0 {
                    return Err(ConfigError::NoTrials);
                }
            }
            SelectionPolicy::Constrained => {
                if self.candidates > MAX_CONSTRAINED_CANDIDATES {
                    return Err(ConfigError::CombinatorialLimit {
                        candidates: self.candidates,
                        limit: MAX_CONSTRAINED_CANDIDATES,
                    });
                }
                for (field, band) in [
                    ("sum", self.sum_band),
                    ("span", self.span_band),
                    ("odd", self.odd_band),
                ] {
                    if band.min > band.max {
                        return Err(ConfigError::InvertedBand {
                            field,
                            min: band.min,
                            max: band.max,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Values per combination enumerated by the constrained policy.
    pub const COMBINATION_SIZE: usize = PRIMARY_PICK;
}
