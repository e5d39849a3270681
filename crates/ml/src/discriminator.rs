//! Pool acceptance model.
//!
//! Scores how plausible a candidate pool is given a state descriptor.
//! [`PoolDiscriminator`] is a small candle network trained on seeded random
//! pools around each training draw: a pool is positive when it overlaps the
//! true draw in at least `hit_threshold` values.
//!
//! Architecture: (state + 33) → hidden → 1 with ReLU and a sigmoid output.

use std::ops::Range;

use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use candle_nn::{loss, optim, Linear, Module, Optimizer};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

use ssq_core::config::DiscriminatorConfig;
use ssq_core::types::{DrawHistory, PRIMARY_DOMAIN, PRIMARY_PICK};
use ssq_features::RollingFeatures;

use crate::model::seeded_linear;
use crate::normalize::Standardizer;

/// 33-wide one-hot membership of a pool.
pub type Membership = [f32; PRIMARY_DOMAIN];

/// One-hot encode a pool of primary values.
pub fn membership(pool: &[u8]) -> Membership {
    let mut m = [0.0; PRIMARY_DOMAIN];
    for &v in pool {
        m[v as usize - 1] = 1.0;
    }
    m
}

/// Scores a pool's plausibility in `[0, 1]`.
pub trait AcceptanceModel: Send + Sync {
    fn score(&self, state: &[f32], membership: &Membership) -> Result<f32>;

    /// Score many pools against one state.
    fn score_batch(&self, state: &[f32], memberships: &[Membership]) -> Result<Vec<f32>> {
        memberships.iter().map(|m| self.score(state, m)).collect()
    }
}

/// A labelled (state, pool) example.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSample {
    pub state: Vec<f32>,
    pub membership: Membership,
    /// 1.0 for an accepted pool, 0.0 otherwise.
    pub label: f32,
}

/// Generate `samples_per_draw` pools of `pool_size` values for each target.
///
/// The overlap with the true draw is drawn uniformly from its feasible range
/// first, so positive and negative pools both occur. The state is the
/// target's primary bundle vector.
pub fn generate_samples(
    history: &DrawHistory,
    features: &RollingFeatures,
    targets: Range<usize>,
    pool_size: usize,
    config: &DiscriminatorConfig,
    seed: u64,
) -> Vec<PoolSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(targets.len() * config.samples_per_draw);

    for j in targets {
        let mut state = Vec::new();
        features.bundle(j).push_primary(features.config(), &mut state);

        let drawn = history[j].primaries();
        let others: Vec<u8> = (1..=PRIMARY_DOMAIN as u8)
            .filter(|v| !drawn.contains(v))
            .collect();
        let max_hits = pool_size.min(PRIMARY_PICK);
        let min_hits = pool_size.saturating_sub(others.len());

        for _ in 0..config.samples_per_draw {
            let hits = rng.gen_range(min_hits..=max_hits);
            let mut pool: Vec<u8> = drawn.choose_multiple(&mut rng, hits).copied().collect();
            pool.extend(
                index::sample(&mut rng, others.len(), pool_size - hits)
                    .iter()
                    .map(|i| others[i]),
            );
            samples.push(PoolSample {
                state: state.clone(),
                membership: membership(&pool),
                label: if hits >= config.hit_threshold { 1.0 } else { 0.0 },
            });
        }
    }
    samples
}

/// Feedforward acceptance network.
pub struct PoolDiscriminator {
    fc1: Linear,
    fc2: Linear,
    standardizer: Standardizer,
    device: Device,
}

impl PoolDiscriminator {
    /// Train on labelled samples. All states must share one width.
    pub fn train(samples: &[PoolSample], config: &DiscriminatorConfig, seed: u64) -> Result<Self> {
        ensure!(!samples.is_empty(), "no discriminator samples");
        let state_width = samples[0].state.len();
        ensure!(
            samples.iter().all(|s| s.state.len() == state_width),
            "discriminator states differ in width"
        );
        let width = state_width + PRIMARY_DOMAIN;
        let n = samples.len();

        let mut raw = Vec::with_capacity(n * width);
        for s in samples {
            raw.extend_from_slice(&s.state);
            raw.extend_from_slice(&s.membership);
        }
        let standardizer = Standardizer::fit(&raw, width);
        let x_all = standardizer.transform(&raw);
        let labels: Vec<f32> = samples.iter().map(|s| s.label).collect();

        let device = Device::Cpu;
        let mut rng = StdRng::seed_from_u64(seed);
        let (fc1, [w1, b1]) = seeded_linear(width, config.hidden, &mut rng, &device)?;
        let (fc2, [w2, b2]) = seeded_linear(config.hidden, 1, &mut rng, &device)?;
        let model = Self {
            fc1,
            fc2,
            standardizer,
            device,
        };

        let mut optimizer = optim::AdamW::new(
            vec![w1, b1, w2, b2],
            optim::ParamsAdamW {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;

        let batch_size = 64.min(n);
        let mut order: Vec<usize> = (0..n).collect();
        for _ in 0..config.epochs {
            order.shuffle(&mut rng);
            for chunk in order.chunks(batch_size) {
                let mut batch = Vec::with_capacity(chunk.len() * width);
                let mut y = Vec::with_capacity(chunk.len());
                for &i in chunk {
                    batch.extend_from_slice(&x_all[i * width..(i + 1) * width]);
                    y.push(labels[i]);
                }
                let x = Tensor::from_vec(batch, (chunk.len(), width), &model.device)?;
                let y = Tensor::from_vec(y, (chunk.len(), 1), &model.device)?;
                let bce = loss::binary_cross_entropy_with_logit(&model.forward_logits(&x)?, &y)?;
                optimizer.backward_step(&bce)?;
            }
        }

        let positives = labels.iter().filter(|&&l| l > 0.5).count();
        tracing::debug!(samples = n, positives, "pool discriminator trained");
        Ok(model)
    }

    /// Forward pass over standardized rows, returning raw logits.
    pub fn forward_logits(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.fc1.forward(x)?.relu()?;
        Ok(self.fc2.forward(&x)?)
    }

    /// Forward pass: standardized rows → acceptance probability.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let logits = self.forward_logits(x)?;
        // Sigmoid: 1 / (1 + exp(-x))
        let ones = logits.ones_like()?;
        Ok(ones.broadcast_div(&(logits.neg()?.exp()? + 1.0)?)?)
    }
}

impl AcceptanceModel for PoolDiscriminator {
    fn score(&self, state: &[f32], membership: &Membership) -> Result<f32> {
        Ok(self.score_batch(state, std::slice::from_ref(membership))?[0])
    }

    fn score_batch(&self, state: &[f32], memberships: &[Membership]) -> Result<Vec<f32>> {
        let width = self.standardizer.width();
        ensure!(
            state.len() + PRIMARY_DOMAIN == width,
            "expected a state of {} features, got {}",
            width - PRIMARY_DOMAIN,
            state.len()
        );
        if memberships.is_empty() {
            return Ok(Vec::new());
        }
        let mut rows = Vec::with_capacity(memberships.len() * width);
        let mut raw = Vec::with_capacity(width);
        for m in memberships {
            raw.clear();
            raw.extend_from_slice(state);
            raw.extend_from_slice(m);
            self.standardizer.transform_into(&raw, &mut rows);
        }
        let x = Tensor::from_vec(rows, (memberships.len(), width), &self.device)?;
        Ok(self.forward(&x)?.flatten_all()?.to_vec1::<f32>()?)
    }
}
