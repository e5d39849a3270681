//! Classifiers over a fixed-width feature vector.
//!
//! [`ModelTrainer`] turns a [`TrainingSet`] into a [`Classifier`] that
//! returns a full distribution over the set's classes. The concrete trainer
//! is a candle MLP; with no hidden layers it reduces to multinomial logistic
//! regression. [`UniformTrainer`] is a baseline that ignores its input.
//!
//! Candle's CPU backend cannot be seeded, so weights are initialized from a
//! [`StdRng`] and wrapped in [`Var`]s directly.

use anyhow::{ensure, Result};
use candle_core::{Device, Tensor, Var, D};
use candle_nn::{loss, optim, Linear, Module, Optimizer};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use ssq_core::config::ModelConfig;

use crate::dataset::TrainingSet;
use crate::normalize::Standardizer;

/// A trained probability-producing function.
pub trait Classifier: Send + Sync {
    fn num_classes(&self) -> usize;

    /// Distribution over `num_classes()` classes for one feature vector.
    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>>;
}

/// Builds a classifier from a training set.
pub trait ModelTrainer: Send + Sync {
    fn train(&self, set: &TrainingSet, seed: u64) -> Result<Box<dyn Classifier>>;
}

// ── Uniform baseline ───────────────────────────────────────────────────

/// Trainer whose classifiers always return the uniform distribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformTrainer;

#[derive(Debug, Clone, Copy)]
pub struct UniformClassifier {
    num_classes: usize,
}

impl UniformClassifier {
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes }
    }
}

impl Classifier for UniformClassifier {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict_proba(&self, _features: &[f32]) -> Result<Vec<f32>> {
        Ok(vec![1.0 / self.num_classes as f32; self.num_classes])
    }
}

impl ModelTrainer for UniformTrainer {
    fn train(&self, set: &TrainingSet, _seed: u64) -> Result<Box<dyn Classifier>> {
        Ok(Box::new(UniformClassifier::new(set.num_classes)))
    }
}

// ── Ensemble ───────────────────────────────────────────────────────────

/// Averages the distributions of its members.
pub struct Ensemble {
    members: Vec<Box<dyn Classifier>>,
}

impl Ensemble {
    pub fn new(members: Vec<Box<dyn Classifier>>) -> Result<Self> {
        ensure!(!members.is_empty(), "ensemble needs at least one member");
        let classes = members[0].num_classes();
        ensure!(
            members.iter().all(|m| m.num_classes() == classes),
            "ensemble members disagree on class count"
        );
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Classifier for Ensemble {
    fn num_classes(&self) -> usize {
        self.members[0].num_classes()
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        let mut avg = vec![0.0_f32; self.num_classes()];
        for member in &self.members {
            for (a, p) in avg.iter_mut().zip(member.predict_proba(features)?) {
                *a += p;
            }
        }
        let n = self.members.len() as f32;
        avg.iter_mut().for_each(|a| *a /= n);
        Ok(avg)
    }
}

/// Seed of ensemble member `k` for a given step seed.
pub fn member_seed(seed: u64, k: usize) -> u64 {
    seed.wrapping_add((k as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Train `size` members with derived seeds. A single member is returned
/// unwrapped.
pub fn train_ensemble(
    trainer: &dyn ModelTrainer,
    set: &TrainingSet,
    seed: u64,
    size: usize,
) -> Result<Box<dyn Classifier>> {
    ensure!(size > 0, "ensemble size must be at least 1");
    if size == 1 {
        return trainer.train(set, seed);
    }
    let members = (0..size)
        .map(|k| trainer.train(set, member_seed(seed, k)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Box::new(Ensemble::new(members)?))
}

// ── Candle MLP ─────────────────────────────────────────────────────────

/// Linear layer with kaiming-uniform weights drawn from `rng`.
///
/// Returns the layer and its trainable variables.
pub(crate) fn seeded_linear(
    in_dim: usize,
    out_dim: usize,
    rng: &mut StdRng,
    device: &Device,
) -> Result<(Linear, [Var; 2])> {
    let bound = 1.0 / (in_dim.max(1) as f32).sqrt();
    let w: Vec<f32> = (0..in_dim * out_dim)
        .map(|_| rng.gen_range(-bound..bound))
        .collect();
    let b: Vec<f32> = (0..out_dim).map(|_| rng.gen_range(-bound..bound)).collect();

    let w = Var::from_tensor(&Tensor::from_vec(w, (out_dim, in_dim), device)?)?;
    let b = Var::from_tensor(&Tensor::from_vec(b, out_dim, device)?)?;
    let layer = Linear::new(w.as_tensor().clone(), Some(b.as_tensor().clone()));
    Ok((layer, [w, b]))
}

/// Feedforward network: `in → hidden… → classes` with ReLU between layers.
pub struct MlpClassifier {
    layers: Vec<Linear>,
    standardizer: Standardizer,
    num_classes: usize,
    device: Device,
}

impl MlpClassifier {
    /// Network with freshly initialized weights.
    ///
    /// Returns the model and its trainable variables.
    pub fn new(
        standardizer: Standardizer,
        hidden: &[usize],
        num_classes: usize,
        seed: u64,
        device: &Device,
    ) -> Result<(Self, Vec<Var>)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut dims = Vec::with_capacity(hidden.len() + 2);
        dims.push(standardizer.width());
        dims.extend_from_slice(hidden);
        dims.push(num_classes);

        let mut layers = Vec::with_capacity(dims.len() - 1);
        let mut vars = Vec::with_capacity(2 * (dims.len() - 1));
        for pair in dims.windows(2) {
            let (layer, [w, b]) = seeded_linear(pair[0], pair[1], &mut rng, device)?;
            layers.push(layer);
            vars.push(w);
            vars.push(b);
        }

        let model = Self {
            layers,
            standardizer,
            num_classes,
            device: device.clone(),
        };
        Ok((model, vars))
    }

    /// Forward pass over already standardized rows, returning raw logits.
    /// Use this for training with `cross_entropy`.
    pub fn forward_logits(&self, x: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }
        Ok(x)
    }

    /// Class distributions for a batch of raw (unstandardized) rows.
    pub fn predict_batch(&self, features: &[f32]) -> Result<Vec<Vec<f32>>> {
        let width = self.standardizer.width();
        ensure!(
            width > 0 && features.len() % width == 0,
            "expected rows of {width} features, got {} values",
            features.len()
        );
        let rows = features.len() / width;
        let x = Tensor::from_vec(self.standardizer.transform(features), (rows, width), &self.device)?;
        let probs = candle_nn::ops::softmax(&self.forward_logits(&x)?, D::Minus1)?;
        Ok(probs.to_vec2::<f32>()?)
    }
}

impl Classifier for MlpClassifier {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        ensure!(
            features.len() == self.standardizer.width(),
            "expected {} features, got {}",
            self.standardizer.width(),
            features.len()
        );
        let mut rows = self.predict_batch(features)?;
        Ok(rows.swap_remove(0))
    }
}

/// Trains [`MlpClassifier`]s with AdamW and softmax cross-entropy.
#[derive(Debug, Clone)]
pub struct MlpTrainer {
    config: ModelConfig,
    device: Device,
}

impl MlpTrainer {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            device: Device::Cpu,
        }
    }

    /// Train and return the model along with its final full-set loss.
    pub fn fit(&self, set: &TrainingSet, seed: u64) -> Result<(MlpClassifier, f32)> {
        ensure!(!set.is_empty(), "cannot train on an empty set");
        ensure!(self.config.batch_size > 0, "batch size must be positive");

        let standardizer = Standardizer::fit(&set.features, set.width);
        let x_all = standardizer.transform(&set.features);
        let (model, vars) = MlpClassifier::new(
            standardizer,
            &self.config.hidden,
            set.num_classes,
            seed,
            &self.device,
        )?;

        let mut optimizer = optim::AdamW::new(
            vars,
            optim::ParamsAdamW {
                lr: self.config.learning_rate,
                weight_decay: self.config.weight_decay,
                ..Default::default()
            },
        )?;

        let n = set.len();
        let width = set.width;
        let batch_size = self.config.batch_size.min(n);
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED);
        let mut indices: Vec<usize> = (0..n).collect();

        for _epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);
            for chunk in indices.chunks(batch_size) {
                let mut batch = Vec::with_capacity(chunk.len() * width);
                let mut labels = Vec::with_capacity(chunk.len());
                for &i in chunk {
                    batch.extend_from_slice(&x_all[i * width..(i + 1) * width]);
                    labels.push(set.labels[i]);
                }
                let x = Tensor::from_vec(batch, (chunk.len(), width), &self.device)?;
                let y = Tensor::from_vec(labels, chunk.len(), &self.device)?;

                let logits = model.forward_logits(&x)?;
                let ce = loss::cross_entropy(&logits, &y)?;
                optimizer.backward_step(&ce)?;
            }
        }

        let x = Tensor::from_vec(x_all, (n, width), &self.device)?;
        let y = Tensor::from_vec(set.labels.clone(), n, &self.device)?;
        let final_loss = loss::cross_entropy(&model.forward_logits(&x)?, &y)?.to_vec0::<f32>()?;
        tracing::trace!(rows = n, width, classes = set.num_classes, final_loss, "classifier trained");

        Ok((model, final_loss))
    }
}

impl ModelTrainer for MlpTrainer {
    fn train(&self, set: &TrainingSet, seed: u64) -> Result<Box<dyn Classifier>> {
        let (model, _) = self.fit(set, seed)?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_set() -> TrainingSet {
        // Class = index of the hot feature.
        let mut set = TrainingSet::new(3, 3);
        for i in 0..30 {
            let mut row = [0.0_f32; 3];
            row[i % 3] = 1.0;
            set.push(&row, (i % 3) as u32);
        }
        set
    }

    #[test]
    fn test_uniform_classifier() {
        let set = TrainingSet::new(4, 16);
        let model = UniformTrainer.train(&set, 0).unwrap();
        let p = model.predict_proba(&[0.0; 4]).unwrap();
        assert_eq!(p.len(), 16);
        assert!(p.iter().all(|&x| x == 1.0 / 16.0));
    }

    #[test]
    fn test_forward_shape() {
        let device = Device::Cpu;
        let std = Standardizer::fit(&[0.0; 7], 7);
        let (model, vars) = MlpClassifier::new(std, &[8, 4], 33, 1, &device).unwrap();
        assert_eq!(vars.len(), 6);

        let batch = Tensor::zeros((16, 7), candle_core::DType::F32, &device).unwrap();
        let logits = model.forward_logits(&batch).unwrap();
        assert_eq!(logits.dims(), &[16, 33]);
    }

    #[test]
    fn test_predict_proba_is_distribution() {
        let device = Device::Cpu;
        let std = Standardizer::fit(&[0.0; 5], 5);
        let (model, _) = MlpClassifier::new(std, &[], 16, 3, &device).unwrap();
        let p = model.predict_proba(&[0.3, -1.0, 2.0, 0.0, 9.0]).unwrap();
        assert_eq!(p.len(), 16);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(p.iter().all(|&x| x > 0.0));

        assert!(model.predict_proba(&[0.0; 4]).is_err());
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let device = Device::Cpu;
        let std = Standardizer::fit(&[0.0; 3], 3);
        let (a, _) = MlpClassifier::new(std.clone(), &[4], 3, 9, &device).unwrap();
        let (b, _) = MlpClassifier::new(std.clone(), &[4], 3, 9, &device).unwrap();
        let (c, _) = MlpClassifier::new(std, &[4], 3, 10, &device).unwrap();

        let x = [0.5, -0.5, 1.0];
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
        assert_ne!(a.predict_proba(&x).unwrap(), c.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_logistic_regression_learns_toy_set() {
        let config = ModelConfig {
            hidden: vec![],
            epochs: 200,
            batch_size: 10,
            learning_rate: 0.05,
            weight_decay: 0.0,
        };
        let (model, loss) = MlpTrainer::new(config).fit(&toy_set(), 4).unwrap();
        assert!(loss < 0.5, "loss {loss}");

        let p = model.predict_proba(&[0.0, 1.0, 0.0]).unwrap();
        let best = p
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(best, Some(1));
    }

    #[test]
    fn test_ensemble_averages() {
        let members: Vec<Box<dyn Classifier>> = vec![
            Box::new(UniformClassifier::new(4)),
            Box::new(UniformClassifier::new(4)),
        ];
        let ens = Ensemble::new(members).unwrap();
        assert_eq!(ens.len(), 2);
        assert_eq!(ens.predict_proba(&[]).unwrap(), vec![0.25; 4]);

        let mixed: Vec<Box<dyn Classifier>> = vec![
            Box::new(UniformClassifier::new(4)),
            Box::new(UniformClassifier::new(5)),
        ];
        assert!(Ensemble::new(mixed).is_err());
    }

    #[test]
    fn test_member_seeds_differ() {
        assert_eq!(member_seed(7, 0), 7);
        assert_ne!(member_seed(7, 1), member_seed(7, 2));
    }
}
