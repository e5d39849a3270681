//! # ssq-ml
//!
//! Model layer of the walk-forward evaluator: expansion of training windows
//! into labelled samples, z-score standardization, candle classifiers behind
//! the [`ModelTrainer`](model::ModelTrainer) / [`Classifier`](model::Classifier)
//! seam, and the pool acceptance model.

pub mod dataset;
pub mod discriminator;
pub mod model;
pub mod normalize;

pub use dataset::TrainingSet;
pub use discriminator::{AcceptanceModel, PoolDiscriminator};
pub use model::{Classifier, MlpTrainer, ModelTrainer, UniformTrainer};
