//! # ssq-features
//!
//! Causal rolling features over a [`DrawHistory`](ssq_core::types::DrawHistory).
//!
//! The [`engine`] makes a single forward pass and records, for every index
//! `i`, a [`FeatureBundle`] built only from draws strictly before `i`. The
//! bundle for the next, not yet drawn, issue is produced as well.

pub mod bundle;
pub mod cooccurrence;
pub mod engine;
pub mod stats;

pub use bundle::FeatureBundle;
pub use cooccurrence::CooccurrenceMatrix;
pub use engine::{RollingEngine, RollingFeatures};
