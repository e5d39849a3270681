//! Expansion of a training window into (feature, label) samples.
//!
//! This is pure data shaping: it knows nothing about the classifier that
//! will consume the result.

use std::ops::Range;

use ssq_core::types::{DrawHistory, PRIMARY_DOMAIN, SECONDARY_DOMAIN};
use ssq_features::RollingFeatures;

/// Row-major feature matrix with class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// `len() * width` values.
    pub features: Vec<f32>,
    /// Class index per row, in `0..num_classes`.
    pub labels: Vec<u32>,
    pub width: usize,
    pub num_classes: usize,
    /// Rows added by [`inject_missing_classes`](Self::inject_missing_classes).
    pub injected: usize,
}

impl TrainingSet {
    pub fn new(width: usize, num_classes: usize) -> Self {
        Self {
            features: Vec::new(),
            labels: Vec::new(),
            width,
            num_classes,
            injected: 0,
        }
    }

    pub fn push(&mut self, row: &[f32], label: u32) {
        debug_assert_eq!(row.len(), self.width);
        debug_assert!((label as usize) < self.num_classes);
        self.features.extend_from_slice(row);
        self.labels.push(label);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.features[i * self.width..(i + 1) * self.width]
    }

    /// Rows per class.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for &l in &self.labels {
            counts[l as usize] += 1;
        }
        counts
    }

    /// Append one all-zero row for every class with no sample.
    ///
    /// This biases the classifier towards absent classes on zero-like
    /// inputs. Returns the number of rows added.
    pub fn inject_missing_classes(&mut self) -> usize {
        let zeros = vec![0.0; self.width];
        let missing: Vec<u32> = self
            .class_counts()
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == 0)
            .map(|(class, _)| class as u32)
            .collect();

        for &class in &missing {
            self.push(&zeros, class);
        }
        self.injected += missing.len();
        missing.len()
    }
}

/// One row per primary value drawn at each target: six rows per draw, all
/// sharing the target's sample vector.
///
/// Label `v - 1` for primary value `v`.
pub fn expand_primary(
    history: &DrawHistory,
    features: &RollingFeatures,
    targets: Range<usize>,
    lookback: usize,
) -> TrainingSet {
    let mut set = TrainingSet::new(features.primary_sample_width(lookback), PRIMARY_DOMAIN);
    for j in targets {
        let row = features.primary_sample(j, lookback);
        for &v in history[j].primaries() {
            set.push(&row, v as u32 - 1);
        }
    }
    set
}

/// One row per target labelled with its secondary value minus one.
pub fn expand_secondary(
    history: &DrawHistory,
    features: &RollingFeatures,
    targets: Range<usize>,
    lookback: usize,
) -> TrainingSet {
    let mut set = TrainingSet::new(features.secondary_sample_width(lookback), SECONDARY_DOMAIN);
    for j in targets {
        let row = features.secondary_sample(j, lookback);
        set.push(&row, history[j].secondary() as u32 - 1);
    }
    set
}
