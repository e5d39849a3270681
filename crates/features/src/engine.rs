//! Single forward pass over the draw history.
//!
//! At step `i` the engine first records the bundle for `i` from its current
//! state, then absorbs draw `i`: gaps reset for drawn values and grow for the
//! rest, and every pair in the draw is added to the co-occurrence matrix.
//! Recording before absorbing is what keeps bundle `i` free of draw `i`.
//!
//! Trailing-window rates are recomputed from the history slice each step
//! rather than kept as running sums.

use ssq_core::config::FeatureConfig;
use ssq_core::types::{Draw, DrawHistory, PRIMARY_DOMAIN, SECONDARY_DOMAIN};

use crate::bundle::{FeatureBundle, AFFINITY_ANCHORS};
use crate::cooccurrence::CooccurrenceMatrix;
use crate::stats;

/// Incremental feature state over a borrowed history.
pub struct RollingEngine<'a> {
    draws: &'a [Draw],
    freq_window: usize,
    momentum_window: usize,
    /// Index of the next bundle to record.
    position: usize,
    gaps: [u32; PRIMARY_DOMAIN],
    secondary_gaps: [u32; SECONDARY_DOMAIN],
    cooccurrence: CooccurrenceMatrix,
}

impl<'a> RollingEngine<'a> {
    pub fn new(history: &'a DrawHistory, config: &FeatureConfig) -> Self {
        Self {
            draws: history.draws(),
            freq_window: config.freq_window,
            momentum_window: config.momentum_window,
            position: 0,
            gaps: [0; PRIMARY_DOMAIN],
            secondary_gaps: [0; SECONDARY_DOMAIN],
            cooccurrence: CooccurrenceMatrix::new(),
        }
    }

    /// Index of the bundle the next [`step`](Self::step) records.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Co-occurrence counts over draws `< position`.
    #[inline]
    pub fn cooccurrence(&self) -> &CooccurrenceMatrix {
        &self.cooccurrence
    }

    /// Bundle for the current position, built from draws `< position`.
    ///
    /// Once every draw is absorbed this is the bundle for the next issue.
    pub fn current(&self) -> FeatureBundle {
        let i = self.position;
        if i == 0 {
            return FeatureBundle::neutral();
        }

        let prefix = &self.draws[..i];
        let freq_slice = &prefix[i.saturating_sub(self.freq_window)..];
        let momentum_slice = &prefix[i.saturating_sub(self.momentum_window)..];
        let prev = prefix[i - 1].primaries();

        let mut affinity = [0.0; AFFINITY_ANCHORS.len()];
        for (slot, &anchor) in affinity.iter_mut().zip(AFFINITY_ANCHORS.iter()) {
            *slot = self.cooccurrence.affinity(anchor, prev);
        }
        let mut corr = [0.0; PRIMARY_DOMAIN];
        for (v, slot) in corr.iter_mut().enumerate() {
            *slot = self.cooccurrence.affinity(v as u8 + 1, prev);
        }

        let mut secondary_freq = [0.0; SECONDARY_DOMAIN];
        for d in freq_slice {
            secondary_freq[d.secondary() as usize - 1] += 1.0;
        }
        let len = freq_slice.len() as f32;
        secondary_freq.iter_mut().for_each(|f| *f /= len);

        FeatureBundle {
            index: i,
            gap: self.gaps,
            freq: primary_rates(freq_slice),
            momentum: primary_rates(momentum_slice),
            stats: stats::composition(prev),
            affinity,
            corr,
            secondary_gap: self.secondary_gaps,
            secondary_freq,
            cooccurrence_degenerate: self.cooccurrence.is_degenerate(),
        }
    }

    /// Record the bundle for the current position, then absorb its draw.
    ///
    /// Returns `None` once every draw has been absorbed.
    pub fn step(&mut self) -> Option<FeatureBundle> {
        let draws = self.draws;
        let draw = draws.get(self.position)?;
        let bundle = self.current();

        for (v, gap) in self.gaps.iter_mut().enumerate() {
            if draw.contains_primary(v as u8 + 1) {
                *gap = 0;
            } else {
                *gap += 1;
            }
        }
        for (v, gap) in self.secondary_gaps.iter_mut().enumerate() {
            if draw.secondary() as usize == v + 1 {
                *gap = 0;
            } else {
                *gap += 1;
            }
        }
        self.cooccurrence.record(draw.primaries());

        self.position += 1;
        Some(bundle)
    }
}

impl Iterator for RollingEngine<'_> {
    type Item = FeatureBundle;

    fn next(&mut self) -> Option<FeatureBundle> {
        self.step()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.draws.len() - self.position;
        (left, Some(left))
    }
}

/// Occurrence rate per primary value over a (possibly truncated) window.
fn primary_rates(window: &[Draw]) -> [f32; PRIMARY_DOMAIN] {
    let mut rates = [0.0; PRIMARY_DOMAIN];
    if window.is_empty() {
        return rates;
    }
    for d in window {
        for &v in d.primaries() {
            rates[v as usize - 1] += 1.0;
        }
    }
    let len = window.len() as f32;
    rates.iter_mut().for_each(|r| *r /= len);
    rates
}

/// Bundles for every index of a history plus the next, undrawn issue.
#[derive(Debug, Clone)]
pub struct RollingFeatures {
    /// `len() + 1` bundles; the last one belongs to the next issue.
    bundles: Vec<FeatureBundle>,
    config: FeatureConfig,
}

impl RollingFeatures {
    /// Run the engine over the whole history.
    pub fn compute(history: &DrawHistory, config: &FeatureConfig) -> Self {
        let mut engine = RollingEngine::new(history, config);
        let mut bundles = Vec::with_capacity(history.len() + 1);
        while let Some(bundle) = engine.step() {
            bundles.push(bundle);
        }
        bundles.push(engine.current());

        tracing::debug!(
            draws = history.len(),
            max_pair_count = engine.cooccurrence().max(),
            "rolling features computed"
        );
        Self {
            bundles,
            config: config.clone(),
        }
    }

    /// Number of history draws covered (excludes the next-issue bundle).
    #[inline]
    pub fn len(&self) -> usize {
        self.bundles.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Bundle for index `i`. Index `len()` is the next issue.
    #[inline]
    pub fn bundle(&self, i: usize) -> &FeatureBundle {
        &self.bundles[i]
    }

    /// The bundle for the issue after the last draw.
    #[inline]
    pub fn next_bundle(&self) -> &FeatureBundle {
        &self.bundles[self.bundles.len() - 1]
    }

    pub fn bundles(&self) -> &[FeatureBundle] {
        &self.bundles
    }

    /// Width of one primary sample for a given lookback.
    pub fn primary_sample_width(&self, lookback: usize) -> usize {
        FeatureBundle::primary_width(&self.config.groups) * lookback
    }

    pub fn secondary_sample_width(&self, lookback: usize) -> usize {
        FeatureBundle::secondary_width(&self.config.groups) * lookback
    }

    /// Primary sample for `target`: bundles `target - lookback + 1 ..= target`
    /// concatenated oldest first.
    ///
    /// # Panics
    ///
    /// Panics if `lookback` is zero, `target + 1 < lookback`, or `target > len()`.
    pub fn primary_sample(&self, target: usize, lookback: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.primary_sample_width(lookback));
        for bundle in self.window(target, lookback) {
            bundle.push_primary(&self.config, &mut out);
        }
        out
    }

    /// Secondary counterpart of [`primary_sample`](Self::primary_sample).
    pub fn secondary_sample(&self, target: usize, lookback: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.secondary_sample_width(lookback));
        for bundle in self.window(target, lookback) {
            bundle.push_secondary(&self.config, &mut out);
        }
        out
    }

    fn window(&self, target: usize, lookback: usize) -> &[FeatureBundle] {
        assert!(lookback > 0 && target + 1 >= lookback, "lookback window out of range");
        &self.bundles[target + 1 - lookback..=target]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(rows: &[([u8; 6], u8)]) -> DrawHistory {
        let draws = rows
            .iter()
            .enumerate()
            .map(|(i, (p, s))| Draw::new(i as u32 + 1, p, *s, "").unwrap())
            .collect();
        DrawHistory::new(draws).unwrap()
    }

    #[test]
    fn test_first_bundle_is_neutral() {
        let h = history(&[([1, 2, 3, 4, 5, 6], 1), ([7, 8, 9, 10, 11, 12], 2)]);
        let f = RollingFeatures::compute(&h, &FeatureConfig::default());
        assert_eq!(f.len(), 2);
        assert_eq!(*f.bundle(0), FeatureBundle::neutral());
        assert!(f.bundle(0).cooccurrence_degenerate);
        assert!(!f.bundle(1).cooccurrence_degenerate);
    }

    #[test]
    fn test_bundle_reflects_only_prior_draws() {
        let h = history(&[([1, 2, 3, 4, 5, 6], 1), ([7, 8, 9, 10, 11, 12], 2)]);
        let f = RollingFeatures::compute(&h, &FeatureConfig::default());

        let b1 = f.bundle(1);
        // Draw 0 is the whole window.
        assert_eq!(b1.freq[0], 1.0);
        assert_eq!(b1.freq[6], 0.0);
        assert_eq!(b1.gap[0], 0);
        assert_eq!(b1.gap[6], 1);
        assert_eq!(b1.secondary_gap[0], 0);
        assert_eq!(b1.secondary_freq[0], 1.0);
        assert_eq!(b1.stats, stats::composition(&[1, 2, 3, 4, 5, 6]));

        let next = f.next_bundle();
        assert_eq!(next.index, 2);
        assert_eq!(next.freq[0], 0.5);
        assert_eq!(next.freq[6], 0.5);
        assert_eq!(next.gap[0], 1);
        assert_eq!(next.gap[6], 0);
        assert_eq!(next.gap[32], 2);
    }

    #[test]
    fn test_corr_and_affinity() {
        let h = history(&[([1, 2, 3, 4, 5, 6], 1), ([1, 4, 20, 21, 22, 23], 2)]);
        let f = RollingFeatures::compute(&h, &FeatureConfig::default());

        // After draw 0, max pair count is 1; prev = draw 0.
        let b1 = f.bundle(1);
        assert!((b1.corr[0] - 5.0 / 6.0).abs() < 1e-6);
        assert_eq!(b1.corr[32], 0.0);
        // Anchor 1 and anchor 4 both touch draw 0.
        assert!((b1.affinity[0] - 5.0 / 6.0).abs() < 1e-6);
        assert!((b1.affinity[1] - 5.0 / 6.0).abs() < 1e-6);
        assert_eq!(b1.affinity[2], 0.0);

        // After draw 1, the (1, 4) pair has count 2.
        let next = f.next_bundle();
        // prev = draw 1: M[1,4] + M[1,20..23] = 2 + 4 = 6 over 6 * 2.
        assert!((next.corr[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_layout() {
        let h = history(&[
            ([1, 2, 3, 4, 5, 6], 1),
            ([7, 8, 9, 10, 11, 12], 2),
            ([13, 14, 15, 16, 17, 18], 3),
        ]);
        let f = RollingFeatures::compute(&h, &FeatureConfig::default());
        let width = FeatureBundle::primary_width(&f.config().groups);

        let sample = f.primary_sample(2, 2);
        assert_eq!(sample.len(), 2 * width);

        let mut expected = Vec::new();
        f.bundle(1).push_primary(f.config(), &mut expected);
        f.bundle(2).push_primary(f.config(), &mut expected);
        assert_eq!(sample, expected);

        // The next-issue bundle can close a window.
        assert_eq!(f.secondary_sample(3, 3).len(), f.secondary_sample_width(3));
    }
}
