//! Hit-rate accounting over evaluated steps.

use serde::Serialize;

use ssq_core::types::{Draw, PRIMARY_PICK};

/// Counts and rates over all evaluated steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitSummary {
    pub total: usize,
    /// Steps whose pool contained at least four drawn primaries.
    pub hit_4_plus: usize,
    /// Steps with exactly three.
    pub hit_3: usize,
    pub hit_3_plus: usize,
    /// `histogram[h]` counts steps with exactly `h` hits.
    pub histogram: [usize; PRIMARY_PICK + 1],
    pub secondary_exact: usize,
    pub secondary_top_k: usize,
    /// Rank cutoff used for `secondary_top_k`.
    pub top_k: usize,
    pub rates: HitRates,
}

/// Each count divided by the number of steps; zero when nothing was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HitRates {
    pub hit_4_plus: f64,
    pub hit_3: f64,
    pub hit_3_plus: f64,
    pub secondary_exact: f64,
    pub secondary_top_k: f64,
}

/// Accumulates [`HitSummary`] counts step by step.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    top_k: usize,
    total: usize,
    histogram: [usize; PRIMARY_PICK + 1],
    secondary_exact: usize,
    secondary_top_k: usize,
}

impl MetricsAggregator {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            total: 0,
            histogram: [0; PRIMARY_PICK + 1],
            secondary_exact: 0,
            secondary_top_k: 0,
        }
    }

    /// Score one step. `secondary_ranking` lists secondary values best first.
    ///
    /// Returns the primary hit count.
    pub fn record(&mut self, pool: &[u8], actual: &Draw, secondary_ranking: &[u8]) -> usize {
        let hits = actual.overlap(pool);
        self.total += 1;
        self.histogram[hits] += 1;
        if secondary_ranking.first() == Some(&actual.secondary()) {
            self.secondary_exact += 1;
        }
        if secondary_ranking
            .iter()
            .take(self.top_k)
            .any(|&s| s == actual.secondary())
        {
            self.secondary_top_k += 1;
        }
        hits
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn summary(&self) -> HitSummary {
        let hit_4_plus: usize = self.histogram[4..].iter().sum();
        let hit_3 = self.histogram[3];
        let hit_3_plus = hit_3 + hit_4_plus;

        let rate = |count: usize| {
            if self.total == 0 {
                0.0
            } else {
                count as f64 / self.total as f64
            }
        };

        HitSummary {
            total: self.total,
            hit_4_plus,
            hit_3,
            hit_3_plus,
            histogram: self.histogram,
            secondary_exact: self.secondary_exact,
            secondary_top_k: self.secondary_top_k,
            top_k: self.top_k,
            rates: HitRates {
                hit_4_plus: rate(hit_4_plus),
                hit_3: rate(hit_3),
                hit_3_plus: rate(hit_3_plus),
                secondary_exact: rate(self.secondary_exact),
                secondary_top_k: rate(self.secondary_top_k),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(primaries: [u8; 6], secondary: u8) -> Draw {
        Draw::new(1, &primaries, secondary, "").unwrap()
    }

    #[test]
    fn test_empty_summary_has_zero_rates() {
        let s = MetricsAggregator::new(3).summary();
        assert_eq!(s.total, 0);
        assert_eq!(s.rates, HitRates::default());
    }

    #[test]
    fn test_counts_and_rates() {
        let mut m = MetricsAggregator::new(3);
        let actual = draw([1, 2, 3, 4, 5, 6], 7);

        // 4 hits, exact secondary
        assert_eq!(m.record(&[1, 2, 3, 4, 20, 30], &actual, &[7, 1, 2]), 4);
        // 3 hits, secondary ranked third
        assert_eq!(m.record(&[1, 2, 3, 10, 20, 30], &actual, &[1, 2, 7, 9]), 3);
        // 0 hits, secondary ranked fourth
        assert_eq!(m.record(&[10, 11, 12], &actual, &[1, 2, 3, 7]), 0);
        // 6 hits, secondary missing
        assert_eq!(m.record(&[1, 2, 3, 4, 5, 6, 7], &actual, &[16]), 6);

        let s = m.summary();
        assert_eq!(s.total, 4);
        assert_eq!(s.histogram, [1, 0, 0, 1, 1, 0, 1]);
        assert_eq!(s.hit_4_plus, 2);
        assert_eq!(s.hit_3, 1);
        assert_eq!(s.hit_3_plus, 3);
        assert_eq!(s.secondary_exact, 1);
        assert_eq!(s.secondary_top_k, 2);
        assert_eq!(s.rates.hit_4_plus, 0.5);
        assert_eq!(s.rates.hit_3_plus, 0.75);
        assert_eq!(s.rates.secondary_top_k, 0.5);
    }

    #[test]
    fn test_histogram_sums_to_total() {
        let mut m = MetricsAggregator::new(1);
        let actual = draw([3, 9, 14, 22, 27, 33], 2);
        for k in 0..20u8 {
            let pool: Vec<u8> = (1..=33).filter(|v| (v + k) % 3 == 0).collect();
            m.record(&pool, &actual, &[k % 16 + 1]);
        }
        let s = m.summary();
        assert_eq!(s.histogram.iter().sum::<usize>(), s.total);
        assert!(s.secondary_exact <= s.secondary_top_k);
    }
}
