use ssq_core::types::{PRIMARY_DOMAIN, PRIMARY_PICK};

/// Cumulative pair counts over primary values.
///
/// `count(a, b)` is the number of draws in which `a` and `b` appeared
/// together. The matrix is symmetric with a zero diagonal, and counts only
/// ever grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooccurrenceMatrix {
    counts: [[u32; PRIMARY_DOMAIN]; PRIMARY_DOMAIN],
    max: u32,
}

impl Default for CooccurrenceMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl CooccurrenceMatrix {
    pub fn new() -> Self {
        Self {
            counts: [[0; PRIMARY_DOMAIN]; PRIMARY_DOMAIN],
            max: 0,
        }
    }

    /// Accumulate every unordered pair of distinct values in one draw.
    pub fn record(&mut self, primaries: &[u8; PRIMARY_PICK]) {
        for (i, &a) in primaries.iter().enumerate() {
            for &b in &primaries[i + 1..] {
                let (ra, rb) = (a as usize - 1, b as usize - 1);
                self.counts[ra][rb] += 1;
                self.counts[rb][ra] += 1;
                self.max = self.max.max(self.counts[ra][rb]);
            }
        }
    }

    /// Pair count for two values in `1..=33`.
    #[inline]
    pub fn count(&self, a: u8, b: u8) -> u32 {
        self.counts[a as usize - 1][b as usize - 1]
    }

    /// Largest pair count seen so far.
    #[inline]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// True while no pair has been recorded.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.max == 0
    }

    /// `Σ_{p ∈ prev} count(v, p) / (6 · max)`, or zero while degenerate.
    pub fn affinity(&self, value: u8, prev: &[u8; PRIMARY_PICK]) -> f32 {
        if self.is_degenerate() {
            return 0.0;
        }
        let row = &self.counts[value as usize - 1];
        let total: u32 = prev.iter().map(|&p| row[p as usize - 1]).sum();
        total as f32 / (PRIMARY_PICK as f32 * self.max as f32)
    }

    pub fn is_symmetric(&self) -> bool {
        (0..PRIMARY_DOMAIN).all(|a| {
            self.counts[a][a] == 0
                && (a + 1..PRIMARY_DOMAIN).all(|b| self.counts[a][b] == self.counts[b][a])
        })
    }
}
