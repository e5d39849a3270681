use ssq_core::config::{FeatureConfig, FeatureGroups};
use ssq_core::types::{PRIMARY_DOMAIN, SECONDARY_DOMAIN};

use crate::stats::STATS_WIDTH;

/// Anchor values for the affinity group: 1, 4, 7, ..., 28.
pub const AFFINITY_ANCHORS: [u8; 10] = [1, 4, 7, 10, 13, 16, 19, 22, 25, 28];

/// Rolling features attached to one history index.
///
/// Every field is computed from draws strictly before [`index`](Self::index).
/// Gaps are raw counts; the model-facing vectors clamp them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBundle {
    pub index: usize,
    /// Draws since each primary value last appeared.
    pub gap: [u32; PRIMARY_DOMAIN],
    /// Occurrence rate over the trailing frequency window.
    pub freq: [f32; PRIMARY_DOMAIN],
    /// Occurrence rate over the trailing momentum window.
    pub momentum: [f32; PRIMARY_DOMAIN],
    /// Composition of the preceding draw. Zero at index 0.
    pub stats: [f32; STATS_WIDTH],
    pub affinity: [f32; AFFINITY_ANCHORS.len()],
    pub corr: [f32; PRIMARY_DOMAIN],
    /// Draws since each secondary value last appeared.
    pub secondary_gap: [u32; SECONDARY_DOMAIN],
    pub secondary_freq: [f32; SECONDARY_DOMAIN],
    /// Set while the co-occurrence matrix is all zero, in which case
    /// `affinity` and `corr` are zero by definition.
    pub cooccurrence_degenerate: bool,
}

impl FeatureBundle {
    /// The bundle for index 0: nothing has been drawn yet.
    pub fn neutral() -> Self {
        Self {
            index: 0,
            gap: [0; PRIMARY_DOMAIN],
            freq: [0.0; PRIMARY_DOMAIN],
            momentum: [0.0; PRIMARY_DOMAIN],
            stats: [0.0; STATS_WIDTH],
            affinity: [0.0; AFFINITY_ANCHORS.len()],
            corr: [0.0; PRIMARY_DOMAIN],
            secondary_gap: [0; SECONDARY_DOMAIN],
            secondary_freq: [0.0; SECONDARY_DOMAIN],
            cooccurrence_degenerate: true,
        }
    }

    /// Width of [`push_primary`](Self::push_primary) output for `groups`.
    pub fn primary_width(groups: &FeatureGroups) -> usize {
        [
            (groups.gap, PRIMARY_DOMAIN),
            (groups.freq, PRIMARY_DOMAIN),
            (groups.momentum, PRIMARY_DOMAIN),
            (groups.stats, STATS_WIDTH),
            (groups.affinity, AFFINITY_ANCHORS.len()),
            (groups.corr, PRIMARY_DOMAIN),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, w)| w)
        .sum()
    }

    /// Width of [`push_secondary`](Self::push_secondary) output for `groups`.
    pub fn secondary_width(groups: &FeatureGroups) -> usize {
        let mut width = 0;
        if groups.secondary_gap {
            width += SECONDARY_DOMAIN;
        }
        if groups.secondary_freq {
            width += SECONDARY_DOMAIN;
        }
        width
    }

    /// Append the model-facing primary vector.
    pub fn push_primary(&self, config: &FeatureConfig, out: &mut Vec<f32>) {
        let groups = &config.groups;
        if groups.gap {
            out.extend(self.gap.iter().map(|&g| clamp_gap(g, config.gap_cap)));
        }
        if groups.freq {
            out.extend_from_slice(&self.freq);
        }
        if groups.momentum {
            out.extend_from_slice(&self.momentum);
        }
        if groups.stats {
            out.extend_from_slice(&self.stats);
        }
        if groups.affinity {
            out.extend_from_slice(&self.affinity);
        }
        if groups.corr {
            out.extend_from_slice(&self.corr);
        }
    }

    /// Append the model-facing secondary vector.
    pub fn push_secondary(&self, config: &FeatureConfig, out: &mut Vec<f32>) {
        if config.groups.secondary_gap {
            out.extend(
                self.secondary_gap
                    .iter()
                    .map(|&g| clamp_gap(g, config.gap_cap)),
            );
        }
        if config.groups.secondary_freq {
            out.extend_from_slice(&self.secondary_freq);
        }
    }
}

/// `min(gap / cap, 1)`.
#[inline]
fn clamp_gap(gap: u32, cap: f32) -> f32 {
    (gap as f32 / cap).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        let all = FeatureGroups::default();
        assert_eq!(FeatureBundle::primary_width(&all), 33 * 4 + 10 + 10);
        assert_eq!(FeatureBundle::secondary_width(&all), 32);

        let only_stats = FeatureGroups {
            gap: false,
            freq: false,
            momentum: false,
            affinity: false,
            corr: false,
            secondary_freq: false,
            ..all
        };
        assert_eq!(FeatureBundle::primary_width(&only_stats), 10);
        assert_eq!(FeatureBundle::secondary_width(&only_stats), 16);
    }

    #[test]
    fn test_push_matches_width_and_clamps_gap() {
        let config = FeatureConfig::default();
        let mut bundle = FeatureBundle::neutral();
        bundle.gap[0] = 25;
        bundle.gap[1] = 500;
        bundle.secondary_gap[3] = 10;

        let mut primary = Vec::new();
        bundle.push_primary(&config, &mut primary);
        assert_eq!(primary.len(), FeatureBundle::primary_width(&config.groups));
        assert_eq!(primary[0], 0.5);
        assert_eq!(primary[1], 1.0);

        let mut secondary = Vec::new();
        bundle.push_secondary(&config, &mut secondary);
        assert_eq!(secondary.len(), 32);
        assert!((secondary[3] - 0.2).abs() < 1e-6);
    }
}
