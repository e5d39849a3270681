//! Candidate pool selection from a primary heatmap.
//!
//! Three policies share one entry point, [`PoolSelector::select`]:
//! - **Top**: the `P` most probable values.
//! - **Sampled**: best of `trials` seeded random `P`-subsets of the top `T`,
//!   scored by an [`AcceptanceModel`] or by summed probability.
//! - **Constrained**: the most probable 6-combination of the top `T` whose
//!   sum, span and odd count fall inside the configured bands, completed to
//!   `P` by rank. Falls back to Top when nothing is feasible.
//!
//! Pools are always returned in ascending value order.

use anyhow::{ensure, Result};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::Serialize;

use ssq_core::config::{ConfigError, SelectionPolicy, SelectorConfig};
use ssq_core::types::PRIMARY_DOMAIN;
use ssq_features::stats;
use ssq_ml::discriminator::{membership, AcceptanceModel, Membership};

/// A selected pool and the score that won it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Ascending values.
    pub pool: Vec<u8>,
    pub score: f32,
    /// Constrained selection found no feasible combination and used Top.
    pub fallback: bool,
}

/// Values `1..=n` ordered by descending probability, ties by ascending value.
pub fn rank(probs: &[f32]) -> Vec<u8> {
    let mut values: Vec<u8> = (1..=probs.len() as u8).collect();
    values.sort_by(|&a, &b| {
        probs[b as usize - 1]
            .total_cmp(&probs[a as usize - 1])
            .then(a.cmp(&b))
    });
    values
}

fn probability_sum(probs: &[f32], pool: &[u8]) -> f32 {
    pool.iter().map(|&v| probs[v as usize - 1]).sum()
}

fn ascending(mut pool: Vec<u8>) -> Vec<u8> {
    pool.sort_unstable();
    pool
}

/// Validated selector.
#[derive(Debug, Clone)]
pub struct PoolSelector {
    config: SelectorConfig,
}

impl PoolSelector {
    pub fn new(config: SelectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Select a pool from a 33-value heatmap.
    ///
    /// `acceptance` scores sampled pools against `state`; it is ignored by
    /// the other policies. `seed` drives the sampled policy only.
    pub fn select(
        &self,
        heatmap: &[f32],
        acceptance: Option<&dyn AcceptanceModel>,
        state: &[f32],
        seed: u64,
    ) -> Result<Selection> {
        ensure!(
            heatmap.len() == PRIMARY_DOMAIN,
            "heatmap has {} values, expected {PRIMARY_DOMAIN}",
            heatmap.len()
        );
        let ranked = rank(heatmap);
        match self.config.policy {
            SelectionPolicy::Top => Ok(self.top(heatmap, &ranked)),
            SelectionPolicy::Sampled => self.sampled(heatmap, &ranked, acceptance, state, seed),
            SelectionPolicy::Constrained => Ok(self.constrained(heatmap, &ranked)),
        }
    }

    fn top(&self, heatmap: &[f32], ranked: &[u8]) -> Selection {
        let pool = ranked[..self.config.pool_size].to_vec();
        Selection {
            score: probability_sum(heatmap, &pool),
            pool: ascending(pool),
            fallback: false,
        }
    }

    fn sampled(
        &self,
        heatmap: &[f32],
        ranked: &[u8],
        acceptance: Option<&dyn AcceptanceModel>,
        state: &[f32],
        seed: u64,
    ) -> Result<Selection> {
        let top = &ranked[..self.config.candidates];
        let mut rng = StdRng::seed_from_u64(seed);
        let trials: Vec<Vec<u8>> = (0..self.config.trials)
            .map(|_| {
                index::sample(&mut rng, top.len(), self.config.pool_size)
                    .iter()
                    .map(|i| top[i])
                    .collect()
            })
            .collect();

        let scores = match acceptance {
            Some(model) => {
                let memberships: Vec<Membership> = trials.iter().map(|p| membership(p)).collect();
                model.score_batch(state, &memberships)?
            }
            None => trials.iter().map(|p| probability_sum(heatmap, p)).collect(),
        };
        ensure!(
            scores.len() == trials.len(),
            "acceptance model returned {} scores for {} pools",
            scores.len(),
            trials.len()
        );

        // Strict comparison keeps the first of equally scored trials.
        let mut best = 0;
        for (k, &s) in scores.iter().enumerate().skip(1) {
            if s > scores[best] {
                best = k;
            }
        }
        let score = scores[best];
        let pool = trials.into_iter().nth(best).unwrap_or_default();
        Ok(Selection {
            pool: ascending(pool),
            score,
            fallback: false,
        })
    }

    fn feasible(&self, combo: &[u8]) -> bool {
        self.config.sum_band.contains(stats::sum(combo))
            && self.config.span_band.contains(stats::span(combo))
            && self.config.odd_band.contains(stats::odd_count(combo))
    }

    fn constrained(&self, heatmap: &[f32], ranked: &[u8]) -> Selection {
        let top = &ranked[..self.config.candidates];

        let mut best: Option<(Vec<u8>, f32)> = None;
        for combo in top
            .iter()
            .copied()
            .combinations(SelectorConfig::COMBINATION_SIZE)
        {
            if !self.feasible(&combo) {
                continue;
            }
            let score = probability_sum(heatmap, &combo);
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((combo, score));
            }
        }

        let Some((combo, score)) = best else {
            tracing::debug!(candidates = top.len(), "no feasible combination, using top pool");
            return Selection {
                fallback: true,
                ..self.top(heatmap, ranked)
            };
        };

        // Combinations are built from rank-ordered candidates, so `combo`
        // is itself in rank order.
        let mut pool: Vec<u8> = combo
            .iter()
            .copied()
            .take(self.config.pool_size)
            .collect();
        for &v in top {
            if pool.len() >= self.config.pool_size {
                break;
            }
            if !combo.contains(&v) {
                pool.push(v);
            }
        }
        Selection {
            pool: ascending(pool),
            score,
            fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssq_core::config::Band;

    fn config(policy: SelectionPolicy, pool_size: usize, candidates: usize) -> SelectorConfig {
        SelectorConfig {
            policy,
            pool_size,
            candidates,
            trials: 50,
            ..Default::default()
        }
    }

    /// Probability decreasing with value: value 1 is most likely.
    fn descending() -> Vec<f32> {
        (0..33).map(|i| (33 - i) as f32 / 561.0).collect()
    }

    #[test]
    fn test_rank_breaks_ties_by_value() {
        let mut probs = vec![0.01; 33];
        probs[20] = 0.5;
        probs[4] = 0.2;
        let r = rank(&probs);
        assert_eq!(&r[..4], &[21, 5, 1, 2]);
        assert_eq!(r.len(), 33);
    }

    #[test]
    fn test_top_uniform_returns_lowest_values() {
        let sel = PoolSelector::new(config(SelectionPolicy::Top, 12, 20)).unwrap();
        let s = sel.select(&[1.0 / 33.0; 33], None, &[], 0).unwrap();
        assert_eq!(s.pool, (1..=12).collect::<Vec<u8>>());
        assert!((s.score - 12.0 / 33.0).abs() < 1e-6);
    }

    #[test]
    fn test_top_picks_most_probable_ascending() {
        let mut probs = vec![0.0; 33];
        for (k, v) in [30u8, 2, 17].iter().enumerate() {
            probs[*v as usize - 1] = 1.0 - k as f32 * 0.1;
        }
        let sel = PoolSelector::new(config(SelectionPolicy::Top, 3, 3)).unwrap();
        let s = sel.select(&probs, None, &[], 0).unwrap();
        assert_eq!(s.pool, vec![2, 17, 30]);
    }

    #[test]
    fn test_sampled_is_seeded_and_within_top() {
        let sel = PoolSelector::new(config(SelectionPolicy::Sampled, 12, 20)).unwrap();
        let probs = descending();
        let a = sel.select(&probs, None, &[], 7).unwrap();
        let b = sel.select(&probs, None, &[], 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.pool.len(), 12);
        assert!(a.pool.iter().all(|&v| v <= 20));
        assert!(a.pool.windows(2).all(|w| w[0] < w[1]));
        assert!((a.score - probability_sum(&probs, &a.pool)).abs() < 1e-6);
    }

    #[test]
    fn test_sampled_with_full_candidate_set_equals_top() {
        // T == P leaves a single possible subset.
        let sel = PoolSelector::new(config(SelectionPolicy::Sampled, 8, 8)).unwrap();
        let s = sel.select(&descending(), None, &[], 3).unwrap();
        assert_eq!(s.pool, (1..=8).collect::<Vec<u8>>());
    }

    struct Prefers(u8);

    impl AcceptanceModel for Prefers {
        fn score(&self, _state: &[f32], m: &Membership) -> Result<f32> {
            Ok(m[self.0 as usize - 1])
        }
    }

    struct Silent;

    impl AcceptanceModel for Silent {
        fn score(&self, _state: &[f32], _m: &Membership) -> Result<f32> {
            Ok(0.0)
        }

        fn score_batch(&self, _state: &[f32], _m: &[Membership]) -> Result<Vec<f32>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_sampled_rejects_missing_scores() {
        let sel = PoolSelector::new(config(SelectionPolicy::Sampled, 4, 20)).unwrap();
        assert!(sel.select(&descending(), Some(&Silent), &[], 1).is_err());
    }

    #[test]
    fn test_sampled_uses_acceptance_model() {
        let cfg = SelectorConfig {
            trials: 200,
            ..config(SelectionPolicy::Sampled, 4, 20)
        };
        let sel = PoolSelector::new(cfg).unwrap();
        let s = sel.select(&descending(), Some(&Prefers(19)), &[], 1).unwrap();
        assert!(s.pool.contains(&19));
        assert_eq!(s.score, 1.0);
    }

    /// Values 1..=6 lead the ranking but are too close together to pass the
    /// span band; the rest of the ranking is spread over the domain.
    fn skewed() -> Vec<f32> {
        (1..=33u32)
            .map(|v| {
                let spread = 1.0 / (1.0 + ((v - 1) * 7 % 33) as f32);
                if v <= 6 {
                    spread + 1.0
                } else {
                    spread
                }
            })
            .collect()
    }

    #[test]
    fn test_constrained_completes_best_combination_by_rank() {
        let sel = PoolSelector::new(config(SelectionPolicy::Constrained, 12, 20)).unwrap();
        let s = sel.select(&skewed(), None, &[], 0).unwrap();
        assert!(!s.fallback);
        // Best combination {1, 2, 6, 20, 25, 30}, then 3, 4, 5, 11, 16, 21 by rank.
        assert_eq!(s.pool, vec![1, 2, 3, 4, 5, 6, 11, 16, 20, 21, 25, 30]);
    }

    #[test]
    fn test_constrained_combination_is_feasible_and_best() {
        let sel = PoolSelector::new(config(SelectionPolicy::Constrained, 6, 20)).unwrap();
        let probs = skewed();
        let s = sel.select(&probs, None, &[], 0).unwrap();
        assert!(sel.feasible(&s.pool));
        assert_eq!(s.pool, vec![1, 2, 6, 20, 25, 30]);

        // Brute force over the same candidates.
        let top = &rank(&probs)[..20];
        let best = top
            .iter()
            .copied()
            .combinations(6)
            .filter(|c| sel.feasible(c))
            .map(|c| probability_sum(&probs, &c))
            .fold(f32::MIN, f32::max);
        assert!((s.score - best).abs() < 1e-6);
    }

    #[test]
    fn test_constrained_small_pool_keeps_most_probable_members() {
        let sel = PoolSelector::new(config(SelectionPolicy::Constrained, 3, 20)).unwrap();
        let s = sel.select(&skewed(), None, &[], 0).unwrap();
        assert_eq!(s.pool, vec![1, 2, 6]);
    }

    #[test]
    fn test_constrained_without_feasible_combination_uses_top() {
        // The twenty most probable values span at most 19.
        let sel = PoolSelector::new(config(SelectionPolicy::Constrained, 12, 20)).unwrap();
        let s = sel.select(&descending(), None, &[], 0).unwrap();
        assert!(s.fallback);
        assert_eq!(s.pool, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_constrained_falls_back_to_top() {
        let cfg = SelectorConfig {
            sum_band: Band { min: 500, max: 600 },
            ..config(SelectionPolicy::Constrained, 12, 20)
        };
        let sel = PoolSelector::new(cfg).unwrap();
        let s = sel.select(&descending(), None, &[], 0).unwrap();
        assert!(s.fallback);
        assert_eq!(s.pool, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_every_policy_returns_p_distinct_values() {
        let probs = descending();
        for policy in [
            SelectionPolicy::Top,
            SelectionPolicy::Sampled,
            SelectionPolicy::Constrained,
        ] {
            let max_t = if policy == SelectionPolicy::Constrained { 12 } else { 33 };
            for t in 1..=max_t {
                for p in 1..=t {
                    let sel = PoolSelector::new(config(policy, p, t)).unwrap();
                    let s = sel.select(&probs, None, &[], (t * 100 + p) as u64).unwrap();
                    assert_eq!(s.pool.len(), p, "{policy:?} T={t} P={p}");
                    assert!(s.pool.windows(2).all(|w| w[0] < w[1]));
                    assert!(s.pool.iter().all(|v| (1..=33).contains(v)));
                }
            }
        }
    }

    #[test]
    fn test_rejects_bad_config_and_heatmap() {
        assert!(matches!(
            PoolSelector::new(config(SelectionPolicy::Top, 0, 20)),
            Err(ConfigError::EmptyPool)
        ));
        assert!(matches!(
            PoolSelector::new(config(SelectionPolicy::Top, 13, 12)),
            Err(ConfigError::PoolExceedsCandidates { .. })
        ));
        let sel = PoolSelector::new(config(SelectionPolicy::Top, 3, 5)).unwrap();
        assert!(sel.select(&[0.1; 10], None, &[], 0).is_err());
    }
}
