//! Composition statistics of a single primary set.
//!
//! [`composition`] turns the six primaries of a draw into the 10-wide `stats`
//! descriptor. The helpers are shared with the constrained pool selector.

use std::collections::HashSet;

const PRIMES: [u8; 11] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31];

/// Width of the composition descriptor.
pub const STATS_WIDTH: usize = 10;

/// Sum of the values.
pub fn sum(values: &[u8]) -> u32 {
    values.iter().map(|&v| v as u32).sum()
}

/// `max - min` of the values, zero for an empty slice.
pub fn span(values: &[u8]) -> u32 {
    match (values.iter().min(), values.iter().max()) {
        (Some(&lo), Some(&hi)) => (hi - lo) as u32,
        _ => 0,
    }
}

pub fn odd_count(values: &[u8]) -> u32 {
    values.iter().filter(|&&v| v % 2 == 1).count() as u32
}

/// Distinct pairwise absolute differences minus `(len - 1)`.
pub fn ac_value(values: &[u8]) -> i32 {
    let mut diffs = HashSet::new();
    for (i, &a) in values.iter().enumerate() {
        for &b in &values[i + 1..] {
            diffs.insert(a.abs_diff(b));
        }
    }
    diffs.len() as i32 - (values.len() as i32 - 1)
}

/// Longest run of consecutive integers in an ascending slice.
pub fn longest_run(sorted: &[u8]) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let (mut best, mut run) = (1u32, 1u32);
    for pair in sorted.windows(2) {
        if pair[1] == pair[0] + 1 {
            run += 1;
            best = best.max(run);
        } else {
            run = 1;
        }
    }
    best
}

/// The 10-wide descriptor of an ascending six-value primary set.
///
/// Layout: sum/200, AC/10, odd/6, high (>16)/6, primes/6, low band
/// (1-11)/6, mid band (12-22)/6, top band (23-33)/6, span/32, longest run/6.
pub fn composition(sorted: &[u8; 6]) -> [f32; STATS_WIDTH] {
    [
        sum(sorted) as f32 / 200.0,
        ac_value(sorted) as f32 / 10.0,
        odd_count(sorted) as f32 / 6.0,
        share(sorted, |v| v > 16),
        share(sorted, |v| PRIMES.contains(&v)),
        share(sorted, |v| (1..=11).contains(&v)),
        share(sorted, |v| (12..=22).contains(&v)),
        share(sorted, |v| (23..=33).contains(&v)),
        span(sorted) as f32 / 32.0,
        longest_run(sorted) as f32 / 6.0,
    ]
}

fn share(sorted: &[u8; 6], pred: impl Fn(u8) -> bool) -> f32 {
    sorted.iter().filter(|&&v| pred(v)).count() as f32 / 6.0
}
