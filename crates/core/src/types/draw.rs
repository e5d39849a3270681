//! A single draw and its raw ingestion record.
//!
//! A [`Draw`] always holds a valid outcome: six distinct primary values in
//! `1..=33`, kept in ascending order, and one secondary value in `1..=16`.
//! Construction goes through [`Draw::new`] (or `TryFrom<DrawRecord>`), which
//! rejects anything else with a [`DataError`] naming the issue.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of values in the primary domain (`1..=33`).
pub const PRIMARY_DOMAIN: usize = 33;
/// Number of values in the secondary domain (`1..=16`).
pub const SECONDARY_DOMAIN: usize = 16;
/// Primary values drawn per issue.
pub const PRIMARY_PICK: usize = 6;

/// Data-integrity failure. Always carries the offending issue id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    /// Wrong number of primary values.
    #[error("issue {issue}: expected 6 primary values, found {found}")]
    PrimaryArity { issue: u32, found: usize },
    /// Primary value outside `1..=33`.
    #[error("issue {issue}: primary value {value} outside 1..=33")]
    PrimaryOutOfRange { issue: u32, value: u8 },
    /// The same primary value appears twice in one draw.
    #[error("issue {issue}: primary value {value} appears more than once")]
    DuplicatePrimary { issue: u32, value: u8 },
    /// Secondary value outside `1..=16`.
    #[error("issue {issue}: secondary value {value} outside 1..=16")]
    SecondaryOutOfRange { issue: u32, value: u8 },
    /// Issue ids are not strictly increasing.
    #[error("issue {issue} does not follow preceding issue {previous}")]
    NonMonotonicIssue { issue: u32, previous: u32 },
    /// The same issue id appears twice in an ordered history.
    #[error("issue {issue} appears more than once")]
    DuplicateIssue { issue: u32 },
}

/// One validated draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draw {
    /// Unique, increasing identifier. Sole ordering key.
    pub issue: u32,
    primaries: [u8; PRIMARY_PICK],
    secondary: u8,
    /// Opaque date string, carried through but never interpreted.
    pub date: String,
}

impl Draw {
    /// Validate and build a draw. Primaries may arrive in any order.
    pub fn new(
        issue: u32,
        primaries: &[u8],
        secondary: u8,
        date: impl Into<String>,
    ) -> Result<Self, DataError> {
        if primaries.len() != PRIMARY_PICK {
            return Err(DataError::PrimaryArity {
                issue,
                found: primaries.len(),
            });
        }

        let mut sorted = [0u8; PRIMARY_PICK];
        sorted.copy_from_slice(primaries);
        sorted.sort_unstable();

        for &value in &sorted {
            if value == 0 || value as usize > PRIMARY_DOMAIN {
                return Err(DataError::PrimaryOutOfRange { issue, value });
            }
        }
        if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(DataError::DuplicatePrimary {
                issue,
                value: pair[0],
            });
        }
        if secondary == 0 || secondary as usize > SECONDARY_DOMAIN {
            return Err(DataError::SecondaryOutOfRange {
                issue,
                value: secondary,
            });
        }

        Ok(Self {
            issue,
            primaries: sorted,
            secondary,
            date: date.into(),
        })
    }

    /// Primary values in ascending order.
    #[inline]
    pub fn primaries(&self) -> &[u8; PRIMARY_PICK] {
        &self.primaries
    }

    /// The secondary value.
    #[inline]
    pub fn secondary(&self) -> u8 {
        self.secondary
    }

    /// Whether `value` is one of this draw's primaries.
    #[inline]
    pub fn contains_primary(&self, value: u8) -> bool {
        self.primaries.binary_search(&value).is_ok()
    }

    /// Number of this draw's primaries found in `pool`.
    pub fn overlap(&self, pool: &[u8]) -> usize {
        pool.iter().filter(|&&v| self.contains_primary(v)).count()
    }
}

impl fmt::Display for Draw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.issue)?;
        for (i, v) in self.primaries.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02}", v)?;
        }
        write!(f, "] + {:02}", self.secondary)
    }
}

/// Raw tabular row as produced by the acquisition side
/// (`issue,date,red1..red6,blue`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub issue: u32,
    #[serde(default)]
    pub date: String,
    pub red1: u8,
    pub red2: u8,
    pub red3: u8,
    pub red4: u8,
    pub red5: u8,
    pub red6: u8,
    pub blue: u8,
}

impl TryFrom<DrawRecord> for Draw {
    type Error = DataError;

    fn try_from(r: DrawRecord) -> Result<Self, Self::Error> {
        Draw::new(
            r.issue,
            &[r.red1, r.red2, r.red3, r.red4, r.red5, r.red6],
            r.blue,
            r.date,
        )
    }
}
