//! Ordered, deduplicated draw history.
//!
//! [`DrawHistory`] is the leaf data every other component reads. It is
//! immutable once built and guarantees strictly ascending `issue` ids.

use std::collections::HashSet;
use std::io::{BufReader, Read};
use std::ops::Index;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use super::draw::{DataError, Draw, DrawRecord};

/// Immutable draw sequence sorted ascending by issue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawHistory {
    draws: Vec<Draw>,
}

impl DrawHistory {
    /// Wrap draws that are expected to already be in issue order.
    ///
    /// Fails on the first out-of-order or repeated issue.
    pub fn new(draws: Vec<Draw>) -> Result<Self, DataError> {
        for pair in draws.windows(2) {
            let (previous, issue) = (pair[0].issue, pair[1].issue);
            if issue == previous {
                return Err(DataError::DuplicateIssue { issue });
            }
            if issue < previous {
                return Err(DataError::NonMonotonicIssue { issue, previous });
            }
        }
        Ok(Self { draws })
    }

    /// Validate, sort and deduplicate raw records.
    ///
    /// When an issue is ingested more than once the first record wins. Any
    /// malformed record aborts ingestion.
    pub fn ingest(records: impl IntoIterator<Item = DrawRecord>) -> Result<Self, DataError> {
        let mut seen = HashSet::new();
        let mut draws = Vec::new();
        let mut dropped = 0usize;

        for record in records {
            let draw = Draw::try_from(record)?;
            if seen.insert(draw.issue) {
                draws.push(draw);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "duplicate issues ingested, kept first occurrence");
        }

        draws.sort_by_key(|d| d.issue);
        Ok(Self { draws })
    }

    /// Load a CSV (optionally gzip-compressed) with columns
    /// `issue,date,red1..red6,blue`.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let file =
            std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for (line, row) in csv.deserialize::<DrawRecord>().enumerate() {
            let record =
                row.with_context(|| format!("{}: malformed row {}", path.display(), line + 2))?;
            records.push(record);
        }

        let history = Self::ingest(records)?;
        tracing::info!(
            path = %path.display(),
            draws = history.len(),
            first = history.first().map(|d| d.issue),
            last = history.last().map(|d| d.issue),
            "loaded draw history"
        );
        Ok(history)
    }

    /// All draws in issue order.
    #[inline]
    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Draw> {
        self.draws.get(index)
    }

    #[inline]
    pub fn first(&self) -> Option<&Draw> {
        self.draws.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&Draw> {
        self.draws.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Draw> {
        self.draws.iter()
    }

    /// Draws strictly before `index`.
    #[inline]
    pub fn prefix(&self, index: usize) -> &[Draw] {
        &self.draws[..index.min(self.draws.len())]
    }

    /// Issue id that would follow the latest draw.
    pub fn next_issue(&self) -> Option<u32> {
        self.last().map(|d| d.issue + 1)
    }
}

impl Index<usize> for DrawHistory {
    type Output = Draw;

    fn index(&self, index: usize) -> &Draw {
        &self.draws[index]
    }
}

impl<'a> IntoIterator for &'a DrawHistory {
    type Item = &'a Draw;
    type IntoIter = std::slice::Iter<'a, Draw>;

    fn into_iter(self) -> Self::IntoIter {
        self.draws.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(issue: u32, reds: [u8; 6], blue: u8) -> DrawRecord {
        DrawRecord {
            issue,
            date: String::new(),
            red1: reds[0],
            red2: reds[1],
            red3: reds[2],
            red4: reds[3],
            red5: reds[4],
            red6: reds[5],
            blue,
        }
    }

    fn draw(issue: u32) -> Draw {
        Draw::new(issue, &[1, 2, 3, 4, 5, 6], 1, "").unwrap()
    }

    #[test]
    fn test_new_accepts_ascending() {
        let h = DrawHistory::new(vec![draw(1), draw(2), draw(5)]).unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(h.next_issue(), Some(6));
    }

    #[test]
    fn test_new_rejects_duplicate_issue() {
        let err = DrawHistory::new(vec![draw(1), draw(2), draw(2)]).unwrap_err();
        assert_eq!(err, DataError::DuplicateIssue { issue: 2 });
    }

    #[test]
    fn test_new_rejects_non_monotonic() {
        let err = DrawHistory::new(vec![draw(1), draw(3), draw(2)]).unwrap_err();
        assert_eq!(
            err,
            DataError::NonMonotonicIssue {
                issue: 2,
                previous: 3
            }
        );
    }

    #[test]
    fn test_ingest_sorts_and_keeps_first_duplicate() {
        let records = vec![
            record(3, [1, 2, 3, 4, 5, 6], 1),
            record(1, [7, 8, 9, 10, 11, 12], 2),
            record(3, [20, 21, 22, 23, 24, 25], 3),
            record(2, [1, 3, 5, 7, 9, 11], 4),
        ];
        let h = DrawHistory::ingest(records).unwrap();
        let issues: Vec<u32> = h.iter().map(|d| d.issue).collect();
        assert_eq!(issues, vec![1, 2, 3]);
        assert_eq!(h[2].primaries(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(h[2].secondary(), 1);
    }

    #[test]
    fn test_ingest_rejects_malformed() {
        let records = vec![
            record(1, [1, 2, 3, 4, 5, 6], 1),
            record(2, [1, 1, 3, 4, 5, 6], 1),
        ];
        let err = DrawHistory::ingest(records).unwrap_err();
        assert_eq!(err, DataError::DuplicatePrimary { issue: 2, value: 1 });
    }

    #[test]
    fn test_prefix_is_bounded() {
        let h = DrawHistory::new(vec![draw(1), draw(2)]).unwrap();
        assert_eq!(h.prefix(0).len(), 0);
        assert_eq!(h.prefix(1).len(), 1);
        assert_eq!(h.prefix(10).len(), 2);
    }

    #[test]
    fn test_load_csv() {
        let mut f = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "issue,date,red1,red2,red3,red4,red5,red6,blue").unwrap();
        writeln!(f, "2024002,2024-01-04,3,8,15,22,27,31,9").unwrap();
        writeln!(f, "2024001,2024-01-02,1,5,9,13,17,21,4").unwrap();
        f.flush().unwrap();

        let h = DrawHistory::load_csv(f.path()).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].issue, 2024001);
        assert_eq!(h[0].date, "2024-01-02");
        assert_eq!(h[1].secondary(), 9);
    }

    #[test]
    fn test_load_csv_gz() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let f = tempfile::Builder::new()
            .suffix(".csv.gz")
            .tempfile()
            .expect("create temp file");
        {
            let mut enc = GzEncoder::new(f.reopen().unwrap(), Compression::default());
            writeln!(enc, "issue,date,red1,red2,red3,red4,red5,red6,blue").unwrap();
            writeln!(enc, "7,2003-03-02,1,2,3,4,5,6,16").unwrap();
            enc.finish().unwrap();
        }

        let h = DrawHistory::load_csv(f.path()).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].secondary(), 16);
    }

    #[test]
    fn test_load_csv_surfaces_data_error() {
        let mut f = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "issue,date,red1,red2,red3,red4,red5,red6,blue").unwrap();
        writeln!(f, "99,2024-01-02,1,5,9,13,17,40,4").unwrap();
        f.flush().unwrap();

        let err = DrawHistory::load_csv(f.path()).unwrap_err();
        let data = err.downcast_ref::<DataError>().expect("typed data error");
        assert_eq!(*data, DataError::PrimaryOutOfRange { issue: 99, value: 40 });
    }
}
