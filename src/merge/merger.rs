//! Line merging: folds per-object records into one ordered payload.
//!
//! Pure accumulation, no I/O. The payload is built exactly once, by
//! `finish`, and then handed unchanged to both sinks.

use crate::merge::lister::SourceObjectRef;
use bytes::Bytes;

/// Running totals of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeTotals {
    /// Eligible objects folded in
    pub source_files: u64,
    /// Records kept
    pub records: u64,
    /// Sum of declared sizes of eligible objects
    pub source_bytes: u64,
}

/// The `\n`-joined records of one dataset. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedPayload(Bytes);

impl MergedPayload {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap reference-counted handle to the payload bytes
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }
}

/// Accumulates records from every eligible object in listing order
#[derive(Debug, Default)]
pub struct LineMerger {
    records: Vec<String>,
    totals: MergeTotals,
}

impl LineMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one object's records, after those already pushed
    pub fn push(&mut self, source: &SourceObjectRef, records: Vec<String>) {
        self.totals.source_files += 1;
        self.totals.source_bytes += source.size;
        self.totals.records += records.len() as u64;
        self.records.extend(records);

        debug_assert_eq!(
            self.totals.records,
            self.records.len() as u64,
            "Invariant: record count matches accumulated records"
        );
    }

    /// Join all records with `\n` into the final payload
    pub fn finish(self) -> (MergedPayload, MergeTotals) {
        let payload = Bytes::from(self.records.join("\n"));
        (MergedPayload(payload), self.totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(key: &str, size: u64) -> SourceObjectRef {
        SourceObjectRef {
            bucket: "raw-events".to_string(),
            key: key.to_string(),
            size,
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_concatenates_in_push_order() {
        let mut merger = LineMerger::new();
        merger.push(&source("a.json", 4), lines(&["1", "2"]));
        merger.push(&source("b.json", 2), lines(&["3"]));

        let (payload, totals) = merger.finish();
        assert_eq!(payload.as_bytes(), b"1\n2\n3");
        assert_eq!(
            totals,
            MergeTotals {
                source_files: 2,
                records: 3,
                source_bytes: 6,
            }
        );
    }

    #[test]
    fn test_object_without_records_still_counts_as_source() {
        let mut merger = LineMerger::new();
        merger.push(&source("empty.json", 3), Vec::new());
        merger.push(&source("b.json", 5), lines(&["{}"]));

        let (payload, totals) = merger.finish();
        assert_eq!(payload.as_bytes(), b"{}");
        assert_eq!(totals.source_files, 2);
        assert_eq!(totals.source_bytes, 8);
        assert_eq!(totals.records, 1);
    }

    #[test]
    fn test_empty_merge() {
        let (payload, totals) = LineMerger::new().finish();
        assert!(payload.is_empty());
        assert_eq!(totals, MergeTotals::default());
    }
}
