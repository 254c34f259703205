//! The per-dataset merge run.
//!
//! ```text
//! Idle → Listing → Reading (per object) → Merging → Writing → Done
//!   └──────────┴───────────┴────────────────┴──────────┴──→ Failed
//! ```
//!
//! A run is sequential: the listing is fully consumed before the first
//! read, every read completes before the merge, and the merge completes
//! before either sink is written. `Failed` is terminal for this run only.

use crate::merge::dataset::DatasetConfig;
use crate::merge::error::MergeError;
use crate::merge::extractor::extract_records;
use crate::merge::lister::list_sources;
use crate::merge::merger::LineMerger;
use crate::merge::report::MergeReport;
use crate::merge::sink::{DualSinkWriter, SinkTarget};
use crate::store::ObjectStore;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Phase of a merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergePhase {
    Idle,
    Listing,
    Reading,
    Merging,
    Writing,
    Done,
    Failed,
}

impl std::fmt::Display for MergePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MergePhase::Idle => "idle",
            MergePhase::Listing => "listing",
            MergePhase::Reading => "reading",
            MergePhase::Merging => "merging",
            MergePhase::Writing => "writing",
            MergePhase::Done => "done",
            MergePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Cancellation and deadline for a merge run.
///
/// Both are honoured before listing, around every object read, and
/// before writing. Writes themselves are never interrupted, so an abort
/// cannot leave a half-written payload behind.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fail fast if the run was cancelled or is out of time
    pub fn check(&self) -> Result<(), MergeError> {
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(MergeError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run `fut`, abandoning it if cancellation or the deadline wins.
    /// Abandoning drops the future, which releases any open body.
    async fn guard<T, F>(&self, fut: F) -> Result<T, MergeError>
    where
        F: Future<Output = Result<T, MergeError>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(MergeError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(MergeError::DeadlineExceeded),
                result = fut => result,
            },
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(MergeError::Cancelled),
                result = fut => result,
            },
        }
    }
}

/// One dataset's merge run, tracking its phase
#[derive(Debug)]
pub struct MergeRun<'a> {
    dataset: &'a DatasetConfig,
    phase: MergePhase,
    failed_at: Option<MergePhase>,
}

impl<'a> MergeRun<'a> {
    pub fn new(dataset: &'a DatasetConfig) -> Self {
        MergeRun {
            dataset,
            phase: MergePhase::Idle,
            failed_at: None,
        }
    }

    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    /// The phase a failed run stopped in
    pub fn failed_phase(&self) -> Option<MergePhase> {
        self.failed_at
    }

    fn enter(&mut self, phase: MergePhase) {
        debug!(dataset = %self.dataset.name, from = %self.phase, to = %phase, "merge phase");
        self.phase = phase;
    }

    /// Execute the run. A run executes once; on error the phase becomes
    /// `Failed` and `failed_phase` names the step that failed.
    pub async fn execute<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        options: &MergeOptions,
    ) -> Result<MergeReport, MergeError> {
        debug_assert_eq!(self.phase, MergePhase::Idle, "MergeRun executed twice");

        let result = self.run_phases(store, options).await;
        if result.is_err() {
            self.failed_at = Some(self.phase);
            self.enter(MergePhase::Failed);
        }
        result
    }

    async fn run_phases<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        options: &MergeOptions,
    ) -> Result<MergeReport, MergeError> {
        let dataset = self.dataset;

        self.enter(MergePhase::Listing);
        let listing = options
            .guard(list_sources(store, &dataset.source_bucket))
            .await?;
        info!(
            dataset = %dataset.name,
            bucket = %dataset.source_bucket,
            eligible = listing.eligible.len(),
            skipped = listing.skipped,
            "listed source objects"
        );

        self.enter(MergePhase::Reading);
        let mut merger = LineMerger::new();
        for source in &listing.eligible {
            let records = options.guard(extract_records(store, source)).await?;
            merger.push(source, records);
        }

        self.enter(MergePhase::Merging);
        let (payload, totals) = merger.finish();
        info!(
            dataset = %dataset.name,
            records = totals.records,
            files = totals.source_files,
            source_bytes = totals.source_bytes,
            "merged records"
        );

        self.enter(MergePhase::Writing);
        options.check()?;
        let output_bytes = DualSinkWriter::new(store)
            .write(
                &payload,
                SinkTarget {
                    bucket: &dataset.dest_bucket,
                    key: &dataset.dest_key,
                    local_path: &dataset.local_path,
                },
            )
            .await?;

        self.enter(MergePhase::Done);
        Ok(MergeReport::build(&dataset.name, totals, output_bytes))
    }
}

/// Merge one dataset: list, read, concatenate, write both sinks, report.
///
/// The store is injected; this function never reads configuration or the
/// environment. Errors are returned, not swallowed. A caller merging
/// several datasets should catch each one and carry on with the next.
pub async fn merge_dataset<S: ObjectStore + ?Sized>(
    store: &S,
    dataset: &DatasetConfig,
    options: &MergeOptions,
) -> Result<MergeReport, MergeError> {
    MergeRun::new(dataset).execute(store, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = InMemoryObjectStore::new();
        let dir = tempfile::tempdir().unwrap();
        let dataset = DatasetConfig::for_dataset("events", dir.path());

        let options = MergeOptions::new();
        options.cancel.cancel();

        let mut run = MergeRun::new(&dataset);
        let err = run.execute(&store, &options).await.unwrap_err();
        assert!(matches!(err, MergeError::Cancelled));
        assert_eq!(run.phase(), MergePhase::Failed);
        assert_eq!(run.failed_phase(), Some(MergePhase::Listing));
    }

    #[tokio::test]
    async fn test_expired_deadline() {
        let store = InMemoryObjectStore::new();
        store.create_bucket("raw-events");
        let dir = tempfile::tempdir().unwrap();
        let dataset = DatasetConfig::for_dataset("events", dir.path());

        let options = MergeOptions::new().with_deadline(Instant::now());
        let err = merge_dataset(&store, &dataset, &options).await.unwrap_err();
        assert!(matches!(err, MergeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_phase_done_after_success() {
        let store = InMemoryObjectStore::new();
        store.create_bucket("raw-events");
        store.create_bucket("bronze");
        store
            .put("raw-events", "a.json", Bytes::from_static(b"{}\n"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dataset = DatasetConfig::for_dataset("events", dir.path());

        let mut run = MergeRun::new(&dataset);
        let report = run.execute(&store, &MergeOptions::new()).await.unwrap();
        assert_eq!(run.phase(), MergePhase::Done);
        assert_eq!(run.failed_phase(), None);
        assert_eq!(report.records, 1);
    }

    #[tokio::test]
    async fn test_failed_phase_is_reading_on_decode_error() {
        let store = InMemoryObjectStore::new();
        store.create_bucket("raw-events");
        store.create_bucket("bronze");
        store
            .put("raw-events", "bad.json", Bytes::from_static(&[0xC3, 0x28]))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dataset = DatasetConfig::for_dataset("events", dir.path());

        let mut run = MergeRun::new(&dataset);
        let err = run.execute(&store, &MergeOptions::new()).await.unwrap_err();
        assert!(matches!(err, MergeError::Decode { .. }));
        assert_eq!(run.failed_phase(), Some(MergePhase::Reading));
        // Only the source seeding touched the store
        assert!(store.put_log().iter().all(|(bucket, _)| bucket != "bronze"));
        assert!(store.object("bronze", "events.json").is_none());
    }
}
