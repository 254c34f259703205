//! Multi-dataset driver.
//!
//! Runs `merge_dataset` once per dataset, either one after another or all
//! at once. A failing dataset is logged and recorded; it never stops the
//! others. Concurrent runs must target distinct destinations.

use crate::merge::{DatasetConfig, MergeError, MergeOptions, MergePhase, MergeReport, MergeRun};
use crate::store::ObjectStore;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("datasets '{first}' and '{second}' both write {destination}")]
    DuplicateDestination {
        first: String,
        second: String,
        destination: String,
    },
}

/// Options shared by every dataset of one batch
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Cancels every dataset still running
    pub cancel: CancellationToken,
    /// Deadline per dataset, counted from that dataset's start
    pub timeout: Option<Duration>,
}

impl BatchOptions {
    /// Options for one dataset run, starting its deadline now
    pub fn for_run(&self) -> MergeOptions {
        let options = MergeOptions::new().with_cancel(self.cancel.clone());
        match self.timeout {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        }
    }
}

/// Result of one dataset in a batch
#[derive(Debug)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub result: Result<MergeReport, MergeError>,
    /// Phase the run failed in, when it failed
    pub failed_phase: Option<MergePhase>,
    pub elapsed: Duration,
}

impl DatasetOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Counts over a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Failures that left the remote and local sinks disagreeing
    pub inconsistent: usize,
    pub records: u64,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

async fn run_one<S: ObjectStore + ?Sized>(
    store: &S,
    dataset: &DatasetConfig,
    batch: &BatchOptions,
) -> DatasetOutcome {
    let started = Instant::now();
    let options = batch.for_run();
    let mut run = MergeRun::new(dataset);
    let result = run.execute(store, &options).await;
    let elapsed = started.elapsed();

    match &result {
        Ok(report) => info!(
            dataset = %dataset.name,
            records = report.records,
            files = report.source_files,
            output_bytes = report.output_bytes,
            ratio = %report.compression_ratio_display(),
            elapsed_ms = elapsed.as_millis() as u64,
            preview = %report.preview(),
            "dataset merged"
        ),
        Err(e) => error!(
            dataset = %dataset.name,
            phase = ?run.failed_phase(),
            class = ?e.class(),
            error = %e,
            "dataset merge failed"
        ),
    }

    DatasetOutcome {
        dataset: dataset.name.clone(),
        failed_phase: run.failed_phase(),
        result,
        elapsed,
    }
}

/// Merge each dataset in order. Errors are isolated per dataset.
pub async fn run_datasets<S: ObjectStore + ?Sized>(
    store: &S,
    datasets: &[DatasetConfig],
    batch: &BatchOptions,
) -> Vec<DatasetOutcome> {
    let mut outcomes = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        outcomes.push(run_one(store, dataset, batch).await);
    }
    outcomes
}

/// Reject batches where two datasets would write the same remote object
/// or the same local file
pub fn check_distinct_destinations(datasets: &[DatasetConfig]) -> Result<(), DriverError> {
    let mut remote: HashMap<(&str, &str), &str> = HashMap::new();
    let mut local: HashMap<&PathBuf, &str> = HashMap::new();

    for dataset in datasets {
        if let Some(first) = remote.insert(
            (dataset.dest_bucket.as_str(), dataset.dest_key.as_str()),
            dataset.name.as_str(),
        ) {
            return Err(DriverError::DuplicateDestination {
                first: first.to_string(),
                second: dataset.name.clone(),
                destination: format!("{}/{}", dataset.dest_bucket, dataset.dest_key),
            });
        }
        if let Some(first) = local.insert(&dataset.local_path, dataset.name.as_str()) {
            return Err(DriverError::DuplicateDestination {
                first: first.to_string(),
                second: dataset.name.clone(),
                destination: dataset.local_path.display().to_string(),
            });
        }
    }
    Ok(())
}

/// Merge all datasets concurrently. Outcomes come back in input order.
pub async fn run_datasets_concurrently<S: ObjectStore + ?Sized>(
    store: &S,
    datasets: &[DatasetConfig],
    batch: &BatchOptions,
) -> Result<Vec<DatasetOutcome>, DriverError> {
    check_distinct_destinations(datasets)?;
    let runs = datasets.iter().map(|dataset| run_one(store, dataset, batch));
    Ok(join_all(runs).await)
}

pub fn summarize_outcomes(outcomes: &[DatasetOutcome]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                summary.succeeded += 1;
                summary.records += report.records;
            }
            Err(e) => {
                summary.failed += 1;
                if e.left_sinks_inconsistent() {
                    summary.inconsistent += 1;
                }
            }
        }
    }
    if summary.inconsistent > 0 {
        warn!(
            inconsistent = summary.inconsistent,
            "some datasets left remote and local copies out of sync"
        );
    }
    summary
}
