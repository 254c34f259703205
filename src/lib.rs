//! Bronze-layer merge engine.
//!
//! Reads many small JSONL objects from `raw-<dataset>` buckets and writes
//! one consolidated `bronze/<dataset>.json` per dataset, mirrored to the
//! local filesystem.

pub mod config;
pub mod driver;
pub mod merge;
pub mod observability;
pub mod seed;
pub mod store;

pub use config::{build_store, BronzeConfig, ConfigError, StoreConfig, StoreType};
pub use driver::{
    run_datasets, run_datasets_concurrently, summarize_outcomes, BatchOptions, BatchSummary,
    DatasetOutcome, DriverError,
};
pub use merge::{merge_dataset, DatasetConfig, MergeError, MergeOptions, MergeReport};
pub use store::{InMemoryObjectStore, LocalFsObjectStore, ObjectStore, ObjectStoreError};
