//! Bronze Merge Engine
//!
//! Consolidates the small JSONL objects of a `raw-<dataset>` bucket into
//! one newline-delimited object, written to `bronze/<dataset>.json` and
//! mirrored to `<data-root>/bronze/<dataset>.json`.
//!
//! ## Data flow
//!
//! ```text
//! raw-<dataset>/*.json
//!        │ list_sources (paginated, key-sorted, `.json` only)
//!        ▼
//!   SourceObjectRef ──> extract_records (UTF-8, trimmed non-empty lines)
//!        │
//!        ▼
//!   LineMerger ──> MergedPayload ──> DualSinkWriter ──┬─> bronze/<dataset>.json
//!        │                                            └─> <data-root>/bronze/<dataset>.json
//!        ▼
//!   MergeReport
//! ```

pub mod dataset;
pub mod error;
pub mod extractor;
pub mod lister;
pub mod merger;
pub mod pipeline;
pub mod report;
pub mod sink;

pub use dataset::{DatasetConfig, BRONZE_BUCKET, DEFAULT_DATASETS, RAW_BUCKET_PREFIX};
pub use error::{ErrorClass, MergeError, SinkError, SinkKind};
pub use extractor::{extract_records, split_records};
pub use lister::{is_eligible, list_sources, Listing, SourceObjectRef, ELIGIBLE_SUFFIX};
pub use merger::{LineMerger, MergeTotals, MergedPayload};
pub use pipeline::{merge_dataset, MergeOptions, MergePhase, MergeRun};
pub use report::{compression_ratio, MergeReport};
pub use sink::{DualSinkWriter, SinkTarget};
