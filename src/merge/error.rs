//! Merge Errors
//!
//! Every variant aborts the current dataset's run. Nothing here is
//! retried; retry belongs to whoever schedules the merge.

use crate::store::ObjectStoreError;
use serde::Serialize;

/// Which destination a write error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Destination bucket/key in the object store
    Remote,
    /// Local mirror file
    Local,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Remote => write!(f, "remote"),
            SinkKind::Local => write!(f, "local"),
        }
    }
}

/// Underlying cause of a sink write failure
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse error classes callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    BucketNotFound,
    ObjectRead,
    Write,
    Aborted,
}

/// Error type for a single dataset merge
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Source bucket missing or inaccessible
    #[error("source bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    /// Listing failed for a reason other than a missing bucket
    #[error("failed to list bucket {bucket}: {source}")]
    List {
        bucket: String,
        source: ObjectStoreError,
    },

    /// Network or store failure while reading a source object
    #[error("failed to read {bucket}/{key}: {source}")]
    ObjectRead {
        bucket: String,
        key: String,
        source: ObjectStoreError,
    },

    /// Source object body is not valid UTF-8
    #[error("{bucket}/{key} is not valid UTF-8: {source}")]
    Decode {
        bucket: String,
        key: String,
        source: std::str::Utf8Error,
    },

    /// Destination write failed
    #[error("{sink} write failed (remote committed: {remote_committed}): {source}")]
    Write {
        sink: SinkKind,
        remote_committed: bool,
        source: SinkError,
    },

    /// Cancellation token fired
    #[error("merge cancelled")]
    Cancelled,

    /// Deadline passed before the merge finished
    #[error("merge deadline exceeded")]
    DeadlineExceeded,
}

impl MergeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MergeError::BucketNotFound { .. } => ErrorClass::BucketNotFound,
            MergeError::List { .. } | MergeError::ObjectRead { .. } | MergeError::Decode { .. } => {
                ErrorClass::ObjectRead
            }
            MergeError::Write { .. } => ErrorClass::Write,
            MergeError::Cancelled | MergeError::DeadlineExceeded => ErrorClass::Aborted,
        }
    }

    /// True when the remote destination holds the new payload but the
    /// local mirror does not
    pub fn left_sinks_inconsistent(&self) -> bool {
        matches!(
            self,
            MergeError::Write {
                remote_committed: true,
                ..
            }
        )
    }
}
