//! Dual-sink writer: one payload, two destinations.
//!
//! ## Write protocol
//!
//! 1. Stage the payload in a temp file next to the local path
//! 2. Put the payload to the remote destination
//!    - on failure: remove the staged file, neither sink changed
//! 3. Rename the staged file over the local path
//!    - on failure: remote holds the new payload, local the old one
//!
//! Step 3 is the only window in which the two sinks can disagree. Neither
//! sink ever holds a truncated payload.

use crate::merge::error::{MergeError, SinkError, SinkKind};
use crate::merge::merger::MergedPayload;
use crate::store::{staging_path, ObjectStore};
use std::io::Error as IoError;
use std::path::Path;
use tracing::{error, info, warn};

/// Where a merged payload goes
#[derive(Debug, Clone, Copy)]
pub struct SinkTarget<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub local_path: &'a Path,
}

/// Writes a payload to the object store and the local filesystem
pub struct DualSinkWriter<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
}

fn local_error(remote_committed: bool, e: IoError) -> MergeError {
    MergeError::Write {
        sink: SinkKind::Local,
        remote_committed,
        source: SinkError::Io(e),
    }
}

/// Best-effort removal of an uncommitted staged file
async fn discard_staged(staged: &Path) {
    if let Err(e) = tokio::fs::remove_file(staged).await {
        warn!(path = %staged.display(), error = %e, "failed to remove staged file");
    }
}

impl<'a, S: ObjectStore + ?Sized> DualSinkWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        DualSinkWriter { store }
    }

    /// Write `payload` to both sinks. Returns the number of bytes written
    /// to each.
    pub async fn write(
        &self,
        payload: &MergedPayload,
        target: SinkTarget<'_>,
    ) -> Result<u64, MergeError> {
        // Step 1: stage locally
        if let Some(parent) = target.local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| local_error(false, e))?;
            }
        }
        let staged = staging_path(target.local_path).map_err(|e| local_error(false, e))?;
        tokio::fs::write(&staged, payload.as_bytes())
            .await
            .map_err(|e| local_error(false, e))?;

        // Step 2: remote
        if let Err(e) = self
            .store
            .put(target.bucket, target.key, payload.bytes())
            .await
        {
            discard_staged(&staged).await;
            return Err(MergeError::Write {
                sink: SinkKind::Remote,
                remote_committed: false,
                source: SinkError::Store(e),
            });
        }
        info!(
            bucket = target.bucket,
            key = target.key,
            bytes = payload.len(),
            "uploaded merged object"
        );

        // Step 3: commit local
        if let Err(e) = tokio::fs::rename(&staged, target.local_path).await {
            error!(
                bucket = target.bucket,
                key = target.key,
                path = %target.local_path.display(),
                error = %e,
                "remote object updated but local mirror was not; sinks are inconsistent"
            );
            discard_staged(&staged).await;
            return Err(local_error(true, e));
        }
        info!(path = %target.local_path.display(), bytes = payload.len(), "wrote local mirror");

        Ok(payload.len() as u64)
    }
}
