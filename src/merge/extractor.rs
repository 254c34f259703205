//! Record extraction: one source object in, its JSONL record lines out.

use crate::merge::error::MergeError;
use crate::merge::lister::SourceObjectRef;
use crate::store::ObjectStore;
use tracing::debug;

/// Split decoded text into records: trimmed, non-empty lines in order.
///
/// Lines end at `\n`; a trailing `\r` is removed by the trim.
pub fn split_records(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read one source object and return its records.
///
/// The body is a scoped read: it is consumed by `read_to_end` and
/// released on every path out of this function, including a decode
/// failure or the future being dropped mid-read.
pub async fn extract_records<S: ObjectStore + ?Sized>(
    store: &S,
    source: &SourceObjectRef,
) -> Result<Vec<String>, MergeError> {
    let read_error = |e| MergeError::ObjectRead {
        bucket: source.bucket.clone(),
        key: source.key.clone(),
        source: e,
    };

    let body = store
        .open(&source.bucket, &source.key)
        .await
        .map_err(read_error)?;
    let data = body.read_to_end().await.map_err(read_error)?;

    let text = std::str::from_utf8(&data).map_err(|e| MergeError::Decode {
        bucket: source.bucket.clone(),
        key: source.key.clone(),
        source: e,
    })?;

    let records = split_records(text);
    debug!(
        bucket = %source.bucket,
        key = %source.key,
        declared_bytes = source.size,
        read_bytes = data.len(),
        records = records.len(),
        "extracted records"
    );
    Ok(records)
}
