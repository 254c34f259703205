//! Sample-data seeding for development stores.
//!
//! Uploads `<dir>/raw_<dataset>.json` to `raw-<dataset>/raw_<dataset>.json`
//! so a fresh store has something to merge. Buckets must already exist.

use crate::merge::RAW_BUCKET_PREFIX;
use crate::store::{ObjectStore, ObjectStoreError};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happened to one dataset's seed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Uploaded {
        bucket: String,
        key: String,
        bytes: u64,
    },
    /// No seed file on disk; nothing uploaded
    MissingFile(PathBuf),
}

/// File name of a dataset's seed data, also used as the object key
pub fn seed_file_name(dataset: &str) -> String {
    format!("raw_{}.json", dataset)
}

/// Upload one dataset's seed file
pub async fn seed_dataset<S: ObjectStore + ?Sized>(
    store: &S,
    dataset: &str,
    dir: &Path,
) -> Result<SeedOutcome, ObjectStoreError> {
    let file_name = seed_file_name(dataset);
    let path = dir.join(&file_name);

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SeedOutcome::MissingFile(path));
        }
        Err(e) => return Err(e.into()),
    };

    let bucket = format!("{}{}", RAW_BUCKET_PREFIX, dataset);
    let bytes = data.len() as u64;
    store.put(&bucket, &file_name, Bytes::from(data)).await?;

    Ok(SeedOutcome::Uploaded {
        bucket,
        key: file_name,
        bytes,
    })
}

/// Seed every dataset, logging and skipping the ones that fail.
/// Returns how many were uploaded.
pub async fn seed_all<S, I, N>(store: &S, datasets: I, dir: &Path) -> usize
where
    S: ObjectStore + ?Sized,
    I: IntoIterator<Item = N>,
    N: AsRef<str>,
{
    let mut uploaded = 0;
    for dataset in datasets {
        let dataset = dataset.as_ref();
        match seed_dataset(store, dataset, dir).await {
            Ok(SeedOutcome::Uploaded { bucket, key, bytes }) => {
                info!(dataset, bucket = %bucket, key = %key, bytes, "uploaded seed file");
                uploaded += 1;
            }
            Ok(SeedOutcome::MissingFile(path)) => {
                warn!(dataset, path = %path.display(), "seed file not found, skipping");
            }
            Err(e) => {
                warn!(dataset, error = %e, "seed upload failed, skipping");
            }
        }
    }
    uploaded
}
