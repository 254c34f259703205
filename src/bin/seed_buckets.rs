//! seed-buckets: upload sample `raw_<dataset>.json` files into their
//! `raw-<dataset>` buckets.
//!
//! Usage: `seed-buckets [DIR]` (default: `$BRONZE_DATA_ROOT`)

use bronze_merge::observability::init_tracing;
use bronze_merge::seed::seed_all;
use bronze_merge::{build_store, BronzeConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = BronzeConfig::from_env()?;
    init_tracing(&config.log)?;

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.data_root.clone());

    let store = build_store(&config.store)?;
    let uploaded = seed_all(store.as_ref(), &config.datasets, &dir).await;
    info!(
        uploaded,
        total = config.datasets.len(),
        dir = %dir.display(),
        "seeding finished"
    );
    Ok(())
}
