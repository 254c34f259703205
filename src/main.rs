//! bronze-merge: merge every configured dataset into the bronze layer.
//!
//! Prints one JSON `MergeReport` per successful dataset on stdout and
//! exits with status 1 when any dataset failed.

use bronze_merge::observability::init_tracing;
use bronze_merge::{
    build_store, run_datasets, run_datasets_concurrently, summarize_outcomes, BronzeConfig,
};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let config = BronzeConfig::from_env()?;
    init_tracing(&config.log)?;

    let store = build_store(&config.store)?;
    let datasets = config.dataset_configs();
    info!(
        store = ?config.store.store_type,
        datasets = ?config.datasets,
        concurrent = config.concurrent,
        data_root = %config.data_root.display(),
        "starting bronze merge"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let batch = config.batch_options(cancel);
    let outcomes = if config.concurrent {
        run_datasets_concurrently(store.as_ref(), &datasets, &batch).await?
    } else {
        run_datasets(store.as_ref(), &datasets, &batch).await
    };

    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!("{}", serde_json::to_string(report)?),
            Err(e) => error!(dataset = %outcome.dataset, error = %e, "failed"),
        }
    }

    let summary = summarize_outcomes(&outcomes);
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        records = summary.records,
        "bronze merge finished"
    );

    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
