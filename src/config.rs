//! Runtime configuration for the binaries.
//!
//! Loaded in three layers: built-in defaults, then an optional TOML file
//! named by `BRONZE_CONFIG`, then environment variables:
//!
//! ## Store
//! - `BRONZE_STORE_TYPE`: `s3` (default), `localfs`, or `memory`
//! - `BRONZE_STORE_PATH`: base directory for `localfs` (default: `./store`)
//! - `MINIO_ENDPOINT`: S3-compatible endpoint (default: `localhost:9000`)
//! - `MINIO_ACCESS_KEY` / `MINIO_SECRET_KEY`: credentials (default: `minioadmin`)
//! - `AWS_REGION`: region (default: `us-east-1`)
//!
//! ## Merge
//! - `BRONZE_DATA_ROOT`: local mirror root (default: `./data`)
//! - `BRONZE_DATASETS`: comma-separated dataset names (default: `events,users,activities`)
//! - `BRONZE_CONCURRENT`: merge datasets concurrently (default: false)
//! - `BRONZE_DEADLINE_SECS`: per-dataset deadline (default: none)
//!
//! ## Logging
//! - `BRONZE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `RUST_LOG`: tracing filter (default: `info`)
//!
//! The merge engine never reads any of this. The binaries turn it into a
//! store and a list of `DatasetConfig`s and hand those over.

use crate::driver::BatchOptions;
use crate::merge::{DatasetConfig, DEFAULT_DATASETS};
use crate::observability::{LogConfig, LogFormat};
use crate::store::{InMemoryObjectStore, LocalFsObjectStore, ObjectStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const CONFIG_PATH_VAR: &str = "BRONZE_CONFIG";

/// Largest accepted per-dataset deadline (one day)
pub const DEADLINE_SECS_MAX: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("S3 support not compiled in; enable the `s3` feature or pick another store type")]
    S3Disabled,
}

/// Which `ObjectStore` backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Memory,
    #[serde(alias = "local")]
    LocalFs,
    #[default]
    S3,
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "localfs" | "local" => Ok(StoreType::LocalFs),
            "s3" | "minio" => Ok(StoreType::S3),
            other => Err(format!("unknown store type '{}'", other)),
        }
    }
}

/// Connection settings for an S3-compatible service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Custom endpoint (MinIO); `None` means AWS
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            endpoint: Some("localhost:9000".to_string()),
            region: "us-east-1".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
        }
    }
}

impl S3Config {
    /// Endpoint as a URL. A bare `host:port` gets `http://`.
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.endpoint.as_deref()?.trim();
        if endpoint.is_empty() {
            return None;
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Some(endpoint.to_string())
        } else {
            Some(format!("http://{}", endpoint))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    pub store_type: StoreType,
    /// Base directory for `localfs`
    pub local_path: PathBuf,
    pub s3: S3Config,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            store_type: StoreType::default(),
            local_path: PathBuf::from("./store"),
            s3: S3Config::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BronzeConfig {
    pub store: StoreConfig,
    /// Root of the local mirror; files land in `<data_root>/bronze/`
    pub data_root: PathBuf,
    pub datasets: Vec<String>,
    /// Merge datasets concurrently instead of one after another
    pub concurrent: bool,
    /// Per-dataset deadline in seconds
    pub deadline_secs: Option<u64>,
    pub log: LogConfig,
}

impl Default for BronzeConfig {
    fn default() -> Self {
        BronzeConfig {
            store: StoreConfig::default(),
            data_root: PathBuf::from("./data"),
            datasets: DEFAULT_DATASETS.iter().map(|s| s.to_string()).collect(),
            concurrent: false,
            deadline_secs: None,
            log: LogConfig::default(),
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(invalid(var, value, "expected true or false")),
    }
}

fn parse_datasets(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl BronzeConfig {
    /// Defaults, then `BRONZE_CONFIG` if set, then the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Load a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the environment, in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRONZE_STORE_TYPE") {
            self.store.store_type = v
                .parse()
                .map_err(|reason: String| invalid("BRONZE_STORE_TYPE", &v, reason))?;
        }
        if let Some(v) = lookup("BRONZE_STORE_PATH") {
            self.store.local_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MINIO_ENDPOINT") {
            self.store.s3.endpoint = Some(v).filter(|e| !e.trim().is_empty());
        }
        if let Some(v) = lookup("MINIO_ACCESS_KEY") {
            self.store.s3.access_key_id = v;
        }
        if let Some(v) = lookup("MINIO_SECRET_KEY") {
            self.store.s3.secret_access_key = v;
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.store.s3.region = v;
        }
        if let Some(v) = lookup("BRONZE_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("BRONZE_DATASETS") {
            self.datasets = parse_datasets(&v);
        }
        if let Some(v) = lookup("BRONZE_CONCURRENT") {
            self.concurrent = parse_bool("BRONZE_CONCURRENT", &v)?;
        }
        if let Some(v) = lookup("BRONZE_DEADLINE_SECS") {
            let secs = v
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid("BRONZE_DEADLINE_SECS", &v, e.to_string()))?;
            self.deadline_secs = Some(secs);
        }
        if let Some(v) = lookup("BRONZE_LOG_FORMAT") {
            self.log.format = v
                .parse::<LogFormat>()
                .map_err(|reason| invalid("BRONZE_LOG_FORMAT", &v, reason))?;
        }
        if let Some(v) = lookup("RUST_LOG") {
            if !v.trim().is_empty() {
                self.log.filter = v;
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.datasets.is_empty() {
            return Err(invalid("datasets", "", "at least one dataset is required"));
        }
        if let Some(name) = self.datasets.iter().find(|n| n.contains('/')) {
            return Err(invalid("datasets", name, "dataset names cannot contain '/'"));
        }
        if let Some(secs) = self.deadline_secs {
            if secs == 0 || secs > DEADLINE_SECS_MAX {
                return Err(invalid(
                    "deadline_secs",
                    &secs.to_string(),
                    format!("must be between 1 and {}", DEADLINE_SECS_MAX),
                ));
            }
        }
        Ok(())
    }

    /// One `DatasetConfig` per configured name, in order
    pub fn dataset_configs(&self) -> Vec<DatasetConfig> {
        DatasetConfig::for_names(self.datasets.iter(), &self.data_root)
    }

    /// Batch options sharing `cancel`; each dataset gets its own deadline
    pub fn batch_options(&self, cancel: CancellationToken) -> BatchOptions {
        BatchOptions {
            cancel,
            timeout: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Build the configured backend
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, ConfigError> {
    match config.store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryObjectStore::new())),
        StoreType::LocalFs => Ok(Arc::new(LocalFsObjectStore::new(config.local_path.clone()))),
        #[cfg(feature = "s3")]
        StoreType::S3 => Ok(Arc::new(crate::store::S3ObjectStore::new(config.s3.clone()))),
        #[cfg(not(feature = "s3"))]
        StoreType::S3 => Err(ConfigError::S3Disabled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BronzeConfig::default();
        assert_eq!(config.store.store_type, StoreType::S3);
        assert_eq!(config.datasets, vec!["events", "users", "activities"]);
        assert_eq!(config.data_root, PathBuf::from("./data"));
        assert!(!config.concurrent);
        assert_eq!(config.deadline_secs, None);
        assert_eq!(
            config.store.s3.endpoint_url().as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BronzeConfig::default();
        config
            .apply_overrides(lookup(&[
                ("BRONZE_STORE_TYPE", "localfs"),
                ("BRONZE_STORE_PATH", "/tmp/objects"),
                ("MINIO_ENDPOINT", "https://minio.internal:9000"),
                ("MINIO_ACCESS_KEY", "ak"),
                ("BRONZE_DATASETS", " events , ,clicks "),
                ("BRONZE_CONCURRENT", "1"),
                ("BRONZE_DEADLINE_SECS", "30"),
                ("BRONZE_LOG_FORMAT", "json"),
                ("RUST_LOG", "debug"),
            ]))
            .unwrap();

        assert_eq!(config.store.store_type, StoreType::LocalFs);
        assert_eq!(config.store.local_path, PathBuf::from("/tmp/objects"));
        assert_eq!(
            config.store.s3.endpoint_url().as_deref(),
            Some("https://minio.internal:9000")
        );
        assert_eq!(config.store.s3.access_key_id, "ak");
        assert_eq!(config.store.s3.secret_access_key, "minioadmin");
        assert_eq!(config.datasets, vec!["events", "clicks"]);
        assert!(config.concurrent);
        assert_eq!(config.deadline_secs, Some(30));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter, "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("BRONZE_STORE_TYPE", "ftp"),
            ("BRONZE_CONCURRENT", "maybe"),
            ("BRONZE_DEADLINE_SECS", "soon"),
            ("BRONZE_DEADLINE_SECS", "0"),
            ("BRONZE_DATASETS", " , "),
            ("BRONZE_DATASETS", "events/2024"),
        ];
        for (var, value) in cases {
            let mut config = BronzeConfig::default();
            let result = config.apply_overrides(lookup(&[(var, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "{}={} should be rejected",
                var,
                value
            );
        }
    }

    #[test]
    fn test_toml_file_with_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bronze.toml");
        std::fs::write(
            &path,
            r#"
data_root = "/srv/data"
datasets = ["events"]

[store]
type = "memory"

[log]
format = "json"
"#,
        )
        .unwrap();

        let config = BronzeConfig::from_file(&path).unwrap();
        assert_eq!(config.store.store_type, StoreType::Memory);
        assert_eq!(config.data_root, PathBuf::from("/srv/data"));
        assert_eq!(config.datasets, vec!["events"]);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.store.s3, S3Config::default());
    }

    #[test]
    fn test_unreadable_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            BronzeConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "datasets = [").unwrap();
        assert!(matches!(
            BronzeConfig::from_file(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_dataset_configs_follow_data_root() {
        let config = BronzeConfig {
            data_root: PathBuf::from("/srv/data"),
            datasets: vec!["users".to_string()],
            ..BronzeConfig::default()
        };
        let datasets = config.dataset_configs();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].source_bucket, "raw-users");
        assert_eq!(
            datasets[0].local_path,
            PathBuf::from("/srv/data/bronze/users.json")
        );
    }

    #[test]
    fn test_batch_options_deadline() {
        let config = BronzeConfig {
            deadline_secs: Some(5),
            ..BronzeConfig::default()
        };
        let batch = config.batch_options(CancellationToken::new());
        assert_eq!(batch.timeout, Some(Duration::from_secs(5)));
        assert!(batch.for_run().deadline.is_some());
        assert!(BronzeConfig::default()
            .batch_options(CancellationToken::new())
            .for_run()
            .deadline
            .is_none());
    }

    #[test]
    fn test_endpoint_url_empty_is_none() {
        let config = S3Config {
            endpoint: Some("  ".to_string()),
            ..S3Config::default()
        };
        assert_eq!(config.endpoint_url(), None);
    }

    #[tokio::test]
    async fn test_build_memory_and_localfs_stores() {
        let memory = build_store(&StoreConfig {
            store_type: StoreType::Memory,
            ..StoreConfig::default()
        })
        .unwrap();
        assert!(!memory.bucket_exists("bronze").await.unwrap());

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bronze")).unwrap();
        let localfs = build_store(&StoreConfig {
            store_type: StoreType::LocalFs,
            local_path: dir.path().to_path_buf(),
            ..StoreConfig::default()
        })
        .unwrap();
        assert!(localfs.bucket_exists("bronze").await.unwrap());
    }
}
