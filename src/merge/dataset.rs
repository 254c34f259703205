//! Dataset registration: where each dataset is read from and written to.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Datasets merged by default
pub const DEFAULT_DATASETS: [&str; 3] = ["events", "users", "activities"];

/// Destination bucket shared by every dataset
pub const BRONZE_BUCKET: &str = "bronze";

/// Prefix of per-dataset source buckets
pub const RAW_BUCKET_PREFIX: &str = "raw-";

/// Source and destinations of one dataset merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name, used in logs and reports
    pub name: String,
    /// Bucket holding the small source objects
    pub source_bucket: String,
    /// Bucket receiving the merged object
    pub dest_bucket: String,
    /// Key of the merged object in `dest_bucket`
    pub dest_key: String,
    /// Local mirror of the merged object
    pub local_path: PathBuf,
}

impl DatasetConfig {
    /// Conventional layout: `raw-<name>` → `bronze/<name>.json` and
    /// `<data_root>/bronze/<name>.json`
    pub fn for_dataset(name: &str, data_root: &Path) -> Self {
        DatasetConfig {
            name: name.to_string(),
            source_bucket: format!("{}{}", RAW_BUCKET_PREFIX, name),
            dest_bucket: BRONZE_BUCKET.to_string(),
            dest_key: format!("{}.json", name),
            local_path: data_root.join(BRONZE_BUCKET).join(format!("{}.json", name)),
        }
    }

    /// The events/users/activities registration table
    pub fn defaults(data_root: &Path) -> Vec<Self> {
        Self::for_names(DEFAULT_DATASETS, data_root)
    }

    pub fn for_names<I, N>(names: I, data_root: &Path) -> Vec<Self>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| Self::for_dataset(name.as_ref(), data_root))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_layout() {
        let config = DatasetConfig::for_dataset("events", Path::new("/srv/data"));
        assert_eq!(config.source_bucket, "raw-events");
        assert_eq!(config.dest_bucket, "bronze");
        assert_eq!(config.dest_key, "events.json");
        assert_eq!(config.local_path, PathBuf::from("/srv/data/bronze/events.json"));
    }

    #[test]
    fn test_defaults_order() {
        let names: Vec<_> = DatasetConfig::defaults(Path::new("data"))
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["events", "users", "activities"]);
    }
}
