//! Source listing: which objects in a bucket take part in a merge.

use crate::merge::error::MergeError;
use crate::store::{ObjectStore, ObjectStoreError};
use serde::Serialize;
use tracing::debug;

/// Key suffix an object needs to be merged
pub const ELIGIBLE_SUFFIX: &str = ".json";

// Explicit limit on continuation pages for one listing
const LIST_PAGES_MAX: usize = 1_000_000;

/// An eligible source object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceObjectRef {
    pub bucket: String,
    pub key: String,
    /// Declared size from store metadata
    pub size: u64,
}

/// Outcome of listing one bucket
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Eligible objects in key order
    pub eligible: Vec<SourceObjectRef>,
    /// Objects seen but skipped for their suffix
    pub skipped: usize,
}

pub fn is_eligible(key: &str) -> bool {
    key.ends_with(ELIGIBLE_SUFFIX)
}

/// List every eligible object in `bucket`, across all key prefixes.
///
/// Follows continuation tokens until the listing is exhausted, then sorts
/// by key so every backend yields the same order.
pub async fn list_sources<S: ObjectStore + ?Sized>(
    store: &S,
    bucket: &str,
) -> Result<Listing, MergeError> {
    let mut listing = Listing::default();
    let mut token: Option<String> = None;

    for _ in 0..LIST_PAGES_MAX {
        let page = store
            .list(bucket, "", token.as_deref())
            .await
            .map_err(|e| match e {
                ObjectStoreError::BucketNotFound(_) => MergeError::BucketNotFound {
                    bucket: bucket.to_string(),
                },
                other => MergeError::List {
                    bucket: bucket.to_string(),
                    source: other,
                },
            })?;

        for meta in page.objects {
            if is_eligible(&meta.key) {
                listing.eligible.push(SourceObjectRef {
                    bucket: bucket.to_string(),
                    key: meta.key,
                    size: meta.size_bytes,
                });
            } else {
                debug!(bucket, key = %meta.key, "skipping ineligible object");
                listing.skipped += 1;
            }
        }

        match page.continuation_token {
            Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
            Some(_) => {
                return Err(MergeError::List {
                    bucket: bucket.to_string(),
                    source: ObjectStoreError::Backend(
                        "continuation token did not advance".to_string(),
                    ),
                })
            }
            None => {
                listing.eligible.sort_by(|a, b| a.key.cmp(&b.key));
                return Ok(listing);
            }
        }
    }

    Err(MergeError::List {
        bucket: bucket.to_string(),
        source: ObjectStoreError::Backend(format!("listing exceeded {} pages", LIST_PAGES_MAX)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;
    use bytes::Bytes;

    #[test]
    fn test_eligibility_is_literal_suffix() {
        assert!(is_eligible("a.json"));
        assert!(is_eligible("2024/01/a.json"));
        assert!(!is_eligible("a.jsonl"));
        assert!(!is_eligible("a.JSON"));
        assert!(!is_eligible("a.json.gz"));
        assert!(!is_eligible("json"));
    }

    #[tokio::test]
    async fn test_lists_recursively_in_key_order() {
        let store = InMemoryObjectStore::new().with_page_size(2);
        store.create_bucket("raw-events");
        for (key, body) in [
            ("b.json", "{}"),
            ("2024/01/a.json", "{\"a\":1}"),
            ("readme.txt", "ignore me"),
            ("2024/02/c.json", "{}"),
            ("_SUCCESS", ""),
        ] {
            store
                .put("raw-events", key, Bytes::from_static(body.as_bytes()))
                .await
                .unwrap();
        }

        let listing = list_sources(&store, "raw-events").await.unwrap();
        let keys: Vec<_> = listing.eligible.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["2024/01/a.json", "2024/02/c.json", "b.json"]);
        assert_eq!(listing.skipped, 2);
        assert_eq!(listing.eligible[0].size, 7);
    }

    #[tokio::test]
    async fn test_empty_bucket_is_not_an_error() {
        let store = InMemoryObjectStore::new();
        store.create_bucket("raw-users");

        let listing = list_sources(&store, "raw-users").await.unwrap();
        assert!(listing.eligible.is_empty());
        assert_eq!(listing.skipped, 0);
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = InMemoryObjectStore::new();

        let err = list_sources(&store, "raw-missing").await.unwrap_err();
        assert!(matches!(err, MergeError::BucketNotFound { bucket } if bucket == "raw-missing"));
    }
}
