//! S3 Object Store Implementation
//!
//! S3-compatible store (MinIO, AWS S3, LocalStack) built on the
//! `object_store` crate from the Arrow ecosystem. `object_store` clients
//! are bound to a single bucket, so one client is built per bucket on
//! first use and cached.

use crate::config::S3Config;
use crate::store::object_store::{
    ListResult, ObjectBody, ObjectMeta, ObjectStore, ObjectStoreError, StoreResult,
    DEFAULT_LIST_PAGE_SIZE,
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as ObjectStoreTrait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// S3 object store spanning any number of buckets
pub struct S3ObjectStore {
    config: S3Config,
    clients: RwLock<HashMap<String, Arc<dyn ObjectStoreTrait>>>,
}

impl S3ObjectStore {
    /// Create a new S3 object store. Bucket clients are built lazily.
    pub fn new(config: S3Config) -> Self {
        S3ObjectStore {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a pre-built client for a bucket (for testing)
    pub fn with_client(self, bucket: &str, client: Arc<dyn ObjectStoreTrait>) -> Self {
        self.clients.write().insert(bucket.to_string(), client);
        self
    }

    fn client(&self, bucket: &str) -> StoreResult<Arc<dyn ObjectStoreTrait>> {
        if let Some(client) = self.clients.read().get(bucket) {
            return Ok(Arc::clone(client));
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_access_key_id(&self.config.access_key_id)
            .with_secret_access_key(&self.config.secret_access_key);

        // Custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = self.config.endpoint_url() {
            builder = builder
                .with_allow_http(endpoint.starts_with("http://"))
                .with_endpoint(endpoint);
        }

        let client: Arc<dyn ObjectStoreTrait> = Arc::new(builder.build().map_err(|e| {
            ObjectStoreError::Backend(format!("failed to create S3 client for {}: {}", bucket, e))
        })?);

        self.clients
            .write()
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::clone(&client));
        Ok(client)
    }

    /// Convert object_store errors, keeping bucket/key context
    fn map_error(bucket: &str, key: &str, err: object_store::Error) -> ObjectStoreError {
        let message = err.to_string();
        if message.contains("NoSuchBucket") {
            return ObjectStoreError::BucketNotFound(bucket.to_string());
        }
        match err {
            object_store::Error::NotFound { .. } => ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ if message.contains("AccessDenied") || message.contains("Forbidden") => {
                ObjectStoreError::PermissionDenied(message)
            }
            _ => ObjectStoreError::Backend(message),
        }
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("endpoint", &self.config.endpoint)
            .field("region", &self.config.region)
            .finish()
    }
}

fn to_meta(meta: object_store::ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        key: meta.location.to_string(),
        size_bytes: meta.size as u64,
        last_modified_ms: meta.last_modified.timestamp_millis().try_into().unwrap_or(0),
        etag: meta.e_tag,
    }
}

impl ObjectStore for S3ObjectStore {
    fn list<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client(bucket)?;
            let prefix_path = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));

            // The token is the last key of the previous page
            let listing = match continuation_token {
                Some(offset) => {
                    client.list_with_offset(prefix_path.as_ref(), &ObjectPath::from(offset))
                }
                None => client.list(prefix_path.as_ref()),
            };

            let mut objects: Vec<ObjectMeta> = listing
                .take(DEFAULT_LIST_PAGE_SIZE + 1)
                .map_ok(to_meta)
                .try_collect()
                .await
                .map_err(|e| Self::map_error(bucket, prefix, e))?;

            objects.sort_by(|a, b| a.key.cmp(&b.key));
            let continuation_token = if objects.len() > DEFAULT_LIST_PAGE_SIZE {
                objects.truncate(DEFAULT_LIST_PAGE_SIZE);
                objects.last().map(|m| m.key.clone())
            } else {
                None
            };

            Ok(ListResult {
                objects,
                continuation_token,
            })
        })
    }

    fn open<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ObjectBody>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client(bucket)?;
            let result = client
                .get(&ObjectPath::from(key))
                .await
                .map_err(|e| Self::map_error(bucket, key, e))?;

            let (owned_bucket, owned_key) = (bucket.to_string(), key.to_string());
            let stream = result
                .into_stream()
                .map_err(move |e| Self::map_error(&owned_bucket, &owned_key, e))
                .boxed();
            Ok(ObjectBody::new(bucket, key, stream))
        })
    }

    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client(bucket)?;
            client
                .put(&ObjectPath::from(key), data.into())
                .await
                .map_err(|e| Self::map_error(bucket, key, e))?;
            Ok(())
        })
    }

    fn bucket_exists<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client(bucket)?;
            let first = client.list(None).next().await;
            match first {
                None | Some(Ok(_)) => Ok(true),
                Some(Err(e)) => match Self::map_error(bucket, "", e) {
                    ObjectStoreError::BucketNotFound(_) => Ok(false),
                    other => Err(other),
                },
            }
        })
    }
}
