//! Object Store Abstraction
//!
//! Bucket-aware facade over object storage. The merge engine only ever
//! talks to this trait, so the backing store can be swapped for tests.
//!
//! Implementations:
//! - `InMemoryObjectStore`: For unit tests and fault-injection runs
//! - `LocalFsObjectStore`: For development (one directory per bucket)
//! - `S3ObjectStore`: For MinIO / S3 (feature-gated)

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io::ErrorKind;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Default number of objects returned per list page
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key (path within the bucket)
    pub key: String,
    /// Declared size in bytes
    pub size_bytes: u64,
    /// Last modification timestamp (Unix ms)
    pub last_modified_ms: u64,
    /// ETag or content hash (optional)
    pub etag: Option<String>,
}

/// Result of a list operation
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Objects matching the prefix, in key order
    pub objects: Vec<ObjectMeta>,
    /// Continuation token for pagination (if more results exist)
    pub continuation_token: Option<String>,
}

/// Error type for object store operations
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// Bucket does not exist or is not accessible
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    /// Object not found
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Error reported by the storage backend
    #[error("Object store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, ObjectStoreError>;

/// Decrements a shared counter when dropped.
///
/// Stores hand one of these to every `ObjectBody` they open so that tests
/// can assert every read was released.
#[derive(Debug)]
pub struct ReadLease {
    open: Arc<AtomicUsize>,
}

impl ReadLease {
    pub fn acquire(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        ReadLease {
            open: Arc::clone(open),
        }
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scoped read of one object's body.
///
/// Owns the response stream. Dropping the body, whether after a full read,
/// an error or a cancellation, releases the underlying connection.
pub struct ObjectBody {
    bucket: String,
    key: String,
    stream: BoxStream<'static, StoreResult<Bytes>>,
    _lease: Option<ReadLease>,
}

impl ObjectBody {
    /// Wrap a chunk stream returned by a backend
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        stream: BoxStream<'static, StoreResult<Bytes>>,
    ) -> Self {
        ObjectBody {
            bucket: bucket.into(),
            key: key.into(),
            stream,
            _lease: None,
        }
    }

    /// Body backed by bytes already in memory
    pub fn from_bytes(bucket: impl Into<String>, key: impl Into<String>, data: Bytes) -> Self {
        Self::new(bucket, key, stream::iter(vec![Ok(data)]).boxed())
    }

    /// Attach a lease that is released when the body is dropped
    pub fn with_lease(mut self, lease: ReadLease) -> Self {
        self._lease = Some(lease);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Drain the stream into one contiguous buffer, consuming the body
    pub async fn read_to_end(mut self) -> StoreResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish()
    }
}

/// Object store abstraction trait
///
/// Methods return boxed futures so the trait stays object safe and the
/// driver can hold an `Arc<dyn ObjectStore>`.
pub trait ObjectStore: Send + Sync + 'static {
    /// List one page of objects under `prefix` (recursive).
    ///
    /// Fails with `BucketNotFound` when the bucket does not exist.
    fn list<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ListResult>> + Send + 'a>>;

    /// Open a scoped read of an object's body
    fn open<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ObjectBody>> + Send + 'a>>;

    /// Put an object (create or overwrite)
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>>;

    /// Check whether a bucket exists and is accessible
    fn bucket_exists<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>>;
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// InMemoryObjectStore - For tests
// ============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified_ms: u64,
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

/// In-memory object store for unit tests and simulation runs.
///
/// Buckets must be created before objects are put into them, as on S3.
/// Clones share the same underlying buckets.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    buckets: Arc<RwLock<Buckets>>,
    page_size: usize,
    open_bodies: Arc<AtomicUsize>,
    put_log: Arc<Mutex<Vec<(String, String)>>>,
}

impl InMemoryObjectStore {
    /// Create a new in-memory object store
    pub fn new() -> Self {
        InMemoryObjectStore {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            page_size: DEFAULT_LIST_PAGE_SIZE,
            open_bodies: Arc::new(AtomicUsize::new(0)),
            put_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a smaller list page size (exercises pagination in tests)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        self.page_size = page_size;
        self
    }

    /// Create a bucket; a no-op if it already exists
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    /// Current content of an object (for testing)
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.data.clone())
    }

    /// Number of objects in a bucket (for testing)
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, BTreeMap::len)
    }

    /// Number of bodies opened and not yet dropped
    pub fn open_body_count(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }

    /// Every successful put, in completion order, as `(bucket, key)`
    pub fn put_log(&self) -> Vec<(String, String)> {
        self.put_log.lock().clone()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn list<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let buckets = self.buckets.read();
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| ObjectStoreError::BucketNotFound(bucket.to_string()))?;

            // The token is the last key of the previous page (S3 StartAfter)
            let lower = match continuation_token {
                Some(token) => Bound::Excluded(token.to_string()),
                None => Bound::Unbounded,
            };

            let mut page: Vec<ObjectMeta> = objects
                .range::<String, _>((lower, Bound::Unbounded))
                .filter(|(k, _)| k.starts_with(prefix))
                .take(self.page_size + 1)
                .map(|(k, v)| ObjectMeta {
                    key: k.clone(),
                    size_bytes: v.data.len() as u64,
                    last_modified_ms: v.last_modified_ms,
                    etag: None,
                })
                .collect();

            let continuation_token = if page.len() > self.page_size {
                page.truncate(self.page_size);
                page.last().map(|m| m.key.clone())
            } else {
                None
            };

            Ok(ListResult {
                objects: page,
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
            let data = {
                let buckets = self.buckets.read();
                let objects = buckets
                    .get(bucket)
                    .ok_or_else(|| ObjectStoreError::BucketNotFound(bucket.to_string()))?;
                objects
                    .get(key)
                    .map(|obj| obj.data.clone())
                    .ok_or_else(|| ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })?
            };
            Ok(ObjectBody::from_bytes(bucket, key, data)
                .with_lease(ReadLease::acquire(&self.open_bodies)))
        })
    }

    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut buckets = self.buckets.write();
            let objects = buckets
                .get_mut(bucket)
                .ok_or_else(|| ObjectStoreError::BucketNotFound(bucket.to_string()))?;
            objects.insert(
                key.to_string(),
                StoredObject {
                    data,
                    last_modified_ms: now_ms(),
                },
            );
            self.put_log
                .lock()
                .push((bucket.to_string(), key.to_string()));
            Ok(())
        })
    }

    fn bucket_exists<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.buckets.read().contains_key(bucket)) })
    }
}

// ============================================================================
// LocalFsObjectStore - For development
// ============================================================================

/// Local filesystem object store: `<base>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_path: PathBuf,
}

impl LocalFsObjectStore {
    /// Create a new local filesystem object store
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsObjectStore { base_path }
    }

    /// Create a bucket directory
    pub fn create_bucket(&self, bucket: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(self.bucket_path(bucket))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn require_bucket(&self, bucket: &str) -> StoreResult<PathBuf> {
        let path = self.bucket_path(bucket);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(ObjectStoreError::BucketNotFound(bucket.to_string()))
        }
    }
}

/// Sibling temp path for an atomic write of `path`: `.<file>.<rand>.tmp`.
/// Unique per call so concurrent writers never share one.
pub fn staging_path(path: &Path) -> std::io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("path has no file name: {}", path.display()),
        )
    })?;
    let staged = format!(
        ".{}.{:016x}.tmp",
        file_name.to_string_lossy(),
        rand::random::<u64>()
    );
    Ok(path.with_file_name(staged))
}

/// True for names produced by `staging_path`
pub fn is_staging_file(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(".tmp")
}

/// Recursively collect files under `dir`, keyed relative to `root` with `/`
fn walk_dir(
    dir: &Path,
    root: &Path,
    prefix: &str,
    objects: &mut Vec<ObjectMeta>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            walk_dir(&path, root, prefix, objects)?;
        } else if path.is_file() {
            // In-flight writes are not objects yet
            if is_staging_file(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if key.starts_with(prefix) {
                let metadata = entry.metadata()?;
                objects.push(ObjectMeta {
                    key,
                    size_bytes: metadata.len(),
                    last_modified_ms: metadata
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0),
                    etag: None,
                });
            }
        }
    }
    Ok(())
}

impl ObjectStore for LocalFsObjectStore {
    fn list<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        _continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let root = self.require_bucket(bucket)?;
            let mut objects = Vec::new();
            walk_dir(&root, &root, prefix, &mut objects)?;
            objects.sort_by(|a, b| a.key.cmp(&b.key));

            Ok(ListResult {
                objects,
                continuation_token: None,
            })
        })
    }

    fn open<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ObjectBody>> + Send + 'a>> {
        Box::pin(async move {
            let root = self.require_bucket(bucket)?;
            match tokio::fs::read(root.join(key)).await {
                Ok(data) => Ok(ObjectBody::from_bytes(bucket, key, Bytes::from(data))),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.require_bucket(bucket)?.join(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Write aside, then rename over the key: readers and racing
            // writers only ever see a complete object
            let staged = staging_path(&path)?;
            let written = match tokio::fs::write(&staged, &data).await {
                Ok(()) => tokio::fs::rename(&staged, &path).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if let Err(cleanup) = tokio::fs::remove_file(&staged).await {
                    warn!(
                        path = %staged.display(),
                        error = %cleanup,
                        "failed to remove staged object"
                    );
                }
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn bucket_exists<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.bucket_path(bucket).is_dir()) })
    }
}
