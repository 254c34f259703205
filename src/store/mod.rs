//! Object Store Access
//!
//! The bucket-aware `ObjectStore` trait and its backends. The merge
//! engine receives an already-constructed store; nothing in here reads
//! the environment.
//!
//! ```text
//! InMemoryObjectStore ─┐
//! LocalFsObjectStore  ─┼─> dyn ObjectStore ─> merge::merge_dataset
//! S3ObjectStore       ─┤
//! SimulatedObjectStore┘ (wraps any of the above)
//! ```

pub mod object_store;
#[cfg(feature = "s3")]
pub mod s3_store;
pub mod simulated_store;

pub use object_store::{
    is_staging_file, staging_path, InMemoryObjectStore, ListResult, LocalFsObjectStore,
    ObjectBody, ObjectMeta, ObjectStore, ObjectStoreError, ReadLease, StoreResult,
    DEFAULT_LIST_PAGE_SIZE,
};
#[cfg(feature = "s3")]
pub use s3_store::S3ObjectStore;
pub use simulated_store::{SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats};
