//! Blob storage collaborator.
//!
//! Maintenance keeps its schedule and parameters as small blobs at well-known
//! IDs. The store, not the client, stamps every write with a timestamp; that
//! timestamp is the repository's notion of "now".

mod schema;
mod sqlite_blob_store;

pub use schema::BLOB_STORE_VERSIONED_SCHEMAS;
pub use sqlite_blob_store::SqliteBlobStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Metadata recorded by the store for a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub blob_id: String,
    pub length: u64,
    /// Time at which the store accepted the latest write of this blob.
    pub timestamp: DateTime<Utc>,
}

pub trait BlobStore: Send + Sync {
    /// Returns the blob contents, or `None` if no such blob exists.
    fn get_blob(&self, blob_id: &str) -> Result<Option<Vec<u8>>>;

    /// Writes (or replaces) a blob.
    fn put_blob(&self, blob_id: &str, data: &[u8]) -> Result<()>;

    /// Fails if the blob does not exist.
    fn get_metadata(&self, blob_id: &str) -> Result<BlobMetadata>;
}
