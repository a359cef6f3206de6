//! Collaborators that maintenance drives but does not implement.
//!
//! The repository owns the content index, the pack files and the logs. The
//! maintenance core only decides *when* each task may run and records the
//! outcome; the actual work happens behind these traits.

use crate::blob::BlobStore;
use crate::maintenance::{LogRetentionOptions, MaintenanceContext, SafetyParameters};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Span;

/// Prefix of packs holding metadata contents, handled by quick maintenance.
pub const PACK_BLOB_ID_PREFIX_SPECIAL: &str = "q";

/// Which content IDs a rewrite considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentIdRange {
    AllIds,
    /// Only IDs carrying a prefix, i.e. metadata contents.
    AllPrefixedIds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContentsOptions {
    pub content_id_range: ContentIdRange,
    pub pack_prefix: Option<String>,
    /// Only rewrite contents living in packs below the target pack size.
    pub short_packs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteUnreferencedBlobsOptions {
    /// Blobs written after this time are never deleted.
    pub not_after_time: DateTime<Utc>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactIndexesOptions {
    pub max_small_blobs: usize,
}

impl Default for CompactIndexesOptions {
    fn default() -> Self {
        Self { max_small_blobs: 8 }
    }
}

/// The task bodies run by maintenance cycles.
pub trait MaintenanceTasks: Send + Sync {
    fn rewrite_contents(
        &self,
        ctx: &MaintenanceContext,
        opts: &RewriteContentsOptions,
        safety: &SafetyParameters,
    ) -> Result<()>;

    /// Returns the number of blobs deleted.
    fn delete_unreferenced_blobs(
        &self,
        ctx: &MaintenanceContext,
        opts: &DeleteUnreferencedBlobsOptions,
        safety: &SafetyParameters,
    ) -> Result<usize>;

    /// Drops index entries of contents deleted before `safe_drop_time`.
    fn drop_deleted_contents(
        &self,
        ctx: &MaintenanceContext,
        safe_drop_time: DateTime<Utc>,
        safety: &SafetyParameters,
    ) -> Result<()>;

    fn compact_indexes(
        &self,
        ctx: &MaintenanceContext,
        opts: &CompactIndexesOptions,
        safety: &SafetyParameters,
    ) -> Result<()>;

    /// Returns the IDs of the deleted log blobs.
    fn cleanup_logs(
        &self,
        ctx: &MaintenanceContext,
        retention: &LogRetentionOptions,
    ) -> Result<Vec<String>>;
}

/// Index lifecycle manager that replaces the legacy rewrite/delete path.
pub trait EpochManager: Send + Sync {
    fn cleanup_superseded_indexes(&self, ctx: &MaintenanceContext) -> Result<()>;
}

/// Whether the repository uses an epoch manager.
pub enum EpochManagerState {
    Disabled,
    Enabled(Arc<dyn EpochManager>),
    /// The repository could not tell. Never treated as disabled.
    QueryError(anyhow::Error),
}

impl std::fmt::Debug for EpochManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpochManagerState::Disabled => write!(f, "Disabled"),
            EpochManagerState::Enabled(_) => write!(f, "Enabled"),
            EpochManagerState::QueryError(err) => write!(f, "QueryError({:#})", err),
        }
    }
}

/// A repository opened with direct access to its blob storage.
pub trait DirectRepository: Send + Sync {
    /// Identity of the caller, `user@host`.
    fn username_at_host(&self) -> String;

    /// Current repository time.
    fn time(&self) -> DateTime<Utc>;

    /// Reloads indexes from storage.
    fn refresh(&self, ctx: &MaintenanceContext) -> Result<()>;

    /// Stops background index refreshes for the lifetime of this handle.
    fn disable_index_refresh(&self);

    /// Path of the repository config file on this machine.
    fn config_filename(&self) -> PathBuf;

    fn blob_store(&self) -> &dyn BlobStore;

    fn epoch_manager(&self) -> EpochManagerState;

    fn tasks(&self) -> &dyn MaintenanceTasks;

    /// Span whose subscriber persists records into the repository's content
    /// log. Maintenance runs are recorded under it.
    fn content_log_span(&self) -> Span {
        Span::none()
    }
}
