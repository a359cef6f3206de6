use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Identifier of a maintenance task.
///
/// Used as a key in the persisted run history, so identifiers must never be
/// renamed. The set is open: unknown identifiers found in a persisted schedule
/// are preserved as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(Cow<'static, str>);

impl TaskType {
    pub const SNAPSHOT_GC: TaskType = TaskType::from_static("snapshot-gc");
    pub const DELETE_ORPHANED_BLOBS_QUICK: TaskType = TaskType::from_static("quick-delete-blobs");
    pub const DELETE_ORPHANED_BLOBS_FULL: TaskType = TaskType::from_static("full-delete-blobs");
    pub const REWRITE_CONTENTS_QUICK: TaskType = TaskType::from_static("quick-rewrite-contents");
    pub const REWRITE_CONTENTS_FULL: TaskType = TaskType::from_static("full-rewrite-contents");
    pub const DROP_DELETED_CONTENTS_FULL: TaskType =
        TaskType::from_static("full-drop-deleted-content");
    pub const INDEX_COMPACTION: TaskType = TaskType::from_static("index-compaction");
    pub const CLEANUP_LOGS: TaskType = TaskType::from_static("cleanup-logs");
    pub const CLEANUP_EPOCH_MANAGER: TaskType = TaskType::from_static("cleanup-epoch-manager");

    pub const fn from_static(id: &'static str) -> Self {
        TaskType(Cow::Borrowed(id))
    }

    pub fn new(id: impl Into<String>) -> Self {
        TaskType(Cow::Owned(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
