//! SQLite schema for the local blob store.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Blobs
// =============================================================================

const BLOBS_TABLE_V1: Table = Table {
    name: "blobs",
    columns: &[
        sqlite_column!("blob_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("data", &SqlType::Blob, non_null = true),
        sqlite_column!("length", &SqlType::Integer, non_null = true),
        sqlite_column!("timestamp", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const BLOB_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[BLOBS_TABLE_V1],
    migration: None,
}];
