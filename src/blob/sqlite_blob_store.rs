use super::schema::BLOB_STORE_VERSIONED_SCHEMAS;
use super::{BlobMetadata, BlobStore};
use crate::clock::{Clock, SystemClock};
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Blob store backed by a single SQLite file.
///
/// Write timestamps come from the store's own clock, so every client that
/// shares the file observes the same time for the same write.
pub struct SqliteBlobStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteBlobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_clock(db_path, Arc::new(SystemClock))
    }

    pub fn with_clock<P: AsRef<Path>>(db_path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open blob store database")?;
        if is_new_db {
            info!("Creating new blob store at {:?}", path);
        }
        open_versioned(&mut conn, BLOB_STORE_VERSIONED_SCHEMAS, is_new_db)
            .with_context(|| format!("Blob store schema check failed for {:?}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn row_to_metadata(row: &rusqlite::Row) -> rusqlite::Result<(String, i64, String)> {
        Ok((row.get("blob_id")?, row.get("length")?, row.get("timestamp")?))
    }
}

impl BlobStore for SqliteBlobStore {
    fn get_blob(&self, blob_id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM blobs WHERE blob_id = ?1")?;

        let data: Option<Vec<u8>> = stmt
            .query_row(params![blob_id], |row| row.get(0))
            .optional()?;

        Ok(data)
    }

    fn put_blob(&self, blob_id: &str, data: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&self.clock.now());

        conn.execute(
            "INSERT INTO blobs (blob_id, data, length, timestamp)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(blob_id) DO UPDATE SET data = ?2, length = ?3, timestamp = ?4",
            params![blob_id, data, data.len() as i64, now],
        )?;

        Ok(())
    }

    fn get_metadata(&self, blob_id: &str) -> Result<BlobMetadata> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT blob_id, length, timestamp FROM blobs WHERE blob_id = ?1")?;

        let (blob_id, length, timestamp) = stmt
            .query_row(params![blob_id], Self::row_to_metadata)
            .optional()?
            .ok_or_else(|| anyhow!("blob {} not found", blob_id))?;

        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .with_context(|| format!("invalid timestamp on blob {}", blob_id))?
            .with_timezone(&Utc);

        Ok(BlobMetadata {
            blob_id,
            length: length as u64,
            timestamp,
        })
    }
}
