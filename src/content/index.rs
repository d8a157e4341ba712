//! Core SQLite database operations for content metadata and storage accounting.
//!
//! This module provides the foundational data layer for the content store,
//! implementing direct SQLite operations for content records and the
//! storage-accounting singleton.
//!
//! ## Database Schema
//!
//! ```sql
//! -- One row per unique payload ever ingested
//! CREATE TABLE content_metadata (
//!     id TEXT PRIMARY KEY,              -- hex SHA-256 of the payload
//!     storage_type TEXT,                -- 'filesystem' or 'content_dir'
//!     original_path TEXT,               -- caller-supplied path (references only)
//!     content_path TEXT,                -- path the bytes are read from
//!     display_name TEXT,                -- human-facing name
//!     content_type TEXT,                -- MIME-style type
//!     file_size INTEGER,                -- size at ingestion time
//!     content_hash TEXT,                -- hex SHA-256, unique in a healthy store
//!     metadata_json TEXT,               -- optional format-specific extension map
//!     created_at INTEGER                -- Unix timestamp
//! );
//!
//! -- Process-wide accounting singleton
//! CREATE TABLE storage_stats (
//!     id INTEGER PRIMARY KEY CHECK(id = 1),
//!     content_dir_files INTEGER,        -- count of managed copies
//!     content_dir_size INTEGER,         -- bytes of managed copies
//!     filesystem_refs INTEGER,          -- count of filesystem references
//!     last_cleanup INTEGER,
//!     updated_at INTEGER
//! );
//! ```
//!
//! The record id is the content hash itself, so the primary key doubles as
//! the dedup constraint: a second concurrent ingestion of identical bytes
//! fails its INSERT with a unique violation instead of creating a duplicate.
//! Accounting is mutated in the same transaction as record creation/deletion
//! and is otherwise read-only.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How a record's bytes are physically stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Caller-owned file; the store never copies or deletes it
    FilesystemReference,
    /// Bytes copied into the managed content directory, fully owned here
    ManagedCopy,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilesystemReference => "filesystem",
            Self::ManagedCopy => "content_dir",
        }
    }
}

impl TryFrom<&str> for StorageKind {
    type Error = StoreError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "filesystem" => Ok(Self::FilesystemReference),
            "content_dir" => Ok(Self::ManagedCopy),
            other => Err(StoreError::validation(format!(
                "unknown storage type '{other}'"
            ))),
        }
    }
}

/// One unique payload's metadata.
///
/// `content_path` is where the bytes are actually read from: equal to
/// `original_path` for filesystem references, or a path inside the managed
/// directory for managed copies. `metadata` is an explicit extension map for
/// format-specific fields; the core logic never branches on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Stable identifier, the lowercase hex SHA-256 of the payload
    pub id: String,
    pub storage_kind: StorageKind,
    /// Caller-supplied path, present only for filesystem references
    pub original_path: Option<PathBuf>,
    /// Path the bytes are read from
    pub content_path: PathBuf,
    /// Human-facing name, independent of storage path
    pub display_name: String,
    /// MIME-style type, caller-supplied or inferred
    pub content_type: String,
    /// Size in bytes at ingestion time
    pub byte_size: u64,
    /// Lowercase hex SHA-256 of the full byte sequence
    pub content_hash: String,
    /// Optional format-specific extension map
    pub metadata: HashMap<String, String>,
    /// Ingestion time (Unix timestamp)
    pub created_at: i64,
}

/// Snapshot of the storage-accounting singleton row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    /// Count of managed copies
    pub managed_file_count: u64,
    /// Total bytes of managed copies
    pub managed_byte_total: u64,
    /// Count of filesystem references
    pub reference_count: u64,
    /// Last maintenance run (Unix timestamp)
    pub last_cleanup_at: Option<i64>,
    pub updated_at: i64,
}

/// SQLite-backed metadata index for the content store.
///
/// Provides low-level record and accounting operations; the
/// [`ContentManager`](super::manager::ContentManager) and
/// [`ContentResolver`](super::resolver::ContentResolver) are built on top.
#[derive(Clone, Debug)]
pub struct ContentIndex {
    pool: SqlitePool,
}

impl ContentIndex {
    /// Opens the index with persistent SQLite storage under `base`.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = base.join(".content-store.db");
        tokio::fs::create_dir_all(base).await?;

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Opens the index with in-memory SQLite storage for testing.
    ///
    /// Pinned to a single connection: every pooled connection to
    /// `sqlite::memory:` would otherwise get its own empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_metadata (
                id TEXT PRIMARY KEY,
                storage_type TEXT NOT NULL CHECK(storage_type IN ('filesystem','content_dir')),
                original_path TEXT,
                content_path TEXT NOT NULL,
                display_name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                metadata_json TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storage_stats (
                id INTEGER PRIMARY KEY CHECK(id = 1),
                content_dir_files INTEGER NOT NULL DEFAULT 0,
                content_dir_size INTEGER NOT NULL DEFAULT 0,
                filesystem_refs INTEGER NOT NULL DEFAULT 0,
                last_cleanup INTEGER,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_hash ON content_metadata(content_hash)",
        )
        .execute(pool)
        .await?;

        // Seed the accounting singleton
        sqlx::query(
            "INSERT OR IGNORE INTO storage_stats (id, updated_at) VALUES (1, strftime('%s','now'))",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Inserts a record and adjusts the accounting row in one transaction.
    ///
    /// Uses a plain INSERT so a concurrent ingestion of the same bytes
    /// surfaces as a unique violation for the caller to resolve as a dedup
    /// hit.
    pub async fn insert_record(&self, record: &ContentRecord) -> Result<()> {
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| StoreError::validation(format!("unencodable metadata map: {e}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO content_metadata
            (id, storage_type, original_path, content_path, display_name,
             content_type, file_size, content_hash, metadata_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&record.id)
        .bind(record.storage_kind.as_str())
        .bind(
            record
                .original_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        )
        .bind(record.content_path.to_string_lossy().to_string())
        .bind(&record.display_name)
        .bind(&record.content_type)
        .bind(record.byte_size as i64)
        .bind(&record.content_hash)
        .bind(metadata_json)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        match record.storage_kind {
            StorageKind::ManagedCopy => {
                sqlx::query(
                    "UPDATE storage_stats SET content_dir_files = content_dir_files + 1,
                     content_dir_size = content_dir_size + ?1,
                     updated_at = strftime('%s','now') WHERE id = 1",
                )
                .bind(record.byte_size as i64)
                .execute(&mut *tx)
                .await?;
            }
            StorageKind::FilesystemReference => {
                sqlx::query(
                    "UPDATE storage_stats SET filesystem_refs = filesystem_refs + 1,
                     updated_at = strftime('%s','now') WHERE id = 1",
                )
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Deletes a record and adjusts accounting in one transaction. Returns
    /// false if no record with that id existed.
    pub async fn delete_record(&self, id: &str) -> Result<bool> {
        let Some(record) = self.get_record(id).await? else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM content_metadata WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        match record.storage_kind {
            StorageKind::ManagedCopy => {
                sqlx::query(
                    "UPDATE storage_stats SET
                     content_dir_files = MAX(content_dir_files - 1, 0),
                     content_dir_size = MAX(content_dir_size - ?1, 0),
                     updated_at = strftime('%s','now') WHERE id = 1",
                )
                .bind(record.byte_size as i64)
                .execute(&mut *tx)
                .await?;
            }
            StorageKind::FilesystemReference => {
                sqlx::query(
                    "UPDATE storage_stats SET
                     filesystem_refs = MAX(filesystem_refs - 1, 0),
                     updated_at = strftime('%s','now') WHERE id = 1",
                )
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Get a record by id.
    pub async fn get_record(&self, id: &str) -> Result<Option<ContentRecord>> {
        let row = sqlx::query("SELECT * FROM content_metadata WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Get the oldest record with the given content hash.
    pub async fn get_record_by_hash(&self, content_hash: &str) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(
            "SELECT * FROM content_metadata WHERE content_hash = ?1
             ORDER BY created_at ASC, rowid ASC LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// True iff a record exists for the given id.
    pub async fn record_exists(&self, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_metadata WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// All managed-copy records, the set of paths the store owns.
    pub async fn managed_records(&self) -> Result<Vec<ContentRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM content_metadata WHERE storage_type = 'content_dir'
             ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Groups of records sharing a content hash, each group oldest-first.
    /// Empty on a healthy store.
    pub async fn duplicate_groups(&self) -> Result<Vec<Vec<ContentRecord>>> {
        let hashes: Vec<String> = sqlx::query_scalar(
            "SELECT content_hash FROM content_metadata
             GROUP BY content_hash HAVING COUNT(*) > 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut groups = Vec::new();
        for hash in hashes {
            let rows = sqlx::query(
                "SELECT * FROM content_metadata WHERE content_hash = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )
            .bind(&hash)
            .fetch_all(&self.pool)
            .await?;
            groups.push(rows.iter().map(record_from_row).collect::<Result<_>>()?);
        }
        Ok(groups)
    }

    /// Total record count across both storage kinds.
    pub async fn record_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_metadata")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Read the accounting singleton.
    pub async fn get_stats(&self) -> Result<StorageStats> {
        let row = sqlx::query("SELECT * FROM storage_stats WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(StorageStats {
            managed_file_count: row.get::<i64, _>("content_dir_files") as u64,
            managed_byte_total: row.get::<i64, _>("content_dir_size") as u64,
            reference_count: row.get::<i64, _>("filesystem_refs") as u64,
            last_cleanup_at: row.get("last_cleanup"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Overwrite the accounting row with recomputed figures (repair path).
    pub async fn replace_stats(
        &self,
        managed_file_count: u64,
        managed_byte_total: u64,
        reference_count: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE storage_stats SET content_dir_files = ?1, content_dir_size = ?2,
             filesystem_refs = ?3, updated_at = strftime('%s','now') WHERE id = 1",
        )
        .bind(managed_file_count as i64)
        .bind(managed_byte_total as i64)
        .bind(reference_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record that a maintenance pass ran.
    pub async fn touch_cleanup(&self) -> Result<()> {
        sqlx::query(
            "UPDATE storage_stats SET last_cleanup = strftime('%s','now'),
             updated_at = strftime('%s','now') WHERE id = 1",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ContentRecord> {
    let storage_type: String = row.get("storage_type");
    let original_path: Option<String> = row.get("original_path");
    let content_path: String = row.get("content_path");
    let metadata_json: Option<String> = row.get("metadata_json");

    let metadata: HashMap<String, String> = match metadata_json.as_deref() {
        None => HashMap::new(),
        Some(raw) => match serde_json::from_str(raw) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(
                    "Discarding unparseable metadata map for record {}: {}",
                    row.get::<String, _>("id"),
                    err
                );
                HashMap::new()
            }
        },
    };

    Ok(ContentRecord {
        id: row.get("id"),
        storage_kind: StorageKind::try_from(storage_type.as_str())?,
        original_path: original_path.map(PathBuf::from),
        content_path: PathBuf::from(content_path),
        display_name: row.get("display_name"),
        content_type: row.get("content_type"),
        byte_size: row.get::<i64, _>("file_size") as u64,
        content_hash: row.get("content_hash"),
        metadata,
        created_at: row.get("created_at"),
    })
}
