//! Content ingestion, deduplication, and retrieval.
//!
//! - [`index`]: SQLite metadata layer (records + storage accounting)
//! - [`manager`]: ingestion, storage limits, and maintenance
//! - [`resolver`]: read-only access by content id

pub mod index;
pub mod manager;
pub mod resolver;

pub use index::{ContentIndex, ContentRecord, StorageKind, StorageStats};
pub use manager::{
    CleanupReport, ContentManager, IngestOutcome, IngestStats, MemoryIngestOptions,
    StorageLimitStatus, StorageMetrics, ValidationReport,
};
pub use resolver::{ContentBatchResult, ContentFormat, ContentRequest, ContentResolver};
