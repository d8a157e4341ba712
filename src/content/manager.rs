//! High-level content manager that orchestrates ingestion, deduplication,
//! storage-limit accounting, and maintenance.
//!
//! ## Key Components
//!
//! - **ContentManager**: owns the metadata index and the managed directory
//! - **IngestOutcome**: what callers attach to their own records
//! - **CleanupReport** / **ValidationReport**: maintenance results
//!
//! ## Ingestion Flow
//!
//! ```text
//! bytes/path → streaming hash → dedup lookup by hash
//!                 ↓ miss                       ↓ hit
//!        write + insert record          return existing record
//!        (accounting in same tx)        (was_deduplicated = true)
//! ```
//!
//! Filesystem ingestion never copies bytes: the record points at the
//! caller-owned file. Memory ingestion writes a managed copy named by the
//! derived id. The record id is the content hash, so a racing second insert
//! of identical bytes hits the primary key and is resolved as a dedup hit
//! instead of creating a duplicate record.
//!
//! Maintenance operations (orphan removal, duplicate removal, repair) are
//! idempotent but not safe to run concurrently with each other against the
//! same directory; callers serialize them externally.

use crate::config::{ContentStoreConfig, StreamOptions};
use crate::error::{Result, StoreError};
use crate::streaming;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::index::{ContentIndex, ContentRecord, StorageKind, StorageStats};

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const GENERIC_BINARY: &str = "application/octet-stream";
const BYTES_PER_MB: f64 = 1_048_576.0;

/// Result of an ingestion, successful whether or not bytes were new.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Stable content identifier (hex SHA-256 of the payload)
    pub id: String,
    pub storage_kind: StorageKind,
    /// Path the bytes are read from
    pub content_path: PathBuf,
    /// True when an existing record was returned instead of creating one
    pub was_deduplicated: bool,
}

/// Options for [`ContentManager::ingest_from_memory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryIngestOptions {
    /// Required human-facing name; its extension drives MIME inference
    pub display_name: String,
    /// Caller-supplied MIME type, validated against the allow-list
    pub content_type: Option<String>,
    /// Optional provenance path recorded alongside the managed copy
    pub original_path: Option<PathBuf>,
    /// Format-specific extension fields
    pub metadata: HashMap<String, String>,
}

impl MemoryIngestOptions {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_original_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.original_path = Some(path.into());
        self
    }
}

/// Derived storage figures on top of the raw accounting row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMetrics {
    pub managed_file_count: u64,
    pub managed_byte_total: u64,
    pub reference_count: u64,
    pub max_managed_bytes: u64,
    /// managed_byte_total / max_managed_bytes * 100
    pub usage_percent: f64,
    pub remaining_bytes: u64,
    /// Bytes / 1,048,576 rounded to two decimals
    pub used_mb: f64,
    pub remaining_mb: f64,
}

/// Threshold evaluation of current usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLimitStatus {
    pub usage_percent: f64,
    pub is_near_warning_threshold: bool,
    pub is_near_error_threshold: bool,
    /// False once usage is at or over the error threshold
    pub can_accept_content: bool,
    /// Always non-empty, scaled to severity
    pub recommendations: Vec<String>,
}

/// Result of an orphan- or duplicate-removal pass. Per-file failures are
/// collected rather than aborting the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed_files: Vec<PathBuf>,
    pub errors: Vec<String>,
    /// Bytes reclaimed
    pub freed_space: u64,
}

/// Result of [`ContentManager::validate_and_repair_content_directory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Problems requiring operator judgment (never auto-fixed)
    pub issues: Vec<String>,
    /// Accounting drift that was silently recomputed
    pub repaired: Vec<String>,
}

/// Running counters for this manager instance, in the spirit of an
/// injectable accumulator rather than module-level mutable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub ingested: usize,
    pub deduplicated: usize,
    pub bytes_written: u64,
}

/// The orchestrator for content ingestion and maintenance.
///
/// Owns the invariant "one unique payload, one record, at most one physical
/// copy". All reads go through the
/// [`ContentResolver`](super::resolver::ContentResolver) built on the same
/// index.
#[derive(Debug)]
pub struct ContentManager {
    config: ContentStoreConfig,
    index: ContentIndex,
    stats: RwLock<IngestStats>,
}

impl ContentManager {
    /// Create a manager with persistent SQLite metadata under the config's
    /// base path.
    pub async fn new(config: ContentStoreConfig) -> Result<Self> {
        config.validate()?;
        let index = ContentIndex::open(&config.base_path).await?;
        info!(
            "Initialized content store at {} (limit {} bytes)",
            config.base_path.display(),
            config.max_managed_bytes
        );
        Ok(Self {
            config,
            index,
            stats: RwLock::new(IngestStats::default()),
        })
    }

    /// Create a manager with an in-memory metadata database, for testing.
    pub async fn new_memory(config: ContentStoreConfig) -> Result<Self> {
        config.validate()?;
        let index = ContentIndex::open_memory().await?;
        Ok(Self {
            config,
            index,
            stats: RwLock::new(IngestStats::default()),
        })
    }

    /// The metadata index backing this manager.
    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    /// This manager's configuration.
    pub fn config(&self) -> &ContentStoreConfig {
        &self.config
    }

    /// Counters for this manager instance.
    pub async fn get_ingest_stats(&self) -> IngestStats {
        self.stats.read().await.clone()
    }

    /// Ingest a caller-owned file by reference.
    ///
    /// Hashes the file by streaming it, returns the existing record on a
    /// dedup hit, and otherwise records a filesystem reference. No bytes are
    /// ever copied on this path, so the store does not own the file's
    /// lifecycle.
    pub async fn ingest_from_filesystem(&self, path: &Path) -> Result<IngestOutcome> {
        let metadata = fs::metadata(path).await?;
        let options = StreamOptions::from_config(&self.config);
        let hash = streaming::hash_file(path, &options).await?;

        if let Some(existing) = self.index.get_record_by_hash(&hash).await? {
            debug!("Deduplicated filesystem ingestion of {}", path.display());
            self.stats.write().await.deduplicated += 1;
            return Ok(outcome_from(existing, true));
        }

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        let record = ContentRecord {
            id: hash.clone(),
            storage_kind: StorageKind::FilesystemReference,
            original_path: Some(path.to_path_buf()),
            content_path: path.to_path_buf(),
            display_name: display_name.clone(),
            content_type: infer_content_type(&display_name).to_string(),
            byte_size: metadata.len(),
            content_hash: hash,
            metadata: HashMap::new(),
            created_at: chrono::Utc::now().timestamp(),
        };

        match self.index.insert_record(&record).await {
            Ok(()) => {
                info!(
                    "Ingested filesystem reference {} ({} bytes)",
                    path.display(),
                    record.byte_size
                );
                self.stats.write().await.ingested += 1;
                Ok(outcome_from(record, false))
            }
            Err(err) if err.is_unique_violation() => self.resolve_insert_race(&record.id).await,
            Err(err) => Err(err),
        }
    }

    /// Ingest an in-memory payload as a managed copy.
    ///
    /// Validation order: display name, content-type allow-list, size ceiling.
    /// On a dedup miss the bytes are written to a managed path named by the
    /// derived id before the record is committed.
    pub async fn ingest_from_memory(
        &self,
        bytes: &[u8],
        options: MemoryIngestOptions,
    ) -> Result<IngestOutcome> {
        if options.display_name.trim().is_empty() {
            return Err(StoreError::validation("display_name is required"));
        }
        let content_type = match &options.content_type {
            Some(supplied) => {
                if !is_allowed_content_type(supplied) {
                    return Err(StoreError::UnsupportedContentType {
                        content_type: supplied.clone(),
                    });
                }
                supplied.clone()
            }
            None => infer_content_type(&options.display_name).to_string(),
        };
        if bytes.len() as u64 > self.config.max_memory_payload_bytes {
            return Err(StoreError::ContentTooLarge {
                actual: bytes.len() as u64,
                max: self.config.max_memory_payload_bytes,
            });
        }

        let stream_options = StreamOptions::from_config(&self.config);
        let hash = streaming::hash_bytes(bytes, &stream_options).await?;

        if let Some(existing) = self.index.get_record_by_hash(&hash).await? {
            debug!("Deduplicated memory ingestion of '{}'", options.display_name);
            self.stats.write().await.deduplicated += 1;
            return Ok(outcome_from(existing, true));
        }

        let content_path = self.config.managed_path(&hash);
        let written = streaming::write_bytes(bytes, &content_path, &stream_options).await?;

        let record = ContentRecord {
            id: hash.clone(),
            storage_kind: StorageKind::ManagedCopy,
            original_path: options.original_path,
            content_path: content_path.clone(),
            display_name: options.display_name,
            content_type,
            byte_size: written.bytes,
            content_hash: hash,
            metadata: options.metadata,
            created_at: chrono::Utc::now().timestamp(),
        };

        match self.index.insert_record(&record).await {
            Ok(()) => {
                info!(
                    "Ingested managed copy '{}' ({} bytes) as {}",
                    record.display_name, record.byte_size, record.id
                );
                let mut stats = self.stats.write().await;
                stats.ingested += 1;
                stats.bytes_written += record.byte_size;
                drop(stats);
                self.warn_if_near_limit().await;
                Ok(outcome_from(record, false))
            }
            Err(err) if err.is_unique_violation() => {
                // The racing winner owns the managed path; its bytes are
                // identical, so nothing needs cleaning up.
                self.resolve_insert_race(&record.id).await
            }
            Err(err) => {
                if let Err(cleanup_err) = fs::remove_file(&content_path).await {
                    warn!(
                        "Failed to remove managed copy after insert failure {}: {}",
                        content_path.display(),
                        cleanup_err
                    );
                }
                Err(err)
            }
        }
    }

    /// A concurrent ingestion committed the same id first; return its record
    /// as a dedup hit.
    async fn resolve_insert_race(&self, id: &str) -> Result<IngestOutcome> {
        debug!("Concurrent ingestion race on {id}, returning existing record");
        let existing = self
            .index
            .get_record(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id))?;
        self.stats.write().await.deduplicated += 1;
        Ok(outcome_from(existing, true))
    }

    async fn warn_if_near_limit(&self) {
        if let Ok(status) = self.get_storage_limit_status().await {
            if status.is_near_error_threshold {
                warn!(
                    "Managed storage at {:.1}% of limit; ingestion should stop",
                    status.usage_percent
                );
            } else if status.is_near_warning_threshold {
                warn!(
                    "Managed storage at {:.1}% of limit",
                    status.usage_percent
                );
            }
        }
    }

    /// Raw accounting snapshot.
    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        self.index.get_stats().await
    }

    /// Accounting plus derived usage figures.
    pub async fn get_storage_metrics(&self) -> Result<StorageMetrics> {
        let stats = self.index.get_stats().await?;
        let max = self.config.max_managed_bytes;
        let remaining = max.saturating_sub(stats.managed_byte_total);

        Ok(StorageMetrics {
            managed_file_count: stats.managed_file_count,
            managed_byte_total: stats.managed_byte_total,
            reference_count: stats.reference_count,
            max_managed_bytes: max,
            usage_percent: stats.managed_byte_total as f64 / max as f64 * 100.0,
            remaining_bytes: remaining,
            used_mb: to_mb(stats.managed_byte_total),
            remaining_mb: to_mb(remaining),
        })
    }

    /// Threshold evaluation with human-readable recommendations.
    pub async fn get_storage_limit_status(&self) -> Result<StorageLimitStatus> {
        let metrics = self.get_storage_metrics().await?;
        let usage = metrics.usage_percent;
        let near_warning = usage >= self.config.warning_threshold_percent;
        let near_error = usage >= self.config.error_threshold_percent;

        let recommendations = if near_error {
            vec![
                format!(
                    "Managed storage is at {usage:.1}% of the configured limit; new managed copies should be refused"
                ),
                "Run remove_orphaned_files() and remove_duplicate_content() to reclaim space"
                    .to_string(),
                "Raise max_managed_bytes or delete content that is no longer needed".to_string(),
            ]
        } else if near_warning {
            vec![
                format!("Managed storage is at {usage:.1}% of the configured limit"),
                "Schedule a maintenance pass before usage reaches the error threshold".to_string(),
            ]
        } else {
            vec![format!("Managed storage usage is healthy at {usage:.1}%")]
        };

        Ok(StorageLimitStatus {
            usage_percent: usage,
            is_near_warning_threshold: near_warning,
            is_near_error_threshold: near_error,
            can_accept_content: !near_error,
            recommendations,
        })
    }

    /// Render a plain-text report over all storage figures.
    pub async fn generate_storage_report(&self) -> Result<String> {
        let stats = self.index.get_stats().await?;
        let metrics = self.get_storage_metrics().await?;
        let total_records = self.index.record_count().await?;

        let mut report = String::new();
        writeln!(report, "Content Storage Report").ok();
        writeln!(report, "======================").ok();
        writeln!(report).ok();
        writeln!(report, "Content Directory:").ok();
        writeln!(report, "  Files: {}", metrics.managed_file_count).ok();
        writeln!(
            report,
            "  Size: {} MB ({} bytes)",
            metrics.used_mb, metrics.managed_byte_total
        )
        .ok();
        writeln!(report).ok();
        writeln!(report, "Filesystem References:").ok();
        writeln!(report, "  Records: {}", metrics.reference_count).ok();
        writeln!(report).ok();
        writeln!(report, "Overall Usage:").ok();
        writeln!(report, "  Total records: {total_records}").ok();
        writeln!(report, "  Usage: {:.2}% of limit", metrics.usage_percent).ok();
        writeln!(report).ok();
        writeln!(report, "Storage Limits:").ok();
        writeln!(
            report,
            "  Maximum managed bytes: {} ({} MB)",
            metrics.max_managed_bytes,
            to_mb(metrics.max_managed_bytes)
        )
        .ok();
        writeln!(
            report,
            "  Remaining: {} bytes ({} MB)",
            metrics.remaining_bytes, metrics.remaining_mb
        )
        .ok();
        writeln!(
            report,
            "  Warning threshold: {}%",
            self.config.warning_threshold_percent
        )
        .ok();
        writeln!(
            report,
            "  Error threshold: {}%",
            self.config.error_threshold_percent
        )
        .ok();
        writeln!(report).ok();
        writeln!(report, "Maintenance:").ok();
        writeln!(
            report,
            "  Last cleanup (unix): {}",
            stats.last_cleanup_at.unwrap_or(0)
        )
        .ok();

        Ok(report)
    }

    /// Delete physical files in the managed directory that no record points
    /// at.
    ///
    /// A missing managed directory yields an empty, error-free result.
    /// Per-file failures are collected and never abort the batch.
    pub async fn remove_orphaned_files(&self) -> Result<CleanupReport> {
        let content_dir = self.config.content_dir();
        let mut report = CleanupReport::default();

        let mut entries = match fs::read_dir(&content_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("Managed directory {} does not exist", content_dir.display());
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        let owned: HashSet<PathBuf> = self
            .index
            .managed_records()
            .await?
            .into_iter()
            .map(|r| r.content_path)
            .collect();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = match entry.file_type().await {
                Ok(file_type) => file_type.is_file(),
                Err(err) => {
                    report.errors.push(format!("{}: {err}", path.display()));
                    continue;
                }
            };
            if !is_file || owned.contains(&path) {
                continue;
            }

            let size = match fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(err) => {
                    report.errors.push(format!("{}: {err}", path.display()));
                    continue;
                }
            };
            match fs::remove_file(&path).await {
                Ok(()) => {
                    report.freed_space += size;
                    report.removed_files.push(path);
                }
                Err(err) => report.errors.push(format!("{}: {err}", path.display())),
            }
        }

        self.index.touch_cleanup().await?;
        if !report.removed_files.is_empty() {
            info!(
                "Removed {} orphaned files ({} bytes)",
                report.removed_files.len(),
                report.freed_space
            );
        }
        Ok(report)
    }

    /// Collapse records sharing a content hash down to the oldest one,
    /// deleting the newer records and their managed files.
    ///
    /// Duplicates are an anomaly (e.g. rows predating the hash-derived id),
    /// so this returns empty on a healthy store.
    pub async fn remove_duplicate_content(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for group in self.index.duplicate_groups().await? {
            let Some((keeper, extras)) = group.split_first() else {
                continue;
            };
            for extra in extras {
                if let Err(err) = self.index.delete_record(&extra.id).await {
                    report
                        .errors
                        .push(format!("{}: {err}", extra.content_path.display()));
                    continue;
                }
                // The keeper may share the physical file; only delete paths
                // it does not read from.
                if extra.storage_kind == StorageKind::ManagedCopy
                    && extra.content_path != keeper.content_path
                {
                    match fs::remove_file(&extra.content_path).await {
                        Ok(()) => {
                            report.freed_space += extra.byte_size;
                            report.removed_files.push(extra.content_path.clone());
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => report
                            .errors
                            .push(format!("{}: {err}", extra.content_path.display())),
                    }
                }
            }
        }

        self.index.touch_cleanup().await?;
        if !report.removed_files.is_empty() {
            warn!(
                "Removed {} duplicate records ({} bytes reclaimed)",
                report.removed_files.len(),
                report.freed_space
            );
        }
        Ok(report)
    }

    /// Confirm every managed copy's file exists and that accounting matches
    /// the records.
    ///
    /// Accounting drift is recomputed silently and reported as repaired. A
    /// record whose file is missing is an issue and is never auto-deleted:
    /// missing bytes require operator judgment.
    pub async fn validate_and_repair_content_directory(&self) -> Result<ValidationReport> {
        let mut issues = Vec::new();
        let mut repaired = Vec::new();

        let managed = self.index.managed_records().await?;
        let mut true_files: u64 = 0;
        let mut true_bytes: u64 = 0;
        for record in &managed {
            match fs::metadata(&record.content_path).await {
                Ok(_) => {
                    true_files += 1;
                    true_bytes += record.byte_size;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    issues.push(format!(
                        "Managed copy {} is missing its file at {}",
                        record.id,
                        record.content_path.display()
                    ));
                }
                Err(err) => {
                    issues.push(format!(
                        "Managed copy {} is unreadable at {}: {err}",
                        record.id,
                        record.content_path.display()
                    ));
                }
            }
        }

        let reference_count = self.index.record_count().await? - managed.len() as u64;
        let stats = self.index.get_stats().await?;
        if stats.managed_file_count != true_files
            || stats.managed_byte_total != true_bytes
            || stats.reference_count != reference_count
        {
            self.index
                .replace_stats(true_files, true_bytes, reference_count)
                .await?;
            repaired.push(format!(
                "Recomputed storage accounting: {} files / {} bytes / {} references (was {} / {} / {})",
                true_files,
                true_bytes,
                reference_count,
                stats.managed_file_count,
                stats.managed_byte_total,
                stats.reference_count
            ));
            debug!("Repaired storage accounting drift");
        }

        if !issues.is_empty() {
            warn!("Content directory validation found {} issues", issues.len());
        }

        Ok(ValidationReport {
            is_valid: issues.is_empty(),
            issues,
            repaired,
        })
    }
}

fn outcome_from(record: ContentRecord, was_deduplicated: bool) -> IngestOutcome {
    IngestOutcome {
        id: record.id,
        storage_kind: record.storage_kind,
        content_path: record.content_path,
        was_deduplicated,
    }
}

/// Bytes to MB, rounded to two decimals.
fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

/// Infer a MIME-style type from a file name's extension, falling back to a
/// generic binary type.
pub fn infer_content_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    match extension.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") | Some("markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("docx") => DOCX_MIME,
        _ => GENERIC_BINARY,
    }
}

/// Whether a caller-supplied MIME type is in the allow-listed set: text,
/// JSON, HTML, image, PDF, and the DOCX type.
pub fn is_allowed_content_type(content_type: &str) -> bool {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    normalized.starts_with("text/")
        || normalized.starts_with("image/")
        || normalized == "application/json"
        || normalized == "application/pdf"
        || normalized == DOCX_MIME
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    async fn memory_manager(base: &Path) -> Result<ContentManager> {
        Ok(ContentManager::new_memory(ContentStoreConfig::new(base)).await?)
    }

    #[test]
    fn test_infer_content_type() {
        assert_eq!(infer_content_type("a.txt"), "text/plain");
        assert_eq!(infer_content_type("notes.md"), "text/markdown");
        assert_eq!(infer_content_type("data.JSON"), "application/json");
        assert_eq!(infer_content_type("scan.pdf"), "application/pdf");
        assert_eq!(infer_content_type("report.docx"), DOCX_MIME);
        assert_eq!(infer_content_type("photo.jpeg"), "image/jpeg");
        assert_eq!(infer_content_type("mystery.bin"), GENERIC_BINARY);
        assert_eq!(infer_content_type("no_extension"), GENERIC_BINARY);
    }

    #[test]
    fn test_allowed_content_types() {
        assert!(is_allowed_content_type("text/plain"));
        assert!(is_allowed_content_type("text/html"));
        assert!(is_allowed_content_type("image/png"));
        assert!(is_allowed_content_type("application/json"));
        assert!(is_allowed_content_type("application/pdf"));
        assert!(is_allowed_content_type(DOCX_MIME));
        assert!(is_allowed_content_type("text/plain; charset=utf-8"));

        assert!(!is_allowed_content_type("application/octet-stream"));
        assert!(!is_allowed_content_type("video/mp4"));
        assert!(!is_allowed_content_type("application/zip"));
    }

    #[test]
    fn test_to_mb_rounding() {
        assert_eq!(to_mb(1_048_576), 1.0);
        assert_eq!(to_mb(1_572_864), 1.5);
        // Two-decimal rounding stays within 0.01 of the byte-derived value
        let bytes = 123_456_789u64;
        let exact = bytes as f64 / BYTES_PER_MB;
        assert!((to_mb(bytes) - exact).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_memory_ingest_validation_order() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;

        // Missing display name fails first
        let err = manager
            .ingest_from_memory(b"x", MemoryIngestOptions::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));

        // Disallowed content type
        let err = manager
            .ingest_from_memory(
                b"x",
                MemoryIngestOptions::new("a.zip").with_content_type("application/zip"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedContentType { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_size_limit_boundary() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = ContentStoreConfig::new(temp_dir.path()).with_max_memory_payload_bytes(16);
        let manager = ContentManager::new_memory(config).await?;

        // Exactly at the limit is accepted
        let at_limit = vec![1u8; 16];
        let outcome = manager
            .ingest_from_memory(&at_limit, MemoryIngestOptions::new("a.txt"))
            .await?;
        assert!(!outcome.was_deduplicated);

        // One byte over is rejected with both figures
        let over = vec![1u8; 17];
        let err = manager
            .ingest_from_memory(&over, MemoryIngestOptions::new("b.txt"))
            .await
            .unwrap_err();
        match err {
            StoreError::ContentTooLarge { actual, max } => {
                assert_eq!(actual, 17);
                assert_eq!(max, 16);
            }
            other => panic!("expected ContentTooLarge, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_status_thresholds() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = ContentStoreConfig::new(temp_dir.path()).with_max_managed_bytes(100);
        let manager = ContentManager::new_memory(config).await?;

        let status = manager.get_storage_limit_status().await?;
        assert!(!status.is_near_warning_threshold);
        assert!(status.can_accept_content);
        assert!(!status.recommendations.is_empty());

        // 85 of 100 bytes: warning but not error
        let payload = vec![7u8; 85];
        manager
            .ingest_from_memory(&payload, MemoryIngestOptions::new("big.txt"))
            .await?;
        let status = manager.get_storage_limit_status().await?;
        assert!(status.is_near_warning_threshold);
        assert!(!status.is_near_error_threshold);
        assert!(status.can_accept_content);
        assert!(status.recommendations.len() >= 2);

        // Push past the error threshold
        let more = vec![9u8; 12];
        manager
            .ingest_from_memory(&more, MemoryIngestOptions::new("more.txt"))
            .await?;
        let status = manager.get_storage_limit_status().await?;
        assert!(status.is_near_error_threshold);
        assert!(!status.can_accept_content);
        assert!(!status.recommendations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_report_sections() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;
        manager
            .ingest_from_memory(b"report body", MemoryIngestOptions::new("r.txt"))
            .await?;

        let report = manager.generate_storage_report().await?;
        for label in [
            "Content Directory",
            "Filesystem References",
            "Overall Usage",
            "Storage Limits",
            "Maintenance",
        ] {
            assert!(report.contains(label), "missing section '{label}'");
        }
        // Each section carries numeric figures
        assert!(report.contains("Files: 1"));
        assert!(report.contains("Records: 0"));
        assert!(report.contains("Total records: 1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_orphan_removal_missing_directory_is_noop() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;

        let report = manager.remove_orphaned_files().await?;
        assert!(report.removed_files.is_empty());
        assert!(report.errors.is_empty());
        assert_eq!(report.freed_space, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_orphan_removal_deletes_unowned_files_only() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;

        let outcome = manager
            .ingest_from_memory(b"keep me", MemoryIngestOptions::new("keep.txt"))
            .await?;

        let orphan = manager.config().content_dir().join("orphan.bin");
        tokio::fs::write(&orphan, b"stray bytes").await?;

        let report = manager.remove_orphaned_files().await?;
        assert_eq!(report.removed_files, vec![orphan.clone()]);
        assert_eq!(report.freed_space, 11);
        assert!(report.errors.is_empty());
        assert!(!orphan.exists());
        assert!(outcome.content_path.exists());

        // Second pass is empty: cleanup is idempotent
        let report = manager.remove_orphaned_files().await?;
        assert!(report.removed_files.is_empty());
        assert!(report.errors.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_removal_on_healthy_store_is_empty() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;
        manager
            .ingest_from_memory(b"unique", MemoryIngestOptions::new("u.txt"))
            .await?;

        let report = manager.remove_duplicate_content().await?;
        assert!(report.removed_files.is_empty());
        assert!(report.errors.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_removal_keeps_oldest() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;

        // Seed an anomaly directly: two ids sharing a hash, distinct files
        let dir = manager.config().content_dir();
        tokio::fs::create_dir_all(&dir).await?;
        for (id, created_at) in [("legacy-id", 1_000), ("newer-id", 2_000)] {
            let path = dir.join(id);
            tokio::fs::write(&path, b"same bytes").await?;
            manager
                .index()
                .insert_record(&ContentRecord {
                    id: id.to_string(),
                    storage_kind: StorageKind::ManagedCopy,
                    original_path: None,
                    content_path: path,
                    display_name: "dup.txt".to_string(),
                    content_type: "text/plain".to_string(),
                    byte_size: 10,
                    content_hash: "sharedhash".to_string(),
                    metadata: HashMap::new(),
                    created_at,
                })
                .await?;
        }

        let report = manager.remove_duplicate_content().await?;
        assert_eq!(report.removed_files, vec![dir.join("newer-id")]);
        assert_eq!(report.freed_space, 10);
        assert!(manager.index().get_record("legacy-id").await?.is_some());
        assert!(manager.index().get_record("newer-id").await?.is_none());
        assert!(dir.join("legacy-id").exists());

        // Idempotent: a clean store yields an empty report
        let report = manager.remove_duplicate_content().await?;
        assert!(report.removed_files.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_validate_and_repair() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;

        let outcome = manager
            .ingest_from_memory(b"validate me", MemoryIngestOptions::new("v.txt"))
            .await?;

        let report = manager.validate_and_repair_content_directory().await?;
        assert!(report.is_valid);
        assert!(report.issues.is_empty());
        assert!(report.repaired.is_empty());

        // Introduce accounting drift; repair recomputes it silently
        manager.index().replace_stats(99, 9_999, 7).await?;
        let report = manager.validate_and_repair_content_directory().await?;
        assert!(report.is_valid);
        assert_eq!(report.repaired.len(), 1);
        let stats = manager.get_storage_stats().await?;
        assert_eq!(stats.managed_file_count, 1);
        assert_eq!(stats.managed_byte_total, 11);

        // A missing managed file is an issue, and the record survives
        tokio::fs::remove_file(&outcome.content_path).await?;
        let report = manager.validate_and_repair_content_directory().await?;
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 1);
        assert!(manager.index().get_record(&outcome.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_stats_accumulate() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = memory_manager(temp_dir.path()).await?;

        manager
            .ingest_from_memory(b"counted", MemoryIngestOptions::new("c.txt"))
            .await?;
        manager
            .ingest_from_memory(b"counted", MemoryIngestOptions::new("c.txt"))
            .await?;

        let stats = manager.get_ingest_stats().await;
        assert_eq!(stats.ingested, 1);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.bytes_written, 7);
        Ok(())
    }
}
