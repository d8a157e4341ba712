//! Read-only access to stored content.
//!
//! The resolver shares the manager's [`ContentIndex`] and never mutates the
//! store: it maps content ids back to paths, encoded bytes, and metadata.

use crate::error::{Result, StoreError};
use crate::streaming;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::index::{ContentIndex, ContentRecord};

/// Retrieval format for [`ContentResolver::get_content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Return the path the bytes live at; existence is not re-verified
    File,
    /// Read the bytes and return them base64-encoded
    Base64,
}

impl ContentFormat {
    /// Parse a caller-supplied format string.
    pub fn parse(format: &str) -> Result<Self> {
        match format {
            "file" => Ok(Self::File),
            "base64" => Ok(Self::Base64),
            other => Err(StoreError::validation(format!(
                "unknown format '{other}': expected 'file' or 'base64'"
            ))),
        }
    }
}

/// One item of a batch retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    pub id: String,
    /// Format string, validated per item ('file' or 'base64')
    pub format: String,
}

/// One item of a batch retrieval result, same position as its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBatchResult {
    pub success: bool,
    /// Path string or base64 payload on success
    pub content: Option<String>,
    /// Non-empty error description on failure
    pub error: Option<String>,
}

/// Read-only accessor over the content store.
#[derive(Clone, Debug)]
pub struct ContentResolver {
    index: ContentIndex,
}

impl ContentResolver {
    pub fn new(index: ContentIndex) -> Self {
        Self { index }
    }

    /// Resolve a content id to either its path or its base64-encoded bytes.
    ///
    /// The `"file"` fast path returns `content_path` verbatim without
    /// touching the filesystem; a reference whose underlying file was
    /// externally deleted surfaces an I/O error only on the `"base64"` path.
    pub async fn get_content(&self, id: &str, format: &str) -> Result<String> {
        let format = ContentFormat::parse(format)?;
        let record = self.require_record(id).await?;

        match format {
            ContentFormat::File => Ok(record.content_path.to_string_lossy().to_string()),
            ContentFormat::Base64 => {
                debug!("Encoding {} from {}", id, record.content_path.display());
                streaming::read_base64(&record.content_path).await
            }
        }
    }

    /// Full metadata record for a content id.
    pub async fn get_content_metadata(&self, id: &str) -> Result<ContentRecord> {
        self.require_record(id).await
    }

    /// Resolve many items concurrently.
    ///
    /// The result vector has the same length and order as the request
    /// vector; each item fails independently and a failure never aborts or
    /// reorders its siblings.
    pub async fn get_content_batch(&self, requests: &[ContentRequest]) -> Vec<ContentBatchResult> {
        let futures = requests
            .iter()
            .map(|request| self.get_content(&request.id, &request.format));

        join_all(futures)
            .await
            .into_iter()
            .map(|result| match result {
                Ok(content) => ContentBatchResult {
                    success: true,
                    content: Some(content),
                    error: None,
                },
                Err(err) => ContentBatchResult {
                    success: false,
                    content: None,
                    error: Some(err.to_string()),
                },
            })
            .collect()
    }

    /// True iff a record exists for the id.
    pub async fn verify_content_exists(&self, id: &str) -> Result<bool> {
        self.index.record_exists(id).await
    }

    async fn require_record(&self, id: &str) -> Result<ContentRecord> {
        self.index
            .get_record(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::index::StorageKind;
    use anyhow::Result;
    use base64::prelude::{BASE64_STANDARD, Engine as _};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    async fn seeded_resolver(
        dir: &std::path::Path,
        id: &str,
        bytes: &[u8],
    ) -> Result<ContentResolver> {
        let index = ContentIndex::open_memory().await?;
        let content_path = dir.join(id);
        tokio::fs::write(&content_path, bytes).await?;
        index
            .insert_record(&ContentRecord {
                id: id.to_string(),
                storage_kind: StorageKind::ManagedCopy,
                original_path: None,
                content_path,
                display_name: "seed.txt".to_string(),
                content_type: "text/plain".to_string(),
                byte_size: bytes.len() as u64,
                content_hash: id.to_string(),
                metadata: HashMap::new(),
                created_at: 1_700_000_000,
            })
            .await?;
        Ok(ContentResolver::new(index))
    }

    #[tokio::test]
    async fn test_get_content_file_and_base64() -> Result<()> {
        let temp_dir = tempdir()?;
        let resolver = seeded_resolver(temp_dir.path(), "abc", b"resolver bytes").await?;

        let path = resolver.get_content("abc", "file").await?;
        assert_eq!(PathBuf::from(&path), temp_dir.path().join("abc"));

        let encoded = resolver.get_content("abc", "base64").await?;
        assert_eq!(BASE64_STANDARD.decode(&encoded)?, b"resolver bytes");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_id_and_bad_format() -> Result<()> {
        let temp_dir = tempdir()?;
        let resolver = seeded_resolver(temp_dir.path(), "abc", b"x").await?;

        let err = resolver.get_content("nope", "file").await.unwrap_err();
        assert!(matches!(err, StoreError::ContentNotFound { .. }));

        let err = resolver.get_content("abc", "hex").await.unwrap_err();
        match err {
            StoreError::Validation { message } => {
                assert!(message.contains("file"));
                assert!(message.contains("base64"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_and_existence() -> Result<()> {
        let temp_dir = tempdir()?;
        let resolver = seeded_resolver(temp_dir.path(), "abc", b"meta").await?;

        let record = resolver.get_content_metadata("abc").await?;
        assert_eq!(record.display_name, "seed.txt");
        assert_eq!(record.byte_size, 4);

        assert!(resolver.verify_content_exists("abc").await?);
        assert!(!resolver.verify_content_exists("missing").await?);

        let err = resolver.get_content_metadata("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::ContentNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_failures() -> Result<()> {
        let temp_dir = tempdir()?;
        let resolver = seeded_resolver(temp_dir.path(), "abc", b"batch").await?;

        let requests = vec![
            ContentRequest {
                id: "abc".to_string(),
                format: "file".to_string(),
            },
            ContentRequest {
                id: "ghost".to_string(),
                format: "file".to_string(),
            },
            ContentRequest {
                id: "abc".to_string(),
                format: "base64".to_string(),
            },
        ];

        let results = resolver.get_content_batch(&requests).await;
        assert_eq!(results.len(), 3);

        assert!(results[0].success);
        assert!(results[0].content.is_some());

        assert!(!results[1].success);
        assert!(results[1].content.is_none());
        let error = results[1].error.as_deref().unwrap();
        assert!(!error.is_empty());
        assert!(error.contains("ghost"));

        assert!(results[2].success);
        assert_eq!(
            BASE64_STANDARD.decode(results[2].content.as_deref().unwrap())?,
            b"batch"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_batch() -> Result<()> {
        let temp_dir = tempdir()?;
        let resolver = seeded_resolver(temp_dir.path(), "abc", b"x").await?;
        let results = resolver.get_content_batch(&[]).await;
        assert!(results.is_empty());
        Ok(())
    }
}
