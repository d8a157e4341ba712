//! content-store: Content-addressable storage for a local retrieval pipeline
//!
//! This crate accepts arbitrary byte payloads (files on disk or in-memory
//! buffers), deduplicates them by SHA-256 content hash, decides where each
//! payload is physically stored, and exposes a uniform read interface that
//! returns either a filesystem path or a base64 encoding of the same bytes.
//!
//! ## Key Modules
//!
//! - **[`content`]**: the manager (ingestion, limits, maintenance), the
//!   resolver (read-only access), and the SQLite metadata index
//! - **[`streaming`]**: bounded-memory hashing, copying, and writing
//! - **[`config`]** / **[`error`]**: store configuration and error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use content_store::config::ContentStoreConfig;
//! use content_store::content::{ContentManager, ContentResolver, MemoryIngestOptions};
//!
//! # async fn example() -> content_store::error::Result<()> {
//! let config = ContentStoreConfig::new("/var/lib/my-pipeline");
//! let manager = ContentManager::new(config).await?;
//!
//! let outcome = manager
//!     .ingest_from_memory(b"hello", MemoryIngestOptions::new("hello.txt"))
//!     .await?;
//!
//! let resolver = ContentResolver::new(manager.index().clone());
//! let encoded = resolver.get_content(&outcome.id, "base64").await?;
//! # let _ = encoded;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Ingestion pipeline → ContentManager → streaming hash → ContentIndex (SQLite)
//!                                            ↓                ↑
//! CLI / API clients  → ContentResolver ← managed directory ───┘
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod streaming;
