//! Bounded-memory streaming primitives for hashing, copying, and writing.
//!
//! Everything here processes data in fixed-size windows (64 KiB by default)
//! so that arbitrarily large payloads never have to fit in memory, and yields
//! to the runtime between windows so long operations don't starve concurrent
//! work. Each primitive accepts [`StreamOptions`] carrying the window size,
//! an optional deadline, and an optional progress callback invoked with
//! (cumulative, total) bytes after each window.
//!
//! The one documented exception is [`read_base64`]: base64 encoding needs
//! complete byte groups, so it reads the whole file at once. Callers are
//! responsible for enforcing a size ceiling before invoking it.

use crate::config::StreamOptions;
use crate::error::{Result, StoreError};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Result of a streaming copy or write: the SHA-256 digest of everything
/// that passed through, and how many bytes that was.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Lowercase hex SHA-256 digest of the streamed bytes
    pub hash: String,
    /// Total bytes streamed
    pub bytes: u64,
}

/// Tracks a running digest, byte counter, deadline, and progress reporting
/// for one streaming operation.
struct WindowTracker<'a> {
    hasher: Sha256,
    written: u64,
    total: Option<u64>,
    started: Instant,
    options: &'a StreamOptions,
}

impl<'a> WindowTracker<'a> {
    fn new(options: &'a StreamOptions, total: Option<u64>) -> Self {
        Self {
            hasher: Sha256::new(),
            written: 0,
            total,
            started: Instant::now(),
            options,
        }
    }

    /// Run one pending read or write under whatever remains of the deadline,
    /// so a stalled handle (e.g. an unresponsive network filesystem) aborts
    /// instead of hanging past the budget.
    async fn io<T>(&self, operation: impl Future<Output = std::io::Result<T>>) -> Result<T> {
        match self.options.timeout {
            Some(deadline) => {
                let elapsed = self.started.elapsed();
                if elapsed >= deadline {
                    return Err(StoreError::Timeout { elapsed, deadline });
                }
                match tokio::time::timeout(deadline - elapsed, operation).await {
                    Ok(result) => Ok(result?),
                    Err(_) => Err(StoreError::Timeout {
                        elapsed: self.started.elapsed(),
                        deadline,
                    }),
                }
            }
            None => Ok(operation.await?),
        }
    }

    /// Fold one window into the digest, report progress, check the deadline,
    /// and yield to the runtime.
    async fn advance(&mut self, window: &[u8]) -> Result<()> {
        self.hasher.update(window);
        self.written += window.len() as u64;

        if let Some(progress) = &self.options.progress {
            progress(self.written, self.total);
        }
        if let Some(deadline) = self.options.timeout {
            let elapsed = self.started.elapsed();
            if elapsed >= deadline {
                return Err(StoreError::Timeout { elapsed, deadline });
            }
        }
        tokio::task::yield_now().await;
        Ok(())
    }

    fn finish(self) -> StreamOutcome {
        StreamOutcome {
            hash: hex::encode(self.hasher.finalize()),
            bytes: self.written,
        }
    }
}

/// Compute the SHA-256 digest of a file by streaming it in windows.
///
/// Returns the lowercase hex digest. Never loads the whole file into memory.
pub async fn hash_file(path: &Path, options: &StreamOptions) -> Result<String> {
    let metadata = fs::metadata(path).await?;
    let mut file = fs::File::open(path).await?;
    let mut tracker = WindowTracker::new(options, Some(metadata.len()));
    let mut window = vec![0u8; options.window_size];

    loop {
        let read = tracker.io(file.read(&mut window)).await?;
        if read == 0 {
            break;
        }
        tracker.advance(&window[..read]).await?;
    }

    Ok(tracker.finish().hash)
}

/// Compute the SHA-256 digest of an in-memory buffer, chunked to the same
/// window size as the file path so large buffers don't monopolize the
/// executor. Produces the identical digest to [`hash_file`] for the same
/// bytes.
pub async fn hash_bytes(bytes: &[u8], options: &StreamOptions) -> Result<String> {
    let mut tracker = WindowTracker::new(options, Some(bytes.len() as u64));

    if bytes.is_empty() {
        tracker.advance(&[]).await?;
    } else {
        for window in bytes.chunks(options.window_size) {
            tracker.advance(window).await?;
        }
    }

    Ok(tracker.finish().hash)
}

/// Copy a file to `destination` through the windowed hasher, creating parent
/// directories as needed.
///
/// On any mid-operation failure the partially written destination is deleted
/// before the error propagates, so no partial artifacts survive.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    options: &StreamOptions,
) -> Result<StreamOutcome> {
    let metadata = fs::metadata(source).await?;
    let mut reader = fs::File::open(source).await?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut writer = fs::File::create(destination).await?;

    let mut tracker = WindowTracker::new(options, Some(metadata.len()));
    let mut window = vec![0u8; options.window_size];

    let result: Result<()> = async {
        loop {
            let read = tracker.io(reader.read(&mut window)).await?;
            if read == 0 {
                break;
            }
            tracker.io(writer.write_all(&window[..read])).await?;
            tracker.advance(&window[..read]).await?;
        }
        tracker.io(writer.flush()).await?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        drop(writer);
        remove_partial(destination).await;
        return Err(err);
    }

    tracing::debug!(
        "Copied {} bytes from {} to {}",
        tracker.written,
        source.display(),
        destination.display()
    );
    Ok(tracker.finish())
}

/// Write an in-memory byte sequence to `destination`, chunked to the window
/// size, with the same parent-creation and partial-cleanup contract as
/// [`copy_file`].
pub async fn write_bytes(
    bytes: &[u8],
    destination: &Path,
    options: &StreamOptions,
) -> Result<StreamOutcome> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut writer = fs::File::create(destination).await?;

    let mut tracker = WindowTracker::new(options, Some(bytes.len() as u64));

    let result: Result<()> = async {
        for window in bytes.chunks(options.window_size) {
            tracker.io(writer.write_all(window)).await?;
            tracker.advance(window).await?;
        }
        tracker.io(writer.flush()).await?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        drop(writer);
        remove_partial(destination).await;
        return Err(err);
    }

    Ok(tracker.finish())
}

/// Read a file and return its bytes base64-encoded.
///
/// This is the documented exception to the streaming pattern: encoding
/// requires complete byte groups, so the file is read whole. Enforce a size
/// ceiling before calling this.
pub async fn read_base64(path: &Path) -> Result<String> {
    let bytes = fs::read(path).await?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Recompute a file's SHA-256 digest and compare it case-insensitively
/// against `expected`.
pub async fn validate_integrity(
    path: &Path,
    expected: &str,
    options: &StreamOptions,
) -> Result<bool> {
    let actual = hash_file(path, options).await?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

/// Best-effort removal of a partial artifact after a failed copy or write.
async fn remove_partial(destination: &Path) {
    if let Err(cleanup_err) = fs::remove_file(destination).await {
        tracing::warn!(
            "Failed to remove partial file {}: {}",
            destination.display(),
            cleanup_err
        );
    }
}
