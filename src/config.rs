//! Configuration for the content store

use crate::error::{Result, StoreError};
use std::path::PathBuf;
use std::time::Duration;

/// Default streaming window size (64 KiB).
pub const DEFAULT_WINDOW_SIZE: usize = 64 * 1024;

/// Configuration for a [`ContentManager`](crate::content::ContentManager)
/// and its managed storage directory.
#[derive(Debug, Clone)]
pub struct ContentStoreConfig {
    /// Base directory; the metadata database and the managed content
    /// directory both live under it
    pub base_path: PathBuf,
    /// Name of the managed content directory under `base_path`
    pub content_dir_name: String,
    /// Ceiling for the total bytes of managed copies
    pub max_managed_bytes: u64,
    /// Ceiling for a single in-memory ingestion payload
    pub max_memory_payload_bytes: u64,
    /// Usage percent at which the store starts warning (default 80)
    pub warning_threshold_percent: f64,
    /// Usage percent at which ingestion is refused (default 95)
    pub error_threshold_percent: f64,
    /// Window size for streaming hash/copy operations
    pub window_size: usize,
    /// Optional deadline for individual streaming operations
    pub io_timeout: Option<Duration>,
}

impl ContentStoreConfig {
    /// Create a configuration with defaults: a 10 GiB managed ceiling,
    /// 50 MiB memory payload limit, 80/95 thresholds, 64 KiB windows,
    /// and no streaming deadline.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            content_dir_name: "content".to_string(),
            max_managed_bytes: 10 * 1024 * 1024 * 1024,
            max_memory_payload_bytes: 50 * 1024 * 1024,
            warning_threshold_percent: 80.0,
            error_threshold_percent: 95.0,
            window_size: DEFAULT_WINDOW_SIZE,
            io_timeout: None,
        }
    }

    /// Set the ceiling for total managed bytes (builder style)
    pub fn with_max_managed_bytes(mut self, max: u64) -> Self {
        self.max_managed_bytes = max;
        self
    }

    /// Set the ceiling for a single memory payload (builder style)
    pub fn with_max_memory_payload_bytes(mut self, max: u64) -> Self {
        self.max_memory_payload_bytes = max;
        self
    }

    /// Set the warning and error usage thresholds (builder style)
    pub fn with_thresholds(mut self, warning: f64, error: f64) -> Self {
        self.warning_threshold_percent = warning;
        self.error_threshold_percent = error;
        self
    }

    /// Set the streaming window size (builder style)
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set a deadline for individual streaming operations (builder style)
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Full path of the managed content directory.
    pub fn content_dir(&self) -> PathBuf {
        self.base_path.join(&self.content_dir_name)
    }

    /// Path a managed copy with the given id is stored at.
    pub fn managed_path(&self, id: &str) -> PathBuf {
        self.content_dir().join(id)
    }

    /// Validate threshold ordering and limits.
    pub fn validate(&self) -> Result<()> {
        if self.max_managed_bytes == 0 {
            return Err(StoreError::validation("max_managed_bytes must be non-zero"));
        }
        if self.max_memory_payload_bytes == 0 {
            return Err(StoreError::validation(
                "max_memory_payload_bytes must be non-zero",
            ));
        }
        if self.window_size == 0 {
            return Err(StoreError::validation("window_size must be non-zero"));
        }
        if !(0.0..=100.0).contains(&self.warning_threshold_percent)
            || !(0.0..=100.0).contains(&self.error_threshold_percent)
        {
            return Err(StoreError::validation(
                "thresholds must be between 0 and 100",
            ));
        }
        if self.error_threshold_percent <= self.warning_threshold_percent {
            return Err(StoreError::validation(format!(
                "error threshold ({}) must be greater than warning threshold ({})",
                self.error_threshold_percent, self.warning_threshold_percent
            )));
        }
        Ok(())
    }
}

/// Options for a single streaming operation, carried down into
/// [`streaming`](crate::streaming) primitives.
pub struct StreamOptions {
    /// Window size in bytes
    pub window_size: usize,
    /// Optional deadline for the whole operation
    pub timeout: Option<Duration>,
    /// Optional progress callback invoked with (cumulative, total) bytes
    /// after each window; `total` is `None` when the source size is unknown
    pub progress: Option<Box<dyn Fn(u64, Option<u64>) + Send + Sync>>,
}

impl StreamOptions {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            timeout: None,
            progress: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Derive streaming options from a store configuration.
    pub fn from_config(config: &ContentStoreConfig) -> Self {
        Self {
            window_size: config.window_size,
            timeout: config.io_timeout,
            progress: None,
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("window_size", &self.window_size)
            .field("timeout", &self.timeout)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ContentStoreConfig::new("/tmp/store");
        assert_eq!(config.warning_threshold_percent, 80.0);
        assert_eq!(config.error_threshold_percent, 95.0);
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.content_dir(), PathBuf::from("/tmp/store/content"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_methods() {
        let config = ContentStoreConfig::new("/tmp/store")
            .with_max_managed_bytes(1024)
            .with_max_memory_payload_bytes(256)
            .with_thresholds(50.0, 75.0)
            .with_window_size(4096)
            .with_io_timeout(Duration::from_secs(5));

        assert_eq!(config.max_managed_bytes, 1024);
        assert_eq!(config.max_memory_payload_bytes, 256);
        assert_eq!(config.warning_threshold_percent, 50.0);
        assert_eq!(config.error_threshold_percent, 75.0);
        assert_eq!(config.window_size, 4096);
        assert_eq!(config.io_timeout, Some(Duration::from_secs(5)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_inverted_thresholds() {
        let config = ContentStoreConfig::new("/tmp/store").with_thresholds(95.0, 80.0);
        assert!(config.validate().is_err());

        // Equal thresholds are also invalid
        let config = ContentStoreConfig::new("/tmp/store").with_thresholds(90.0, 90.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_limits() {
        assert!(
            ContentStoreConfig::new("/tmp/store")
                .with_max_managed_bytes(0)
                .validate()
                .is_err()
        );
        assert!(
            ContentStoreConfig::new("/tmp/store")
                .with_window_size(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_managed_path() {
        let config = ContentStoreConfig::new("/tmp/store");
        assert_eq!(
            config.managed_path("abc123"),
            PathBuf::from("/tmp/store/content/abc123")
        );
    }
}
