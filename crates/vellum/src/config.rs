//! Session configuration with sensible defaults.
//!
//! [`StudioConfig`] captures the settings the engine needs: which model to
//! call and how, where history is persisted and how much space it may take,
//! and how transient failures are retried. Binaries fill it from CLI flags.

use std::path::PathBuf;

use crate::api::retry::RetryConfig;

/// Default storage quota, mirroring a browser's local-storage budget.
pub const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for a studio session.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Model identifier. Default: [`DEFAULT_MODEL`](crate::DEFAULT_MODEL).
    pub model: String,
    /// Maximum tokens per response. Default: `32768`.
    pub max_tokens: u32,
    /// Sampling temperature for generation. Default: `0.7`.
    pub generate_temperature: f32,
    /// Sampling temperature for refinement. Default: `0.4`.
    pub refine_temperature: f32,
    /// File holding the persisted history. Default: `.vellum/history.json`.
    pub storage_path: PathBuf,
    /// Maximum size of the persisted history in bytes. Default: 5 MiB.
    pub storage_quota_bytes: usize,
    /// Retry policy for the synthesis service.
    pub retry: RetryConfig,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            max_tokens: 32768,
            generate_temperature: 0.7,
            refine_temperature: 0.4,
            storage_path: PathBuf::from(".vellum/history.json"),
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
            retry: RetryConfig::default(),
        }
    }
}

impl StudioConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn with_storage_quota(mut self, bytes: usize) -> Self {
        self.storage_quota_bytes = bytes;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
