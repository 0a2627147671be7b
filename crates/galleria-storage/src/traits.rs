//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement,
//! together with the error type every operation reports through.
//!
//! Error policy:
//! - `upload`, `download`, `move_file` and `list` return typed errors to the caller.
//! - `delete` never fails from the caller's point of view. Deletion follows the
//!   removal of a metadata row and must not be blocked by a storage inconsistency,
//!   so failures are captured as [`StorageErrorKind::DeleteFailed`] and logged.

use crate::types::{ListOptions, ListResult, MoveResult, UploadInput, UploadResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Instant;
use thiserror::Error;

/// Underlying cause attached to a storage error
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {message}")]
    WriteFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Read failed: {message}")]
    DownloadFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Move failed: {message}")]
    MoveFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Delete failed: {message}")]
    DeleteFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("List failed: {message}")]
    ListFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Stable, machine-readable classification of a [`StorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    WriteFailed,
    ReadFailed,
    NotFound,
    MoveFailed,
    /// Produced by best-effort deletes. Logged, never returned from `delete`.
    DeleteFailed,
    ListFailed,
    InvalidKey,
    ConfigInvalid,
}

impl StorageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorKind::WriteFailed => "write-failed",
            StorageErrorKind::ReadFailed => "read-failed",
            StorageErrorKind::NotFound => "not-found",
            StorageErrorKind::MoveFailed => "move-failed",
            StorageErrorKind::DeleteFailed => "delete-failed",
            StorageErrorKind::ListFailed => "list-failed",
            StorageErrorKind::InvalidKey => "invalid-key",
            StorageErrorKind::ConfigInvalid => "config-invalid",
        }
    }
}

impl Display for StorageErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::WriteFailed { .. } => StorageErrorKind::WriteFailed,
            StorageError::DownloadFailed { .. } => StorageErrorKind::ReadFailed,
            StorageError::NotFound(_) => StorageErrorKind::NotFound,
            StorageError::MoveFailed { .. } => StorageErrorKind::MoveFailed,
            StorageError::DeleteFailed { .. } => StorageErrorKind::DeleteFailed,
            StorageError::ListFailed { .. } => StorageErrorKind::ListFailed,
            StorageError::InvalidKey(_) => StorageErrorKind::InvalidKey,
            StorageError::ConfigError(_) => StorageErrorKind::ConfigInvalid,
        }
    }

    pub fn write_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::WriteFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn download_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::DownloadFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn move_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::MoveFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn delete_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::DeleteFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn list_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::ListFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == StorageErrorKind::NotFound
    }

    /// Message followed by the chain of underlying causes.
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();
        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }
        details
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// Every backend (local filesystem, S3-compatible bucket, GitHub repository)
/// implements this trait. Callers address assets by the opaque key returned
/// from `upload`/`move_file` and never by backend path.
///
/// Backends implement the primitives (`put`, `remove`, `download`, `move_file`,
/// `list`, `get_url`, `key_for`); `upload` and `delete` are provided on top of
/// them so the pairing rules for originals and thumbnails hold everywhere.
///
/// Calls on the same key are not serialized. Two concurrent moves of one key,
/// or a delete racing a list, may interleave arbitrarily.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Check the backend's configuration without touching the network.
    fn validate_config(&self) -> StorageResult<()>;

    /// Backend key for `filename` stored under `subfolder`.
    fn key_for(&self, filename: &str, subfolder: Option<&str>) -> StorageResult<String>;

    /// Public URL for `filename` under `subfolder`. Pure; performs no I/O.
    fn get_url(&self, filename: &str, subfolder: Option<&str>) -> String;

    /// Write `data` at `key`, creating or replacing it and any missing parents.
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> StorageResult<()>;

    /// Remove `key`. Absence is not an error.
    ///
    /// Failures are returned here for diagnostics; callers wanting the
    /// best-effort contract use [`Storage::delete`].
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Download a file by its storage key
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Relocate `old_key` (and `thumbnail_key` when it exists) into
    /// `new_subfolder`, keeping filenames.
    ///
    /// A missing thumbnail is skipped. A thumbnail that exists but cannot be
    /// moved fails the whole operation after the original is put back.
    async fn move_file(
        &self,
        old_key: &str,
        new_subfolder: &str,
        thumbnail_key: Option<&str>,
    ) -> StorageResult<MoveResult>;

    /// Enumerate stored files under `options.prefix`, one page at a time.
    async fn list(&self, options: ListOptions) -> StorageResult<ListResult>;

    /// Store `file` and, when given, its thumbnail.
    ///
    /// Both are stored or neither is: if the thumbnail write fails the
    /// original is removed again before the error is returned.
    async fn upload(
        &self,
        file: UploadInput,
        thumbnail: Option<UploadInput>,
    ) -> StorageResult<UploadResult> {
        let key = self.key_for(&file.filename, file.subfolder.as_deref())?;
        let thumbnail_key = thumbnail
            .as_ref()
            .map(|t| self.key_for(&t.filename, t.subfolder.as_deref()))
            .transpose()?;
        if thumbnail_key.as_deref() == Some(key.as_str()) {
            return Err(StorageError::InvalidKey(format!(
                "Thumbnail would overwrite the original at {}",
                key
            )));
        }

        let start = Instant::now();
        let size = file.data.len();

        self.put(&key, file.data, file.content_type.as_deref())
            .await?;

        let mut result = UploadResult {
            url: self.get_url(&file.filename, file.subfolder.as_deref()),
            key,
            thumbnail_url: None,
            thumbnail_key: None,
        };

        if let (Some(thumb), Some(thumb_key)) = (thumbnail, thumbnail_key) {
            if let Err(e) = self
                .put(&thumb_key, thumb.data, thumb.content_type.as_deref())
                .await
            {
                if let Err(cleanup) = self.remove(&result.key).await {
                    tracing::warn!(
                        backend = %self.backend_type(),
                        key = %result.key,
                        error = %cleanup,
                        "Failed to roll back original after thumbnail write failure"
                    );
                }
                return Err(e);
            }
            result.thumbnail_url = Some(self.get_url(&thumb.filename, thumb.subfolder.as_deref()));
            result.thumbnail_key = Some(thumb_key);
        }

        tracing::info!(
            backend = %self.backend_type(),
            key = %result.key,
            thumbnail_key = ?result.thumbnail_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload successful"
        );

        Ok(result)
    }

    /// Best-effort delete of `key` and its thumbnail. Never fails.
    async fn delete(&self, key: &str, thumbnail_key: Option<&str>) {
        for target in std::iter::once(key).chain(thumbnail_key) {
            if let Err(e) = self.remove(target).await {
                tracing::warn!(
                    backend = %self.backend_type(),
                    key = %target,
                    kind = %e.kind(),
                    error = %e.detailed_message(),
                    "Best-effort delete failed, asset left in place"
                );
            }
        }
    }
}
