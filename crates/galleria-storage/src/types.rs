//! Value types exchanged across the storage contract.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A file handed to `upload`. Built by the caller per call.
#[derive(Debug, Clone)]
pub struct UploadInput {
    /// Final path segment of the stored asset; unique within its subfolder.
    pub filename: String,
    pub data: Bytes,
    /// Destination folder relative to the backend root, without a leading `/`.
    pub subfolder: Option<String>,
    pub content_type: Option<String>,
}

impl UploadInput {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            subfolder: None,
            content_type: None,
        }
    }

    pub fn with_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        let subfolder = subfolder.into();
        self.subfolder = (!subfolder.trim_matches('/').is_empty()).then_some(subfolder);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Locators for an uploaded original and its optional thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub url: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,
}

/// New locators after a move. Thumbnail fields are set only when a
/// thumbnail existed and was moved with the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveResult {
    pub new_key: String,
    pub new_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_thumbnail_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_thumbnail_url: Option<String>,
}

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageFile {
    pub key: String,
    pub size: u64,
    /// `None` when the backend does not report modification times.
    pub last_modified: Option<DateTime<Utc>>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Restrict enumeration to this subtree.
    pub prefix: Option<String>,
    /// Token from a previous page taken with the same prefix.
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Requested page size, falling back to `default` for unset or zero.
    pub(crate) fn page_size(&self, default: usize, max: usize) -> usize {
        self.limit.filter(|&l| l > 0).unwrap_or(default).min(max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResult {
    pub files: Vec<StorageFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub has_more: bool,
}
