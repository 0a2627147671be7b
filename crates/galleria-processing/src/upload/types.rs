//! Types for the ingest pipeline.

use crate::metadata::ImageMetadata;
use galleria_storage::UploadResult;
use serde::Serialize;

/// Everything the caller needs to record a newly ingested photo.
#[derive(Clone, Debug, Serialize)]
pub struct IngestResult {
    #[serde(flatten)]
    pub upload: UploadResult,
    /// Dominant colors as `#rrggbb`, most representative first. Empty when
    /// the image could not be analysed.
    pub palette: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMetadata>,
}
