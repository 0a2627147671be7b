//! Ingest pipeline: store the asset while its palette and metadata are extracted.
//!
//! The storage write and the CPU-bound analysis run concurrently. The write
//! decides the outcome: if it fails the ingest fails and no analysis result is
//! returned. Analysis faults never fail an ingest; they produce an empty
//! palette and no metadata.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Instant;

use galleria_storage::{Storage, UploadInput};

use super::types::IngestResult;
use crate::color::{extract_palette, PaletteOptions};
use crate::image::ImageProcessor;
use crate::metadata::ImageMetadata;

/// Longest filename accepted by [`ingest`].
pub const MAX_FILENAME_LEN: usize = 255;

/// Reject filenames that are not a plain `[A-Za-z0-9._-]` segment.
///
/// Names are checked, never rewritten, so two distinct inputs can't be
/// mapped onto the same storage key.
pub fn check_filename(filename: &str) -> Result<()> {
    let plain = filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if filename.is_empty()
        || filename.len() > MAX_FILENAME_LEN
        || filename.starts_with('.')
        || filename.contains("..")
        || !plain
    {
        bail!("Unsupported filename {:?}: use letters, digits, '.', '-' or '_'", filename);
    }
    Ok(())
}

fn analyse(data: &[u8], options: PaletteOptions) -> (Vec<String>, Option<ImageMetadata>) {
    let metadata = match ImageProcessor::extract_metadata(data) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            tracing::warn!(error = %e, size_bytes = data.len(), "Failed to read image metadata");
            None
        }
    };
    (extract_palette(data, options), metadata)
}

/// Store `file` (and its optional thumbnail) and extract the file's palette.
pub async fn ingest(
    storage: Arc<dyn Storage>,
    file: UploadInput,
    thumbnail: Option<UploadInput>,
    options: PaletteOptions,
) -> Result<IngestResult> {
    let start = Instant::now();

    check_filename(&file.filename)?;
    if let Some(thumb) = &thumbnail {
        check_filename(&thumb.filename).context("Invalid thumbnail filename")?;
    }

    let data = file.data.clone();
    let size_bytes = data.len();
    let analysis = tokio::task::spawn_blocking(move || analyse(&data, options));

    let (uploaded, analysis) = tokio::join!(storage.upload(file, thumbnail), analysis);

    let upload = uploaded
        .map_err(anyhow::Error::from)
        .context("Storage upload failed")?;

    let (palette, metadata) = analysis.unwrap_or_else(|e| {
        tracing::warn!(key = %upload.key, error = %e, "Image analysis task failed");
        (Vec::new(), None)
    });

    tracing::info!(
        backend = %storage.backend_type(),
        key = %upload.key,
        size_bytes = size_bytes,
        colors = palette.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Ingest complete"
    );

    Ok(IngestResult {
        upload,
        palette,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleria_storage::LocalStorage;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    async fn local() -> (tempfile::TempDir, Arc<dyn Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads").await.unwrap();
        (dir, Arc::new(storage))
    }

    #[test]
    fn test_check_filename() {
        assert!(check_filename("sunset.jpg").is_ok());
        assert!(check_filename("IMG_0001-edit.v2.png").is_ok());
        assert!(check_filename("a").is_ok());
        assert!(check_filename("my photo.jpg").is_err());
        assert!(check_filename("/etc/passwd").is_err());
        assert!(check_filename("a..jpg").is_err());
        assert!(check_filename(".hidden").is_err());
        assert!(check_filename("").is_err());
        assert!(check_filename(&"a".repeat(256)).is_err());
    }

    #[tokio::test]
    async fn test_ingest_never_overwrites_original_with_thumbnail() {
        let (_dir, storage) = local().await;

        let err = ingest(
            storage.clone(),
            UploadInput::new("my photo.jpg", b"ORIGINAL".to_vec()),
            Some(UploadInput::new("my_photo.jpg", b"THUMB".to_vec())),
            PaletteOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported filename"));

        let err = ingest(
            storage.clone(),
            UploadInput::new("my_photo.jpg", b"ORIGINAL".to_vec()),
            Some(UploadInput::new("my_photo.jpg", b"THUMB".to_vec())),
            PaletteOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Storage upload failed"));

        assert!(storage.download("my_photo.jpg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_ingest_stores_and_analyses() {
        let (_dir, storage) = local().await;
        let data = png(40, 30, [200, 16, 16, 255]);

        let result = ingest(
            storage.clone(),
            UploadInput::new("red.png", data.clone())
                .with_subfolder("2024/06")
                .with_content_type("image/png"),
            Some(UploadInput::new("red_thumb.png", png(4, 3, [200, 16, 16, 255])).with_subfolder("2024/06")),
            PaletteOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.upload.key, "2024/06/red.png");
        assert_eq!(result.upload.url, "/uploads/2024/06/red.png");
        assert_eq!(result.upload.thumbnail_key.as_deref(), Some("2024/06/red_thumb.png"));
        assert_eq!(result.palette, vec!["#cc1414".to_string()]);

        let metadata = result.metadata.unwrap();
        assert_eq!((metadata.width, metadata.height), (40, 30));
        assert_eq!(metadata.format, "Png");

        assert_eq!(storage.download("2024/06/red.png").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_ingest_non_image_still_uploads() {
        let (_dir, storage) = local().await;

        let result = ingest(
            storage.clone(),
            UploadInput::new("notes.txt", b"not an image".to_vec()),
            None,
            PaletteOptions::default(),
        )
        .await
        .unwrap();

        assert!(result.palette.is_empty());
        assert!(result.metadata.is_none());
        assert_eq!(storage.download("notes.txt").await.unwrap(), b"not an image".to_vec());
    }

    #[tokio::test]
    async fn test_ingest_fails_when_upload_fails() {
        let (_dir, storage) = local().await;

        let err = ingest(
            storage,
            UploadInput::new("red.png", png(8, 8, [200, 16, 16, 255])).with_subfolder("../outside"),
            None,
            PaletteOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("Storage upload failed"));
    }

    #[tokio::test]
    async fn test_ingest_result_serializes_flat() {
        let (_dir, storage) = local().await;

        let result = ingest(
            storage,
            UploadInput::new("blue.png", png(10, 10, [0, 0, 200, 255])),
            None,
            PaletteOptions::default(),
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["key"], "blue.png");
        assert_eq!(json["palette"][0], "#0404cc");
        assert_eq!(json["metadata"]["width"], 10);
        assert!(json.get("thumbnail_key").is_none());
    }
}
