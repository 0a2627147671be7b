//! Dominant-color palette extraction for uploaded images.
//!
//! Extraction is best-effort: any decode or processing fault is logged and
//! yields an empty palette, so it can never fail an upload.

use super::quantize::{quantize, Rgb, MAX_COLORS};
use bytes::Bytes;
use galleria_core::constants::{DEFAULT_PALETTE_COLOR_COUNT, DEFAULT_PALETTE_QUALITY};
use galleria_core::PaletteConfig;
use image::imageops::FilterType;
use image::{GenericImageView, RgbaImage};
use thiserror::Error;

/// Images are shrunk to fit this square before sampling.
pub const SAMPLE_MAX_DIMENSION: u32 = 200;
/// Samples with lower alpha are treated as transparent.
pub const MIN_ALPHA: u8 = 125;
/// Samples with every channel above this are treated as background.
pub const NEAR_WHITE: u8 = 250;

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Color count must be between 1 and 256, got {0}")]
    InvalidCount(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteOptions {
    /// Number of colors requested.
    pub color_count: usize,
    /// Sampling stride: 1 samples every pixel, 10 every tenth.
    pub quality: usize,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            color_count: DEFAULT_PALETTE_COLOR_COUNT,
            quality: DEFAULT_PALETTE_QUALITY,
        }
    }
}

impl From<PaletteConfig> for PaletteOptions {
    fn from(config: PaletteConfig) -> Self {
        Self {
            color_count: config.color_count,
            quality: config.quality,
        }
    }
}

/// Format a color as `#rrggbb`.
pub fn to_hex([r, g, b]: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Every `quality`-th pixel in row-major order, skipping transparent and
/// near-white samples. A quality of 0 samples every pixel.
pub fn sample_pixels(image: &RgbaImage, quality: usize) -> Vec<Rgb> {
    image
        .pixels()
        .step_by(quality.max(1))
        .filter(|p| p[3] >= MIN_ALPHA)
        .filter(|p| !(p[0] > NEAR_WHITE && p[1] > NEAR_WHITE && p[2] > NEAR_WHITE))
        .map(|p| [p[0], p[1], p[2]])
        .collect()
}

/// Decode `data` and compute its palette, surfacing every failure.
pub fn try_extract_palette(data: &[u8], options: PaletteOptions) -> Result<Vec<String>, PaletteError> {
    if options.color_count == 0 || options.color_count > MAX_COLORS {
        return Err(PaletteError::InvalidCount(options.color_count));
    }

    let mut img = image::load_from_memory(data)?;
    let (width, height) = img.dimensions();
    // Only shrinks. Smaller images are sampled at native size, never upscaled.
    if width > SAMPLE_MAX_DIMENSION || height > SAMPLE_MAX_DIMENSION {
        img = img.resize(SAMPLE_MAX_DIMENSION, SAMPLE_MAX_DIMENSION, FilterType::Triangle);
    }

    let pixels = sample_pixels(&img.to_rgba8(), options.quality);
    if pixels.is_empty() {
        return Ok(Vec::new());
    }

    Ok(quantize(&pixels, options.color_count)
        .into_iter()
        .map(to_hex)
        .collect())
}

/// Palette of `data` as `#rrggbb` strings, most representative first.
///
/// Returns an empty palette when the image cannot be decoded, has no
/// opaque non-white pixels, or the options are out of range.
pub fn extract_palette(data: &[u8], options: PaletteOptions) -> Vec<String> {
    match try_extract_palette(data, options) {
        Ok(palette) => palette,
        Err(e) => {
            tracing::warn!(
                error = %e,
                size_bytes = data.len(),
                "Failed to extract dominant colors"
            );
            Vec::new()
        }
    }
}

/// [`extract_palette`] on the blocking pool.
pub async fn extract_palette_blocking(data: Bytes, options: PaletteOptions) -> Vec<String> {
    match tokio::task::spawn_blocking(move || extract_palette(&data, options)).await {
        Ok(palette) => palette,
        Err(e) => {
            tracing::warn!(error = %e, "Palette extraction task failed");
            Vec::new()
        }
    }
}
