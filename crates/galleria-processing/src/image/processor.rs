//! Image processor - header-only metadata extraction

use crate::metadata::ImageMetadata;
use image::ImageReader;
use std::io::Cursor;

pub struct ImageProcessor;

impl ImageProcessor {
    /// Report dimensions and detected format, reading only the image header.
    pub fn extract_metadata(data: &[u8]) -> Result<ImageMetadata, anyhow::Error> {
        let cursor = Cursor::new(data);
        let reader = ImageReader::new(cursor).with_guessed_format()?;
        let format = reader
            .format()
            .map(|f| format!("{:?}", f))
            .unwrap_or_else(|| "unknown".to_string());
        let (width, height) = reader.into_dimensions()?;

        Ok(ImageMetadata {
            width,
            height,
            format,
            size_bytes: Some(data.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn create_test_image() -> Vec<u8> {
        let img = RgbaImage::from_pixel(100, 60, Rgba([255, 0, 0, 255]));
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        buffer
    }

    #[test]
    fn test_extract_metadata() {
        let image_data = create_test_image();

        let metadata = ImageProcessor::extract_metadata(&image_data).unwrap();

        assert_eq!(metadata.width, 100);
        assert_eq!(metadata.height, 60);
        assert_eq!(metadata.format, "Png");
        assert_eq!(metadata.size_bytes, Some(image_data.len() as u64));
    }

    #[test]
    fn test_extract_metadata_invalid_image() {
        assert!(ImageProcessor::extract_metadata(b"not an image").is_err());
    }
}
