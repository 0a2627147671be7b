//! Galleria Processing Library
//!
//! Color analysis and image inspection for gallery uploads, plus the ingest
//! pipeline that stores an asset while its palette is extracted.

pub mod color;
pub mod image;
pub mod metadata;
pub mod upload;

pub use color::{
    extract_palette, extract_palette_blocking, quantize, to_hex, try_extract_palette,
    PaletteError, PaletteOptions, Rgb,
};
pub use crate::image::ImageProcessor;
pub use metadata::ImageMetadata;
pub use upload::{check_filename, ingest, IngestResult};
