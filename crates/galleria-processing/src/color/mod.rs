//! Color analysis
//!
//! - Median-cut quantization over RGB samples (quantize)
//! - Palette extraction from encoded image bytes (palette)

pub mod palette;
pub mod quantize;

pub use palette::{
    extract_palette, extract_palette_blocking, to_hex, try_extract_palette, PaletteError,
    PaletteOptions,
};
pub use quantize::{quantize, Rgb};
