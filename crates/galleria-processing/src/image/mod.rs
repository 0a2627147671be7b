//! Image processing module
//!
//! Decoding and metadata extraction for uploaded images.

pub mod processor;

pub use processor::ImageProcessor;
