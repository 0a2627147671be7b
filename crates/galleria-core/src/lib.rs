//! Galleria Core Library
//!
//! This crate provides configuration and the shared storage backend type
//! used by every Galleria component.

pub mod config;
pub mod constants;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    Config, GithubStorageConfig, LocalStorageConfig, PaletteConfig, R2StorageConfig,
    StorageConfig,
};
pub use storage_types::StorageBackend;
