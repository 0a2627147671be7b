//! Galleria Storage Library
//!
//! This crate provides the storage abstraction for gallery assets and its
//! implementations for the local filesystem, S3-compatible buckets (R2) and
//! GitHub repositories.
//!
//! # Storage key format
//!
//! All backends use the same key layout: `{subfolder}/{filename}`, or the bare
//! filename without a subfolder. The GitHub backend additionally prefixes its
//! configured repository path. Keys must not contain `..` or a leading `/`; key
//! generation is centralized in the `keys` module so all backends stay consistent.

pub mod batch;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-github")]
pub mod github;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use batch::{delete_many, move_many, BatchItem, BatchOutcome};
pub use factory::create_storage;
pub use galleria_core::StorageBackend;
#[cfg(feature = "storage-github")]
pub use github::GithubStorage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageErrorKind, StorageResult};
pub use types::{ListOptions, ListResult, MoveResult, StorageFile, UploadInput, UploadResult};
