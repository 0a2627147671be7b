#[cfg(feature = "storage-github")]
use crate::GithubStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use galleria_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
///
/// The provider is chosen once from `config.storage.provider`; the returned
/// backend has already passed `validate_config`.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let backend = config.storage_backend();

    let storage: Arc<dyn Storage> = match backend {
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => Arc::new(LocalStorage::from_config(&config.storage.local).await?),

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-s3")]
        StorageBackend::R2 => Arc::new(S3Storage::new(&config.storage.r2)?),

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::R2 => {
            return Err(StorageError::ConfigError(
                "R2 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-github")]
        StorageBackend::Github => Arc::new(GithubStorage::new(&config.storage.github)?),

        #[cfg(not(feature = "storage-github"))]
        StorageBackend::Github => {
            return Err(StorageError::ConfigError(
                "GitHub storage backend not available (storage-github feature not enabled)"
                    .to_string(),
            ))
        }
    };

    storage.validate_config()?;

    tracing::info!(backend = %backend, "Storage backend initialized");

    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleria_core::{GithubStorageConfig, LocalStorageConfig, PaletteConfig, StorageConfig};

    fn config(storage: StorageConfig) -> Config {
        Config {
            environment: "test".to_string(),
            storage,
            palette: PaletteConfig::default(),
        }
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_creates_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let storage = create_storage(&config(StorageConfig {
            local: LocalStorageConfig {
                base_path: dir.path().to_string_lossy().into_owned(),
                base_url: "/uploads".to_string(),
            },
            ..StorageConfig::default()
        }))
        .await
        .unwrap();

        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert_eq!(storage.get_url("a.jpg", Some("x")), "/uploads/x/a.jpg");
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn test_r2_without_credentials_is_config_error() {
        let result = create_storage(&config(StorageConfig {
            provider: StorageBackend::R2,
            ..StorageConfig::default()
        }))
        .await;

        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[cfg(feature = "storage-github")]
    #[tokio::test]
    async fn test_creates_github_backend() {
        let storage = create_storage(&config(StorageConfig {
            provider: StorageBackend::Github,
            github: GithubStorageConfig {
                token: Some("ghp_test".to_string()),
                repo: Some("alice/photos".to_string()),
                ..GithubStorageConfig::default()
            },
            ..StorageConfig::default()
        }))
        .await
        .unwrap();

        assert_eq!(storage.backend_type(), StorageBackend::Github);
    }

    #[cfg(feature = "storage-github")]
    #[tokio::test]
    async fn test_github_rejects_relative_cdn_url() {
        let result = create_storage(&config(StorageConfig {
            provider: StorageBackend::Github,
            github: GithubStorageConfig {
                token: Some("ghp_test".to_string()),
                repo: Some("alice/photos".to_string()),
                cdn_url: Some("cdn.example.com".to_string()),
                ..GithubStorageConfig::default()
            },
            ..StorageConfig::default()
        }))
        .await;

        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
