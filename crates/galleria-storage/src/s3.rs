use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::types::{ListOptions, ListResult, MoveResult, StorageFile};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use galleria_core::constants::{DEFAULT_LIST_LIMIT, DEFAULT_R2_REGION};
use galleria_core::R2StorageConfig;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use percent_encoding::percent_decode_str;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectMeta, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::sync::Arc;
use std::time::Instant;

/// S3-compatible storage implementation (Cloudflare R2, MinIO, AWS S3)
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    public_url: Option<String>,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

/// Object location for `key`; each segment is escaped by `object_store`.
fn object_path(key: &str) -> Path {
    Path::from(key)
}

/// Inverse of [`object_path`]: the key a listed location was stored under.
fn key_of(location: &Path) -> String {
    location
        .parts()
        .map(|part| percent_decode_str(part.as_ref()).decode_utf8_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl S3Storage {
    /// Create a new S3Storage instance from R2 settings
    ///
    /// Endpoint, credentials and bucket are required. The region defaults to
    /// `auto`, which is what R2 expects.
    pub fn new(config: &R2StorageConfig) -> StorageResult<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| StorageError::ConfigError(format!("{} is required for r2 storage", name)))
        };
        let endpoint = required(&config.endpoint, "R2_ENDPOINT")?;
        let access_key_id = required(&config.access_key_id, "R2_ACCESS_KEY_ID")?;
        let secret_access_key = required(&config.secret_access_key, "R2_SECRET_ACCESS_KEY")?;
        let bucket = required(&config.bucket, "R2_BUCKET")?;
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_R2_REGION.to_string());

        let store = AmazonS3Builder::new()
            .with_endpoint(endpoint.clone())
            .with_allow_http(endpoint.starts_with("http://"))
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store: Arc::new(store),
            bucket,
            region,
            endpoint_url: Some(endpoint),
            public_url: config.public_url.clone(),
        })
    }

    /// Wrap an already-built object store
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        endpoint_url: Option<String>,
        public_url: Option<String>,
    ) -> Self {
        S3Storage {
            store,
            bucket: bucket.into(),
            region: DEFAULT_R2_REGION.to_string(),
            endpoint_url,
            public_url,
        }
    }

    /// Generate public URL for an object
    ///
    /// Uses the public base URL when configured, otherwise the path-style
    /// `{endpoint}/{bucket}/{key}`.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref public_url) = self.public_url {
            keys::join_url(public_url, [key])
        } else if let Some(ref endpoint) = self.endpoint_url {
            keys::join_url(endpoint, [self.bucket.as_str(), key])
        } else {
            // Standard AWS S3 URL format
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.store.head(&object_path(key)).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::move_failed(
                format!("Failed to check {} in {}", key, self.bucket),
                e,
            )),
        }
    }

    /// Copy `from_key` to `to_key`, then delete the source. If the source
    /// cannot be deleted the copy is removed again so only one object remains.
    async fn copy_then_delete(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let from = object_path(from_key);
        let to = object_path(to_key);

        let copy_result: ObjectResult<_> = self.store.copy(&from, &to).await;
        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(from_key.to_string()),
            other => StorageError::move_failed(
                format!("Failed to copy {} to {}", from_key, to_key),
                other,
            ),
        })?;

        if let Err(e) = self.store.delete(&from).await {
            if let Err(cleanup) = self.store.delete(&to).await {
                tracing::error!(
                    bucket = %self.bucket,
                    key = %to_key,
                    error = %cleanup,
                    "Failed to remove copy after source delete failure"
                );
            }
            return Err(StorageError::move_failed(
                format!("Failed to delete {} after copying it", from_key),
                e,
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::R2
    }

    fn validate_config(&self) -> StorageResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "Bucket name must not be empty".to_string(),
            ));
        }
        if let Some(ref public_url) = self.public_url {
            if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
                return Err(StorageError::ConfigError(format!(
                    "Public URL must be absolute: {}",
                    public_url
                )));
            }
        }
        Ok(())
    }

    fn key_for(&self, filename: &str, subfolder: Option<&str>) -> StorageResult<String> {
        keys::object_key(subfolder, filename)
    }

    fn get_url(&self, filename: &str, subfolder: Option<&str>) -> String {
        self.generate_url(&keys::join_segments(subfolder.into_iter().chain([filename])))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> StorageResult<()> {
        keys::validate_key(key)?;
        let size = data.len() as u64;
        let location = object_path(key);
        let start = Instant::now();

        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), opts)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::write_failed(format!("Failed to write {}", key), e)
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        keys::validate_key(key)?;
        let start = Instant::now();
        let location = object_path(key);

        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::delete_failed(
                    format!("Failed to delete {}", key),
                    e,
                ));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        keys::validate_key(key)?;
        let start = Instant::now();
        let location = object_path(key);

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::download_failed(format!("Failed to read {}", key), other)
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to read {}", key), e))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes.to_vec())
    }

    async fn move_file(
        &self,
        old_key: &str,
        new_subfolder: &str,
        thumbnail_key: Option<&str>,
    ) -> StorageResult<MoveResult> {
        keys::validate_key(old_key)?;
        let start = Instant::now();
        let filename = keys::filename_of(old_key);
        let new_key = self.key_for(filename, Some(new_subfolder))?;

        let thumbnail = match thumbnail_key {
            Some(thumb_key) => {
                keys::validate_key(thumb_key)?;
                let thumb_name = keys::filename_of(thumb_key);
                Some((thumb_key, self.key_for(thumb_name, Some(new_subfolder))?))
            }
            None => None,
        };

        if old_key == new_key {
            if !self.exists(old_key).await? {
                return Err(StorageError::NotFound(old_key.to_string()));
            }
        } else {
            self.copy_then_delete(old_key, &new_key).await?;
        }

        let mut result = MoveResult {
            new_url: self.generate_url(&new_key),
            new_key,
            new_thumbnail_key: None,
            new_thumbnail_url: None,
        };

        if let Some((thumb_key, new_thumb_key)) = thumbnail {
            let thumb_exists = self.exists(thumb_key).await?;
            if thumb_exists && thumb_key != new_thumb_key {
                if let Err(e) = self.copy_then_delete(thumb_key, &new_thumb_key).await {
                    if old_key != result.new_key {
                        if let Err(rollback) = self.copy_then_delete(&result.new_key, old_key).await {
                            tracing::error!(
                                bucket = %self.bucket,
                                key = %old_key,
                                error = %rollback,
                                "Failed to restore original after thumbnail move failure"
                            );
                        }
                    }
                    return Err(StorageError::move_failed(
                        format!("Failed to move thumbnail {}", thumb_key),
                        e,
                    ));
                }
            }
            if thumb_exists {
                result.new_thumbnail_url = Some(self.generate_url(&new_thumb_key));
                result.new_thumbnail_key = Some(new_thumb_key);
            } else {
                tracing::debug!(thumbnail_key = %thumb_key, "Thumbnail not found, moving original only");
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            old_key = %old_key,
            new_key = %result.new_key,
            new_thumbnail_key = ?result.new_thumbnail_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 move successful"
        );

        Ok(result)
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let start = Instant::now();
        let prefix = match options
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
        {
            Some(p) => {
                keys::validate_relative_path(p)?;
                Some(object_path(p))
            }
            None => None,
        };
        let limit = options.page_size(DEFAULT_LIST_LIMIT, DEFAULT_LIST_LIMIT);

        let stream = match options.cursor.as_deref() {
            Some(cursor) => {
                keys::validate_key(cursor)?;
                self.store
                    .list_with_offset(prefix.as_ref(), &object_path(cursor))
            }
            None => self.store.list(prefix.as_ref()),
        };

        let mut objects: Vec<ObjectMeta> = stream
            .take(limit + 1)
            .try_collect()
            .await
            .map_err(|e| {
                StorageError::list_failed(format!("Failed to list bucket {}", self.bucket), e)
            })?;

        let has_more = objects.len() > limit;
        objects.truncate(limit);

        let files: Vec<StorageFile> = objects
            .into_iter()
            .map(|meta| {
                let key = key_of(&meta.location);
                StorageFile {
                    url: self.generate_url(&key),
                    key,
                    size: meta.size,
                    last_modified: Some(meta.last_modified),
                }
            })
            .collect();

        let cursor = if has_more {
            files.last().map(|f| f.key.clone())
        } else {
            None
        };

        tracing::debug!(
            bucket = %self.bucket,
            prefix = ?prefix,
            returned = files.len(),
            has_more,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list"
        );

        Ok(ListResult {
            files,
            cursor,
            has_more,
        })
    }
}
