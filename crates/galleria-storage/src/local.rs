use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::types::{ListOptions, ListResult, MoveResult, StorageFile};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use galleria_core::constants::DEFAULT_LIST_LIMIT;
use galleria_core::LocalStorageConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Assets are plain files under `base_path`; a key is the path relative to it.
///
/// `list` pages with a numeric offset over a fresh depth-first walk. The walk
/// is deterministic for an unchanged tree, but files created or removed between
/// two page fetches shift the offsets, so a page may then skip or repeat entries.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

enum WalkItem {
    Dir(PathBuf, String),
    File(PathBuf, String),
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "public/uploads")
    /// * `base_url` - Base URL for serving files (e.g., "/uploads" or "http://localhost:3000/uploads")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url: base_url.into(),
        })
    }

    pub async fn from_config(config: &LocalStorageConfig) -> StorageResult<Self> {
        Self::new(&config.base_path, config.base_url.clone()).await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path, refusing keys that leave the base directory
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        keys::validate_key(storage_key)?;
        Ok(self.base_path.join(storage_key))
    }

    fn url_for_key(&self, key: &str) -> String {
        keys::join_url(&self.base_url, [key])
    }

    /// Ensure parent directory exists. Concurrent creation is not an error.
    async fn ensure_parent_dir(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn rename(&self, old_key: &str, from: &Path, to: &Path) -> StorageResult<()> {
        self.ensure_parent_dir(to).await.map_err(|e| {
            StorageError::move_failed(format!("Failed to create directory for {}", to.display()), e)
        })?;

        fs::rename(from, to).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(old_key.to_string())
            } else {
                StorageError::move_failed(
                    format!("Failed to rename {} to {}", from.display(), to.display()),
                    e,
                )
            }
        })
    }

    /// Depth-first walk below `prefix`, entries sorted by name in each directory.
    async fn walk(&self, prefix: Option<&str>) -> StorageResult<Vec<StorageFile>> {
        let root = match prefix {
            Some(p) => self.base_path.join(p),
            None => self.base_path.clone(),
        };
        let mut files = Vec::new();

        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(files),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => {
                return Err(StorageError::list_failed(
                    format!("Failed to stat {}", root.display()),
                    e,
                ))
            }
        }

        let mut stack = vec![WalkItem::Dir(root, prefix.unwrap_or_default().to_string())];

        while let Some(item) = stack.pop() {
            match item {
                WalkItem::Dir(dir, rel) => {
                    let mut entries = Vec::new();
                    let mut read_dir = fs::read_dir(&dir).await.map_err(|e| {
                        StorageError::list_failed(format!("Failed to read {}", dir.display()), e)
                    })?;
                    while let Some(entry) = read_dir.next_entry().await.map_err(|e| {
                        StorageError::list_failed(format!("Failed to read {}", dir.display()), e)
                    })? {
                        let is_dir = entry
                            .file_type()
                            .await
                            .map(|t| t.is_dir())
                            .unwrap_or(false);
                        let name = entry.file_name().to_string_lossy().into_owned();
                        entries.push((name, entry.path(), is_dir));
                    }
                    entries.sort_by(|a, b| a.0.cmp(&b.0));

                    for (name, path, is_dir) in entries.into_iter().rev() {
                        let child_rel = keys::join_segments([rel.as_str(), name.as_str()]);
                        stack.push(if is_dir {
                            WalkItem::Dir(path, child_rel)
                        } else {
                            WalkItem::File(path, child_rel)
                        });
                    }
                }
                WalkItem::File(path, rel) => {
                    let meta = match fs::metadata(&path).await {
                        Ok(meta) => meta,
                        // Removed since the directory was read
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => {
                            return Err(StorageError::list_failed(
                                format!("Failed to stat {}", path.display()),
                                e,
                            ))
                        }
                    };
                    files.push(StorageFile {
                        url: self.url_for_key(&rel),
                        key: rel,
                        size: meta.len(),
                        last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    });
                }
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn validate_config(&self) -> StorageResult<()> {
        // Local storage requires no special config
        Ok(())
    }

    fn key_for(&self, filename: &str, subfolder: Option<&str>) -> StorageResult<String> {
        keys::object_key(subfolder, filename)
    }

    fn get_url(&self, filename: &str, subfolder: Option<&str>) -> String {
        keys::join_url(&self.base_url, subfolder.into_iter().chain([filename]))
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: Option<&str>) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let size = data.len();
        let start = Instant::now();

        self.ensure_parent_dir(&path).await.map_err(|e| {
            StorageError::write_failed(
                format!("Failed to create directory for {}", path.display()),
                e,
            )
        })?;

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::write_failed(format!("Failed to create file {}", path.display()), e)
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::write_failed(format!("Failed to write file {}", path.display()), e)
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::write_failed(format!("Failed to sync file {}", path.display()), e)
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(key = %key, "Local storage delete skipped, file already gone");
                Ok(())
            }
            Err(e) => Err(StorageError::delete_failed(
                format!("Failed to delete file {}", path.display()),
                e,
            )),
        }
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(key)?;
        let start = Instant::now();

        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::download_failed(format!("Failed to read file {}", path.display()), e)
            }
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(data)
    }

    async fn move_file(
        &self,
        old_key: &str,
        new_subfolder: &str,
        thumbnail_key: Option<&str>,
    ) -> StorageResult<MoveResult> {
        let filename = keys::filename_of(old_key);
        let new_key = self.key_for(filename, Some(new_subfolder))?;
        let old_path = self.key_to_path(old_key)?;
        let new_path = self.key_to_path(&new_key)?;

        let thumbnail = match thumbnail_key {
            Some(thumb_key) => {
                let thumb_name = keys::filename_of(thumb_key);
                let new_thumb_key = self.key_for(thumb_name, Some(new_subfolder))?;
                Some((
                    thumb_name,
                    thumb_key,
                    self.key_to_path(thumb_key)?,
                    self.key_to_path(&new_thumb_key)?,
                    new_thumb_key,
                ))
            }
            None => None,
        };

        // An existing file at the destination is replaced.
        self.rename(old_key, &old_path, &new_path).await?;

        let mut result = MoveResult {
            new_key,
            new_url: self.get_url(filename, Some(new_subfolder)),
            new_thumbnail_key: None,
            new_thumbnail_url: None,
        };

        if let Some((thumb_name, thumb_key, old_thumb, new_thumb, new_thumb_key)) = thumbnail {
            if fs::try_exists(&old_thumb).await.unwrap_or(false) {
                if let Err(e) = self.rename(thumb_key, &old_thumb, &new_thumb).await {
                    if let Err(rollback) = fs::rename(&new_path, &old_path).await {
                        tracing::error!(
                            key = %old_key,
                            error = %rollback,
                            "Failed to restore original after thumbnail move failure"
                        );
                    }
                    return Err(e);
                }
                result.new_thumbnail_key = Some(new_thumb_key);
                result.new_thumbnail_url = Some(self.get_url(thumb_name, Some(new_subfolder)));
            } else {
                tracing::debug!(thumbnail_key = %thumb_key, "Thumbnail not found, moving original only");
            }
        }

        tracing::info!(
            old_key = %old_key,
            new_key = %result.new_key,
            new_thumbnail_key = ?result.new_thumbnail_key,
            "Local storage move successful"
        );

        Ok(result)
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let prefix = options
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty());
        if let Some(p) = prefix {
            keys::validate_relative_path(p)?;
        }

        let start: usize = match options.cursor.as_deref() {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| StorageError::InvalidKey(format!("Invalid list cursor: {}", cursor)))?,
            None => 0,
        };
        let limit = options.page_size(DEFAULT_LIST_LIMIT, usize::MAX);

        let files = self.walk(prefix).await?;
        let end = start.saturating_add(limit);
        let has_more = end < files.len();
        let page: Vec<StorageFile> = files.into_iter().skip(start).take(limit).collect();

        tracing::debug!(
            prefix = ?prefix,
            offset = start,
            returned = page.len(),
            has_more,
            "Local storage list"
        );

        Ok(ListResult {
            files: page,
            cursor: has_more.then(|| end.to_string()),
            has_more,
        })
    }
}
