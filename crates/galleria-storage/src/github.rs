//! GitHub repository storage
//!
//! Assets are committed to a branch of a GitHub repository through the REST
//! API. Single-file writes and deletes go through the Contents API; moves are
//! built as one commit with the Git Data API so the original and its thumbnail
//! change paths together or not at all.
//!
//! Keys are repository paths and include the configured store path, e.g.
//! `gallery/2024/06/sunset.jpg`. List prefixes are relative to the store path.

use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::types::{ListOptions, ListResult, MoveResult, StorageFile};
use crate::StorageBackend;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use galleria_core::constants::DEFAULT_LIST_LIMIT;
use galleria_core::GithubStorageConfig;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const MAX_PUT_ATTEMPTS: u32 = 3;
const FILE_MODE: &str = "100644";

#[derive(Debug, Error)]
enum GithubApiError {
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl GithubApiError {
    fn status(&self) -> Option<StatusCode> {
        match self {
            GithubApiError::Status { status, .. } => Some(*status),
            GithubApiError::Transport(e) => e.status(),
        }
    }
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct ContentInfo {
    sha: String,
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: String,
    content: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Serialize)]
struct DeleteContentRequest<'a> {
    message: String,
    sha: String,
    branch: &'a str,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct GitCommit {
    tree: GitObject,
}

#[derive(Serialize)]
struct TreeEntryRequest<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    /// `None` serializes as `null`, which removes the path from the tree.
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntryRequest<'a>>,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: String,
    tree: &'a str,
    parents: [&'a str; 1],
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

/// GitHub repository storage implementation
#[derive(Clone)]
pub struct GithubStorage {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    branch: String,
    store_path: String,
    api_url: String,
    cdn_url: String,
}

impl std::fmt::Debug for GithubStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubStorage")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("store_path", &self.store_path)
            .field("api_url", &self.api_url)
            .field("cdn_url", &self.cdn_url)
            .finish_non_exhaustive()
    }
}

impl GithubStorage {
    /// Create a new GithubStorage instance
    ///
    /// Requires a token and `owner/repo`. The public URL base defaults to
    /// `https://raw.githubusercontent.com/{owner}/{repo}/{branch}`.
    pub fn new(config: &GithubStorageConfig) -> StorageResult<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| StorageError::ConfigError("GITHUB_TOKEN not configured".to_string()))?;
        let (owner, repo) = config.owner_and_repo().ok_or_else(|| {
            StorageError::ConfigError("GITHUB_REPO must be 'owner/repo'".to_string())
        })?;
        let branch = config.branch().to_string();

        let store_path = config
            .path
            .as_deref()
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();
        if !store_path.is_empty() {
            keys::validate_relative_path(&store_path)
                .map_err(|e| StorageError::ConfigError(format!("GITHUB_PATH: {}", e)))?;
        }

        let cdn_url = config.cdn_url.clone().unwrap_or_else(|| {
            format!(
                "https://raw.githubusercontent.com/{}/{}/{}",
                owner, repo, branch
            )
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(GithubStorage {
            client,
            token,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch,
            store_path,
            api_url: config.api_url().trim_end_matches('/').to_string(),
            cdn_url,
        })
    }

    fn repo_url(&self, rest: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, rest)
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        self.repo_url(&format!("contents/{}", encoded.join("/")))
    }

    /// Tree path a listing prefix covers.
    ///
    /// Prefixes are accepted in key space (`gallery/2024/06`, as returned in
    /// keys) or relative to the store path (`2024/06`).
    fn list_root(&self, prefix: Option<&str>) -> String {
        match prefix {
            None => self.store_path.clone(),
            Some(p) if self.store_path.is_empty() => p.to_string(),
            Some(p)
                if p == self.store_path
                    || p
                        .strip_prefix(self.store_path.as_str())
                        .is_some_and(|rest| rest.starts_with('/')) =>
            {
                p.to_string()
            }
            Some(p) => keys::join_segments([self.store_path.as_str(), p]),
        }
    }

    fn url_for_key(&self, key: &str) -> String {
        keys::join_url(&self.cdn_url, [key])
    }

    fn request(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, accept)
            .header(USER_AGENT, "galleria-storage")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GithubApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or(body);
        Err(GithubApiError::Status { status, message })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, GithubApiError> {
        let response = self
            .send(self.request(Method::GET, url, JSON_MEDIA_TYPE))
            .await?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T, GithubApiError> {
        let response = self
            .send(self.request(method, url, JSON_MEDIA_TYPE).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// Blob sha of the file at `path` as of `reference`, `None` if absent.
    async fn file_sha(&self, path: &str, reference: &str) -> Result<Option<String>, GithubApiError> {
        let request = self
            .request(Method::GET, &self.contents_url(path), JSON_MEDIA_TYPE)
            .query(&[("ref", reference)]);
        match self.send(request).await {
            Ok(response) => Ok(Some(response.json::<ContentInfo>().await?.sha)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn try_put(&self, key: &str, content: &str) -> Result<(), GithubApiError> {
        let sha = self.file_sha(key, &self.branch).await?;
        let body = PutContentRequest {
            message: format!("Upload {}", key),
            content,
            branch: &self.branch,
            sha,
        };
        self.send(
            self.request(Method::PUT, &self.contents_url(key), JSON_MEDIA_TYPE)
                .json(&body),
        )
        .await?;
        Ok(())
    }

    /// Commit that moves each `(from, to, blob_sha)` and fast-forwards the branch.
    async fn commit_moves(
        &self,
        head_sha: &str,
        tree_sha: &str,
        moves: &[(&str, &str, String)],
        message: String,
    ) -> Result<(), GithubApiError> {
        let mut entries = Vec::with_capacity(moves.len() * 2);
        for (from, to, blob_sha) in moves {
            entries.push(TreeEntryRequest {
                path: to,
                mode: FILE_MODE,
                kind: "blob",
                sha: Some(blob_sha),
            });
            entries.push(TreeEntryRequest {
                path: from,
                mode: FILE_MODE,
                kind: "blob",
                sha: None,
            });
        }

        let tree: GitObject = self
            .send_json(
                Method::POST,
                &self.repo_url("git/trees"),
                &CreateTreeRequest {
                    base_tree: tree_sha,
                    tree: entries,
                },
            )
            .await?;

        let commit: GitObject = self
            .send_json(
                Method::POST,
                &self.repo_url("git/commits"),
                &CreateCommitRequest {
                    message,
                    tree: &tree.sha,
                    parents: [head_sha],
                },
            )
            .await?;

        // Rejected unless the branch still points at head_sha
        let _: serde_json::Value = self
            .send_json(
                Method::PATCH,
                &self.repo_url(&format!("git/refs/heads/{}", self.branch)),
                &UpdateRefRequest {
                    sha: &commit.sha,
                    force: false,
                },
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Storage for GithubStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Github
    }

    fn validate_config(&self) -> StorageResult<()> {
        if self.token.trim().is_empty() {
            return Err(StorageError::ConfigError("GITHUB_TOKEN is empty".to_string()));
        }
        if !self.cdn_url.starts_with("http://") && !self.cdn_url.starts_with("https://") {
            return Err(StorageError::ConfigError(format!(
                "GITHUB_CDN_URL must be absolute: {}",
                self.cdn_url
            )));
        }
        Ok(())
    }

    fn key_for(&self, filename: &str, subfolder: Option<&str>) -> StorageResult<String> {
        let key = keys::object_key(subfolder, filename)?;
        Ok(keys::join_segments([self.store_path.as_str(), key.as_str()]))
    }

    fn get_url(&self, filename: &str, subfolder: Option<&str>) -> String {
        keys::join_url(
            &self.cdn_url,
            std::iter::once(self.store_path.as_str())
                .chain(subfolder)
                .chain([filename]),
        )
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: Option<&str>) -> StorageResult<()> {
        keys::validate_key(key)?;
        let start = Instant::now();
        let content = STANDARD.encode(&data);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_put(key, &content).await {
                Ok(()) => break,
                Err(e) if e.status() == Some(StatusCode::CONFLICT) && attempt < MAX_PUT_ATTEMPTS => {
                    tracing::warn!(
                        repo = %self.repo,
                        key = %key,
                        attempt,
                        "GitHub rejected write with a conflict, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        repo = %self.repo,
                        key = %key,
                        attempt,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "GitHub upload failed"
                    );
                    return Err(StorageError::write_failed(
                        format!("Failed to write {}", key),
                        e,
                    ));
                }
            }
        }

        tracing::info!(
            repo = %self.repo,
            branch = %self.branch,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub upload successful"
        );

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        keys::validate_key(key)?;
        let delete_failed = |e: GithubApiError| {
            StorageError::delete_failed(format!("Failed to delete {}", key), e)
        };

        let Some(sha) = self.file_sha(key, &self.branch).await.map_err(delete_failed)? else {
            tracing::debug!(key = %key, "GitHub delete skipped, file already gone");
            return Ok(());
        };

        let body = DeleteContentRequest {
            message: format!("Delete {}", key),
            sha,
            branch: &self.branch,
        };
        match self
            .send(
                self.request(Method::DELETE, &self.contents_url(key), JSON_MEDIA_TYPE)
                    .json(&body),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {}
            Err(e) => return Err(delete_failed(e)),
        }

        tracing::info!(repo = %self.repo, key = %key, "GitHub delete successful");
        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        keys::validate_key(key)?;
        let start = Instant::now();
        let request = self
            .request(Method::GET, &self.contents_url(key), RAW_MEDIA_TYPE)
            .query(&[("ref", self.branch.as_str())]);

        let response = self.send(request).await.map_err(|e| {
            if e.status() == Some(StatusCode::NOT_FOUND) {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::download_failed(format!("Failed to read {}", key), e)
            }
        })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to read {}", key), e))?;

        tracing::info!(
            repo = %self.repo,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub download successful"
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
        let new_thumb = match thumbnail_key {
            Some(thumb_key) => {
                keys::validate_key(thumb_key)?;
                let thumb_name = keys::filename_of(thumb_key);
                Some((thumb_key, thumb_name, self.key_for(thumb_name, Some(new_subfolder))?))
            }
            None => None,
        };
        let move_failed =
            |e: GithubApiError| StorageError::move_failed(format!("Failed to move {}", old_key), e);

        let head: GitRef = self
            .get_json(&self.repo_url(&format!("git/ref/heads/{}", self.branch)))
            .await
            .map_err(move_failed)?;
        let head_sha = head.object.sha;

        let original_sha = self
            .file_sha(old_key, &head_sha)
            .await
            .map_err(move_failed)?
            .ok_or_else(|| StorageError::NotFound(old_key.to_string()))?;

        let mut moves = Vec::with_capacity(2);
        if old_key != new_key {
            moves.push((old_key, new_key.as_str(), original_sha));
        }

        let mut result = MoveResult {
            new_url: self.url_for_key(&new_key),
            new_key: new_key.clone(),
            new_thumbnail_key: None,
            new_thumbnail_url: None,
        };

        if let Some((thumb_key, thumb_name, ref new_thumb_key)) = new_thumb {
            match self.file_sha(thumb_key, &head_sha).await.map_err(move_failed)? {
                Some(thumb_sha) => {
                    if thumb_key != new_thumb_key {
                        moves.push((thumb_key, new_thumb_key.as_str(), thumb_sha));
                    }
                    result.new_thumbnail_key = Some(new_thumb_key.clone());
                    result.new_thumbnail_url = Some(self.get_url(thumb_name, Some(new_subfolder)));
                }
                None => {
                    tracing::debug!(thumbnail_key = %thumb_key, "Thumbnail not found, moving original only");
                }
            }
        }

        if !moves.is_empty() {
            let commit: GitCommit = self
                .get_json(&self.repo_url(&format!("git/commits/{}", head_sha)))
                .await
                .map_err(move_failed)?;

            self.commit_moves(
                &head_sha,
                &commit.tree.sha,
                &moves,
                format!("Move {} to {}", old_key, new_subfolder),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    repo = %self.repo,
                    key = %old_key,
                    "GitHub move commit failed, repository unchanged"
                );
                move_failed(e)
            })?;
        }

        tracing::info!(
            repo = %self.repo,
            old_key = %old_key,
            new_key = %result.new_key,
            new_thumbnail_key = ?result.new_thumbnail_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub move successful"
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
        let root = self.list_root(prefix);
        let limit = options.page_size(DEFAULT_LIST_LIMIT, DEFAULT_LIST_LIMIT);

        let url = self.repo_url(&format!("git/trees/{}", self.branch));
        let request = self
            .request(Method::GET, &url, JSON_MEDIA_TYPE)
            .query(&[("recursive", "1")]);
        let tree: Tree = match self.send(request).await {
            Ok(response) => response.json().await.map_err(|e| {
                StorageError::list_failed(format!("Failed to parse tree of {}", self.repo), e)
            })?,
            // Missing branch or empty repository
            Err(e) if matches!(e.status(), Some(StatusCode::NOT_FOUND | StatusCode::CONFLICT)) => {
                return Ok(ListResult {
                    files: Vec::new(),
                    cursor: None,
                    has_more: false,
                })
            }
            Err(e) => {
                return Err(StorageError::list_failed(
                    format!("Failed to list {}", self.repo),
                    e,
                ))
            }
        };

        if tree.truncated {
            tracing::warn!(repo = %self.repo, "GitHub tree listing truncated, results are partial");
        }

        let mut blobs: Vec<TreeEntry> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter(|entry| {
                root.is_empty()
                    || entry
                        .path
                        .strip_prefix(root.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .filter(|entry| {
                options
                    .cursor
                    .as_deref()
                    .map_or(true, |cursor| entry.path.as_str() > cursor)
            })
            .collect();
        blobs.sort_by(|a, b| a.path.cmp(&b.path));

        let has_more = blobs.len() > limit;
        blobs.truncate(limit);

        let files: Vec<StorageFile> = blobs
            .into_iter()
            .map(|entry| StorageFile {
                url: self.url_for_key(&entry.path),
                size: entry.size.unwrap_or(0),
                last_modified: None,
                key: entry.path,
            })
            .collect();
        let cursor = if has_more {
            files.last().map(|f| f.key.clone())
        } else {
            None
        };

        Ok(ListResult {
            files,
            cursor,
            has_more,
        })
    }
}

#[cfg(all(test, feature = "storage-github"))]
mod tests {
    use super::*;
    use crate::types::UploadInput;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn path(p: &str) -> Matcher {
        Matcher::Regex(format!(r"^{}(\?.*)?$", p.replace('.', r"\.")))
    }

    fn storage(server: &ServerGuard) -> GithubStorage {
        GithubStorage::new(&GithubStorageConfig {
            token: Some("ghp_test".into()),
            repo: Some("alice/photos".into()),
            path: Some("gallery".into()),
            branch: None,
            api_url: Some(server.url()),
            cdn_url: None,
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_token_and_repo() {
        let err = GithubStorage::new(&GithubStorageConfig {
            repo: Some("alice/photos".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));

        let err = GithubStorage::new(&GithubStorageConfig {
            token: Some("t".into()),
            repo: Some("photos".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("owner/repo"));
    }

    #[tokio::test]
    async fn test_keys_and_urls_include_store_path() {
        let server = Server::new_async().await;
        let storage = storage(&server);
        assert!(storage.validate_config().is_ok());
        assert_eq!(
            storage.key_for("sunset.jpg", Some("2024/06")).unwrap(),
            "gallery/2024/06/sunset.jpg"
        );
        assert_eq!(
            storage.get_url("sunset.jpg", Some("2024/06")),
            "https://raw.githubusercontent.com/alice/photos/main/gallery/2024/06/sunset.jpg"
        );
    }

    #[tokio::test]
    async fn test_upload_creates_file() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/2024/06/sunset.jpg"))
            .match_header("authorization", "Bearer ghp_test")
            .match_header("x-github-api-version", API_VERSION)
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;
        let put = server
            .mock("PUT", path("/repos/alice/photos/contents/gallery/2024/06/sunset.jpg"))
            .match_body(Matcher::PartialJson(json!({
                "content": STANDARD.encode(b"jpeg-bytes"),
                "branch": "main",
            })))
            .with_status(201)
            .with_body(r#"{"content":{"sha":"new"}}"#)
            .create_async()
            .await;

        let storage = storage(&server);
        let result = storage
            .upload(
                UploadInput::new("sunset.jpg", b"jpeg-bytes".to_vec()).with_subfolder("2024/06"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.key, "gallery/2024/06/sunset.jpg");
        lookup.assert_async().await;
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_retries_on_conflict() {
        let mut server = Server::new_async().await;
        let _lookup = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(200)
            .with_body(r#"{"sha":"old-sha","type":"file"}"#)
            .expect(2)
            .create_async()
            .await;
        let conflict = server
            .mock("PUT", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .match_body(Matcher::PartialJson(json!({ "sha": "old-sha" })))
            .with_status(409)
            .with_body(r#"{"message":"is at abc but expected def"}"#)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("PUT", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let storage = storage(&server);
        storage
            .put("gallery/a.jpg", Bytes::from_static(b"a"), None)
            .await
            .unwrap();

        conflict.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_failure_is_write_failed() {
        let mut server = Server::new_async().await;
        let _lookup = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(404)
            .create_async()
            .await;
        let _put = server
            .mock("PUT", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(422)
            .with_body(r#"{"message":"Invalid request"}"#)
            .create_async()
            .await;

        let err = storage(&server)
            .put("gallery/a.jpg", Bytes::from_static(b"a"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::StorageErrorKind::WriteFailed);
        assert!(err.detailed_message().contains("Invalid request"));
    }

    #[tokio::test]
    async fn test_download_raw_content() {
        let mut server = Server::new_async().await;
        let _raw = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .match_header("accept", RAW_MEDIA_TYPE)
            .with_status(200)
            .with_body(b"raw-bytes")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/b.jpg"))
            .with_status(404)
            .create_async()
            .await;

        let storage = storage(&server);
        assert_eq!(storage.download("gallery/a.jpg").await.unwrap(), b"raw-bytes".to_vec());
        assert!(storage.download("gallery/b.jpg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_noop() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(404)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        storage(&server).delete("gallery/a.jpg", None).await;

        lookup.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_sends_sha() {
        let mut server = Server::new_async().await;
        let _lookup = server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(200)
            .with_body(r#"{"sha":"blob-a"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .match_body(Matcher::PartialJson(json!({ "sha": "blob-a", "branch": "main" })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        assert!(storage(&server).remove("gallery/a.jpg").await.is_ok());
        delete.assert_async().await;
    }

    async fn mock_head(server: &mut ServerGuard) {
        server
            .mock("GET", path("/repos/alice/photos/git/ref/heads/main"))
            .with_status(200)
            .with_body(r#"{"ref":"refs/heads/main","object":{"sha":"head-sha","type":"commit"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", path("/repos/alice/photos/git/commits/head-sha"))
            .with_status(200)
            .with_body(r#"{"sha":"head-sha","tree":{"sha":"base-tree"}}"#)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_move_commits_original_and_thumbnail_together() {
        let mut server = Server::new_async().await;
        mock_head(&mut server).await;
        server
            .mock("GET", path("/repos/alice/photos/contents/gallery/2024/06/sunset.jpg"))
            .match_query(Matcher::UrlEncoded("ref".into(), "head-sha".into()))
            .with_status(200)
            .with_body(r#"{"sha":"blob-original"}"#)
            .create_async()
            .await;
        server
            .mock("GET", path("/repos/alice/photos/contents/gallery/2024/06/sunset_thumb.jpg"))
            .with_status(200)
            .with_body(r#"{"sha":"blob-thumb"}"#)
            .create_async()
            .await;
        let tree = server
            .mock("POST", path("/repos/alice/photos/git/trees"))
            .match_body(Matcher::Json(json!({
                "base_tree": "base-tree",
                "tree": [
                    {"path": "gallery/archive/2024/sunset.jpg", "mode": "100644", "type": "blob", "sha": "blob-original"},
                    {"path": "gallery/2024/06/sunset.jpg", "mode": "100644", "type": "blob", "sha": null},
                    {"path": "gallery/archive/2024/sunset_thumb.jpg", "mode": "100644", "type": "blob", "sha": "blob-thumb"},
                    {"path": "gallery/2024/06/sunset_thumb.jpg", "mode": "100644", "type": "blob", "sha": null}
                ]
            })))
            .with_status(201)
            .with_body(r#"{"sha":"new-tree"}"#)
            .create_async()
            .await;
        let commit = server
            .mock("POST", path("/repos/alice/photos/git/commits"))
            .match_body(Matcher::PartialJson(json!({
                "tree": "new-tree",
                "parents": ["head-sha"]
            })))
            .with_status(201)
            .with_body(r#"{"sha":"new-commit"}"#)
            .create_async()
            .await;
        let update = server
            .mock("PATCH", path("/repos/alice/photos/git/refs/heads/main"))
            .match_body(Matcher::Json(json!({ "sha": "new-commit", "force": false })))
            .with_status(200)
            .with_body(r#"{"object":{"sha":"new-commit"}}"#)
            .create_async()
            .await;

        let moved = storage(&server)
            .move_file(
                "gallery/2024/06/sunset.jpg",
                "archive/2024",
                Some("gallery/2024/06/sunset_thumb.jpg"),
            )
            .await
            .unwrap();

        assert_eq!(moved.new_key, "gallery/archive/2024/sunset.jpg");
        assert_eq!(
            moved.new_thumbnail_key.as_deref(),
            Some("gallery/archive/2024/sunset_thumb.jpg")
        );
        assert_eq!(
            moved.new_url,
            "https://raw.githubusercontent.com/alice/photos/main/gallery/archive/2024/sunset.jpg"
        );
        tree.assert_async().await;
        commit.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_move_rejected_ref_update_is_move_failed() {
        let mut server = Server::new_async().await;
        mock_head(&mut server).await;
        server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(200)
            .with_body(r#"{"sha":"blob-a"}"#)
            .create_async()
            .await;
        server
            .mock("POST", path("/repos/alice/photos/git/trees"))
            .with_status(201)
            .with_body(r#"{"sha":"new-tree"}"#)
            .create_async()
            .await;
        server
            .mock("POST", path("/repos/alice/photos/git/commits"))
            .with_status(201)
            .with_body(r#"{"sha":"new-commit"}"#)
            .create_async()
            .await;
        server
            .mock("PATCH", path("/repos/alice/photos/git/refs/heads/main"))
            .with_status(422)
            .with_body(r#"{"message":"Update is not a fast forward"}"#)
            .create_async()
            .await;

        let err = storage(&server)
            .move_file("gallery/a.jpg", "b", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::StorageErrorKind::MoveFailed);
    }

    #[tokio::test]
    async fn test_move_missing_original_is_not_found() {
        let mut server = Server::new_async().await;
        mock_head(&mut server).await;
        server
            .mock("GET", path("/repos/alice/photos/contents/gallery/a.jpg"))
            .with_status(404)
            .create_async()
            .await;

        let err = storage(&server)
            .move_file("gallery/a.jpg", "b", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_pages_blobs_under_prefix() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", path("/repos/alice/photos/git/trees/main"))
            .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
            .with_status(200)
            .with_body(
                json!({
                    "sha": "t",
                    "truncated": false,
                    "tree": [
                        {"path": "README.md", "type": "blob", "size": 10},
                        {"path": "gallery", "type": "tree"},
                        {"path": "gallery/2024/06/c.jpg", "type": "blob", "size": 3},
                        {"path": "gallery/2024/06/a.jpg", "type": "blob", "size": 1},
                        {"path": "gallery/2024/06/b.jpg", "type": "blob", "size": 2},
                        {"path": "gallery/2024/060/x.jpg", "type": "blob", "size": 9},
                        {"path": "gallery/2024/07/d.jpg", "type": "blob", "size": 4}
                    ]
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let storage = storage(&server);
        let first = storage
            .list(ListOptions::with_prefix("2024/06").limit(2))
            .await
            .unwrap();
        let keys: Vec<&str> = first.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["gallery/2024/06/a.jpg", "gallery/2024/06/b.jpg"]);
        assert!(first.has_more);
        assert!(first.files.iter().all(|f| f.last_modified.is_none()));

        let second = storage
            .list(ListOptions::with_prefix("2024/06").cursor(first.cursor.unwrap()).limit(2))
            .await
            .unwrap();
        assert_eq!(second.files.len(), 1);
        assert_eq!(second.files[0].key, "gallery/2024/06/c.jpg");
        assert_eq!(second.files[0].size, 3);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_list_root_accepts_key_space_prefix() {
        let server = Server::new_async().await;
        let storage = storage(&server);
        assert_eq!(storage.list_root(None), "gallery");
        assert_eq!(storage.list_root(Some("2024/06")), "gallery/2024/06");
        assert_eq!(storage.list_root(Some("gallery/2024/06")), "gallery/2024/06");
        assert_eq!(storage.list_root(Some("gallery")), "gallery");
        assert_eq!(storage.list_root(Some("gallery2024")), "gallery/gallery2024");
    }

    #[tokio::test]
    async fn test_list_empty_repository() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", path("/repos/alice/photos/git/trees/main"))
            .with_status(409)
            .with_body(r#"{"message":"Git Repository is empty."}"#)
            .create_async()
            .await;

        let listed = storage(&server).list(ListOptions::default()).await.unwrap();
        assert!(listed.files.is_empty());
        assert!(!listed.has_more);
    }
}
