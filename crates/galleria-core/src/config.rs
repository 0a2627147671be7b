//! Configuration module
//!
//! This module reads storage and palette settings from the environment
//! (a `.env` file is honoured) and hands each storage provider a typed
//! configuration struct. Parsing lives here; the storage crate only consumes
//! the structs.

use std::env;

use crate::constants::{
    DEFAULT_GITHUB_API_URL, DEFAULT_GITHUB_BRANCH, DEFAULT_LOCAL_BASE_PATH,
    DEFAULT_LOCAL_BASE_URL, DEFAULT_PALETTE_COLOR_COUNT, DEFAULT_PALETTE_QUALITY,
    DEFAULT_R2_REGION,
};
use crate::storage_types::StorageBackend;

/// Local filesystem backend settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalStorageConfig {
    pub base_path: String,
    pub base_url: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_LOCAL_BASE_PATH.to_string(),
            base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
        }
    }
}

/// S3-compatible (R2) backend settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct R2StorageConfig {
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Public base URL objects are served from (custom domain or r2.dev).
    pub public_url: Option<String>,
}

/// GitHub repository backend settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GithubStorageConfig {
    pub token: Option<String>,
    /// `owner/repo`
    pub repo: Option<String>,
    /// Directory inside the repository every key lives under.
    pub path: Option<String>,
    pub branch: Option<String>,
    pub api_url: Option<String>,
    pub cdn_url: Option<String>,
}

impl GithubStorageConfig {
    /// Split `owner/repo` into its two halves if well formed.
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        let repo = self.repo.as_deref()?.trim();
        let (owner, name) = repo.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }

    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_GITHUB_BRANCH)
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_GITHUB_API_URL)
    }
}

/// Storage configuration for every backend. Only the section matching
/// `provider` is required to be complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub provider: StorageBackend,
    pub local: LocalStorageConfig,
    pub r2: R2StorageConfig,
    pub github: GithubStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageBackend::Local,
            local: LocalStorageConfig::default(),
            r2: R2StorageConfig::default(),
            github: GithubStorageConfig::default(),
        }
    }
}

/// Palette extraction defaults
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteConfig {
    pub color_count: usize,
    pub quality: usize,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            color_count: DEFAULT_PALETTE_COLOR_COUNT,
            quality: DEFAULT_PALETTE_QUALITY,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub storage: StorageConfig,
    pub palette: PaletteConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = match var("STORAGE_PROVIDER") {
            Some(name) => name.parse()?,
            None => StorageBackend::Local,
        };

        let storage = StorageConfig {
            provider,
            local: LocalStorageConfig {
                base_path: var("LOCAL_STORAGE_PATH")
                    .unwrap_or_else(|| DEFAULT_LOCAL_BASE_PATH.to_string()),
                base_url: var("LOCAL_STORAGE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LOCAL_BASE_URL.to_string()),
            },
            r2: R2StorageConfig {
                endpoint: var("R2_ENDPOINT"),
                access_key_id: var("R2_ACCESS_KEY_ID"),
                secret_access_key: var("R2_SECRET_ACCESS_KEY"),
                bucket: var("R2_BUCKET"),
                region: var("R2_REGION").or_else(|| Some(DEFAULT_R2_REGION.to_string())),
                public_url: var("R2_PUBLIC_URL"),
            },
            github: GithubStorageConfig {
                token: var("GITHUB_TOKEN"),
                repo: var("GITHUB_REPO"),
                path: var("GITHUB_PATH"),
                branch: var("GITHUB_BRANCH"),
                api_url: var("GITHUB_API_URL"),
                cdn_url: var("GITHUB_CDN_URL"),
            },
        };

        let palette = PaletteConfig {
            color_count: var("PALETTE_COLOR_COUNT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PALETTE_COLOR_COUNT),
            quality: var("PALETTE_QUALITY")
                .and_then(|s| s.parse().ok())
                .filter(|&q| q > 0)
                .unwrap_or(DEFAULT_PALETTE_QUALITY),
        };

        let config = Config {
            environment: var("ENVIRONMENT")
                .or_else(|| var("APP_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            storage,
            palette,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.provider
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.provider {
            StorageBackend::Local => {
                // Local storage works with the defaults
            }
            StorageBackend::R2 => {
                let r2 = &self.storage.r2;
                let missing: Vec<&str> = [
                    ("R2_ENDPOINT", r2.endpoint.is_none()),
                    ("R2_ACCESS_KEY_ID", r2.access_key_id.is_none()),
                    ("R2_SECRET_ACCESS_KEY", r2.secret_access_key.is_none()),
                    ("R2_BUCKET", r2.bucket.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                if !missing.is_empty() {
                    return Err(anyhow::anyhow!(
                        "{} must be set when using the r2 storage provider",
                        missing.join(", ")
                    ));
                }
            }
            StorageBackend::Github => {
                if self.storage.github.token.is_none() {
                    return Err(anyhow::anyhow!(
                        "GITHUB_TOKEN must be set when using the github storage provider"
                    ));
                }
                if self.storage.github.owner_and_repo().is_none() {
                    return Err(anyhow::anyhow!(
                        "GITHUB_REPO must be set to 'owner/repo' when using the github storage provider"
                    ));
                }
            }
        }

        if self.palette.color_count == 0 || self.palette.color_count > 256 {
            return Err(anyhow::anyhow!(
                "PALETTE_COLOR_COUNT must be between 1 and 256"
            ));
        }

        Ok(())
    }
}
