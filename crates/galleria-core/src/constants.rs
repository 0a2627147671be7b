//! Defaults shared by configuration and the storage/processing crates.

/// Local backend base directory when `LOCAL_STORAGE_PATH` is unset.
pub const DEFAULT_LOCAL_BASE_PATH: &str = "public/uploads";

/// Local backend URL prefix when `LOCAL_STORAGE_BASE_URL` is unset.
pub const DEFAULT_LOCAL_BASE_URL: &str = "/uploads";

/// Signing region for R2. Cloudflare accepts `auto`.
pub const DEFAULT_R2_REGION: &str = "auto";

pub const DEFAULT_GITHUB_BRANCH: &str = "main";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Page size used by `list` when the caller does not pass a limit.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

pub const DEFAULT_PALETTE_COLOR_COUNT: usize = 5;
pub const DEFAULT_PALETTE_QUALITY: usize = 10;
