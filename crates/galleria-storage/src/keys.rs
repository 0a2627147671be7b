//! Shared key and URL construction for storage backends.
//!
//! Key format: `{subfolder}/{filename}`, or bare `{filename}` without a subfolder.
//! Backends with a fixed root (the GitHub store path) prepend it as another
//! segment. Keys never contain `..`, empty segments, or a leading `/`.

use crate::traits::{StorageError, StorageResult};

/// Join path segments with `/`, dropping empty segments and duplicate separators.
pub fn join_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build and validate the key for `filename` under an optional `subfolder`.
pub fn object_key(subfolder: Option<&str>, filename: &str) -> StorageResult<String> {
    validate_filename(filename)?;
    if let Some(folder) = subfolder {
        validate_relative_path(folder)?;
    }
    Ok(join_segments(subfolder.into_iter().chain([filename])))
}

/// A filename must be a single, non-empty path segment.
pub fn validate_filename(filename: &str) -> StorageResult<()> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(StorageError::InvalidKey(format!(
            "Invalid filename: {:?}",
            filename
        )));
    }
    Ok(())
}

/// Reject keys and folders that could escape the backend root.
pub fn validate_relative_path(path: &str) -> StorageResult<()> {
    if path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment == ".." || segment == ".")
    {
        return Err(StorageError::InvalidKey(format!(
            "Path escapes storage root: {:?}",
            path
        )));
    }
    Ok(())
}

/// Validate a key handed back by a caller.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim_matches('/').is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    validate_relative_path(key)
}

/// Last segment of a key.
pub fn filename_of(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

/// Append path segments to a base URL, collapsing repeated `/` in the path
/// portion while leaving any `scheme://` intact. A base without a scheme keeps
/// its leading `/` only if it had one.
pub fn join_url<'a>(base_url: &'a str, parts: impl IntoIterator<Item = &'a str>) -> String {
    let (origin, path) = match base_url.find("://") {
        Some(idx) => {
            let after_scheme = idx + 3;
            match base_url[after_scheme..].find('/') {
                Some(slash) => base_url.split_at(after_scheme + slash),
                None => (base_url, ""),
            }
        }
        None => ("", base_url),
    };

    let joined = join_segments(std::iter::once(path).chain(parts));
    if origin.is_empty() {
        // A relative base stays relative; only an empty or rooted one gets `/`.
        if path.is_empty() || path.starts_with('/') {
            format!("/{}", joined)
        } else {
            joined
        }
    } else if joined.is_empty() {
        origin.to_string()
    } else {
        format!("{}/{}", origin, joined)
    }
}
