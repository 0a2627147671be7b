use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// The closed set of providers an installation can be configured with.
/// It's defined in core because configuration selects it before any
/// storage crate code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Plain files under a local directory tree.
    Local,
    /// Cloudflare R2 or any other S3-compatible bucket.
    R2,
    /// Files committed to a GitHub repository.
    Github,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "r2" | "s3" => Ok(StorageBackend::R2),
            "github" => Ok(StorageBackend::Github),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::R2 => write!(f, "r2"),
            StorageBackend::Github => write!(f, "github"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_names() {
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("R2".parse::<StorageBackend>().unwrap(), StorageBackend::R2);
        assert_eq!("s3".parse::<StorageBackend>().unwrap(), StorageBackend::R2);
        assert_eq!(" github ".parse::<StorageBackend>().unwrap(), StorageBackend::Github);
        assert!("nfs".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for backend in [StorageBackend::Local, StorageBackend::R2, StorageBackend::Github] {
            assert_eq!(backend.to_string().parse::<StorageBackend>().unwrap(), backend);
        }
    }
}
