//! Helpers shared by the `galleria` binary.

use anyhow::{bail, Context};
use galleria_storage::{BatchItem, BatchOutcome};
use serde::Serialize;
use std::path::Path;

/// Print `value` as pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

/// Parse `original[,thumbnail]` into a batch item.
pub fn parse_batch_item(arg: &str) -> anyhow::Result<BatchItem> {
    let mut parts = arg.splitn(2, ',');
    let key = parts.next().unwrap_or_default().trim();
    if key.is_empty() {
        bail!("Missing storage key in {:?}", arg);
    }
    let thumbnail = parts
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Ok(BatchItem::new(key, thumbnail))
}

/// Content type for common gallery image extensions.
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(content_type)
}

/// Final segment of a storage key.
pub fn file_name_of_key(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

/// Serializable view of one batch outcome.
#[derive(Debug, Serialize)]
pub struct BatchReport<T: Serialize> {
    pub key: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> From<BatchOutcome<T>> for BatchReport<T> {
    fn from(outcome: BatchOutcome<T>) -> Self {
        match outcome.result {
            Ok(result) => Self {
                key: outcome.key,
                ok: true,
                result: Some(result),
                kind: None,
                error: None,
            },
            Err(e) => Self {
                key: outcome.key,
                ok: false,
                result: None,
                kind: Some(e.kind().as_str()),
                error: Some(e.detailed_message()),
            },
        }
    }
}

/// Log the outcome of a batch and return how many items failed.
pub fn summarize_batch<T: Serialize>(operation: &str, reports: &[BatchReport<T>]) -> usize {
    let failed = reports.iter().filter(|report| !report.ok).count();
    if failed > 0 {
        tracing::warn!(
            operation = %operation,
            total = reports.len(),
            failed = failed,
            "Batch finished with failures"
        );
    } else {
        tracing::info!(operation = %operation, total = reports.len(), "Batch finished");
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleria_storage::StorageError;

    #[test]
    fn parse_batch_item_with_thumbnail() {
        let item = parse_batch_item("2024/06/a.jpg,2024/06/a_thumb.jpg").unwrap();
        assert_eq!(item.key, "2024/06/a.jpg");
        assert_eq!(item.thumbnail_key.as_deref(), Some("2024/06/a_thumb.jpg"));
    }

    #[test]
    fn parse_batch_item_without_thumbnail() {
        let item = parse_batch_item("a.jpg").unwrap();
        assert_eq!(item.thumbnail_key, None);
        assert_eq!(parse_batch_item("a.jpg,").unwrap().thumbnail_key, None);
        assert!(parse_batch_item("").is_err());
        assert!(parse_batch_item(",thumb.jpg").is_err());
    }

    #[test]
    fn guess_content_type_by_extension() {
        assert_eq!(guess_content_type(Path::new("x/sunset.JPG")), Some("image/jpeg"));
        assert_eq!(guess_content_type(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(guess_content_type(Path::new("notes.txt")), None);
        assert_eq!(guess_content_type(Path::new("README")), None);
    }

    #[test]
    fn file_name_of_key_takes_last_segment() {
        assert_eq!(file_name_of_key("2024/06/sunset.jpg"), "sunset.jpg");
        assert_eq!(file_name_of_key("sunset.jpg"), "sunset.jpg");
    }

    #[test]
    fn batch_report_from_outcomes() {
        let ok: BatchReport<u32> = BatchOutcome {
            key: "a.jpg".to_string(),
            result: Ok(7),
        }
        .into();
        assert!(ok.ok);
        assert_eq!(ok.result, Some(7));

        let failed: BatchReport<u32> = BatchOutcome {
            key: "b.jpg".to_string(),
            result: Err(StorageError::NotFound("b.jpg".to_string())),
        }
        .into();
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["kind"], "not-found");
        assert!(json.get("result").is_none());
        assert!(json["error"].as_str().unwrap().contains("b.jpg"));
    }

    #[test]
    fn summarize_batch_counts_failures() {
        let reports: Vec<BatchReport<()>> = vec![
            BatchOutcome {
                key: "a.jpg".to_string(),
                result: Ok(()),
            }
            .into(),
            BatchOutcome {
                key: "b.jpg".to_string(),
                result: Err(StorageError::NotFound("b.jpg".to_string())),
            }
            .into(),
        ];
        assert_eq!(summarize_batch("delete", &reports), 1);
        assert_eq!(summarize_batch::<()>("delete", &[]), 0);
    }
}
