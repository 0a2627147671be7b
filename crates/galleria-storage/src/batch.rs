//! Bulk storage operations with one outcome per asset.
//!
//! A failing item never aborts the rest of the batch. Outcomes are returned in
//! input order.

use crate::traits::{Storage, StorageResult};
use crate::types::MoveResult;
use crate::StorageBackend;
use futures::stream::{self, StreamExt};

const BATCH_CONCURRENCY: usize = 8;

/// An original and its optional thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub key: String,
    pub thumbnail_key: Option<String>,
}

impl BatchItem {
    pub fn new(key: impl Into<String>, thumbnail_key: Option<String>) -> Self {
        Self {
            key: key.into(),
            thumbnail_key,
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub key: String,
    pub result: StorageResult<T>,
}

impl<T> BatchOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn concurrency_for(storage: &dyn Storage) -> usize {
    match storage.backend_type() {
        // Each move is a commit on the same branch; parallel ones would race the ref update
        StorageBackend::Github => 1,
        _ => BATCH_CONCURRENCY,
    }
}

/// Move every item into `new_subfolder`.
pub async fn move_many(
    storage: &dyn Storage,
    items: &[BatchItem],
    new_subfolder: &str,
) -> Vec<BatchOutcome<MoveResult>> {
    let outcomes: Vec<BatchOutcome<MoveResult>> = stream::iter(items)
        .map(|item| async move {
            let result = storage
                .move_file(&item.key, new_subfolder, item.thumbnail_key.as_deref())
                .await;
            if let Err(ref e) = result {
                tracing::warn!(
                    key = %item.key,
                    new_subfolder = %new_subfolder,
                    kind = %e.kind(),
                    error = %e.detailed_message(),
                    "Batch move item failed"
                );
            }
            BatchOutcome {
                key: item.key.clone(),
                result,
            }
        })
        .buffered(concurrency_for(storage))
        .collect()
        .await;

    tracing::info!(
        total = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
        new_subfolder = %new_subfolder,
        "Batch move finished"
    );

    outcomes
}

/// Remove every item and its thumbnail.
///
/// Each outcome carries the first removal error for that item, so callers can
/// report what was left behind.
pub async fn delete_many(storage: &dyn Storage, items: &[BatchItem]) -> Vec<BatchOutcome<()>> {
    let outcomes: Vec<BatchOutcome<()>> = stream::iter(items)
        .map(|item| async move {
            let mut result = Ok(());
            for target in std::iter::once(item.key.as_str()).chain(item.thumbnail_key.as_deref()) {
                if let Err(e) = storage.remove(target).await {
                    tracing::warn!(
                        key = %target,
                        kind = %e.kind(),
                        error = %e.detailed_message(),
                        "Batch delete item failed"
                    );
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
            BatchOutcome {
                key: item.key.clone(),
                result,
            }
        })
        .buffered(concurrency_for(storage))
        .collect()
        .await;

    tracing::info!(
        total = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
        "Batch delete finished"
    );

    outcomes
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::types::UploadInput;
    use crate::LocalStorage;

    #[tokio::test]
    async fn test_move_many_reports_each_item() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads").await.unwrap();
        for name in ["a.jpg", "b.jpg"] {
            storage
                .upload(UploadInput::new(name, b"x".to_vec()).with_subfolder("inbox"), None)
                .await
                .unwrap();
        }

        let items = vec![
            BatchItem::new("inbox/a.jpg", None),
            BatchItem::new("inbox/missing.jpg", None),
            BatchItem::new("inbox/b.jpg", Some("inbox/b_thumb.jpg".to_string())),
        ];
        let outcomes = move_many(&storage, &items, "album").await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].key, "inbox/a.jpg");
        assert_eq!(outcomes[0].result.as_ref().unwrap().new_key, "album/a.jpg");
        assert!(outcomes[1].result.as_ref().unwrap_err().is_not_found());
        assert_eq!(outcomes[2].result.as_ref().unwrap().new_key, "album/b.jpg");
        assert_eq!(storage.download("album/b.jpg").await.unwrap(), b"x".to_vec());
    }

    #[tokio::test]
    async fn test_delete_many_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads").await.unwrap();
        storage
            .upload(UploadInput::new("a.jpg", b"x".to_vec()), None)
            .await
            .unwrap();

        let items = vec![
            BatchItem::new("../escape.jpg", None),
            BatchItem::new("a.jpg", Some("a_thumb.jpg".to_string())),
        ];
        let outcomes = delete_many(&storage, &items).await;

        assert!(!outcomes[0].is_ok());
        assert!(outcomes[1].is_ok());
        assert!(storage.download("a.jpg").await.unwrap_err().is_not_found());
    }
}
