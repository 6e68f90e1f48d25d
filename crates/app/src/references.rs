use std::collections::HashMap;

use tracing::warn;

use storefront_core::{Collection, DocumentId, Summarize, Summary};
use storefront_storage::{DocumentError, DocumentRepository};

use crate::envelope::ApiError;

/// Rejects a write whose `field` names a document that does not exist.
pub async fn ensure_exist<T: Collection>(
    repo: &DocumentRepository<T>,
    field: &'static str,
    ids: &[DocumentId],
) -> Result<(), ApiError> {
    match repo.missing(ids).await?.first() {
        Some(id) => Err(ApiError::BadRequest(format!("{field}: unknown id {id}"))),
        None => Ok(()),
    }
}

/// Summaries of referenced documents loaded in one query.
pub struct SummaryIndex {
    collection: &'static str,
    by_id: HashMap<DocumentId, Summary>,
}

impl SummaryIndex {
    pub async fn load<'a, T: Summarize>(
        repo: &DocumentRepository<T>,
        ids: impl IntoIterator<Item = &'a DocumentId>,
    ) -> Result<Self, DocumentError> {
        let mut wanted: Vec<DocumentId> = Vec::new();
        for id in ids {
            if !wanted.contains(id) {
                wanted.push(id.clone());
            }
        }
        let by_id = repo
            .get_many(&wanted)
            .await?
            .iter()
            .map(|stored| (stored.id.clone(), T::summarize(stored)))
            .collect();
        Ok(Self {
            collection: T::NAME,
            by_id,
        })
    }

    /// Resolves `ids` in order. Dangling references are dropped and logged.
    pub fn resolve(&self, owner: &DocumentId, ids: &[DocumentId]) -> Vec<Summary> {
        ids.iter()
            .filter_map(|id| {
                let summary = self.by_id.get(id).cloned();
                if summary.is_none() {
                    warn!(
                        stage = "api",
                        %owner,
                        collection = self.collection,
                        missing = %id,
                        "dangling reference skipped"
                    );
                }
                summary
            })
            .collect()
    }
}
