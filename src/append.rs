//! Append-only writes to the archive document.
//!
//! Each append re-reads the document's live structure, computes the
//! insertion index just before the terminal newline, and issues exactly one
//! insert. Nothing about the document is cached between appends.
//!
//! Appends to the same document from one process are serialized with a
//! per-document lock; the external store has no concurrency control of its
//! own, so two in-flight appends could otherwise compute the same index.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::AppendError;
use crate::models::{viewer_url, ArchiveEntry, Clock, Confirmation, ContentBlock, DocumentId};
use crate::store::DocumentStore;

pub struct AppendEngine {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    viewer_base: String,
    locks: Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
}

impl AppendEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        viewer_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            viewer_base: viewer_base.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: &DocumentId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// Append `block` as a timestamped entry at the end of `id`.
    pub async fn append(
        &self,
        id: &DocumentId,
        block: &ContentBlock,
    ) -> Result<Confirmation, AppendError> {
        let doc_lock = self.lock_for(id).await;
        let _guard = doc_lock.lock().await;

        let structure =
            self.store
                .content_structure(id)
                .await
                .map_err(|cause| AppendError::FetchFailed {
                    id: id.to_string(),
                    cause,
                })?;
        if structure.is_structurally_empty() {
            warn!(document_id = %id, "document has no content elements; inserting at start");
        }
        let index = structure.insertion_index();

        let entry = ArchiveEntry::new(self.clock.now(), block);
        self.store
            .batch_insert_text(id, index, entry.text())
            .await
            .map_err(|cause| AppendError::InsertFailed {
                id: id.to_string(),
                cause,
            })?;
        info!(document_id = %id, index, "entry appended");

        Ok(Confirmation {
            document_id: id.clone(),
            url: viewer_url(&self.viewer_base, id),
            archived_at: entry.archived_at,
            index,
        })
    }
}
