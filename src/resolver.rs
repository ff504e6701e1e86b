//! Canonical document resolution.
//!
//! [`DocumentResolver::resolve`] returns exactly one document id per
//! `(fixed_id, title)`:
//!
//! 1. A readable fixed id always wins.
//! 2. Otherwise the most recently modified document with the exact title.
//! 3. Otherwise a new document, seeded with a header block.
//!
//! Resolved ids are remembered per title for the lifetime of the resolver, so
//! a second call in the same run never searches (or creates) again. Two
//! independent processes can still race and both create a document; that is
//! accepted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ResolutionError;
use crate::models::{Clock, DocumentId, TIMESTAMP_FORMAT};
use crate::store::{DocumentStore, FileQuery, MIN_OFFSET};

const HEADER_RULE_WIDTH: usize = 50;

pub struct DocumentResolver {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    header_title: String,
    resolved: Mutex<HashMap<String, DocumentId>>,
}

impl DocumentResolver {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        header_title: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            header_title: header_title.into(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(
        &self,
        fixed_id: Option<&str>,
        title: &str,
    ) -> Result<DocumentId, ResolutionError> {
        if let Some(id) = fixed_id {
            match self.check_fixed(id).await {
                Ok(id) => return Ok(id),
                Err(e) => warn!(error = %e, "falling back to title search"),
            }
        }

        // Held across search and create so one resolver never creates twice.
        let mut resolved = self.resolved.lock().await;
        if let Some(id) = resolved.get(title) {
            return Ok(id.clone());
        }

        let id = match self.find_by_title(title).await? {
            Some(id) => {
                info!(document_id = %id, title, "found existing document");
                id
            }
            None => self.create_with_header(title).await?,
        };
        resolved.insert(title.to_string(), id.clone());
        Ok(id)
    }

    async fn check_fixed(&self, id: &str) -> Result<DocumentId, ResolutionError> {
        let id = DocumentId::new(id);
        match self.store.get(&id).await {
            Ok(meta) => Ok(meta.id),
            Err(cause) => Err(ResolutionError::NotFoundInaccessible {
                id: id.to_string(),
                cause,
            }),
        }
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<DocumentId>, ResolutionError> {
        let files = self
            .store
            .list(&FileQuery::documents_titled(title))
            .await
            .map_err(ResolutionError::StoreUnavailable)?;
        if files.len() > 1 {
            warn!(
                title,
                matches = files.len(),
                "several documents share the title; using the most recently modified"
            );
        }
        Ok(files.into_iter().next().map(|f| f.id))
    }

    async fn create_with_header(&self, title: &str) -> Result<DocumentId, ResolutionError> {
        let id = self
            .store
            .create(title)
            .await
            .map_err(ResolutionError::StoreUnavailable)?;
        info!(document_id = %id, title, "created new document");

        self.store
            .batch_insert_text(&id, MIN_OFFSET, &self.header())
            .await
            .map_err(ResolutionError::StoreUnavailable)?;
        Ok(id)
    }

    /// Header block written at the start of a new document.
    pub fn header(&self) -> String {
        format!(
            "# {}\n\nStarted: {}\n\n{}\n\n",
            self.header_title,
            self.clock.now().format(TIMESTAMP_FORMAT),
            "=".repeat(HEADER_RULE_WIDTH)
        )
    }
}
