//! In-memory [`DocumentStore`] for tests and offline runs.
//!
//! Mirrors the Google Docs index model closely enough to catch offset bugs:
//! bodies are stored as UTF-16, a new document holds one empty paragraph,
//! every paragraph is one structural element, and inserts at or past the
//! terminal newline are rejected the way the real API rejects them.
//!
//! Fault injection: [`set_available`](InMemoryDocumentStore::set_available),
//! [`set_accessible`](InMemoryDocumentStore::set_accessible),
//! [`trash`](InMemoryDocumentStore::trash),
//! [`seed_empty_document`](InMemoryDocumentStore::seed_empty_document) and
//! [`set_read_latency`](InMemoryDocumentStore::set_read_latency), which holds
//! structure reads open long enough for concurrent writers to interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::DocumentId;

use super::{
    Body, DocumentMeta, DocumentStore, DocumentStructure, FileEntry, FileQuery,
    StructuralElement, DOCUMENT_MIME_TYPE, MIN_OFFSET,
};

struct StoredDoc {
    title: String,
    text: Vec<u16>,
    /// False for a document whose body reports no content elements.
    structured: bool,
    /// Monotonic modification sequence, used for list ordering.
    revision: u64,
    modified_time: DateTime<Utc>,
    trashed: bool,
    accessible: bool,
}

#[derive(Default)]
struct State {
    docs: HashMap<String, StoredDoc>,
    next_id: u64,
    revision: u64,
    unavailable: bool,
    read_latency: Duration,
}

impl State {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Transport("store unavailable".to_string()));
        }
        Ok(())
    }

    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn insert_doc(&mut self, title: &str, text: &str, structured: bool) -> DocumentId {
        self.next_id += 1;
        let id = format!("mem-doc-{}", self.next_id);
        let revision = self.bump();
        self.docs.insert(
            id.clone(),
            StoredDoc {
                title: title.to_string(),
                text: text.encode_utf16().collect(),
                structured,
                revision,
                modified_time: Utc::now(),
                trashed: false,
                accessible: true,
            },
        );
        DocumentId::new(id)
    }

    fn readable(&self, id: &DocumentId) -> Result<&StoredDoc, StoreError> {
        match self.docs.get(id.as_str()) {
            Some(doc) if doc.accessible => Ok(doc),
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

/// In-memory document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<State>,
    creates: AtomicUsize,
    inserts: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a document whose body is `text` followed by the terminal newline.
    pub fn seed_document(&self, title: &str, text: &str) -> DocumentId {
        self.state().insert_doc(title, &format!("{}\n", text), true)
    }

    /// Add a document whose body reports no content elements at all.
    pub fn seed_empty_document(&self, title: &str) -> DocumentId {
        self.state().insert_doc(title, "", false)
    }

    /// Full body text, terminal newline included.
    pub fn text(&self, id: &DocumentId) -> Option<String> {
        self.state()
            .docs
            .get(id.as_str())
            .map(|d| String::from_utf16_lossy(&d.text))
    }

    pub fn set_available(&self, available: bool) {
        self.state().unavailable = !available;
    }

    /// Delay every structure read by `latency` after the snapshot is taken.
    pub fn set_read_latency(&self, latency: Duration) {
        self.state().read_latency = latency;
    }

    /// Make a document unreadable (e.g. permissions revoked).
    pub fn set_accessible(&self, id: &DocumentId, accessible: bool) {
        if let Some(doc) = self.state().docs.get_mut(id.as_str()) {
            doc.accessible = accessible;
        }
    }

    pub fn trash(&self, id: &DocumentId) {
        if let Some(doc) = self.state().docs.get_mut(id.as_str()) {
            doc.trashed = true;
        }
    }

    /// Mark a document as modified now, moving it to the front of listings.
    pub fn touch(&self, id: &DocumentId) {
        let mut state = self.state();
        let revision = state.bump();
        if let Some(doc) = state.docs.get_mut(id.as_str()) {
            doc.revision = revision;
            doc.modified_time = Utc::now();
        }
    }

    pub fn document_count(&self) -> usize {
        self.state().docs.len()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

/// Paragraph elements for a UTF-16 body, preceded by the section break.
fn elements(text: &[u16]) -> Vec<StructuralElement> {
    let newline = u16::from(b'\n');
    let mut content = vec![StructuralElement {
        start_index: None,
        end_index: Some(MIN_OFFSET),
    }];
    let mut start = MIN_OFFSET;
    for paragraph in text.split_inclusive(|c| *c == newline) {
        let end = start + paragraph.len() as i64;
        content.push(StructuralElement {
            start_index: Some(start),
            end_index: Some(end),
        });
        start = end;
    }
    content
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: &DocumentId) -> Result<DocumentMeta, StoreError> {
        let state = self.state();
        state.check_available()?;
        let doc = state.readable(id)?;
        Ok(DocumentMeta {
            id: id.clone(),
            title: doc.title.clone(),
        })
    }

    async fn content_structure(&self, id: &DocumentId) -> Result<DocumentStructure, StoreError> {
        let (structure, latency) = {
            let state = self.state();
            state.check_available()?;
            let doc = state.readable(id)?;
            let content = if doc.structured {
                elements(&doc.text)
            } else {
                Vec::new()
            };
            let structure = DocumentStructure {
                document_id: id.to_string(),
                title: doc.title.clone(),
                body: Body { content },
            };
            (structure, state.read_latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(structure)
    }

    async fn create(&self, title: &str) -> Result<DocumentId, StoreError> {
        let mut state = self.state();
        state.check_available()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(state.insert_doc(title, "\n", true))
    }

    async fn batch_insert_text(
        &self,
        id: &DocumentId,
        index: i64,
        text: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_available()?;
        state.readable(id)?;
        let revision = state.bump();
        let doc = state
            .docs
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let inserted: Vec<u16> = text.encode_utf16().collect();
        if !doc.structured {
            if index != MIN_OFFSET {
                return Err(StoreError::Http {
                    status: 400,
                    body: format!("Index {} must be {} in an empty document", index, MIN_OFFSET),
                });
            }
            doc.text = inserted;
            doc.text.push(u16::from(b'\n'));
            doc.structured = true;
        } else {
            let end_index = MIN_OFFSET + doc.text.len() as i64;
            if index < MIN_OFFSET || index >= end_index {
                return Err(StoreError::Http {
                    status: 400,
                    body: format!(
                        "Index {} must be less than the end index of the referenced segment, {}.",
                        index, end_index
                    ),
                });
            }
            let at = (index - MIN_OFFSET) as usize;
            doc.text.splice(at..at, inserted);
        }
        doc.revision = revision;
        doc.modified_time = Utc::now();
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, query: &FileQuery) -> Result<Vec<FileEntry>, StoreError> {
        let state = self.state();
        state.check_available()?;
        if query.mime_type != DOCUMENT_MIME_TYPE {
            return Ok(Vec::new());
        }
        let mut matches: Vec<(&String, &StoredDoc)> = state
            .docs
            .iter()
            .filter(|(_, d)| d.accessible && !d.trashed && d.title == query.title)
            .collect();
        matches.sort_by(|a, b| b.1.revision.cmp(&a.1.revision));
        Ok(matches
            .into_iter()
            .map(|(id, d)| FileEntry {
                id: DocumentId::new(id.as_str()),
                name: d.title.clone(),
                modified_time: Some(d.modified_time),
            })
            .collect())
    }
}
