//! Document store abstraction.
//!
//! The [`DocumentStore`] trait covers the handful of document and
//! file-listing operations the archive needs, so the resolver and append
//! engine can run against Google Docs ([`crate::google::GoogleDocsStore`]) or
//! the [`memory::InMemoryDocumentStore`] used in tests.
//!
//! # Index model
//!
//! Offsets are in UTF-16 code units, starting at 1. A document body always
//! ends with an implicit terminal newline; text can be inserted at any index
//! up to, but not past, that terminal newline.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::DocumentId;

/// Smallest valid insertion index in a document body.
pub const MIN_OFFSET: i64 = 1;

/// MIME type of a Google Docs document.
pub const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

/// Lightweight document metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub title: String,
}

/// Content structure of a document, as returned by `documents.get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStructure {
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Body,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

/// A top-level body element (section break, paragraph, table, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<i64>,
}

impl DocumentStructure {
    pub fn is_structurally_empty(&self) -> bool {
        self.body.content.is_empty()
    }

    /// Position just past the last content element, or [`MIN_OFFSET`] when
    /// the body has no elements.
    pub fn end_offset(&self) -> i64 {
        self.body
            .content
            .iter()
            .filter_map(|e| e.end_index)
            .max()
            .unwrap_or(MIN_OFFSET)
    }

    /// Where new text must go: immediately before the terminal newline,
    /// never below [`MIN_OFFSET`].
    pub fn insertion_index(&self) -> i64 {
        (self.end_offset() - 1).max(MIN_OFFSET)
    }
}

/// A file returned by a title search, most recently modified first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: DocumentId,
    pub name: String,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Exact-title search for files of one MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub title: String,
    pub mime_type: String,
}

impl FileQuery {
    pub fn documents_titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            mime_type: DOCUMENT_MIME_TYPE.to_string(),
        }
    }
}

/// External document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](DocumentStore::get) | Check a document exists and is readable |
/// | [`content_structure`](DocumentStore::content_structure) | Live body structure for offsets |
/// | [`create`](DocumentStore::create) | Create an empty document |
/// | [`batch_insert_text`](DocumentStore::batch_insert_text) | Single atomic text insert |
/// | [`list`](DocumentStore::list) | Title search, most recently modified first |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &DocumentId) -> Result<DocumentMeta, StoreError>;

    async fn content_structure(&self, id: &DocumentId) -> Result<DocumentStructure, StoreError>;

    async fn create(&self, title: &str) -> Result<DocumentId, StoreError>;

    async fn batch_insert_text(
        &self,
        id: &DocumentId,
        index: i64,
        text: &str,
    ) -> Result<(), StoreError>;

    async fn list(&self, query: &FileQuery) -> Result<Vec<FileEntry>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(ends: &[Option<i64>]) -> DocumentStructure {
        DocumentStructure {
            document_id: "d".to_string(),
            title: "t".to_string(),
            body: Body {
                content: ends
                    .iter()
                    .map(|e| StructuralElement {
                        start_index: None,
                        end_index: *e,
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn test_empty_structure_uses_min_offset() {
        let s = structure(&[]);
        assert!(s.is_structurally_empty());
        assert_eq!(s.end_offset(), MIN_OFFSET);
        assert_eq!(s.insertion_index(), MIN_OFFSET);
    }

    #[test]
    fn test_new_document_inserts_at_one() {
        // Section break ends at 1, empty paragraph spans 1..2.
        let s = structure(&[Some(1), Some(2)]);
        assert_eq!(s.end_offset(), 2);
        assert_eq!(s.insertion_index(), 1);
    }

    #[test]
    fn test_insert_before_terminal_newline() {
        let s = structure(&[Some(1), Some(40), Some(97)]);
        assert_eq!(s.insertion_index(), 96);
    }

    #[test]
    fn test_last_element_without_end_index() {
        let s = structure(&[Some(1), Some(12), None]);
        assert_eq!(s.end_offset(), 12);
    }

    #[test]
    fn test_deserialize_docs_api_shape() {
        let json = r#"{
            "documentId": "abc",
            "title": "ByteBrief- Thread Saver",
            "body": {"content": [
                {"endIndex": 1, "sectionBreak": {}},
                {"startIndex": 1, "endIndex": 25, "paragraph": {}}
            ]}
        }"#;
        let s: DocumentStructure = serde_json::from_str(json).unwrap();
        assert_eq!(s.document_id, "abc");
        assert_eq!(s.body.content[0].start_index, None);
        assert_eq!(s.insertion_index(), 24);
    }

    #[test]
    fn test_deserialize_without_body() {
        let s: DocumentStructure = serde_json::from_str(r#"{"documentId":"x"}"#).unwrap();
        assert!(s.is_structurally_empty());
    }
}
