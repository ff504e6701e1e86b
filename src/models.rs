//! Core data models used throughout ByteBrief.
//!
//! These types represent the canonical document handle, the normalized
//! thread block produced by the formatter, and the entry text that is
//! finally inserted into the archive document.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Maximum length of a single tweet, in characters.
pub const TWEET_CHAR_LIMIT: usize = 280;

/// Width of the rule that opens every archive entry.
const ENTRY_RULE_WIDTH: usize = 60;

/// Timestamp layout used in entry headers and the document header.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifier of a document in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One labeled part of a thread, e.g. `Tweet 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Label without the trailing colon.
    pub label: String,
    pub body: String,
}

impl Segment {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
        }
    }

    /// Body length in characters.
    pub fn len(&self) -> usize {
        self.body.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A normalized thread ready for archival.
///
/// Always holds at least one segment. Built by [`crate::formatter::format`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    segments: Vec<Segment>,
}

impl ContentBlock {
    /// Build a block from segments. An empty list yields a single empty
    /// `Tweet 1` segment.
    pub fn new(segments: Vec<Segment>) -> Self {
        if segments.is_empty() {
            return Self {
                segments: vec![Segment::new("Tweet 1", "")],
            };
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments whose body is longer than [`TWEET_CHAR_LIMIT`].
    pub fn oversized(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|s| s.len() > TWEET_CHAR_LIMIT)
    }

    /// Render as `Label:\nbody` parts separated by blank lines.
    pub fn serialize(&self) -> String {
        self.segments
            .iter()
            .map(|s| {
                if s.body.is_empty() {
                    format!("{}:", s.label)
                } else {
                    format!("{}:\n{}", s.label, s.body)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The exact text inserted into the archive document for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub archived_at: DateTime<Local>,
    text: String,
}

impl ArchiveEntry {
    pub fn new(archived_at: DateTime<Local>, block: &ContentBlock) -> Self {
        let rule = "─".repeat(ENTRY_RULE_WIDTH);
        let text = format!(
            "\n{}\n[Date] {}\n\n{}\n",
            rule,
            archived_at.format(TIMESTAMP_FORMAT),
            block.serialize()
        );
        Self { archived_at, text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Successful result of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub document_id: DocumentId,
    pub url: String,
    pub archived_at: DateTime<Local>,
    /// Index at which the entry was inserted.
    pub index: i64,
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "✅ Thread saved to Google Docs at {}: {}",
            self.archived_at.format(TIMESTAMP_FORMAT),
            self.url
        )
    }
}

/// Build the viewer URL for a document: `<viewer_base>/<id>/edit`.
pub fn viewer_url(viewer_base: &str, id: &DocumentId) -> String {
    format!("{}/{}/edit", viewer_base.trim_end_matches('/'), id)
}

/// Source of wall-clock time for entry and header timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// [`Clock`] backed by the system's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_block_gets_placeholder_segment() {
        let block = ContentBlock::new(vec![]);
        assert_eq!(block.segments().len(), 1);
        assert_eq!(block.segments()[0].label, "Tweet 1");
        assert_eq!(block.serialize(), "Tweet 1:");
    }

    #[test]
    fn test_serialize_joins_with_blank_lines() {
        let block = ContentBlock::new(vec![
            Segment::new("Tweet 1", "A"),
            Segment::new("Tweet 2", "B"),
        ]);
        assert_eq!(block.serialize(), "Tweet 1:\nA\n\nTweet 2:\nB");
    }

    #[test]
    fn test_oversized_segments() {
        let long = "x".repeat(TWEET_CHAR_LIMIT + 1);
        let block = ContentBlock::new(vec![
            Segment::new("Tweet 1", "short"),
            Segment::new("Tweet 2", long),
        ]);
        let over: Vec<_> = block.oversized().map(|s| s.label.as_str()).collect();
        assert_eq!(over, vec!["Tweet 2"]);
    }

    #[test]
    fn test_oversized_counts_chars_not_bytes() {
        let emoji = "🚀".repeat(TWEET_CHAR_LIMIT);
        let block = ContentBlock::new(vec![Segment::new("Tweet 1", emoji)]);
        assert_eq!(block.oversized().count(), 0);
    }

    #[test]
    fn test_entry_layout() {
        let block = ContentBlock::new(vec![Segment::new("Tweet 1", "Hello")]);
        let entry = ArchiveEntry::new(noon(), &block);
        let expected = format!(
            "\n{}\n[Date] 2026-01-05 12:00:00\n\nTweet 1:\nHello\n",
            "─".repeat(60)
        );
        assert_eq!(entry.text(), expected);
    }

    #[test]
    fn test_viewer_url_trims_trailing_slash() {
        let id = DocumentId::new("abc123");
        assert_eq!(
            viewer_url("https://docs.google.com/document/d/", &id),
            "https://docs.google.com/document/d/abc123/edit"
        );
    }

    #[test]
    fn test_confirmation_display() {
        let c = Confirmation {
            document_id: DocumentId::new("abc"),
            url: "https://docs.google.com/document/d/abc/edit".to_string(),
            archived_at: noon(),
            index: 42,
        };
        assert_eq!(
            c.to_string(),
            "✅ Thread saved to Google Docs at 2026-01-05 12:00:00: https://docs.google.com/document/d/abc/edit"
        );
    }
}
