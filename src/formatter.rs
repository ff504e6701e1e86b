//! Thread normalization.
//!
//! Turns arbitrary generated text into a [`ContentBlock`] of labeled
//! segments. Pure and I/O-free.
//!
//! # Rules
//!
//! - `\r\n` becomes `\n`; outer whitespace is trimmed.
//! - Segments are separated by blank lines (lines holding only whitespace).
//! - A label line is `tweet` (any case), whitespace, a number, and an
//!   optional `:`, `.` or `-` (`Tweet 1:`, `TWEET 2.`, `Tweet 3`). Prose such
//!   as `Tweet threads: ...` is not a label.
//! - If the first segment starts with a label line, labels are preserved
//!   verbatim and every following line is grouped under the most recent
//!   label, blank lines included.
//! - Otherwise the first segment becomes `Tweet 1` and everything after it
//!   becomes `Tweet 2`. A single unlabeled segment becomes `Tweet 1`.

use crate::models::{ContentBlock, Segment};

const LABEL_WORD: &str = "tweet";

/// Normalize `raw` into a labeled [`ContentBlock`].
pub fn format(raw: &str) -> ContentBlock {
    let normalized = raw.replace("\r\n", "\n");
    let text = normalized.trim();

    let segments = split_segments(text);
    let first_is_labeled = segments
        .first()
        .and_then(|s| s.lines().next())
        .and_then(parse_label)
        .is_some();

    if first_is_labeled {
        ContentBlock::new(group_labeled(text))
    } else {
        ContentBlock::new(synthesize_labels(&segments))
    }
}

/// Split on blank-line boundaries. Returns trimmed, non-empty segments.
fn split_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                segments.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        segments.push(current.join("\n"));
    }
    segments
}

/// Parse a label line: `tweet`, whitespace, a number, then an optional
/// `:`, `.` or `-`. Returns the label (word and number, verbatim) and any
/// text that follows it on the same line.
fn parse_label(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let head = line.get(..LABEL_WORD.len())?;
    if !head.eq_ignore_ascii_case(LABEL_WORD) {
        return None;
    }
    let after = &line[LABEL_WORD.len()..];
    let number = after.trim_start();
    if number.len() == after.len() {
        return None;
    }
    let digits = number.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let label = &line[..line.len() - number.len() + digits];
    let tail = &number[digits..];
    let rest = match tail.chars().next() {
        None => "",
        Some(':' | '.' | '-') => tail[1..].trim(),
        Some(c) if c.is_whitespace() => {
            let tail = tail.trim_start();
            match tail.strip_prefix([':', '.', '-']) {
                Some(rest) => rest.trim(),
                None => tail,
            }
        }
        // "Tweet 1st", "Tweet 10x": the number is part of a word.
        Some(_) => return None,
    };
    Some((label, rest))
}

fn group_labeled(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some((label, rest)) = parse_label(line) {
            if let Some(last) = segments.last_mut() {
                last.body = join_body(&body);
            }
            body.clear();
            if !rest.is_empty() {
                body.push(rest);
            }
            segments.push(Segment::new(label, ""));
        } else {
            body.push(line.trim_end());
        }
    }
    if let Some(last) = segments.last_mut() {
        last.body = join_body(&body);
    }
    segments
}

/// Join body lines, dropping blank lines at either end.
fn join_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

fn synthesize_labels(segments: &[String]) -> Vec<Segment> {
    match segments {
        [] => Vec::new(),
        [only] => vec![Segment::new("Tweet 1", only.as_str())],
        [first, rest @ ..] => vec![
            Segment::new("Tweet 1", first.as_str()),
            Segment::new("Tweet 2", rest.join("\n\n")),
        ],
    }
}
