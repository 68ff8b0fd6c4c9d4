//! Document buffer: the immutable base text of a session plus structural markers.
//!
//! The text never changes during a session, so every character offset stays stable and can be
//! referenced by annotation spans. Structural markers (headers, dividers, speaker breaks) are
//! out-of-band facts about offsets; they are supplied by the import layer and are not entities of
//! their own.
//!
//! The text is kept twice: once as a shared `str` for substring search and cheap snapshot
//! cloning, and once as a [`Rope`] for O(log n) char/byte/line conversion.

use crate::error::{EngineError, EngineResult};
use crate::span::Span;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use unicode_segmentation::{GraphemeCursor, UnicodeSegmentation};

/// Kind of a structural marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerKind {
    /// A section header starting at the marker offset.
    Header {
        /// Heading level (1 = top level).
        level: u8,
        /// Header text.
        title: String,
    },
    /// A visual divider before the marker offset.
    Divider,
    /// A change of speaker (interview transcripts).
    SpeakerBreak {
        /// Speaker label.
        speaker: String,
    },
}

/// A structural hint anchored at a document offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralMarker {
    /// Character offset the marker is attached to (`0..=len`).
    pub offset: usize,
    /// What the marker represents.
    #[serde(flatten)]
    pub kind: MarkerKind,
}

impl StructuralMarker {
    /// Create a header marker.
    pub fn header(offset: usize, level: u8, title: impl Into<String>) -> Self {
        Self {
            offset,
            kind: MarkerKind::Header {
                level,
                title: title.into(),
            },
        }
    }

    /// Create a divider marker.
    pub fn divider(offset: usize) -> Self {
        Self {
            offset,
            kind: MarkerKind::Divider,
        }
    }

    /// Create a speaker-break marker.
    pub fn speaker(offset: usize, speaker: impl Into<String>) -> Self {
        Self {
            offset,
            kind: MarkerKind::SpeakerBreak {
                speaker: speaker.into(),
            },
        }
    }
}

/// The base text of a session.
#[derive(Debug, Clone)]
pub struct Document {
    text: Arc<str>,
    rope: Rope,
    markers: Vec<StructuralMarker>,
}

impl Document {
    /// Create a document without structural markers.
    pub fn new(text: &str) -> Self {
        Self {
            text: Arc::from(text),
            rope: Rope::from_str(text),
            markers: Vec::new(),
        }
    }

    /// Create a document with structural markers. Markers are sorted by offset; a marker past the
    /// end of the text is rejected.
    pub fn with_markers(text: &str, mut markers: Vec<StructuralMarker>) -> EngineResult<Self> {
        let mut doc = Self::new(text);
        let len = doc.len_chars();
        if let Some(bad) = markers.iter().find(|m| m.offset > len) {
            return Err(EngineError::InvalidRange {
                start: bad.offset,
                end: bad.offset,
                len,
            });
        }
        markers.sort_by_key(|m| m.offset);
        doc.markers = markers;
        Ok(doc)
    }

    /// Length in characters.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// `true` when the document has no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Full text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text covered by a span (clamped to the document).
    pub fn slice(&self, span: Span) -> String {
        let len = self.len_chars();
        let start = span.start.min(len);
        let end = span.end.min(len).max(start);
        self.rope.slice(start..end).to_string()
    }

    /// Number of logical lines.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Zero-based line containing the offset (clamped to the document).
    pub fn line_of(&self, offset: usize) -> usize {
        self.rope.char_to_line(offset.min(self.len_chars()))
    }

    /// Check that a span is non-empty and lies inside the document.
    pub fn validate(&self, span: Span) -> EngineResult<Span> {
        let len = self.len_chars();
        if span.is_empty() || span.end > len {
            return Err(EngineError::InvalidRange {
                start: span.start,
                end: span.end,
                len,
            });
        }
        Ok(span)
    }

    /// All structural markers, sorted by offset.
    pub fn markers(&self) -> &[StructuralMarker] {
        &self.markers
    }

    /// Markers anchored inside a span.
    pub fn markers_in(&self, span: Span) -> &[StructuralMarker] {
        let from = self.markers.partition_point(|m| m.offset < span.start);
        let to = self.markers.partition_point(|m| m.offset < span.end);
        &self.markers[from..to]
    }

    /// Header markers with their offsets.
    pub fn headers(&self) -> impl Iterator<Item = (usize, u8, &str)> {
        self.markers.iter().filter_map(|m| match &m.kind {
            MarkerKind::Header { level, title } => Some((m.offset, *level, title.as_str())),
            _ => None,
        })
    }

    /// Find the first occurrence of `needle` at or after char offset `from`.
    pub fn find(&self, needle: &str, from: usize) -> Option<Span> {
        if needle.is_empty() || from >= self.len_chars() {
            return None;
        }
        let from_byte = self.rope.char_to_byte(from);
        let byte = self.text[from_byte..].find(needle)? + from_byte;
        let start = self.rope.byte_to_char(byte);
        let end = self.rope.byte_to_char(byte + needle.len());
        Some(Span::new(start, end))
    }

    /// Number of words (Unicode word boundaries) inside a span.
    pub fn word_count(&self, span: Span) -> usize {
        self.slice(span).unicode_words().count()
    }

    /// Number of words covered by `spans` minus the words covered by `cuts`.
    pub fn word_count_excluding(&self, spans: &[Span], cuts: &[Span]) -> usize {
        let total: usize = spans.iter().map(|s| self.word_count(*s)).sum();
        let cut: usize = cuts.iter().map(|s| self.word_count(*s)).sum();
        total.saturating_sub(cut)
    }

    /// Widen a span so neither end cuts through a grapheme cluster.
    pub fn snap_to_graphemes(&self, span: Span) -> Span {
        let len = self.len_chars();
        let start = span.start.min(len);
        let end = span.end.min(len).max(start);

        let start_byte = self.rope.char_to_byte(start);
        let end_byte = self.rope.char_to_byte(end);
        let snapped_start = self.grapheme_floor(start_byte).unwrap_or(start_byte);
        let snapped_end = self.grapheme_ceil(end_byte).unwrap_or(end_byte);

        Span::new(
            self.rope.byte_to_char(snapped_start),
            self.rope.byte_to_char(snapped_end),
        )
    }

    fn grapheme_floor(&self, byte: usize) -> Option<usize> {
        let mut cursor = GraphemeCursor::new(byte, self.text.len(), true);
        if cursor.is_boundary(&self.text, 0).ok()? {
            return Some(byte);
        }
        cursor.prev_boundary(&self.text, 0).ok()?
    }

    fn grapheme_ceil(&self, byte: usize) -> Option<usize> {
        let mut cursor = GraphemeCursor::new(byte, self.text.len(), true);
        if cursor.is_boundary(&self.text, 0).ok()? {
            return Some(byte);
        }
        cursor.next_boundary(&self.text, 0).ok()?
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_and_find_use_char_offsets() {
        let doc = Document::new("héllo wörld");
        assert_eq!(doc.len_chars(), 11);
        assert_eq!(doc.slice(Span::new(6, 11)), "wörld");
        assert_eq!(doc.find("wörld", 0), Some(Span::new(6, 11)));
        assert_eq!(doc.find("wörld", 7), None);
    }

    #[test]
    fn test_validate_rejects_empty_and_out_of_bounds() {
        let doc = Document::new("abc");
        assert!(doc.validate(Span::new(0, 3)).is_ok());
        assert!(matches!(
            doc.validate(Span::new(2, 2)),
            Err(EngineError::InvalidRange { len: 3, .. })
        ));
        assert!(doc.validate(Span::new(1, 4)).is_err());
    }

    #[test]
    fn test_markers_sorted_and_bounded() {
        let doc = Document::with_markers(
            "Intro\nBody text",
            vec![
                StructuralMarker::divider(6),
                StructuralMarker::header(0, 1, "Intro"),
            ],
        )
        .unwrap();
        assert_eq!(doc.markers()[0].offset, 0);
        assert_eq!(doc.markers_in(Span::new(1, 10)).len(), 1);
        assert_eq!(doc.headers().count(), 1);

        assert!(Document::with_markers("abc", vec![StructuralMarker::divider(10)]).is_err());
    }

    #[test]
    fn test_word_count_excluding_cuts() {
        let doc = Document::new("one two three four");
        let all = [Span::new(0, 18)];
        assert_eq!(doc.word_count_excluding(&all, &[]), 4);
        assert_eq!(doc.word_count_excluding(&all, &[Span::new(4, 13)]), 2);
    }

    #[test]
    fn test_snap_to_graphemes_does_not_split_clusters() {
        // "e" + combining acute accent forms one grapheme cluster.
        let doc = Document::new("cafe\u{301} au lait");
        let snapped = doc.snap_to_graphemes(Span::new(0, 4));
        assert_eq!(snapped, Span::new(0, 5));
        assert_eq!(doc.line_of(3), 0);
    }
}
