//! Annotation store: the arena of annotations keyed by stable id.
//!
//! Annotations never reference each other directly. Everything that relates two annotations
//! (overlap, adjacency, shared boundaries) goes through the [`SpanIndex`](crate::SpanIndex),
//! which holds only `(span, id)` pairs.

use crate::span::{self, Span};
use crate::theme::ThemeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Stable annotation identifier. Ids are allocated from a monotonic counter and never reused,
/// not even after deletion or undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub(crate) u64);

impl AnnotationId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnnotationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(AnnotationId)
    }
}

/// User-facing metadata of an annotation. Everything here is cloned verbatim onto both halves
/// of a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationMeta {
    /// Primary theme.
    pub theme: ThemeId,
    /// Secondary themes (never contains `theme`).
    #[serde(default)]
    pub secondary_themes: BTreeSet<ThemeId>,
    /// Free-form tags, unique per annotation.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Brief note.
    #[serde(default)]
    pub notes: String,
    /// Detailed footnote.
    #[serde(default)]
    pub footnote: String,
    /// Marked as favorite.
    #[serde(default)]
    pub favorite: bool,
    /// Marked as used in the script.
    #[serde(default)]
    pub used: bool,
    /// Optional short scene label.
    #[serde(default)]
    pub scene_title: Option<String>,
}

impl AnnotationMeta {
    /// Metadata with only a primary theme set.
    pub fn new(theme: ThemeId) -> Self {
        Self {
            theme,
            secondary_themes: BTreeSet::new(),
            tags: BTreeSet::new(),
            notes: String::new(),
            footnote: String::new(),
            favorite: false,
            used: false,
            scene_title: None,
        }
    }

    /// Check if the theme is the primary or one of the secondary themes.
    pub fn has_theme(&self, theme: ThemeId) -> bool {
        self.theme == theme || self.secondary_themes.contains(&theme)
    }

    /// Primary theme followed by the secondary themes.
    pub fn all_themes(&self) -> impl Iterator<Item = ThemeId> + '_ {
        std::iter::once(self.theme).chain(self.secondary_themes.iter().copied())
    }
}

/// A highlight over one or more document spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Stable id.
    pub id: AnnotationId,
    /// Covered ranges, normalized and never empty.
    pub spans: Vec<Span>,
    /// Metadata.
    #[serde(flatten)]
    pub meta: AnnotationMeta,
    /// Sub-ranges marked as cut, normalized and clipped to `spans`.
    #[serde(default)]
    pub strikethrough: Vec<Span>,
}

impl Annotation {
    /// Smallest span covering the whole annotation.
    pub fn bounds(&self) -> Span {
        span::bounds(&self.spans).unwrap_or_default()
    }

    /// Start offset of the first span (document order key).
    pub fn start(&self) -> usize {
        self.spans.first().map(|s| s.start).unwrap_or(0)
    }

    /// Number of characters covered.
    pub fn coverage_len(&self) -> usize {
        span::coverage_len(&self.spans)
    }

    /// Replace the spans, keeping strikethrough clipped to the new coverage.
    pub(crate) fn with_spans(&self, spans: Vec<Span>) -> Annotation {
        let strikethrough = span::clip_to(&self.strikethrough, &spans);
        Annotation {
            id: self.id,
            spans,
            meta: self.meta.clone(),
            strikethrough,
        }
    }
}

/// Trim a tag, drop a leading `#`, and reject empty results.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    let tag = tag.strip_prefix('#').unwrap_or(tag).trim();
    (!tag.is_empty()).then(|| tag.to_string())
}

/// Entity table of annotations keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: BTreeMap<AnnotationId, Annotation>,
    next_id: u64,
}

impl AnnotationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an annotation.
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(&id)
    }

    /// Check if the id is live.
    pub fn contains(&self, id: AnnotationId) -> bool {
        self.annotations.contains_key(&id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.values()
    }

    /// Iterate ids in id order.
    pub fn ids(&self) -> impl Iterator<Item = AnnotationId> + '_ {
        self.annotations.keys().copied()
    }

    /// Number of live annotations.
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    /// `true` when no annotation exists.
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Ids of annotations carrying the theme as primary or secondary theme.
    pub fn with_theme(&self, theme: ThemeId) -> Vec<AnnotationId> {
        self.iter()
            .filter(|a| a.meta.has_theme(theme))
            .map(|a| a.id)
            .collect()
    }

    /// Ids of annotations carrying the tag.
    pub fn with_tag(&self, tag: &str) -> Vec<AnnotationId> {
        self.iter()
            .filter(|a| a.meta.tags.contains(tag))
            .map(|a| a.id)
            .collect()
    }

    /// Every tag in use with its number of annotations.
    pub fn all_tags(&self) -> BTreeMap<String, usize> {
        let mut tags = BTreeMap::new();
        for tag in self.iter().flat_map(|a| a.meta.tags.iter()) {
            *tags.entry(tag.clone()).or_insert(0) += 1;
        }
        tags
    }

    /// The id the next created annotation will receive.
    pub fn next_id(&self) -> AnnotationId {
        AnnotationId(self.next_id)
    }

    pub(crate) fn allocate_id(&mut self) -> AnnotationId {
        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn set_next_id(&mut self, next: u64) {
        self.next_id = self.next_id.max(next);
    }

    pub(crate) fn insert(&mut self, annotation: Annotation) -> Option<Annotation> {
        self.next_id = self.next_id.max(annotation.id.0 + 1);
        self.annotations.insert(annotation.id, annotation)
    }

    pub(crate) fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        self.annotations.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(id: u64, spans: Vec<Span>, theme: u32) -> Annotation {
        Annotation {
            id: AnnotationId(id),
            spans,
            meta: AnnotationMeta::new(ThemeId(theme)),
            strikethrough: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  #b-roll "), Some("b-roll".to_string()));
        assert_eq!(normalize_tag("#"), None);
        assert_eq!(normalize_tag("   "), None);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = AnnotationStore::new();
        let first = store.allocate_id();
        store.insert(annotation(first.0, vec![Span::new(0, 5)], 0));
        store.remove(first);
        let second = store.allocate_id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_with_spans_clips_strikethrough() {
        let mut a = annotation(1, vec![Span::new(0, 100)], 0);
        a.strikethrough = vec![Span::new(10, 20), Span::new(60, 70)];
        let left = a.with_spans(vec![Span::new(0, 40)]);
        assert_eq!(left.strikethrough, vec![Span::new(10, 20)]);
        assert_eq!(left.meta, a.meta);
    }

    #[test]
    fn test_tag_and_theme_queries() {
        let mut store = AnnotationStore::new();
        let mut a = annotation(0, vec![Span::new(0, 5)], 1);
        a.meta.tags.insert("x".into());
        a.meta.secondary_themes.insert(ThemeId(2));
        store.insert(a);
        store.insert(annotation(1, vec![Span::new(5, 9)], 2));

        assert_eq!(store.with_theme(ThemeId(2)).len(), 2);
        assert_eq!(store.with_tag("x"), vec![AnnotationId(0)]);
        assert_eq!(store.all_tags().get("x"), Some(&1));
        assert_eq!(store.next_id(), AnnotationId(2));
    }
}
