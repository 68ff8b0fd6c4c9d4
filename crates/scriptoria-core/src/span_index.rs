//! Span Index: ordered `(span, owner)` entries with fast overlap queries.
//!
//! Uses a sorted vector with binary search plus a prefix maximum of span ends.
//! Query complexity: O(log n + k), where k is the number of candidate entries.
//! Insertion complexity: O(n) (requires maintaining sort order).

use crate::annotation::AnnotationId;
use crate::span::Span;
use std::collections::HashMap;

/// One indexed span together with the annotation owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexEntry {
    /// Indexed range.
    pub span: Span,
    /// Owning annotation.
    pub owner: AnnotationId,
}

/// Interval index over annotation spans.
///
/// Entries are kept sorted by `(start, end, owner)`, which is also the document order in which
/// every query returns its results.
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    entries: Vec<IndexEntry>,
    /// `prefix_max_end[i] = max(entries[0..=i].span.end)`, used to stop backward scans early.
    prefix_max_end: Vec<usize>,
    owners: HashMap<AnnotationId, Vec<Span>>,
}

impl SpanIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild_prefix_max_end_from(&mut self, start_idx: usize) {
        if self.entries.is_empty() {
            self.prefix_max_end.clear();
            return;
        }

        if self.prefix_max_end.len() != self.entries.len() {
            self.prefix_max_end.resize(self.entries.len(), 0);
        }

        let mut max_end = if start_idx == 0 {
            0
        } else {
            self.prefix_max_end[start_idx - 1]
        };

        for (idx, entry) in self.entries.iter().enumerate().skip(start_idx) {
            max_end = max_end.max(entry.span.end);
            self.prefix_max_end[idx] = max_end;
        }
    }

    /// Insert one span for `owner`. Empty spans are ignored.
    pub fn insert(&mut self, span: Span, owner: AnnotationId) {
        if span.is_empty() {
            return;
        }
        let entry = IndexEntry { span, owner };
        let pos = self.entries.partition_point(|e| *e < entry);
        self.entries.insert(pos, entry);
        self.prefix_max_end.insert(pos, 0);
        self.rebuild_prefix_max_end_from(pos);

        let spans = self.owners.entry(owner).or_default();
        let at = spans.partition_point(|s| *s < span);
        spans.insert(at, span);
    }

    /// Insert every span of an owner.
    pub fn insert_all(&mut self, spans: &[Span], owner: AnnotationId) {
        for span in spans {
            self.insert(*span, owner);
        }
    }

    /// Remove every entry of `owner`, returning its spans in document order.
    pub fn remove(&mut self, owner: AnnotationId) -> Vec<Span> {
        let Some(spans) = self.owners.remove(&owner) else {
            return Vec::new();
        };

        let mut first_touched = self.entries.len();
        for span in &spans {
            let entry = IndexEntry { span: *span, owner };
            if let Ok(pos) = self.entries.binary_search(&entry) {
                self.entries.remove(pos);
                self.prefix_max_end.remove(pos);
                first_touched = first_touched.min(pos);
            }
        }
        if first_touched < self.entries.len() {
            self.rebuild_prefix_max_end_from(first_touched);
        }
        spans
    }

    /// Replace the spans of `owner`. Entries of other owners are untouched, so overlap with a
    /// sibling annotation is never lost.
    pub fn adjust(&mut self, owner: AnnotationId, new_spans: &[Span]) {
        self.remove(owner);
        self.insert_all(new_spans, owner);
    }

    /// Spans currently indexed for `owner`, in document order.
    pub fn spans_of(&self, owner: AnnotationId) -> &[Span] {
        self.owners.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All entries overlapping `range`, in document order.
    pub fn query(&self, range: Span) -> Vec<IndexEntry> {
        if self.entries.is_empty() || range.is_empty() {
            return Vec::new();
        }

        // Every overlapping entry starts before `range.end`.
        let search_end = self.entries.partition_point(|e| e.span.start < range.end);
        if search_end == 0 {
            return Vec::new();
        }

        // Start at the first entry starting at or after `range.start`, then walk backward until
        // `prefix_max_end` shows no earlier entry can reach into the range.
        let mut scan_start = self
            .entries
            .partition_point(|e| e.span.start < range.start)
            .min(search_end);
        while scan_start > 0 && self.prefix_max_end[scan_start - 1] > range.start {
            scan_start -= 1;
        }

        self.entries[scan_start..search_end]
            .iter()
            .filter(|e| e.span.overlaps(&range))
            .copied()
            .collect()
    }

    /// All entries containing `offset`, in document order.
    pub fn query_point(&self, offset: usize) -> Vec<IndexEntry> {
        self.query(Span::new(offset, offset.saturating_add(1)))
    }

    /// Distinct owners with a span overlapping or directly adjacent to `range`.
    pub fn touching(&self, range: Span) -> Vec<AnnotationId> {
        let widened = Span::new(range.start.saturating_sub(1), range.end.saturating_add(1));
        let mut owners = Vec::new();
        for entry in self.query(widened) {
            if entry.span.touches(&range) && !owners.contains(&entry.owner) {
                owners.push(entry.owner);
            }
        }
        owners
    }

    /// Owners in id order.
    pub fn owners(&self) -> Vec<AnnotationId> {
        let mut owners: Vec<_> = self.owners.keys().copied().collect();
        owners.sort();
        owners
    }

    /// All entries in document order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of indexed spans.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.prefix_max_end.clear();
        self.owners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> AnnotationId {
        AnnotationId(n)
    }

    #[test]
    fn test_query_returns_document_order() {
        let mut index = SpanIndex::new();
        index.insert(Span::new(50, 90), id(2));
        index.insert(Span::new(0, 100), id(1));
        index.insert(Span::new(10, 20), id(3));

        let hits: Vec<_> = index.query(Span::new(15, 60)).iter().map(|e| e.owner).collect();
        assert_eq!(hits, vec![id(1), id(3), id(2)]);
        assert!(index.query(Span::new(100, 120)).is_empty());
    }

    #[test]
    fn test_query_point_respects_half_open_ends() {
        let mut index = SpanIndex::new();
        index.insert(Span::new(0, 50), id(1));
        index.insert(Span::new(50, 90), id(2));

        let at_boundary: Vec<_> = index.query_point(50).iter().map(|e| e.owner).collect();
        assert_eq!(at_boundary, vec![id(2)]);
        assert_eq!(index.query_point(49)[0].owner, id(1));
        assert!(index.query_point(90).is_empty());
    }

    #[test]
    fn test_long_span_found_from_far_right() {
        let mut index = SpanIndex::new();
        index.insert(Span::new(0, 10_000), id(1));
        for i in 0..100 {
            index.insert(Span::new(i * 10 + 1, i * 10 + 5), id(100 + i as u64));
        }
        let hits = index.query_point(9_000);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, id(1));
    }

    #[test]
    fn test_adjust_leaves_siblings_alone() {
        let mut index = SpanIndex::new();
        index.insert(Span::new(0, 50), id(1));
        index.insert(Span::new(20, 80), id(2));

        index.adjust(id(1), &[Span::new(0, 30), Span::new(60, 70)]);
        assert_eq!(index.spans_of(id(1)), &[Span::new(0, 30), Span::new(60, 70)]);
        assert_eq!(index.spans_of(id(2)), &[Span::new(20, 80)]);

        let owners: Vec<_> = index.query(Span::new(25, 65)).iter().map(|e| e.owner).collect();
        assert_eq!(owners, vec![id(1), id(2), id(1)]);
    }

    #[test]
    fn test_remove_returns_spans_and_rebuilds_prefix() {
        let mut index = SpanIndex::new();
        index.insert(Span::new(0, 1_000), id(1));
        index.insert(Span::new(10, 20), id(2));

        assert_eq!(index.remove(id(1)), vec![Span::new(0, 1_000)]);
        assert!(index.query_point(500).is_empty());
        assert_eq!(index.len(), 1);
        assert!(index.remove(id(1)).is_empty());
    }

    #[test]
    fn test_touching_includes_neighbours() {
        let mut index = SpanIndex::new();
        index.insert(Span::new(0, 50), id(1));
        index.insert(Span::new(50, 90), id(2));
        index.insert(Span::new(91, 95), id(3));

        assert_eq!(index.touching(Span::new(0, 50)), vec![id(1), id(2)]);
    }
}
