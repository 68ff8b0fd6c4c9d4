//! Half-open character ranges and small set algebra over sorted span lists.
//!
//! Offsets are counted in Unicode scalar values (`char`s) from the start of the document.
//! A span list is *normalized* when it is sorted by start, contains no empty span, and no two
//! spans touch or overlap. Annotation spans and strikethrough ranges are always kept normalized.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A half-open character range `[start, end)`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Span {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a span from `start..end`. No validation happens here; the engine rejects empty or
    /// out-of-bounds spans at its boundary.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// `true` for zero-length or reversed spans.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if the span contains the offset.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Check if `other` lies entirely inside this span.
    pub fn covers(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check if two spans share at least one character.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if two spans overlap or are directly adjacent.
    pub fn touches(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Common part of two spans.
    pub fn intersection(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Span { start, end })
    }

    /// Remove `removed` from this span, returning the remainders left and right of it.
    pub fn subtract(&self, removed: &Span) -> (Option<Span>, Option<Span>) {
        if !self.overlaps(removed) {
            return if removed.end <= self.start {
                (None, Some(*self))
            } else {
                (Some(*self), None)
            };
        }
        let left = (self.start < removed.start).then(|| Span::new(self.start, removed.start));
        let right = (removed.end < self.end).then(|| Span::new(removed.end, self.end));
        (left, right)
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Sort, drop empty spans and coalesce touching spans in place.
pub fn normalize(spans: &mut Vec<Span>) {
    spans.retain(|s| !s.is_empty());
    spans.sort();

    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        match out.last_mut() {
            Some(last) if last.touches(&span) => last.end = last.end.max(span.end),
            _ => out.push(span),
        }
    }
    *spans = out;
}

/// Normalized copy of `spans`.
pub fn normalized(spans: &[Span]) -> Vec<Span> {
    let mut out = spans.to_vec();
    normalize(&mut out);
    out
}

/// Remove `removed` from every span of a normalized list.
pub fn subtract_all(spans: &[Span], removed: &Span) -> Vec<Span> {
    let mut out = Vec::with_capacity(spans.len() + 1);
    for span in spans {
        let (left, right) = span.subtract(removed);
        out.extend(left);
        out.extend(right);
    }
    out
}

/// Normalized union of two span lists.
pub fn union_all(a: &[Span], b: &[Span]) -> Vec<Span> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    normalize(&mut out);
    out
}

/// Normalized intersection of `spans` with `within` (both normalized).
pub fn clip_to(spans: &[Span], within: &[Span]) -> Vec<Span> {
    let mut out = Vec::new();
    for span in spans {
        for bound in within {
            if bound.start >= span.end {
                break;
            }
            if let Some(common) = span.intersection(bound) {
                out.push(common);
            }
        }
    }
    normalize(&mut out);
    out
}

/// Total number of characters covered by a normalized list.
pub fn coverage_len(spans: &[Span]) -> usize {
    spans.iter().map(Span::len).sum()
}

/// Smallest span covering every span of a normalized list.
pub fn bounds(spans: &[Span]) -> Option<Span> {
    let first = spans.first()?;
    let last = spans.last()?;
    Some(Span::new(first.start, last.end))
}

/// Check whether any span of `a` touches any span of `b`.
pub fn any_touching(a: &[Span], b: &[Span]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.touches(y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_middle_produces_two_remainders() {
        let span = Span::new(100, 200);
        let (left, right) = span.subtract(&Span::new(140, 160));
        assert_eq!(left, Some(Span::new(100, 140)));
        assert_eq!(right, Some(Span::new(160, 200)));
    }

    #[test]
    fn test_subtract_covering_range_leaves_nothing() {
        let span = Span::new(10, 20);
        assert_eq!(span.subtract(&Span::new(5, 25)), (None, None));
        assert_eq!(span.subtract(&Span::new(10, 20)), (None, None));
    }

    #[test]
    fn test_subtract_disjoint_keeps_span_on_correct_side() {
        let span = Span::new(10, 20);
        assert_eq!(span.subtract(&Span::new(0, 5)), (None, Some(span)));
        assert_eq!(span.subtract(&Span::new(20, 30)), (Some(span), None));
    }

    #[test]
    fn test_normalize_coalesces_touching_and_drops_empty() {
        let mut spans = vec![
            Span::new(50, 90),
            Span::new(0, 50),
            Span::new(95, 95),
            Span::new(100, 120),
            Span::new(110, 115),
        ];
        normalize(&mut spans);
        assert_eq!(spans, vec![Span::new(0, 90), Span::new(100, 120)]);
    }

    #[test]
    fn test_clip_to_keeps_only_covered_parts() {
        let cuts = vec![Span::new(0, 10), Span::new(30, 50)];
        let within = vec![Span::new(5, 35)];
        assert_eq!(
            clip_to(&cuts, &within),
            vec![Span::new(5, 10), Span::new(30, 35)]
        );
    }

    #[test]
    fn test_union_and_coverage() {
        let union = union_all(&[Span::new(0, 50)], &[Span::new(50, 90)]);
        assert_eq!(union, vec![Span::new(0, 90)]);
        assert_eq!(coverage_len(&union), 90);
        assert_eq!(bounds(&union), Some(Span::new(0, 90)));
    }

    #[test]
    fn test_touches_includes_adjacency() {
        assert!(Span::new(0, 50).touches(&Span::new(50, 90)));
        assert!(!Span::new(0, 50).overlaps(&Span::new(50, 90)));
        assert!(!Span::new(0, 49).touches(&Span::new(50, 90)));
    }
}
