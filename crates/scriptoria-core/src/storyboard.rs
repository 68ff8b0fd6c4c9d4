//! Storyboard Projector: the user-ordered "used in script" sequence.
//!
//! The storyboard references annotations by id only and its order is independent of document
//! order. It is mutated exclusively through engine mutations so that membership, the `used` flag
//! and the undo history stay consistent; this module only offers the read side plus the raw
//! primitives the engine replays.

use crate::annotation::AnnotationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable storyboard divider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DividerId(pub(crate) u64);

impl DividerId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DividerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// A section divider between storyboard entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divider {
    /// Stable id.
    pub id: DividerId,
    /// Section title.
    pub title: String,
    /// Display color.
    pub color: String,
}

/// One slot of the storyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoryboardEntry {
    /// An annotation placed in the script.
    Annotation {
        /// Referenced annotation.
        id: AnnotationId,
    },
    /// A section divider.
    Divider(Divider),
}

impl StoryboardEntry {
    /// The annotation id for annotation entries.
    pub fn annotation(&self) -> Option<AnnotationId> {
        match self {
            StoryboardEntry::Annotation { id } => Some(*id),
            StoryboardEntry::Divider(_) => None,
        }
    }

    /// The divider for divider entries.
    pub fn divider(&self) -> Option<&Divider> {
        match self {
            StoryboardEntry::Divider(divider) => Some(divider),
            StoryboardEntry::Annotation { .. } => None,
        }
    }
}

/// Ordered storyboard entries plus per-annotation header labels.
#[derive(Debug, Clone, Default)]
pub struct Storyboard {
    entries: Vec<StoryboardEntry>,
    headers: BTreeMap<AnnotationId, String>,
    next_divider_id: u64,
}

impl Storyboard {
    /// Create an empty storyboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotation ids in storyboard order.
    pub fn list(&self) -> Vec<AnnotationId> {
        self.entries.iter().filter_map(StoryboardEntry::annotation).collect()
    }

    /// All entries, dividers included.
    pub fn entries(&self) -> &[StoryboardEntry] {
        &self.entries
    }

    /// Number of entries, dividers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the storyboard has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry position of an annotation.
    pub fn position(&self, id: AnnotationId) -> Option<usize> {
        self.entries.iter().position(|e| e.annotation() == Some(id))
    }

    /// Entry position of a divider.
    pub fn divider_position(&self, id: DividerId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.divider().is_some_and(|d| d.id == id))
    }

    /// Check if the annotation is a storyboard member.
    pub fn contains(&self, id: AnnotationId) -> bool {
        self.position(id).is_some()
    }

    /// Header label shown above an annotation entry.
    pub fn header(&self, id: AnnotationId) -> Option<&str> {
        self.headers.get(&id).map(String::as_str)
    }

    /// All header labels.
    pub fn headers(&self) -> &BTreeMap<AnnotationId, String> {
        &self.headers
    }

    /// The id the next divider will receive.
    pub fn next_divider_id(&self) -> DividerId {
        DividerId(self.next_divider_id)
    }

    /// Entries reordered by document position.
    ///
    /// Annotations are stable-sorted by `start_of`; each divider travels with the annotation that
    /// follows it, and dividers after the last annotation stay at the end.
    pub fn chronological_order(
        &self,
        start_of: impl Fn(AnnotationId) -> usize,
    ) -> Vec<StoryboardEntry> {
        let mut groups: Vec<(usize, Vec<StoryboardEntry>)> = Vec::new();
        let mut pending: Vec<StoryboardEntry> = Vec::new();
        for entry in &self.entries {
            match entry.annotation() {
                Some(id) => {
                    pending.push(entry.clone());
                    groups.push((start_of(id), std::mem::take(&mut pending)));
                }
                None => pending.push(entry.clone()),
            }
        }
        groups.sort_by_key(|(start, _)| *start);

        let mut out: Vec<StoryboardEntry> = groups.into_iter().flat_map(|(_, g)| g).collect();
        out.extend(pending);
        out
    }

    pub(crate) fn allocate_divider_id(&mut self) -> DividerId {
        let id = DividerId(self.next_divider_id);
        self.next_divider_id += 1;
        id
    }

    pub(crate) fn set_next_divider_id(&mut self, next: u64) {
        self.next_divider_id = self.next_divider_id.max(next);
    }

    pub(crate) fn insert_entry(&mut self, index: usize, entry: StoryboardEntry) {
        if let StoryboardEntry::Divider(divider) = &entry {
            self.next_divider_id = self.next_divider_id.max(divider.id.0 + 1);
        }
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    pub(crate) fn remove_entry(&mut self, index: usize) -> Option<StoryboardEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub(crate) fn replace_entries(&mut self, entries: Vec<StoryboardEntry>) {
        self.entries = entries;
    }

    pub(crate) fn set_header(&mut self, id: AnnotationId, header: Option<String>) {
        match header {
            Some(text) => {
                self.headers.insert(id, text);
            }
            None => {
                self.headers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(entries: Vec<StoryboardEntry>) -> Storyboard {
        let mut board = Storyboard::new();
        for (i, entry) in entries.into_iter().enumerate() {
            board.insert_entry(i, entry);
        }
        board
    }

    fn ann(n: u64) -> StoryboardEntry {
        StoryboardEntry::Annotation { id: AnnotationId(n) }
    }

    fn div(n: u64) -> StoryboardEntry {
        StoryboardEntry::Divider(Divider {
            id: DividerId(n),
            title: format!("Part {n}"),
            color: "#cccccc".into(),
        })
    }

    #[test]
    fn test_list_skips_dividers() {
        let board = board(vec![div(0), ann(3), ann(1)]);
        assert_eq!(board.list(), vec![AnnotationId(3), AnnotationId(1)]);
        assert_eq!(board.position(AnnotationId(1)), Some(2));
        assert_eq!(board.divider_position(DividerId(0)), Some(0));
        assert_eq!(board.next_divider_id(), DividerId(1));
    }

    #[test]
    fn test_chronological_order_is_stable_and_keeps_dividers_attached() {
        // starts: 3 -> 500, 1 -> 100, 2 -> 100
        let board = board(vec![ann(3), div(0), ann(1), ann(2), div(1)]);
        let starts = |id: AnnotationId| match id.get() {
            3 => 500,
            _ => 100,
        };
        let order = board.chronological_order(starts);
        assert_eq!(order, vec![div(0), ann(1), ann(2), ann(3), div(1)]);
    }

    #[test]
    fn test_headers() {
        let mut board = board(vec![ann(1)]);
        board.set_header(AnnotationId(1), Some("Opening".into()));
        assert_eq!(board.header(AnnotationId(1)), Some("Opening"));
        board.set_header(AnnotationId(1), None);
        assert_eq!(board.header(AnnotationId(1)), None);
    }
}
