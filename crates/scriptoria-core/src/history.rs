//! Reversible change sets and the bounded undo/redo history.
//!
//! Every committed mutation is stored as a [`ChangeSet`]: the list of primitive [`Op`]s that were
//! applied, in order. Each op carries enough before/after state to be inverted, so undo never
//! needs a full snapshot of the project.

use crate::annotation::{Annotation, AnnotationId};
use crate::storyboard::StoryboardEntry;
use crate::theme::Theme;

/// A primitive, invertible change to the project.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Add an annotation (store + index).
    InsertAnnotation(Annotation),
    /// Remove an annotation (store + index).
    RemoveAnnotation(Annotation),
    /// Replace an annotation's spans and/or metadata.
    ReplaceAnnotation {
        /// State before the change.
        before: Annotation,
        /// State after the change.
        after: Annotation,
    },
    /// Add a theme.
    InsertTheme(Theme),
    /// Remove a theme.
    RemoveTheme(Theme),
    /// Rename, recolor or rebind a theme.
    ReplaceTheme {
        /// State before the change.
        before: Theme,
        /// State after the change.
        after: Theme,
    },
    /// Insert a storyboard entry at an entry position.
    StoryboardInsert {
        /// Entry position.
        index: usize,
        /// Inserted entry.
        entry: StoryboardEntry,
    },
    /// Remove the storyboard entry at an entry position.
    StoryboardRemove {
        /// Entry position.
        index: usize,
        /// Removed entry.
        entry: StoryboardEntry,
    },
    /// Replace the whole storyboard order.
    StoryboardReorder {
        /// Entries before the change.
        before: Vec<StoryboardEntry>,
        /// Entries after the change.
        after: Vec<StoryboardEntry>,
    },
    /// Set or clear a storyboard header label.
    SetHeader {
        /// Annotation the header belongs to.
        id: AnnotationId,
        /// Label before the change.
        before: Option<String>,
        /// Label after the change.
        after: Option<String>,
    },
}

impl Op {
    /// The op undoing this one.
    pub fn inverse(&self) -> Op {
        match self {
            Op::InsertAnnotation(a) => Op::RemoveAnnotation(a.clone()),
            Op::RemoveAnnotation(a) => Op::InsertAnnotation(a.clone()),
            Op::ReplaceAnnotation { before, after } => Op::ReplaceAnnotation {
                before: after.clone(),
                after: before.clone(),
            },
            Op::InsertTheme(t) => Op::RemoveTheme(t.clone()),
            Op::RemoveTheme(t) => Op::InsertTheme(t.clone()),
            Op::ReplaceTheme { before, after } => Op::ReplaceTheme {
                before: after.clone(),
                after: before.clone(),
            },
            Op::StoryboardInsert { index, entry } => Op::StoryboardRemove {
                index: *index,
                entry: entry.clone(),
            },
            Op::StoryboardRemove { index, entry } => Op::StoryboardInsert {
                index: *index,
                entry: entry.clone(),
            },
            Op::StoryboardReorder { before, after } => Op::StoryboardReorder {
                before: after.clone(),
                after: before.clone(),
            },
            Op::SetHeader { id, before, after } => Op::SetHeader {
                id: *id,
                before: after.clone(),
                after: before.clone(),
            },
        }
    }
}

/// The ops of one committed user action, in application order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Short name of the action (used in log lines).
    pub label: String,
    /// Applied ops.
    pub ops: Vec<Op>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ops: Vec::new(),
        }
    }

    /// Check if nothing was changed.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The change set undoing this one: every op inverted, in reverse order.
    pub fn inverse(&self) -> ChangeSet {
        ChangeSet {
            label: format!("undo {}", self.label),
            ops: self.ops.iter().rev().map(Op::inverse).collect(),
        }
    }

    /// Append the ops of another change set.
    pub fn extend(&mut self, other: ChangeSet) {
        self.ops.extend(other.ops);
    }
}

/// Bounded undo/redo stacks with clean-point tracking.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<ChangeSet>,
    redo_stack: Vec<ChangeSet>,
    limit: usize,
    /// Saved position, measured as `undo_stack.len()`. May point into the redo area.
    clean_index: Option<usize>,
}

impl History {
    /// Create an empty history holding at most `limit` undo steps.
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit,
            clean_index: Some(0),
        }
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo steps.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo steps.
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Label of the next undo step.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|s| s.label.as_str())
    }

    /// Check if the current state equals the last saved state.
    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.undo_stack.len())
    }

    /// Mark the current state as saved.
    pub fn mark_clean(&mut self) {
        self.clean_index = Some(self.undo_stack.len());
    }

    fn clear_redo_and_adjust_clean(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }

        // A clean point in the redo area becomes unreachable once redo is cleared.
        if let Some(clean_index) = self.clean_index
            && clean_index > self.undo_stack.len()
        {
            self.clean_index = None;
        }

        self.redo_stack.clear();
    }

    fn push_undo(&mut self, set: ChangeSet) {
        if self.limit == 0 {
            self.clean_index = None;
            return;
        }
        if self.undo_stack.len() >= self.limit {
            self.undo_stack.remove(0);
            self.clean_index = match self.clean_index {
                Some(0) | None => None,
                Some(i) => Some(i - 1),
            };
        }
        self.undo_stack.push(set);
    }

    /// Record a newly committed change set. Clears the redo stack.
    pub fn record(&mut self, set: ChangeSet) {
        if set.is_empty() {
            return;
        }
        self.clear_redo_and_adjust_clean();
        self.push_undo(set);
    }

    pub(crate) fn pop_undo(&mut self) -> Option<ChangeSet> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<ChangeSet> {
        self.redo_stack.pop()
    }

    /// Put back a forward change set after it was undone.
    pub(crate) fn push_redo(&mut self, set: ChangeSet) {
        self.redo_stack.push(set);
    }

    /// Put back a forward change set after it was redone (keeps the redo stack).
    pub(crate) fn push_redone(&mut self, set: ChangeSet) {
        self.push_undo(set);
    }

    /// Drop every step.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.clean_index = Some(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationId;

    fn set(label: &str) -> ChangeSet {
        ChangeSet {
            label: label.to_string(),
            ops: vec![Op::SetHeader {
                id: AnnotationId(0),
                before: None,
                after: Some(label.to_string()),
            }],
        }
    }

    #[test]
    fn test_inverse_reverses_order_and_swaps() {
        let mut forward = set("a");
        forward.ops.push(Op::SetHeader {
            id: AnnotationId(1),
            before: Some("x".into()),
            after: None,
        });
        let inverse = forward.inverse();
        assert_eq!(
            inverse.ops[0],
            Op::SetHeader {
                id: AnnotationId(1),
                before: None,
                after: Some("x".into()),
            }
        );
        assert_eq!(inverse.inverse().ops, forward.ops);
    }

    #[test]
    fn test_limit_drops_oldest_and_clean_point() {
        let mut history = History::new(2);
        assert!(history.is_clean());
        history.record(set("a"));
        history.record(set("b"));
        history.record(set("c"));
        assert_eq!(history.undo_depth(), 2);
        assert!(!history.is_clean());
        assert_eq!(history.undo_label(), Some("c"));
    }

    #[test]
    fn test_clean_point_survives_undo_redo() {
        let mut history = History::new(10);
        history.record(set("a"));
        history.mark_clean();

        let undone = history.pop_undo().unwrap();
        history.push_redo(undone);
        assert!(!history.is_clean());

        let redone = history.pop_redo().unwrap();
        history.push_redone(redone);
        assert!(history.is_clean());
    }

    #[test]
    fn test_new_record_clears_redo_and_unreachable_clean_point() {
        let mut history = History::new(10);
        history.record(set("a"));
        history.mark_clean();
        let undone = history.pop_undo().unwrap();
        history.push_redo(undone);

        history.record(set("b"));
        assert!(!history.can_redo());
        assert!(!history.is_clean());
    }
}
