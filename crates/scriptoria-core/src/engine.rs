//! Split/Merge/Reassign Engine and the mutation request surface.
//!
//! # Overview
//!
//! [`Engine`] owns the [`Project`] (document, themes, annotation store, span index, storyboard),
//! the undo [`History`] and the [`SyncHub`]. Every change enters as a [`Mutation`] through
//! [`Engine::execute`], [`Engine::execute_batch`] or a [`Transaction`].
//!
//! A mutation is applied as a sequence of primitive [`Op`]s. Each op is applied to the project
//! and recorded at the same time; if any later validation fails, the recorded ops are inverted
//! in reverse order before the error is returned. Consumers never observe the intermediate
//! states because events are only dispatched after a successful commit, and no other code can
//! run while the engine is mutably borrowed.
//!
//! # Example
//!
//! ```rust
//! use scriptoria_core::{Engine, Mutation, MutationOutcome, NewAnnotation, Span};
//!
//! let mut engine = Engine::new("The storm came early that year.");
//! let theme = match engine
//!     .execute(Mutation::CreateTheme {
//!         name: "Key Point".into(),
//!         color: "#ffd54f".into(),
//!         hotkey: None,
//!     })
//!     .unwrap()
//! {
//!     MutationOutcome::ThemeCreated(id) => id,
//!     other => panic!("unexpected outcome {other:?}"),
//! };
//!
//! let outcome = engine
//!     .execute(Mutation::CreateAnnotation(NewAnnotation::new(Span::new(4, 9), theme)))
//!     .unwrap();
//! assert!(matches!(outcome, MutationOutcome::Created(_)));
//! assert_eq!(engine.project().annotations().len(), 1);
//! ```

use crate::annotation::{
    Annotation, AnnotationId, AnnotationMeta, AnnotationStore, normalize_tag,
};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{EngineError, EngineResult};
use crate::filter::FilterContext;
use crate::history::{ChangeSet, History, Op};
use crate::span::{self, Span};
use crate::span_index::SpanIndex;
use crate::storyboard::{Divider, DividerId, Storyboard, StoryboardEntry};
use crate::sync::{ChangeBatch, SyncHub, ViewId, ViewSubscriber, events_for};
use crate::theme::{Hotkey, Theme, ThemeId, ThemeTable};
use std::collections::BTreeSet;

/// The engine-owned data: everything a view or exporter may read.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub(crate) document: Document,
    pub(crate) themes: ThemeTable,
    pub(crate) annotations: AnnotationStore,
    pub(crate) index: SpanIndex,
    pub(crate) storyboard: Storyboard,
}

impl Project {
    /// Create an empty project over a document.
    pub fn new(document: Document, theme_capacity: usize) -> Self {
        Self {
            document,
            themes: ThemeTable::new(theme_capacity),
            annotations: AnnotationStore::new(),
            index: SpanIndex::new(),
            storyboard: Storyboard::new(),
        }
    }

    /// The base text.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The theme table.
    pub fn themes(&self) -> &ThemeTable {
        &self.themes
    }

    /// The annotation store.
    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    /// The span index.
    pub fn index(&self) -> &SpanIndex {
        &self.index
    }

    /// The storyboard.
    pub fn storyboard(&self) -> &Storyboard {
        &self.storyboard
    }

    /// Look up an annotation.
    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(id)
    }

    /// Annotation ids in document order (first span start, then id).
    pub fn document_order(&self) -> Vec<AnnotationId> {
        let mut ids: Vec<(usize, AnnotationId)> =
            self.annotations.iter().map(|a| (a.start(), a.id)).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Text covered by an annotation, spans joined by a single space.
    pub fn annotation_text(&self, id: AnnotationId) -> Option<String> {
        let annotation = self.annotations.get(id)?;
        let parts: Vec<String> = annotation
            .spans
            .iter()
            .map(|s| self.document.slice(*s))
            .collect();
        Some(parts.join(" "))
    }

    /// Lookup context for filter evaluation.
    pub fn filter_context(&self) -> FilterContext<'_> {
        FilterContext {
            document: &self.document,
            annotations: &self.annotations,
        }
    }

    /// Apply one primitive op. Ops are only ever built against the current state, so
    /// application cannot fail.
    pub(crate) fn apply(&mut self, op: &Op) {
        match op {
            Op::InsertAnnotation(a) => {
                self.index.insert_all(&a.spans, a.id);
                self.annotations.insert(a.clone());
            }
            Op::RemoveAnnotation(a) => {
                self.index.remove(a.id);
                self.annotations.remove(a.id);
            }
            Op::ReplaceAnnotation { before, after } => {
                if before.spans != after.spans {
                    self.index.adjust(after.id, &after.spans);
                }
                self.annotations.insert(after.clone());
            }
            Op::InsertTheme(t) => self.themes.insert(t.clone()),
            Op::RemoveTheme(t) => {
                self.themes.remove(t.id);
            }
            Op::ReplaceTheme { after, .. } => self.themes.replace(after.clone()),
            Op::StoryboardInsert { index, entry } => {
                self.storyboard.insert_entry(*index, entry.clone())
            }
            Op::StoryboardRemove { index, .. } => {
                self.storyboard.remove_entry(*index);
            }
            Op::StoryboardReorder { after, .. } => self.storyboard.replace_entries(after.clone()),
            Op::SetHeader { id, after, .. } => self.storyboard.set_header(*id, after.clone()),
        }
    }

    /// Find broken cross references between the store, the index and the storyboard.
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        for entry in self.storyboard.entries() {
            if let Some(id) = entry.annotation()
                && !self.annotations.contains(id)
            {
                issues.push(IntegrityIssue::OrphanStoryboardEntry(id));
            }
        }
        for id in self.storyboard.headers().keys() {
            if !self.storyboard.contains(*id) {
                issues.push(IntegrityIssue::OrphanHeader(*id));
            }
        }
        for owner in self.index.owners() {
            if !self.annotations.contains(owner) {
                issues.push(IntegrityIssue::OrphanIndexEntry(owner));
            }
        }
        for annotation in self.annotations.iter() {
            if self.index.spans_of(annotation.id) != annotation.spans.as_slice() {
                issues.push(IntegrityIssue::IndexMismatch(annotation.id));
            }
            for theme in annotation.meta.all_themes() {
                if !self.themes.contains(theme) {
                    issues.push(IntegrityIssue::UnknownTheme {
                        id: annotation.id,
                        theme,
                    });
                }
            }
        }
        issues
    }

    fn heal(&mut self, issue: &IntegrityIssue) {
        match issue {
            IntegrityIssue::OrphanStoryboardEntry(id) => {
                while let Some(pos) = self.storyboard.position(*id) {
                    self.storyboard.remove_entry(pos);
                }
                self.storyboard.set_header(*id, None);
            }
            IntegrityIssue::OrphanHeader(id) => self.storyboard.set_header(*id, None),
            IntegrityIssue::OrphanIndexEntry(id) => {
                self.index.remove(*id);
            }
            IntegrityIssue::IndexMismatch(id) => {
                if let Some(annotation) = self.annotations.get(*id) {
                    let spans = annotation.spans.clone();
                    self.index.adjust(*id, &spans);
                }
            }
            IntegrityIssue::UnknownTheme { id, theme } => {
                let Some(mut annotation) = self.annotations.get(*id).cloned() else {
                    return;
                };
                if annotation.meta.theme == *theme {
                    // The primary theme is gone and there is nothing sensible to fall back to.
                    self.index.remove(*id);
                    self.annotations.remove(*id);
                    while let Some(pos) = self.storyboard.position(*id) {
                        self.storyboard.remove_entry(pos);
                    }
                    self.storyboard.set_header(*id, None);
                } else {
                    annotation.meta.secondary_themes.remove(theme);
                    self.annotations.insert(annotation);
                }
            }
        }
    }
}

/// A broken invariant found by [`Project::integrity_issues`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// The storyboard references an annotation that does not exist.
    OrphanStoryboardEntry(AnnotationId),
    /// A storyboard header belongs to an annotation that is not in the storyboard.
    OrphanHeader(AnnotationId),
    /// The span index holds spans of an annotation that does not exist.
    OrphanIndexEntry(AnnotationId),
    /// The span index disagrees with the annotation's spans.
    IndexMismatch(AnnotationId),
    /// An annotation references a theme that does not exist.
    UnknownTheme {
        /// Affected annotation.
        id: AnnotationId,
        /// Missing theme.
        theme: ThemeId,
    },
}

/// What to do with storyboard entries of an annotation being deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Fail with [`EngineError::ConflictingRemoval`] if the annotation is in the storyboard.
    #[default]
    Abort,
    /// Remove the storyboard entry together with the annotation.
    Cascade,
}

/// What happens to annotations whose primary theme is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeRemoval {
    /// Move them to another theme.
    Reassign(ThemeId),
    /// Delete them (and their storyboard entries).
    DeleteAnnotations,
}

/// Input of [`Mutation::CreateAnnotation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    /// Ranges to cover (normalized on creation).
    pub spans: Vec<Span>,
    /// Initial metadata.
    pub meta: AnnotationMeta,
}

impl NewAnnotation {
    /// Highlight one range with a primary theme.
    pub fn new(span: Span, theme: ThemeId) -> Self {
        Self {
            spans: vec![span],
            meta: AnnotationMeta::new(theme),
        }
    }

    /// Add another range.
    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }

    /// Add a secondary theme.
    pub fn with_secondary(mut self, theme: ThemeId) -> Self {
        self.meta.secondary_themes.insert(theme);
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: &str) -> Self {
        if let Some(tag) = normalize_tag(tag) {
            self.meta.tags.insert(tag);
        }
        self
    }

    /// Set the brief note.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.meta.notes = notes.into();
        self
    }

    /// Set the detailed footnote.
    pub fn with_footnote(mut self, footnote: impl Into<String>) -> Self {
        self.meta.footnote = footnote.into();
        self
    }

    /// Set the favorite flag.
    pub fn favorite(mut self, favorite: bool) -> Self {
        self.meta.favorite = favorite;
        self
    }

    /// Set the scene title.
    pub fn with_scene_title(mut self, title: impl Into<String>) -> Self {
        self.meta.scene_title = Some(title.into());
        self
    }
}

/// A mutation request (command pattern).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Highlight new ranges.
    CreateAnnotation(NewAnnotation),
    /// Delete an annotation.
    DeleteAnnotation {
        /// Annotation to delete.
        id: AnnotationId,
        /// Storyboard handling.
        storyboard: RemovalPolicy,
    },
    /// Remove a sub-range from an annotation (shrink, split or delete).
    RemoveRange {
        /// Annotation to shrink.
        id: AnnotationId,
        /// Range to remove.
        range: Span,
    },
    /// Replace the spans of an annotation.
    SetSpans {
        /// Annotation to resize.
        id: AnnotationId,
        /// New ranges.
        spans: Vec<Span>,
    },
    /// Grow an annotation by a range.
    ExtendAnnotation {
        /// Annotation to grow.
        id: AnnotationId,
        /// Added range.
        range: Span,
    },
    /// Drag the boundary shared by two adjacent annotations.
    MoveSharedBoundary {
        /// Annotation ending at the boundary.
        left: AnnotationId,
        /// Annotation starting at the boundary.
        right: AnnotationId,
        /// New boundary offset.
        offset: usize,
    },
    /// Combine two touching annotations of the same theme.
    Merge {
        /// Annotation that keeps its id.
        survivor: AnnotationId,
        /// Annotation folded into the survivor and deleted.
        absorbed: AnnotationId,
    },
    /// Change the primary theme.
    SetTheme {
        /// Target annotation.
        id: AnnotationId,
        /// New primary theme.
        theme: ThemeId,
    },
    /// Add a secondary theme.
    AddSecondaryTheme {
        /// Target annotation.
        id: AnnotationId,
        /// Theme to add.
        theme: ThemeId,
    },
    /// Remove a secondary theme.
    RemoveSecondaryTheme {
        /// Target annotation.
        id: AnnotationId,
        /// Theme to remove.
        theme: ThemeId,
    },
    /// Add a tag.
    AddTag {
        /// Target annotation.
        id: AnnotationId,
        /// Tag text.
        tag: String,
    },
    /// Remove a tag.
    RemoveTag {
        /// Target annotation.
        id: AnnotationId,
        /// Tag text.
        tag: String,
    },
    /// Replace the brief note.
    SetNotes {
        /// Target annotation.
        id: AnnotationId,
        /// New note.
        notes: String,
    },
    /// Replace the detailed footnote.
    SetFootnote {
        /// Target annotation.
        id: AnnotationId,
        /// New footnote.
        footnote: String,
    },
    /// Set the favorite flag.
    SetFavorite {
        /// Target annotation.
        id: AnnotationId,
        /// New value.
        favorite: bool,
    },
    /// Set the used flag.
    SetUsed {
        /// Target annotation.
        id: AnnotationId,
        /// New value.
        used: bool,
    },
    /// Set or clear the scene title.
    SetSceneTitle {
        /// Target annotation.
        id: AnnotationId,
        /// New title (`None` or blank clears it).
        title: Option<String>,
    },
    /// Mark a range of the annotation as cut.
    SetStrikethrough {
        /// Target annotation.
        id: AnnotationId,
        /// Range to strike (clipped to the annotation).
        range: Span,
    },
    /// Unmark cut ranges.
    ClearStrikethrough {
        /// Target annotation.
        id: AnnotationId,
        /// Range to unmark, or everything.
        range: Option<Span>,
    },
    /// Define a theme.
    CreateTheme {
        /// Display name.
        name: String,
        /// Display color.
        color: String,
        /// Optional hotkey.
        hotkey: Option<Hotkey>,
    },
    /// Rename a theme.
    RenameTheme {
        /// Theme to rename.
        id: ThemeId,
        /// New name.
        name: String,
    },
    /// Change a theme color.
    RecolorTheme {
        /// Theme to recolor.
        id: ThemeId,
        /// New color.
        color: String,
    },
    /// Bind or unbind a theme hotkey.
    SetThemeHotkey {
        /// Theme to rebind.
        id: ThemeId,
        /// New hotkey.
        hotkey: Option<Hotkey>,
    },
    /// Delete a theme, cascading to every annotation referencing it.
    DeleteTheme {
        /// Theme to delete.
        id: ThemeId,
        /// Handling of annotations whose primary theme it is.
        policy: ThemeRemoval,
    },
    /// Rename a tag on every annotation.
    RenameTag {
        /// Current tag.
        from: String,
        /// New tag.
        to: String,
    },
    /// Remove a tag from every annotation.
    DeleteTag {
        /// Tag to remove.
        tag: String,
    },
    /// Add an annotation at the end of the storyboard.
    StoryboardAppend {
        /// Annotation to place.
        id: AnnotationId,
    },
    /// Add an annotation at an entry position.
    StoryboardInsert {
        /// Entry position (`0..=len`).
        index: usize,
        /// Annotation to place.
        id: AnnotationId,
    },
    /// Take an annotation out of the storyboard.
    StoryboardRemove {
        /// Annotation to remove.
        id: AnnotationId,
    },
    /// Move an annotation to another entry position.
    StoryboardMove {
        /// Annotation to move.
        id: AnnotationId,
        /// Final entry position (`0..len`).
        index: usize,
    },
    /// Re-derive the order from document positions.
    StoryboardSortChronologically,
    /// Remove every storyboard entry.
    StoryboardClear,
    /// Insert a section divider.
    AddDivider {
        /// Entry position, or the end.
        index: Option<usize>,
        /// Section title.
        title: String,
        /// Display color.
        color: String,
    },
    /// Remove a section divider.
    RemoveDivider {
        /// Divider to remove.
        id: DividerId,
    },
    /// Set or clear the header label of a storyboard entry.
    SetStoryboardHeader {
        /// Storyboard member.
        id: AnnotationId,
        /// New header (`None` or blank clears it).
        header: Option<String>,
    },
}

impl Mutation {
    /// Short stable name used in history labels and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::CreateAnnotation(_) => "create_annotation",
            Mutation::DeleteAnnotation { .. } => "delete_annotation",
            Mutation::RemoveRange { .. } => "remove_range",
            Mutation::SetSpans { .. } => "set_spans",
            Mutation::ExtendAnnotation { .. } => "extend_annotation",
            Mutation::MoveSharedBoundary { .. } => "move_shared_boundary",
            Mutation::Merge { .. } => "merge",
            Mutation::SetTheme { .. } => "set_theme",
            Mutation::AddSecondaryTheme { .. } => "add_secondary_theme",
            Mutation::RemoveSecondaryTheme { .. } => "remove_secondary_theme",
            Mutation::AddTag { .. } => "add_tag",
            Mutation::RemoveTag { .. } => "remove_tag",
            Mutation::SetNotes { .. } => "set_notes",
            Mutation::SetFootnote { .. } => "set_footnote",
            Mutation::SetFavorite { .. } => "set_favorite",
            Mutation::SetUsed { .. } => "set_used",
            Mutation::SetSceneTitle { .. } => "set_scene_title",
            Mutation::SetStrikethrough { .. } => "set_strikethrough",
            Mutation::ClearStrikethrough { .. } => "clear_strikethrough",
            Mutation::CreateTheme { .. } => "create_theme",
            Mutation::RenameTheme { .. } => "rename_theme",
            Mutation::RecolorTheme { .. } => "recolor_theme",
            Mutation::SetThemeHotkey { .. } => "set_theme_hotkey",
            Mutation::DeleteTheme { .. } => "delete_theme",
            Mutation::RenameTag { .. } => "rename_tag",
            Mutation::DeleteTag { .. } => "delete_tag",
            Mutation::StoryboardAppend { .. } => "storyboard_append",
            Mutation::StoryboardInsert { .. } => "storyboard_insert",
            Mutation::StoryboardRemove { .. } => "storyboard_remove",
            Mutation::StoryboardMove { .. } => "storyboard_move",
            Mutation::StoryboardSortChronologically => "storyboard_sort",
            Mutation::StoryboardClear => "storyboard_clear",
            Mutation::AddDivider { .. } => "add_divider",
            Mutation::RemoveDivider { .. } => "remove_divider",
            Mutation::SetStoryboardHeader { .. } => "set_storyboard_header",
        }
    }
}

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The request was valid but changed nothing.
    Unchanged,
    /// An annotation was created.
    Created(AnnotationId),
    /// One or more annotations changed in place.
    Updated(Vec<AnnotationId>),
    /// An annotation was deleted.
    Deleted(AnnotationId),
    /// An annotation was split in two.
    Split {
        /// Keeps the original id and the left remainder.
        kept: AnnotationId,
        /// New annotation owning the right remainder.
        created: AnnotationId,
    },
    /// Two annotations were merged.
    Merged {
        /// Surviving annotation.
        survivor: AnnotationId,
        /// Deleted annotation.
        absorbed: AnnotationId,
    },
    /// A theme was created.
    ThemeCreated(ThemeId),
    /// A divider was added.
    DividerAdded(DividerId),
    /// Themes, tags or the storyboard changed.
    Applied,
}

/// Applies ops to the project while recording them.
struct Recorder<'a> {
    project: &'a mut Project,
    config: &'a EngineConfig,
    changes: ChangeSet,
}

impl<'a> Recorder<'a> {
    fn new(project: &'a mut Project, config: &'a EngineConfig, label: &str) -> Self {
        Self {
            project,
            config,
            changes: ChangeSet::new(label),
        }
    }

    fn push(&mut self, op: Op) {
        self.project.apply(&op);
        self.changes.ops.push(op);
    }

    fn rollback(self) {
        for op in self.changes.ops.iter().rev() {
            self.project.apply(&op.inverse());
        }
    }

    fn annotation(&self, id: AnnotationId) -> EngineResult<Annotation> {
        self.project
            .annotations
            .get(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    fn theme(&self, id: ThemeId) -> EngineResult<Theme> {
        self.project.themes.require(id).cloned()
    }

    fn validate(&self, span: Span) -> EngineResult<Span> {
        self.project.document.validate(span)
    }

    fn validate_spans(&self, spans: &[Span]) -> EngineResult<Vec<Span>> {
        let len = self.project.document.len_chars();
        if spans.is_empty() {
            return Err(EngineError::InvalidRange {
                start: 0,
                end: 0,
                len,
            });
        }
        let mut out = Vec::with_capacity(spans.len());
        for span in spans {
            let span = self.validate(*span)?;
            out.push(self.project.document.snap_to_graphemes(span));
        }
        span::normalize(&mut out);
        Ok(out)
    }

    fn replace(&mut self, before: Annotation, after: Annotation) -> bool {
        if before == after {
            return false;
        }
        self.push(Op::ReplaceAnnotation { before, after });
        true
    }

    fn update(
        &mut self,
        id: AnnotationId,
        edit: impl FnOnce(&mut Annotation) -> EngineResult<()>,
    ) -> EngineResult<MutationOutcome> {
        let before = self.annotation(id)?;
        let mut after = before.clone();
        edit(&mut after)?;
        Ok(if self.replace(before, after) {
            MutationOutcome::Updated(vec![id])
        } else {
            MutationOutcome::Unchanged
        })
    }

    fn set_used(&mut self, id: AnnotationId, used: bool) {
        if let Some(before) = self.project.annotations.get(id).cloned()
            && before.meta.used != used
        {
            let mut after = before.clone();
            after.meta.used = used;
            self.push(Op::ReplaceAnnotation { before, after });
        }
    }

    fn set_header(&mut self, id: AnnotationId, header: Option<String>) {
        let before = self.project.storyboard.header(id).map(str::to_string);
        if before != header {
            self.push(Op::SetHeader {
                id,
                before,
                after: header,
            });
        }
    }

    /// Remove the storyboard entry of `id` (and its header) if present.
    fn drop_from_storyboard(&mut self, id: AnnotationId) -> bool {
        let Some(index) = self.project.storyboard.position(id) else {
            return false;
        };
        self.set_header(id, None);
        self.push(Op::StoryboardRemove {
            index,
            entry: StoryboardEntry::Annotation { id },
        });
        true
    }

    fn delete_cascade(&mut self, id: AnnotationId) -> EngineResult<()> {
        self.drop_from_storyboard(id);
        let annotation = self.annotation(id)?;
        self.push(Op::RemoveAnnotation(annotation));
        Ok(())
    }

    fn join_storyboard(&mut self, index: usize, id: AnnotationId) -> EngineResult<()> {
        self.annotation(id)?;
        if self.project.storyboard.contains(id) {
            return Err(EngineError::AlreadyInStoryboard(id));
        }
        let len = self.project.storyboard.len();
        if index > len {
            return Err(EngineError::StoryboardIndex { index, len });
        }
        self.push(Op::StoryboardInsert {
            index,
            entry: StoryboardEntry::Annotation { id },
        });
        self.set_used(id, true);
        Ok(())
    }

    fn apply(&mut self, mutation: Mutation) -> EngineResult<MutationOutcome> {
        match mutation {
            Mutation::CreateAnnotation(new) => self.create_annotation(new),
            Mutation::DeleteAnnotation { id, storyboard } => {
                self.annotation(id)?;
                if let Some(position) = self.project.storyboard.position(id)
                    && storyboard == RemovalPolicy::Abort
                {
                    return Err(EngineError::ConflictingRemoval { id, position });
                }
                self.delete_cascade(id)?;
                Ok(MutationOutcome::Deleted(id))
            }
            Mutation::RemoveRange { id, range } => self.remove_range(id, range),
            Mutation::SetSpans { id, spans } => {
                let spans = self.validate_spans(&spans)?;
                let before = self.annotation(id)?;
                let after = before.with_spans(spans);
                Ok(if self.replace(before, after) {
                    MutationOutcome::Updated(vec![id])
                } else {
                    MutationOutcome::Unchanged
                })
            }
            Mutation::ExtendAnnotation { id, range } => {
                let added = self.validate_spans(&[range])?;
                let before = self.annotation(id)?;
                let after = before.with_spans(span::union_all(&before.spans, &added));
                Ok(if self.replace(before, after) {
                    MutationOutcome::Updated(vec![id])
                } else {
                    MutationOutcome::Unchanged
                })
            }
            Mutation::MoveSharedBoundary {
                left,
                right,
                offset,
            } => self.move_shared_boundary(left, right, offset),
            Mutation::Merge { survivor, absorbed } => self.merge(survivor, absorbed),
            Mutation::SetTheme { id, theme } => {
                self.theme(theme)?;
                self.update(id, |a| {
                    a.meta.theme = theme;
                    a.meta.secondary_themes.remove(&theme);
                    Ok(())
                })
            }
            Mutation::AddSecondaryTheme { id, theme } => {
                self.theme(theme)?;
                self.update(id, |a| {
                    if a.meta.theme == theme {
                        return Err(EngineError::PrimaryAsSecondary { theme });
                    }
                    a.meta.secondary_themes.insert(theme);
                    Ok(())
                })
            }
            Mutation::RemoveSecondaryTheme { id, theme } => self.update(id, |a| {
                a.meta.secondary_themes.remove(&theme);
                Ok(())
            }),
            Mutation::AddTag { id, tag } => self.update(id, |a| {
                if let Some(tag) = normalize_tag(&tag) {
                    a.meta.tags.insert(tag);
                }
                Ok(())
            }),
            Mutation::RemoveTag { id, tag } => self.update(id, |a| {
                if let Some(tag) = normalize_tag(&tag) {
                    a.meta.tags.remove(&tag);
                }
                Ok(())
            }),
            Mutation::SetNotes { id, notes } => self.update(id, |a| {
                a.meta.notes = notes;
                Ok(())
            }),
            Mutation::SetFootnote { id, footnote } => self.update(id, |a| {
                a.meta.footnote = footnote;
                Ok(())
            }),
            Mutation::SetFavorite { id, favorite } => self.update(id, |a| {
                a.meta.favorite = favorite;
                Ok(())
            }),
            Mutation::SetUsed { id, used } => self.update(id, |a| {
                a.meta.used = used;
                Ok(())
            }),
            Mutation::SetSceneTitle { id, title } => self.update(id, |a| {
                a.meta.scene_title = title
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
                Ok(())
            }),
            Mutation::SetStrikethrough { id, range } => {
                let range = self.validate(range)?;
                self.update(id, |a| {
                    let cut = span::clip_to(&[range], &a.spans);
                    a.strikethrough = span::union_all(&a.strikethrough, &cut);
                    Ok(())
                })
            }
            Mutation::ClearStrikethrough { id, range } => self.update(id, |a| {
                match range {
                    Some(range) => a.strikethrough = span::subtract_all(&a.strikethrough, &range),
                    None => a.strikethrough.clear(),
                }
                Ok(())
            }),
            Mutation::CreateTheme {
                name,
                color,
                hotkey,
            } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(EngineError::EmptyName);
                }
                self.project.themes.check(&name, hotkey, None)?;
                let id = self.project.themes.allocate_id()?;
                self.push(Op::InsertTheme(Theme {
                    id,
                    name,
                    color,
                    hotkey,
                }));
                Ok(MutationOutcome::ThemeCreated(id))
            }
            Mutation::RenameTheme { id, name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(EngineError::EmptyName);
                }
                let before = self.theme(id)?;
                self.project.themes.check(&name, before.hotkey, Some(id))?;
                let after = Theme {
                    name,
                    ..before.clone()
                };
                Ok(self.replace_theme(before, after))
            }
            Mutation::RecolorTheme { id, color } => {
                let before = self.theme(id)?;
                let after = Theme {
                    color,
                    ..before.clone()
                };
                Ok(self.replace_theme(before, after))
            }
            Mutation::SetThemeHotkey { id, hotkey } => {
                let before = self.theme(id)?;
                self.project.themes.check(&before.name, hotkey, Some(id))?;
                let after = Theme {
                    hotkey,
                    ..before.clone()
                };
                Ok(self.replace_theme(before, after))
            }
            Mutation::DeleteTheme { id, policy } => self.delete_theme(id, policy),
            Mutation::RenameTag { from, to } => {
                let (Some(from), Some(to)) = (normalize_tag(&from), normalize_tag(&to)) else {
                    return Ok(MutationOutcome::Unchanged);
                };
                let ids = self.project.annotations.with_tag(&from);
                for id in &ids {
                    self.update(*id, |a| {
                        a.meta.tags.remove(&from);
                        a.meta.tags.insert(to.clone());
                        Ok(())
                    })?;
                }
                Ok(touched(ids))
            }
            Mutation::DeleteTag { tag } => {
                let Some(tag) = normalize_tag(&tag) else {
                    return Ok(MutationOutcome::Unchanged);
                };
                let ids = self.project.annotations.with_tag(&tag);
                for id in &ids {
                    self.update(*id, |a| {
                        a.meta.tags.remove(&tag);
                        Ok(())
                    })?;
                }
                Ok(touched(ids))
            }
            Mutation::StoryboardAppend { id } => {
                let len = self.project.storyboard.len();
                self.join_storyboard(len, id)?;
                Ok(MutationOutcome::Applied)
            }
            Mutation::StoryboardInsert { index, id } => {
                self.join_storyboard(index, id)?;
                Ok(MutationOutcome::Applied)
            }
            Mutation::StoryboardRemove { id } => {
                self.annotation(id)?;
                if !self.drop_from_storyboard(id) {
                    return Err(EngineError::NotInStoryboard(id));
                }
                self.set_used(id, false);
                Ok(MutationOutcome::Applied)
            }
            Mutation::StoryboardMove { id, index } => {
                let position = self
                    .project
                    .storyboard
                    .position(id)
                    .ok_or(EngineError::NotInStoryboard(id))?;
                let len = self.project.storyboard.len();
                if index >= len {
                    return Err(EngineError::StoryboardIndex { index, len });
                }
                if index == position {
                    return Ok(MutationOutcome::Unchanged);
                }
                let entry = StoryboardEntry::Annotation { id };
                self.push(Op::StoryboardRemove {
                    index: position,
                    entry: entry.clone(),
                });
                self.push(Op::StoryboardInsert { index, entry });
                Ok(MutationOutcome::Applied)
            }
            Mutation::StoryboardSortChronologically => {
                let annotations = &self.project.annotations;
                let after = self
                    .project
                    .storyboard
                    .chronological_order(|id| annotations.get(id).map_or(0, Annotation::start));
                let before = self.project.storyboard.entries().to_vec();
                if before == after {
                    return Ok(MutationOutcome::Unchanged);
                }
                self.push(Op::StoryboardReorder { before, after });
                Ok(MutationOutcome::Applied)
            }
            Mutation::StoryboardClear => {
                if self.project.storyboard.is_empty() && self.project.storyboard.headers().is_empty()
                {
                    return Ok(MutationOutcome::Unchanged);
                }
                let members = self.project.storyboard.list();
                let headers: Vec<AnnotationId> =
                    self.project.storyboard.headers().keys().copied().collect();
                for id in headers {
                    self.set_header(id, None);
                }
                let before = self.project.storyboard.entries().to_vec();
                self.push(Op::StoryboardReorder {
                    before,
                    after: Vec::new(),
                });
                for id in members {
                    self.set_used(id, false);
                }
                Ok(MutationOutcome::Applied)
            }
            Mutation::AddDivider {
                index,
                title,
                color,
            } => {
                let len = self.project.storyboard.len();
                let index = index.unwrap_or(len);
                if index > len {
                    return Err(EngineError::StoryboardIndex { index, len });
                }
                let id = self.project.storyboard.allocate_divider_id();
                self.push(Op::StoryboardInsert {
                    index,
                    entry: StoryboardEntry::Divider(Divider { id, title, color }),
                });
                Ok(MutationOutcome::DividerAdded(id))
            }
            Mutation::RemoveDivider { id } => {
                let index = self
                    .project
                    .storyboard
                    .divider_position(id)
                    .ok_or(EngineError::DividerNotFound(id))?;
                let entry = self.project.storyboard.entries()[index].clone();
                self.push(Op::StoryboardRemove { index, entry });
                Ok(MutationOutcome::Applied)
            }
            Mutation::SetStoryboardHeader { id, header } => {
                if !self.project.storyboard.contains(id) {
                    return Err(EngineError::NotInStoryboard(id));
                }
                let header = header
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty());
                let before = self.project.storyboard.header(id).map(str::to_string);
                if before == header {
                    return Ok(MutationOutcome::Unchanged);
                }
                self.set_header(id, header);
                Ok(MutationOutcome::Applied)
            }
        }
    }

    fn create_annotation(&mut self, new: NewAnnotation) -> EngineResult<MutationOutcome> {
        let spans = self.validate_spans(&new.spans)?;
        let mut meta = new.meta;
        self.theme(meta.theme)?;
        for theme in &meta.secondary_themes {
            self.theme(*theme)?;
            if *theme == meta.theme {
                return Err(EngineError::PrimaryAsSecondary { theme: *theme });
            }
        }
        meta.tags = meta.tags.iter().filter_map(|t| normalize_tag(t)).collect();
        meta.scene_title = meta
            .scene_title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let id = self.project.annotations.allocate_id();
        self.push(Op::InsertAnnotation(Annotation {
            id,
            spans,
            meta,
            strikethrough: Vec::new(),
        }));
        Ok(MutationOutcome::Created(id))
    }

    /// Partial removal: shrink in place, split in two, or delete.
    fn remove_range(&mut self, id: AnnotationId, range: Span) -> EngineResult<MutationOutcome> {
        let range = self.validate(range)?;
        let before = self.annotation(id)?;
        let remaining = span::subtract_all(&before.spans, &range);

        if remaining == before.spans {
            return Ok(MutationOutcome::Unchanged);
        }
        if remaining.is_empty() {
            self.delete_cascade(id)?;
            return Ok(MutationOutcome::Deleted(id));
        }

        let (left, right): (Vec<Span>, Vec<Span>) =
            remaining.iter().partition(|s| s.end <= range.start);
        if left.is_empty() || right.is_empty() {
            let after = before.with_spans(remaining);
            self.replace(before, after);
            return Ok(MutationOutcome::Updated(vec![id]));
        }

        let created = self.project.annotations.allocate_id();
        let mut right_half = before.with_spans(right);
        right_half.id = created;
        let left_half = before.with_spans(left);
        self.replace(before, left_half);
        self.push(Op::InsertAnnotation(right_half));

        if let Some(position) = self.project.storyboard.position(id) {
            self.push(Op::StoryboardInsert {
                index: position + 1,
                entry: StoryboardEntry::Annotation { id: created },
            });
        }
        Ok(MutationOutcome::Split { kept: id, created })
    }

    fn move_shared_boundary(
        &mut self,
        left: AnnotationId,
        right: AnnotationId,
        offset: usize,
    ) -> EngineResult<MutationOutcome> {
        let left_before = self.annotation(left)?;
        let right_before = self.annotation(right)?;
        let not_adjacent = EngineError::NotAdjacent {
            first: left,
            second: right,
        };
        if left == right {
            return Err(not_adjacent);
        }

        let shared = left_before.spans.iter().find_map(|ls| {
            right_before
                .spans
                .iter()
                .find(|rs| rs.start == ls.end)
                .map(|rs| (*ls, *rs))
        });
        let Some((ls, rs)) = shared else {
            return Err(not_adjacent);
        };
        if offset <= ls.start || offset >= rs.end {
            return Err(EngineError::InvalidRange {
                start: ls.start,
                end: rs.end,
                len: self.project.document.len_chars(),
            });
        }
        if offset == ls.end {
            return Ok(MutationOutcome::Unchanged);
        }

        let mut left_spans: Vec<Span> = left_before
            .spans
            .iter()
            .map(|s| if *s == ls { Span::new(ls.start, offset) } else { *s })
            .collect();
        let mut right_spans: Vec<Span> = right_before
            .spans
            .iter()
            .map(|s| if *s == rs { Span::new(offset, rs.end) } else { *s })
            .collect();
        span::normalize(&mut left_spans);
        span::normalize(&mut right_spans);

        let left_after = left_before.with_spans(left_spans);
        let right_after = right_before.with_spans(right_spans);
        self.replace(left_before, left_after);
        self.replace(right_before, right_after);
        Ok(MutationOutcome::Updated(vec![left, right]))
    }

    fn merge(
        &mut self,
        survivor: AnnotationId,
        absorbed: AnnotationId,
    ) -> EngineResult<MutationOutcome> {
        let keep = self.annotation(survivor)?;
        let gone = self.annotation(absorbed)?;
        if survivor == absorbed || !span::any_touching(&keep.spans, &gone.spans) {
            return Err(EngineError::NotAdjacent {
                first: survivor,
                second: absorbed,
            });
        }
        if keep.meta.theme != gone.meta.theme {
            return Err(EngineError::DifferentThemes {
                first: survivor,
                second: absorbed,
            });
        }

        let separator = self.config.note_separator.as_str();
        let mut merged = keep.clone();
        merged.spans = span::union_all(&keep.spans, &gone.spans);
        merged.strikethrough = span::union_all(&keep.strikethrough, &gone.strikethrough);
        let meta = &mut merged.meta;
        meta.secondary_themes.extend(gone.meta.secondary_themes.iter().copied());
        meta.secondary_themes.remove(&meta.theme);
        meta.tags.extend(gone.meta.tags.iter().cloned());
        meta.notes = join_notes(&keep.meta.notes, &gone.meta.notes, separator);
        meta.footnote = join_notes(&keep.meta.footnote, &gone.meta.footnote, separator);
        meta.favorite |= gone.meta.favorite;
        if meta.scene_title.is_none() {
            meta.scene_title = gone.meta.scene_title.clone();
        }

        self.drop_from_storyboard(absorbed);
        // `used` follows storyboard membership, which the absorbed entry does not pass on.
        merged.meta.used = keep.meta.used || self.project.storyboard.contains(survivor);
        self.push(Op::RemoveAnnotation(gone));
        self.replace(keep, merged);
        Ok(MutationOutcome::Merged { survivor, absorbed })
    }

    fn replace_theme(&mut self, before: Theme, after: Theme) -> MutationOutcome {
        if before == after {
            return MutationOutcome::Unchanged;
        }
        self.push(Op::ReplaceTheme { before, after });
        MutationOutcome::Applied
    }

    fn delete_theme(&mut self, id: ThemeId, policy: ThemeRemoval) -> EngineResult<MutationOutcome> {
        let theme = self.theme(id)?;
        if let ThemeRemoval::Reassign(target) = policy
            && (target == id || !self.project.themes.contains(target))
        {
            return Err(EngineError::ThemeNotFound(target));
        }

        for annotation_id in self.project.annotations.with_theme(id) {
            let primary = self.annotation(annotation_id)?.meta.theme == id;
            match (primary, policy) {
                (true, ThemeRemoval::DeleteAnnotations) => self.delete_cascade(annotation_id)?,
                (true, ThemeRemoval::Reassign(target)) => {
                    self.update(annotation_id, |a| {
                        a.meta.theme = target;
                        a.meta.secondary_themes.remove(&target);
                        a.meta.secondary_themes.remove(&id);
                        Ok(())
                    })?;
                }
                (false, _) => {
                    self.update(annotation_id, |a| {
                        a.meta.secondary_themes.remove(&id);
                        Ok(())
                    })?;
                }
            }
        }
        self.push(Op::RemoveTheme(theme));
        Ok(MutationOutcome::Applied)
    }
}

fn touched(ids: Vec<AnnotationId>) -> MutationOutcome {
    if ids.is_empty() {
        MutationOutcome::Unchanged
    } else {
        MutationOutcome::Updated(ids)
    }
}

fn join_notes(first: &str, second: &str, separator: &str) -> String {
    match (first.trim().is_empty(), second.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => first.to_string(),
        (true, false) => second.to_string(),
        (false, false) => format!("{first}{separator}{second}"),
    }
}

/// The annotation engine.
///
/// All mutations run on one sequential path; the engine is `Send` so a host may move it to its
/// UI thread, but it is never shared between writers.
pub struct Engine {
    pub(crate) project: Project,
    pub(crate) config: EngineConfig,
    history: History,
    hub: SyncHub,
    version: u64,
    pub(crate) stats: Option<crate::stats::StatsReport>,
    pub(crate) view_filters: std::collections::BTreeMap<String, crate::filter::FilterState>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("version", &self.version)
            .field("annotations", &self.project.annotations.len())
            .field("themes", &self.project.themes.len())
            .field("storyboard", &self.project.storyboard.len())
            .finish()
    }
}

impl Engine {
    /// Create an engine over plain text with the default configuration.
    pub fn new(text: &str) -> Self {
        Self::with_document(Document::new(text), EngineConfig::default())
    }

    /// Create an engine over a document.
    pub fn with_document(document: Document, config: EngineConfig) -> Self {
        let project = Project::new(document, config.theme_capacity);
        Self::from_project(project, config)
    }

    pub(crate) fn from_project(project: Project, config: EngineConfig) -> Self {
        log::info!(
            "event=engine_open module=engine status=ok chars={} annotations={} themes={}",
            project.document.len_chars(),
            project.annotations.len(),
            project.themes.len()
        );
        Self {
            history: History::new(config.history_limit),
            project,
            config,
            hub: SyncHub::new(),
            version: 0,
            stats: None,
            view_filters: Default::default(),
        }
    }

    /// Read-only access to the project.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current version (bumped once per committed action, undo and redo included).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check if state has changed since a version.
    pub fn has_changed_since(&self, version: u64) -> bool {
        self.version > version
    }

    /// Undo/redo history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Check if there are changes since the last [`mark_saved`](Self::mark_saved).
    pub fn is_modified(&self) -> bool {
        !self.history.is_clean()
    }

    /// Mark the current state as saved.
    pub fn mark_saved(&mut self) {
        self.history.mark_clean();
    }

    /// Execute one mutation atomically.
    pub fn execute(&mut self, mutation: Mutation) -> EngineResult<MutationOutcome> {
        let label = mutation.label();
        let mut recorder = Recorder::new(&mut self.project, &self.config, label);
        match recorder.apply(mutation) {
            Ok(outcome) => {
                let changes = recorder.changes;
                self.commit(changes);
                Ok(outcome)
            }
            Err(err) => {
                recorder.rollback();
                log::debug!(
                    "event=mutation module=engine status=rejected label={} error={}",
                    label,
                    err
                );
                Err(err)
            }
        }
    }

    /// Execute mutations as one atomic action: either all of them are applied or none.
    pub fn execute_batch(
        &mut self,
        mutations: impl IntoIterator<Item = Mutation>,
    ) -> EngineResult<Vec<MutationOutcome>> {
        let mut tx = self.transaction("batch");
        for mutation in mutations {
            tx.execute(mutation)?;
        }
        Ok(tx.commit())
    }

    /// Open a transaction. Nothing becomes visible to views until
    /// [`commit`](Transaction::commit); dropping the transaction undoes everything it applied.
    pub fn transaction(&mut self, label: impl Into<String>) -> Transaction<'_> {
        Transaction {
            changes: ChangeSet::new(label),
            outcomes: Vec::new(),
            committed: false,
            engine: self,
        }
    }

    fn commit(&mut self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let events = events_for(&changes.ops, &self.project);
        log::debug!(
            "event=mutation module=engine status=ok label={} ops={} events={} version={}",
            changes.label,
            changes.ops.len(),
            events.len(),
            self.version + 1
        );
        self.history.record(changes);
        self.publish(events);
        self.debug_verify();
    }

    fn publish(&mut self, events: Vec<crate::sync::MutationEvent>) {
        let batch = ChangeBatch {
            old_version: self.version,
            new_version: self.version + 1,
            events,
        };
        self.version += 1;
        self.hub.dispatch(&batch, &self.project);
    }

    fn debug_verify(&self) {
        if cfg!(debug_assertions) {
            let issues = self.project.integrity_issues();
            debug_assert!(issues.is_empty(), "integrity violated: {issues:?}");
        }
    }

    /// Undo the last committed action. Returns its label.
    pub fn undo(&mut self) -> EngineResult<String> {
        let set = self.history.pop_undo().ok_or(EngineError::NothingToUndo)?;
        let inverse = set.inverse();
        for op in &inverse.ops {
            self.project.apply(op);
        }
        let events = events_for(&inverse.ops, &self.project);
        log::debug!(
            "event=undo module=engine status=ok label={} ops={}",
            set.label,
            set.ops.len()
        );
        let label = set.label.clone();
        self.history.push_redo(set);
        self.publish(events);
        self.debug_verify();
        Ok(label)
    }

    /// Redo the last undone action. Returns its label.
    pub fn redo(&mut self) -> EngineResult<String> {
        let set = self.history.pop_redo().ok_or(EngineError::NothingToRedo)?;
        for op in &set.ops {
            self.project.apply(op);
        }
        let events = events_for(&set.ops, &self.project);
        log::debug!(
            "event=redo module=engine status=ok label={} ops={}",
            set.label,
            set.ops.len()
        );
        let label = set.label.clone();
        self.history.push_redone(set);
        self.publish(events);
        self.debug_verify();
        Ok(label)
    }

    /// Check every cross reference and drop orphans. Active views are rebuilt when anything was
    /// repaired. Returns the repaired issues.
    pub fn check_integrity(&mut self) -> Vec<IntegrityIssue> {
        let issues = self.project.integrity_issues();
        if issues.is_empty() {
            return issues;
        }
        for issue in &issues {
            log::warn!(
                "event=integrity_repair module=engine status=healed issue={:?}",
                issue
            );
            self.project.heal(issue);
        }
        self.history.clear();
        self.version += 1;
        self.hub.resnapshot(&self.project);
        issues
    }

    /// Register a dormant view. It is materialized on [`activate_view`](Self::activate_view).
    pub fn register_view(
        &mut self,
        name: impl Into<String>,
        view: impl ViewSubscriber + 'static,
    ) -> ViewId {
        self.hub.register(name, Box::new(view))
    }

    /// Materialize a view and start delivering events to it.
    pub fn activate_view(&mut self, view: ViewId) -> bool {
        self.hub.activate(view, &self.project)
    }

    /// Stop delivering events to a view.
    pub fn deactivate_view(&mut self, view: ViewId) -> bool {
        self.hub.deactivate(view)
    }

    /// Remove a view.
    pub fn unregister_view(&mut self, view: ViewId) -> bool {
        self.hub.unregister(view)
    }

    /// Check if a view receives events.
    pub fn is_view_active(&self, view: ViewId) -> bool {
        self.hub.is_active(view)
    }

    /// Subscribe to raw change batches.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&ChangeBatch) + Send + 'static,
    {
        self.hub.subscribe(callback);
    }

    /// Persisted per-view filter states (cosmetic).
    pub fn view_filters(&self) -> &std::collections::BTreeMap<String, crate::filter::FilterState> {
        &self.view_filters
    }

    /// Remember the filter state of a named view so it is saved with the session.
    pub fn set_view_filter(&mut self, view: impl Into<String>, filter: crate::filter::FilterState) {
        let view = view.into();
        if filter.is_active() {
            self.view_filters.insert(view, filter);
        } else {
            self.view_filters.remove(&view);
        }
    }

    /// Theme ids referenced by any annotation.
    pub fn themes_in_use(&self) -> BTreeSet<ThemeId> {
        self.project
            .annotations
            .iter()
            .flat_map(|a| a.meta.all_themes())
            .collect()
    }
}

/// An open multi-mutation action.
///
/// Mutations are applied as they are executed, so later ones see the effect of earlier ones, but
/// no event is dispatched and nothing is recorded in history until [`commit`](Self::commit).
/// Dropping an uncommitted transaction restores the state it started from.
pub struct Transaction<'a> {
    engine: &'a mut Engine,
    changes: ChangeSet,
    outcomes: Vec<MutationOutcome>,
    committed: bool,
}

impl Transaction<'_> {
    /// Apply one mutation inside the transaction.
    ///
    /// A failing mutation leaves no trace; mutations applied before it stay applied until the
    /// transaction is committed or dropped.
    pub fn execute(&mut self, mutation: Mutation) -> EngineResult<MutationOutcome> {
        let label = mutation.label();
        let engine = &mut *self.engine;
        let mut recorder = Recorder::new(&mut engine.project, &engine.config, label);
        match recorder.apply(mutation) {
            Ok(outcome) => {
                self.changes.extend(recorder.changes);
                self.outcomes.push(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                recorder.rollback();
                log::debug!(
                    "event=mutation module=engine status=rejected label={} in_transaction=true error={}",
                    label,
                    err
                );
                Err(err)
            }
        }
    }

    /// Intermediate state.
    pub fn project(&self) -> &Project {
        &self.engine.project
    }

    /// Number of mutations applied so far.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check if no mutation was applied yet.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Commit everything as one undo step and one change batch.
    pub fn commit(mut self) -> Vec<MutationOutcome> {
        self.committed = true;
        let changes = std::mem::take(&mut self.changes);
        log::info!(
            "event=transaction module=engine status=ok label={} mutations={}",
            changes.label,
            self.outcomes.len()
        );
        self.engine.commit(changes);
        std::mem::take(&mut self.outcomes)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for op in self.changes.ops.iter().rev() {
            self.engine.project.apply(&op.inverse());
        }
        if !self.changes.is_empty() {
            log::info!(
                "event=transaction module=engine status=discarded label={} mutations={}",
                self.changes.label,
                self.outcomes.len()
            );
        }
    }
}
