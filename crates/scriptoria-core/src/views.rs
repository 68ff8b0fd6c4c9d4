//! Headless view models.
//!
//! Each model materializes one UI panel from the [`Project`] and keeps itself current from
//! [`ViewSubscriber`] callbacks. The models hold no reference into the engine: wrap them in an
//! `Arc<Mutex<_>>` to register them and keep a handle for rendering.
//!
//! All three models apply their own [`FilterState`] locally. `rebuild` recomputes the model from
//! scratch; after any sequence of events an incrementally maintained model equals a freshly
//! rebuilt one.

use crate::annotation::{Annotation, AnnotationId};
use crate::engine::Project;
use crate::filter::{FilterState, Predicate, evaluate};
use crate::span::{self, Span};
use crate::span_index::{IndexEntry, SpanIndex};
use crate::storyboard::StoryboardEntry;
use crate::sync::{UpdateDelta, ViewSubscriber};
use crate::theme::ThemeId;
use std::collections::{BTreeMap, HashMap};

fn visible<'a>(
    project: &'a Project,
    id: AnnotationId,
    predicate: &Predicate,
) -> Option<&'a Annotation> {
    let annotation = project.annotations().get(id)?;
    evaluate(annotation, predicate, &project.filter_context()).then_some(annotation)
}

/// One row of the category browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BrowserRow {
    /// Document offset of the annotation's first span.
    pub start: usize,
    /// The annotation.
    pub id: AnnotationId,
}

/// Category browser: theme → visible annotations in document order.
#[derive(Debug)]
pub struct ThemeBrowserModel {
    filter: FilterState,
    predicate: Predicate,
    groups: BTreeMap<ThemeId, Vec<BrowserRow>>,
    placed: HashMap<AnnotationId, (ThemeId, BrowserRow)>,
}

impl Default for ThemeBrowserModel {
    fn default() -> Self {
        Self::with_filter(FilterState::default())
    }
}

impl ThemeBrowserModel {
    /// Create an unfiltered, empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty model with a filter.
    pub fn with_filter(filter: FilterState) -> Self {
        Self {
            predicate: filter.to_predicate(),
            filter,
            groups: BTreeMap::new(),
            placed: HashMap::new(),
        }
    }

    /// Current filter.
    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Replace the filter and rebuild.
    pub fn set_filter(&mut self, filter: FilterState, project: &Project) {
        self.predicate = filter.to_predicate();
        self.filter = filter;
        self.rebuild(project);
    }

    /// Recompute everything from the project.
    pub fn rebuild(&mut self, project: &Project) {
        self.groups.clear();
        self.placed.clear();
        for theme in project.themes().iter() {
            self.groups.insert(theme.id, Vec::new());
        }
        for id in project.annotations().ids() {
            self.place(id, project);
        }
    }

    /// Theme groups with their visible rows.
    pub fn groups(&self) -> &BTreeMap<ThemeId, Vec<BrowserRow>> {
        &self.groups
    }

    /// Visible rows of one theme.
    pub fn rows(&self, theme: ThemeId) -> &[BrowserRow] {
        self.groups.get(&theme).map_or(&[], Vec::as_slice)
    }

    /// Number of visible annotations.
    pub fn visible_len(&self) -> usize {
        self.placed.len()
    }

    /// Check if an annotation is visible.
    pub fn is_visible(&self, id: AnnotationId) -> bool {
        self.placed.contains_key(&id)
    }

    fn place(&mut self, id: AnnotationId, project: &Project) {
        let Some(annotation) = visible(project, id, &self.predicate) else {
            return;
        };
        let row = BrowserRow {
            start: annotation.start(),
            id,
        };
        let theme = annotation.meta.theme;
        let rows = self.groups.entry(theme).or_default();
        let pos = rows.partition_point(|r| *r < row);
        rows.insert(pos, row);
        self.placed.insert(id, (theme, row));
    }

    fn unplace(&mut self, id: AnnotationId) {
        let Some((theme, row)) = self.placed.remove(&id) else {
            return;
        };
        if let Some(rows) = self.groups.get_mut(&theme)
            && let Ok(pos) = rows.binary_search(&row)
        {
            rows.remove(pos);
        }
    }
}

impl ViewSubscriber for ThemeBrowserModel {
    fn on_snapshot(&mut self, project: &Project) {
        self.rebuild(project);
    }

    fn on_created(&mut self, id: AnnotationId, _: &[Span], _: ThemeId, project: &Project) {
        self.place(id, project);
    }

    fn on_updated(&mut self, delta: &UpdateDelta, project: &Project) {
        self.unplace(delta.id);
        self.place(delta.id, project);
    }

    fn on_deleted(&mut self, id: AnnotationId, _: &[Span], _: ThemeId, _: &Project) {
        self.unplace(id);
    }

    fn on_themes_changed(&mut self, themes: &[ThemeId], project: &Project) {
        for theme in themes {
            if project.themes().contains(*theme) {
                self.groups.entry(*theme).or_default();
            } else if let Some(rows) = self.groups.remove(theme) {
                // Rows are normally moved away by the update events that follow.
                for row in rows {
                    self.placed.remove(&row.id);
                }
            }
        }
    }
}

/// One visible storyboard entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryboardRow {
    /// The entry.
    pub entry: StoryboardEntry,
    /// Header label of an annotation entry.
    pub header: Option<String>,
    /// Spoken words of an annotation entry (strikethrough excluded); zero for dividers.
    pub words: usize,
}

/// Script panel: storyboard entries in order, filtered, with word counts.
#[derive(Debug)]
pub struct StoryboardViewModel {
    filter: FilterState,
    predicate: Predicate,
    rows: Vec<StoryboardRow>,
    words: HashMap<AnnotationId, usize>,
}

impl Default for StoryboardViewModel {
    fn default() -> Self {
        Self::with_filter(FilterState::default())
    }
}

impl StoryboardViewModel {
    /// Create an unfiltered, empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty model with a filter.
    pub fn with_filter(filter: FilterState) -> Self {
        Self {
            predicate: filter.to_predicate(),
            filter,
            rows: Vec::new(),
            words: HashMap::new(),
        }
    }

    /// Current filter.
    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Replace the filter and rebuild.
    pub fn set_filter(&mut self, filter: FilterState, project: &Project) {
        self.predicate = filter.to_predicate();
        self.filter = filter;
        self.rebuild(project);
    }

    /// Recompute everything from the project.
    pub fn rebuild(&mut self, project: &Project) {
        self.words.clear();
        self.refresh_rows(project);
    }

    /// Visible rows in storyboard order.
    pub fn rows(&self) -> &[StoryboardRow] {
        &self.rows
    }

    /// Total words of the visible annotation entries.
    pub fn total_words(&self) -> usize {
        self.rows.iter().map(|r| r.words).sum()
    }

    fn words_of(&mut self, id: AnnotationId, project: &Project) -> usize {
        if let Some(words) = self.words.get(&id) {
            return *words;
        }
        let words = project
            .annotation(id)
            .map_or(0, |a| crate::stats::annotation_words(project.document(), a));
        self.words.insert(id, words);
        words
    }

    fn row(&mut self, entry: &StoryboardEntry, project: &Project) -> Option<StoryboardRow> {
        match entry.annotation() {
            Some(id) => {
                visible(project, id, &self.predicate)?;
                Some(StoryboardRow {
                    entry: entry.clone(),
                    header: project.storyboard().header(id).map(str::to_string),
                    words: self.words_of(id, project),
                })
            }
            None => Some(StoryboardRow {
                entry: entry.clone(),
                header: None,
                words: 0,
            }),
        }
    }

    fn refresh_rows(&mut self, project: &Project) {
        let mut rows = Vec::with_capacity(project.storyboard().len());
        for entry in project.storyboard().entries() {
            if let Some(row) = self.row(entry, project) {
                rows.push(row);
            }
        }
        self.rows = rows;
    }
}

impl ViewSubscriber for StoryboardViewModel {
    fn on_snapshot(&mut self, project: &Project) {
        self.rebuild(project);
    }

    fn on_updated(&mut self, delta: &UpdateDelta, project: &Project) {
        self.words.remove(&delta.id);
        if !project.storyboard().contains(delta.id) {
            return;
        }
        let current = self
            .rows
            .iter()
            .position(|r| r.entry.annotation() == Some(delta.id));
        let entry = StoryboardEntry::Annotation { id: delta.id };
        match (current, self.row(&entry, project)) {
            (Some(index), Some(row)) => self.rows[index] = row,
            (None, None) => {}
            _ => self.refresh_rows(project),
        }
    }

    fn on_deleted(&mut self, id: AnnotationId, _: &[Span], _: ThemeId, _: &Project) {
        self.words.remove(&id);
    }

    fn on_reordered(&mut self, _: &[AnnotationId], project: &Project) {
        self.refresh_rows(project);
    }
}

/// Paint data of one visible annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    /// Covered ranges.
    pub spans: Vec<Span>,
    /// Primary theme.
    pub theme: ThemeId,
    /// Color of the primary theme.
    pub color: String,
    /// Ranges drawn struck through.
    pub strikethrough: Vec<Span>,
}

/// Live document panel: what to paint where.
#[derive(Debug)]
pub struct DocumentHighlightModel {
    filter: FilterState,
    predicate: Predicate,
    highlights: BTreeMap<AnnotationId, Highlight>,
    index: SpanIndex,
    dirty: Vec<Span>,
}

impl Default for DocumentHighlightModel {
    fn default() -> Self {
        Self::with_filter(FilterState::default())
    }
}

impl DocumentHighlightModel {
    /// Create an unfiltered, empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty model with a filter.
    pub fn with_filter(filter: FilterState) -> Self {
        Self {
            predicate: filter.to_predicate(),
            filter,
            highlights: BTreeMap::new(),
            index: SpanIndex::new(),
            dirty: Vec::new(),
        }
    }

    /// Current filter.
    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Replace the filter and rebuild.
    pub fn set_filter(&mut self, filter: FilterState, project: &Project) {
        self.predicate = filter.to_predicate();
        self.filter = filter;
        self.rebuild(project);
    }

    /// Recompute everything from the project. The whole document becomes dirty.
    pub fn rebuild(&mut self, project: &Project) {
        self.highlights.clear();
        self.index.clear();
        for id in project.annotations().ids() {
            self.place(id, project);
        }
        self.dirty = vec![Span::new(0, project.document().len_chars())];
    }

    /// Visible highlights by id.
    pub fn highlights(&self) -> &BTreeMap<AnnotationId, Highlight> {
        &self.highlights
    }

    /// The model's own span index over visible highlights.
    pub fn index(&self) -> &SpanIndex {
        &self.index
    }

    /// Visible annotations covering an offset (hover, click).
    pub fn at(&self, offset: usize) -> Vec<AnnotationId> {
        self.index.query_point(offset).into_iter().map(|e| e.owner).collect()
    }

    /// Visible span pieces overlapping a viewport range, in document order.
    pub fn paint_list(&self, range: Span) -> Vec<(IndexEntry, &Highlight)> {
        self.index
            .query(range)
            .into_iter()
            .filter_map(|e| self.highlights.get(&e.owner).map(|h| (e, h)))
            .collect()
    }

    /// Ranges needing a repaint since the last call, normalized.
    pub fn take_dirty(&mut self) -> Vec<Span> {
        let mut dirty = std::mem::take(&mut self.dirty);
        span::normalize(&mut dirty);
        dirty
    }

    fn place(&mut self, id: AnnotationId, project: &Project) {
        let Some(annotation) = visible(project, id, &self.predicate) else {
            return;
        };
        let theme = annotation.meta.theme;
        let highlight = Highlight {
            spans: annotation.spans.clone(),
            theme,
            color: project
                .themes()
                .get(theme)
                .map(|t| t.color.clone())
                .unwrap_or_default(),
            strikethrough: annotation.strikethrough.clone(),
        };
        self.index.insert_all(&highlight.spans, id);
        self.dirty.extend(highlight.spans.iter().copied());
        self.highlights.insert(id, highlight);
    }

    fn unplace(&mut self, id: AnnotationId) {
        if self.highlights.remove(&id).is_some() {
            let spans = self.index.remove(id);
            self.dirty.extend(spans);
        }
    }
}

impl ViewSubscriber for DocumentHighlightModel {
    fn on_snapshot(&mut self, project: &Project) {
        self.rebuild(project);
    }

    fn on_created(&mut self, id: AnnotationId, _: &[Span], _: ThemeId, project: &Project) {
        self.place(id, project);
    }

    fn on_updated(&mut self, delta: &UpdateDelta, project: &Project) {
        self.unplace(delta.id);
        self.place(delta.id, project);
    }

    fn on_deleted(&mut self, id: AnnotationId, _: &[Span], _: ThemeId, _: &Project) {
        self.unplace(id);
    }

    fn on_themes_changed(&mut self, themes: &[ThemeId], project: &Project) {
        for highlight in self.highlights.values_mut() {
            if !themes.contains(&highlight.theme) {
                continue;
            }
            if let Some(theme) = project.themes().get(highlight.theme)
                && theme.color != highlight.color
            {
                highlight.color = theme.color.clone();
                self.dirty.extend(highlight.spans.iter().copied());
            }
        }
    }
}
