//! Filter Engine: pure predicates over annotation metadata.
//!
//! Filters never mutate anything. A view keeps its own [`FilterState`] and asks
//! [`apply_filter`] for its visible subset; clearing the state yields the unfiltered set again.

use crate::annotation::{Annotation, AnnotationId, AnnotationStore};
use crate::document::Document;
use crate::theme::ThemeId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a scene title is matched.
#[derive(Debug, Clone)]
pub enum TitleMatch {
    /// Case-insensitive equality.
    Exact(String),
    /// Case-insensitive substring.
    Contains(String),
    /// Regular expression.
    Regex(Regex),
}

impl TitleMatch {
    fn matches(&self, title: &str) -> bool {
        match self {
            TitleMatch::Exact(expected) => title.trim().to_lowercase() == expected.trim().to_lowercase(),
            TitleMatch::Contains(part) => title.to_lowercase().contains(&part.to_lowercase()),
            TitleMatch::Regex(re) => re.is_match(title),
        }
    }
}

/// Boolean predicate tree.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Conjunction (empty = true).
    All(Vec<Predicate>),
    /// Disjunction (empty = false).
    Any(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
    /// Primary or a secondary theme is in the set.
    ThemeIn(BTreeSet<ThemeId>),
    /// Primary theme is in the set.
    PrimaryThemeIn(BTreeSet<ThemeId>),
    /// At least one tag is in the set.
    TagIn(BTreeSet<String>),
    /// Favorite flag equals the value.
    Favorite(bool),
    /// Used flag equals the value.
    Used(bool),
    /// Scene title is set and matches.
    SceneTitle(TitleMatch),
    /// Case-insensitive search in the covered text and the notes.
    TextContains(String),
}

impl Predicate {
    /// The predicate every annotation satisfies.
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }
}

/// Read-only lookup context for evaluation.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Document the spans refer to.
    pub document: &'a Document,
    /// Annotation lookup for [`apply_filter`].
    pub annotations: &'a AnnotationStore,
}

/// Evaluate a predicate against one annotation.
pub fn evaluate(annotation: &Annotation, predicate: &Predicate, ctx: &FilterContext<'_>) -> bool {
    let meta = &annotation.meta;
    match predicate {
        Predicate::All(parts) => parts.iter().all(|p| evaluate(annotation, p, ctx)),
        Predicate::Any(parts) => parts.iter().any(|p| evaluate(annotation, p, ctx)),
        Predicate::Not(inner) => !evaluate(annotation, inner, ctx),
        Predicate::ThemeIn(themes) => meta.all_themes().any(|t| themes.contains(&t)),
        Predicate::PrimaryThemeIn(themes) => themes.contains(&meta.theme),
        Predicate::TagIn(tags) => meta.tags.iter().any(|t| tags.contains(t)),
        Predicate::Favorite(value) => meta.favorite == *value,
        Predicate::Used(value) => meta.used == *value,
        Predicate::SceneTitle(matcher) => meta
            .scene_title
            .as_deref()
            .is_some_and(|title| matcher.matches(title)),
        Predicate::TextContains(needle) => {
            let needle = needle.to_lowercase();
            if needle.is_empty() {
                return true;
            }
            meta.notes.to_lowercase().contains(&needle)
                || annotation
                    .spans
                    .iter()
                    .any(|s| ctx.document.slice(*s).to_lowercase().contains(&needle))
        }
    }
}

/// The visible subset of `ids`, order preserved. Unknown ids are dropped.
pub fn apply_filter(
    ids: &[AnnotationId],
    predicate: &Predicate,
    ctx: &FilterContext<'_>,
) -> Vec<AnnotationId> {
    ids.iter()
        .copied()
        .filter(|id| {
            ctx.annotations
                .get(*id)
                .is_some_and(|a| evaluate(a, predicate, ctx))
        })
        .collect()
}

/// "Used in script" filter of the browser panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedFilter {
    /// Show everything.
    #[default]
    All,
    /// Hide annotations already used in the script.
    HideUsed,
    /// Show only annotations used in the script.
    OnlyUsed,
}

/// Per-view filter settings as presented by the browser panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    /// Show only these themes (primary or secondary). Empty = all.
    pub themes: BTreeSet<ThemeId>,
    /// Show only annotations carrying one of these tags. Empty = all.
    pub tags: BTreeSet<String>,
    /// Show favorites only.
    pub favorites_only: bool,
    /// Used-in-script filter.
    pub used: UsedFilter,
    /// Free-text search.
    pub search: String,
    /// Show only these scene titles. Empty = all.
    pub scene_titles: BTreeSet<String>,
}

impl FilterState {
    /// Check if anything narrows the visible set.
    pub fn is_active(&self) -> bool {
        !self.themes.is_empty()
            || !self.tags.is_empty()
            || self.favorites_only
            || self.used != UsedFilter::All
            || !self.search.trim().is_empty()
            || !self.scene_titles.is_empty()
    }

    /// Reset to the inactive state.
    pub fn clear(&mut self) {
        *self = FilterState::default();
    }

    /// Compile into a predicate.
    pub fn to_predicate(&self) -> Predicate {
        let mut parts = Vec::new();
        if !self.themes.is_empty() {
            parts.push(Predicate::ThemeIn(self.themes.clone()));
        }
        if !self.tags.is_empty() {
            parts.push(Predicate::TagIn(self.tags.clone()));
        }
        if self.favorites_only {
            parts.push(Predicate::Favorite(true));
        }
        match self.used {
            UsedFilter::All => {}
            UsedFilter::HideUsed => parts.push(Predicate::Used(false)),
            UsedFilter::OnlyUsed => parts.push(Predicate::Used(true)),
        }
        let search = self.search.trim();
        if !search.is_empty() {
            parts.push(Predicate::TextContains(search.to_string()));
        }
        if !self.scene_titles.is_empty() {
            parts.push(Predicate::Any(
                self.scene_titles
                    .iter()
                    .map(|t| Predicate::SceneTitle(TitleMatch::Exact(t.clone())))
                    .collect(),
            ));
        }
        Predicate::All(parts)
    }
}
