//! Boundary to the external writing assistant.
//!
//! The assistant is an untrusted producer of structured text. Everything it returns goes through
//! the same parsing, resolution and validation as user input, and accepted suggestions enter the
//! engine as one ordinary atomic batch of [`Mutation`]s.
//!
//! Formats understood:
//!
//! ```text
//! [[ANNOTATION :: primary :: secondary, ... | none :: exact text :: brief note :: detailed note]]
//! <id> :: Order#N [:: HEADER :: "label"]
//! DIVIDER :: "title" :: Order#N [:: #color]
//! [[NOTES :: id :: brief note | SKIP :: detailed note | SKIP]]
//! ```

use crate::annotation::AnnotationId;
use crate::engine::{Engine, Mutation, MutationOutcome, NewAnnotation, Project};
use crate::error::EngineResult;
use crate::filter::{Predicate, evaluate};
use crate::span::Span;
use crate::theme::ThemeId;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

static ANNOTATION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[\[ANNOTATION\s*::(.*?)\]\]").expect("valid annotation block regex")
});
static ORDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^order\s*#\s*(\d+)$").expect("valid order regex"));
static BOLD_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<b[^>]*>([^<]+)</b>").expect("valid header regex"));
static NOTES_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\[NOTES\s*::(.*?)\]\]").expect("valid notes block regex"));
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("valid reference regex"));

const SKIP: &str = "SKIP";
const DEFAULT_DIVIDER_COLOR: &str = "#e0e0e0";
const REFERENCE_SIMILARITY: f64 = 0.3;

/// One annotation block as written by the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSuggestion {
    /// Primary theme name.
    pub primary: String,
    /// Secondary theme names.
    pub secondary: Vec<String>,
    /// Exact text to highlight.
    pub text: String,
    /// Brief note.
    pub note: String,
    /// Detailed footnote.
    pub footnote: String,
    /// Tags (optional trailing `tags: a, b` field).
    pub tags: Vec<String>,
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
        .trim()
}

/// Extract every well-formed annotation block. Line breaks inside a block are normalized.
pub fn parse_annotation_response(text: &str) -> Vec<RawSuggestion> {
    let mut out = Vec::new();
    for caps in ANNOTATION_BLOCK.captures_iter(text) {
        let body = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
        let mut fields: Vec<&str> = body.split("::").map(str::trim).collect();

        let mut tags = Vec::new();
        let last = fields.last().copied();
        if let Some(list) = last.and_then(|l| l.strip_prefix("tags:")) {
            tags = list
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            fields.pop();
        }
        if fields.len() < 5 {
            log::warn!(
                "event=suggestion_parse module=suggest status=rejected fields={}",
                fields.len()
            );
            continue;
        }

        let footnote = fields[fields.len() - 1];
        let note = fields[fields.len() - 2];
        let text = fields[2..fields.len() - 2].join(" :: ");
        let secondary = if fields[1].eq_ignore_ascii_case("none") {
            Vec::new()
        } else {
            fields[1]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        out.push(RawSuggestion {
            primary: fields[0].to_string(),
            secondary,
            text: strip_quotes(&text).to_string(),
            note: note.to_string(),
            footnote: footnote.to_string(),
            tags,
        });
    }
    out
}

/// Why a suggestion was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No theme resembles the primary theme name.
    UnknownTheme(String),
    /// The text does not occur in the document.
    TextNotFound,
    /// The text is empty.
    EmptyText,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownTheme(name) => write!(f, "unknown theme `{name}`"),
            RejectReason::TextNotFound => f.write_str("text not found in document"),
            RejectReason::EmptyText => f.write_str("empty text"),
        }
    }
}

/// A suggestion resolved against the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Located range (first occurrence).
    pub range: Span,
    /// Resolved primary theme.
    pub theme: ThemeId,
    /// Its display name.
    pub theme_name: String,
    /// Resolved secondary themes (never contains `theme`).
    pub secondary: BTreeSet<ThemeId>,
    /// Tags.
    pub tags: Vec<String>,
    /// Brief note.
    pub note: String,
    /// Detailed footnote.
    pub footnote: String,
}

impl Suggestion {
    /// The creation request for this suggestion.
    pub fn to_mutation(&self) -> Mutation {
        let mut new = NewAnnotation::new(self.range, self.theme)
            .with_notes(self.note.clone())
            .with_footnote(self.footnote.clone());
        for theme in &self.secondary {
            new = new.with_secondary(*theme);
        }
        for tag in &self.tags {
            new = new.with_tag(tag);
        }
        Mutation::CreateAnnotation(new)
    }
}

/// Outcome of [`resolve_suggestions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionReport {
    /// Suggestions ready to apply.
    pub accepted: Vec<Suggestion>,
    /// Discarded suggestions.
    pub rejected: Vec<(RawSuggestion, RejectReason)>,
}

/// Resolve theme names and locate text.
pub fn resolve_suggestions(engine: &Engine, raw: Vec<RawSuggestion>) -> SuggestionReport {
    let project = engine.project();
    let threshold = engine.config().theme_match_threshold;
    let mut report = SuggestionReport::default();

    for suggestion in raw {
        if suggestion.text.trim().is_empty() {
            report.rejected.push((suggestion, RejectReason::EmptyText));
            continue;
        }
        let Some(theme) = project.themes().best_match(&suggestion.primary, threshold) else {
            log::warn!("event=suggestion_resolve module=suggest status=rejected reason=unknown_theme");
            let name = suggestion.primary.clone();
            report.rejected.push((suggestion, RejectReason::UnknownTheme(name)));
            continue;
        };
        let Some(range) = project.document().find(&suggestion.text, 0) else {
            log::warn!("event=suggestion_resolve module=suggest status=rejected reason=text_not_found");
            report.rejected.push((suggestion, RejectReason::TextNotFound));
            continue;
        };

        let secondary: BTreeSet<ThemeId> = suggestion
            .secondary
            .iter()
            .filter_map(|name| project.themes().best_match(name, threshold))
            .map(|t| t.id)
            .filter(|id| *id != theme.id)
            .collect();

        report.accepted.push(Suggestion {
            range,
            theme: theme.id,
            theme_name: theme.name.clone(),
            secondary,
            tags: suggestion.tags,
            note: suggestion.note,
            footnote: suggestion.footnote,
        });
    }
    report
}

/// One line of a storyboard plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    /// Place an annotation.
    Annotation {
        /// Annotation to place.
        id: AnnotationId,
        /// Requested order.
        order: usize,
        /// Optional header label.
        header: Option<String>,
    },
    /// Insert a divider.
    Divider {
        /// Section title.
        title: String,
        /// Requested order.
        order: usize,
        /// Optional color.
        color: Option<String>,
    },
}

impl PlanItem {
    fn order(&self) -> usize {
        match self {
            PlanItem::Annotation { order, .. } | PlanItem::Divider { order, .. } => *order,
        }
    }
}

/// A parsed storyboard ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryboardPlan {
    /// Recognized items, in the order they were written.
    pub items: Vec<PlanItem>,
    /// Lines containing `::` that could not be understood.
    pub unparsed: Vec<String>,
}

fn parse_order(field: &str) -> Option<usize> {
    ORDER.captures(field.trim())?[1].parse().ok()
}

fn clean_header(raw: &str) -> Option<String> {
    let raw = strip_quotes(raw);
    let text = BOLD_HEADER
        .captures(raw)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| raw.to_string());
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parse an ordering response line by line.
pub fn parse_storyboard_response(text: &str) -> StoryboardPlan {
    let mut plan = StoryboardPlan::default();
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        if !line.contains("::") {
            continue;
        }
        let parts: Vec<&str> = line.split("::").map(str::trim).collect();

        let item = if parts[0] == "DIVIDER" && parts.len() >= 3 {
            parse_order(parts[2]).map(|order| PlanItem::Divider {
                title: strip_quotes(parts[1]).to_string(),
                order,
                color: parts
                    .get(3)
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
            })
        } else {
            let id = parts[0].parse::<AnnotationId>().ok();
            let order = parse_order(parts[1]);
            id.zip(order).map(|(id, order)| PlanItem::Annotation {
                id,
                order,
                header: (parts.len() >= 4 && parts[2].eq_ignore_ascii_case("HEADER"))
                    .then(|| clean_header(parts[3]))
                    .flatten(),
            })
        };
        match item {
            Some(item) => plan.items.push(item),
            None => plan.unparsed.push(line.to_string()),
        }
    }
    plan
}

/// Notes written by the assistant for an existing annotation. `None` means "leave as is".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesSuggestion {
    /// Annotation the notes are for.
    pub id: AnnotationId,
    /// Brief note.
    pub brief: Option<String>,
    /// Detailed footnote.
    pub detailed: Option<String>,
}

fn skippable(field: &str) -> Option<String> {
    let field = strip_quotes(field);
    (!field.is_empty() && field != SKIP).then(|| field.to_string())
}

/// Extract every `[[NOTES :: ...]]` block. Blocks without a numeric id or with fewer than three
/// fields are dropped.
pub fn parse_notes_response(text: &str) -> Vec<NotesSuggestion> {
    let mut out = Vec::new();
    for caps in NOTES_BLOCK.captures_iter(text) {
        let body = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
        let fields: Vec<&str> = body.split("::").map(str::trim).collect();
        let id = fields.first().and_then(|f| f.parse::<AnnotationId>().ok());
        let (Some(id), true) = (id, fields.len() >= 3) else {
            log::warn!(
                "event=notes_parse module=suggest status=rejected fields={}",
                fields.len()
            );
            continue;
        };
        out.push(NotesSuggestion {
            id,
            brief: skippable(fields[1]),
            detailed: skippable(&fields[2..].join(" :: ")),
        });
    }
    out
}

/// Outcome of [`Engine::apply_notes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesOutcome {
    /// Brief notes written.
    pub notes: usize,
    /// Footnotes written.
    pub footnotes: usize,
    /// Ids skipped because the annotation does not exist.
    pub skipped: Vec<AnnotationId>,
}

/// Outcome of [`Engine::apply_storyboard_plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Annotations placed or moved.
    pub placed: usize,
    /// Dividers added.
    pub dividers: usize,
    /// Ids skipped because the annotation does not exist.
    pub skipped: Vec<AnnotationId>,
}

impl Engine {
    /// Create every accepted suggestion as one atomic action. Returns the new ids.
    pub fn apply_suggestions(&mut self, accepted: &[Suggestion]) -> EngineResult<Vec<AnnotationId>> {
        let outcomes = self.execute_batch(accepted.iter().map(Suggestion::to_mutation))?;
        let ids: Vec<AnnotationId> = outcomes
            .into_iter()
            .filter_map(|o| match o {
                MutationOutcome::Created(id) => Some(id),
                _ => None,
            })
            .collect();
        log::info!(
            "event=suggestions_apply module=suggest status=ok created={}",
            ids.len()
        );
        Ok(ids)
    }

    /// Apply an ordering plan as one atomic action.
    ///
    /// Items are applied by ascending order number. With `replace` the storyboard is cleared
    /// first; otherwise planned annotations already in the storyboard are moved to the end in plan
    /// order. Unknown ids are skipped.
    pub fn apply_storyboard_plan(
        &mut self,
        plan: &StoryboardPlan,
        replace: bool,
    ) -> EngineResult<PlanOutcome> {
        let mut items: Vec<&PlanItem> = plan.items.iter().collect();
        items.sort_by_key(|item| item.order());

        let mut outcome = PlanOutcome::default();
        let mut tx = self.transaction("storyboard_plan");
        if replace {
            tx.execute(Mutation::StoryboardClear)?;
        }
        for item in items {
            match item {
                PlanItem::Annotation { id, header, .. } => {
                    if !tx.project().annotations().contains(*id) {
                        log::warn!(
                            "event=plan_apply module=suggest status=skipped reason=unknown_id id={}",
                            id
                        );
                        outcome.skipped.push(*id);
                        continue;
                    }
                    if tx.project().storyboard().contains(*id) {
                        let last = tx.project().storyboard().len() - 1;
                        tx.execute(Mutation::StoryboardMove {
                            id: *id,
                            index: last,
                        })?;
                    } else {
                        tx.execute(Mutation::StoryboardAppend { id: *id })?;
                    }
                    if header.is_some() {
                        tx.execute(Mutation::SetStoryboardHeader {
                            id: *id,
                            header: header.clone(),
                        })?;
                    }
                    outcome.placed += 1;
                }
                PlanItem::Divider { title, color, .. } => {
                    tx.execute(Mutation::AddDivider {
                        index: None,
                        title: title.clone(),
                        color: color
                            .clone()
                            .unwrap_or_else(|| DEFAULT_DIVIDER_COLOR.to_string()),
                    })?;
                    outcome.dividers += 1;
                }
            }
        }
        tx.commit();
        log::info!(
            "event=plan_apply module=suggest status=ok placed={} dividers={} skipped={}",
            outcome.placed,
            outcome.dividers,
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}

impl Engine {
    /// Fill in missing notes and footnotes as one atomic action.
    ///
    /// Only empty fields are written; existing text is never replaced.
    pub fn apply_notes(&mut self, suggestions: &[NotesSuggestion]) -> EngineResult<NotesOutcome> {
        let mut outcome = NotesOutcome::default();
        let mut tx = self.transaction("notes");
        for suggestion in suggestions {
            let id = suggestion.id;
            let Some(meta) = tx.project().annotation(id).map(|a| a.meta.clone()) else {
                log::warn!(
                    "event=notes_apply module=suggest status=skipped reason=unknown_id id={}",
                    id
                );
                outcome.skipped.push(id);
                continue;
            };
            if let Some(notes) = &suggestion.brief
                && meta.notes.trim().is_empty()
            {
                tx.execute(Mutation::SetNotes {
                    id,
                    notes: notes.clone(),
                })?;
                outcome.notes += 1;
            }
            if let Some(footnote) = &suggestion.detailed
                && meta.footnote.trim().is_empty()
            {
                tx.execute(Mutation::SetFootnote {
                    id,
                    footnote: footnote.clone(),
                })?;
                outcome.footnotes += 1;
            }
        }
        tx.commit();
        log::info!(
            "event=notes_apply module=suggest status=ok notes={} footnotes={} skipped={}",
            outcome.notes,
            outcome.footnotes,
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// The compact annotation listing sent to the assistant, one line per matching annotation in
/// document order.
pub fn format_annotation_context(project: &Project, predicate: &Predicate, max_chars: usize) -> String {
    let ctx = project.filter_context();
    let mut out = String::new();
    for id in project.document_order() {
        let Some(annotation) = project.annotation(id) else {
            continue;
        };
        if !evaluate(annotation, predicate, &ctx) {
            continue;
        }
        let text = project.annotation_text(id).unwrap_or_default();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let meta = &annotation.meta;
        let name = |t: &ThemeId| project.themes().get(*t).map(|t| t.name.clone());

        let mut fields = Vec::new();
        if !meta.notes.trim().is_empty() {
            fields.push(format!("note: {}", truncate(meta.notes.trim(), max_chars)));
        }
        fields.push(format!("favorite: {}", if meta.favorite { "yes" } else { "no" }));
        if !meta.tags.is_empty() {
            let tags: Vec<&str> = meta.tags.iter().map(String::as_str).collect();
            fields.push(format!("tags: {}", tags.join(", ")));
        }
        if let Some(theme) = name(&meta.theme) {
            fields.push(format!("theme: {theme}"));
        }
        let secondary: Vec<String> = meta.secondary_themes.iter().filter_map(name).collect();
        if !secondary.is_empty() {
            fields.push(format!("secondary-theme: {}", secondary.join(", ")));
        }
        out.push_str(&format!(
            "{id}: \"{}\" [{}]\n",
            truncate(&text, max_chars),
            fields.join("; ")
        ));
    }
    out
}

/// How an `[[id]]` reference resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The id exists.
    Exact(AnnotationId),
    /// The id does not exist; this is the most similar existing id.
    Corrected(AnnotationId),
    /// Nothing similar exists.
    Unknown,
}

/// One `[[id]]` reference in free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Byte range of the whole `[[...]]` in the text.
    pub range: Range<usize>,
    /// What was written between the brackets.
    pub written: String,
    /// Resolution.
    pub resolution: Resolution,
}

fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }
    let set_a: BTreeSet<char> = a.chars().collect();
    let set_b: BTreeSet<char> = b.chars().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let jaccard = set_a.intersection(&set_b).count() as f64 / union as f64;
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let max_len = len_a.max(len_b);
    let penalty = 1.0 - len_a.abs_diff(len_b) as f64 / max_len as f64;
    jaccard * penalty
}

/// Find `[[id]]` references in an assistant answer and map them to known annotations.
pub fn resolve_references(text: &str, project: &Project) -> Vec<Reference> {
    let known: Vec<(String, AnnotationId)> = project
        .annotations()
        .ids()
        .map(|id| (id.to_string(), id))
        .collect();

    REFERENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let written = caps[1].trim().to_string();
            if written.contains("::") {
                return None;
            }
            let exact = written
                .parse::<AnnotationId>()
                .ok()
                .filter(|id| project.annotations().contains(*id));
            let resolution = match exact {
                Some(id) => Resolution::Exact(id),
                None => known
                    .iter()
                    .map(|(s, id)| (similarity(&written, s), *id))
                    .filter(|(score, _)| *score > REFERENCE_SIMILARITY)
                    .max_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)))
                    .map_or(Resolution::Unknown, |(_, id)| Resolution::Corrected(id)),
            };
            Some(Reference {
                range: whole.range(),
                written,
                resolution,
            })
        })
        .collect()
}
