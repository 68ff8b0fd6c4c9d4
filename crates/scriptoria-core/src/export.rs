//! Exports: annotated HTML, structured JSON and the plain-text script.
//!
//! All exporters read a [`Project`] (usually through a [`ProjectSnapshot`](crate::ProjectSnapshot))
//! and never touch the engine.

use crate::annotation::{Annotation, AnnotationId};
use crate::document::MarkerKind;
use crate::engine::Project;
use crate::error::EngineResult;
use crate::span::{self, Span};
use crate::stats::annotation_words;
use crate::storyboard::StoryboardEntry;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Options of [`render_html`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlOptions {
    /// Page title.
    pub title: String,
    /// Render the theme legend before the document.
    pub legend: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            title: "Annotated document".to_string(),
            legend: true,
        }
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn theme_name(project: &Project, annotation: &Annotation) -> String {
    project
        .themes()
        .get(annotation.meta.theme)
        .map(|t| t.name.clone())
        .unwrap_or_default()
}

fn mark_open(project: &Project, annotation: &Annotation, fragment: Span) -> String {
    let meta = &annotation.meta;
    let color = project
        .themes()
        .get(meta.theme)
        .map(|t| t.color.as_str())
        .unwrap_or("transparent");
    let secondary: Vec<&str> = meta
        .secondary_themes
        .iter()
        .filter_map(|t| project.themes().get(*t).map(|t| t.name.as_str()))
        .collect();
    let tags: Vec<&str> = meta.tags.iter().map(String::as_str).collect();
    let struck = annotation.strikethrough.iter().any(|s| s.covers(&fragment));

    let mut style = format!("background-color: {color}");
    if struck {
        style.push_str("; text-decoration: line-through");
    }
    format!(
        "<mark data-annotation-id=\"{}\" data-theme=\"{}\" data-secondary-themes=\"{}\" \
         data-tags=\"{}\" data-favorite=\"{}\" data-used=\"{}\" data-scene-title=\"{}\" \
         data-strikethrough=\"{}\" style=\"{}\">",
        annotation.id,
        escape_html(&theme_name(project, annotation)),
        escape_html(&secondary.join(",")),
        escape_html(&tags.join(",")),
        meta.favorite,
        meta.used,
        escape_html(meta.scene_title.as_deref().unwrap_or("")),
        struck,
        escape_html(&style),
    )
}

fn render_marker(out: &mut String, kind: &MarkerKind) {
    match kind {
        MarkerKind::Header { level, title } => {
            let level = (*level).clamp(1, 6);
            let _ = write!(out, "<h{level}>{}</h{level}>", escape_html(title));
        }
        MarkerKind::Divider => out.push_str("<hr>"),
        MarkerKind::SpeakerBreak { speaker } => {
            let _ = write!(out, "<p class=\"speaker\">{}</p>", escape_html(speaker));
        }
    }
}

/// Render the document as standalone HTML with one nested `<mark>` per covering annotation.
pub fn render_html(project: &Project, options: &HtmlOptions) -> String {
    let document = project.document();
    let len = document.len_chars();

    let mut cuts: Vec<usize> = vec![0, len];
    for entry in project.index().entries() {
        cuts.push(entry.span.start);
        cuts.push(entry.span.end);
    }
    for annotation in project.annotations().iter() {
        for cut in &annotation.strikethrough {
            cuts.push(cut.start);
            cuts.push(cut.end);
        }
    }
    cuts.extend(document.markers().iter().map(|m| m.offset));
    cuts.sort_unstable();
    cuts.dedup();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", escape_html(&options.title));
    out.push_str("</head>\n<body>\n");
    let _ = writeln!(out, "<h1>{}</h1>", escape_html(&options.title));

    if options.legend && !project.themes().is_empty() {
        out.push_str("<ul class=\"legend\">\n");
        for theme in project.themes().iter() {
            let hotkey = theme
                .hotkey
                .map(|h| format!(" ({h})"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "<li><span class=\"swatch\" style=\"background-color: {}\"></span> {}{}</li>",
                escape_html(&theme.color),
                escape_html(&theme.name),
                escape_html(&hotkey)
            );
        }
        out.push_str("</ul>\n");
    }

    out.push_str("<div class=\"document\" style=\"white-space: pre-wrap\">");
    let mut markers = document.markers().iter().peekable();
    for pair in cuts.windows(2) {
        let fragment = Span::new(pair[0], pair[1]);
        while let Some(marker) = markers.next_if(|m| m.offset <= fragment.start) {
            render_marker(&mut out, &marker.kind);
        }
        if fragment.is_empty() {
            continue;
        }

        let mut owners: Vec<AnnotationId> = project
            .index()
            .query(fragment)
            .into_iter()
            .map(|e| e.owner)
            .collect();
        owners.sort_unstable();
        owners.dedup();
        let covering: Vec<&Annotation> = owners
            .iter()
            .filter_map(|id| project.annotation(*id))
            .collect();

        for annotation in &covering {
            out.push_str(&mark_open(project, annotation, fragment));
        }
        out.push_str(&escape_html(&document.slice(fragment)));
        for _ in &covering {
            out.push_str("</mark>");
        }
    }
    for marker in markers {
        render_marker(&mut out, &marker.kind);
    }
    out.push_str("</div>\n</body>\n</html>\n");
    out
}

/// A theme in the JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTheme {
    /// Theme id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Hotkey character.
    pub hotkey: Option<String>,
}

/// An annotation in the JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAnnotation {
    /// Annotation id.
    pub id: u64,
    /// Covered text, spans joined by a space.
    pub text: String,
    /// Covered ranges.
    pub spans: Vec<Span>,
    /// Primary theme name.
    pub theme: String,
    /// Secondary theme names.
    pub secondary_themes: Vec<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Brief note.
    pub notes: String,
    /// Detailed footnote.
    pub footnote: String,
    /// Favorite flag.
    pub favorite: bool,
    /// Used flag.
    pub used: bool,
    /// Scene title.
    pub scene_title: Option<String>,
    /// Struck-through ranges.
    pub strikethrough: Vec<Span>,
    /// Spoken words.
    pub words: usize,
    /// Storyboard position.
    pub storyboard_position: Option<usize>,
}

/// A storyboard entry in the JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ExportStoryboardEntry {
    /// An annotation entry.
    Annotation {
        /// Annotation id.
        id: u64,
        /// Header label.
        header: Option<String>,
    },
    /// A section divider.
    Divider {
        /// Section title.
        title: String,
        /// Display color.
        color: String,
    },
}

/// The structured JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Document length in characters.
    pub document_length: usize,
    /// Theme table.
    pub themes: Vec<ExportTheme>,
    /// Annotations in document order.
    pub annotations: Vec<ExportAnnotation>,
    /// Storyboard in order.
    pub storyboard: Vec<ExportStoryboardEntry>,
}

impl ExportDocument {
    /// Build the export of a project.
    pub fn from_project(project: &Project) -> Self {
        let themes = project
            .themes()
            .iter()
            .map(|t| ExportTheme {
                id: t.id.get(),
                name: t.name.clone(),
                color: t.color.clone(),
                hotkey: t.hotkey.map(|h| h.to_string()),
            })
            .collect();

        let annotations = project
            .document_order()
            .into_iter()
            .filter_map(|id| project.annotation(id))
            .map(|a| ExportAnnotation {
                id: a.id.get(),
                text: project.annotation_text(a.id).unwrap_or_default(),
                spans: a.spans.clone(),
                theme: theme_name(project, a),
                secondary_themes: a
                    .meta
                    .secondary_themes
                    .iter()
                    .filter_map(|t| project.themes().get(*t).map(|t| t.name.clone()))
                    .collect(),
                tags: a.meta.tags.iter().cloned().collect(),
                notes: a.meta.notes.clone(),
                footnote: a.meta.footnote.clone(),
                favorite: a.meta.favorite,
                used: a.meta.used,
                scene_title: a.meta.scene_title.clone(),
                strikethrough: a.strikethrough.clone(),
                words: annotation_words(project.document(), a),
                storyboard_position: project.storyboard().position(a.id),
            })
            .collect();

        let storyboard = project
            .storyboard()
            .entries()
            .iter()
            .map(|entry| match entry {
                StoryboardEntry::Annotation { id } => ExportStoryboardEntry::Annotation {
                    id: id.get(),
                    header: project.storyboard().header(*id).map(str::to_string),
                },
                StoryboardEntry::Divider(divider) => ExportStoryboardEntry::Divider {
                    title: divider.title.clone(),
                    color: divider.color.clone(),
                },
            })
            .collect();

        Self {
            document_length: project.document().len_chars(),
            themes,
            annotations,
            storyboard,
        }
    }
}

/// Serialize [`ExportDocument`] as pretty JSON.
pub fn export_json(project: &Project) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(&ExportDocument::from_project(project))?)
}

/// Spoken text of an annotation: its spans minus struck-through ranges, whitespace collapsed.
pub fn spoken_text(project: &Project, annotation: &Annotation) -> String {
    let mut pieces = annotation.spans.clone();
    for cut in &annotation.strikethrough {
        pieces = span::subtract_all(&pieces, cut);
    }
    let text: Vec<String> = pieces
        .iter()
        .map(|s| project.document().slice(*s))
        .collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render the storyboard as a plain-text script.
pub fn render_script(project: &Project) -> String {
    let mut out = String::new();
    for entry in project.storyboard().entries() {
        match entry {
            StoryboardEntry::Divider(divider) => {
                let _ = writeln!(out, "== {} ==\n", divider.title.to_uppercase());
            }
            StoryboardEntry::Annotation { id } => {
                let Some(annotation) = project.annotation(*id) else {
                    continue;
                };
                if let Some(header) = project.storyboard().header(*id) {
                    let _ = writeln!(out, "## {header}");
                }
                let _ = writeln!(out, "{}\n", spoken_text(project, annotation));
            }
        }
    }
    out
}
