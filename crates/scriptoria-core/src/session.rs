//! Session persistence.
//!
//! A session is one JSON document holding the base text, its structural markers, the theme
//! table, every annotation, the storyboard and the per-view filter states. Loading never trusts
//! the file: every invariant is checked and broken references are repaired (and reported) instead
//! of failing the whole load. Only a structurally unreadable file is an error.

use crate::annotation::{Annotation, AnnotationId};
use crate::config::EngineConfig;
use crate::document::{Document, StructuralMarker};
use crate::engine::{Engine, Project};
use crate::error::{EngineError, EngineResult};
use crate::filter::FilterState;
use crate::snapshot::ProjectSnapshot;
use crate::span::{self, Span};
use crate::storyboard::StoryboardEntry;
use crate::theme::{Theme, ThemeId, ThemeTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Version written by this build. Files with a newer version are rejected.
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// The document part of a session file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDocument {
    /// Base text.
    pub text: String,
    /// Structural markers.
    #[serde(default)]
    pub markers: Vec<StructuralMarker>,
}

/// A storyboard header label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Storyboard member.
    pub id: AnnotationId,
    /// Label.
    pub text: String,
}

/// The storyboard part of a session file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStoryboard {
    /// Entries in order.
    pub entries: Vec<StoryboardEntry>,
    /// Header labels.
    pub headers: Vec<SessionHeader>,
    /// Next divider id.
    pub next_divider_id: u64,
}

/// On-disk session layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    /// Layout version.
    pub format_version: u32,
    /// Base text and markers.
    pub document: SessionDocument,
    /// Theme table in id order.
    #[serde(default)]
    pub themes: Vec<Theme>,
    /// Next theme id.
    #[serde(default)]
    pub next_theme_id: u32,
    /// Annotations in id order.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Next annotation id.
    #[serde(default)]
    pub next_annotation_id: u64,
    /// Storyboard.
    #[serde(default)]
    pub storyboard: SessionStoryboard,
    /// Filter state per view name.
    #[serde(default)]
    pub view_filters: BTreeMap<String, FilterState>,
}

impl SessionFile {
    /// Capture a project.
    pub fn from_project(project: &Project, view_filters: &BTreeMap<String, FilterState>) -> Self {
        let storyboard = project.storyboard();
        Self {
            format_version: SESSION_FORMAT_VERSION,
            document: SessionDocument {
                text: project.document().text().to_string(),
                markers: project.document().markers().to_vec(),
            },
            themes: project.themes().iter().cloned().collect(),
            next_theme_id: project.themes().next_id().get(),
            annotations: project.annotations().iter().cloned().collect(),
            next_annotation_id: project.annotations().next_id().get(),
            storyboard: SessionStoryboard {
                entries: storyboard.entries().to_vec(),
                headers: storyboard
                    .headers()
                    .iter()
                    .map(|(id, text)| SessionHeader {
                        id: *id,
                        text: text.clone(),
                    })
                    .collect(),
                next_divider_id: storyboard.next_divider_id().get(),
            },
            view_filters: view_filters.clone(),
        }
    }

    /// Rebuild a project, repairing whatever is inconsistent.
    pub fn into_project(self, config: &EngineConfig) -> EngineResult<(Project, Vec<Repair>)> {
        if self.format_version > SESSION_FORMAT_VERSION {
            return Err(EngineError::Session(format!(
                "format version {} is newer than supported version {}",
                self.format_version, SESSION_FORMAT_VERSION
            )));
        }
        let mut repairs = Vec::new();

        let len = self.document.text.chars().count();
        let mut markers = Vec::with_capacity(self.document.markers.len());
        for marker in self.document.markers {
            if marker.offset > len {
                repairs.push(Repair::MarkerOutOfBounds {
                    offset: marker.offset,
                });
            } else if !markers.contains(&marker) {
                markers.push(marker);
            }
        }
        let document = Document::with_markers(&self.document.text, markers)?;

        let capacity = config.theme_capacity.max(self.themes.len());
        if capacity > config.theme_capacity {
            repairs.push(Repair::ThemeCapacityRaised { capacity });
        }
        let mut project = Project::new(document, capacity);
        load_themes(&mut project.themes, self.themes, &mut repairs);
        project.themes.set_next_id(self.next_theme_id);

        let mut seen = HashSet::new();
        for annotation in self.annotations {
            if !seen.insert(annotation.id) {
                repairs.push(Repair::DuplicateAnnotation { id: annotation.id });
                continue;
            }
            if let Some(annotation) = repair_annotation(&project, annotation, &mut repairs) {
                project.index.insert_all(&annotation.spans, annotation.id);
                project.annotations.insert(annotation);
            }
        }
        project.annotations.set_next_id(self.next_annotation_id);

        load_storyboard(&mut project, self.storyboard, &mut repairs);
        Ok((project, repairs))
    }
}

fn load_themes(table: &mut ThemeTable, themes: Vec<Theme>, repairs: &mut Vec<Repair>) {
    for mut theme in themes {
        if table.contains(theme.id) || table.by_name(&theme.name).is_some() {
            repairs.push(Repair::DuplicateTheme { theme: theme.id });
            continue;
        }
        if let Some(hotkey) = theme.hotkey
            && table.by_hotkey(hotkey).is_some()
        {
            repairs.push(Repair::HotkeyCleared { theme: theme.id });
            theme.hotkey = None;
        }
        table.insert(theme);
    }
}

fn repair_annotation(
    project: &Project,
    mut annotation: Annotation,
    repairs: &mut Vec<Repair>,
) -> Option<Annotation> {
    let id = annotation.id;
    if !project.themes.contains(annotation.meta.theme) {
        repairs.push(Repair::UnknownPrimaryTheme {
            id,
            theme: annotation.meta.theme,
        });
        return None;
    }

    let len = project.document.len_chars();
    let clip = |spans: &[Span]| -> Vec<Span> {
        let clipped: Vec<Span> = spans
            .iter()
            .map(|s| Span::new(s.start.min(len), s.end.min(len)))
            .filter(|s| s.start < s.end)
            .collect();
        span::normalized(&clipped)
    };
    let spans = clip(&annotation.spans);
    if spans.is_empty() {
        repairs.push(Repair::EmptyAnnotation { id });
        return None;
    }
    if spans != annotation.spans {
        repairs.push(Repair::SpansClipped { id });
    }
    let strikethrough = span::clip_to(&clip(&annotation.strikethrough), &spans);
    if strikethrough != annotation.strikethrough {
        repairs.push(Repair::StrikethroughClipped { id });
    }
    annotation.spans = spans;
    annotation.strikethrough = strikethrough;

    let primary = annotation.meta.theme;
    if annotation.meta.secondary_themes.remove(&primary) {
        repairs.push(Repair::SecondaryEqualsPrimary { id, theme: primary });
    }
    let unknown: Vec<ThemeId> = annotation
        .meta
        .secondary_themes
        .iter()
        .copied()
        .filter(|t| !project.themes.contains(*t))
        .collect();
    for theme in unknown {
        annotation.meta.secondary_themes.remove(&theme);
        repairs.push(Repair::UnknownSecondaryTheme { id, theme });
    }
    Some(annotation)
}

fn load_storyboard(project: &mut Project, storyboard: SessionStoryboard, repairs: &mut Vec<Repair>) {
    let mut members = BTreeSet::new();
    let mut entries = Vec::with_capacity(storyboard.entries.len());
    let mut dividers = HashSet::new();
    for entry in storyboard.entries {
        match &entry {
            StoryboardEntry::Annotation { id } => {
                if !project.annotations.contains(*id) {
                    repairs.push(Repair::OrphanStoryboardEntry { id: *id });
                    continue;
                }
                if !members.insert(*id) {
                    repairs.push(Repair::DuplicateStoryboardEntry { id: *id });
                    continue;
                }
            }
            StoryboardEntry::Divider(divider) => {
                if !dividers.insert(divider.id) {
                    repairs.push(Repair::DuplicateDivider {
                        id: divider.id.get(),
                    });
                    continue;
                }
            }
        }
        entries.push(entry);
    }
    for entry in &entries {
        let len = project.storyboard.len();
        project.storyboard.insert_entry(len, entry.clone());
    }
    project.storyboard.set_next_divider_id(storyboard.next_divider_id);

    for header in storyboard.headers {
        if !members.contains(&header.id) {
            repairs.push(Repair::OrphanHeader { id: header.id });
            continue;
        }
        let text = header.text.trim();
        if !text.is_empty() {
            project.storyboard.set_header(header.id, Some(text.to_string()));
        }
    }
}

/// A problem found and fixed while loading a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// A structural marker pointed past the end of the text and was dropped.
    MarkerOutOfBounds {
        /// Marker offset.
        offset: usize,
    },
    /// More themes than the configured capacity; the capacity was raised.
    ThemeCapacityRaised {
        /// New capacity.
        capacity: usize,
    },
    /// A theme reused an id or a name and was dropped.
    DuplicateTheme {
        /// Dropped theme.
        theme: ThemeId,
    },
    /// A theme reused a hotkey; its hotkey was cleared.
    HotkeyCleared {
        /// Affected theme.
        theme: ThemeId,
    },
    /// An annotation reused an id and was dropped.
    DuplicateAnnotation {
        /// Duplicated id.
        id: AnnotationId,
    },
    /// An annotation referenced a missing primary theme and was dropped.
    UnknownPrimaryTheme {
        /// Dropped annotation.
        id: AnnotationId,
        /// Missing theme.
        theme: ThemeId,
    },
    /// A missing secondary theme was removed from an annotation.
    UnknownSecondaryTheme {
        /// Affected annotation.
        id: AnnotationId,
        /// Missing theme.
        theme: ThemeId,
    },
    /// The primary theme was also listed as secondary.
    SecondaryEqualsPrimary {
        /// Affected annotation.
        id: AnnotationId,
        /// The theme.
        theme: ThemeId,
    },
    /// Spans reached past the end of the text or were not normalized.
    SpansClipped {
        /// Affected annotation.
        id: AnnotationId,
    },
    /// Strikethrough ranges reached outside the annotation's spans.
    StrikethroughClipped {
        /// Affected annotation.
        id: AnnotationId,
    },
    /// An annotation had no text left and was dropped.
    EmptyAnnotation {
        /// Dropped annotation.
        id: AnnotationId,
    },
    /// The storyboard referenced a missing annotation.
    OrphanStoryboardEntry {
        /// Missing annotation.
        id: AnnotationId,
    },
    /// An annotation appeared twice in the storyboard.
    DuplicateStoryboardEntry {
        /// Duplicated annotation.
        id: AnnotationId,
    },
    /// A divider id appeared twice in the storyboard.
    DuplicateDivider {
        /// Duplicated divider id.
        id: u64,
    },
    /// A header belonged to an annotation outside the storyboard.
    OrphanHeader {
        /// Annotation id of the header.
        id: AnnotationId,
    },
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::MarkerOutOfBounds { offset } => {
                write!(f, "dropped marker past end of text at {offset}")
            }
            Repair::ThemeCapacityRaised { capacity } => {
                write!(f, "raised theme capacity to {capacity}")
            }
            Repair::DuplicateTheme { theme } => write!(f, "dropped duplicate theme {theme}"),
            Repair::HotkeyCleared { theme } => {
                write!(f, "cleared conflicting hotkey of theme {theme}")
            }
            Repair::DuplicateAnnotation { id } => write!(f, "dropped duplicate annotation {id}"),
            Repair::UnknownPrimaryTheme { id, theme } => {
                write!(f, "dropped annotation {id} with missing theme {theme}")
            }
            Repair::UnknownSecondaryTheme { id, theme } => {
                write!(f, "removed missing secondary theme {theme} from annotation {id}")
            }
            Repair::SecondaryEqualsPrimary { id, theme } => {
                write!(f, "removed primary theme {theme} from secondary themes of annotation {id}")
            }
            Repair::SpansClipped { id } => write!(f, "clipped spans of annotation {id}"),
            Repair::StrikethroughClipped { id } => {
                write!(f, "clipped strikethrough of annotation {id}")
            }
            Repair::EmptyAnnotation { id } => write!(f, "dropped empty annotation {id}"),
            Repair::OrphanStoryboardEntry { id } => {
                write!(f, "dropped storyboard entry of missing annotation {id}")
            }
            Repair::DuplicateStoryboardEntry { id } => {
                write!(f, "dropped duplicate storyboard entry of annotation {id}")
            }
            Repair::DuplicateDivider { id } => write!(f, "dropped duplicate divider d{id}"),
            Repair::OrphanHeader { id } => write!(f, "dropped header of annotation {id}"),
        }
    }
}

/// Result of [`Engine::load_session`].
#[derive(Debug)]
pub struct SessionLoad {
    /// The restored engine.
    pub engine: Engine,
    /// Everything that had to be repaired.
    pub repairs: Vec<Repair>,
}

impl Engine {
    /// Serialize the current state as a pretty-printed session file.
    pub fn save_session(&self) -> EngineResult<String> {
        let file = SessionFile::from_project(&self.project, &self.view_filters);
        let json = serde_json::to_string_pretty(&file)?;
        log::info!(
            "event=session_save module=session status=ok version={} annotations={} bytes={}",
            self.version(),
            file.annotations.len(),
            json.len()
        );
        Ok(json)
    }

    /// Restore an engine from a session file, repairing broken references.
    pub fn load_session(json: &str, config: EngineConfig) -> EngineResult<SessionLoad> {
        let file: SessionFile = serde_json::from_str(json)?;
        let view_filters = file.view_filters.clone();
        let (project, repairs) = file.into_project(&config)?;
        for repair in &repairs {
            log::warn!(
                "event=session_repair module=session status=healed repair=\"{}\"",
                repair
            );
        }
        log::info!(
            "event=session_load module=session status=ok annotations={} themes={} storyboard={} repairs={}",
            project.annotations().len(),
            project.themes().len(),
            project.storyboard().len(),
            repairs.len()
        );
        let mut engine = Engine::from_project(project, config);
        engine.view_filters = view_filters;
        Ok(SessionLoad { engine, repairs })
    }
}

impl ProjectSnapshot {
    /// Serialize the snapshot as a session file (e.g. from a background save thread).
    pub fn to_session_json(&self) -> EngineResult<String> {
        let file = SessionFile::from_project(self.project(), &BTreeMap::new());
        Ok(serde_json::to_string_pretty(&file)?)
    }
}
