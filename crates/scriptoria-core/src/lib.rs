#![warn(missing_docs)]
//! Scriptoria Core - Headless Annotation Engine
//!
//! # Overview
//!
//! `scriptoria-core` is the headless kernel of an interview-editing workbench. A long transcript
//! is highlighted with overlapping, themed annotations; a curated subset of them is arranged into
//! a storyboard that becomes the spoken script. The crate owns the data and its invariants and
//! keeps any number of views current. It does not render anything.
//!
//! # Core Features
//!
//! - **Stable Offsets**: the document never changes, so every span is a plain char range
//! - **Overlap Queries**: a sorted span index with prefix maxima, O(log n + k) per query
//! - **Split / Merge / Reassign**: partial removal splits or shrinks annotations; touching
//!   same-theme annotations merge; a shared boundary can be dragged between two annotations
//! - **Storyboard Projection**: an ordered, curated subset with dividers and header labels
//! - **Atomic Mutations**: every request, batch and transaction is all-or-nothing and undoable
//! - **Incremental Views**: change batches proportional to the touched annotations
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Engine (Mutation requests, Transactions)   │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  View Synchronizer + View Models            │  ← Change Notifications
//! ├─────────────────────────────────────────────┤
//! │  Session / Export / Suggest / Stats         │  ← Outer Surfaces
//! ├─────────────────────────────────────────────┤
//! │  Storyboard Projector + Filter Engine       │  ← Projections
//! ├─────────────────────────────────────────────┤
//! │  Annotation Store + Theme Table + History   │  ← Entities
//! ├─────────────────────────────────────────────┤
//! │  Span Index (sorted, prefix max end)        │  ← Overlap Queries
//! ├─────────────────────────────────────────────┤
//! │  Document Buffer (Rope-based)               │  ← Immutable Text
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use scriptoria_core::{Engine, Mutation, MutationOutcome, NewAnnotation, Span};
//!
//! let mut engine = Engine::new("We rebuilt the barn after the storm. It took all summer.");
//!
//! let MutationOutcome::ThemeCreated(theme) = engine
//!     .execute(Mutation::CreateTheme {
//!         name: "Resilience".into(),
//!         color: "#a5d6a7".into(),
//!         hotkey: None,
//!     })
//!     .unwrap()
//! else {
//!     unreachable!()
//! };
//!
//! let MutationOutcome::Created(id) = engine
//!     .execute(Mutation::CreateAnnotation(NewAnnotation::new(Span::new(0, 56), theme)))
//!     .unwrap()
//! else {
//!     unreachable!()
//! };
//!
//! // Removing a middle range splits the highlight in two.
//! let outcome = engine
//!     .execute(Mutation::RemoveRange { id, range: Span::new(20, 40) })
//!     .unwrap();
//! assert!(matches!(outcome, MutationOutcome::Split { .. }));
//! assert_eq!(engine.project().annotations().len(), 2);
//!
//! engine.undo().unwrap();
//! assert_eq!(engine.project().annotations().len(), 1);
//! ```
//!
//! ## Observing Changes
//!
//! ```rust
//! use scriptoria_core::{Engine, ThemeBrowserModel};
//! use std::sync::{Arc, Mutex};
//!
//! let mut engine = Engine::new("text");
//! let browser = Arc::new(Mutex::new(ThemeBrowserModel::new()));
//! let view = engine.register_view("browser", browser.clone());
//! engine.activate_view(view);
//!
//! engine.subscribe(|batch| {
//!     println!("v{} -> v{}: {} events", batch.old_version, batch.new_version, batch.events.len());
//! });
//! ```
//!
//! # Module Description
//!
//! - [`span`] - Half-open char ranges and span-set algebra
//! - [`document`] - Immutable base text and structural markers
//! - [`span_index`] - Overlap index over annotation spans
//! - [`theme`] - Theme table, hotkeys, fuzzy name matching
//! - [`annotation`] - Annotations and their store
//! - [`storyboard`] - Ordered storyboard entries, dividers and headers
//! - [`filter`] - Predicates and per-view filter state
//! - [`history`] - Invertible ops and the undo/redo stacks
//! - [`engine`] - Mutation requests and the Split/Merge/Reassign engine
//! - [`sync`] - Change batches and view subscriptions
//! - [`views`] - Headless view models
//! - [`snapshot`] - Versioned read-only project copies
//! - [`session`] - JSON persistence with self-healing load
//! - [`export`] - HTML, JSON and script exports
//! - [`suggest`] - Writing-assistant response parsing and application
//! - [`stats`] - Word counts and duration estimates
//! - [`config`] - Engine tunables
//! - [`error`] - Error type

pub mod annotation;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod history;
pub mod session;
pub mod snapshot;
pub mod span;
pub mod span_index;
pub mod stats;
pub mod storyboard;
pub mod suggest;
pub mod sync;
pub mod theme;
pub mod views;

pub use annotation::{Annotation, AnnotationId, AnnotationMeta, AnnotationStore, normalize_tag};
pub use config::EngineConfig;
pub use document::{Document, MarkerKind, StructuralMarker};
pub use engine::{
    Engine, IntegrityIssue, Mutation, MutationOutcome, NewAnnotation, Project, RemovalPolicy,
    ThemeRemoval, Transaction,
};
pub use error::{EngineError, EngineResult};
pub use export::{ExportDocument, HtmlOptions, export_json, render_html, render_script};
pub use filter::{FilterContext, FilterState, Predicate, TitleMatch, UsedFilter, apply_filter};
pub use history::{ChangeSet, History, Op};
pub use session::{Repair, SESSION_FORMAT_VERSION, SessionFile, SessionLoad};
pub use snapshot::ProjectSnapshot;
pub use span::Span;
pub use span_index::{IndexEntry, SpanIndex};
pub use stats::{StatsJob, StatsReport, StoryboardStats, estimate_duration, format_duration, spawn_stats};
pub use storyboard::{Divider, DividerId, Storyboard, StoryboardEntry};
pub use suggest::{
    NotesOutcome, NotesSuggestion, PlanItem, PlanOutcome, RawSuggestion, Reference, RejectReason,
    Resolution, StoryboardPlan, Suggestion, SuggestionReport, format_annotation_context,
    parse_annotation_response, parse_notes_response, parse_storyboard_response,
    resolve_references, resolve_suggestions,
};
pub use sync::{ChangeBatch, MutationEvent, SyncHub, UpdateDelta, ViewId, ViewSubscriber};
pub use theme::{Hotkey, Theme, ThemeId, ThemeTable};
pub use views::{
    BrowserRow, DocumentHighlightModel, Highlight, StoryboardRow, StoryboardViewModel,
    ThemeBrowserModel,
};
