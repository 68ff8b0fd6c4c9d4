//! Engine error taxonomy.
//!
//! Every fallible engine operation returns [`EngineResult`]. A failed operation never leaves a
//! partial mutation behind: the store, the span index and the storyboard are either all updated
//! or all untouched.
//!
//! Saving borrows the engine immutably while every mutation (including an open
//! [`Transaction`](crate::Transaction)) borrows it mutably, so a save can only observe a state
//! between two complete operations and no runtime "persistence race" error exists.

use crate::annotation::AnnotationId;
use crate::storyboard::DividerId;
use crate::theme::{Hotkey, ThemeId};
use thiserror::Error;

/// Errors produced by the annotation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The annotation id is unknown (never existed or already deleted).
    #[error("annotation {0} not found")]
    NotFound(AnnotationId),

    /// The theme id is unknown.
    #[error("theme {0} not found")]
    ThemeNotFound(ThemeId),

    /// A theme name is empty after trimming.
    #[error("theme name must not be empty")]
    EmptyName,

    /// No theme matches the given display name.
    #[error("no theme named `{0}`")]
    UnknownThemeName(String),

    /// A span is empty, reversed, or reaches past the end of the document.
    #[error("invalid range {start}..{end} (document length {len})")]
    InvalidRange {
        /// Requested start offset.
        start: usize,
        /// Requested end offset (exclusive).
        end: usize,
        /// Document length in characters.
        len: usize,
    },

    /// The annotation is still placed in the storyboard and the caller did not ask to cascade.
    #[error("annotation {id} is still used in the storyboard at position {position}")]
    ConflictingRemoval {
        /// Annotation that was about to be deleted.
        id: AnnotationId,
        /// Its current entry position in the storyboard.
        position: usize,
    },

    /// The theme table is full.
    #[error("theme table is full ({capacity} themes)")]
    ThemeCapacity {
        /// Configured capacity.
        capacity: usize,
    },

    /// Another theme already uses this name (names compare case-insensitively).
    #[error("a theme named `{0}` already exists")]
    DuplicateThemeName(String),

    /// Another theme already uses this hotkey.
    #[error("hotkey `{hotkey}` is already bound to theme {theme}")]
    HotkeyInUse {
        /// The contested hotkey.
        hotkey: Hotkey,
        /// Theme currently holding it.
        theme: ThemeId,
    },

    /// A theme cannot be both the primary and a secondary theme of one annotation.
    #[error("theme {theme} is already the primary theme")]
    PrimaryAsSecondary {
        /// The offending theme.
        theme: ThemeId,
    },

    /// Two annotations with different primary themes cannot be merged.
    #[error("annotations {first} and {second} have different primary themes")]
    DifferentThemes {
        /// First annotation.
        first: AnnotationId,
        /// Second annotation.
        second: AnnotationId,
    },

    /// The two annotations neither touch nor overlap (or share no boundary).
    #[error("annotations {first} and {second} are not adjacent")]
    NotAdjacent {
        /// First annotation.
        first: AnnotationId,
        /// Second annotation.
        second: AnnotationId,
    },

    /// A storyboard position is out of range.
    #[error("storyboard position {index} is out of range (length {len})")]
    StoryboardIndex {
        /// Requested position.
        index: usize,
        /// Current number of storyboard entries.
        len: usize,
    },

    /// The annotation is not part of the storyboard.
    #[error("annotation {0} is not in the storyboard")]
    NotInStoryboard(AnnotationId),

    /// The annotation is already part of the storyboard.
    #[error("annotation {0} is already in the storyboard")]
    AlreadyInStoryboard(AnnotationId),

    /// The divider id is unknown.
    #[error("storyboard divider {0} not found")]
    DividerNotFound(DividerId),

    /// The undo stack is empty.
    #[error("nothing to undo")]
    NothingToUndo,

    /// The redo stack is empty.
    #[error("nothing to redo")]
    NothingToRedo,

    /// A background worker panicked before producing its result.
    #[error("worker failed: {0}")]
    Worker(String),

    /// A session file is structurally unusable (as opposed to repairable).
    #[error("session error: {0}")]
    Session(String),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
