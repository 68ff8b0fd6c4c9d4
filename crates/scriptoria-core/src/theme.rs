//! Themes: user-defined categories with a display color and an optional hotkey.
//!
//! Annotations reference themes by [`ThemeId`], never by name, so renaming a theme is reflected by
//! every annotation that carries it (as primary or secondary theme) without touching them.
//! Deleting a theme is a cascading engine operation, see
//! [`ThemeRemoval`](crate::ThemeRemoval).

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default maximum number of themes in a project.
pub const DEFAULT_THEME_CAPACITY: usize = 12;

/// Stable theme identifier (never reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeId(pub(crate) u32);

impl ThemeId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ThemeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The fixed hotkey symbol set, one key per theme slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hotkey {
    /// `1`
    #[serde(rename = "1")]
    Key1,
    /// `2`
    #[serde(rename = "2")]
    Key2,
    /// `3`
    #[serde(rename = "3")]
    Key3,
    /// `4`
    #[serde(rename = "4")]
    Key4,
    /// `5`
    #[serde(rename = "5")]
    Key5,
    /// `6`
    #[serde(rename = "6")]
    Key6,
    /// `7`
    #[serde(rename = "7")]
    Key7,
    /// `8`
    #[serde(rename = "8")]
    Key8,
    /// `9`
    #[serde(rename = "9")]
    Key9,
    /// `0`
    #[serde(rename = "0")]
    Key0,
    /// `-`
    #[serde(rename = "-")]
    Minus,
    /// `=`
    #[serde(rename = "=")]
    Equals,
}

impl Hotkey {
    /// All hotkeys in slot order.
    pub const ALL: [Hotkey; 12] = [
        Hotkey::Key1,
        Hotkey::Key2,
        Hotkey::Key3,
        Hotkey::Key4,
        Hotkey::Key5,
        Hotkey::Key6,
        Hotkey::Key7,
        Hotkey::Key8,
        Hotkey::Key9,
        Hotkey::Key0,
        Hotkey::Minus,
        Hotkey::Equals,
    ];

    /// The key symbol.
    pub fn as_char(self) -> char {
        match self {
            Hotkey::Key1 => '1',
            Hotkey::Key2 => '2',
            Hotkey::Key3 => '3',
            Hotkey::Key4 => '4',
            Hotkey::Key5 => '5',
            Hotkey::Key6 => '6',
            Hotkey::Key7 => '7',
            Hotkey::Key8 => '8',
            Hotkey::Key9 => '9',
            Hotkey::Key0 => '0',
            Hotkey::Minus => '-',
            Hotkey::Equals => '=',
        }
    }

    /// Parse a key symbol.
    pub fn from_char(c: char) -> Option<Hotkey> {
        Hotkey::ALL.into_iter().find(|h| h.as_char() == c)
    }
}

impl std::fmt::Display for Hotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A user-defined category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Stable id.
    pub id: ThemeId,
    /// Display name (unique, case-insensitive).
    pub name: String,
    /// Display color, e.g. `#ffd54f`.
    pub color: String,
    /// Optional hotkey (unique).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<Hotkey>,
}

/// The project's theme set, kept in creation order.
#[derive(Debug, Clone)]
pub struct ThemeTable {
    themes: Vec<Theme>,
    next_id: u32,
    capacity: usize,
}

impl ThemeTable {
    /// Create an empty table with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            themes: Vec::new(),
            next_id: 0,
            capacity,
        }
    }

    /// Look up a theme.
    pub fn get(&self, id: ThemeId) -> Option<&Theme> {
        self.themes.iter().find(|t| t.id == id)
    }

    /// Look up a theme or fail with [`EngineError::ThemeNotFound`].
    pub fn require(&self, id: ThemeId) -> EngineResult<&Theme> {
        self.get(id).ok_or(EngineError::ThemeNotFound(id))
    }

    /// Check if the theme exists.
    pub fn contains(&self, id: ThemeId) -> bool {
        self.get(id).is_some()
    }

    /// Case-insensitive exact name lookup.
    pub fn by_name(&self, name: &str) -> Option<&Theme> {
        let name = name.trim().to_lowercase();
        self.themes.iter().find(|t| t.name.trim().to_lowercase() == name)
    }

    /// Theme bound to a hotkey.
    pub fn by_hotkey(&self, hotkey: Hotkey) -> Option<&Theme> {
        self.themes.iter().find(|t| t.hotkey == Some(hotkey))
    }

    /// Resolve a loosely spelled theme name.
    ///
    /// Exact (case-insensitive) matches win, then substring containment in either direction,
    /// then the best word-set Jaccard similarity strictly above `threshold`.
    pub fn best_match(&self, name: &str, threshold: f64) -> Option<&Theme> {
        if let Some(exact) = self.by_name(name) {
            return Some(exact);
        }

        let target = name.trim().to_lowercase();
        if target.is_empty() {
            return None;
        }

        if let Some(theme) = self.themes.iter().find(|t| {
            let candidate = t.name.to_lowercase();
            candidate.contains(&target) || target.contains(&candidate)
        }) {
            return Some(theme);
        }

        let target_words: BTreeSet<&str> = target.split_whitespace().collect();
        let mut best: Option<(&Theme, f64)> = None;
        for theme in &self.themes {
            let candidate = theme.name.to_lowercase();
            let words: BTreeSet<&str> = candidate.split_whitespace().collect();
            let union = target_words.union(&words).count();
            if union == 0 {
                continue;
            }
            let score = target_words.intersection(&words).count() as f64 / union as f64;
            if score > threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((theme, score));
            }
        }
        best.map(|(theme, _)| theme)
    }

    /// Iterate in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Theme> {
        self.themes.iter()
    }

    /// Number of themes.
    pub fn len(&self) -> usize {
        self.themes.len()
    }

    /// `true` when no theme is defined.
    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    /// Maximum number of themes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The id the next created theme will receive.
    pub fn next_id(&self) -> ThemeId {
        ThemeId(self.next_id)
    }

    /// Validate a name/hotkey pair for a new theme (`except == None`) or for an existing one.
    pub(crate) fn check(
        &self,
        name: &str,
        hotkey: Option<Hotkey>,
        except: Option<ThemeId>,
    ) -> EngineResult<()> {
        if let Some(existing) = self.by_name(name)
            && Some(existing.id) != except
        {
            return Err(EngineError::DuplicateThemeName(name.trim().to_string()));
        }
        if let Some(hotkey) = hotkey
            && let Some(holder) = self.by_hotkey(hotkey)
            && Some(holder.id) != except
        {
            return Err(EngineError::HotkeyInUse {
                hotkey,
                theme: holder.id,
            });
        }
        Ok(())
    }

    pub(crate) fn allocate_id(&mut self) -> EngineResult<ThemeId> {
        if self.themes.len() >= self.capacity {
            return Err(EngineError::ThemeCapacity {
                capacity: self.capacity,
            });
        }
        let id = ThemeId(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    pub(crate) fn set_next_id(&mut self, next: u32) {
        self.next_id = self.next_id.max(next);
    }

    /// Insert keeping id (creation) order.
    pub(crate) fn insert(&mut self, theme: Theme) {
        self.next_id = self.next_id.max(theme.id.0 + 1);
        let pos = self.themes.partition_point(|t| t.id < theme.id);
        self.themes.insert(pos, theme);
    }

    pub(crate) fn remove(&mut self, id: ThemeId) -> Option<Theme> {
        let pos = self.themes.iter().position(|t| t.id == id)?;
        Some(self.themes.remove(pos))
    }

    pub(crate) fn replace(&mut self, theme: Theme) {
        if let Some(slot) = self.themes.iter_mut().find(|t| t.id == theme.id) {
            *slot = theme;
        }
    }
}

impl Default for ThemeTable {
    fn default() -> Self {
        Self::new(DEFAULT_THEME_CAPACITY)
    }
}
