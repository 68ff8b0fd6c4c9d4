//! Engine configuration.

use crate::theme::DEFAULT_THEME_CAPACITY;
use serde::{Deserialize, Serialize};

/// Tunables of an [`Engine`](crate::Engine). Every field has a default, so a partial TOML or JSON
/// document deserializes into a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of undo steps kept.
    pub history_limit: usize,
    /// Maximum number of themes in a project.
    pub theme_capacity: usize,
    /// Speaking rate used for duration estimates.
    pub words_per_minute: u32,
    /// Separator placed between notes when two annotations are merged.
    pub note_separator: String,
    /// Truncation length for annotation text sent to the assistant.
    pub max_context_chars: usize,
    /// Minimum word-overlap score for fuzzy theme-name matching.
    pub theme_match_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: 1000,
            theme_capacity: DEFAULT_THEME_CAPACITY,
            words_per_minute: 200,
            note_separator: "\n\n".to_string(),
            max_context_chars: 200,
            theme_match_threshold: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{ "words_per_minute": 150 }"#).unwrap();
        assert_eq!(config.words_per_minute, 150);
        assert_eq!(config.history_limit, 1000);
        assert_eq!(config.theme_capacity, 12);
        assert_eq!(config.note_separator, "\n\n");
    }
}
