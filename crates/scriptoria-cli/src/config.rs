//! TOML configuration file.

use anyhow::{Context, Result};
use scriptoria_core::EngineConfig;
use std::fs;
use std::path::Path;

/// Read an engine configuration. Missing keys keep their defaults; no file means all defaults.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("invalid config {}", path.display()))?;
    log::info!(
        "event=config_load module=cli status=ok history_limit={} theme_capacity={} words_per_minute={}",
        config.history_limit,
        config.theme_capacity,
        config.words_per_minute
    );
    Ok(config)
}

fn parse(text: &str) -> Result<EngineConfig> {
    Ok(toml::from_str(text)?)
}
