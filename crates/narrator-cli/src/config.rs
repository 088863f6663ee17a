//! Settings file loading.

use std::path::Path;

use anyhow::{Context, Result};
use narrator_core::{NarratorSettings, validate_settings};
use tracing::{debug, info};

/// Load and validate settings.
///
/// Without a path the built-in defaults are used. A relative avatar
/// directory is resolved against the settings file's directory.
pub fn load_settings(path: Option<&Path>) -> Result<NarratorSettings> {
    let Some(path) = path else {
        debug!("No settings file given, using defaults");
        return Ok(NarratorSettings::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let mut settings: NarratorSettings = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
    validate_settings(&settings)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;

    if settings.avatar.directory.is_relative() {
        if let Some(base) = path.parent() {
            settings.avatar.directory = base.join(&settings.avatar.directory);
        }
    }

    info!(path = %path.display(), model = %settings.ai.model, "Loaded settings");
    Ok(settings)
}
