use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::Settings;

/// Locations searched, in order, when no config file is given.
const DEFAULT_LOCATIONS: &[&str] = &["config/config.yaml", "config.yaml"];

/// Load settings from an explicit file, or from the first default location
/// that exists. Falls back to built-in defaults when nothing is found.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(p) = path {
        if !p.is_file() {
            bail!("Config not found: '{}'", p.display());
        }
        return load_file(p);
    }

    for candidate in default_candidates() {
        if candidate.is_file() {
            tracing::info!(path = %candidate.display(), "Using config file");
            return load_file(&candidate);
        }
    }

    tracing::debug!("No config file found, using defaults");
    Ok(Settings::default())
}

/// Parse YAML content into Settings.
pub fn parse_settings(content: &str) -> Result<Settings> {
    // An empty file is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings =
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
    Ok(settings)
}

fn load_file(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut settings = parse_settings(&content)
        .with_context(|| format!("Failed to load config: {}", path.display()))?;

    // A relative root_path is relative to the config file, not the cwd.
    if settings.terragrunt.root_path.is_relative() {
        if let Some(parent) = path.parent() {
            settings.terragrunt.root_path = parent.join(&settings.terragrunt.root_path);
        }
    }

    Ok(settings)
}

fn default_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = DEFAULT_LOCATIONS.iter().map(PathBuf::from).collect();
    let home = shellexpand::tilde("~/.stackwise/config.yaml").into_owned();
    candidates.push(PathBuf::from(home));
    candidates
}
