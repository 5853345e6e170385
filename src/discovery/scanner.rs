use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::models::{
    EnvironmentType, ResourceType, Unit, UnitConfiguration, UnitStatus, CACHE_DIR, STACK_FILE,
    UNIT_FILE,
};
use super::path::parse_path;
use crate::error::DiscoveryError;
use crate::hcl::{self, Definition};

/// A directory holding a `stack.hcl`, before its members are attached.
#[derive(Debug, Clone)]
pub struct StackCandidate {
    /// Root-relative path of the stack directory.
    pub path: String,
    pub definition: Definition,
    pub created_at: Option<DateTime<Utc>>,
}

/// Find every unit below `root`, sorted by path.
pub fn scan_units(root: &Path, env_filter: Option<&str>) -> Result<Vec<Unit>, DiscoveryError> {
    ensure_dir(root)?;
    let dirs = definition_dirs(root, root, UNIT_FILE)?;
    Ok(collect_units(root, dirs, env_filter, None))
}

/// Find units below `root/subdir`. Paths stay relative to `root`. With
/// `skip_self` the subdirectory itself is not reported even when it holds a
/// definition file.
pub fn scan_units_under(
    root: &Path,
    subdir: &str,
    env_filter: Option<&str>,
    skip_self: bool,
) -> Result<Vec<Unit>, DiscoveryError> {
    ensure_dir(root)?;
    let start = root.join(subdir);
    ensure_dir(&start)?;
    let dirs = definition_dirs(root, &start, UNIT_FILE)?;
    let excluded = skip_self.then(|| normalize_rel(subdir));
    Ok(collect_units(root, dirs, env_filter, excluded.as_deref()))
}

/// Find every directory holding a `stack.hcl`, sorted by path. The filter is
/// matched against the environment segment of the stack's own path.
pub fn scan_stacks(
    root: &Path,
    env_filter: Option<&str>,
) -> Result<Vec<StackCandidate>, DiscoveryError> {
    ensure_dir(root)?;
    let mut stacks = Vec::new();

    for dir in definition_dirs(root, root, STACK_FILE)? {
        let rel = relative_path(root, &dir);
        if let Some(env) = env_filter {
            if parse_path(&rel).environment.as_deref() != Some(env) {
                continue;
            }
        }
        stacks.push(read_stack(root, &rel)?);
    }

    stacks.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(stacks)
}

/// Read the `stack.hcl` of a single stack directory.
pub fn read_stack(root: &Path, stack_path: &str) -> Result<StackCandidate, DiscoveryError> {
    let rel = normalize_rel(stack_path);
    let file = root.join(&rel).join(STACK_FILE);
    if !file.is_file() {
        return Err(DiscoveryError::StackNotFound(rel));
    }

    let definition = match hcl::read_definition(&file, &rel) {
        Ok(def) => def,
        Err(e) => {
            tracing::warn!(stack = %rel, error = %e, "Failed to read stack definition");
            Definition::default()
        }
    };

    let created_at = std::fs::metadata(&file)
        .ok()
        .and_then(|m| m.created().or_else(|_| m.modified()).ok())
        .map(DateTime::<Utc>::from);

    Ok(StackCandidate {
        path: rel,
        definition,
        created_at,
    })
}

/// Classify a unit directory and read its definition file.
///
/// Returns `None` when the path cannot be classified, the resource type is
/// not known, or the environment does not match the filter. The filter is
/// applied before anything is read from disk.
pub fn build_unit(root: &Path, rel: &str, env_filter: Option<&str>) -> Option<Unit> {
    let parts = parse_path(rel);

    let Some(type_segment) = parts.resource_type.as_deref() else {
        tracing::debug!(unit = %rel, "Skipping unclassifiable path");
        return None;
    };

    let environment = parts.environment.clone().unwrap_or_default();
    if let Some(env) = env_filter {
        if environment != env {
            return None;
        }
    }

    let resource_type: ResourceType = match type_segment.parse() {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(unit = %rel, error = %e, "Skipping unit");
            return None;
        }
    };

    let file = root.join(rel).join(UNIT_FILE);
    let definition = match hcl::read_definition(&file, rel) {
        Ok(def) => def,
        Err(e) => {
            tracing::warn!(unit = %rel, error = %e, "Failed to read definition, assuming no dependencies");
            Definition::default()
        }
    };

    let last_modified = std::fs::metadata(&file)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    Some(Unit {
        path: rel.to_string(),
        name: parts
            .resource_name
            .clone()
            .unwrap_or_else(|| resource_type.to_string()),
        resource_type,
        account: parts.account.unwrap_or_default(),
        environment_type: EnvironmentType::from_environment(&environment),
        environment,
        project: parts.project.unwrap_or_default(),
        region: parts.region,
        dependencies: definition.dependencies,
        status: UnitStatus::Unknown,
        last_modified,
        configuration: UnitConfiguration {
            content: definition.content,
            source: definition.source,
            locals: definition.locals,
        },
    })
}

fn collect_units(
    root: &Path,
    dirs: Vec<PathBuf>,
    env_filter: Option<&str>,
    excluded: Option<&str>,
) -> Vec<Unit> {
    let mut units: Vec<Unit> = dirs
        .iter()
        .map(|dir| relative_path(root, dir))
        .filter(|rel| Some(rel.as_str()) != excluded)
        .filter_map(|rel| build_unit(root, &rel, env_filter))
        .collect();
    units.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(count = units.len(), root = %root.display(), "Scanned units");
    units
}

/// Directories below `start` that directly contain `file_name`. Cache
/// directories are pruned and never descended into.
fn definition_dirs(
    root: &Path,
    start: &Path,
    file_name: &str,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut dirs = Vec::new();

    let walker = WalkDir::new(start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_cache_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(DiscoveryError::Walk {
                    path: start.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() && entry.file_name() == file_name {
            if let Some(parent) = entry.path().parent() {
                dirs.push(parent.to_path_buf());
            }
        }
    }

    Ok(dirs)
}

fn is_cache_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == CACHE_DIR
}

fn ensure_dir(path: &Path) -> Result<(), DiscoveryError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(DiscoveryError::RootNotFound(path.to_path_buf()))
    }
}

/// `/`-separated path of `dir` relative to `root`.
fn relative_path(root: &Path, dir: &Path) -> String {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_rel(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}
