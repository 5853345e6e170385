use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static DEPENDENCY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"dependency\s+"([^"]+)"\s*\{[^}]*config_path\s*=\s*"([^"]+)""#)
        .expect("valid dependency regex")
});

static DEPENDENCIES_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"dependencies\s*\{[^}]*paths\s*=\s*\[([^\]]*)\]"#)
        .expect("valid dependencies regex")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quoted-string regex"));

static SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"source\s*=\s*"([^"]+)""#).expect("valid source regex"));

static LOCALS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"locals\s*\{([^}]+)\}").expect("valid locals regex"));

static INCLUDE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*include(\s+"[^"]*")?\s*\{"#).expect("valid include regex")
});

/// Dependency paths declared in a definition file, in order of appearance.
///
/// `unit_path` is the unit's directory relative to the scan root. Paths that
/// start with `../` are resolved against it; everything else is kept as
/// written. Text that does not match yields nothing.
pub fn extract_dependencies(contents: &str, unit_path: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for caps in DEPENDENCY_BLOCK.captures_iter(contents) {
        if let (Some(whole), Some(path)) = (caps.get(0), caps.get(2)) {
            found.push((whole.start(), path.as_str().to_string()));
        }
    }

    for caps in DEPENDENCIES_BLOCK.captures_iter(contents) {
        let Some(list) = caps.get(1) else { continue };
        for item in QUOTED.captures_iter(list.as_str()) {
            if let Some(path) = item.get(1) {
                found.push((list.start() + path.start(), path.as_str().to_string()));
            }
        }
    }

    found.sort_by_key(|(offset, _)| *offset);
    found
        .into_iter()
        .map(|(_, path)| normalize_reference(&path, unit_path))
        .collect()
}

/// Resolve a `../` reference against the unit directory.
pub fn normalize_reference(reference: &str, unit_path: &str) -> String {
    if !reference.starts_with("../") {
        return reference.to_string();
    }
    let joined = format!("{}/{}", unit_path.trim_end_matches('/'), reference);
    normalize_lexically(&joined)
}

/// Collapse `.` and `..` segments without touching the filesystem. Leading
/// `..` that would climb above the root are kept.
fn normalize_lexically(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            s => out.push(s),
        }
    }
    out.join("/")
}

pub fn extract_source(contents: &str) -> Option<String> {
    SOURCE
        .captures(contents)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Flat `key = value` pairs from the first `locals { }` block. Nested maps
/// are not followed. Surrounding quotes and a trailing comma are stripped.
pub fn extract_locals(contents: &str) -> BTreeMap<String, String> {
    let mut locals = BTreeMap::new();
    let Some(body) = LOCALS_BLOCK.captures(contents).and_then(|c| c.get(1)) else {
        return locals;
    };

    for line in body.as_str().lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                continue;
            }
            let value = value.trim().trim_end_matches(',').trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            locals.insert(key.to_string(), value.to_string());
        }
    }
    locals
}

/// Cheap structural checks on a definition file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl StructureReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn check_structure(contents: &str) -> StructureReport {
    let mut report = StructureReport::default();

    let opening = contents.matches('{').count();
    let closing = contents.matches('}').count();
    if opening != closing {
        report.errors.push(format!(
            "Unbalanced braces: {opening} opening, {closing} closing"
        ));
    }

    if !INCLUDE_BLOCK.is_match(contents) {
        report
            .warnings
            .push("No include block found, configuration may not inherit root settings".to_string());
    }

    report
}

/// Everything read from one definition file.
#[derive(Debug, Clone, Default)]
pub struct Definition {
    pub content: String,
    pub dependencies: Vec<String>,
    pub source: Option<String>,
    pub locals: BTreeMap<String, String>,
}

impl Definition {
    pub fn from_contents(contents: String, unit_path: &str) -> Self {
        Self {
            dependencies: extract_dependencies(&contents, unit_path),
            source: extract_source(&contents),
            locals: extract_locals(&contents),
            content: contents,
        }
    }
}
