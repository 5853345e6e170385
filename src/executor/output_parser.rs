use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::engine::{UnitResult, UnitRunStatus};

static PLAN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Plan: (\d+) to add, (\d+) to change, (\d+) to destroy")
        .expect("valid plan summary regex")
});

static RESOURCE_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"# (\S+) will be (created|destroyed|updated)").expect("valid resource regex")
});

static UNIT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Executing unit:|Running in)\s+(\S+)").expect("valid unit marker regex")
});

/// A single line of terraform JSON output, as passed through by terragrunt.
#[derive(Debug, Deserialize)]
pub struct TerraformJsonLine {
    #[serde(rename = "@level")]
    pub level: Option<String>,
    #[serde(rename = "@message")]
    pub message: Option<String>,
    pub diagnostic: Option<TerraformDiagnostic>,
}

#[derive(Debug, Deserialize)]
pub struct TerraformDiagnostic {
    pub severity: Option<String>,
    pub summary: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    pub address: String,
    pub action: String,
}

/// Summary of changes from a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub to_add: usize,
    pub to_change: usize,
    pub to_destroy: usize,
    pub resources: Vec<ResourceChange>,
}

impl PlanSummary {
    pub fn has_changes(&self) -> bool {
        self.to_add + self.to_change + self.to_destroy > 0
    }
}

/// Parse the human-readable plan output.
pub fn parse_plan_output(output: &str) -> PlanSummary {
    let mut summary = PlanSummary::default();

    if let Some(caps) = PLAN_LINE.captures(output) {
        let count = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };
        summary.to_add = count(1);
        summary.to_change = count(2);
        summary.to_destroy = count(3);
    }

    for caps in RESOURCE_CHANGE.captures_iter(output) {
        if let (Some(addr), Some(action)) = (caps.get(1), caps.get(2)) {
            summary.resources.push(ResourceChange {
                address: addr.as_str().to_string(),
                action: action.as_str().to_string(),
            });
        }
    }

    summary
}

/// Error summaries from JSON diagnostics, falling back to `Error:` lines.
pub fn extract_errors(lines: &[String]) -> Vec<String> {
    let mut errors = Vec::new();

    for line in lines {
        if let Ok(parsed) = serde_json::from_str::<TerraformJsonLine>(line) {
            if let Some(diag) = &parsed.diagnostic {
                if diag.severity.as_deref() == Some("error") {
                    let msg = diag
                        .summary
                        .as_deref()
                        .unwrap_or("Unknown error")
                        .to_string();
                    errors.push(msg);
                }
            }
            continue;
        }
        if is_error_line(line) {
            errors.push(line.trim().to_string());
        }
    }

    errors
}

fn is_error_line(line: &str) -> bool {
    line.contains("Error:") || line.contains("Failed:")
}

/// Split `terragrunt stack run` output into per-unit results.
///
/// A unit starts at an `Executing unit: <path>` or `Running in <path>` line
/// and owns every following non-empty line until the next marker. Lines
/// containing `Error:` or `Failed:` mark the unit failed. Text before the
/// first marker is not attributed to any unit.
pub fn parse_stack_output(stdout: &str, stderr: &str) -> BTreeMap<String, UnitResult> {
    let mut results: BTreeMap<String, UnitResult> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in stdout.lines().chain(stderr.lines()) {
        if let Some(caps) = UNIT_MARKER.captures(line) {
            if let Some(unit) = caps.get(1) {
                let unit = unit.as_str().to_string();
                results.insert(unit.clone(), UnitResult::new(UnitRunStatus::Running));
                current = Some(unit);
                continue;
            }
        }

        let Some(unit) = current.as_ref() else {
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(result) = results.get_mut(unit) {
            if is_error_line(line) {
                result.errors.push(trimmed.to_string());
                result.status = UnitRunStatus::Failed;
            } else {
                result.output.push(trimmed.to_string());
            }
        }
    }

    for result in results.values_mut() {
        if result.status == UnitRunStatus::Running {
            result.status = UnitRunStatus::Completed;
        }
    }

    results
}

/// Parse `output -json`, falling back to `key = value` lines.
pub fn parse_outputs(stdout: &str) -> BTreeMap<String, serde_json::Value> {
    if let Ok(parsed) = serde_json::from_str::<BTreeMap<String, serde_json::Value>>(stdout) {
        return parsed;
    }

    stdout
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            let value = v.trim().trim_matches('"');
            (k.trim().to_string(), serde_json::Value::String(value.to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_summary_from_text() {
        let out = "\
  # google_compute_instance.web will be created
  # google_sql_database.db will be destroyed

Plan: 1 to add, 0 to change, 1 to destroy.";
        let summary = parse_plan_output(out);
        assert_eq!(summary.to_add, 1);
        assert_eq!(summary.to_destroy, 1);
        assert!(summary.has_changes());
        assert_eq!(summary.resources.len(), 2);
        assert_eq!(summary.resources[0].address, "google_compute_instance.web");
        assert_eq!(summary.resources[1].action, "destroyed");
    }

    #[test]
    fn no_changes_plan() {
        let summary = parse_plan_output("No changes. Your infrastructure matches the configuration.");
        assert!(!summary.has_changes());
        assert!(summary.resources.is_empty());
    }

    #[test]
    fn errors_from_json_and_text() {
        let lines = vec![
            r#"{"@level":"error","diagnostic":{"severity":"error","summary":"Invalid reference"}}"#
                .to_string(),
            "Error: missing required argument".to_string(),
            "all good".to_string(),
        ];
        assert_eq!(
            extract_errors(&lines),
            vec!["Invalid reference", "Error: missing required argument"]
        );
    }

    #[test]
    fn outputs_fall_back_to_key_value() {
        let outputs = parse_outputs("vpc_id = \"vpc-123\"\nregion = europe-west2\n");
        assert_eq!(outputs["vpc_id"], serde_json::json!("vpc-123"));
        assert_eq!(outputs["region"], serde_json::json!("europe-west2"));

        let json = parse_outputs(r#"{"vpc_id": {"value": "vpc-1"}}"#);
        assert_eq!(json["vpc_id"]["value"], serde_json::json!("vpc-1"));
    }
}
