use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name of the file that marks a directory as a unit.
pub const UNIT_FILE: &str = "terragrunt.hcl";

/// Name of the file that marks a directory as a stack.
pub const STACK_FILE: &str = "stack.hcl";

/// Terragrunt's working directory; never part of discovery.
pub const CACHE_DIR: &str = ".terragrunt-cache";

/// Substrings that mark an environment as production.
const PRODUCTION_MARKERS: &[&str] = &["prod", "live"];

// ─── Classification ─────────────────────────────────────────────────────────

/// Known resource types, taken from the resource-type path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ResourceType {
    Folder,
    Project,
    VpcNetwork,
    PrivateServiceAccess,
    Compute,
    Sqlserver,
    Bigquery,
    Secrets,
}

impl ResourceType {
    pub const ALL: &'static [ResourceType] = &[
        ResourceType::Folder,
        ResourceType::Project,
        ResourceType::VpcNetwork,
        ResourceType::PrivateServiceAccess,
        ResourceType::Compute,
        ResourceType::Sqlserver,
        ResourceType::Bigquery,
        ResourceType::Secrets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Folder => "folder",
            ResourceType::Project => "project",
            ResourceType::VpcNetwork => "vpc-network",
            ResourceType::PrivateServiceAccess => "private-service-access",
            ResourceType::Compute => "compute",
            ResourceType::Sqlserver => "sqlserver",
            ResourceType::Bigquery => "bigquery",
            ResourceType::Secrets => "secrets",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a path segment does not name a known resource type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown resource type '{0}'")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentType {
    Production,
    NonProduction,
}

impl EnvironmentType {
    pub fn from_environment(environment: &str) -> Self {
        let lowered = environment.to_lowercase();
        if PRODUCTION_MARKERS.iter().any(|m| lowered.contains(m)) {
            EnvironmentType::Production
        } else {
            EnvironmentType::NonProduction
        }
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentType::Production => f.write_str("production"),
            EnvironmentType::NonProduction => f.write_str("non-production"),
        }
    }
}

// ─── Status ─────────────────────────────────────────────────────────────────

/// Deployment status of a single unit, derived by probing terragrunt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitStatus {
    #[default]
    Unknown,
    NotDeployed,
    Deployed,
    Outdated,
    Failed,
    DriftDetected,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitStatus::Unknown => "unknown",
            UnitStatus::NotDeployed => "not-deployed",
            UnitStatus::Deployed => "deployed",
            UnitStatus::Outdated => "outdated",
            UnitStatus::Failed => "failed",
            UnitStatus::DriftDetected => "drift-detected",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a stack or of an execution against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackStatus {
    #[default]
    Unknown,
    Ready,
    Planning,
    Applying,
    Deployed,
    Failed,
    Destroying,
}

impl StackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StackStatus::Deployed | StackStatus::Failed)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StackStatus::Unknown => "unknown",
            StackStatus::Ready => "ready",
            StackStatus::Planning => "planning",
            StackStatus::Applying => "applying",
            StackStatus::Deployed => "deployed",
            StackStatus::Failed => "failed",
            StackStatus::Destroying => "destroying",
        };
        f.write_str(s)
    }
}

// ─── Unit ───────────────────────────────────────────────────────────────────

/// What was read out of a unit's `terragrunt.hcl`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitConfiguration {
    /// Raw file contents.
    #[serde(skip_serializing)]
    pub content: String,
    pub source: Option<String>,
    pub locals: BTreeMap<String, String>,
}

/// A single deployable configuration leaf.
#[derive(Debug, Clone, Serialize)]
pub struct Unit {
    pub path: String,
    pub name: String,
    pub resource_type: ResourceType,
    pub account: String,
    pub environment: String,
    pub environment_type: EnvironmentType,
    pub project: String,
    pub region: Option<String>,
    /// Root-relative paths this unit depends on, in declaration order.
    pub dependencies: Vec<String>,
    pub status: UnitStatus,
    pub last_modified: Option<DateTime<Utc>>,
    pub configuration: UnitConfiguration,
}

impl Unit {
    /// Dependencies with duplicates and self references removed, order kept.
    pub fn unique_dependencies(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.dependencies
            .iter()
            .map(|d| d.as_str())
            .filter(|d| *d != self.path && seen.insert(*d))
            .collect()
    }
}

// ─── Stack ──────────────────────────────────────────────────────────────────

/// A directory with a `stack.hcl` and the units below it.
#[derive(Debug, Clone, Serialize)]
pub struct Stack {
    pub name: String,
    pub path: String,
    pub units: Vec<Unit>,
    pub dependencies: Vec<String>,
    pub status: StackStatus,
    pub configuration: BTreeMap<String, String>,
    pub execution_order: Vec<Vec<String>>,
    pub created_at: Option<DateTime<Utc>>,
    pub warnings: Vec<String>,
}

// ─── Summary ────────────────────────────────────────────────────────────────

/// Aggregate status over one discovery pass.
#[derive(Debug, Clone, Serialize)]
pub struct InfrastructureStatus {
    pub environment: Option<String>,
    pub total_units: usize,
    pub deployed: usize,
    pub not_deployed: usize,
    pub failed: usize,
    pub outdated: usize,
    pub drift_detected: usize,
    pub unknown: usize,
    pub health_score: f64,
    pub total_stacks: usize,
    pub deployed_stacks: usize,
    pub failed_stacks: usize,
    pub checked_at: DateTime<Utc>,
}

/// Score 0..=100: deployment rate minus penalties for failures and drift.
pub fn health_score(total: usize, deployed: usize, failed: usize, drift: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let total = total as f64;
    let deployment = deployed as f64 / total * 100.0;
    let failure_penalty = failed as f64 / total * 50.0;
    let drift_penalty = drift as f64 / total * 25.0;
    (deployment - failure_penalty - drift_penalty).clamp(0.0, 100.0)
}
