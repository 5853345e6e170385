use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─── Top-Level Settings ─────────────────────────────────────────────────────

/// Root configuration, loaded from `config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub terragrunt: TerragruntSettings,
    #[serde(default)]
    pub stacks: StackSettings,
    #[serde(default)]
    pub gcp: GcpSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// How the planner reacts to a dependency cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Emit every unit left in the cycle as one final batch and warn.
    #[default]
    Lenient,
    /// Refuse to plan.
    Strict,
}

/// How `execute_command` drives terragrunt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// One `terragrunt run` per unit, batch by batch.
    #[default]
    Batched,
    /// A single `terragrunt stack run` in the target directory.
    StackRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerragruntSettings {
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub backend_bootstrap: bool,
    #[serde(default = "default_true")]
    pub non_interactive: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
}

impl Default for TerragruntSettings {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            binary_path: default_binary_path(),
            parallelism: default_parallelism(),
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            backend_bootstrap: true,
            non_interactive: true,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            continue_on_error: false,
            cycle_policy: CyclePolicy::default(),
            strategy: ExecutionStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub max_parallel_units: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_parallel_units: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Credentials and defaults handed to terragrunt through its environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpSettings {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub credentials_path: Option<String>,
    #[serde(default = "default_region")]
    pub default_region: String,
    #[serde(default = "default_zone")]
    pub default_zone: String,
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            credentials_path: None,
            default_region: default_region(),
            default_zone: default_zone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_binary_path() -> String {
    "terragrunt".to_string()
}

fn default_parallelism() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "europe-west2".to_string()
}

fn default_zone() -> String {
    "europe-west2-a".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

// ─── Derived values ─────────────────────────────────────────────────────────

impl Settings {
    pub fn root(&self) -> &Path {
        &self.terragrunt.root_path
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.terragrunt.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.terragrunt.probe_timeout_secs)
    }

    pub fn stack_timeout(&self) -> Duration {
        Duration::from_secs(self.stacks.timeout_secs)
    }

    /// Concurrency cap for unit execution inside one batch.
    pub fn execution_parallelism(&self) -> usize {
        self.stacks
            .max_parallel_units
            .unwrap_or(self.terragrunt.parallelism)
            .max(1)
    }

    /// Environment overlay for a single terragrunt invocation.
    ///
    /// Built fresh for every call and merged onto a copy of the ambient
    /// environment by the runner.
    pub fn command_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        if let Some(ref creds) = self.gcp.credentials_path {
            let resolved = resolve_credentials_path(creds);
            tracing::debug!(path = %resolved.display(), "Setting GOOGLE_APPLICATION_CREDENTIALS");
            env.insert(
                "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                resolved.to_string_lossy().into_owned(),
            );
        }

        if let Some(ref project) = self.gcp.project_id {
            env.insert("GOOGLE_CLOUD_PROJECT".to_string(), project.clone());
            env.insert("GCLOUD_PROJECT".to_string(), project.clone());
        }

        if !self.gcp.default_region.is_empty() {
            env.insert("GOOGLE_REGION".to_string(), self.gcp.default_region.clone());
            env.insert(
                "GOOGLE_CLOUD_REGION".to_string(),
                self.gcp.default_region.clone(),
            );
        }

        if !self.gcp.default_zone.is_empty() {
            env.insert("GOOGLE_ZONE".to_string(), self.gcp.default_zone.clone());
            env.insert(
                "GOOGLE_CLOUD_ZONE".to_string(),
                self.gcp.default_zone.clone(),
            );
        }

        env.insert(
            "TG_NON_INTERACTIVE".to_string(),
            self.terragrunt.non_interactive.to_string(),
        );
        env.insert(
            "TG_BACKEND_BOOTSTRAP".to_string(),
            self.terragrunt.backend_bootstrap.to_string(),
        );
        env.insert(
            "TG_PARALLELISM".to_string(),
            self.terragrunt.parallelism.to_string(),
        );

        env
    }

    /// Environment overlay for `terragrunt stack ...` invocations.
    pub fn stack_command_env(&self) -> HashMap<String, String> {
        let mut env = self.command_env();
        env.insert("TG_EXPERIMENT_MODE".to_string(), "true".to_string());
        env.insert(
            "TG_STACKS_ENABLED".to_string(),
            self.stacks.enabled.to_string(),
        );
        if let Some(max) = self.stacks.max_parallel_units {
            env.insert("TG_PARALLELISM".to_string(), max.to_string());
        }
        env
    }
}

/// Expand `~` and `$VARS`, then absolutise against the current directory.
pub fn resolve_credentials_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}
