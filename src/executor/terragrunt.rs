use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::output_parser::{self, PlanSummary};
use super::retry::{is_read_only, retry_timeouts, with_retry};
use super::runner::{unit_dir, CommandOutput, CommandRunner, CommandSpec};
use crate::config::Settings;
use crate::discovery::models::UNIT_FILE;
use crate::error::{RunnerError, TerragruntError};
use crate::hcl;

/// Resources whose `state show` output is fetched by [`Terragrunt::state_info`].
const STATE_SHOW_LIMIT: usize = 5;

const STATE_SHOW_TIMEOUT: Duration = Duration::from_secs(30);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(300);
const OUTPUT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub unit_path: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub id: String,
    pub unit_path: String,
    pub summary: PlanSummary,
    #[serde(skip_serializing)]
    pub output: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateInfo {
    pub unit_path: String,
    pub resources: Vec<String>,
    /// `state show` output for the first few resources.
    pub details: BTreeMap<String, String>,
}

/// Builds and runs terragrunt invocations for units and stacks.
///
/// Every invocation carries its own environment overlay built from the
/// settings; the process environment is never written.
pub struct Terragrunt {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
}

impl Terragrunt {
    pub fn new(settings: Arc<Settings>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn root(&self) -> &Path {
        self.settings.root()
    }

    pub fn unit_dir(&self, unit_path: &str) -> PathBuf {
        unit_dir(self.root(), unit_path)
    }

    /// `terragrunt run <words...>` in the unit directory, without extra flags.
    pub fn unit_spec(&self, unit_path: &str, words: &[&str], timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.settings.terragrunt.binary_path, self.unit_dir(unit_path))
            .arg("run")
            .args(words.iter().copied())
            .timeout(timeout)
            .envs(self.settings.command_env())
    }

    /// The invocation used to execute `command` against one unit: mutating
    /// commands get `-auto-approve`, and `--backend-bootstrap` is added when
    /// enabled.
    pub fn execution_spec(&self, unit_path: &str, command: &str) -> CommandSpec {
        let words: Vec<&str> = command.split_whitespace().collect();
        let mut spec = self.unit_spec(unit_path, &words, self.settings.command_timeout());

        let mutating = matches!(words.first(), Some(&"apply") | Some(&"destroy"));
        if mutating && !words.contains(&"-auto-approve") {
            spec = spec.arg("-auto-approve");
        }
        if self.settings.terragrunt.backend_bootstrap && !words.contains(&"--backend-bootstrap") {
            spec = spec.arg("--backend-bootstrap");
        }
        spec
    }

    /// `terragrunt stack run [--dry-run] <command>` in the stack directory.
    pub fn stack_spec(&self, stack_path: &str, command: &str, dry_run: bool) -> CommandSpec {
        let mut spec = CommandSpec::new(
            &self.settings.terragrunt.binary_path,
            unit_dir(self.root(), stack_path),
        )
        .args(["stack", "run"]);
        if dry_run {
            spec = spec.arg("--dry-run");
        }
        spec.args(command.split_whitespace())
            .timeout(self.settings.stack_timeout())
            .envs(self.settings.stack_command_env())
    }

    /// Run a prepared invocation. Timeouts of read-only commands are retried.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        command: &str,
    ) -> Result<CommandOutput, RunnerError> {
        if !is_read_only(command) {
            return self.runner.run(spec).await;
        }
        with_retry(
            self.settings.terragrunt.max_retries,
            Duration::from_secs(self.settings.terragrunt.retry_delay_secs),
            command,
            retry_timeouts,
            || self.runner.run(spec),
        )
        .await
    }

    /// Run `command` against one unit with execution flags.
    pub async fn run_unit(
        &self,
        unit_path: &str,
        command: &str,
    ) -> Result<CommandOutput, RunnerError> {
        let spec = self.execution_spec(unit_path, command);
        self.run(&spec, command).await
    }

    /// `terragrunt run state list` with the probe timeout and no retries.
    pub async fn state_list(&self, unit_path: &str) -> Result<CommandOutput, RunnerError> {
        let spec = self.unit_spec(unit_path, &["state", "list"], self.settings.probe_timeout());
        self.runner.run(&spec).await
    }

    /// `terragrunt stack run state list` with the probe timeout.
    pub async fn stack_state_list(&self, stack_path: &str) -> Result<CommandOutput, RunnerError> {
        let spec = self
            .stack_spec(stack_path, "state list", false)
            .timeout(self.settings.probe_timeout());
        self.runner.run(&spec).await
    }

    /// Structure checks on the definition file plus `terragrunt run validate`.
    pub async fn validate_unit(&self, unit_path: &str) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let dir = self.unit_dir(unit_path);
        let file = dir.join(UNIT_FILE);

        if !dir.is_dir() {
            errors.push(format!("Unit directory does not exist: {}", dir.display()));
        } else if !file.is_file() {
            errors.push(format!("{UNIT_FILE} not found in {}", dir.display()));
        } else {
            match std::fs::read_to_string(&file) {
                Ok(content) => {
                    let report = hcl::check_structure(&content);
                    errors.extend(report.errors);
                    warnings.extend(report.warnings);
                }
                Err(e) => errors.push(format!("Error reading {UNIT_FILE}: {e}")),
            }

            let spec = self.unit_spec(unit_path, &["validate"], VALIDATE_TIMEOUT);
            match self.run(&spec, "validate").await {
                Ok(out) if out.success() => {}
                Ok(out) => errors.push(format!(
                    "Terragrunt validation failed: {}",
                    out.error_message()
                )),
                Err(e) => errors.push(format!("Failed to run terragrunt validate: {e}")),
            }
        }

        ValidationResult {
            unit_path: unit_path.to_string(),
            valid: errors.is_empty(),
            errors,
            warnings,
            validated_at: Utc::now(),
        }
    }

    /// Run a plan and summarise its changes.
    pub async fn plan_unit(&self, unit_path: &str) -> Result<PlanResult, TerragruntError> {
        self.ensure_dir(unit_path)?;
        let out = self.run_unit(unit_path, "plan").await?;
        let out = check_output("plan", out)?;

        Ok(PlanResult {
            id: format!("plan_{}", Utc::now().format("%Y%m%d_%H%M%S")),
            unit_path: unit_path.to_string(),
            summary: output_parser::parse_plan_output(&out.stdout),
            output: out.stdout,
            created_at: Utc::now(),
        })
    }

    /// Resource addresses in state, with `state show` for the first few.
    pub async fn state_info(&self, unit_path: &str) -> Result<StateInfo, TerragruntError> {
        self.ensure_dir(unit_path)?;
        let out = check_output("state list", self.state_list(unit_path).await?)?;

        let resources: Vec<String> = out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let mut details = BTreeMap::new();
        for resource in resources.iter().take(STATE_SHOW_LIMIT) {
            let spec = self.unit_spec(unit_path, &["state", "show", resource.as_str()], STATE_SHOW_TIMEOUT);
            match self.runner.run(&spec).await {
                Ok(show) if show.success() => {
                    details.insert(resource.clone(), show.stdout);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(unit = %unit_path, resource = %resource, error = %e, "state show failed");
                }
            }
        }

        Ok(StateInfo {
            unit_path: unit_path.to_string(),
            resources,
            details,
        })
    }

    /// `terragrunt stack output`, as JSON when possible.
    pub async fn stack_outputs(
        &self,
        stack_path: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, TerragruntError> {
        self.ensure_dir(stack_path)?;
        let spec = CommandSpec::new(
            &self.settings.terragrunt.binary_path,
            unit_dir(self.root(), stack_path),
        )
        .args(["stack", "output"])
        .timeout(OUTPUT_TIMEOUT)
        .envs(self.settings.stack_command_env());

        let out = check_output("stack output", self.run(&spec, "output").await?)?;
        Ok(output_parser::parse_outputs(&out.stdout))
    }

    fn ensure_dir(&self, path: &str) -> Result<(), TerragruntError> {
        let dir = unit_dir(self.root(), path);
        if dir.is_dir() {
            Ok(())
        } else {
            Err(TerragruntError::MissingDirectory(dir))
        }
    }
}

fn check_output(command: &str, out: CommandOutput) -> Result<CommandOutput, TerragruntError> {
    if out.timed_out() {
        return Err(TerragruntError::TimedOut {
            command: command.to_string(),
        });
    }
    if !out.success() {
        return Err(TerragruntError::Failed {
            command: command.to_string(),
            exit_code: out.exit_code,
            message: out.error_message(),
        });
    }
    Ok(out)
}
