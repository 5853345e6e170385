use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::output_parser;
use super::runner::CommandOutput;
use super::terragrunt::Terragrunt;
use crate::config::ExecutionStrategy;
use crate::dag::{compute_batches, ExecutionPlan};
use crate::discovery::models::{StackStatus, Unit};
use crate::discovery::scanner;
use crate::error::{ExecutionError, RunnerError};

/// Outcome of one unit within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitRunStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Skipped,
}

impl UnitRunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, UnitRunStatus::Failed | UnitRunStatus::TimedOut)
    }
}

impl fmt::Display for UnitRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitRunStatus::Running => "running",
            UnitRunStatus::Completed => "completed",
            UnitRunStatus::Failed => "failed",
            UnitRunStatus::TimedOut => "timed-out",
            UnitRunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitResult {
    pub status: UnitRunStatus,
    pub output: Vec<String>,
    pub errors: Vec<String>,
    pub exit_code: Option<i32>,
    pub elapsed_ms: Option<u64>,
}

impl UnitResult {
    pub fn new(status: UnitRunStatus) -> Self {
        Self {
            status,
            output: Vec::new(),
            errors: Vec::new(),
            exit_code: None,
            elapsed_ms: None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        let mut result = Self::new(UnitRunStatus::Skipped);
        result.errors.push(reason.into());
        result
    }

    fn from_output(out: CommandOutput) -> Self {
        let status = if out.timed_out() {
            UnitRunStatus::TimedOut
        } else if out.success() {
            UnitRunStatus::Completed
        } else {
            UnitRunStatus::Failed
        };

        let mut errors = Vec::new();
        if status.is_failure() {
            errors = output_parser::extract_errors(&out.combined_lines());
            if errors.is_empty() || out.timed_out() {
                errors.push(out.error_message());
            }
        }

        Self {
            status,
            output: out.stdout.lines().map(str::to_string).collect(),
            errors,
            exit_code: Some(out.exit_code),
            elapsed_ms: Some(out.elapsed.as_millis() as u64),
        }
    }

    fn from_runner_error(e: &RunnerError, elapsed_ms: u64) -> Self {
        let mut result = Self::new(UnitRunStatus::Failed);
        result.errors.push(e.to_string());
        result.elapsed_ms = Some(elapsed_ms);
        result
    }
}

/// One command run against a target directory.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub id: String,
    pub target_path: String,
    pub command: String,
    pub dry_run: bool,
    pub status: StackStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_plan: Vec<Vec<String>>,
    pub unit_results: BTreeMap<String, UnitResult>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

impl Execution {
    fn new(target_path: &str, command: &str, dry_run: bool) -> Self {
        let started_at = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("exec_{}_{}", started_at.format("%Y%m%d_%H%M%S"), &suffix[..8]),
            target_path: target_path.to_string(),
            command: command.to_string(),
            dry_run,
            status: StackStatus::Planning,
            started_at,
            completed_at: None,
            execution_plan: Vec::new(),
            unit_results: BTreeMap::new(),
            error_message: None,
            warnings: Vec::new(),
        }
    }

    /// Move to a terminal state. Has no effect once the execution finished.
    fn finish(&mut self, error: Option<String>) {
        if self.completed_at.is_some() {
            return;
        }
        self.completed_at = Some(Utc::now());
        match error {
            Some(message) => {
                self.status = StackStatus::Failed;
                self.error_message = Some(message);
            }
            None => self.status = StackStatus::Deployed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StackStatus::Deployed
    }

    pub fn units_with(&self, status: UnitRunStatus) -> Vec<&str> {
        self.unit_results
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(p, _)| p.as_str())
            .collect()
    }

    pub fn failed_units(&self) -> Vec<&str> {
        self.unit_results
            .iter()
            .filter(|(_, r)| r.status.is_failure())
            .map(|(p, _)| p.as_str())
            .collect()
    }
}

/// Runs terragrunt commands over the units below a target, batch by batch.
pub struct StackExecutor {
    terragrunt: Arc<Terragrunt>,
}

impl StackExecutor {
    pub fn new(terragrunt: Arc<Terragrunt>) -> Self {
        Self { terragrunt }
    }

    /// Run `command` against every unit below `target_path` and return once
    /// the execution is terminal.
    ///
    /// A missing target or a target without units is an error; everything
    /// that goes wrong after planning is recorded on the returned
    /// [`Execution`] instead.
    pub async fn execute_command(
        &self,
        target_path: &str,
        command: &str,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> Result<Execution, ExecutionError> {
        let root = self.terragrunt.root().to_path_buf();
        if !self.terragrunt.unit_dir(target_path).is_dir() {
            return Err(ExecutionError::TargetNotFound(target_path.to_string()));
        }

        let target = target_path.to_string();
        let units = tokio::task::spawn_blocking(move || {
            scanner::scan_units_under(&root, &target, None, false)
        })
        .await
        .map_err(crate::error::DiscoveryError::from)??;
        if units.is_empty() {
            return Err(ExecutionError::NoUnits(target_path.to_string()));
        }

        let mut execution = Execution::new(target_path, command, dry_run);
        info!(id = %execution.id, target = %target_path, command, dry_run, "Starting execution");

        let settings = self.terragrunt.settings();
        let mut plan = compute_batches(&units, settings.terragrunt.cycle_policy)?;
        let destroying = is_destroy(command);
        if destroying {
            plan = plan.reversed();
        }
        execution.execution_plan = plan.batches.clone();
        execution.warnings.extend(plan.warnings.iter().cloned());

        if dry_run {
            self.dry_run(&mut execution, &plan, command);
            execution.finish(None);
            return Ok(execution);
        }

        execution.status = if destroying {
            StackStatus::Destroying
        } else {
            StackStatus::Applying
        };

        let error = match settings.terragrunt.strategy {
            ExecutionStrategy::Batched => {
                self.run_batches(&mut execution, &plan, &units, command, destroying, &cancel)
                    .await
            }
            ExecutionStrategy::StackRun => {
                self.run_stack(&mut execution, target_path, command, &cancel)
                    .await
            }
        };

        execution.finish(error);
        info!(
            id = %execution.id,
            status = %execution.status,
            failed = execution.failed_units().len(),
            "Execution finished"
        );
        Ok(execution)
    }

    fn dry_run(&self, execution: &mut Execution, plan: &ExecutionPlan, command: &str) {
        for path in plan.batches.iter().flatten() {
            let spec = match self.terragrunt.settings().terragrunt.strategy {
                ExecutionStrategy::Batched => self.terragrunt.execution_spec(path, command),
                ExecutionStrategy::StackRun => {
                    self.terragrunt
                        .stack_spec(&execution.target_path, command, true)
                }
            };
            let mut result = UnitResult::new(UnitRunStatus::Completed);
            result.output.push(format!("[dry-run] {}", spec.display()));
            execution.unit_results.insert(path.clone(), result);
        }
    }

    /// Run the plan's batches in order. Returns the execution's error
    /// message, if it failed.
    async fn run_batches(
        &self,
        execution: &mut Execution,
        plan: &ExecutionPlan,
        units: &[Unit],
        command: &str,
        destroying: bool,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let settings = self.terragrunt.settings();
        let continue_on_error = settings.terragrunt.continue_on_error;
        let semaphore = Arc::new(Semaphore::new(settings.execution_parallelism()));
        let blockers = blocking_units(units, destroying);

        let mut stopped: HashSet<String> = HashSet::new();
        let mut abort = false;
        let mut cancelled = false;

        for (batch_idx, batch) in plan.batches.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
            }
            if cancelled || abort {
                let reason = if cancelled {
                    "execution cancelled"
                } else {
                    "skipped after an earlier failure"
                };
                for path in batch {
                    execution
                        .unit_results
                        .insert(path.clone(), UnitResult::skipped(reason));
                }
                continue;
            }

            info!(batch = batch_idx + 1, units = ?batch, "Starting batch");
            let mut tasks = JoinSet::new();
            let mut launched = Vec::new();

            for path in batch {
                let blocked_by = blockers
                    .get(path.as_str())
                    .into_iter()
                    .flatten()
                    .find(|b| stopped.contains(**b));
                if let Some(blocker) = blocked_by {
                    warn!(unit = %path, blocker = %blocker, "Skipping due to failed dependency");
                    execution.unit_results.insert(
                        path.clone(),
                        UnitResult::skipped(format!("dependency {blocker} did not complete")),
                    );
                    stopped.insert(path.clone());
                    continue;
                }

                let terragrunt = self.terragrunt.clone();
                let semaphore = semaphore.clone();
                let path = path.clone();
                let command = command.to_string();
                execution
                    .unit_results
                    .insert(path.clone(), UnitResult::new(UnitRunStatus::Running));
                launched.push(path.clone());

                tasks.spawn(async move {
                    let started = Instant::now();
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            debug!(unit = %path, "Executing unit");
                            match terragrunt.run_unit(&path, &command).await {
                                Ok(out) => UnitResult::from_output(out),
                                Err(e) => UnitResult::from_runner_error(
                                    &e,
                                    started.elapsed().as_millis() as u64,
                                ),
                            }
                        }
                        Err(e) => {
                            let mut failed = UnitResult::new(UnitRunStatus::Failed);
                            failed.errors.push(e.to_string());
                            failed
                        }
                    };
                    (path, result)
                });
            }

            // Drain the batch fully unless cancelled.
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tasks.abort_all();
                        cancelled = true;
                        break;
                    }
                    joined = tasks.join_next() => {
                        match joined {
                            None => break,
                            Some(Ok((path, result))) => {
                                if result.status == UnitRunStatus::Completed {
                                    info!(unit = %path, "Unit completed");
                                } else {
                                    warn!(unit = %path, status = %result.status, errors = ?result.errors, "Unit did not complete");
                                }
                                execution.unit_results.insert(path, result);
                            }
                            Some(Err(e)) => warn!(error = %e, "Unit task ended abnormally"),
                        }
                    }
                }
            }

            let mut batch_failed = false;
            for path in &launched {
                let Some(result) = execution.unit_results.get_mut(path) else {
                    continue;
                };
                if result.status == UnitRunStatus::Running {
                    result.status = UnitRunStatus::Failed;
                    result.errors.push(if cancelled {
                        "cancelled while running".to_string()
                    } else {
                        "unit task ended abnormally".to_string()
                    });
                }
                if result.status.is_failure() {
                    batch_failed = true;
                    stopped.insert(path.clone());
                }
            }

            if batch_failed && !continue_on_error {
                warn!(batch = batch_idx + 1, "Batch failed, skipping remaining batches");
                abort = true;
            }
        }

        if cancelled {
            return Some("execution cancelled".to_string());
        }
        let failed = execution.failed_units();
        if failed.is_empty() {
            None
        } else {
            Some(format!("{} unit(s) failed: {}", failed.len(), failed.join(", ")))
        }
    }

    /// Hand the whole target to `terragrunt stack run` and scrape per-unit
    /// results from its output.
    async fn run_stack(
        &self,
        execution: &mut Execution,
        target_path: &str,
        command: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let spec = self.terragrunt.stack_spec(target_path, command, false);

        let out = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Some("execution cancelled".to_string()),
            result = self.terragrunt.run(&spec, command) => result,
        };

        match out {
            Ok(out) => {
                execution.unit_results = output_parser::parse_stack_output(&out.stdout, &out.stderr);
                if out.timed_out() {
                    return Some(out.error_message());
                }
                if !out.success() {
                    return Some(out.error_message());
                }
                let failed = execution.failed_units();
                if failed.is_empty() {
                    None
                } else {
                    Some(format!("{} unit(s) failed: {}", failed.len(), failed.join(", ")))
                }
            }
            Err(e) => Some(e.to_string()),
        }
    }
}

fn is_destroy(command: &str) -> bool {
    command.split_whitespace().next() == Some("destroy")
}

/// For each unit, the units whose failure must stop it. Normally these are
/// its dependencies; when tearing down it is the units that depend on it.
fn blocking_units(units: &[Unit], destroying: bool) -> HashMap<&str, Vec<&str>> {
    let known: HashSet<&str> = units.iter().map(|u| u.path.as_str()).collect();
    let mut blockers: HashMap<&str, Vec<&str>> = HashMap::new();

    for unit in units {
        for dep in unit.unique_dependencies() {
            if !known.contains(dep) {
                continue;
            }
            if destroying {
                blockers.entry(dep).or_default().push(unit.path.as_str());
            } else {
                blockers.entry(unit.path.as_str()).or_default().push(dep);
            }
        }
    }
    blockers
}
