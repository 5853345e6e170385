//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stackwise::config::Settings;
use stackwise::discovery::models::{
    EnvironmentType, ResourceType, StackStatus, Unit, UnitConfiguration, UnitStatus,
};
use stackwise::discovery::registry::StatusProbe;
use stackwise::error::RunnerError;
use stackwise::executor::{CommandOutput, CommandRunner, CommandSpec, Terragrunt};

pub const WEB: &str = "live/acct1/dev/proj1/compute/web";
pub const DB: &str = "live/acct1/dev/proj1/compute/db";

type Responder = dyn Fn(&CommandSpec) -> Result<CommandOutput, RunnerError> + Send + Sync;

/// A `CommandRunner` that answers from a closure and records every call.
pub struct ScriptedRunner {
    responder: Box<Responder>,
    delay: Duration,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, RunnerError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every command exits 0 with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(ok("")))
    }

    /// Wait this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Working directories of every call, relative to `root`, in call order.
    pub fn called_dirs(&self, root: &Path) -> Vec<String> {
        self.calls()
            .iter()
            .map(|spec| {
                spec.working_dir
                    .strip_prefix(root)
                    .unwrap_or(&spec.working_dir)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(spec.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(spec)
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        ..Default::default()
    }
}

pub fn failed(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stderr: stderr.to_string(),
        ..Default::default()
    }
}

pub fn spawn_error(spec: &CommandSpec) -> RunnerError {
    RunnerError::Spawn {
        program: spec.program.clone(),
        working_dir: spec.working_dir.clone(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    }
}

/// A `StatusProbe` that reports fixed answers and counts unit probes.
pub struct FixedProbe {
    pub unit: UnitStatus,
    pub stack: StackStatus,
    pub unit_calls: AtomicUsize,
    pub stack_calls: AtomicUsize,
    pub delay: Duration,
}

impl FixedProbe {
    pub fn new(unit: UnitStatus) -> Self {
        Self {
            unit,
            stack: StackStatus::Unknown,
            unit_calls: AtomicUsize::new(0),
            stack_calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Hold every unit probe open for `delay` so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stack_calls(&self) -> usize {
        self.stack_calls.load(Ordering::SeqCst)
    }

    pub fn unit_calls(&self) -> usize {
        self.unit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for FixedProbe {
    async fn unit_status(&self, _unit_path: &str) -> UnitStatus {
        self.unit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.unit
    }

    async fn stack_status(&self, _stack_path: &str) -> StackStatus {
        self.stack_calls.fetch_add(1, Ordering::SeqCst);
        self.stack
    }
}

/// Create `root/rel/terragrunt.hcl` with `contents`.
pub fn write_unit(root: &Path, rel: &str, contents: &str) -> PathBuf {
    write_file(root, rel, "terragrunt.hcl", contents)
}

pub fn write_stack(root: &Path, rel: &str, contents: &str) -> PathBuf {
    write_file(root, rel, "stack.hcl", contents)
}

fn write_file(root: &Path, rel: &str, name: &str, contents: &str) -> PathBuf {
    let dir = root.join(rel);
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join(name);
    std::fs::write(&file, contents).unwrap();
    file
}

pub fn dependency_block(name: &str, path: &str) -> String {
    format!("dependency \"{name}\" {{\n  config_path = \"{path}\"\n}}\n")
}

/// The two-unit tree where `db` depends on `web`.
pub fn web_db_tree(root: &Path) {
    write_unit(root, WEB, "include \"root\" {\n  path = find_in_parent_folders()\n}\n");
    write_unit(root, DB, &dependency_block("web", "../web"));
}

/// Settings rooted at `root` with retries disabled.
pub fn settings_for(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.terragrunt.root_path = root.to_path_buf();
    settings.terragrunt.max_retries = 0;
    settings.terragrunt.retry_delay_secs = 0;
    settings.terragrunt.backend_bootstrap = false;
    settings
}

pub fn terragrunt(settings: Settings, runner: Arc<ScriptedRunner>) -> Arc<Terragrunt> {
    Arc::new(Terragrunt::new(Arc::new(settings), runner))
}

/// An in-memory unit for planner tests.
pub fn unit(path: &str, deps: &[&str]) -> Unit {
    Unit {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        resource_type: ResourceType::Compute,
        account: "acct1".to_string(),
        environment: "dev".to_string(),
        environment_type: EnvironmentType::NonProduction,
        project: "proj1".to_string(),
        region: None,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        status: UnitStatus::Unknown,
        last_modified: None,
        configuration: UnitConfiguration::default(),
    }
}
