use std::path::PathBuf;

use thiserror::Error;

/// Whole-call failures of a discovery pass.
///
/// Per-unit problems (unknown resource type, unreadable definition file,
/// failed status probe) never surface here; they are logged and degraded.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("discovery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures of the execution-order planner.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("no units to plan")]
    Empty,

    #[error("unit '{0}' appears more than once")]
    DuplicateUnit(String),

    #[error("circular dependency between: {}", units.join(", "))]
    Cycle { units: Vec<String> },
}

/// Failures to launch or supervise an external command.
///
/// A non-zero exit or a timeout is not an error: both come back as a
/// regular `CommandOutput`.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn {program} in {}: {source}", working_dir.display())]
    Spawn {
        program: String,
        working_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures that prevent an execution from starting at all.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("no units found under {0}")]
    NoUnits(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Failures of a single-unit terragrunt operation (plan, state, outputs).
#[derive(Error, Debug)]
pub enum TerragruntError {
    #[error("directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("{command} failed with exit code {exit_code}: {message}")]
    Failed {
        command: String,
        exit_code: i32,
        message: String,
    },

    #[error("{command} timed out")]
    TimedOut { command: String },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}
