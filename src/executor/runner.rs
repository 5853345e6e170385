use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::RunnerError;

/// Exit code reported when a command was killed for running too long.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Exit code reported when the child was ended by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -2;

/// How long to wait for output pipes to close after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    /// Overlaid onto the inherited environment of the child only.
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            timeout: Duration::from_secs(3600),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// `program arg arg ...`, for logs and dry-run output.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished (or timed-out) command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    /// Stdout lines followed by stderr lines.
    pub fn combined_lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::to_string)
            .collect()
    }

    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }

        let meaningful: Vec<&str> = self
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if !meaningful.is_empty() {
            let start = meaningful.len().saturating_sub(5);
            return meaningful[start..].join("\n");
        }

        format!("exit code {}", self.exit_code)
    }
}

/// Runs external commands. Implemented by [`ProcessRunner`] and by test fakes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as child processes.
///
/// Children are killed when their future is dropped, so cancelling a caller
/// stops the process the same way a timeout does.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        tracing::info!(
            binary = %spec.program,
            args = ?spec.args,
            dir = %spec.working_dir.display(),
            "Running command"
        );
        let started = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: spec.program.clone(),
            working_dir: spec.working_dir.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(spec, "stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe(spec, "stderr"))?;
        let stdout_handle = drain_lines(stdout, "stdout");
        let stderr_handle = drain_lines(stderr, "stderr");

        match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| RunnerError::Io {
                    program: spec.program.clone(),
                    source,
                })?;
                let stdout = join_lines(stdout_handle, None).await;
                let stderr = join_lines(stderr_handle, None).await;
                let exit_code = status.code().unwrap_or(SIGNAL_EXIT_CODE);

                tracing::info!(exit_code, dir = %spec.working_dir.display(), "Command completed");
                Ok(CommandOutput {
                    exit_code,
                    stdout,
                    stderr,
                    elapsed: started.elapsed(),
                })
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed-out command");
                }
                let stdout = join_lines(stdout_handle, Some(DRAIN_GRACE)).await;
                let mut stderr = join_lines(stderr_handle, Some(DRAIN_GRACE)).await;
                if !stderr.is_empty() {
                    stderr.push('\n');
                }
                stderr.push_str(&format!(
                    "command timed out after {}s",
                    spec.timeout.as_secs()
                ));

                tracing::warn!(
                    dir = %spec.working_dir.display(),
                    timeout_secs = spec.timeout.as_secs(),
                    "Command timed out"
                );
                Ok(CommandOutput {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout,
                    stderr,
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}

fn missing_pipe(spec: &CommandSpec, stream: &str) -> RunnerError {
    RunnerError::Io {
        program: spec.program.clone(),
        source: std::io::Error::other(format!("{stream} was not captured")),
    }
}

/// Collect a child stream line by line until EOF. Bytes that are not valid
/// UTF-8 are replaced rather than ending the read, so the pipe stays open
/// for the whole life of the child.
fn drain_lines<R>(reader: R, stream: &'static str) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    tokio::spawn(async move {
        let mut collected = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    tracing::debug!(stream, "{}", line);
                    collected.push(line);
                }
                Err(e) => {
                    tracing::warn!(stream, error = %e, "Failed to read command output");
                    break;
                }
            }
        }
        collected
    })
}

async fn join_lines(mut handle: JoinHandle<Vec<String>>, grace: Option<Duration>) -> String {
    let lines = match grace {
        None => (&mut handle).await.unwrap_or_default(),
        Some(grace) => match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                // A grandchild still holds the pipe open.
                handle.abort();
                Vec::new()
            }
        },
    };
    lines.join("\n")
}

/// Working directory of a unit below the scan root.
pub fn unit_dir(root: &Path, unit_path: &str) -> PathBuf {
    if unit_path.is_empty() {
        root.to_path_buf()
    } else {
        root.join(unit_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_lines_orders_stdout_first() {
        let out = CommandOutput {
            exit_code: 1,
            stdout: "a\nb".into(),
            stderr: "c".into(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(out.combined_lines(), vec!["a", "b", "c"]);
        assert_eq!(out.error_message(), "c");
        assert!(!out.success());
        assert!(!out.timed_out());
    }

    #[test]
    fn spec_display_joins_arguments() {
        let spec = CommandSpec::new("terragrunt", "/tmp").args(["run", "plan"]);
        assert_eq!(spec.display(), "terragrunt run plan");
    }
}
