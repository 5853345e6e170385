use std::future::Future;
use std::time::Duration;

use super::runner::CommandOutput;
use crate::error::RunnerError;

/// Subcommands that never change infrastructure and may be repeated.
const READ_ONLY_COMMANDS: &[&str] = &["state list", "state show", "validate", "plan", "output"];

/// Whether a terragrunt command (the words after `run`) is safe to repeat.
pub fn is_read_only(command: &str) -> bool {
    let command = command.trim();
    READ_ONLY_COMMANDS
        .iter()
        .any(|c| command == *c || command.starts_with(&format!("{c} ")))
}

/// Retry policy for a read-only command: only timeouts are worth repeating.
pub fn retry_timeouts(result: &Result<CommandOutput, RunnerError>) -> bool {
    matches!(result, Ok(out) if out.timed_out())
}

/// Run `f` until `should_retry` rejects its result or `max_retries` repeats
/// have been made, sleeping with exponential backoff in between.
pub async fn with_retry<F, Fut, T, P>(
    max_retries: u32,
    base_delay: Duration,
    operation_name: &str,
    should_retry: P,
    mut f: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 0;

    loop {
        let result = f().await;
        if !should_retry(&result) {
            return result;
        }

        attempt += 1;
        if attempt > max_retries {
            tracing::error!(
                operation = operation_name,
                attempts = attempt,
                "All retry attempts exhausted"
            );
            return result;
        }

        let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
        tracing::warn!(
            operation = operation_name,
            attempt = attempt,
            max_retries = max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_detection() {
        assert!(is_read_only("plan"));
        assert!(is_read_only("state list"));
        assert!(is_read_only("output -json"));
        assert!(!is_read_only("apply"));
        assert!(!is_read_only("destroy"));
        assert!(!is_read_only("planet"));
    }

    #[tokio::test]
    async fn stops_when_predicate_rejects() {
        let mut calls = 0;
        let result = with_retry(5, Duration::ZERO, "test", |n: &u32| *n < 3, || {
            calls += 1;
            let n = calls;
            async move { n }
        })
        .await;
        assert_eq!(result, 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mut calls = 0;
        let result = with_retry(2, Duration::ZERO, "test", |_: &u32| true, || {
            calls += 1;
            async { 0u32 }
        })
        .await;
        assert_eq!(result, 0);
        assert_eq!(calls, 3);
    }
}
