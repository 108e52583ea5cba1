//! Timed subprocess invocation with stderr-pattern rate-limit classification.
//!
//! Grounded in `weave_gh/cli.py::_run`/`_is_rate_limited`: failures are
//! classified by matching stderr against a fixed phrase list, deliberately
//! narrow (not bare "403"/"429") so a permission error is never mistaken for
//! a rate limit and retried for no benefit.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "api rate limit",
    "secondary rate limit",
    "abuse detection",
];

pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `cmd`, polling for completion and killing it if it outlives
/// `timeout`. A killed process is reported as a non-zero-exit failure with
/// a synthetic stderr message, not a Rust error — callers decide how to
/// treat a timeout the same way they'd treat any other command failure.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> std::io::Result<CommandOutput> {
    let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(Duration::from_millis(25));
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    match status {
        Some(status) => Ok(CommandOutput {
            success: status.success(),
            stdout,
            stderr,
        }),
        None => Ok(CommandOutput {
            success: false,
            stdout,
            stderr: format!("command timed out after {}s", timeout.as_secs()),
        }),
    }
}

/// Whether `stderr` looks like a rate-limit response, per the fixed phrase
/// list. Case-insensitive.
pub fn is_rate_limited(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    RATE_LIMIT_PATTERNS.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_rate_limit_phrases() {
        assert!(is_rate_limited("Error: API rate limit exceeded for user"));
        assert!(is_rate_limited("secondary rate limit hit, slow down"));
        assert!(!is_rate_limited("HTTP 403: Resource not accessible by integration"));
    }

    #[test]
    fn successful_command_reports_success() {
        let mut cmd = Command::new("true");
        let out = run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
        assert!(out.success);
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let out = run_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap();
        assert!(!out.success);
        assert!(out.stderr.contains("timed out"));
    }
}
