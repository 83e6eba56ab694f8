//! Agent invocation behind the [`AgentInvoker`] trait.
//!
//! The trait decouples phase orchestration from the actual agent backend
//! (the `claude` CLI in non-interactive mode). Tests use scripted invokers
//! that return predetermined outcomes without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_with_timeout;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Working directory for the agent process (the run workspace).
    pub workdir: PathBuf,
    /// Instruction text for this phase.
    pub prompt: String,
    /// Maximum agent turns for this invocation.
    pub max_turns: u32,
    /// Model override. `None` uses the CLI's configured default.
    pub model: Option<String>,
    /// Wall-clock budget for the invocation.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

/// Result of one agent invocation.
///
/// Ordinary process failure (non-zero exit, timeout) is reported through
/// `success = false`, never as an `Err`: the pipeline treats it as a normal
/// phase failure, not an orchestration defect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOutcome {
    pub success: bool,
    /// Captured stdout, possibly partial on failure.
    pub output: String,
    /// Human-readable failure cause when `success` is false.
    pub error: Option<String>,
}

impl InvokeOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

/// Abstraction over agent execution backends.
pub trait AgentInvoker {
    /// Run one instruction to completion and report the outcome.
    fn invoke(&self, request: &InvokeRequest) -> Result<InvokeOutcome>;
}

/// Invoker that spawns the `claude` CLI in non-interactive mode.
pub struct ClaudeInvoker;

impl AgentInvoker for ClaudeInvoker {
    #[instrument(skip_all, fields(max_turns = request.max_turns, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &InvokeRequest) -> Result<InvokeOutcome> {
        info!(workdir = %request.workdir.display(), "starting agent invocation");

        let mut cmd = Command::new("claude");
        cmd.arg("-p")
            .arg(&request.prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--max-turns")
            .arg(request.max_turns.to_string());
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd.current_dir(&request.workdir);

        let output = run_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .context("run agent process")?;
        let stdout = output.stdout_lossy();

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Ok(InvokeOutcome::failed(
                stdout,
                format!("agent timed out after {:?}", request.timeout),
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent exited with failure");
            let stderr = output.stderr_lossy();
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("agent exited with status {:?}", output.status.code())
            } else {
                format!(
                    "agent exited with status {:?}: {}",
                    output.status.code(),
                    detail
                )
            };
            return Ok(InvokeOutcome::failed(stdout, message));
        }

        debug!(output_bytes = stdout.len(), "agent invocation completed");
        Ok(InvokeOutcome::ok(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A stand-in backend wrapping an arbitrary shell command, used to
    /// exercise the soft-failure contract without the real CLI.
    struct ShellInvoker {
        script: &'static str,
    }

    impl AgentInvoker for ShellInvoker {
        fn invoke(&self, request: &InvokeRequest) -> Result<InvokeOutcome> {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", self.script]).current_dir(&request.workdir);
            let output = run_with_timeout(cmd, request.timeout, request.output_limit_bytes)?;
            if output.timed_out {
                return Ok(InvokeOutcome::failed(output.stdout_lossy(), "timed out"));
            }
            if !output.status.success() {
                return Ok(InvokeOutcome::failed(
                    output.stdout_lossy(),
                    output.stderr_lossy(),
                ));
            }
            Ok(InvokeOutcome::ok(output.stdout_lossy()))
        }
    }

    fn request(workdir: &std::path::Path) -> InvokeRequest {
        InvokeRequest {
            workdir: workdir.to_path_buf(),
            prompt: "prompt".to_string(),
            max_turns: 5,
            model: None,
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn successful_command_reports_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let invoker = ShellInvoker {
            script: "printf done",
        };
        let outcome = invoker.invoke(&request(temp.path())).expect("invoke");
        assert!(outcome.success);
        assert_eq!(outcome.output, "done");
        assert!(outcome.error.is_none());
    }

    /// Ordinary command failure must surface as `success=false`, never `Err`,
    /// and keep whatever partial output was captured.
    #[test]
    fn failing_command_is_a_soft_failure_with_partial_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let invoker = ShellInvoker {
            script: "printf partial; exit 2",
        };
        let outcome = invoker.invoke(&request(temp.path())).expect("invoke");
        assert!(!outcome.success);
        assert_eq!(outcome.output, "partial");
        assert!(outcome.error.is_some());
    }
}
