//! Test-only helpers: scripted agent/remote fakes and workspace fixtures.

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::config::PipelineConfig;
use crate::io::agent::{AgentInvoker, InvokeOutcome, InvokeRequest};
use crate::io::publish::RemoteHost;

/// Invoker replaying a fixed queue of outcomes, recording every request.
pub struct ScriptedInvoker {
    outcomes: Mutex<Vec<InvokeOutcome>>,
    requests: Mutex<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    pub fn new(outcomes: Vec<InvokeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of invocations performed so far.
    pub fn invocation_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    /// Snapshot of the recorded requests.
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<InvokeOutcome> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let mut outcomes = self.outcomes.lock().expect("outcomes lock");
        if outcomes.is_empty() {
            return Err(anyhow!("scripted invoker exhausted"));
        }
        Ok(outcomes.remove(0))
    }
}

/// Remote host rejecting the first `reject_first` creation attempts, then
/// accepting with a canned URL.
pub struct StaticRemote {
    reject_first: usize,
    attempts: Mutex<Vec<String>>,
    url: String,
}

impl StaticRemote {
    pub fn accepting() -> Self {
        Self::rejecting(0)
    }

    pub fn rejecting(reject_first: usize) -> Self {
        Self {
            reject_first,
            attempts: Mutex::new(Vec::new()),
            url: "https://example.invalid/owner/repo".to_string(),
        }
    }

    /// Repository names attempted so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("attempts lock").clone()
    }
}

impl RemoteHost for StaticRemote {
    fn create(&self, _workdir: &Path, name: &str) -> Result<()> {
        let mut attempts = self.attempts.lock().expect("attempts lock");
        attempts.push(name.to_string());
        if attempts.len() <= self.reject_first {
            return Err(anyhow!("name '{name}' already exists"));
        }
        Ok(())
    }

    fn remote_url(&self, _workdir: &Path) -> Result<String> {
        Ok(self.url.clone())
    }
}

/// Pipeline config pointing all filesystem roots into a test directory.
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        outputs_dir: root.join("outputs"),
        assets_dir: root.join("assets"),
        ..PipelineConfig::default()
    }
}

/// Pre-initialize a git repository with a commit identity at `root`.
///
/// Publishing tests need an identity configured before the pipeline's own
/// `git init` commits; `git init` on an existing repository is a no-op, so
/// running this against the (deterministic) workspace path first is safe.
pub fn init_repo_identity(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    run_git(root, &["init"])?;
    run_git(root, &["config", "user.email", "pipeline@local.invalid"])?;
    run_git(root, &["config", "user.name", "Pipeline Test"])?;
    Ok(())
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .map_err(|e| anyhow!("spawn git {}: {e}", args.join(" ")))?;
    if !status.success() {
        return Err(anyhow!("git {} failed", args.join(" ")));
    }
    Ok(())
}
