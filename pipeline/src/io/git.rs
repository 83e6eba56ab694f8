//! Git adapter for workspace publishing.
//!
//! Phase artifacts are committed deterministically, so we keep a small,
//! explicit wrapper around `git` subprocess calls rather than a library
//! binding.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Initialize a repository in the workdir (no-op if already one).
    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        debug!(workdir = %self.workdir.display(), "git init");
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Count commits reachable from HEAD (0 before the first commit).
    pub fn commit_count(&self) -> Result<u32> {
        let out = self.run(&["rev-list", "--count", "HEAD"])?;
        if !out.status.success() {
            return Ok(0);
        }
        let text = String::from_utf8_lossy(&out.stdout);
        text.trim()
            .parse()
            .with_context(|| format!("parse commit count '{}'", text.trim()))
    }

    /// Push pending commits to the configured remote.
    #[instrument(skip_all)]
    pub fn push(&self) -> Result<()> {
        debug!("git push");
        self.run_checked(&["push"])?;
        Ok(())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn configure_identity(root: &Path) {
        for args in [
            ["config", "user.email", "pipeline@local.invalid"].as_slice(),
            ["config", "user.name", "Pipeline Test"].as_slice(),
        ] {
            let status = Command::new("git")
                .args(args)
                .current_dir(root)
                .status()
                .expect("git config");
            assert!(status.success());
        }
    }

    #[test]
    fn init_stage_commit_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.init().expect("init");
        configure_identity(temp.path());

        fs::write(temp.path().join("a.txt"), "a\n").expect("write");
        git.add_all().expect("add");
        assert!(git.has_staged_changes().expect("staged"));
        assert!(git.commit_staged("feat: first").expect("commit"));
        assert_eq!(git.commit_count().expect("count"), 1);
    }

    /// A second commit attempt with no new changes must be skipped, so
    /// repeated phase commits stay idempotent.
    #[test]
    fn commit_without_changes_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.init().expect("init");
        configure_identity(temp.path());

        fs::write(temp.path().join("a.txt"), "a\n").expect("write");
        git.add_all().expect("add");
        assert!(git.commit_staged("feat: first").expect("commit"));

        git.add_all().expect("add again");
        assert!(!git.commit_staged("feat: again").expect("commit again"));
        assert_eq!(git.commit_count().expect("count"), 1);
    }

    #[test]
    fn commit_count_is_zero_before_first_commit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.init().expect("init");
        assert_eq!(git.commit_count().expect("count"), 0);
    }
}
