//! Repository lifecycle: creation, per-phase commits, and the final push.
//!
//! Publishing is best-effort everywhere except the run itself: repository
//! creation failure disables publishing for the remainder of the run, and
//! commit/push failures are logged warnings. No publishing problem ever
//! aborts the pipeline.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::io::git::Git;
use crate::io::workspace::WorkspacePaths;
use crate::phase::Phase;

/// Fallback repository name when the proposal has no usable title.
const DEFAULT_REPO_NAME: &str = "untitled-game";

/// Default `.gitignore` for generated Vite + TypeScript projects.
const DEFAULT_GITIGNORE: &str = "node_modules/\n\
    dist/\n\
    .env\n\
    .env.*\n\
    !.env.example\n\
    .DS_Store\n\
    Thumbs.db\n";

/// Initial commit message carrying phase 1 artifacts and process assets.
const INITIAL_COMMIT_MESSAGE: &str = "feat: Phase 1 - game proposal & pipeline assets";

/// Outcome of a best-effort publish operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Changes were committed (or pushed).
    Done,
    /// Nothing to do: the working tree had no diff.
    Skipped,
    /// The underlying command failed; logged, never propagated.
    Failed(String),
}

/// Remote repository host operations.
///
/// The production implementation shells out to the `gh` CLI; tests script
/// name collisions and canned URLs.
pub trait RemoteHost {
    /// Create a public repository named `name` from the working directory
    /// and push the current branch. Errors on name collision or any other
    /// creation failure.
    fn create(&self, workdir: &Path, name: &str) -> Result<()>;

    /// Canonical URL of the repository the working directory now points at.
    fn remote_url(&self, workdir: &Path) -> Result<String>;
}

/// `gh` CLI implementation of [`RemoteHost`].
pub struct GhRemote;

impl RemoteHost for GhRemote {
    fn create(&self, workdir: &Path, name: &str) -> Result<()> {
        let output = Command::new("gh")
            .args(["repo", "create", name, "--public", "--source", ".", "--push"])
            .current_dir(workdir)
            .output()
            .context("spawn gh repo create")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gh repo create {name} failed: {}", stderr.trim()));
        }
        Ok(())
    }

    fn remote_url(&self, workdir: &Path) -> Result<String> {
        let output = Command::new("gh")
            .args(["repo", "view", "--json", "url", "-q", ".url"])
            .current_dir(workdir)
            .output()
            .context("spawn gh repo view")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gh repo view failed: {}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Extract the game title from the proposal document.
///
/// The first top-level heading wins; a missing file or heading degrades to
/// the default name.
pub fn extract_game_title(proposal_path: &Path) -> String {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("heading regex"));

    let Ok(contents) = fs::read_to_string(proposal_path) else {
        return DEFAULT_REPO_NAME.to_string();
    };
    H1_RE
        .captures(&contents)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| DEFAULT_REPO_NAME.to_string())
}

/// Normalize a title into a repository name slug.
pub fn slugify_repo_name(title: &str) -> String {
    let lowered = title.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || *c == '-')
        .collect();
    let mut slug = String::with_capacity(kept.len());
    let mut last_hyphen = false;
    for ch in kept.chars() {
        let next = if ch.is_ascii_whitespace() { '-' } else { ch };
        if next == '-' {
            if !last_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            last_hyphen = true;
        } else {
            slug.push(next);
            last_hyphen = false;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        DEFAULT_REPO_NAME.to_string()
    } else {
        slug
    }
}

/// Repository lifecycle state for one run.
pub struct RepoPublisher<'a, H: RemoteHost> {
    git: Git,
    host: &'a H,
    remote_url: Option<String>,
}

impl<'a, H: RemoteHost> RepoPublisher<'a, H> {
    pub fn new(workdir: impl Into<std::path::PathBuf>, host: &'a H) -> Self {
        Self {
            git: Git::new(workdir),
            host,
            remote_url: None,
        }
    }

    /// True once the remote repository exists; commits and pushes only make
    /// sense afterward.
    pub fn active(&self) -> bool {
        self.remote_url.is_some()
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    /// Create the remote repository for this run.
    ///
    /// Writes a default `.gitignore` if absent, initializes the local
    /// repository with an initial commit of everything produced so far, then
    /// creates the public remote. A naming collision is retried exactly once
    /// with the run date appended; a second rejection fails the operation.
    /// On success the canonical URL is recorded and returned.
    #[instrument(skip_all, fields(workspace = %paths.root.display()))]
    pub fn create_repository(&mut self, paths: &WorkspacePaths, date: &str) -> Result<String> {
        if !paths.gitignore_path.exists() {
            fs::write(&paths.gitignore_path, DEFAULT_GITIGNORE)
                .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
        }

        self.git.init()?;
        self.git.add_all()?;
        self.git.commit_staged(INITIAL_COMMIT_MESSAGE)?;

        let title = extract_game_title(&paths.proposal_path);
        let name = slugify_repo_name(&title);
        info!(title = %title, repo = %name, "creating remote repository");

        if let Err(first_err) = self.host.create(&paths.root, &name) {
            let fallback = format!("{name}-{date}");
            warn!(error = %first_err, retry = %fallback, "repository name rejected, retrying");
            self.host
                .create(&paths.root, &fallback)
                .with_context(|| format!("create repository '{fallback}' after collision"))?;
        }

        let url = self.host.remote_url(&paths.root)?;
        info!(url = %url, "remote repository created");
        self.remote_url = Some(url.clone());
        Ok(url)
    }

    /// Commit this phase's artifacts. Never raises.
    ///
    /// Stages everything; if the working tree has no diff the commit is
    /// skipped with a no-op log. Command failures are downgraded to
    /// warnings because publishing must not abort the pipeline.
    #[instrument(skip_all, fields(phase = phase.key()))]
    pub fn commit_phase(&self, phase: Phase) -> PublishOutcome {
        let Some(message) = phase.commit_message() else {
            return PublishOutcome::Skipped;
        };
        match self.try_commit(message) {
            Ok(true) => {
                info!("phase artifacts committed");
                PublishOutcome::Done
            }
            Ok(false) => {
                info!("no changes, commit skipped");
                PublishOutcome::Skipped
            }
            Err(err) => {
                warn!(error = %err, "phase commit failed (pipeline continues)");
                PublishOutcome::Failed(err.to_string())
            }
        }
    }

    /// Push all pending commits. Never raises.
    #[instrument(skip_all)]
    pub fn push_all(&self) -> PublishOutcome {
        match self.git.push() {
            Ok(()) => {
                info!("pushed to remote");
                PublishOutcome::Done
            }
            Err(err) => {
                warn!(error = %err, "push failed (artifacts remain local)");
                PublishOutcome::Failed(err.to_string())
            }
        }
    }

    fn try_commit(&self, message: &str) -> Result<bool> {
        self.git.add_all()?;
        self.git.commit_staged(message)
    }
}
