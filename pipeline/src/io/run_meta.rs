//! Durable run metadata (`<workspace>/meta.json`).
//!
//! The orchestrator persists metadata after every phase transition so an
//! external observer can inspect in-flight state. Writes are atomic (temp
//! file + rename); the orchestrator is the only writer for a run's lifetime.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::phase::Phase;

/// Completion record for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One record per pipeline phase, serialized in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseLedger {
    pub creative_director: PhaseRecord,
    pub design_lead_guides: PhaseRecord,
    pub cd_review: PhaseRecord,
    pub design_lead_dispatch: PhaseRecord,
    pub dl_review: PhaseRecord,
    pub implement: PhaseRecord,
}

impl PhaseLedger {
    pub fn record(&self, phase: Phase) -> &PhaseRecord {
        match phase {
            Phase::CreativeDirector => &self.creative_director,
            Phase::DesignLeadGuides => &self.design_lead_guides,
            Phase::CdReview => &self.cd_review,
            Phase::DesignLeadDispatch => &self.design_lead_dispatch,
            Phase::DlReview => &self.dl_review,
            Phase::Implement => &self.implement,
        }
    }

    pub fn record_mut(&mut self, phase: Phase) -> &mut PhaseRecord {
        match phase {
            Phase::CreativeDirector => &mut self.creative_director,
            Phase::DesignLeadGuides => &mut self.design_lead_guides,
            Phase::CdReview => &mut self.cd_review,
            Phase::DesignLeadDispatch => &mut self.design_lead_dispatch,
            Phase::DlReview => &mut self.dl_review,
            Phase::Implement => &mut self.implement,
        }
    }

    /// True when every phase has completed.
    pub fn all_completed(&self) -> bool {
        Phase::ALL.iter().all(|phase| self.record(*phase).completed)
    }
}

/// Persisted bookkeeping for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Run date, `YYYY-MM-DD`.
    pub date: String,
    /// Selected tag names in selection order.
    pub tags: Vec<String>,
    /// RFC 3339 timestamp set at run start.
    pub started_at: String,
    /// RFC 3339 timestamp set once the final phase completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Canonical remote URL, set once repository creation succeeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    pub phases: PhaseLedger,
    pub success: bool,
}

impl RunMetadata {
    pub fn new(date: String, tags: Vec<String>, started_at: String) -> Self {
        Self {
            date,
            tags,
            started_at,
            completed_at: None,
            repo_url: None,
            phases: PhaseLedger::default(),
            success: false,
        }
    }
}

/// Load run metadata from disk.
pub fn load_run_meta(path: &Path) -> Result<RunMetadata> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run metadata {}", path.display()))?;
    let meta: RunMetadata = serde_json::from_str(&contents)
        .with_context(|| format!("parse run metadata {}", path.display()))?;
    Ok(meta)
}

/// Atomically write run metadata to disk (temp file + rename).
pub fn write_run_meta(path: &Path, meta: &RunMetadata) -> Result<()> {
    debug!(path = %path.display(), success = meta.success, "writing run metadata");
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("metadata path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp metadata {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace metadata {}", path.display()))?;
    Ok(())
}
