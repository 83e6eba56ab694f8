//! Pipeline configuration loaded from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Pipeline configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory that receives one workspace per run.
    pub outputs_dir: PathBuf,

    /// Directory holding the process-definition assets (skill and agent
    /// definitions) copied into every workspace.
    pub assets_dir: PathBuf,

    /// Optional override for the embedded tag catalog.
    pub tags_path: Option<PathBuf>,

    /// Minimum number of tags to select when none are supplied.
    pub min_tags: u32,

    /// Maximum number of tags to select when none are supplied.
    pub max_tags: u32,

    /// Create a GitHub repository and commit/push phase artifacts.
    pub publish: bool,

    pub agent: AgentConfig,
    pub refine: RefineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Model passed to the agent CLI. `None` uses the CLI's own default.
    pub model: Option<String>,

    /// Wall-clock budget for a single phase invocation, in seconds.
    pub phase_timeout_secs: u64,

    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefineConfig {
    /// Maximum refinement passes for the implementation phase.
    pub max_iterations: u32,

    /// Wall-clock budget for a single refinement pass, in seconds.
    pub iteration_timeout_secs: u64,

    /// Literal substring in agent output that ends the refinement loop.
    pub completion_marker: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            phase_timeout_secs: 10 * 60,
            output_limit_bytes: 50_000_000,
        }
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            iteration_timeout_secs: 15 * 60,
            completion_marker: "IMPLEMENTATION COMPLETE".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outputs_dir: PathBuf::from("outputs"),
            assets_dir: PathBuf::from(".claude"),
            tags_path: None,
            min_tags: 2,
            max_tags: 5,
            publish: true,
            agent: AgentConfig::default(),
            refine: RefineConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_tags == 0 {
            return Err(anyhow!("min_tags must be >= 1"));
        }
        if self.min_tags > self.max_tags {
            return Err(anyhow!(
                "min_tags ({}) must not exceed max_tags ({})",
                self.min_tags,
                self.max_tags
            ));
        }
        if self.agent.phase_timeout_secs == 0 {
            return Err(anyhow!("agent.phase_timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.refine.max_iterations == 0 {
            return Err(anyhow!("refine.max_iterations must be >= 1"));
        }
        if self.refine.iteration_timeout_secs == 0 {
            return Err(anyhow!("refine.iteration_timeout_secs must be > 0"));
        }
        if self.refine.completion_marker.trim().is_empty() {
            return Err(anyhow!("refine.completion_marker must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
