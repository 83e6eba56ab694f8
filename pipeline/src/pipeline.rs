//! Orchestration for one full pipeline run.
//!
//! A run walks the six phases strictly in order, checkpointing each phase
//! to durable metadata before the next begins. The first phase failure
//! halts the run (no retries, no rollback); everything produced so far is
//! preserved for inspection. Publishing is interposed around the phase
//! sequence: repository creation right after phase 1, one commit per later
//! phase, a single push at the end.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::io::agent::{AgentInvoker, InvokeOutcome, InvokeRequest};
use crate::io::publish::{RemoteHost, RepoPublisher};
use crate::io::run_meta::{RunMetadata, write_run_meta};
use crate::io::workspace::{
    WorkspacePaths, copy_process_assets, create_workspace, write_onboarding_doc,
};
use crate::phase::Phase;
use crate::prompt::{PromptBuilder, PromptInputs};
use crate::refine::{RefineRequest, run_refinement};
use crate::tags::{TagSelection, load_catalog, select_tags};

/// Per-run options, overriding the config's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunRequest {
    /// Pre-selected tag names; bypasses random selection when non-empty.
    pub tags: Option<Vec<String>>,
    pub min_tags: Option<u32>,
    pub max_tags: Option<u32>,
    pub publish: Option<bool>,
}

/// Outcome of one phase, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-phase outcomes; phases never attempted stay absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutcomes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_director: Option<PhaseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_lead_guides: Option<PhaseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd_review: Option<PhaseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_lead_dispatch: Option<PhaseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_review: Option<PhaseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implement: Option<PhaseOutcome>,
}

impl PhaseOutcomes {
    pub fn get(&self, phase: Phase) -> Option<&PhaseOutcome> {
        match phase {
            Phase::CreativeDirector => self.creative_director.as_ref(),
            Phase::DesignLeadGuides => self.design_lead_guides.as_ref(),
            Phase::CdReview => self.cd_review.as_ref(),
            Phase::DesignLeadDispatch => self.design_lead_dispatch.as_ref(),
            Phase::DlReview => self.dl_review.as_ref(),
            Phase::Implement => self.implement.as_ref(),
        }
    }

    fn set(&mut self, phase: Phase, outcome: PhaseOutcome) {
        let slot = match phase {
            Phase::CreativeDirector => &mut self.creative_director,
            Phase::DesignLeadGuides => &mut self.design_lead_guides,
            Phase::CdReview => &mut self.cd_review,
            Phase::DesignLeadDispatch => &mut self.design_lead_dispatch,
            Phase::DlReview => &mut self.dl_review,
            Phase::Implement => &mut self.implement,
        };
        *slot = Some(outcome);
    }
}

/// Result of one pipeline run, returned to the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub date: String,
    pub tags: TagSelection,
    pub output_dir: std::path::PathBuf,
    pub phases: PhaseOutcomes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    /// First fatal cause when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run the full pipeline.
///
/// Setup failures (bad bounds, unreadable catalog, unwritable workspace)
/// surface as `Err`; phase failures are part of the returned [`RunResult`].
#[instrument(skip_all)]
pub fn run_pipeline<I: AgentInvoker, H: RemoteHost>(
    config: &PipelineConfig,
    request: &RunRequest,
    invoker: &I,
    remote: &H,
) -> Result<RunResult> {
    config.validate()?;
    let min_tags = request.min_tags.unwrap_or(config.min_tags);
    let max_tags = request.max_tags.unwrap_or(config.max_tags);
    let mut publish = request.publish.unwrap_or(config.publish);

    // Step 1: resolve the tag set.
    let tags = match &request.tags {
        Some(names) if !names.is_empty() => TagSelection::from_names(names),
        _ => {
            let catalog = load_catalog(config.tags_path.as_deref())?;
            select_tags(&catalog, min_tags, max_tags)?
        }
    };
    let tag_names = tags.names();
    let date = Utc::now().format("%Y-%m-%d").to_string();
    info!(count = tags.count, tags = ?tag_names, "tags selected");

    // Step 2: workspace and durable metadata.
    let paths = WorkspacePaths::new(&config.outputs_dir, &date, &tag_names);
    create_workspace(&paths)?;
    info!(workspace = %paths.root.display(), "workspace created");

    let mut meta = RunMetadata::new(date.clone(), tag_names.clone(), Utc::now().to_rfc3339());
    write_run_meta(&paths.meta_path, &meta)?;

    // Step 3: process assets and onboarding document.
    copy_process_assets(&config.assets_dir, &paths)?;
    write_onboarding_doc(&paths, &tag_names, &date)?;

    let mut publisher = RepoPublisher::new(&paths.root, remote);
    let prompt_builder = PromptBuilder::new();
    let prompt_inputs = PromptInputs {
        tags: tag_names.clone(),
        workspace: paths.root.display().to_string(),
        completion_marker: config.refine.completion_marker.clone(),
    };

    let mut result = RunResult {
        success: false,
        date: date.clone(),
        tags,
        output_dir: paths.root.clone(),
        phases: PhaseOutcomes::default(),
        repo_url: None,
        error: None,
    };

    for phase in Phase::ALL {
        info!(phase = phase.key(), "{} starting", phase.display_name());
        let prompt = prompt_builder.build(phase, &prompt_inputs);

        let outcome = if phase.uses_refinement() {
            run_phase_with_refinement(config, invoker, &paths, &prompt, phase)?
        } else {
            invoker
                .invoke(&InvokeRequest {
                    workdir: paths.root.clone(),
                    prompt,
                    max_turns: phase.max_turns(),
                    model: config.agent.model.clone(),
                    timeout: Duration::from_secs(config.agent.phase_timeout_secs),
                    output_limit_bytes: config.agent.output_limit_bytes,
                })
                .with_context(|| format!("invoke agent for {}", phase.display_name()))?
        };

        result.phases.set(
            phase,
            PhaseOutcome {
                success: outcome.success,
                error: outcome.error.clone(),
            },
        );

        if !outcome.success {
            let cause = outcome
                .error
                .unwrap_or_else(|| "agent reported failure".to_string());
            warn!(phase = phase.key(), error = %cause, "phase failed, halting run");
            meta.phases.record_mut(phase).error = Some(cause.clone());
            write_run_meta(&paths.meta_path, &meta)?;
            result.error = Some(format!("{} failed: {cause}", phase.display_name()));
            return Ok(result);
        }

        // Checkpoint before anything else can observe the next phase.
        meta.phases.record_mut(phase).completed = true;
        write_run_meta(&paths.meta_path, &meta)?;
        info!(phase = phase.key(), "{} completed", phase.display_name());

        if phase == Phase::CreativeDirector && publish {
            match publisher.create_repository(&paths, &date) {
                Ok(url) => {
                    meta.repo_url = Some(url.clone());
                    result.repo_url = Some(url);
                    write_run_meta(&paths.meta_path, &meta)?;
                }
                Err(err) => {
                    warn!(error = %err, "repository creation failed, continuing locally");
                    publish = false;
                }
            }
        } else if publish && publisher.active() {
            publisher.commit_phase(phase);
            if phase == Phase::Implement {
                publisher.push_all();
            }
        }
    }

    meta.completed_at = Some(Utc::now().to_rfc3339());
    meta.success = true;
    write_run_meta(&paths.meta_path, &meta)?;

    result.success = true;
    info!(workspace = %paths.root.display(), "pipeline completed");
    Ok(result)
}

fn run_phase_with_refinement<I: AgentInvoker>(
    config: &PipelineConfig,
    invoker: &I,
    paths: &WorkspacePaths,
    prompt: &str,
    phase: Phase,
) -> Result<InvokeOutcome> {
    let outcome = run_refinement(
        invoker,
        &RefineRequest {
            workdir: paths.root.clone(),
            loop_state_path: paths.loop_state_path.clone(),
            prompt: prompt.to_string(),
            max_turns: phase.max_turns(),
            model: config.agent.model.clone(),
            iteration_timeout: Duration::from_secs(config.refine.iteration_timeout_secs),
            output_limit_bytes: config.agent.output_limit_bytes,
            max_iterations: config.refine.max_iterations,
            completion_marker: config.refine.completion_marker.clone(),
        },
    )
    .with_context(|| format!("refinement loop for {}", phase.display_name()))?;

    if outcome.invocation.success && !outcome.converged {
        warn!(
            iterations = outcome.iterations,
            "refinement finished without completion marker"
        );
    }
    Ok(outcome.invocation)
}

/// Validate per-request bounds before accepting a run.
///
/// The service boundary calls this to reject malformed webhook payloads
/// early, before a workspace exists.
pub fn validate_request(config: &PipelineConfig, request: &RunRequest) -> Result<()> {
    let min = request.min_tags.unwrap_or(config.min_tags);
    let max = request.max_tags.unwrap_or(config.max_tags);
    if min == 0 {
        return Err(anyhow!("minTags must be >= 1"));
    }
    if min > max {
        return Err(anyhow!("minTags ({min}) must not exceed maxTags ({max})"));
    }
    if let Some(tags) = &request.tags
        && tags.iter().any(|t| t.trim().is_empty())
    {
        return Err(anyhow!("tags must not contain empty names"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::run_meta::load_run_meta;
    use crate::test_support::{ScriptedInvoker, StaticRemote, init_repo_identity, test_config};

    fn preselected(tags: &[&str]) -> RunRequest {
        RunRequest {
            tags: Some(tags.iter().map(|s| s.to_string()).collect()),
            publish: Some(false),
            ..RunRequest::default()
        }
    }

    fn six_successes() -> Vec<InvokeOutcome> {
        let mut outcomes = vec![InvokeOutcome::ok("ok"); 5];
        outcomes.push(InvokeOutcome::ok(
            "<promise>IMPLEMENTATION COMPLETE</promise>",
        ));
        outcomes
    }

    #[test]
    fn all_phases_succeed_without_publishing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let invoker = ScriptedInvoker::new(six_successes());
        let remote = StaticRemote::accepting();

        let result = run_pipeline(
            &config,
            &preselected(&["Roguelike", "Cooking"]),
            &invoker,
            &remote,
        )
        .expect("run");

        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.repo_url.is_none());
        assert!(remote.attempts().is_empty(), "publish=false must not touch the remote");
        assert_eq!(invoker.invocation_count(), 6);
        for phase in Phase::ALL {
            let outcome = result.phases.get(phase).expect("phase attempted");
            assert!(outcome.success, "{phase:?} should succeed");
        }
        assert!(
            result
                .output_dir
                .to_string_lossy()
                .ends_with("roguelike_cooking")
        );

        let meta = load_run_meta(&result.output_dir.join("meta.json")).expect("meta");
        assert!(meta.success);
        assert!(meta.completed_at.is_some());
        assert!(meta.phases.all_completed());
    }

    /// Phase 2 failure: earlier phases completed, later phases untouched,
    /// the run error names the phase, and no further invocation happens.
    #[test]
    fn phase_failure_halts_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let invoker = ScriptedInvoker::new(vec![
            InvokeOutcome::ok("proposal written"),
            InvokeOutcome::failed("", "timeout"),
        ]);
        let remote = StaticRemote::accepting();

        let result = run_pipeline(
            &config,
            &preselected(&["Roguelike", "Cooking"]),
            &invoker,
            &remote,
        )
        .expect("run");

        assert!(!result.success);
        let error = result.error.as_deref().expect("run error");
        assert!(error.contains("Phase 2"), "got: {error}");
        assert_eq!(invoker.invocation_count(), 2, "no phase after the failure");

        assert!(result.phases.get(Phase::CreativeDirector).expect("p1").success);
        let failed = result.phases.get(Phase::DesignLeadGuides).expect("p2");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
        for phase in [
            Phase::CdReview,
            Phase::DesignLeadDispatch,
            Phase::DlReview,
            Phase::Implement,
        ] {
            assert!(result.phases.get(phase).is_none(), "{phase:?} attempted");
        }

        let meta = load_run_meta(&result.output_dir.join("meta.json")).expect("meta");
        assert!(!meta.success);
        assert!(meta.phases.record(Phase::CreativeDirector).completed);
        let record = meta.phases.record(Phase::DesignLeadGuides);
        assert!(!record.completed);
        assert_eq!(record.error.as_deref(), Some("timeout"));
        assert!(!meta.phases.record(Phase::CdReview).completed);
    }

    /// Repository creation failure disables publishing but the run continues.
    #[test]
    fn repo_creation_failure_continues_locally() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let invoker = ScriptedInvoker::new(six_successes());
        // Both the first attempt and the date-suffixed retry are rejected.
        let remote = StaticRemote::rejecting(2);

        // Seed an identity at the deterministic workspace path so the
        // initial commit succeeds and the rejection is what gets exercised.
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let paths = crate::io::workspace::WorkspacePaths::new(
            &config.outputs_dir,
            &date,
            &["Puzzle".to_string()],
        );
        init_repo_identity(&paths.root).expect("seed identity");

        let request = RunRequest {
            tags: Some(vec!["Puzzle".to_string()]),
            publish: Some(true),
            ..RunRequest::default()
        };
        let result = run_pipeline(&config, &request, &invoker, &remote).expect("run");

        assert!(result.success, "run must survive publish failure");
        assert!(result.repo_url.is_none());
        assert_eq!(remote.attempts().len(), 2, "exactly one collision retry");
        assert_eq!(invoker.invocation_count(), 6);
    }

    #[test]
    fn request_validation_rejects_bad_bounds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let request = RunRequest {
            min_tags: Some(4),
            max_tags: Some(2),
            ..RunRequest::default()
        };
        let err = validate_request(&config, &request).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }
}
