//! Bounded refinement loop for the implementation phase.
//!
//! Instead of delegating iteration to an out-of-process supervisor, the
//! controller re-invokes the agent with the same instruction until its
//! output contains the completion marker or the iteration budget runs out.
//! Each pass gets the fixed per-iteration timeout, so the total wall-clock
//! budget is `max_iterations x iteration_timeout`.
//!
//! A descriptor file records the loop state on disk while the phase runs
//! (see [`crate::io::loop_state`]); it is removed on every exit path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::io::agent::{AgentInvoker, InvokeOutcome, InvokeRequest};
use crate::io::loop_state::{LoopDescriptor, clear_loop_state, write_loop_state};

/// Parameters for one refinement loop.
#[derive(Debug, Clone)]
pub struct RefineRequest {
    /// Workspace root (the agent's working directory).
    pub workdir: PathBuf,
    /// Descriptor file location.
    pub loop_state_path: PathBuf,
    /// Instruction repeated on every pass.
    pub prompt: String,
    /// Agent turn budget per pass.
    pub max_turns: u32,
    /// Model override for the agent CLI.
    pub model: Option<String>,
    /// Wall-clock budget per pass.
    pub iteration_timeout: Duration,
    pub output_limit_bytes: usize,
    /// Maximum number of passes.
    pub max_iterations: u32,
    /// Output substring that ends the loop.
    pub completion_marker: String,
}

/// Result of a refinement loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineOutcome {
    /// Passes actually executed (1-indexed count).
    pub iterations: u32,
    /// True when the completion marker was observed.
    pub converged: bool,
    /// The final pass's invocation outcome; its `success` decides the phase.
    pub invocation: InvokeOutcome,
}

/// Run the refinement loop to completion.
///
/// The loop stops on the first failed invocation (fail-fast, reported
/// through the returned outcome), on the completion marker, or when the
/// iteration budget is exhausted. Exhaustion without the marker is not a
/// failure: the last clean pass stands, with a warning logged.
#[instrument(skip_all, fields(max_iterations = request.max_iterations))]
pub fn run_refinement<I: AgentInvoker>(invoker: &I, request: &RefineRequest) -> Result<RefineOutcome> {
    let result = run_passes(invoker, request);

    // The descriptor must not outlive the loop, whatever happened inside.
    let cleared = clear_loop_state(&request.loop_state_path);

    let outcome = result?;
    match cleared {
        Ok(last) => info!(last_iteration = ?last, "refinement loop state cleared"),
        Err(err) => return Err(err),
    }
    Ok(outcome)
}

fn run_passes<I: AgentInvoker>(invoker: &I, request: &RefineRequest) -> Result<RefineOutcome> {
    let started_at = Utc::now().to_rfc3339();
    let mut last: Option<InvokeOutcome> = None;

    for iteration in 1..=request.max_iterations {
        write_loop_state(
            &request.loop_state_path,
            &LoopDescriptor {
                iteration,
                max_iterations: request.max_iterations,
                completion_marker: request.completion_marker.clone(),
                started_at: started_at.clone(),
            },
            &request.prompt,
        )?;

        info!(iteration, "refinement pass starting");
        let outcome = invoker.invoke(&InvokeRequest {
            workdir: request.workdir.clone(),
            prompt: request.prompt.clone(),
            max_turns: request.max_turns,
            model: request.model.clone(),
            timeout: request.iteration_timeout,
            output_limit_bytes: request.output_limit_bytes,
        })?;

        if !outcome.success {
            warn!(iteration, error = ?outcome.error, "refinement pass failed");
            return Ok(RefineOutcome {
                iterations: iteration,
                converged: false,
                invocation: outcome,
            });
        }

        if outcome.output.contains(&request.completion_marker) {
            info!(iteration, "completion marker observed");
            return Ok(RefineOutcome {
                iterations: iteration,
                converged: true,
                invocation: outcome,
            });
        }

        last = Some(outcome);
    }

    warn!(
        max_iterations = request.max_iterations,
        "iteration budget exhausted without completion marker"
    );
    let invocation = last.ok_or_else(|| anyhow!("refinement requires max_iterations >= 1"))?;
    Ok(RefineOutcome {
        iterations: request.max_iterations,
        converged: false,
        invocation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::loop_state::read_iteration;
    use std::cell::RefCell;
    use std::path::Path;

    /// Invoker that replays queued outcomes and snapshots the descriptor's
    /// iteration field at each call.
    struct LoopProbe {
        outcomes: RefCell<Vec<InvokeOutcome>>,
        seen_iterations: RefCell<Vec<Option<u32>>>,
        loop_state_path: PathBuf,
    }

    impl LoopProbe {
        fn new(loop_state_path: &Path, outcomes: Vec<InvokeOutcome>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes),
                seen_iterations: RefCell::new(Vec::new()),
                loop_state_path: loop_state_path.to_path_buf(),
            }
        }
    }

    impl AgentInvoker for LoopProbe {
        fn invoke(&self, _request: &InvokeRequest) -> Result<InvokeOutcome> {
            self.seen_iterations
                .borrow_mut()
                .push(read_iteration(&self.loop_state_path).expect("read descriptor"));
            let mut outcomes = self.outcomes.borrow_mut();
            assert!(!outcomes.is_empty(), "invoked more often than scripted");
            Ok(outcomes.remove(0))
        }
    }

    fn request(root: &Path, max_iterations: u32) -> RefineRequest {
        RefineRequest {
            workdir: root.to_path_buf(),
            loop_state_path: root.join("refine-loop.local.md"),
            prompt: "Build the game.".to_string(),
            max_turns: 50,
            model: None,
            iteration_timeout: Duration::from_secs(60),
            output_limit_bytes: 10_000,
            max_iterations,
            completion_marker: "IMPLEMENTATION COMPLETE".to_string(),
        }
    }

    #[test]
    fn loop_stops_when_marker_appears() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), 5);
        let invoker = LoopProbe::new(
            &req.loop_state_path,
            vec![
                InvokeOutcome::ok("still working"),
                InvokeOutcome::ok("done <promise>IMPLEMENTATION COMPLETE</promise>"),
            ],
        );

        let outcome = run_refinement(&invoker, &req).expect("refine");
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.converged);
        assert!(outcome.invocation.success);
        assert_eq!(
            invoker.seen_iterations.borrow().as_slice(),
            [Some(1), Some(2)],
            "descriptor should track the running pass"
        );
        assert!(!req.loop_state_path.exists());
    }

    /// Budget exhaustion without the marker is a clean finish, not a failure.
    #[test]
    fn loop_exhausts_budget_without_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), 3);
        let invoker = LoopProbe::new(
            &req.loop_state_path,
            vec![
                InvokeOutcome::ok("pass 1"),
                InvokeOutcome::ok("pass 2"),
                InvokeOutcome::ok("pass 3"),
            ],
        );

        let outcome = run_refinement(&invoker, &req).expect("refine");
        assert_eq!(outcome.iterations, 3);
        assert!(!outcome.converged);
        assert!(outcome.invocation.success);
        assert!(!req.loop_state_path.exists());
    }

    #[test]
    fn loop_fails_fast_on_invocation_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), 5);
        let invoker = LoopProbe::new(
            &req.loop_state_path,
            vec![InvokeOutcome::failed("partial", "timeout")],
        );

        let outcome = run_refinement(&invoker, &req).expect("refine");
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.converged);
        assert!(!outcome.invocation.success);
        assert_eq!(outcome.invocation.error.as_deref(), Some("timeout"));
        assert!(!req.loop_state_path.exists(), "descriptor must be cleared on failure");
    }

    /// The descriptor never survives the loop, even when the invoker errors
    /// at the process level.
    #[test]
    fn descriptor_cleared_when_invoker_errors() {
        struct BrokenInvoker;
        impl AgentInvoker for BrokenInvoker {
            fn invoke(&self, _request: &InvokeRequest) -> Result<InvokeOutcome> {
                Err(anyhow::anyhow!("spawn failed"))
            }
        }

        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), 5);
        let err = run_refinement(&BrokenInvoker, &req).unwrap_err();
        assert!(err.to_string().contains("spawn failed"));
        assert!(!req.loop_state_path.exists());
    }
}
