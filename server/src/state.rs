//! Shared server state: the run lock and the last run's result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pipeline::config::PipelineConfig;
use pipeline::pipeline::RunResult;

/// State shared by all request handlers.
///
/// The pipeline core holds no locks of its own; this is the one exclusive
/// lease that keeps runs from overlapping. Handlers acquire it through
/// [`AppState::begin_run`]; the returned guard releases it on drop, so a
/// panicking run cannot wedge the server.
pub struct AppState {
    pub config: PipelineConfig,
    /// Bearer secret required on every request when set.
    pub secret: Option<String>,
    running: AtomicBool,
    last_result: Mutex<Option<RunResult>>,
}

impl AppState {
    pub fn new(config: PipelineConfig, secret: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            config,
            secret,
            running: AtomicBool::new(false),
            last_result: Mutex::new(None),
        })
    }

    /// Acquire the exclusive run lease. Returns `None` while a run is live.
    pub fn begin_run(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                state: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_result(&self) -> Option<RunResult> {
        self.last_result.lock().expect("last_result lock").clone()
    }

    pub fn store_result(&self, result: RunResult) {
        *self.last_result.lock().expect("last_result lock") = Some(result);
    }
}

/// Exclusive lease for one pipeline run.
pub struct RunGuard {
    state: Arc<AppState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
    }
}
