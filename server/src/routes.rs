//! Webhook routes: start a run, report status, health check.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use pipeline::io::agent::ClaudeInvoker;
use pipeline::io::publish::GhRemote;
use pipeline::pipeline::{RunRequest, RunResult, run_pipeline, validate_request};
use pipeline::tags::TagSelection;

use crate::state::AppState;

/// `POST /webhook/run` body (external field names).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub tags: Option<Vec<String>>,
    pub min_tags: Option<u32>,
    pub max_tags: Option<u32>,
    pub create_repo: Option<bool>,
}

impl WebhookBody {
    pub fn into_run_request(self) -> RunRequest {
        RunRequest {
            tags: self.tags,
            min_tags: self.min_tags,
            max_tags: self.max_tags,
            publish: self.create_repo,
        }
    }
}

/// Summary of a finished run, as exposed by `/status` and 409 responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultSummary {
    success: bool,
    date: String,
    tags: Vec<String>,
    output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResultSummary {
    fn from_result(result: &RunResult) -> Self {
        Self {
            success: result.success,
            date: result.date.clone(),
            tags: result.tags.names(),
            output_dir: result.output_dir.display().to_string(),
            repo_url: result.repo_url.clone(),
            error: result.error.clone(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/run", post(run_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .with_state(state)
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !is_authorized(state.secret.as_deref(), authorization) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Bearer check: a configured secret must match exactly; no secret means
/// auth is disabled.
pub fn is_authorized(secret: Option<&str>, authorization: Option<&str>) -> bool {
    match secret {
        None => true,
        Some(secret) => {
            let expected = format!("Bearer {secret}");
            authorization == Some(expected.as_str())
        }
    }
}

/// Start a pipeline run, rejecting overlap with `409`.
///
/// The run executes on a blocking task; the response returns immediately
/// with `202`.
async fn run_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: WebhookBody = if body.is_empty() {
        WebhookBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("invalid request body: {err}") })),
                )
                    .into_response();
            }
        }
    };
    let request = body.into_run_request();

    if let Err(err) = validate_request(&state.config, &request) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response();
    }

    let Some(guard) = state.begin_run() else {
        let last = state
            .last_result()
            .map(|result| json!({ "date": result.date, "tags": result.tags.names() }));
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Pipeline already running",
                "lastResult": last,
            })),
        )
            .into_response();
    };

    let requested_tags = request
        .tags
        .clone()
        .map(|tags| json!(tags))
        .unwrap_or_else(|| json!("random"));
    info!(tags = %requested_tags, "pipeline run accepted");

    let task_state = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        // The guard lives for the whole run; dropping it releases the lease.
        let _guard = guard;
        let result = run_pipeline(&task_state.config, &request, &ClaudeInvoker, &GhRemote)
            .unwrap_or_else(|err| {
                error!(error = %err, "pipeline setup failed");
                setup_failure_result(&err)
            });
        info!(success = result.success, "pipeline run finished");
        task_state.store_result(result);
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Pipeline started",
            "tags": requested_tags,
        })),
    )
        .into_response()
}

/// Result placeholder for runs that failed before a workspace existed.
fn setup_failure_result(err: &anyhow::Error) -> RunResult {
    RunResult {
        success: false,
        date: Utc::now().format("%Y-%m-%d").to_string(),
        tags: TagSelection::from_names(&[]),
        output_dir: std::path::PathBuf::new(),
        phases: Default::default(),
        repo_url: None,
        error: Some(format!("{err:#}")),
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    let last = state.last_result().map(|r| ResultSummary::from_result(&r));
    Json(json!({
        "isRunning": state.is_running(),
        "lastResult": last,
    }))
    .into_response()
}

async fn health_handler() -> Response {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_disabled_without_secret() {
        assert!(is_authorized(None, None));
        assert!(is_authorized(None, Some("Bearer anything")));
    }

    #[test]
    fn auth_requires_exact_bearer_token() {
        assert!(is_authorized(Some("s3cret"), Some("Bearer s3cret")));
        assert!(!is_authorized(Some("s3cret"), Some("Bearer wrong")));
        assert!(!is_authorized(Some("s3cret"), Some("s3cret")));
        assert!(!is_authorized(Some("s3cret"), None));
    }

    #[test]
    fn webhook_body_maps_external_names() {
        let body: WebhookBody = serde_json::from_str(
            r#"{ "tags": ["Roguelike"], "minTags": 2, "maxTags": 4, "createRepo": false }"#,
        )
        .expect("parse");
        let request = body.into_run_request();
        assert_eq!(request.tags, Some(vec!["Roguelike".to_string()]));
        assert_eq!(request.min_tags, Some(2));
        assert_eq!(request.max_tags, Some(4));
        assert_eq!(request.publish, Some(false));
    }

    #[test]
    fn empty_webhook_body_uses_defaults() {
        let request = WebhookBody::default().into_run_request();
        assert_eq!(request, RunRequest::default());
    }
}
