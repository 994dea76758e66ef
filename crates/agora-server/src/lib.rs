//! # agora-server
//!
//! Thin HTTP surface over the trigger operations:
//!
//! - external cron pingers run scheduled workflows with a bearer secret
//! - chat front-ends hand inbound messages to an agent
//! - operators inspect and pause the scheduler and read run records

use agora_core::AgoraError;
use agora_runtime::{AgoraRuntime, JobStatus, TriggerResponse};
use agora_store::WorkflowRunRecord;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_RUNS: usize = 200;

/// Shared server state.
pub struct AppState {
    pub runtime: AgoraRuntime,
    started: Instant,
}

/// Error body: `{"error": "..."}` with a status derived from the error kind.
pub struct ApiError(AgoraError);

impl From<AgoraError> for ApiError {
    fn from(e: AgoraError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgoraError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AgoraError::UnknownWorkflow(_) | AgoraError::NotFound { .. } => StatusCode::NOT_FOUND,
            AgoraError::InvalidToolInput { .. } | AgoraError::MissingParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
    background_tasks: usize,
}

/// Inbound chat message for an agent.
#[derive(Deserialize)]
struct ChatRequest {
    from: String,
    text: String,
}

#[derive(Serialize)]
struct SchedulerResponse {
    paused: bool,
    enabled: bool,
    jobs: Vec<JobStatus>,
}

#[derive(Deserialize)]
struct RunsParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Build the Axum router.
pub fn build_router(runtime: AgoraRuntime) -> Router {
    let state = Arc::new(AppState {
        runtime,
        started: Instant::now(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/workflows/{key}/run", post(run_workflow_handler))
        .route("/api/v1/agents/{id}/chat", post(chat_handler))
        .route("/api/v1/scheduler", get(scheduler_handler))
        .route("/api/v1/scheduler/pause", post(pause_handler))
        .route("/api/v1/scheduler/resume", post(resume_handler))
        .route("/api/v1/runs", get(runs_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` fires.
pub async fn start_server(
    runtime: AgoraRuntime,
    shutdown: CancellationToken,
) -> agora_core::Result<()> {
    let listen = runtime.config.server.listen.clone();
    let router = build_router(runtime);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| AgoraError::Config(format!("failed to bind {listen}: {e}")))?;
    info!(listen = %listen, "starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.started.elapsed().as_secs(),
        background_tasks: state.runtime.supervisor.in_flight(),
    })
}

async fn run_workflow_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<TriggerResponse> {
    let resp = state
        .runtime
        .triggers
        .run_scheduled(&key, bearer(&headers))
        .await?;
    Ok(Json(resp))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<TriggerResponse> {
    if req.text.trim().is_empty() {
        return Err(AgoraError::InvalidToolInput {
            tool: "chat".into(),
            reason: "text must not be empty".into(),
        }
        .into());
    }
    let resp = state
        .runtime
        .triggers
        .receive_message(&req.from, &agent_id, &req.text)
        .await?;
    Ok(Json(resp))
}

async fn scheduler_handler(State(state): State<Arc<AppState>>) -> ApiResult<SchedulerResponse> {
    let scheduler = &state.runtime.scheduler;
    Ok(Json(SchedulerResponse {
        paused: scheduler.is_paused()?,
        enabled: scheduler.config().enabled,
        jobs: scheduler.job_states(),
    }))
}

async fn pause_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    state.runtime.triggers.check_secret(bearer(&headers))?;
    state.runtime.scheduler.pause()?;
    Ok(Json(json!({ "paused": true })))
}

async fn resume_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    state.runtime.triggers.check_secret(bearer(&headers))?;
    state.runtime.scheduler.resume()?;
    Ok(Json(json!({ "paused": false })))
}

async fn runs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunsParams>,
) -> ApiResult<Vec<WorkflowRunRecord>> {
    let runs = state
        .runtime
        .store
        .recent_runs(params.limit.clamp(1, MAX_RUNS))?;
    Ok(Json(runs))
}
