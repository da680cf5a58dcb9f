//! HTTP API: agent task control and event streaming.
//! Run/stream a task, stop/pause/resume it, and query its status.

use crate::agent::router::dispatch;
use crate::agent::types::{AgentEvent, TaskRequest};
use crate::error::PipelineError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::sse::{Event, Sse},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

pub type ApiState = Arc<AppState>;

/// API key authentication middleware.
/// Skips authentication for GET /api/health so clients can probe the server.
async fn api_key_auth(
    axum::extract::State(expected_key): axum::extract::State<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(k) if k == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root_status))
        .route("/agent/run", post(run_agent))
        .route("/agent/stream", post(stream_agent))
        .route("/agent/stop", post(stop_agent))
        .route("/agent/pause", post(pause_agent))
        .route("/agent/resume", post(resume_agent))
        .route("/agent/status", get(agent_status))
        .route("/test-api-key", post(test_api_key))
        .route("/api/health", get(health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn root_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "skipper backend running" }))
}

// ---------------------------------------------------------------------------
// Task execution
// ---------------------------------------------------------------------------

const MISSING_KEY_MESSAGE: &str = "Model API key not found. Please add it in Settings.";

/// Synchronous task execution: runs the pipeline to completion and returns
/// only the final outcome. Registers a control context so stop/pause work
/// against it too.
async fn run_agent(
    State(state): State<ApiState>,
    Json(task): Json<TaskRequest>,
) -> Json<serde_json::Value> {
    let api_key = match state.resolve_api_key(task.api_key.as_deref()) {
        Some(key) => key,
        None => {
            tracing::error!("No API key provided in request, config, or environment");
            return Json(serde_json::json!({
                "status": "error",
                "message": MISSING_KEY_MESSAGE,
            }));
        }
    };

    let (task_id, control) = state.controls.register();
    // The synchronous variant reports no progress
    let on_step: crate::agent::engine::StepCallback =
        Arc::new(|_step: u32, _payload: &serde_json::Value| {});
    let outcome = state
        .pipeline
        .run(
            &task.instruction,
            &task.cdp_url,
            task.target_id.as_deref(),
            &api_key,
            on_step,
            control,
        )
        .await;
    state.controls.finish(&task_id);

    match outcome {
        Ok(result) => Json(serde_json::json!({ "status": "success", "result": result })),
        Err(PipelineError::Interrupted) => Json(serde_json::json!({
            "status": "stopped",
            "result": "Agent stopped by user",
        })),
        Err(e) => {
            tracing::error!("Agent task failed: {}", e);
            Json(serde_json::json!({ "status": "error", "message": e.to_string() }))
        }
    }
}

fn sse_event(event: &AgentEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","message":"event serialization failed"}"#.to_string()
    }))
}

/// SSE streaming endpoint that classifies intent and routes accordingly.
///
/// Fast path: a direct CDP command for simple navigation. Complex path: the
/// full pipeline with step-by-step progress, driven by the stream supervisor.
async fn stream_agent(
    State(state): State<ApiState>,
    Json(task): Json<TaskRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let api_key = state.resolve_api_key(task.api_key.as_deref());

    let stream = async_stream::stream! {
        match api_key {
            None => {
                tracing::error!("Stream request rejected: no API key found");
                yield Ok(sse_event(&AgentEvent::Error {
                    message: MISSING_KEY_MESSAGE.to_string(),
                }));
            }
            Some(key) => {
                let events = dispatch(state.clone(), task, key);
                futures::pin_mut!(events);
                while let Some(event) = events.next().await {
                    yield Ok(sse_event(&event));
                }
            }
        }
    };

    Sse::new(stream)
}

// ---------------------------------------------------------------------------
// Task control
// ---------------------------------------------------------------------------

/// Optional body for control endpoints; omitting it targets the most
/// recently started task.
#[derive(serde::Deserialize, Default)]
struct ControlTarget {
    task_id: Option<String>,
}

async fn stop_agent(
    State(state): State<ApiState>,
    body: Option<Json<ControlTarget>>,
) -> Json<serde_json::Value> {
    let target = body.map(|Json(t)| t).unwrap_or_default();
    if let Some(control) = state.controls.resolve(target.task_id.as_deref()) {
        control.stop();
    }
    Json(serde_json::json!({ "status": "ok", "message": "Stop requested" }))
}

async fn pause_agent(
    State(state): State<ApiState>,
    body: Option<Json<ControlTarget>>,
) -> Json<serde_json::Value> {
    let target = body.map(|Json(t)| t).unwrap_or_default();
    if let Some(control) = state.controls.resolve(target.task_id.as_deref()) {
        control.pause();
    }
    Json(serde_json::json!({ "status": "ok", "paused": true }))
}

async fn resume_agent(
    State(state): State<ApiState>,
    body: Option<Json<ControlTarget>>,
) -> Json<serde_json::Value> {
    let target = body.map(|Json(t)| t).unwrap_or_default();
    if let Some(control) = state.controls.resolve(target.task_id.as_deref()) {
        control.resume();
    }
    Json(serde_json::json!({ "status": "ok", "paused": false }))
}

async fn agent_status(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (running, paused) = match state.controls.resolve(None) {
        Some(control) => (control.is_running(), control.is_paused()),
        None => (false, false),
    };
    Json(serde_json::json!({ "running": running, "paused": paused }))
}

// ---------------------------------------------------------------------------
// Credential check
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct TestApiKeyRequest {
    api_key: String,
}

/// Test whether a model API key is valid by making a minimal call.
async fn test_api_key(
    State(state): State<ApiState>,
    Json(request): Json<TestApiKeyRequest>,
) -> Json<serde_json::Value> {
    let (base_url, model) = {
        let config = state.config.read();
        (config.agent.base_url.clone(), config.agent.model.clone())
    };
    let llm = crate::agent::llm::LlmClient::new(&base_url, &request.api_key, &model);
    let messages = vec![crate::agent::types::ChatMessage::new("user", "test")];

    match llm.complete(&messages).await {
        Ok(_) => Json(serde_json::json!({ "status": "success", "valid": true })),
        Err(e) => {
            tracing::error!("API key test failed: {}", e);
            Json(serde_json::json!({
                "status": "error",
                "valid": false,
                "message": e,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Build the full API app (router + optional API key auth + CORS).
/// Used by run_server and by integration tests.
pub fn app(state: ApiState, api_key: Option<String>) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    let base_router = router(state);
    if let Some(key) = api_key {
        base_router.route_layer(middleware::from_fn_with_state(key, api_key_auth))
    } else {
        base_router
    }
    .layer(ConcurrencyLimitLayer::new(32))
    .layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static("x-api-key"),
            ]),
    )
}

pub async fn run_server(
    state: ApiState,
    host: &str,
    port: u16,
    api_key: Option<String>,
) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .map_err(|e| format!("Failed to bind API port {}: {}", port, e))?;
    let app = app(state, api_key);
    tracing::info!("Skipper API listening on http://{}:{}", host, port);
    axum::serve(listener, app).await.map_err(|e| e.to_string())?;
    Ok(())
}
