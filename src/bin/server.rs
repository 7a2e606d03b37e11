//! IQIDE HTTP 服务
//!
//! 启动: cargo run --bin iqide-server --features server
//! 监听地址取 [server].bind，可用 IQIDE_BIND 覆盖。

#![cfg(feature = "server")]

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use iqide::agent::{build_command_center, load_config_or_default};
use iqide::{ApproveResponse, CommandCenter, ExecuteResponse, RoutingMode};
use serde::{Deserialize, Serialize};

struct AppState {
    center: CommandCenter,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    request: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    mode: RoutingMode,
}

#[derive(Deserialize)]
struct ApproveRequest {
    session_id: String,
    approved: bool,
}

#[derive(Serialize)]
struct ActionsResponse {
    actions: Vec<&'static str>,
}

#[derive(Serialize)]
struct ToolsResponse {
    tools: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
}

async fn api_execute(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, (StatusCode, String)> {
    if body.request.trim().is_empty() && body.mode == RoutingMode::Hardcoded {
        return Err((StatusCode::BAD_REQUEST, "request must not be empty".to_string()));
    }
    let resp = state
        .center
        .execute(body.session_id.as_deref(), &body.request, body.mode)
        .await;
    Ok(Json(resp))
}

async fn api_approve(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ApproveRequest>,
) -> Json<ApproveResponse> {
    Json(state.center.approve(&body.session_id, body.approved).await)
}

async fn api_supported_actions(State(state): State<Arc<AppState>>) -> Json<ActionsResponse> {
    Json(ActionsResponse {
        actions: state.center.supported_actions(),
    })
}

async fn api_tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.center.available_tools(),
    })
}

async fn api_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.center.sessions().len().await,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    iqide::observability::init();

    let cfg = load_config_or_default(None);
    let bind = std::env::var("IQIDE_BIND").unwrap_or_else(|_| cfg.server.bind.clone());
    let center = build_command_center(cfg).context("Failed to build command center")?;
    let state = Arc::new(AppState { center });

    let app = Router::new()
        .route("/api/execute", post(api_execute))
        .route("/api/approve", post(api_approve))
        .route("/api/supported-actions", get(api_supported_actions))
        .route("/api/tools", get(api_tools))
        .route("/api/health", get(api_health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("IQIDE server: http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
