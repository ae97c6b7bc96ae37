//! HTTP API handlers

use axum::{extract::State, http::StatusCode, http::Uri, Json};
use std::sync::Arc;

use crate::dispatch::SessionInfo;
use crate::protocol::StreamMode;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Pipeline status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub mode: StreamMode,
    pub session_count: usize,
    pub uptime_seconds: u64,
}

/// Get pipeline status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let status = SystemStatus {
        mode: state.mode,
        session_count: state.registry.len(),
        uptime_seconds: state.started.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

/// Get live sessions
pub async fn get_sessions(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<SessionInfo>>> {
    Json(ApiResponse::ok(state.registry.snapshot()))
}

/// Unknown routes
pub async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("no such endpoint: {}", uri.path()))),
    )
}
