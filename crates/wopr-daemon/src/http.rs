//! The axum binding for the minimal route subset the daemon binary serves
//! live: `/health`, `/ready`, session CRUD, and synchronous inject. The
//! full route contract lives in [`crate::management::ManagementApi`]; SSE
//! streaming and the remaining routes (`/crons`, `/providers`, `/api/keys`,
//! the websocket) are modeled there but not yet bound to a transport.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::management::{CreateSessionRequest, InjectRequest, ManagementApi, ManagementError};
use crate::state::AppState;

/// A management error rendered as `{code, message}` with the status the
/// error taxonomy assigns its category.
struct AppError(ManagementError);

impl From<ManagementError> for AppError {
    fn from(err: ManagementError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({"code": self.0.code(), "message": self.0.message}))).into_response()
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthBody { status: "healthy" })
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let providers = state.providers.provider_ids().await;
    if providers.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthBody { status: "unready" }))
    } else {
        (StatusCode::OK, Json(HealthBody { status: "ready" }))
    }
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.create_session(req, chrono::Utc::now()).await?;
    Ok(Json(summary))
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.list_sessions().await?))
}

async fn delete_session(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<impl IntoResponse, AppError> {
    state.delete_session(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn inject(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<InjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.inject(&name, req, chrono::Utc::now()).await?;
    Ok(Json(response))
}

/// Build the router over `state`. Authentication middleware (bearer token
/// or API key) is layered by the caller per deployment, since `/health` and
/// `/ready` must stay open while every other route requires it.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{name}", delete(delete_session))
        .route("/sessions/{name}/inject", post(inject))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::bootstrap;

    #[tokio::test]
    async fn health_reports_healthy_with_no_state_dependency() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_is_ok_once_a_provider_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(bootstrap(dir.path().to_path_buf()).await.unwrap());
        let response = ready(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
