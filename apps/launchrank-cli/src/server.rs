//! HTTP surface over the ranking service.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/ranking/generate` | Current ranking, one key per line |
//! | `GET`  | `/ranking/reload` | Rebuild the snapshot, empty body |
//! | `GET`  | `/ranking/reload_and_generate` | Reload, then the new ranking |
//! | `GET`  | `/_health` | `{keys_count, run_id, latest_used_entries}` |
//!
//! Errors are `{ "error": { "code": ..., "message": ... } }`. Registry and
//! configuration availability failures answer 503, anything else 500. A failed
//! reload leaves the previous ranking in service.
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use launchrank_core::error::Error;
use launchrank_rank::{HealthReport, RankingService};

pub fn router(service: Arc<RankingService>) -> Router {
    Router::new()
        .route("/ranking/generate", get(generate))
        .route("/ranking/reload", get(reload))
        .route("/ranking/reload_and_generate", get(reload_and_generate))
        .route("/_health", get(health))
        .with_state(service)
}

pub async fn run_server(service: Arc<RankingService>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = bind_addr, "ranking server listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
}

pub async fn generate(State(service): State<Arc<RankingService>>) -> String {
    service.generate_text().await
}

pub async fn reload(State(service): State<Arc<RankingService>>) -> Result<(), AppError> {
    service.reload().await?;
    Ok(())
}

pub async fn reload_and_generate(State(service): State<Arc<RankingService>>) -> Result<String, AppError> {
    Ok(service.reload_and_generate().await?)
}

pub async fn health(State(service): State<Arc<RankingService>>) -> Result<Json<HealthReport>, AppError> {
    Ok(Json(service.health().await?))
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match err.downcast_ref::<Error>() {
            Some(e) if e.is_unavailable() => (StatusCode::SERVICE_UNAVAILABLE, e.code()),
            Some(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.code()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self { status, code: code.to_string(), message: format!("{:#}", err) }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: ErrorDetail { code: self.code, message: self.message } };
        (self.status, Json(body)).into_response()
    }
}
