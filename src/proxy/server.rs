//! axum HTTP front-end for the CLI-subprocess proxy (§4.5, §6).

use super::{compose_response, invoke_cli, ProxyRequest};
use crate::config::Settings;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::error;

#[derive(Clone)]
pub struct ProxyState {
    settings: Arc<Settings>,
    /// Bounds concurrently in-flight CLI subprocesses (§4.5 Concurrency,
    /// `cli_proxy_max_concurrency`).
    semaphore: Arc<Semaphore>,
    started_at: Instant,
}

impl ProxyState {
    pub fn new(settings: Arc<Settings>) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.cli_proxy_max_concurrency.max(1)));
        Self {
            settings,
            semaphore,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    kind: String,
    detail: String,
}

async fn chat_completions_handler(State(state): State<ProxyState>, Json(request): Json<ProxyRequest>) -> Response {
    let _permit = match state.semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    kind: "internal".to_string(),
                    detail: "proxy concurrency semaphore closed".to_string(),
                }),
            )
                .into_response();
        }
    };

    let model = request.model.clone();
    match invoke_cli(&state.settings, &request).await.and_then(|outcome| compose_response(&model, outcome)) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            error!(kind = %err.kind, message = %err.message, "CLI proxy request failed");
            let status = match err.kind {
                crate::errors::ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                crate::errors::ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                crate::errors::ErrorKind::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorBody {
                    kind: err.kind.to_string(),
                    detail: err.message,
                }),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<ProxyState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "cli_path": state.settings.cli_binary_path,
            "uptime_s": state.started_at.elapsed().as_secs_f64(),
        })),
    )
}
