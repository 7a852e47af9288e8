/// HTTP status surface.
///
/// Read-only JSON views of the pipeline plus a few operator actions
/// (clear the log, block or unblock a phone, inject a test name).
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::poller::Disposition;
use crate::service::MarqueeService;

/// Max length of a test name or phone submitted through the API.
const MAX_FIELD_LEN: usize = 1_024;

/// Phone used for test messages that don't name one.
const DEFAULT_TEST_PHONE: &str = "+15555550000";

#[derive(Clone)]
pub struct StatusApiState {
    service: Arc<MarqueeService>,
}

/// Request body for the phone block endpoints.
#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

/// Request body for POST /api/test/message.
#[derive(Debug, Deserialize)]
pub struct TestMessageRequest {
    /// Raw text, cleaned exactly like an incoming SMS body.
    pub name: String,
    pub phone: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build the status router.
fn build_router(state: StatusApiState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/queue/status", get(queue_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/messages/clear", post(clear_messages_handler))
        .route("/api/blocklist", get(blocklist_handler))
        .route("/api/phone/block", post(block_handler))
        .route("/api/phone/unblock", post(unblock_handler))
        .route("/api/test/message", post(test_message_handler))
        .with_state(state)
}

/// GET /api/health
async fn health_handler(State(state): State<StatusApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "running": state.service.is_running(),
        "workers": state.service.workers().await,
    }))
}

/// GET /api/status: full pipeline snapshot.
async fn status_handler(State(state): State<StatusApiState>) -> impl IntoResponse {
    Json(state.service.snapshot())
}

/// GET /api/queue/status
async fn queue_handler(State(state): State<StatusApiState>) -> impl IntoResponse {
    let queue = state.service.queue();
    Json(serde_json::json!({
        "queue_size": queue.size(),
        "capacity": queue.capacity(),
        "queue": queue.peek_all(),
    }))
}

/// GET /api/messages: recent texts, newest first.
async fn messages_handler(State(state): State<StatusApiState>) -> impl IntoResponse {
    Json(state.service.log().entries())
}

/// POST /api/messages/clear
async fn clear_messages_handler(State(state): State<StatusApiState>) -> impl IntoResponse {
    state.service.log().clear();
    info!("message log cleared via API");
    Json(serde_json::json!({"success": true}))
}

/// GET /api/blocklist
async fn blocklist_handler(State(state): State<StatusApiState>) -> impl IntoResponse {
    state.service.policy().reload_if_changed();
    Json(serde_json::json!({
        "phones": state.service.policy().blocked_phones(),
    }))
}

fn validated_phone(phone: &str) -> Result<&str, axum::response::Response> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "phone is required"));
    }
    if phone.len() > MAX_FIELD_LEN {
        return Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "phone too long",
        ));
    }
    Ok(phone)
}

/// POST /api/phone/block
async fn block_handler(
    State(state): State<StatusApiState>,
    Json(body): Json<PhoneRequest>,
) -> axum::response::Response {
    let phone = match validated_phone(&body.phone) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match state.service.policy().block_phone(phone) {
        Ok(changed) => {
            info!("blocked {} via API", crate::utils::mask_phone(phone));
            Json(serde_json::json!({"success": true, "changed": changed})).into_response()
        }
        Err(e) => {
            error!("failed to block phone: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to update blocklist")
        }
    }
}

/// POST /api/phone/unblock
async fn unblock_handler(
    State(state): State<StatusApiState>,
    Json(body): Json<PhoneRequest>,
) -> axum::response::Response {
    let phone = match validated_phone(&body.phone) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match state.service.policy().unblock_phone(phone) {
        Ok(changed) => {
            info!("unblocked {} via API", crate::utils::mask_phone(phone));
            Json(serde_json::json!({"success": true, "changed": changed})).into_response()
        }
        Err(e) => {
            error!("failed to unblock phone: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to update blocklist")
        }
    }
}

/// POST /api/test/message: run a name through filter and queue, no SMS involved.
async fn test_message_handler(
    State(state): State<StatusApiState>,
    Json(body): Json<TestMessageRequest>,
) -> axum::response::Response {
    let name = body.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "name is required");
    }
    if name.len() > MAX_FIELD_LEN {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "name too long");
    }
    let phone = match body.phone.as_deref() {
        Some(p) => match validated_phone(p) {
            Ok(p) => p,
            Err(resp) => return resp,
        },
        None => DEFAULT_TEST_PHONE,
    };

    let outcome = state.service.inject(phone, name);
    let accepted = matches!(outcome, Disposition::Queued { .. });
    if !accepted {
        warn!("test message '{}' not queued: {:?}", name, outcome);
    }
    Json(serde_json::json!({
        "success": accepted,
        "result": outcome,
    }))
    .into_response()
}

/// Start the status server. It stops when `shutdown` flips to true.
pub async fn start(
    host: &str,
    port: u16,
    service: Arc<MarqueeService>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(StatusApiState { service });
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("status API listening on {}", addr);

    let handle = tokio::spawn(async move {
        let stop = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
            error!("status API server error: {}", e);
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests;
