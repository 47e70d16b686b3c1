// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum router for receiving DiDiT webhooks.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /webhooks/didit` | Verify and acknowledge a webhook delivery |
//! | `GET /health` | Liveness plus token/secret readiness |

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    client::{TokenState, VerificationClient},
    error::DiditError,
};

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<VerificationClient>,
}

impl AppState {
    pub fn new(client: VerificationClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/didit", post(receive_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Rejection returned to the webhook sender.
#[derive(Debug)]
pub struct WebhookRejection {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<DiditError> for WebhookRejection {
    fn from(error: DiditError) -> Self {
        let status = match &error {
            DiditError::Validation(_) => StatusCode::UNAUTHORIZED,
            DiditError::Decode { .. } => StatusCode::BAD_REQUEST,
            DiditError::Config(_) | DiditError::Auth { .. } | DiditError::Api { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookRejection> {
    let payload = state
        .client
        .process_webhook(&headers, &body)
        .inspect_err(|e| warn!(error = %e, "DiDiT webhook rejected"))?;

    let session_id = payload
        .get("session_id")
        .and_then(Value::as_str)
        .unwrap_or("-");
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("-");
    info!(session_id, status, "DiDiT webhook received");

    Ok(Json(WebhookAck { received: true }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// `cached`, `refreshing` or `cold`.
    pub access_token: String,
    pub webhook_secret: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let access_token = match state.client.token_state() {
        TokenState::Cached => "cached",
        TokenState::Refreshing => "refreshing",
        TokenState::Cold => "cold",
    };
    let webhook_secret = if state.client.config().webhook_secret.is_some() {
        "configured"
    } else {
        "missing"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        checks: HealthChecks {
            access_token: access_token.to_string(),
            webhook_secret: webhook_secret.to_string(),
        },
    })
}
