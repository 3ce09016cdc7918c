// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{FromRequest, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lambda_http::run as lambda_run;
use thirteen_common::{CreateSessionRequest, DynamoSessionStore, SessionRecord, SessionStore};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SessionStore>,
}

/// JSON body whose rejections answer 400 with the usual error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct JsonBody<T>(T);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let lambda_mode = std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "session_service=debug,tower_http=info".to_string()),
        )
        .with_ansi(!lambda_mode)
        .init();

    let state = AppState {
        store: Arc::new(DynamoSessionStore::from_env().await),
    };

    let app = build_router(state);

    if lambda_mode {
        info!("AWS Lambda runtime detected; running session-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let bind_addr = parse_bind_addr("SESSION_SERVICE_BIND", "0.0.0.0:8101")?;
    info!(%bind_addr, "session-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start", post(create_session_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "session-service"}))
}

async fn create_session_handler(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateSessionRequest>,
) -> Result<String, ApiError> {
    validate_session_request(&request)?;

    let record = SessionRecord::new(request.account_id, request.session_id);
    // An existing session is reported like any other storage failure.
    state.store.create_session(&record).await.map_err(|error| {
        ApiError::internal(format!(
            "failed to create session {}: {error}",
            record.session_id
        ))
    })?;

    info!(
        account_id = %record.account_id,
        session_id = %record.session_id,
        created_at = %record.created_at,
        "session created"
    );
    Ok(format!("Session created: {}", record.session_id))
}

fn validate_session_request(request: &CreateSessionRequest) -> Result<(), ApiError> {
    if request.account_id.trim().is_empty() {
        return Err(ApiError::bad_request("accountId is required"));
    }
    if request.session_id.trim().is_empty() {
        return Err(ApiError::bad_request("sessionId is required"));
    }
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
