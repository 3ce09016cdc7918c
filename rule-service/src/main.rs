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
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client as SqsClient;
use axum::{
    Json, Router,
    extract::{FromRequest, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lambda_http::run as lambda_run;
use thirteen_common::{
    DynamoSessionStore, MISSING_SESSION_HINT, MoveEnvelope, MoveMessage, SessionStore,
    StoreError, SubmitMoveRequest, UserMove, ceiling_from_env,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SessionStore>,
    publisher: Arc<dyn MovePublisher>,
    ceiling: u32,
}

/// JSON body whose rejections answer 400 with the usual error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct JsonBody<T>(T);

#[async_trait]
trait MovePublisher: Send + Sync {
    async fn publish(&self, envelope: &MoveEnvelope) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct SqsMovePublisher {
    client: SqsClient,
    queue_url: String,
}

impl SqsMovePublisher {
    async fn from_env() -> anyhow::Result<Self> {
        let queue_url = std::env::var("QUEUE_URL").context("QUEUE_URL must be set")?;
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_sqs::config::Builder::from(&config);
        if let Ok(endpoint) = std::env::var("SQS_ENDPOINT") {
            builder = builder.endpoint_url(endpoint);
        }
        Ok(Self {
            client: SqsClient::from_conf(builder.build()),
            queue_url,
        })
    }
}

#[async_trait]
impl MovePublisher for SqsMovePublisher {
    async fn publish(&self, envelope: &MoveEnvelope) -> anyhow::Result<()> {
        let payload =
            serde_json::to_string(&envelope.message).context("failed to encode move message")?;
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(payload)
            .message_group_id(&envelope.group_id)
            .message_deduplication_id(&envelope.deduplication_id)
            .send()
            .await
            .map_err(|error| anyhow::anyhow!("SQS send failed: {error}"))?;

        info!(
            session_id = %envelope.message.session_id,
            last_move = envelope.message.last_move,
            group_id = %envelope.group_id,
            message_id = output.message_id().unwrap_or("none"),
            "move enqueued"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let lambda_mode = std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "rule_service=debug,tower_http=info".to_string()),
        )
        .with_ansi(!lambda_mode)
        .init();

    let state = AppState {
        store: Arc::new(DynamoSessionStore::from_env().await),
        publisher: Arc::new(SqsMovePublisher::from_env().await?),
        ceiling: ceiling_from_env(),
    };
    info!(ceiling = state.ceiling, "rule-service loaded game settings");

    let app = build_router(state);

    if lambda_mode {
        info!("AWS Lambda runtime detected; running rule-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let bind_addr = parse_bind_addr("RULE_SERVICE_BIND", "0.0.0.0:8102")?;
    info!(%bind_addr, "rule-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/game", post(submit_move_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "rule-service"}))
}

async fn submit_move_handler(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SubmitMoveRequest>,
) -> Result<Json<MoveMessage>, ApiError> {
    let user_move = UserMove::parse(&request.user_move, state.ceiling).map_err(|error| {
        debug!(user_move = %request.user_move, reason = %error, "rejected move");
        ApiError::bad_request(format!("[{}] is invalid input", request.user_move))
    })?;

    state
        .store
        .record_last_move(&request.account_id, &request.session_id, user_move.last())
        .await
        .map_err(|error| match error {
            StoreError::ConditionFailed => ApiError::internal(MISSING_SESSION_HINT),
            StoreError::StaleMove => ApiError::bad_request(format!(
                "[{}] is behind the last recorded move",
                request.user_move
            )),
            StoreError::Backend(message) => {
                ApiError::internal(format!("failed to record move: {message}"))
            }
        })?;

    let envelope = MoveEnvelope::new(&request.account_id, &request.session_id, &user_move);
    state
        .publisher
        .publish(&envelope)
        .await
        .map_err(|e| ApiError::internal(format!("failed to enqueue move: {e}")))?;

    Ok(Json(envelope.message))
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
