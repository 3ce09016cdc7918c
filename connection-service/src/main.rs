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

use aws_lambda_events::{
    encodings::Body,
    event::apigw::{ApiGatewayProxyResponse, ApiGatewayWebsocketProxyRequest},
};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "connection_service=debug".to_string()),
        )
        .with_ansi(false)
        .without_time()
        .init();

    info!("connection-service handler initializing");
    lambda_runtime::run(service_fn(handle_connection_event)).await
}

async fn handle_connection_event(
    event: LambdaEvent<ApiGatewayWebsocketProxyRequest>,
) -> Result<ApiGatewayProxyResponse, Error> {
    Ok(respond(&event.payload))
}

/// Acknowledges `$connect` and `$disconnect` with the connection id. The
/// client uses that id as its session id; no session is bound here.
fn respond(event: &ApiGatewayWebsocketProxyRequest) -> ApiGatewayProxyResponse {
    let context = &event.request_context;
    let connection_id = context.connection_id.clone().unwrap_or_default();

    match context.route_key.as_deref() {
        Some("$connect") => {
            info!(connection_id = %connection_id, "websocket connected");
            proxy_response(200, connection_id)
        }
        Some("$disconnect") => {
            info!(connection_id = %connection_id, "websocket disconnected");
            proxy_response(200, connection_id)
        }
        other => {
            let route_key = other.unwrap_or("none");
            warn!(connection_id = %connection_id, route_key, "unknown websocket route");
            proxy_response(400, format!("unsupported route {route_key}"))
        }
    }
}

fn proxy_response(status_code: i64, body: String) -> ApiGatewayProxyResponse {
    let mut response = ApiGatewayProxyResponse::default();
    response.status_code = status_code;
    response.body = Some(Body::Text(body));
    response
}
