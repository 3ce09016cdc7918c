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

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_lambda_events::event::sqs::{SqsEvent, SqsMessage};
use aws_sdk_apigatewaymanagement::{Client as ConnectionsClient, primitives::Blob};
use aws_sdk_sqs::{Client as SqsClient, types::Message};
use lambda_runtime::{LambdaEvent, service_fn};
use serde::Serialize;
use thirteen_common::{CheatSheet, MoveMessage, PushPayload, ceiling_from_env};
use tracing::{info, warn};

const RECEIVE_BATCH_SIZE: i32 = 10;
const RECEIVE_WAIT_SECONDS: i32 = 20;

#[derive(Clone)]
struct AppState {
    cheat_sheet: Arc<CheatSheet>,
    notifier: Arc<dyn ConnectionNotifier>,
    acknowledger: Arc<dyn ReceiptAcknowledger>,
}

#[async_trait]
trait ConnectionNotifier: Send + Sync {
    async fn notify(&self, connection_id: &str, payload: &PushPayload) -> anyhow::Result<()>;
}

#[async_trait]
trait ReceiptAcknowledger: Send + Sync {
    async fn acknowledge(&self, receipt_handle: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct WebSocketNotifier {
    client: ConnectionsClient,
}

#[async_trait]
impl ConnectionNotifier for WebSocketNotifier {
    async fn notify(&self, connection_id: &str, payload: &PushPayload) -> anyhow::Result<()> {
        let data = serde_json::to_vec(payload).context("failed to encode push payload")?;
        self.client
            .post_to_connection()
            .connection_id(connection_id)
            .data(Blob::new(data))
            .send()
            .await
            .map_err(|error| anyhow::anyhow!("post to connection {connection_id} failed: {error}"))?;
        Ok(())
    }
}

#[derive(Clone)]
struct SqsAcknowledger {
    client: SqsClient,
    queue_url: String,
}

#[async_trait]
impl ReceiptAcknowledger for SqsAcknowledger {
    async fn acknowledge(&self, receipt_handle: &str) -> anyhow::Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|error| anyhow::anyhow!("SQS delete failed: {error}"))?;
        Ok(())
    }
}

/// One queue record, from either a Lambda SQS event or a local receive.
#[derive(Debug, Clone)]
struct QueueRecord {
    message_id: String,
    receipt_handle: Option<String>,
    body: Option<String>,
}

impl From<SqsMessage> for QueueRecord {
    fn from(message: SqsMessage) -> Self {
        Self {
            message_id: message.message_id.unwrap_or_default(),
            receipt_handle: message.receipt_handle,
            body: message.body,
        }
    }
}

impl From<&Message> for QueueRecord {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.message_id().unwrap_or_default().to_string(),
            receipt_handle: message.receipt_handle().map(str::to_string),
            body: message.body().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct DeliveryReport {
    received: usize,
    delivered: usize,
    acknowledged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordOutcome {
    delivered: bool,
    acknowledged: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let lambda_mode = std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "game_service=debug".to_string()),
        )
        .with_ansi(!lambda_mode)
        .init();

    let queue_url = std::env::var("QUEUE_URL").context("QUEUE_URL must be set")?;
    let ws_endpoint = std::env::var("WS_ENDPOINT").context("WS_ENDPOINT must be set")?;
    let endpoint = management_endpoint(&ws_endpoint, std::env::var("WS_STAGE").ok().as_deref());

    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&config);
    if let Ok(sqs_endpoint) = std::env::var("SQS_ENDPOINT") {
        sqs_builder = sqs_builder.endpoint_url(sqs_endpoint);
    }
    let sqs = SqsClient::from_conf(sqs_builder.build());
    let connections = ConnectionsClient::from_conf(
        aws_sdk_apigatewaymanagement::config::Builder::from(&config)
            .endpoint_url(&endpoint)
            .build(),
    );

    let cheat_sheet = CheatSheet::new(ceiling_from_env());
    info!(
        ceiling = cheat_sheet.ceiling(),
        losing_totals = ?cheat_sheet.losing_totals(),
        connections_endpoint = %endpoint,
        "game-service loaded cheat sheet"
    );

    let state = AppState {
        cheat_sheet: Arc::new(cheat_sheet),
        notifier: Arc::new(WebSocketNotifier {
            client: connections,
        }),
        acknowledger: Arc::new(SqsAcknowledger {
            client: sqs.clone(),
            queue_url: queue_url.clone(),
        }),
    };

    if lambda_mode {
        info!("AWS Lambda runtime detected; running game-service in lambda mode");
        lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| {
            let state = state.clone();
            async move { handle_sqs_event(&state, event).await }
        }))
        .await
        .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    run_queue_consumer(state, sqs, queue_url).await
}

/// `wss://` API endpoints are managed over `https://`, under the stage path.
fn management_endpoint(ws_endpoint: &str, stage: Option<&str>) -> String {
    let base = match ws_endpoint.strip_prefix("wss://") {
        Some(rest) => format!("https://{rest}"),
        None => ws_endpoint.to_string(),
    };
    let base = base.trim_end_matches('/');
    match stage.map(|value| value.trim().trim_matches('/')) {
        Some(stage) if !stage.is_empty() && !base.ends_with(&format!("/{stage}")) => {
            format!("{base}/{stage}")
        }
        _ => base.to_string(),
    }
}

async fn handle_sqs_event(
    state: &AppState,
    event: LambdaEvent<SqsEvent>,
) -> Result<DeliveryReport, lambda_runtime::Error> {
    let records = event
        .payload
        .records
        .into_iter()
        .map(QueueRecord::from)
        .collect();
    let report = process_batch(state, records).await;
    info!(
        request_id = %event.context.request_id,
        received = report.received,
        delivered = report.delivered,
        acknowledged = report.acknowledged,
        "game-service processed SQS batch"
    );
    Ok(report)
}

async fn run_queue_consumer(
    state: AppState,
    sqs: SqsClient,
    queue_url: String,
) -> anyhow::Result<()> {
    info!(queue_url = %queue_url, "game-service polling move queue");

    loop {
        let output = match sqs
            .receive_message()
            .queue_url(&queue_url)
            .max_number_of_messages(RECEIVE_BATCH_SIZE)
            .wait_time_seconds(RECEIVE_WAIT_SECONDS)
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => {
                warn!(error = %error, "game-service SQS receive error");
                tokio::time::sleep(Duration::from_millis(400)).await;
                continue;
            }
        };

        let records: Vec<QueueRecord> = output.messages().iter().map(QueueRecord::from).collect();
        if records.is_empty() {
            continue;
        }

        let report = process_batch(&state, records).await;
        info!(
            received = report.received,
            delivered = report.delivered,
            acknowledged = report.acknowledged,
            "game-service processed polled batch"
        );
    }
}

async fn process_batch(state: &AppState, records: Vec<QueueRecord>) -> DeliveryReport {
    let mut report = DeliveryReport {
        received: records.len(),
        ..DeliveryReport::default()
    };

    for record in &records {
        let outcome = with_receipt(state, record, deliver_record(state, record)).await;
        report.delivered += usize::from(outcome.delivered);
        report.acknowledged += usize::from(outcome.acknowledged);
    }

    report
}

/// Awaits `delivery`, then deletes the record whatever the delivery outcome.
async fn with_receipt<F>(state: &AppState, record: &QueueRecord, delivery: F) -> RecordOutcome
where
    F: Future<Output = anyhow::Result<()>>,
{
    let delivered = match delivery.await {
        Ok(()) => true,
        Err(error) => {
            warn!(
                message_id = %record.message_id,
                error = %error,
                "failed to deliver next move"
            );
            false
        }
    };

    let acknowledged = match record.receipt_handle.as_deref() {
        Some(receipt_handle) => match state.acknowledger.acknowledge(receipt_handle).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    message_id = %record.message_id,
                    error = %error,
                    "failed to delete queue record"
                );
                false
            }
        },
        None => {
            warn!(message_id = %record.message_id, "queue record has no receipt handle");
            false
        }
    };

    RecordOutcome {
        delivered,
        acknowledged,
    }
}

async fn deliver_record(state: &AppState, record: &QueueRecord) -> anyhow::Result<()> {
    let body = record
        .body
        .as_deref()
        .context("queue record has no body")?;
    let message: MoveMessage =
        serde_json::from_str(body).context("invalid move message payload")?;

    let payload = PushPayload {
        data: state.cheat_sheet.next_move(message.last_move).to_string(),
    };
    state
        .notifier
        .notify(&message.session_id, &payload)
        .await?;

    info!(
        message_id = %record.message_id,
        session_id = %message.session_id,
        last_move = message.last_move,
        next_move = %payload.data,
        "next move sent to connection"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use thirteen_common::DEFAULT_CEILING;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, PushPayload)>>,
        fail: bool,
    }

    #[async_trait]
    impl ConnectionNotifier for RecordingNotifier {
        async fn notify(&self, connection_id: &str, payload: &PushPayload) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow::anyhow!("connection {connection_id} is gone"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((connection_id.to_string(), payload.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAcknowledger {
        deleted: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl ReceiptAcknowledger for RecordingAcknowledger {
        async fn acknowledge(&self, receipt_handle: &str) -> anyhow::Result<()> {
            if self.fail_for.as_deref() == Some(receipt_handle) {
                return Err(anyhow::anyhow!("forced delete error"));
            }
            self.deleted
                .lock()
                .unwrap()
                .push(receipt_handle.to_string());
            Ok(())
        }
    }

    fn app_state(
        notifier: Arc<RecordingNotifier>,
        acknowledger: Arc<RecordingAcknowledger>,
    ) -> AppState {
        AppState {
            cheat_sheet: Arc::new(CheatSheet::new(DEFAULT_CEILING)),
            notifier,
            acknowledger,
        }
    }

    fn record(id: &str, body: &str) -> QueueRecord {
        QueueRecord {
            message_id: id.to_string(),
            receipt_handle: Some(format!("receipt-{id}")),
            body: Some(body.to_string()),
        }
    }

    fn move_body(session_id: &str, last_move: u32) -> String {
        serde_json::to_string(&MoveMessage {
            session_id: session_id.to_string(),
            last_move,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn process_batch_sends_oracle_answer_and_deletes_each_record() {
        let notifier = Arc::new(RecordingNotifier::default());
        let acknowledger = Arc::new(RecordingAcknowledger::default());
        let state = app_state(notifier.clone(), acknowledger.clone());

        let report = process_batch(
            &state,
            vec![
                record("m1", &move_body("conn-1", 0)),
                record("m2", &move_body("conn-2", 4)),
                record("m3", &move_body("conn-3", 13)),
            ],
        )
        .await;

        assert_eq!(
            report,
            DeliveryReport {
                received: 3,
                delivered: 3,
                acknowledged: 3
            }
        );
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                ("conn-1".to_string(), PushPayload { data: "1,2,3".to_string() }),
                ("conn-2".to_string(), PushPayload { data: "5".to_string() }),
                ("conn-3".to_string(), PushPayload { data: "You lose..".to_string() }),
            ]
        );
        assert_eq!(
            *acknowledger.deleted.lock().unwrap(),
            vec!["receipt-m1", "receipt-m2", "receipt-m3"]
        );
    }

    #[tokio::test]
    async fn failed_push_still_deletes_record() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let acknowledger = Arc::new(RecordingAcknowledger::default());
        let state = app_state(notifier, acknowledger.clone());

        let report = process_batch(&state, vec![record("m1", &move_body("conn-1", 9))]).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(*acknowledger.deleted.lock().unwrap(), vec!["receipt-m1"]);
    }

    #[tokio::test]
    async fn unparseable_record_is_deleted_without_push() {
        let notifier = Arc::new(RecordingNotifier::default());
        let acknowledger = Arc::new(RecordingAcknowledger::default());
        let state = app_state(notifier.clone(), acknowledger.clone());

        let mut empty = record("m2", "");
        empty.body = None;
        let report = process_batch(&state, vec![record("m1", "not json"), empty]).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.acknowledged, 2);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_does_not_stop_the_batch() {
        let notifier = Arc::new(RecordingNotifier::default());
        let acknowledger = Arc::new(RecordingAcknowledger {
            fail_for: Some("receipt-m1".to_string()),
            ..RecordingAcknowledger::default()
        });
        let state = app_state(notifier.clone(), acknowledger.clone());

        let report = process_batch(
            &state,
            vec![
                record("m1", &move_body("conn-1", 1)),
                record("m2", &move_body("conn-1", 5)),
            ],
        )
        .await;

        assert_eq!(
            report,
            DeliveryReport {
                received: 2,
                delivered: 2,
                acknowledged: 1
            }
        );
        assert_eq!(*acknowledger.deleted.lock().unwrap(), vec!["receipt-m2"]);
        assert_eq!(notifier.sent.lock().unwrap()[1].1.data, "6,7,8");
    }

    #[tokio::test]
    async fn record_without_receipt_handle_is_not_acknowledged() {
        let notifier = Arc::new(RecordingNotifier::default());
        let acknowledger = Arc::new(RecordingAcknowledger::default());
        let state = app_state(notifier, acknowledger.clone());

        let mut orphan = record("m1", &move_body("conn-1", 2));
        orphan.receipt_handle = None;
        let outcome = with_receipt(&state, &orphan, deliver_record(&state, &orphan)).await;

        assert_eq!(
            outcome,
            RecordOutcome {
                delivered: true,
                acknowledged: false
            }
        );
        assert!(acknowledger.deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn sqs_event_records_convert_to_queue_records() {
        let event: SqsEvent = serde_json::from_value(serde_json::json!({
            "Records": [{
                "messageId": "m1",
                "receiptHandle": "receipt-m1",
                "body": "{\"sessionId\":\"conn-1\",\"lastMove\":3}",
                "attributes": {},
                "messageAttributes": {},
                "md5OfBody": "d41d8cd98f00b204e9800998ecf8427e",
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:ap-northeast-2:000000000000:MessageQueue.fifo",
                "awsRegion": "ap-northeast-2"
            }]
        }))
        .unwrap();

        let records: Vec<QueueRecord> = event.records.into_iter().map(QueueRecord::from).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "m1");
        assert_eq!(records[0].receipt_handle.as_deref(), Some("receipt-m1"));
        let message: MoveMessage =
            serde_json::from_str(records[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(message.last_move, 3);
    }

    #[test]
    fn management_endpoint_switches_scheme_and_appends_stage() {
        assert_eq!(
            management_endpoint("wss://abc.execute-api.ap-northeast-2.amazonaws.com", Some("dev")),
            "https://abc.execute-api.ap-northeast-2.amazonaws.com/dev"
        );
        assert_eq!(
            management_endpoint("wss://abc.execute-api.ap-northeast-2.amazonaws.com/dev/", Some("dev")),
            "https://abc.execute-api.ap-northeast-2.amazonaws.com/dev"
        );
        assert_eq!(
            management_endpoint("http://localhost:4510", None),
            "http://localhost:4510"
        );
    }
}
