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

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    Client as DynamoClient,
    operation::{put_item::PutItemError, update_item::UpdateItemError},
    types::{AttributeValue, ReturnValuesOnConditionCheckFailure},
};
use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub account_id: String,
    pub session_id: String,
    pub last_move: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(account_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            session_id: session_id.into(),
            last_move: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// The conditional write failed: the session already exists on create,
    /// or does not exist on move.
    ConditionFailed,
    /// The session exists but already holds a higher `lastMove`.
    StaleMove,
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConditionFailed => write!(f, "session condition check failed"),
            StoreError::StaleMove => write!(f, "move is behind the recorded last move"),
            StoreError::Backend(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session only if no session with that key exists.
    async fn create_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Sets `lastMove` on an existing session. `lastMove` never decreases:
    /// a lower value fails with [`StoreError::StaleMove`], an equal one is
    /// accepted again.
    async fn record_last_move(
        &self,
        account_id: &str,
        session_id: &str,
        last_move: u32,
    ) -> Result<(), StoreError>;
}

const LAST_MOVE_CONDITION: &str =
    "attribute_exists(sessionId) AND (attribute_not_exists(lastMove) OR lastMove <= :lastMove)";

#[derive(Clone)]
pub struct DynamoSessionStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoSessionStore {
    pub async fn from_env() -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(endpoint) = std::env::var("DYNAMODB_ENDPOINT") {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let table_name =
            std::env::var("TABLE_NAME").unwrap_or_else(|_| "Session".to_string());

        info!(table_name = %table_name, "DynamoDB session store enabled");
        Self {
            client: DynamoClient::new(&config),
            table_name,
        }
    }
}

#[async_trait]
impl SessionStore for DynamoSessionStore {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(session_item(record)))
            .condition_expression("attribute_not_exists(sessionId)")
            .send()
            .await
            .map_err(|error| match error.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => {
                    StoreError::ConditionFailed
                }
                _ => StoreError::Backend(format!("failed to put session item: {error}")),
            })?;
        Ok(())
    }

    async fn record_last_move(
        &self,
        account_id: &str,
        session_id: &str,
        last_move: u32,
    ) -> Result<(), StoreError> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("accountId", AttributeValue::S(account_id.to_string()))
            .key("sessionId", AttributeValue::S(session_id.to_string()))
            .update_expression("SET lastMove = :lastMove, updatedAt = :updatedAt")
            .condition_expression(LAST_MOVE_CONDITION)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .expression_attribute_values(":lastMove", AttributeValue::N(last_move.to_string()))
            .expression_attribute_values(
                ":updatedAt",
                AttributeValue::N(Utc::now().timestamp_millis().to_string()),
            )
            .send()
            .await
            .map_err(|error| match error.as_service_error() {
                // The old item comes back only when the session exists.
                Some(UpdateItemError::ConditionalCheckFailedException(failed)) => {
                    if failed.item().is_some() {
                        StoreError::StaleMove
                    } else {
                        StoreError::ConditionFailed
                    }
                }
                _ => StoreError::Backend(format!("failed to update session item: {error}")),
            })?;
        Ok(())
    }
}

/// Item layout of the session table. `createdAt` is epoch milliseconds.
pub fn session_item(record: &SessionRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(
        "accountId".to_string(),
        AttributeValue::S(record.account_id.clone()),
    );
    item.insert(
        "sessionId".to_string(),
        AttributeValue::S(record.session_id.clone()),
    );
    item.insert(
        "createdAt".to_string(),
        AttributeValue::N(record.created_at.timestamp_millis().to_string()),
    );
    if let Some(last_move) = record.last_move {
        item.insert(
            "lastMove".to_string(),
            AttributeValue::N(last_move.to_string()),
        );
    }
    item
}
