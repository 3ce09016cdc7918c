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

use serde::{Deserialize, Serialize};

mod moves;
mod oracle;
mod store;

pub use moves::{MoveError, UserMove};
pub use oracle::{CheatSheet, NextMove};
pub use store::{DynamoSessionStore, SessionRecord, SessionStore, StoreError, session_item};

pub const DEFAULT_CEILING: u32 = 13;
/// Most numbers a player may count in one turn.
pub const MAX_STEP: u32 = 3;
pub const LOSE_MESSAGE: &str = "You lose..";
pub const WIN_MESSAGE: &str = "You win!!";
pub const MISSING_SESSION_HINT: &str =
    "make sure you have started a game before making your move";

pub type AccountId = String;
/// Session ids double as the WebSocket connection id of the player.
pub type SessionId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub account_id: AccountId,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMoveRequest {
    pub account_id: AccountId,
    pub session_id: SessionId,
    pub user_move: String,
}

/// Queue payload carried from move submission to move delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveMessage {
    pub session_id: SessionId,
    pub last_move: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveEnvelope {
    pub message: MoveMessage,
    pub group_id: String,
    pub deduplication_id: String,
}

impl MoveEnvelope {
    /// Moves are ordered per (account, session) and deduplicated on the
    /// normalized move text, so a resubmitted move never enqueues twice.
    pub fn new(account_id: &str, session_id: &str, user_move: &UserMove) -> Self {
        Self {
            message: MoveMessage {
                session_id: session_id.to_string(),
                last_move: user_move.last(),
            },
            group_id: format!("{account_id}-{session_id}"),
            deduplication_id: format!("{account_id}-{session_id}-{}", user_move.normalized()),
        }
    }
}

/// Frame pushed to the player's WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushPayload {
    pub data: String,
}

/// Reads `GAME_CEILING`, falling back to [`DEFAULT_CEILING`] when unset or
/// not a positive integer.
pub fn ceiling_from_env() -> u32 {
    std::env::var("GAME_CEILING")
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_CEILING)
}
