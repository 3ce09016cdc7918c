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

//! Opponent strategy for the counting game.
//!
//! Totals of the form `ceiling - 4k` are losing for whoever must count from
//! just below them, so the opponent always tries to stop one short of the
//! next such total.

use std::fmt;

use tracing::error;

use crate::{LOSE_MESSAGE, MAX_STEP, WIN_MESSAGE};

const TURN_STRIDE: u32 = MAX_STEP + 1;

/// Ascending losing totals under a ceiling. Built once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheatSheet {
    ceiling: u32,
    losing_totals: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextMove {
    /// The player counted the ceiling.
    PlayerLoses,
    /// The opponent is forced to count the ceiling.
    PlayerWins,
    Count(Vec<u32>),
}

impl CheatSheet {
    pub fn new(ceiling: u32) -> Self {
        let mut losing_totals = Vec::new();
        let mut total = ceiling;
        while total > TURN_STRIDE {
            losing_totals.push(total);
            total -= TURN_STRIDE;
        }
        losing_totals.reverse();

        Self {
            ceiling,
            losing_totals,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn losing_totals(&self) -> &[u32] {
        &self.losing_totals
    }

    /// Opponent answer to the player's last counted number.
    pub fn next_move(&self, last_move: u32) -> NextMove {
        if last_move == self.ceiling {
            return NextMove::PlayerLoses;
        }

        let current_move = last_move.saturating_add(1);
        if current_move == self.ceiling {
            return NextMove::PlayerWins;
        }

        let Some(&losing_number) = self
            .losing_totals
            .iter()
            .find(|&&total| total >= current_move)
        else {
            error!(
                last_move,
                ceiling = self.ceiling,
                "cheat sheet has no losing total for move; answering as a player win"
            );
            return NextMove::PlayerWins;
        };

        if current_move == losing_number {
            return NextMove::Count(vec![current_move]);
        }

        let stop = losing_number.min(current_move.saturating_add(MAX_STEP));
        NextMove::Count((current_move..stop).collect())
    }
}

impl fmt::Display for NextMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextMove::PlayerLoses => f.write_str(LOSE_MESSAGE),
            NextMove::PlayerWins => f.write_str(WIN_MESSAGE),
            NextMove::Count(moves) => {
                let joined = moves
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}
