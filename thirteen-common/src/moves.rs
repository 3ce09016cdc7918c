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

use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::MAX_STEP;

static MOVE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("move token pattern is valid"));

/// Numbers a player counted in one turn, as submitted (`"4,5,6"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMove {
    moves: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    Empty,
    TooManyNumbers(usize),
    NotANumber(String),
    BeyondCeiling { value: u32, ceiling: u32 },
}

impl UserMove {
    /// Whitespace is ignored anywhere in the input.
    pub fn parse(raw: &str, ceiling: u32) -> Result<Self, MoveError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(MoveError::Empty);
        }

        let tokens: Vec<&str> = compact.split(',').collect();
        if tokens.len() > MAX_STEP as usize {
            return Err(MoveError::TooManyNumbers(tokens.len()));
        }

        let mut moves = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !MOVE_TOKEN.is_match(token) {
                return Err(MoveError::NotANumber(token.to_string()));
            }
            let value = token
                .parse::<u32>()
                .map_err(|_| MoveError::NotANumber(token.to_string()))?;
            if value > ceiling {
                return Err(MoveError::BeyondCeiling { value, ceiling });
            }
            moves.push(value);
        }

        Ok(Self { moves })
    }

    pub fn moves(&self) -> &[u32] {
        &self.moves
    }

    /// The running total after this move.
    pub fn last(&self) -> u32 {
        self.moves.last().copied().unwrap_or_default()
    }

    pub fn normalized(&self) -> String {
        self.moves
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::Empty => write!(f, "move is empty"),
            MoveError::TooManyNumbers(count) => {
                write!(f, "move has {count} numbers, at most {MAX_STEP} allowed")
            }
            MoveError::NotANumber(token) => write!(f, "{token:?} is not a number"),
            MoveError::BeyondCeiling { value, ceiling } => {
                write!(f, "{value} is beyond the ceiling {ceiling}")
            }
        }
    }
}

impl std::error::Error for MoveError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_CEILING;

    fn parse(raw: &str) -> Result<UserMove, MoveError> {
        UserMove::parse(raw, DEFAULT_CEILING)
    }

    #[test]
    fn accepts_one_to_three_numbers() {
        assert_eq!(parse("1").unwrap().moves(), &[1]);
        assert_eq!(parse("1,2").unwrap().moves(), &[1, 2]);
        assert_eq!(parse("1,2,3").unwrap().moves(), &[1, 2, 3]);
    }

    #[test]
    fn last_number_is_the_new_total() {
        assert_eq!(parse("10,11,12").unwrap().last(), 12);
        assert_eq!(parse("7").unwrap().last(), 7);
    }

    #[test]
    fn whitespace_is_ignored() {
        let user_move = parse(" 4 ,\t5, 6 ").unwrap();
        assert_eq!(user_move.moves(), &[4, 5, 6]);
        assert_eq!(user_move.normalized(), "4,5,6");
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse(""), Err(MoveError::Empty));
        assert_eq!(parse("   "), Err(MoveError::Empty));
    }

    #[test]
    fn rejects_more_than_three_numbers() {
        assert_eq!(parse("1,2,3,4"), Err(MoveError::TooManyNumbers(4)));
    }

    #[test]
    fn rejects_non_numeric_tokens() {
        assert!(matches!(parse("1,two"), Err(MoveError::NotANumber(token)) if token == "two"));
        assert!(matches!(parse("1,,3"), Err(MoveError::NotANumber(token)) if token.is_empty()));
        assert!(parse("-1").is_err());
        assert!(parse("+1").is_err());
        assert!(parse("1.5").is_err());
        assert!(parse("99999999999").is_err());
    }

    #[test]
    fn rejects_numbers_beyond_ceiling() {
        assert_eq!(
            parse("12,13,14"),
            Err(MoveError::BeyondCeiling {
                value: 14,
                ceiling: 13
            })
        );
        assert!(parse("11,12,13").is_ok());
    }

    #[test]
    fn error_messages_name_the_problem() {
        assert_eq!(
            MoveError::TooManyNumbers(5).to_string(),
            "move has 5 numbers, at most 3 allowed"
        );
        assert_eq!(
            MoveError::NotANumber("x".to_string()).to_string(),
            "\"x\" is not a number"
        );
    }
}
