//! Tournament rounds.

use serde::{Deserialize, Serialize};

use crate::results::deserialize_games;
use crate::Game;

/// One round of the tournament and the games played in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_no: u32,
    /// Games in board order. Older records store a free-text expression
    /// here, which is parsed on load.
    #[serde(deserialize_with = "deserialize_games")]
    pub results: Vec<Game>,
}

impl Round {
    /// Returns `true` if the given player takes part in any game of this round.
    pub fn involves(&self, start_no: u32) -> bool {
        self.results
            .iter()
            .any(|game| game.participants().any(|p| p == start_no))
    }

    /// Returns `true` once every game of the round has a score.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|game| game.score.is_some())
    }
}
