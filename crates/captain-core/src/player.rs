//! Registered players.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Registration index, assigned once and never reused.
    pub start_no: u32,
    /// Display name.
    pub identity: String,
    /// Rounds in which the player is inactive.
    #[serde(default)]
    pub withdrawals: BTreeSet<u32>,
}

impl Player {
    pub(crate) fn new(start_no: u32, identity: impl Into<String>) -> Self {
        Self {
            start_no,
            identity: identity.into(),
            withdrawals: BTreeSet::new(),
        }
    }

    /// Returns `true` if the player sits out the given round.
    pub fn is_withdrawn(&self, round_no: u32) -> bool {
        self.withdrawals.contains(&round_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_has_no_withdrawals() {
        let player = Player::new(3, "Carla");
        assert_eq!(player.start_no, 3);
        assert_eq!(player.identity, "Carla");
        assert!(player.withdrawals.is_empty());
        assert!(!player.is_withdrawn(1));
    }

    #[test]
    fn withdrawals_default_when_missing() {
        let player: Player = serde_json::from_str(r#"{"start_no": 1, "identity": "A"}"#).unwrap();
        assert!(player.withdrawals.is_empty());
    }

    #[test]
    fn withdrawals_serialize_sorted() {
        let mut player = Player::new(1, "A");
        player.withdrawals.insert(3);
        player.withdrawals.insert(1);
        let json = serde_json::to_string(&player).unwrap();
        assert_eq!(json, r#"{"start_no":1,"identity":"A","withdrawals":[1,3]}"#);
    }
}
