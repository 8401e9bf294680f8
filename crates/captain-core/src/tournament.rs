//! The tournament aggregate and its invariants.
//!
//! A [`Tournament`] can only be built through [`Tournament::new`] or by
//! deserializing a record, and both paths run [`Tournament::validate`].
//! The invariants it enforces:
//!
//! - start numbers run `1..=N` in order, identities are non-empty
//! - round numbers run `1..=R` in order and `R` never exceeds the planned count
//! - every start number referenced by a game belongs to a registered player,
//!   and nobody plays twice in one round
//! - withdrawals name a recorded round or the next one to be paired, and a
//!   withdrawn player is not paired in that round

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::results::{parse_results, Entry};
use crate::{Game, Player, Round, TournamentError};

/// Number of rounds planned for a tournament created without an explicit count.
pub const DEFAULT_ROUND_COUNT: u32 = 5;

/// What to do when a player is registered under an identity already in use.
///
/// Identities are compared case-insensitively after trimming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateIdentities {
    /// Refuse the registration.
    #[default]
    Reject,
    /// Register the player anyway; start numbers keep them apart.
    Allow,
}

/// A tournament: planned round count, registered players and recorded rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TournamentRecord")]
pub struct Tournament {
    #[serde(rename = "all_rounds_no")]
    configured_round_count: u32,
    players: Vec<Player>,
    rounds: Vec<Round>,
}

/// Unvalidated on-disk shape of a tournament.
#[derive(Deserialize)]
struct TournamentRecord {
    all_rounds_no: u32,
    players: Vec<Player>,
    rounds: Vec<Round>,
}

impl TryFrom<TournamentRecord> for Tournament {
    type Error = TournamentError;

    fn try_from(record: TournamentRecord) -> Result<Self, Self::Error> {
        let tournament = Tournament {
            configured_round_count: record.all_rounds_no,
            players: record.players,
            rounds: record.rounds,
        };
        tournament.validate()?;
        Ok(tournament)
    }
}

impl Default for Tournament {
    fn default() -> Self {
        Self {
            configured_round_count: DEFAULT_ROUND_COUNT,
            players: Vec::new(),
            rounds: Vec::new(),
        }
    }
}

impl Tournament {
    /// Creates an empty tournament with the given number of planned rounds.
    pub fn new(configured_round_count: u32) -> Result<Self, TournamentError> {
        let tournament = Self {
            configured_round_count,
            ..Self::default()
        };
        tournament.validate()?;
        Ok(tournament)
    }

    pub fn configured_round_count(&self) -> u32 {
        self.configured_round_count
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Looks up a player by start number.
    pub fn player(&self, start_no: u32) -> Option<&Player> {
        let index = usize::try_from(start_no).ok()?.checked_sub(1)?;
        self.players.get(index)
    }

    /// Looks up a round by number.
    pub fn round(&self, round_no: u32) -> Option<&Round> {
        let index = usize::try_from(round_no).ok()?.checked_sub(1)?;
        self.rounds.get(index)
    }

    /// Number of the most recent round, or 0 before the first round.
    pub fn last_round_no(&self) -> u32 {
        self.rounds.last().map_or(0, |round| round.round_no)
    }

    /// Number of the round to pair next.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::Validation`] once every planned round exists.
    pub fn next_round_no(&self) -> Result<u32, TournamentError> {
        let next = self.last_round_no() + 1;
        if next > self.configured_round_count {
            return Err(TournamentError::validation(format!(
                "all {} planned rounds have already been paired",
                self.configured_round_count
            )));
        }
        Ok(next)
    }

    /// Players who are not withdrawn from the given round, in start-number order.
    pub fn active_players(&self, round_no: u32) -> impl Iterator<Item = &Player> + '_ {
        self.players
            .iter()
            .filter(move |player| !player.is_withdrawn(round_no))
    }

    /// Registers a player and returns the assigned start number.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::Validation`] for an empty identity, or for a
    /// duplicate identity under [`DuplicateIdentities::Reject`].
    pub fn add_player(
        &mut self,
        identity: &str,
        duplicates: DuplicateIdentities,
    ) -> Result<u32, TournamentError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(TournamentError::validation(
                "player identity must not be empty",
            ));
        }

        if duplicates == DuplicateIdentities::Reject {
            let wanted = identity.to_lowercase();
            if let Some(existing) = self
                .players
                .iter()
                .find(|p| p.identity.trim().to_lowercase() == wanted)
            {
                return Err(TournamentError::validation(format!(
                    "identity '{}' is already registered as start number {}",
                    identity, existing.start_no
                )));
            }
        }

        let start_no = self.players.len() as u32 + 1;
        self.players.push(Player::new(start_no, identity));
        Ok(start_no)
    }

    /// Records the results of a round from a results expression.
    ///
    /// The next round (`last + 1`) is appended. An existing round is
    /// overwritten: entries that name their pairings replace the games,
    /// entries that don't are applied as scores to the existing games in
    /// board order.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::Validation`] for malformed expressions and
    /// out-of-sequence rounds, and [`TournamentError::PlayerNotFound`] when
    /// an entry names an unknown start number.
    pub fn record_round_results(&mut self, round_no: u32, expr: &str) -> Result<(), TournamentError> {
        let entries = parse_results(expr)?;

        if round_no == 0 {
            return Err(TournamentError::validation("round numbers start at 1"));
        }
        if round_no > self.configured_round_count {
            return Err(TournamentError::validation(format!(
                "round {} is beyond the {} planned rounds",
                round_no, self.configured_round_count
            )));
        }

        self.apply(|t| {
            let last = t.last_round_no();
            if round_no <= last {
                let round = &mut t.rounds[round_no as usize - 1];
                round.results = amend_games(round, &entries)?;
            } else if round_no == last + 1 {
                t.rounds.push(Round {
                    round_no,
                    results: entries.iter().map(|e| e.into_game()).collect(),
                });
            } else {
                return Err(TournamentError::validation(format!(
                    "round {} cannot be recorded before round {}",
                    round_no,
                    last + 1
                )));
            }
            Ok(())
        })
    }

    /// Marks a player as inactive for a round.
    ///
    /// The round must be recorded already or be the next one to pair.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::PlayerNotFound`] for an unknown start number
    /// and [`TournamentError::Validation`] for an unusable round.
    pub fn record_withdrawal(&mut self, start_no: u32, round_no: u32) -> Result<(), TournamentError> {
        if self.player(start_no).is_none() {
            return Err(TournamentError::PlayerNotFound(start_no));
        }

        let upcoming = (self.last_round_no() + 1).min(self.configured_round_count);
        if round_no == 0 || round_no > upcoming {
            return Err(TournamentError::validation(format!(
                "round {} is neither recorded nor the next to be paired",
                round_no
            )));
        }

        if self.round(round_no).map_or(false, |r| r.involves(start_no)) {
            return Err(TournamentError::validation(format!(
                "player {} is already paired in round {}",
                start_no, round_no
            )));
        }

        self.players[start_no as usize - 1]
            .withdrawals
            .insert(round_no);
        Ok(())
    }

    /// Changes the number of planned rounds.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::Validation`] if the count is zero or would
    /// leave recorded rounds or withdrawals beyond the new limit.
    pub fn set_round_count(&mut self, count: u32) -> Result<(), TournamentError> {
        self.apply(|t| {
            t.configured_round_count = count;
            Ok(())
        })
    }

    /// Appends the next round with the given games and returns its number.
    pub fn append_round(&mut self, games: Vec<Game>) -> Result<u32, TournamentError> {
        let round_no = self.next_round_no()?;
        self.apply(|t| {
            t.rounds.push(Round {
                round_no,
                results: games,
            });
            Ok(round_no)
        })
    }

    /// Checks every invariant of the tournament.
    pub fn validate(&self) -> Result<(), TournamentError> {
        if self.configured_round_count == 0 {
            return Err(TournamentError::validation(
                "planned round count must be positive",
            ));
        }
        if self.rounds.len() > self.configured_round_count as usize {
            return Err(TournamentError::validation(format!(
                "{} rounds recorded but only {} planned",
                self.rounds.len(),
                self.configured_round_count
            )));
        }

        for (index, round) in self.rounds.iter().enumerate() {
            if round.round_no as usize != index + 1 {
                return Err(TournamentError::validation(format!(
                    "round numbers must run 1, 2, 3, ...; found round {} in position {}",
                    round.round_no,
                    index + 1
                )));
            }
        }

        let upcoming = (self.last_round_no() + 1).min(self.configured_round_count);
        for (index, player) in self.players.iter().enumerate() {
            if player.start_no as usize != index + 1 {
                return Err(TournamentError::validation(format!(
                    "start numbers must run 1, 2, 3, ...; found {} in position {}",
                    player.start_no,
                    index + 1
                )));
            }
            if player.identity.trim().is_empty() {
                return Err(TournamentError::validation(format!(
                    "player {} has an empty identity",
                    player.start_no
                )));
            }
            if let Some(round_no) = player
                .withdrawals
                .iter()
                .find(|r| **r == 0 || **r > upcoming)
            {
                return Err(TournamentError::validation(format!(
                    "player {} is withdrawn from round {}, which cannot be paired",
                    player.start_no, round_no
                )));
            }
        }

        for round in &self.rounds {
            let mut seen = BTreeSet::new();
            for game in &round.results {
                game.check_shape()?;
                for start_no in game.participants() {
                    let player = self
                        .player(start_no)
                        .ok_or(TournamentError::PlayerNotFound(start_no))?;
                    if !seen.insert(start_no) {
                        return Err(TournamentError::validation(format!(
                            "player {} appears twice in round {}",
                            start_no, round.round_no
                        )));
                    }
                    if player.is_withdrawn(round.round_no) {
                        return Err(TournamentError::validation(format!(
                            "player {} is withdrawn from round {} but paired in it",
                            start_no, round.round_no
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs a mutation on a copy and keeps it only if the copy stays valid.
    fn apply<T>(
        &mut self,
        mutate: impl FnOnce(&mut Tournament) -> Result<T, TournamentError>,
    ) -> Result<T, TournamentError> {
        let mut candidate = self.clone();
        let value = mutate(&mut candidate)?;
        candidate.validate()?;
        *self = candidate;
        Ok(value)
    }
}

fn amend_games(round: &Round, entries: &[Entry]) -> Result<Vec<Game>, TournamentError> {
    if entries.iter().all(|e| e.pair.is_some()) {
        return Ok(entries.iter().map(|e| e.into_game()).collect());
    }

    if entries.len() != round.results.len() {
        return Err(TournamentError::validation(format!(
            "round {} has {} games but {} results were given",
            round.round_no,
            round.results.len(),
            entries.len()
        )));
    }

    Ok(round
        .results
        .iter()
        .zip(entries)
        .map(|(game, entry)| Game {
            score: Some(entry.outcome),
            ..game.clone()
        })
        .collect())
}
