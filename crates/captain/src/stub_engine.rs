//! A stand-in pairing engine.
//!
//! Pairs the active players of the next round in start-number order
//! (1-2, 3-4, ...) and gives the odd player out a bye. It exists so the
//! pairing cycle can be exercised without a real Swiss pairing program;
//! the `captain-stub-engine` binary wraps it for use as an external engine.

use captain_core::{Game, Tournament};
use std::path::Path;

use crate::engine::{CancelToken, EngineError, PairingEngine};
use crate::store::Store;

/// Pairs the players active in `round_no` in start-number order.
pub fn pair_in_start_order(tournament: &Tournament, round_no: u32) -> Vec<Game> {
    let active: Vec<u32> = tournament
        .active_players(round_no)
        .map(|player| player.start_no)
        .collect();

    active
        .chunks(2)
        .map(|pair| match *pair {
            [white, black] => Game::pairing(white, black),
            [single] => Game::bye(single),
            _ => unreachable!("chunks(2) yields one or two players"),
        })
        .collect()
}

/// Reads the record at `slot`, appends the next round and writes it back.
///
/// Returns the number of the round that was paired.
pub fn pair_slot(slot: &Path) -> Result<u32, EngineError> {
    let mut tournament = Store::read(slot).map_err(|e| EngineError::Rejected(e.to_string()))?;
    let round_no = tournament
        .next_round_no()
        .map_err(|e| EngineError::Rejected(e.to_string()))?;

    let games = pair_in_start_order(&tournament, round_no);
    tournament
        .append_round(games)
        .map_err(|e| EngineError::Rejected(e.to_string()))?;
    Store::write(slot, &tournament).map_err(|e| EngineError::Rejected(e.to_string()))?;

    tracing::debug!(slot = %slot.display(), round_no, "paired in start order");
    Ok(round_no)
}

/// [`pair_slot`] as an in-process [`PairingEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOrderEngine;

impl PairingEngine for StartOrderEngine {
    fn run(&self, slot: &Path, cancel: &CancelToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        pair_slot(slot).map(|_| ())
    }
}
