//! Core types for tournament state.
//!
//! This crate provides the validated in-memory model of a tournament:
//! - [`Tournament`] with its players, rounds and planned round count
//! - [`Player`] and [`Round`] records
//! - [`Game`], [`Outcome`] and [`Score`] for round results
//! - parsing of results expressions such as `"1:2 1-0, 3:4 0.5-0.5"`
//!
//! Every mutation is validated against the tournament invariants before it
//! is applied; a rejected mutation leaves the tournament untouched.

mod error;
mod player;
mod results;
mod round;
mod score;
mod tournament;

pub use error::TournamentError;
pub use player::Player;
pub use results::{parse_results, Entry, Game, Outcome};
pub use round::Round;
pub use score::Score;
pub use tournament::{DuplicateIdentities, Tournament, DEFAULT_ROUND_COUNT};
