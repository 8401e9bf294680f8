//! Errors raised by tournament mutations and validation.

use thiserror::Error;

/// Errors that can occur when mutating or validating a tournament.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TournamentError {
    /// Malformed input, or a mutation that would break an invariant.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A start number that does not belong to any registered player.
    #[error("player with start number {0} not found")]
    PlayerNotFound(u32),
}

impl TournamentError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TournamentError::Validation(msg.into())
    }
}
