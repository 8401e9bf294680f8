//! Pairing cycle coordination.
//!
//! This module provides the [`PairingCoordinator`], which makes one run of
//! the pairing engine look like a transaction on the tournament:
//!
//! ```text
//! Idle -> Persisting -> AwaitingEngine -> Validating -> Committed
//!                                    \             \-> RolledBack
//!                                     \--------------> RolledBack
//! ```
//!
//! The coordinator takes the slot lease, saves the in-memory tournament so
//! the engine sees consistent input, runs the engine, and reloads the slot.
//! The reloaded record is accepted only if it is the previous tournament
//! plus exactly one new round. Otherwise the slot is restored from the
//! pre-cycle snapshot and the in-memory tournament is left untouched.

use captain_core::{Tournament, TournamentError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::{CancelToken, EngineError, PairingEngine};
use crate::lease::{LeaseError, SlotLease};
use crate::store::{Store, StoreError};

/// Stages of a pairing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Persisting,
    AwaitingEngine,
    Validating,
    Committed,
    RolledBack,
}

/// Errors that can end a pairing cycle.
///
/// Every error leaves the in-memory tournament as it was before the cycle.
#[derive(Error, Debug)]
pub enum PairingError {
    /// Another cycle holds the slot lease.
    #[error("a pairing cycle is already in progress for {}", .0.display())]
    InProgress(PathBuf),
    /// The tournament cannot be paired in its current state.
    #[error("cannot pair: {0}")]
    Validation(#[from] TournamentError),
    /// The engine could not be run or exited with a failure.
    #[error("pairing engine error: {0}")]
    Engine(#[source] EngineError),
    /// The engine exited successfully but left an unusable record.
    #[error("pairing engine produced an invalid record: {0}")]
    InvalidOutput(String),
    /// The engine did not finish in time.
    #[error("pairing engine timed out after {0:?}")]
    Timeout(Duration),
    /// The cycle was cancelled while the engine was running.
    #[error("pairing cancelled")]
    Cancelled,
    /// Persisting the pre-cycle state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The lease could not be taken for a reason other than contention.
    #[error(transparent)]
    Lease(LeaseError),
    /// The cycle failed and the pre-cycle record could not be written back.
    #[error("{cause}; restoring the previous record also failed: {source}")]
    RollbackFailed {
        cause: Box<PairingError>,
        #[source]
        source: StoreError,
    },
}

impl PairingError {
    /// Returns `true` if the pairing engine is to blame for the failure.
    pub fn is_engine_failure(&self) -> bool {
        match self {
            PairingError::Engine(_)
            | PairingError::InvalidOutput(_)
            | PairingError::Timeout(_) => true,
            PairingError::RollbackFailed { cause, .. } => cause.is_engine_failure(),
            _ => false,
        }
    }
}

impl From<LeaseError> for PairingError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::Held { slot, .. } => PairingError::InProgress(slot),
            other => PairingError::Lease(other),
        }
    }
}

impl From<EngineError> for PairingError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TimedOut(limit) => PairingError::Timeout(limit),
            EngineError::Cancelled => PairingError::Cancelled,
            other => PairingError::Engine(other),
        }
    }
}

/// Runs pairing cycles for tournaments kept in a [`Store`].
///
/// # Example
///
/// ```no_run
/// use captain::coordinator::PairingCoordinator;
/// use captain::engine::{CancelToken, ProcessEngine};
/// use captain::store::Store;
/// use std::time::Duration;
///
/// let store = Store::new("tournaments", 5);
/// let engine = ProcessEngine::new("swiss-pairer", Vec::new(), Duration::from_secs(60));
/// let mut coordinator = PairingCoordinator::new(store.clone(), engine);
///
/// let (mut tournament, _) = store.load("club")?;
/// let round_no = coordinator.generate_pairing("club", &mut tournament, &CancelToken::new())?;
/// println!("paired round {}", round_no);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PairingCoordinator<E> {
    store: Store,
    engine: E,
    state: CycleState,
}

impl<E: PairingEngine> PairingCoordinator<E> {
    pub fn new(store: Store, engine: E) -> Self {
        Self {
            store,
            engine,
            state: CycleState::Idle,
        }
    }

    /// The stage the most recent cycle reached.
    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs one pairing cycle for the tournament stored under `slot`.
    ///
    /// On success `tournament` is replaced by the engine's result and the
    /// number of the new round is returned.
    ///
    /// # Errors
    ///
    /// - [`PairingError::Validation`] if every planned round is already paired
    /// - [`PairingError::InProgress`] if another cycle holds the slot
    /// - [`PairingError::Engine`], [`PairingError::Timeout`],
    ///   [`PairingError::Cancelled`] or [`PairingError::InvalidOutput`] when
    ///   the engine run fails; the slot is restored in these cases
    pub fn generate_pairing(
        &mut self,
        slot: &str,
        tournament: &mut Tournament,
        cancel: &CancelToken,
    ) -> Result<u32, PairingError> {
        self.run_cycle(slot, tournament, SlotCheck::Skip, cancel)
    }

    /// Like [`generate_pairing`](Self::generate_pairing), but first checks,
    /// under the lease, that the slot still holds `on_disk` (`None` for no
    /// record). Nothing is written when it doesn't.
    ///
    /// # Errors
    ///
    /// In addition to the errors of `generate_pairing`, returns
    /// [`StoreError::Conflict`] (as [`PairingError::Store`]) if the slot was
    /// changed since the caller last read or wrote it.
    pub fn generate_pairing_checked(
        &mut self,
        slot: &str,
        tournament: &mut Tournament,
        on_disk: Option<&Tournament>,
        cancel: &CancelToken,
    ) -> Result<u32, PairingError> {
        self.run_cycle(slot, tournament, SlotCheck::Expect(on_disk), cancel)
    }

    fn run_cycle(
        &mut self,
        slot: &str,
        tournament: &mut Tournament,
        check: SlotCheck<'_>,
        cancel: &CancelToken,
    ) -> Result<u32, PairingError> {
        self.state = CycleState::Idle;
        let round_no = tournament.next_round_no()?;
        let path = self.store.slot_path(slot)?;
        self.store.ensure_dir()?;

        let _lease = SlotLease::acquire(&path)?;
        if let SlotCheck::Expect(on_disk) = check {
            Store::verify_unchanged(&path, on_disk)?;
        }
        tracing::info!(slot = %path.display(), round_no, "starting pairing cycle");

        self.enter(CycleState::Persisting);
        let snapshot = tournament.clone();
        if let Err(err) = Store::write(&path, &snapshot) {
            self.enter(CycleState::RolledBack);
            return Err(err.into());
        }

        self.enter(CycleState::AwaitingEngine);
        let outcome = match self.engine.run(&path, cancel) {
            Ok(()) => {
                self.enter(CycleState::Validating);
                reload_successor(&path, &snapshot)
            }
            Err(err) => Err(PairingError::from(err)),
        };

        match outcome {
            Ok(paired) => {
                *tournament = paired;
                self.enter(CycleState::Committed);
                tracing::info!(slot = %path.display(), round_no, "pairing committed");
                Ok(round_no)
            }
            Err(cause) => {
                self.enter(CycleState::RolledBack);
                tracing::warn!(slot = %path.display(), round_no, "pairing rolled back: {}", cause);
                if let Err(source) = Store::write(&path, &snapshot) {
                    tracing::error!(slot = %path.display(), "failed to restore pre-pairing record: {}", source);
                    return Err(PairingError::RollbackFailed {
                        cause: Box::new(cause),
                        source,
                    });
                }
                Err(cause)
            }
        }
    }

    fn enter(&mut self, state: CycleState) {
        tracing::debug!(from = ?self.state, to = ?state, "pairing cycle transition");
        self.state = state;
    }
}

enum SlotCheck<'a> {
    Skip,
    Expect(Option<&'a Tournament>),
}

/// Loads the engine's output and checks it extends `before` by one round.
fn reload_successor(path: &Path, before: &Tournament) -> Result<Tournament, PairingError> {
    let after = Store::read(path).map_err(|e| PairingError::InvalidOutput(e.to_string()))?;
    check_successor(before, &after).map_err(PairingError::InvalidOutput)?;
    Ok(after)
}

fn check_successor(before: &Tournament, after: &Tournament) -> Result<(), String> {
    if after.configured_round_count() != before.configured_round_count() {
        return Err(format!(
            "planned round count changed from {} to {}",
            before.configured_round_count(),
            after.configured_round_count()
        ));
    }
    if after.players() != before.players() {
        return Err("the player list was modified".to_string());
    }

    let previous = before.rounds().len();
    if after.rounds().len() != previous + 1 {
        return Err(format!(
            "expected exactly one new round, found {}",
            after.rounds().len() as i64 - previous as i64
        ));
    }
    if after.rounds()[..previous] != *before.rounds() {
        return Err("previously recorded rounds were modified".to_string());
    }
    Ok(())
}
