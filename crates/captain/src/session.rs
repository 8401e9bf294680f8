//! Session control: one tournament, loaded once, saved after every change.
//!
//! A [`Session`] owns the in-memory tournament for a slot. Each mutating
//! operation is applied to a copy, the copy is written to the slot under the
//! slot lease, and only then does it replace the session's tournament. A
//! failed write or a held lease therefore leaves both the slot and the
//! session unchanged. Pairing is delegated to the [`PairingCoordinator`].
//!
//! The session also remembers the record it last read from or wrote to the
//! slot. Before writing, it checks under the lease that the slot still holds
//! that record, so a session never overwrites a change made by another
//! session or process since it loaded. Such a write fails with
//! [`StoreError::Conflict`]; [`Session::reload`] picks up the newer record.

use captain_core::{DuplicateIdentities, Tournament, TournamentError};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::coordinator::{CycleState, PairingCoordinator, PairingError};
use crate::engine::{CancelToken, PairingEngine};
use crate::lease::{LeaseError, SlotLease};
use crate::store::{Store, StoreError};

/// Errors returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Tournament(#[from] TournamentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pairing(#[from] PairingError),
    /// A pairing cycle holds the slot, so the session cannot save.
    #[error("a pairing cycle is in progress for {}", .0.display())]
    InProgress(PathBuf),
    #[error(transparent)]
    Lease(LeaseError),
}

impl From<LeaseError> for SessionError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::Held { slot, .. } => SessionError::InProgress(slot),
            other => SessionError::Lease(other),
        }
    }
}

/// An open tournament and the means to persist and pair it.
///
/// # Example
///
/// ```no_run
/// use captain::session::Session;
/// use captain::store::Store;
/// use captain::stub_engine::StartOrderEngine;
/// use captain_core::DuplicateIdentities;
///
/// let store = Store::new("tournaments", 5);
/// let mut session = Session::open(store, StartOrderEngine, "club", DuplicateIdentities::Reject)?;
/// session.add_player("Alice")?;
/// session.add_player("Bob")?;
/// session.generate_pairing()?;
/// session.record_results(1, "1-0")?;
/// # Ok::<(), captain::session::SessionError>(())
/// ```
pub struct Session<E> {
    name: String,
    path: PathBuf,
    tournament: Tournament,
    /// The record the slot held when this session last read or wrote it.
    on_disk: Option<Tournament>,
    existed: bool,
    duplicates: DuplicateIdentities,
    coordinator: PairingCoordinator<E>,
    cancel: CancelToken,
}

impl<E: PairingEngine> Session<E> {
    /// Opens the tournament stored under `name`, or a fresh one if the slot
    /// does not exist. Nothing is written until the first change.
    pub fn open(
        store: Store,
        engine: E,
        name: &str,
        duplicates: DuplicateIdentities,
    ) -> Result<Self, SessionError> {
        let path = store.slot_path(name)?;
        let (tournament, existed) = store.load(name)?;
        Ok(Self {
            name: name.to_string(),
            path,
            on_disk: existed.then(|| tournament.clone()),
            tournament,
            existed,
            duplicates,
            coordinator: PairingCoordinator::new(store, engine),
            cancel: CancelToken::new(),
        })
    }

    pub fn tournament(&self) -> &Tournament {
        &self.tournament
    }

    /// Whether the slot held a record when the session was opened.
    pub fn existed(&self) -> bool {
        self.existed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The token that cancels a pairing run started by this session.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn coordinator(&self) -> &PairingCoordinator<E> {
        &self.coordinator
    }

    /// Discards the session's view of the tournament and loads the slot again.
    pub fn reload(&mut self) -> Result<(), SessionError> {
        let (tournament, existed) = self.coordinator.store().load(&self.name)?;
        self.on_disk = existed.then(|| tournament.clone());
        self.tournament = tournament;
        self.existed = existed;
        Ok(())
    }

    /// Registers a player and returns the assigned start number.
    pub fn add_player(&mut self, identity: &str) -> Result<u32, SessionError> {
        let duplicates = self.duplicates;
        self.modify(|t| t.add_player(identity, duplicates))
    }

    /// Records the results of a round from a results expression.
    pub fn record_results(&mut self, round_no: u32, expr: &str) -> Result<(), SessionError> {
        self.modify(|t| t.record_round_results(round_no, expr))
    }

    /// Marks a player as inactive for a round.
    pub fn record_withdrawal(&mut self, start_no: u32, round_no: u32) -> Result<(), SessionError> {
        self.modify(|t| t.record_withdrawal(start_no, round_no))
    }

    /// Changes the number of planned rounds.
    pub fn set_round_count(&mut self, count: u32) -> Result<(), SessionError> {
        self.modify(|t| t.set_round_count(count))
    }

    /// Runs a pairing cycle and returns the number of the new round.
    ///
    /// The cancel token is cleared before the cycle starts.
    pub fn generate_pairing(&mut self) -> Result<u32, SessionError> {
        self.cancel.reset();
        let result = self.coordinator.generate_pairing_checked(
            &self.name,
            &mut self.tournament,
            self.on_disk.as_ref(),
            &self.cancel,
        );

        match result {
            Ok(round_no) => {
                self.on_disk = Some(self.tournament.clone());
                self.existed = true;
                Ok(round_no)
            }
            Err(err) => {
                // A rolled-back cycle leaves the slot holding the pre-cycle
                // record, which is the session's tournament. A failed first
                // write or a failed restore does not.
                let restored = self.coordinator.state() == CycleState::RolledBack
                    && !matches!(
                        err,
                        PairingError::Store(_) | PairingError::RollbackFailed { .. }
                    );
                if restored {
                    self.on_disk = Some(self.tournament.clone());
                    self.existed = true;
                }
                Err(err.into())
            }
        }
    }

    /// Saves the tournament and ends the session.
    pub fn close(mut self) -> Result<PathBuf, SessionError> {
        let snapshot = self.tournament.clone();
        self.persist(&snapshot)?;
        Ok(self.path)
    }

    fn modify<T>(
        &mut self,
        mutate: impl FnOnce(&mut Tournament) -> Result<T, TournamentError>,
    ) -> Result<T, SessionError> {
        let mut candidate = self.tournament.clone();
        let value = mutate(&mut candidate)?;
        self.persist(&candidate)?;
        self.tournament = candidate;
        Ok(value)
    }

    fn persist(&mut self, tournament: &Tournament) -> Result<(), SessionError> {
        self.coordinator.store().ensure_dir()?;
        let _lease = SlotLease::acquire(&self.path)?;
        Store::verify_unchanged(&self.path, self.on_disk.as_ref())?;
        Store::write(&self.path, tournament)?;
        self.on_disk = Some(tournament.clone());
        self.existed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::stub_engine::StartOrderEngine;
    use captain_core::Game;

    fn open(dir: &Path) -> Session<StartOrderEngine> {
        Session::open(
            Store::new(dir.join("tournaments"), 5),
            StartOrderEngine,
            "club",
            DuplicateIdentities::Reject,
        )
        .unwrap()
    }

    #[test]
    fn test_open_missing_slot_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let session = open(dir.path());

        assert!(!session.existed());
        assert_eq!(session.tournament(), &Tournament::new(5).unwrap());
        assert!(!session.path().exists());
        assert_eq!(session.name(), "club");
    }

    #[test]
    fn test_mutations_are_saved_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = open(dir.path());

        assert_eq!(session.add_player("A").unwrap(), 1);
        assert_eq!(session.add_player("B").unwrap(), 2);
        assert!(session.existed());

        let stored = Store::read(session.path()).unwrap();
        assert_eq!(&stored, session.tournament());

        let reopened = open(dir.path());
        assert!(reopened.existed());
        assert_eq!(reopened.tournament().players().len(), 2);
    }

    #[test]
    fn test_rejected_mutation_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = open(dir.path());
        session.add_player("A").unwrap();
        let before = session.tournament().clone();

        let err = session.add_player("a").unwrap_err();
        assert!(matches!(err, SessionError::Tournament(TournamentError::Validation(_))));

        let err = session.record_withdrawal(7, 1).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Tournament(TournamentError::PlayerNotFound(7))
        ));

        assert_eq!(session.tournament(), &before);
        assert_eq!(Store::read(session.path()).unwrap(), before);
    }

    #[test]
    fn test_held_lease_blocks_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = open(dir.path());
        session.add_player("A").unwrap();
        let before = session.tournament().clone();

        let _lease = SlotLease::acquire(session.path()).unwrap();
        let err = session.add_player("B").unwrap_err();

        assert!(matches!(err, SessionError::InProgress(_)));
        assert_eq!(session.tournament(), &before);
        assert_eq!(Store::read(session.path()).unwrap(), before);
    }

    #[test]
    fn test_pairing_then_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = open(dir.path());
        for name in ["A", "B", "C"] {
            session.add_player(name).unwrap();
        }

        assert_eq!(session.generate_pairing().unwrap(), 1);
        assert_eq!(
            session.tournament().round(1).unwrap().results,
            vec![Game::pairing(1, 2), Game::bye(3)]
        );

        session.record_results(1, "0.5-0.5, 1").unwrap();
        let round = session.tournament().round(1).unwrap();
        assert!(round.is_complete());
        assert_eq!(round.results[0].white, Some(1));

        session.record_withdrawal(1, 2).unwrap();
        assert_eq!(session.generate_pairing().unwrap(), 2);
        assert_eq!(
            session.tournament().round(2).unwrap().results,
            vec![Game::pairing(2, 3)]
        );
        assert_eq!(&Store::read(session.path()).unwrap(), session.tournament());
    }

    #[test]
    fn test_set_round_count_limits_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = open(dir.path());
        session.add_player("A").unwrap();
        session.add_player("B").unwrap();
        session.set_round_count(1).unwrap();

        session.generate_pairing().unwrap();
        let err = session.generate_pairing().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Pairing(PairingError::Validation(_))
        ));

        assert!(session.set_round_count(0).is_err());
        assert_eq!(session.tournament().configured_round_count(), 1);
    }

    #[test]
    fn test_failed_pairing_keeps_session_state() {
        let dir = tempfile::tempdir().unwrap();
        let failing = |_: &Path, _: &CancelToken| -> Result<(), EngineError> {
            Err(EngineError::Rejected("engine crashed".to_string()))
        };
        let mut session = Session::open(
            Store::new(dir.path(), 5),
            failing,
            "club",
            DuplicateIdentities::Reject,
        )
        .unwrap();
        session.add_player("A").unwrap();
        session.add_player("B").unwrap();
        let before = session.tournament().clone();

        let err = session.generate_pairing().unwrap_err();
        assert!(matches!(err, SessionError::Pairing(PairingError::Engine(_))));
        assert_eq!(session.tournament(), &before);
        assert_eq!(Store::read(session.path()).unwrap(), before);
    }

    #[test]
    fn test_close_saves_fresh_tournament() {
        let dir = tempfile::tempdir().unwrap();
        let session = open(dir.path());
        let path = session.close().unwrap();

        assert!(path.exists());
        assert_eq!(Store::read(&path).unwrap(), Tournament::new(5).unwrap());
    }

    #[test]
    fn test_stale_session_cannot_overwrite_committed_round() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = open(dir.path());
        let mut second = open(dir.path());

        first.add_player("A").unwrap();
        first.add_player("B").unwrap();
        assert_eq!(first.generate_pairing().unwrap(), 1);
        let committed = first.tournament().clone();

        let err = second.add_player("C").unwrap_err();
        assert!(
            matches!(err, SessionError::Store(StoreError::Conflict { .. })),
            "got {:?}",
            err
        );
        assert!(second.tournament().players().is_empty());
        assert_eq!(Store::read(first.path()).unwrap(), committed);

        second.reload().unwrap();
        assert_eq!(second.add_player("C").unwrap(), 3);
        let stored = Store::read(second.path()).unwrap();
        assert_eq!(stored.rounds().len(), 1);
        assert_eq!(stored.players().len(), 3);
    }

    #[test]
    fn test_stale_session_cannot_pair() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = open(dir.path());
        first.add_player("A").unwrap();
        first.add_player("B").unwrap();
        let mut second = open(dir.path());

        first.add_player("C").unwrap();
        let err = second.generate_pairing().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Pairing(PairingError::Store(StoreError::Conflict { .. }))
        ));
        assert!(Store::read(first.path()).unwrap().rounds().is_empty());

        second.reload().unwrap();
        assert_eq!(second.generate_pairing().unwrap(), 1);
        assert_eq!(second.tournament().round(1).unwrap().results.len(), 2);
    }

    #[test]
    fn test_session_keeps_working_after_rolled_back_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let failing = |_: &Path, _: &CancelToken| -> Result<(), EngineError> {
            Err(EngineError::Rejected("engine crashed".to_string()))
        };
        let mut session = Session::open(
            Store::new(dir.path(), 5),
            failing,
            "club",
            DuplicateIdentities::Reject,
        )
        .unwrap();
        session.add_player("A").unwrap();
        assert!(session.generate_pairing().is_err());

        assert_eq!(session.add_player("B").unwrap(), 2);
        assert_eq!(Store::read(session.path()).unwrap().players().len(), 2);
    }

    #[test]
    fn test_allow_duplicates_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(
            Store::new(dir.path(), 5),
            StartOrderEngine,
            "club",
            DuplicateIdentities::Allow,
        )
        .unwrap();
        session.add_player("Smith").unwrap();
        assert_eq!(session.add_player("smith").unwrap(), 2);
    }
}
