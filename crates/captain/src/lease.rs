//! Exclusive leases on tournament slots.
//!
//! A lease is a lock file next to the slot (`<slot>.lock`), created with
//! `create_new` so that only one holder can exist across threads and
//! processes. The lock file is removed when the [`SlotLease`] is dropped.

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while taking a lease.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Another holder owns the lease.
    #[error("slot {} is locked by another operation (lock file {})", slot.display(), lock.display())]
    Held { slot: PathBuf, lock: PathBuf },
    /// The lock file could not be created.
    #[error("failed to create lock file {}: {source}", lock.display())]
    Io {
        lock: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An exclusive lease on one tournament slot.
///
/// # Example
///
/// ```no_run
/// use captain::lease::SlotLease;
/// use std::path::Path;
///
/// let lease = SlotLease::acquire(Path::new("tournaments/club.json"))?;
/// // ... the slot is ours until `lease` is dropped
/// # Ok::<(), captain::lease::LeaseError>(())
/// ```
#[derive(Debug)]
pub struct SlotLease {
    slot: PathBuf,
    lock: PathBuf,
}

impl SlotLease {
    /// Takes the lease on `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Held`] if the lease is already taken, and
    /// [`LeaseError::Io`] if the lock file cannot be written.
    pub fn acquire(slot: &Path) -> Result<Self, LeaseError> {
        let lock = Self::lock_path(slot);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LeaseError::Held {
                    slot: slot.to_path_buf(),
                    lock,
                })
            }
            Err(source) => return Err(LeaseError::Io { lock, source }),
        };

        let lease = Self {
            slot: slot.to_path_buf(),
            lock,
        };
        // The owner line is informational; a failed write still leaves a valid lock.
        let _ = writeln!(file, "pid {} since {}", std::process::id(), Utc::now().to_rfc3339());
        tracing::trace!(lock = %lease.lock.display(), "lease acquired");
        Ok(lease)
    }

    /// Returns `true` if some holder currently owns the lease on `slot`.
    pub fn is_held(slot: &Path) -> bool {
        Self::lock_path(slot).exists()
    }

    /// Path of the lock file guarding `slot`.
    pub fn lock_path(slot: &Path) -> PathBuf {
        let mut name = slot.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// The slot this lease guards.
    pub fn slot(&self) -> &Path {
        &self.slot
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock) {
            tracing::warn!(lock = %self.lock.display(), "failed to release lease: {}", e);
        } else {
            tracing::trace!(lock = %self.lock.display(), "lease released");
        }
    }
}
