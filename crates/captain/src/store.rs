//! JSON file storage for tournament records.
//!
//! Each tournament lives in its own slot: a pretty-printed JSON file inside
//! the storage directory. Writes go to a temporary file in the same
//! directory which is synced and then renamed over the slot, so a reader
//! (or a crash) only ever sees the old or the new record.

use captain_core::Tournament;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// File extension of tournament slots.
const SLOT_EXTENSION: &str = ".json";

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The tournament name cannot be used as a slot.
    #[error("invalid tournament name '{0}'")]
    InvalidSlot(String),
    /// Reading or writing the slot failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The slot exists but does not hold a valid tournament record.
    #[error("corrupt tournament record {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },
    /// The slot no longer holds the record this caller last read or wrote.
    #[error("{} was changed by another process; reopen the tournament and retry", path.display())]
    Conflict { path: PathBuf },
    /// The storage directory could not be turned into a glob pattern.
    #[error("invalid storage directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// File-backed storage for tournament records.
///
/// # Example
///
/// ```no_run
/// use captain::store::Store;
///
/// let store = Store::new("tournaments", 5);
/// let (tournament, _existed) = store.load("spring-open")?;
/// store.save(&tournament, "spring-open")?;
/// # Ok::<(), captain::store::StoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    default_round_count: u32,
}

impl Store {
    /// Creates a store over the given directory.
    ///
    /// `default_round_count` is the planned round count of tournaments
    /// created for slots that do not exist yet; values below 1 are raised to 1.
    pub fn new(dir: impl Into<PathBuf>, default_round_count: u32) -> Self {
        Self {
            dir: dir.into(),
            default_round_count: default_round_count.max(1),
        }
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolves a tournament name to its slot path.
    ///
    /// A `.json` extension is appended when missing. Names that are empty,
    /// start with a dot, or contain path separators are rejected.
    pub fn slot_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = name.trim();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name == SLOT_EXTENSION
        {
            return Err(StoreError::InvalidSlot(name.to_string()));
        }

        let file_name = if name.ends_with(SLOT_EXTENSION) {
            name.to_string()
        } else {
            format!("{}{}", name, SLOT_EXTENSION)
        };
        Ok(self.dir.join(file_name))
    }

    /// Loads the tournament stored under `name`.
    ///
    /// Returns a fresh tournament and `false` when the slot does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptState`] if the slot holds anything other
    /// than a valid record, and [`StoreError::Io`] if it cannot be read.
    pub fn load(&self, name: &str) -> Result<(Tournament, bool), StoreError> {
        let path = self.slot_path(name)?;
        if !Self::exists(&path)? {
            tracing::info!(slot = %path.display(), "no record found, starting a new tournament");
            let fresh = Tournament::new(self.default_round_count).unwrap_or_default();
            return Ok((fresh, false));
        }
        let tournament = Self::read(&path)?;
        tracing::debug!(slot = %path.display(), players = tournament.players().len(), rounds = tournament.rounds().len(), "loaded tournament");
        Ok((tournament, true))
    }

    /// Saves the tournament under `name`, creating the storage directory if
    /// needed, and returns the slot path.
    pub fn save(&self, tournament: &Tournament, name: &str) -> Result<PathBuf, StoreError> {
        let path = self.slot_path(name)?;
        self.ensure_dir()?;
        Self::write(&path, tournament)?;
        Ok(path)
    }

    /// Creates the storage directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Reads and validates the record at `path`.
    pub fn read(path: &Path) -> Result<Tournament, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::CorruptState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Returns whether a record exists at `path`.
    ///
    /// Unlike [`Path::exists`], a failed lookup is an error rather than "absent".
    pub fn exists(path: &Path) -> Result<bool, StoreError> {
        path.try_exists().map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks that the slot at `path` still holds `expected`, where `None`
    /// means no record at all.
    ///
    /// Callers hold the slot lease, so the answer stays true until they write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the record differs.
    pub fn verify_unchanged(path: &Path, expected: Option<&Tournament>) -> Result<(), StoreError> {
        let current = if Self::exists(path)? {
            Some(Self::read(path)?)
        } else {
            None
        };
        if current.as_ref() != expected {
            tracing::warn!(slot = %path.display(), "slot changed since it was last read");
            return Err(StoreError::Conflict {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Atomically replaces the record at `path`.
    pub fn write(path: &Path, tournament: &Tournament) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| StoreError::InvalidSlot(path.display().to_string()))?;
        let temp = dir.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4()
        ));

        if let Err(source) = write_then_rename(&temp, path, tournament) {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        // Persist the rename itself; not all platforms allow syncing a directory.
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }

        tracing::debug!(slot = %path.display(), "saved tournament");
        Ok(())
    }

    /// Lists the names of the tournaments in the storage directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let pattern = format!(
            "{}/*{}",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            SLOT_EXTENSION
        );

        let options = glob::MatchOptions {
            require_literal_leading_dot: true,
            ..glob::MatchOptions::new()
        };
        let mut names: Vec<String> = glob::glob_with(&pattern, options)?
            .filter_map(|entry| match entry {
                Ok(path) => path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned()),
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {}", e);
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

fn write_then_rename(temp: &Path, path: &Path, tournament: &Tournament) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp)?;
    serde_json::to_writer_pretty(&mut file, tournament)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, path)
}
