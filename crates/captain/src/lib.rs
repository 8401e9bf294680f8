//! Captain: tournament state management for Swiss-system chess events.
//!
//! The tournament model itself lives in `captain-core`. This crate adds the
//! parts that touch the outside world:
//!
//! - [`store`]: one JSON slot per tournament with atomic saves
//! - [`lease`]: lock files that keep one writer per slot
//! - [`engine`]: running the external pairing engine with timeout and cancellation
//! - [`coordinator`]: the pairing cycle with validation and rollback
//! - [`session`]: load, change, save
//! - [`config`]: `captain.toml`
//! - [`stub_engine`]: a start-order pairing engine for local runs and tests

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod lease;
pub mod session;
pub mod store;
pub mod stub_engine;
