//! Storage layer for onboarding state
//!
//! SQLite through an `r2d2` pool. All reads and writes go through a
//! [`StoreTx`] handed out by [`SqlStore::write`] or [`SqlStore::read`], so a
//! whole transition commits or rolls back as one unit.

mod columns;
pub mod migrations;
pub mod sql_store;

use thiserror::Error;

pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::{SqlStore, StoreTx};

/// The store could not serve the request; nothing was committed
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("storage unavailable: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Io(String),

    #[error("storage unavailable: corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
