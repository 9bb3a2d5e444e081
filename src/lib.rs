//! SimpleBank - atomic account-to-account transfers
//!
//! Moves money between two accounts inside one PostgreSQL transaction, with
//! both account rows locked in ascending id order so concurrent transfers
//! over the same pair cannot deadlock each other.
//!
//! # Modules
//!
//! - [`store`] - Transactional executor and the transfer orchestrator
//! - [`repository`] - Entity models and the [`Queries`] capability trait
//! - [`db`] - Connection pool and migrations
//! - [`error`] - [`StoreError`]
//! - [`config`] / [`logging`] - Process setup

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod repository;
pub mod store;

// Convenient re-exports at crate root
pub use db::Database;
pub use error::StoreError;
pub use repository::{Account, EntryStatus, EntryType, LedgerEntry, Queries, Transfer};
pub use store::{
    PgBackend, RandomReference, ReferenceGenerator, Store, TransferTxParams, TransferTxResult,
    TxBackend,
};
