//! # Storage Module
//!
//! Persistent storage for the vault ledger. A dev node that forgets every
//! deposit on restart is not much of a ledger.
//!
//! ```text
//! Chain::execute ──► Receipt ──► LedgerDB
//!                                 ├── receipts (by tx hash)
//!                                 ├── events   (by seq)
//!                                 ├── state    (world snapshot)
//!                                 └── metadata (latest block, schema)
//! ```
//!
//! Bincode for on-disk serialization: compact and deterministic. JSON is
//! for the API and genesis files.

pub mod db;

pub use db::{DbError, DbResult, LedgerDB, WORLD_STATE_KEY};
