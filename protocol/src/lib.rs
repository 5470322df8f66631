// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SHM Vault Protocol — Core Library
//!
//! Ledger primitives shared by the vault contracts and the node: who owns
//! what, how amounts are written down, and how the outcome of a
//! transaction is recorded.
//!
//! The contracts themselves live in `shm-contracts`; this crate knows
//! nothing about vaults or rewards beyond the event vocabulary.
//!
//! ## Architecture
//!
//! - **address** — 20-byte account and contract addresses, EVM style.
//! - **units** — `u128` amounts, decimal conversion, widened `mul_div`.
//! - **bank** — native-currency (SHM) balances.
//! - **env** — block context and the per-transaction event buffer.
//! - **events** — the event vocabulary consumed by indexers.
//! - **transaction** — transaction hashes and receipts.
//! - **error** — the error-kind taxonomy every component maps onto.
//! - **storage** — sled persistence for state, receipts and events.
//! - **config** — chain constants and node defaults.
//!
//! ## Ground Rules
//!
//! 1. Integers only. Every amount is a `u128` in the smallest unit.
//! 2. Checked arithmetic wherever money moves. Overflow is an error, not a wrap.
//! 3. If it touches money, it has tests. Plural.

pub mod address;
pub mod bank;
pub mod config;
pub mod env;
pub mod error;
pub mod events;
pub mod storage;
pub mod transaction;
pub mod units;

pub use address::Address;
pub use bank::NativeBank;
pub use env::{BlockInfo, Env};
pub use error::{ErrorKind, HasErrorKind};
pub use events::{EventLog, EventRecord, LedgerEvent};
pub use transaction::{Receipt, TxHash, TxStatus};
pub use units::{Amount, VaultId};
