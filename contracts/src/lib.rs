//! # SHM Vault Contracts
//!
//! On-chain logic for the SHM vault system. Four components cooperate
//! through narrow capabilities rather than shared state:
//!
//! - **DepositVault** — custody of native currency, per-vault and per-user
//!   books, and the owner-controlled list of authorized withdrawers.
//! - **WithdrawHandler** — the user-facing withdrawal path; a privileged
//!   debit against the deposit vault paid back to the caller.
//! - **YieldVault** — pro-rata distribution of reward tokens to depositors,
//!   one funding round at a time.
//! - **FungibleToken** — the ERC-20-style reward token.
//!
//! The [`chain`] module executes transactions against all of them
//! atomically, and [`genesis`] deploys and wires a fresh system.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked: `checked_add`, `checked_sub`,
//!    and 256-bit intermediates for pro-rata math.
//! 2. Every check happens before the first write. A component that returns
//!    an error has not changed.
//! 3. Privileged operations are gated on the caller's address, never on a
//!    flag the caller supplies.
//! 4. Every public type is serializable (serde) for the API and storage.

pub mod chain;
pub mod deposit_vault;
pub mod fungible_token;
pub mod genesis;
pub mod withdraw_handler;
pub mod yield_vault;

pub use chain::{Call, Chain, ChainState, ExecutionError, Transaction, WorldState};
pub use deposit_vault::{Debitor, DepositVault, VaultBalances, VaultError};
pub use fungible_token::{FungibleToken, TokenError, TokenLedger};
pub use genesis::{Deployment, Genesis, GenesisConfig, GenesisError};
pub use withdraw_handler::{WithdrawError, WithdrawHandler};
pub use yield_vault::{RewardPool, YieldError, YieldVault};
