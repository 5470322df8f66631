//! # Yield Vault Contract
//!
//! Funds a reward pool per vault id and distributes it to depositors in
//! proportion to their deposit vault balance.
//!
//! ## Rounds
//!
//! Every `fund_rewards` call opens a new round:
//!
//! ```text
//! Unfunded ──fund──► Round 1 ──claims──► ... ──fund──► Round 2 ──► ...
//! ```
//!
//! Opening a round takes a snapshot of the vault's total balance. The
//! snapshot is the fixed denominator for every claim in that round, so
//! deposits made after funding cannot dilute rewards already promised.
//! Whatever the previous round did not pay out (unclaimed shares plus
//! floor-division dust) is carried into the new round's funded amount, and
//! the claimant set starts empty.
//!
//! ## Claims
//!
//! `share = floor(balance * total_funded / snapshot_total)`, where
//! `balance` is the claimant's *current* deposit vault balance, capped at
//! what the round still holds. One claim per user per round.
//!
//! ## Invariant
//!
//! `distributed <= total_funded` for every pool, and the contract's token
//! balance equals the sum of `total_funded - distributed` over all pools.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shm_protocol::error::{ErrorKind, HasErrorKind};
use shm_protocol::units::{mul_div_floor, UnitsError};
use shm_protocol::{Address, Amount, Env, LedgerEvent, VaultId};
use thiserror::Error;

use crate::deposit_vault::{VaultBalances, VaultError};
use crate::fungible_token::{TokenError, TokenLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during reward funding and claiming.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YieldError {
    /// The deposit vault rejected a read (unknown vault id).
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Funding an empty vault would leave no denominator.
    #[error("vault {0} has no deposits to distribute rewards against")]
    EmptyVault(VaultId),

    /// Funding must move a non-zero amount.
    #[error("reward amount must be greater than zero")]
    ZeroAmount,

    /// The reward token pull or payout failed.
    #[error("reward token transfer failed: {0}")]
    TransferFailed(#[source] TokenError),

    /// The vault has never been funded.
    #[error("vault {0} has no reward pool")]
    NoRewardPool(VaultId),

    /// The user already claimed in the current round.
    #[error("{user} already claimed round {round} of vault {vault_id}")]
    AlreadyClaimed {
        vault_id: VaultId,
        user: Address,
        round: u64,
    },

    /// The computed share rounds down to zero.
    #[error("nothing to claim for {user} in vault {vault_id}")]
    ZeroShare { vault_id: VaultId, user: Address },

    /// A component other than the bound one was supplied.
    #[error("yield vault is bound to {expected}, got {actual}")]
    WrongContract { expected: Address, actual: Address },

    /// Pool accounting overflowed.
    #[error("reward arithmetic failed: {0}")]
    Math(#[from] UnitsError),
}

impl HasErrorKind for YieldError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Vault(e) => e.kind(),
            Self::EmptyVault(_) | Self::ZeroAmount | Self::WrongContract { .. } => {
                ErrorKind::InvalidInput
            }
            Self::TransferFailed(_) => ErrorKind::TransferFailed,
            Self::NoRewardPool(_) | Self::AlreadyClaimed { .. } | Self::ZeroShare { .. } => {
                ErrorKind::NothingToClaim
            }
            Self::Math(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Reward pool state for one vault id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPool {
    /// Funding round, starting at 1.
    pub round: u64,
    /// Vault total balance when this round was funded.
    pub snapshot_total: Amount,
    /// Tokens available to this round, including carry-over.
    pub total_funded: Amount,
    /// Tokens paid out this round.
    pub distributed: Amount,
    /// Users who claimed this round.
    pub claimed: BTreeSet<Address>,
}

impl RewardPool {
    /// Tokens not yet paid out this round.
    pub fn remaining(&self) -> Amount {
        self.total_funded.saturating_sub(self.distributed)
    }

    pub fn has_claimed(&self, user: &Address) -> bool {
        self.claimed.contains(user)
    }

    pub fn claimant_count(&self) -> usize {
        self.claimed.len()
    }

    /// The payout for a depositor holding `balance`, before the one-claim
    /// rule is applied.
    pub fn share_for(&self, balance: Amount) -> Result<Amount, UnitsError> {
        let share = mul_div_floor(balance, self.total_funded, self.snapshot_total)?;
        Ok(share.min(self.remaining()))
    }
}

/// The yield vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldVault {
    address: Address,
    deposit_vault: Address,
    reward_token: Address,
    pools: BTreeMap<VaultId, RewardPool>,
}

impl YieldVault {
    pub fn new(address: Address, deposit_vault: Address, reward_token: Address) -> Self {
        Self {
            address,
            deposit_vault,
            reward_token,
            pools: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn deposit_vault(&self) -> Address {
        self.deposit_vault
    }

    pub fn reward_token(&self) -> Address {
        self.reward_token
    }

    /// Opens a new reward round for `vault_id` funded with `amount` tokens
    /// pulled from `caller`. The caller must have approved this contract.
    ///
    /// Returns the new round number.
    ///
    /// # Errors
    ///
    /// - [`YieldError::ZeroAmount`] for an empty funding.
    /// - [`YieldError::Vault`] if the vault id does not exist.
    /// - [`YieldError::EmptyVault`] if the vault holds no deposits.
    /// - [`YieldError::TransferFailed`] if the token pull fails.
    pub fn fund_rewards(
        &mut self,
        env: &mut Env,
        caller: &Address,
        vault_id: VaultId,
        amount: Amount,
        vault: &dyn VaultBalances,
        token: &mut dyn TokenLedger,
    ) -> Result<u64, YieldError> {
        self.check_bindings(vault, token)?;
        if amount == 0 {
            return Err(YieldError::ZeroAmount);
        }

        let snapshot_total = vault.vault_balance(vault_id)?;
        if snapshot_total == 0 {
            return Err(YieldError::EmptyVault(vault_id));
        }

        let previous = self.pools.get(&vault_id);
        let carried = previous.map(RewardPool::remaining).unwrap_or(0);
        let round = previous.map(|p| p.round).unwrap_or(0) + 1;
        let total_funded = amount.checked_add(carried).ok_or(UnitsError::Overflow)?;

        token
            .transfer_from(env, &self.address, caller, &self.address, amount)
            .map_err(YieldError::TransferFailed)?;

        self.pools.insert(
            vault_id,
            RewardPool {
                round,
                snapshot_total,
                total_funded,
                distributed: 0,
                claimed: BTreeSet::new(),
            },
        );

        env.emit(
            self.address,
            LedgerEvent::RewardsFunded {
                vault_id,
                funder: *caller,
                amount,
                round,
                snapshot_total,
            },
        );
        Ok(round)
    }

    /// Pays `caller` their share of the current round. Returns the amount.
    ///
    /// # Errors
    ///
    /// - [`YieldError::NoRewardPool`] if the vault was never funded.
    /// - [`YieldError::AlreadyClaimed`] on a second claim in the same round.
    /// - [`YieldError::ZeroShare`] if the share rounds down to nothing.
    /// - [`YieldError::TransferFailed`] if the payout fails.
    pub fn claim_yield(
        &mut self,
        env: &mut Env,
        caller: &Address,
        vault_id: VaultId,
        vault: &dyn VaultBalances,
        token: &mut dyn TokenLedger,
    ) -> Result<Amount, YieldError> {
        self.check_bindings(vault, token)?;

        let pool = self
            .pools
            .get_mut(&vault_id)
            .ok_or(YieldError::NoRewardPool(vault_id))?;
        if pool.has_claimed(caller) {
            return Err(YieldError::AlreadyClaimed {
                vault_id,
                user: *caller,
                round: pool.round,
            });
        }

        let balance = vault.balance_of(vault_id, caller);
        let share = pool.share_for(balance)?;
        if share == 0 {
            return Err(YieldError::ZeroShare {
                vault_id,
                user: *caller,
            });
        }

        token
            .transfer(env, &self.address, caller, share)
            .map_err(YieldError::TransferFailed)?;

        pool.distributed += share;
        pool.claimed.insert(*caller);
        let round = pool.round;

        env.emit(
            self.address,
            LedgerEvent::YieldClaimed {
                vault_id,
                user: *caller,
                amount: share,
                round,
            },
        );
        Ok(share)
    }

    /// What `user` would receive by claiming now; zero if nothing is due.
    pub fn pending_yield(
        &self,
        vault_id: VaultId,
        user: &Address,
        vault: &dyn VaultBalances,
    ) -> Result<Amount, YieldError> {
        let Some(pool) = self.pools.get(&vault_id) else {
            return Ok(0);
        };
        if pool.has_claimed(user) {
            return Ok(0);
        }
        Ok(pool.share_for(vault.balance_of(vault_id, user))?)
    }

    pub fn reward_pool(&self, vault_id: VaultId) -> Option<&RewardPool> {
        self.pools.get(&vault_id)
    }

    /// Tokens the contract should be holding across all pools.
    pub fn outstanding(&self) -> Amount {
        self.pools
            .values()
            .fold(0u128, |acc, p| acc.saturating_add(p.remaining()))
    }

    fn check_bindings(
        &self,
        vault: &dyn VaultBalances,
        token: &dyn TokenLedger,
    ) -> Result<(), YieldError> {
        if vault.address() != self.deposit_vault {
            return Err(YieldError::WrongContract {
                expected: self.deposit_vault,
                actual: vault.address(),
            });
        }
        if token.address() != self.reward_token {
            return Err(YieldError::WrongContract {
                expected: self.reward_token,
                actual: token.address(),
            });
        }
        Ok(())
    }
}
