//! # Deposit Vault Contract
//!
//! Custody of native-currency deposits with per-vault, per-user accounting.
//! The vault is the single source of truth for "funds under management":
//! nothing else writes its balances.
//!
//! ## Lifecycle
//!
//! ```text
//! create_vault(id) ──► deposit(id) ──► admin_debit(id, user, amount)
//!                        (payable)        (authorized withdrawers only)
//! ```
//!
//! ## Security Model
//!
//! - **Owner**: the deployer. Only the owner toggles authorized withdrawers
//!   and hands over ownership.
//! - **Authorized withdrawers**: contracts (normally the
//!   [`WithdrawHandler`](crate::withdraw_handler::WithdrawHandler)) allowed
//!   to debit any user. Other components reach the privileged entry point
//!   only through the [`Debitor`] capability, and the authorization table is
//!   checked on every call.
//! - **Atomicity**: every check runs before the first write. A failing call
//!   leaves balances, totals and the bank untouched.
//!
//! ## Invariant
//!
//! For every vault, `total == Σ balance_of(vault_id, user)`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shm_protocol::bank::BankError;
use shm_protocol::error::{ErrorKind, HasErrorKind};
use shm_protocol::{Address, Amount, Env, LedgerEvent, NativeBank, VaultId};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during deposit vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The vault id was never created.
    #[error("vault {0} not found")]
    VaultNotFound(VaultId),

    /// The vault id is already registered.
    #[error("vault {0} already exists")]
    VaultAlreadyExists(VaultId),

    /// The caller is not the contract owner.
    #[error("unauthorized: {caller} is not the vault owner")]
    NotOwner {
        /// The account that attempted the call.
        caller: Address,
    },

    /// The caller is not flagged as an authorized withdrawer.
    #[error("unauthorized: {0} is not an authorized withdrawer")]
    NotAuthorizedWithdrawer(Address),

    /// The debit exceeds the user's recorded balance.
    #[error("insufficient balance in vault {vault_id}: {user} has {balance}, requested {requested}")]
    InsufficientBalance {
        vault_id: VaultId,
        user: Address,
        balance: Amount,
        requested: Amount,
    },

    /// Deposits and debits must move a non-zero amount.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The zero address cannot own the vault, withdraw or receive funds.
    #[error("zero address is not a valid {0}")]
    ZeroAddress(&'static str),

    /// A balance or vault total would exceed `u128::MAX`.
    #[error("balance overflow in vault {0}")]
    Overflow(VaultId),

    /// The native-currency payout failed.
    #[error("payout failed: {0}")]
    Bank(#[from] BankError),
}

impl HasErrorKind for VaultError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::VaultNotFound(_) => ErrorKind::NotFound,
            Self::VaultAlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotOwner { .. } | Self::NotAuthorizedWithdrawer(_) => ErrorKind::Unauthorized,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::ZeroAmount | Self::ZeroAddress(_) => ErrorKind::InvalidInput,
            Self::Overflow(_) => ErrorKind::Overflow,
            Self::Bank(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Read access to vault balances, handed to the yield vault.
pub trait VaultBalances {
    /// Address of the deposit vault contract.
    fn address(&self) -> Address;

    /// A user's balance in a vault; zero if never deposited.
    fn balance_of(&self, vault_id: VaultId, user: &Address) -> Amount;

    /// A vault's total balance.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultNotFound`] for unknown ids.
    fn vault_balance(&self, vault_id: VaultId) -> Result<Amount, VaultError>;
}

/// The privileged debit entry point, handed to withdrawal policies.
pub trait Debitor: VaultBalances {
    /// Whether `address` may call [`Debitor::admin_debit`].
    fn is_authorized_withdrawer(&self, address: &Address) -> bool;

    /// Debits `amount` from `user` in `vault_id` and pays it to `recipient`.
    ///
    /// `caller` is the contract invoking the debit and must be an
    /// authorized withdrawer.
    #[allow(clippy::too_many_arguments)]
    fn admin_debit(
        &mut self,
        env: &mut Env,
        caller: &Address,
        vault_id: VaultId,
        user: &Address,
        amount: Amount,
        recipient: &Address,
        bank: &mut NativeBank,
    ) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-vault accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAccount {
    /// Sum of every user balance below.
    pub total: Amount,
    /// Users with a non-zero balance.
    pub balances: BTreeMap<Address, Amount>,
}

/// The deposit vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositVault {
    address: Address,
    owner: Address,
    vaults: BTreeMap<VaultId, VaultAccount>,
    authorized: BTreeSet<Address>,
}

impl DepositVault {
    /// Creates an empty deposit vault at `address`, owned by `owner`.
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            owner,
            vaults: BTreeMap::new(),
            authorized: BTreeSet::new(),
        }
    }

    /// Registers a new vault id. Open to any caller.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultAlreadyExists`] if the id is taken.
    pub fn create_vault(&mut self, env: &mut Env, vault_id: VaultId) -> Result<(), VaultError> {
        if self.vaults.contains_key(&vault_id) {
            return Err(VaultError::VaultAlreadyExists(vault_id));
        }
        self.vaults.insert(vault_id, VaultAccount::default());
        env.emit(self.address, LedgerEvent::VaultCreated { vault_id });
        Ok(())
    }

    /// Credits `amount` to `caller` in `vault_id`.
    ///
    /// The executor has already moved `amount` of native currency from the
    /// caller to this contract's address; this only updates the books.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultNotFound`] if the vault was never created,
    /// [`VaultError::ZeroAmount`] for empty deposits and
    /// [`VaultError::Overflow`] if a balance would overflow.
    pub fn deposit(
        &mut self,
        env: &mut Env,
        caller: &Address,
        vault_id: VaultId,
        amount: Amount,
    ) -> Result<(), VaultError> {
        let account = self
            .vaults
            .get_mut(&vault_id)
            .ok_or(VaultError::VaultNotFound(vault_id))?;
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let current = account.balances.get(caller).copied().unwrap_or(0);
        let balance = current
            .checked_add(amount)
            .ok_or(VaultError::Overflow(vault_id))?;
        let total = account
            .total
            .checked_add(amount)
            .ok_or(VaultError::Overflow(vault_id))?;

        account.balances.insert(*caller, balance);
        account.total = total;

        let timestamp = env.timestamp();
        env.emit(
            self.address,
            LedgerEvent::Deposited {
                vault_id,
                user: *caller,
                amount,
                timestamp,
            },
        );
        Ok(())
    }

    /// Grants or revokes the privileged debit right. Owner-only.
    pub fn set_authorized_withdrawer(
        &mut self,
        env: &mut Env,
        caller: &Address,
        withdrawer: &Address,
        allowed: bool,
    ) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        if withdrawer.is_zero() {
            return Err(VaultError::ZeroAddress("withdrawer"));
        }

        if allowed {
            self.authorized.insert(*withdrawer);
        } else {
            self.authorized.remove(withdrawer);
        }

        env.emit(
            self.address,
            LedgerEvent::AuthorizedWithdrawerSet {
                withdrawer: *withdrawer,
                allowed,
            },
        );
        Ok(())
    }

    /// Hands ownership to `new_owner`. Owner-only.
    pub fn transfer_ownership(
        &mut self,
        env: &mut Env,
        caller: &Address,
        new_owner: &Address,
    ) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(VaultError::ZeroAddress("owner"));
        }

        let previous_owner = self.owner;
        self.owner = *new_owner;
        env.emit(
            self.address,
            LedgerEvent::OwnershipTransferred {
                previous_owner,
                new_owner: *new_owner,
            },
        );
        Ok(())
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn vault_exists(&self, vault_id: VaultId) -> bool {
        self.vaults.contains_key(&vault_id)
    }

    pub fn is_authorized_withdrawer(&self, address: &Address) -> bool {
        self.authorized.contains(address)
    }

    /// Ids of every created vault, ascending.
    pub fn vault_ids(&self) -> impl Iterator<Item = VaultId> + '_ {
        self.vaults.keys().copied()
    }

    /// Full accounting for a vault.
    pub fn vault(&self, vault_id: VaultId) -> Option<&VaultAccount> {
        self.vaults.get(&vault_id)
    }

    /// Sum of all vault totals. Equals the contract's native balance as long
    /// as nobody pays the contract outside of `deposit`.
    pub fn total_value_locked(&self) -> Amount {
        self.vaults
            .values()
            .fold(0u128, |acc, v| acc.saturating_add(v.total))
    }

    fn ensure_owner(&self, caller: &Address) -> Result<(), VaultError> {
        if *caller != self.owner {
            return Err(VaultError::NotOwner { caller: *caller });
        }
        Ok(())
    }
}

impl VaultBalances for DepositVault {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, vault_id: VaultId, user: &Address) -> Amount {
        self.vaults
            .get(&vault_id)
            .and_then(|v| v.balances.get(user))
            .copied()
            .unwrap_or(0)
    }

    fn vault_balance(&self, vault_id: VaultId) -> Result<Amount, VaultError> {
        self.vaults
            .get(&vault_id)
            .map(|v| v.total)
            .ok_or(VaultError::VaultNotFound(vault_id))
    }
}

impl Debitor for DepositVault {
    fn is_authorized_withdrawer(&self, address: &Address) -> bool {
        self.authorized.contains(address)
    }

    fn admin_debit(
        &mut self,
        env: &mut Env,
        caller: &Address,
        vault_id: VaultId,
        user: &Address,
        amount: Amount,
        recipient: &Address,
        bank: &mut NativeBank,
    ) -> Result<(), VaultError> {
        if !self.authorized.contains(caller) {
            return Err(VaultError::NotAuthorizedWithdrawer(*caller));
        }
        if recipient.is_zero() {
            return Err(VaultError::ZeroAddress("recipient"));
        }
        let account = self
            .vaults
            .get_mut(&vault_id)
            .ok_or(VaultError::VaultNotFound(vault_id))?;
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let balance = account.balances.get(user).copied().unwrap_or(0);
        if balance < amount {
            return Err(VaultError::InsufficientBalance {
                vault_id,
                user: *user,
                balance,
                requested: amount,
            });
        }

        // Pay first: if the bank refuses, the books are still untouched.
        bank.transfer(&self.address, recipient, amount)?;

        let remaining = balance - amount;
        if remaining == 0 {
            account.balances.remove(user);
        } else {
            account.balances.insert(*user, remaining);
        }
        account.total -= amount;

        let timestamp = env.timestamp();
        env.emit(
            self.address,
            LedgerEvent::Withdrawn {
                vault_id,
                user: *user,
                amount,
                timestamp,
            },
        );
        Ok(())
    }
}
