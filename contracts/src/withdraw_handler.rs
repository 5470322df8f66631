//! # Withdraw Handler Contract
//!
//! The only user-facing withdrawal entry point. The handler keeps no
//! balances of its own: a withdrawal is a privileged debit on the
//! [`DepositVault`](crate::deposit_vault::DepositVault) it is bound to,
//! paid straight back to the requesting user. It only works once the vault
//! owner has flagged the handler as an authorized withdrawer.
//!
//! Keeping the policy here and the custody there means a different
//! withdrawal policy (time locks, fees) can replace this contract without
//! touching the vault's books.

use serde::{Deserialize, Serialize};
use shm_protocol::error::{ErrorKind, HasErrorKind};
use shm_protocol::{Address, Amount, Env, LedgerEvent, NativeBank, VaultId};
use thiserror::Error;

use crate::deposit_vault::{Debitor, VaultError};

/// Errors that can occur during a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawError {
    /// The deposit vault rejected the debit.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The vault owner has not registered this handler as a withdrawer.
    #[error("withdraw handler {0} is not registered with its deposit vault")]
    NotAuthorized(Address),

    /// The handler was invoked against a vault it is not bound to.
    #[error("handler is bound to vault contract {expected}, got {actual}")]
    WrongVault { expected: Address, actual: Address },
}

impl HasErrorKind for WithdrawError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Vault(e) => e.kind(),
            Self::NotAuthorized(_) => ErrorKind::NotAuthorized,
            Self::WrongVault { .. } => ErrorKind::InvalidInput,
        }
    }
}

/// Stateless withdrawal policy bound to one deposit vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawHandler {
    address: Address,
    deposit_vault: Address,
}

impl WithdrawHandler {
    pub fn new(address: Address, deposit_vault: Address) -> Self {
        Self {
            address,
            deposit_vault,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The deposit vault this handler debits.
    pub fn deposit_vault(&self) -> Address {
        self.deposit_vault
    }

    /// Withdraws `amount` of `caller`'s balance in `vault_id` back to them.
    ///
    /// # Errors
    ///
    /// Returns [`WithdrawError::NotAuthorized`] if the vault owner has not
    /// registered this handler. Otherwise propagates the vault's refusal:
    /// `VaultNotFound`, `InsufficientBalance` and `ZeroAmount`.
    pub fn withdraw(
        &self,
        env: &mut Env,
        caller: &Address,
        vault_id: VaultId,
        amount: Amount,
        vault: &mut dyn Debitor,
        bank: &mut NativeBank,
    ) -> Result<(), WithdrawError> {
        if vault.address() != self.deposit_vault {
            return Err(WithdrawError::WrongVault {
                expected: self.deposit_vault,
                actual: vault.address(),
            });
        }
        if !vault.is_authorized_withdrawer(&self.address) {
            return Err(WithdrawError::NotAuthorized(self.address));
        }

        let timestamp = env.timestamp();
        env.emit(
            self.address,
            LedgerEvent::WithdrawRequested {
                user: *caller,
                vault_id,
                amount,
                timestamp,
            },
        );

        vault.admin_debit(env, &self.address, vault_id, caller, amount, caller, bank)?;
        Ok(())
    }
}
