//! # Native Currency Bank
//!
//! SHM balances for every account and contract. Value-bearing calls move
//! SHM from the sender to the callee's address before the callee runs, and
//! the deposit vault pays withdrawals out of its own address, so the bank is
//! the only place native currency ever changes hands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::address::Address;
use crate::error::{ErrorKind, HasErrorKind};
use crate::units::Amount;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from native-currency movements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// The payer does not hold enough SHM.
    #[error("insufficient funds at {address}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Paying account.
        address: Address,
        /// Its current balance.
        available: Amount,
        /// Amount it tried to send.
        requested: Amount,
    },

    /// A balance or the total supply would exceed `u128::MAX`.
    #[error("native balance overflow")]
    Overflow,
}

impl HasErrorKind for BankError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientBalance,
            Self::Overflow => ErrorKind::Overflow,
        }
    }
}

// ---------------------------------------------------------------------------
// NativeBank
// ---------------------------------------------------------------------------

/// Address-to-balance table for the native currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBank {
    balances: BTreeMap<Address, Amount>,
    total_supply: Amount,
}

impl NativeBank {
    /// An empty bank with zero supply.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `amount` new SHM at `to`. Used for genesis allocations.
    pub fn credit(&mut self, to: &Address, amount: Amount) -> Result<(), BankError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(BankError::Overflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(BankError::Overflow)?;

        self.total_supply = supply;
        self.balances.insert(*to, balance);
        trace!(%to, amount, "native credit");
        Ok(())
    }

    /// Moves `amount` SHM from `from` to `to`. Nothing changes on failure.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), BankError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(BankError::InsufficientFunds {
                address: *from,
                available,
                requested: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(BankError::Overflow)?;

        self.set_balance(from, available - amount);
        self.set_balance(to, credited);
        trace!(%from, %to, amount, "native transfer");
        Ok(())
    }

    /// Current SHM balance; zero for unseen addresses.
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Total SHM in existence.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Number of addresses holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    fn set_balance(&mut self, address: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(address);
        } else {
            self.balances.insert(*address, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    #[test]
    fn credit_increases_balance_and_supply() {
        let mut bank = NativeBank::new();
        bank.credit(&alice(), 500).unwrap();
        bank.credit(&alice(), 250).unwrap();
        assert_eq!(bank.balance_of(&alice()), 750);
        assert_eq!(bank.total_supply(), 750);
    }

    #[test]
    fn transfer_moves_funds() {
        let mut bank = NativeBank::new();
        bank.credit(&alice(), 1_000).unwrap();
        bank.transfer(&alice(), &bob(), 400).unwrap();
        assert_eq!(bank.balance_of(&alice()), 600);
        assert_eq!(bank.balance_of(&bob()), 400);
        assert_eq!(bank.total_supply(), 1_000);
    }

    #[test]
    fn overdraft_is_rejected_without_side_effects() {
        let mut bank = NativeBank::new();
        bank.credit(&alice(), 100).unwrap();
        let before = bank.clone();

        let err = bank.transfer(&alice(), &bob(), 101).unwrap_err();
        assert_eq!(
            err,
            BankError::InsufficientFunds {
                address: alice(),
                available: 100,
                requested: 101,
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(bank, before);
    }

    #[test]
    fn draining_an_account_removes_it() {
        let mut bank = NativeBank::new();
        bank.credit(&alice(), 10).unwrap();
        bank.transfer(&alice(), &bob(), 10).unwrap();
        assert_eq!(bank.balance_of(&alice()), 0);
        assert_eq!(bank.holder_count(), 1);
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let mut bank = NativeBank::new();
        bank.credit(&alice(), 10).unwrap();
        bank.transfer(&alice(), &alice(), 10).unwrap();
        assert_eq!(bank.balance_of(&alice()), 10);
    }

    #[test]
    fn supply_overflow_is_detected() {
        let mut bank = NativeBank::new();
        bank.credit(&alice(), Amount::MAX).unwrap();
        assert_eq!(bank.credit(&bob(), 1), Err(BankError::Overflow));
        assert_eq!(bank.balance_of(&bob()), 0);
    }
}
