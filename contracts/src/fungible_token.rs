//! # Fungible Token Contract
//!
//! A minimal mintable ERC-20 style ledger. It backs the reward currency
//! that [`YieldVault`](crate::yield_vault::YieldVault) pays out, and is
//! deliberately boring: balances, allowances, an owner who may mint.
//!
//! ## Semantics
//!
//! - `mint` is owner-only and reported as `Transfer(0x0, to, amount)`.
//! - `transfer` and `transfer_from` emit `Transfer`; `approve` emits
//!   `Approval` and overwrites the previous allowance.
//! - Zero-value transfers are legal, transfers to the zero address are not.
//! - An infinite allowance (`u128::MAX`) is never decremented.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shm_protocol::error::{ErrorKind, HasErrorKind};
use shm_protocol::{Address, Amount, Env, LedgerEvent};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Only the token owner may mint.
    #[error("unauthorized: {caller} is not the token owner")]
    NotOwner {
        /// The account that attempted the call.
        caller: Address,
    },

    /// The sender does not hold enough tokens.
    #[error("insufficient token balance: {account} has {balance}, needs {requested}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        requested: Amount,
    },

    /// The spender's allowance does not cover the transfer.
    #[error("insufficient allowance: {spender} may spend {allowance} of {owner}'s tokens, needs {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        requested: Amount,
    },

    /// Tokens cannot be sent to, or approved for, the zero address.
    #[error("zero address is not a valid {0}")]
    ZeroAddress(&'static str),

    /// Minting would overflow the total supply.
    #[error("supply overflow: minting {amount} exceeds u128::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: Amount,
    },
}

impl HasErrorKind for TokenError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOwner { .. } => ErrorKind::Unauthorized,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            Self::ZeroAddress(_) => ErrorKind::InvalidInput,
            Self::SupplyOverflow { .. } => ErrorKind::Overflow,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenLedger capability
// ---------------------------------------------------------------------------

/// What another component may do with a token it was handed.
///
/// The yield vault only ever sees a `&mut dyn TokenLedger`, so it can pull
/// approved funds and pay out its own holdings but cannot mint.
pub trait TokenLedger {
    /// Address of the token contract.
    fn address(&self) -> Address;

    fn balance_of(&self, owner: &Address) -> Amount;

    /// Moves `amount` from `caller` to `to`.
    fn transfer(
        &mut self,
        env: &mut Env,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError>;

    /// Moves `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &mut self,
        env: &mut Env,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError>;
}

// ---------------------------------------------------------------------------
// FungibleToken
// ---------------------------------------------------------------------------

/// The reward token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleToken {
    address: Address,
    owner: Address,
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    /// `owner -> spender -> remaining allowance`.
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

impl FungibleToken {
    /// Creates a token with zero supply, owned by `owner`.
    pub fn new(
        address: Address,
        owner: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            address,
            owner,
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    /// Mints new tokens to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotOwner`] if `caller` is not the owner,
    /// [`TokenError::ZeroAddress`] for a zero recipient and
    /// [`TokenError::SupplyOverflow`] if the supply would overflow.
    pub fn mint(
        &mut self,
        env: &mut Env,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if *caller != self.owner {
            return Err(TokenError::NotOwner { caller: *caller });
        }
        if to.is_zero() {
            return Err(TokenError::ZeroAddress("recipient"));
        }

        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;

        self.total_supply = supply;
        self.balances.insert(*to, balance);

        env.emit(
            self.address,
            LedgerEvent::Transfer {
                from: Address::ZERO,
                to: *to,
                value: amount,
            },
        );
        Ok(())
    }

    /// Sets `spender`'s allowance over `caller`'s tokens to `amount`.
    pub fn approve(
        &mut self,
        env: &mut Env,
        caller: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if spender.is_zero() {
            return Err(TokenError::ZeroAddress("spender"));
        }

        let approvals = self.allowances.entry(*caller).or_default();
        if amount == 0 {
            approvals.remove(spender);
            if approvals.is_empty() {
                self.allowances.remove(caller);
            }
        } else {
            approvals.insert(*spender, amount);
        }

        env.emit(
            self.address,
            LedgerEvent::Approval {
                owner: *caller,
                spender: *spender,
                value: amount,
            },
        );
        Ok(())
    }

    /// Remaining amount `spender` may move out of `owner`'s balance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|approvals| approvals.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Number of accounts with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    fn move_balance(
        &mut self,
        env: &mut Env,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress("recipient"));
        }

        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                balance,
                requested: amount,
            });
        }

        if from != to && amount > 0 {
            // Cannot overflow: the sum of all balances is the total supply.
            let credited = self.balance_of(to) + amount;
            self.set_balance(from, balance - amount);
            self.set_balance(to, credited);
        }

        env.emit(
            self.address,
            LedgerEvent::Transfer {
                from: *from,
                to: *to,
                value: amount,
            },
        );
        Ok(())
    }

    fn set_balance(&mut self, account: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, amount);
        }
    }
}

impl TokenLedger for FungibleToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        env: &mut Env,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.move_balance(env, caller, to, amount)
    }

    fn transfer_from(
        &mut self,
        env: &mut Env,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                allowance,
                requested: amount,
            });
        }

        self.move_balance(env, from, to, amount)?;

        if allowance != Amount::MAX && amount > 0 {
            let remaining = allowance - amount;
            let approvals = self.allowances.entry(*from).or_default();
            if remaining == 0 {
                approvals.remove(spender);
                if approvals.is_empty() {
                    self.allowances.remove(from);
                }
            } else {
                approvals.insert(*spender, remaining);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_protocol::{BlockInfo, TxHash};

    fn env() -> Env {
        Env::new(BlockInfo::default(), TxHash::default())
    }

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn token_with_supply(amount: Amount) -> FungibleToken {
        let mut token = FungibleToken::new(
            Address::from_label("token"),
            owner(),
            "Shardeum Token",
            "SHM",
            18,
        );
        token.mint(&mut env(), &owner(), &owner(), amount).unwrap();
        token
    }

    #[test]
    fn mint_increases_supply_and_emits_transfer_from_zero() {
        let mut token = token_with_supply(0);
        let mut env = env();
        token.mint(&mut env, &owner(), &alice(), 100).unwrap();

        assert_eq!(token.total_supply(), 100);
        assert_eq!(token.balance_of(&alice()), 100);
        let events: Vec<_> = env.pending().cloned().collect();
        assert_eq!(
            events,
            vec![LedgerEvent::Transfer {
                from: Address::ZERO,
                to: alice(),
                value: 100,
            }]
        );
    }

    #[test]
    fn only_owner_can_mint() {
        let mut token = token_with_supply(0);
        let err = token.mint(&mut env(), &alice(), &alice(), 1).unwrap_err();
        assert_eq!(err, TokenError::NotOwner { caller: alice() });
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(token.total_supply(), 0);
    }

    #[test]
    fn transfer_moves_balance() {
        let mut token = token_with_supply(100);
        token.transfer(&mut env(), &owner(), &alice(), 40).unwrap();
        assert_eq!(token.balance_of(&owner()), 60);
        assert_eq!(token.balance_of(&alice()), 40);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn transfer_beyond_balance_fails_cleanly() {
        let mut token = token_with_supply(100);
        let before = token.clone();
        let err = token.transfer(&mut env(), &owner(), &alice(), 101).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(token, before);
    }

    #[test]
    fn transfer_to_zero_address_rejected() {
        let mut token = token_with_supply(100);
        let err = token
            .transfer(&mut env(), &owner(), &Address::ZERO, 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let mut token = token_with_supply(100);
        token.approve(&mut env(), &owner(), &alice(), 70).unwrap();
        token
            .transfer_from(&mut env(), &alice(), &owner(), &bob(), 50)
            .unwrap();

        assert_eq!(token.balance_of(&bob()), 50);
        assert_eq!(token.allowance(&owner(), &alice()), 20);
    }

    #[test]
    fn transfer_from_without_allowance_fails() {
        let mut token = token_with_supply(100);
        token.approve(&mut env(), &owner(), &alice(), 10).unwrap();
        let err = token
            .transfer_from(&mut env(), &alice(), &owner(), &bob(), 11)
            .unwrap_err();
        assert_eq!(
            err,
            TokenError::InsufficientAllowance {
                owner: owner(),
                spender: alice(),
                allowance: 10,
                requested: 11,
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
        assert_eq!(token.balance_of(&owner()), 100);
    }

    #[test]
    fn transfer_from_keeps_allowance_when_balance_short() {
        let mut token = token_with_supply(5);
        token.approve(&mut env(), &owner(), &alice(), 10).unwrap();
        let err = token
            .transfer_from(&mut env(), &alice(), &owner(), &bob(), 10)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(token.allowance(&owner(), &alice()), 10);
    }

    #[test]
    fn infinite_allowance_is_not_decremented() {
        let mut token = token_with_supply(100);
        token
            .approve(&mut env(), &owner(), &alice(), Amount::MAX)
            .unwrap();
        token
            .transfer_from(&mut env(), &alice(), &owner(), &bob(), 30)
            .unwrap();
        assert_eq!(token.allowance(&owner(), &alice()), Amount::MAX);
    }

    #[test]
    fn approve_overwrites_and_emits() {
        let mut token = token_with_supply(0);
        let mut env = env();
        token.approve(&mut env, &owner(), &alice(), 5).unwrap();
        token.approve(&mut env, &owner(), &alice(), 0).unwrap();
        assert_eq!(token.allowance(&owner(), &alice()), 0);
        assert_eq!(env.pending().count(), 2);
    }

    #[test]
    fn metadata_accessors() {
        let token = token_with_supply(1);
        assert_eq!(token.name(), "Shardeum Token");
        assert_eq!(token.symbol(), "SHM");
        assert_eq!(token.decimals(), 18);
        assert_eq!(token.owner(), owner());
        assert_eq!(token.holder_count(), 1);
    }
}
