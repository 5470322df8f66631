//! # Error Taxonomy
//!
//! Each component has its own `thiserror` enum with precise variants and
//! messages. Callers outside the component (the executor, the receipt
//! store, the HTTP layer) only care about the *kind* of failure, so every
//! component error maps onto one [`ErrorKind`] through [`HasErrorKind`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a failed ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The referenced vault (or other entity) was never created.
    NotFound,
    /// The entity being created already exists.
    AlreadyExists,
    /// The caller lacks the owner or authorized-withdrawer privilege.
    Unauthorized,
    /// A withdrawal policy contract has not been registered with the vault.
    NotAuthorized,
    /// A debit exceeds the recorded balance.
    InsufficientBalance,
    /// A `transfer_from` exceeds the spender's allowance.
    InsufficientAllowance,
    /// A token pull or push failed.
    TransferFailed,
    /// A yield claim computed a zero share, or was already made this round.
    NothingToClaim,
    /// Malformed request: zero amount, zero address, empty denominator.
    InvalidInput,
    /// Arithmetic left the representable range.
    Overflow,
}

impl ErrorKind {
    /// Stable snake_case identifier, used in receipts and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Unauthorized => "unauthorized",
            Self::NotAuthorized => "not_authorized",
            Self::InsufficientBalance => "insufficient_balance",
            Self::InsufficientAllowance => "insufficient_allowance",
            Self::TransferFailed => "transfer_failed",
            Self::NothingToClaim => "nothing_to_claim",
            Self::InvalidInput => "invalid_input",
            Self::Overflow => "overflow",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error that can abort a ledger transaction.
pub trait HasErrorKind {
    /// The taxonomy bucket this error falls into.
    fn kind(&self) -> ErrorKind;
}

impl HasErrorKind for crate::units::UnitsError {
    fn kind(&self) -> ErrorKind {
        use crate::units::UnitsError;
        match self {
            UnitsError::Overflow => ErrorKind::Overflow,
            UnitsError::InvalidNumber(_)
            | UnitsError::TooManyDecimals { .. }
            | UnitsError::DivisionByZero => ErrorKind::InvalidInput,
        }
    }
}
