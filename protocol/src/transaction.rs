//! # Transaction Hashes & Receipts
//!
//! A transaction's identity is a BLAKE3 digest over its sender, the
//! sender's nonce and the encoded call, so two otherwise identical calls
//! from the same account never collide. Every executed transaction leaves a
//! [`Receipt`], including reverted ones: the receipt is how a client learns
//! *why* its call failed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::error::ErrorKind;
use crate::events::EventRecord;

/// Byte length of a transaction hash.
pub const TX_HASH_LENGTH: usize = 32;

/// BLAKE3 identity of an executed transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TxHash([u8; TX_HASH_LENGTH]);

impl TxHash {
    /// Hashes `(sender, nonce, payload)` with a domain separator.
    pub fn compute(sender: &Address, nonce: u64, payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"shm-vault/tx/");
        hasher.update(sender.as_bytes());
        hasher.update(&nonce.to_be_bytes());
        hasher.update(payload);
        Self(*hasher.finalize().as_bytes())
    }

    /// Wraps raw hash bytes.
    pub const fn from_bytes(bytes: [u8; TX_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; TX_HASH_LENGTH] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex rendering.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

impl FromStr for TxHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let payload = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; TX_HASH_LENGTH];
        hex::decode_to_slice(payload, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Outcome of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// All effects were committed.
    Success,
    /// Nothing was committed.
    Reverted {
        /// Error classification.
        kind: ErrorKind,
        /// Human-readable reason.
        reason: String,
    },
}

impl TxStatus {
    /// `true` for [`TxStatus::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Record of one executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub sender: Address,
    /// Name of the invoked entry point, e.g. `"deposit"`.
    pub method: String,
    pub status: TxStatus,
    /// Events published by the transaction. Always empty when reverted.
    pub events: Vec<EventRecord>,
}

impl Receipt {
    /// The error kind of a reverted transaction.
    pub fn revert_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            TxStatus::Success => None,
            TxStatus::Reverted { kind, .. } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_every_input() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let base = TxHash::compute(&alice, 0, b"deposit");
        assert_ne!(base, TxHash::compute(&bob, 0, b"deposit"));
        assert_ne!(base, TxHash::compute(&alice, 1, b"deposit"));
        assert_ne!(base, TxHash::compute(&alice, 0, b"withdraw"));
        assert_eq!(base, TxHash::compute(&alice, 0, b"deposit"));
    }

    #[test]
    fn hex_parse_accepts_prefix() {
        let hash = TxHash::compute(&Address::from_label("alice"), 7, b"x");
        assert_eq!(hash.to_hex().parse::<TxHash>().unwrap(), hash);
        assert_eq!(hash.to_hex()[2..].parse::<TxHash>().unwrap(), hash);
        assert!("0x1234".parse::<TxHash>().is_err());
    }

    #[test]
    fn reverted_status_serializes_with_kind() {
        let status = TxStatus::Reverted {
            kind: ErrorKind::NothingToClaim,
            reason: "already claimed".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["reverted"]["kind"], "nothing_to_claim");
        assert!(!status.is_success());
    }
}
