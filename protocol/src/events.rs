//! # Ledger Events
//!
//! Events are the only interface the off-chain indexer consumes. Components
//! emit them into the transaction's [`Env`](crate::env::Env); the executor
//! stamps them with a chain-wide sequence number and publishes them only if
//! the transaction commits. A reverted transaction publishes nothing.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::transaction::TxHash;
use crate::units::{Amount, VaultId};

/// Every event a component can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    // -- DepositVault -------------------------------------------------------
    VaultCreated {
        vault_id: VaultId,
    },
    Deposited {
        vault_id: VaultId,
        user: Address,
        #[serde(with = "crate::units::amount_string")]
        amount: Amount,
        timestamp: u64,
    },
    Withdrawn {
        vault_id: VaultId,
        user: Address,
        #[serde(with = "crate::units::amount_string")]
        amount: Amount,
        timestamp: u64,
    },
    AuthorizedWithdrawerSet {
        withdrawer: Address,
        allowed: bool,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },

    // -- WithdrawHandler ----------------------------------------------------
    WithdrawRequested {
        user: Address,
        vault_id: VaultId,
        #[serde(with = "crate::units::amount_string")]
        amount: Amount,
        timestamp: u64,
    },

    // -- YieldVault ---------------------------------------------------------
    RewardsFunded {
        vault_id: VaultId,
        funder: Address,
        #[serde(with = "crate::units::amount_string")]
        amount: Amount,
        round: u64,
        #[serde(with = "crate::units::amount_string")]
        snapshot_total: Amount,
    },
    YieldClaimed {
        vault_id: VaultId,
        user: Address,
        #[serde(with = "crate::units::amount_string")]
        amount: Amount,
        round: u64,
    },

    // -- FungibleToken ------------------------------------------------------
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "crate::units::amount_string")]
        value: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "crate::units::amount_string")]
        value: Amount,
    },
}

impl LedgerEvent {
    /// The event's name as the indexer knows it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VaultCreated { .. } => "VaultCreated",
            Self::Deposited { .. } => "Deposited",
            Self::Withdrawn { .. } => "Withdrawn",
            Self::AuthorizedWithdrawerSet { .. } => "AuthorizedWithdrawerSet",
            Self::OwnershipTransferred { .. } => "OwnershipTransferred",
            Self::WithdrawRequested { .. } => "WithdrawRequested",
            Self::RewardsFunded { .. } => "RewardsFunded",
            Self::YieldClaimed { .. } => "YieldClaimed",
            Self::Transfer { .. } => "Transfer",
            Self::Approval { .. } => "Approval",
        }
    }

    /// The vault an event concerns, if any.
    pub fn vault_id(&self) -> Option<VaultId> {
        match self {
            Self::VaultCreated { vault_id }
            | Self::Deposited { vault_id, .. }
            | Self::Withdrawn { vault_id, .. }
            | Self::WithdrawRequested { vault_id, .. }
            | Self::RewardsFunded { vault_id, .. }
            | Self::YieldClaimed { vault_id, .. } => Some(*vault_id),
            _ => None,
        }
    }
}

/// A committed event with its position in the chain-wide log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Gap-free, chain-wide sequence number starting at 0.
    pub seq: u64,
    pub block_number: u64,
    pub tx_hash: TxHash,
    /// Address of the component that emitted the event.
    pub emitter: Address,
    pub event: LedgerEvent,
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only, in-memory log of committed events.
///
/// A node restored from disk starts a fresh log at the persisted sequence
/// number; older records are served from storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    first_seq: u64,
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty log whose first record will carry `seq`.
    pub fn starting_at(seq: u64) -> Self {
        Self {
            first_seq: seq,
            records: Vec::new(),
        }
    }

    /// Sequence number the next appended record must carry.
    pub fn next_seq(&self) -> u64 {
        self.first_seq + self.records.len() as u64
    }

    /// Appends records produced by one committed transaction.
    ///
    /// Records are expected to continue the sequence exactly; a record that
    /// does not is skipped so the log stays gap-free.
    pub fn extend(&mut self, records: impl IntoIterator<Item = EventRecord>) {
        for record in records {
            if record.seq == self.next_seq() {
                self.records.push(record);
            }
        }
    }

    /// Drops every record with a sequence number of `next_seq` or later.
    pub fn truncate(&mut self, next_seq: u64) {
        let keep = usize::try_from(next_seq.saturating_sub(self.first_seq)).unwrap_or(usize::MAX);
        self.records.truncate(keep);
    }

    /// Up to `limit` records starting at sequence number `from`. Records
    /// older than the log's first entry are not available here.
    pub fn since(&self, from: u64, limit: usize) -> &[EventRecord] {
        let offset = from.saturating_sub(self.first_seq);
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        let end = start.saturating_add(limit).min(self.records.len());
        &self.records[start..end]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: u64) -> EventRecord {
        EventRecord {
            seq,
            block_number: 1,
            tx_hash: TxHash::default(),
            emitter: Address::from_label("vault"),
            event: LedgerEvent::VaultCreated { vault_id: seq },
        }
    }

    #[test]
    fn names_match_indexer_vocabulary() {
        let e = LedgerEvent::WithdrawRequested {
            user: Address::ZERO,
            vault_id: 1,
            amount: 2,
            timestamp: 3,
        };
        assert_eq!(e.name(), "WithdrawRequested");
        assert_eq!(e.vault_id(), Some(1));

        let t = LedgerEvent::Transfer {
            from: Address::ZERO,
            to: Address::ZERO,
            value: 1,
        };
        assert_eq!(t.vault_id(), None);
    }

    #[test]
    fn log_pages_by_sequence() {
        let mut log = EventLog::new();
        log.extend((0..5).map(record));
        assert_eq!(log.len(), 5);
        assert_eq!(log.next_seq(), 5);

        let page = log.since(1, 2);
        assert_eq!(page.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![1, 2]);
        assert!(log.since(10, 5).is_empty());
        assert_eq!(log.since(3, 100).len(), 2);
    }

    #[test]
    fn restored_log_continues_the_sequence() {
        let mut log = EventLog::starting_at(40);
        log.extend((38..40).map(record));
        assert_eq!(log.len(), 0);

        log.extend((40..43).map(record));
        assert_eq!(log.next_seq(), 43);
        assert_eq!(log.since(0, 10).first().map(|r| r.seq), Some(40));
        assert_eq!(log.since(42, 10).len(), 1);
    }

    #[test]
    fn log_rejects_gaps() {
        let mut log = EventLog::new();
        log.extend([record(0), record(2)]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn events_survive_bincode() {
        let r = record(0);
        let bytes = bincode::serialize(&r).unwrap();
        let back: EventRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, r);
    }
}
