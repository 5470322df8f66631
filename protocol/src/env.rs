//! # Execution Environment
//!
//! The context a component sees while a transaction runs: the current
//! block and a buffer for emitted events. Components never publish events
//! directly; the executor drains the buffer into [`EventRecord`]s once the
//! transaction has committed, and drops it on revert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Address;
use crate::events::{EventRecord, LedgerEvent};
use crate::transaction::TxHash;

/// Block context. `timestamp` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

impl BlockInfo {
    /// Block `number` stamped with the current wall-clock time.
    pub fn now(number: u64) -> Self {
        Self {
            number,
            timestamp: Utc::now().timestamp().max(0) as u64,
        }
    }

    /// The timestamp as a UTC datetime, if representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Per-transaction execution environment.
#[derive(Debug, Clone)]
pub struct Env {
    block: BlockInfo,
    tx_hash: TxHash,
    pending: Vec<(Address, LedgerEvent)>,
}

impl Env {
    pub fn new(block: BlockInfo, tx_hash: TxHash) -> Self {
        Self {
            block,
            tx_hash,
            pending: Vec::new(),
        }
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    /// Timestamp stamped onto `Deposited`, `Withdrawn` and friends.
    pub fn timestamp(&self) -> u64 {
        self.block.timestamp
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// Buffers an event emitted by the component at `emitter`.
    pub fn emit(&mut self, emitter: Address, event: LedgerEvent) {
        debug!(%emitter, event = event.name(), "event emitted");
        self.pending.push((emitter, event));
    }

    /// Events buffered so far, in emission order.
    pub fn pending(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.pending.iter().map(|(_, e)| e)
    }

    /// Consumes the environment, numbering events from `first_seq`.
    pub fn into_records(self, first_seq: u64) -> Vec<EventRecord> {
        let Env {
            block,
            tx_hash,
            pending,
        } = self;

        pending
            .into_iter()
            .zip(first_seq..)
            .map(|((emitter, event), seq)| EventRecord {
                seq,
                block_number: block.number,
                tx_hash,
                emitter,
                event,
            })
            .collect()
    }
}
