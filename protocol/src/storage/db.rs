//! # LedgerDB — Persistent Storage Engine
//!
//! The persistence layer for the vault ledger, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                 | Value                     |
//! |------------|---------------------|---------------------------|
//! | `state`    | name (UTF-8)        | `bincode(T)` snapshot     |
//! | `receipts` | `tx_hash` (32B)     | `bincode(Receipt)`        |
//! | `events`   | `seq` (8B BE)       | `bincode(EventRecord)`    |
//! | `metadata` | key (UTF-8)         | value (bytes)             |
//!
//! Event sequence numbers are stored big-endian so that sled's
//! lexicographic ordering matches numeric ordering and paging through the
//! log is a plain range scan.
//!
//! The world state is small (a handful of maps), so it is stored as one
//! snapshot and rewritten after every committed transaction rather than
//! diffed.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Batch, Db, Tree};

use crate::config::STORAGE_SCHEMA_VERSION;
use crate::env::BlockInfo;
use crate::events::EventRecord;
use crate::transaction::{Receipt, TxHash};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported storage schema {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Well-known Keys
// ---------------------------------------------------------------------------

/// Key in the `state` tree holding the world-state snapshot.
pub const WORLD_STATE_KEY: &str = "world";

const META_LATEST_BLOCK: &[u8] = b"latest_block";
const META_SCHEMA_VERSION: &[u8] = b"schema_version";

fn encode<T: Serialize + ?Sized>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// LedgerDB
// ---------------------------------------------------------------------------

/// Persistent storage for world state, receipts and the event log.
///
/// sled trees support concurrent readers, so `LedgerDB` can be shared via
/// `Arc<LedgerDB>` without external locking.
#[derive(Debug, Clone)]
pub struct LedgerDB {
    db: Db,
    state: Tree,
    receipts: Tree,
    events: Tree,
    metadata: Tree,
}

impl LedgerDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database, removed when dropped. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let state = db.open_tree("state")?;
        let receipts = db.open_tree("receipts")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;

        match metadata.get(META_SCHEMA_VERSION)? {
            Some(bytes) => {
                let found = u32::from_be_bytes(bytes.as_ref().try_into().map_err(|_| {
                    DbError::Serialization("invalid schema version bytes".to_string())
                })?);
                if found != STORAGE_SCHEMA_VERSION {
                    return Err(DbError::SchemaMismatch {
                        found,
                        expected: STORAGE_SCHEMA_VERSION,
                    });
                }
            }
            None => {
                metadata.insert(
                    META_SCHEMA_VERSION,
                    STORAGE_SCHEMA_VERSION.to_be_bytes().to_vec(),
                )?;
            }
        }

        Ok(Self {
            db,
            state,
            receipts,
            events,
            metadata,
        })
    }

    // -- State snapshots ----------------------------------------------------

    /// Store a named snapshot.
    pub fn put_state<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        self.state.insert(key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Load a named snapshot. `None` on a fresh database.
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        self.state
            .get(key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    // -- Receipts & events ----------------------------------------------------

    /// Persist everything one executed transaction produced.
    ///
    /// Writes the receipt, its events (when it committed), the new world
    /// snapshot and the latest block, then flushes.
    pub fn persist_transaction<T: Serialize>(
        &self,
        world: &T,
        block: BlockInfo,
        receipt: &Receipt,
    ) -> DbResult<()> {
        self.receipts
            .insert(receipt.tx_hash.as_bytes(), encode(receipt)?)?;
        self.append_events(&receipt.events)?;
        self.put_state(WORLD_STATE_KEY, world)?;
        self.set_latest_block(block)?;
        self.db.flush()?;
        Ok(())
    }

    /// Store a receipt on its own.
    pub fn put_receipt(&self, receipt: &Receipt) -> DbResult<()> {
        self.receipts
            .insert(receipt.tx_hash.as_bytes(), encode(receipt)?)?;
        Ok(())
    }

    /// Retrieve a receipt by transaction hash.
    pub fn get_receipt(&self, hash: &TxHash) -> DbResult<Option<Receipt>> {
        self.receipts
            .get(hash.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Append event records in one batch.
    pub fn append_events(&self, records: &[EventRecord]) -> DbResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::default();
        for record in records {
            batch.insert(record.seq.to_be_bytes().to_vec(), encode(record)?);
        }
        self.events.apply_batch(batch)?;
        Ok(())
    }

    /// Up to `limit` event records with `seq >= from`, ascending.
    pub fn events_from(&self, from: u64, limit: usize) -> DbResult<Vec<EventRecord>> {
        let mut records = Vec::new();
        for result in self.events.range(from.to_be_bytes()..).take(limit) {
            let (_key, value) = result?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }

    // -- Metadata -------------------------------------------------------------

    /// The block the last persisted transaction executed in.
    pub fn latest_block(&self) -> DbResult<Option<BlockInfo>> {
        self.metadata
            .get(META_LATEST_BLOCK)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn set_latest_block(&self, block: BlockInfo) -> DbResult<()> {
        self.metadata.insert(META_LATEST_BLOCK, encode(&block)?)?;
        Ok(())
    }

    // -- Utility ----------------------------------------------------------------

    pub fn receipt_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::error::ErrorKind;
    use crate::events::LedgerEvent;
    use crate::transaction::TxStatus;
    use std::collections::BTreeMap;

    // -- Helpers ------------------------------------------------------------

    fn make_record(seq: u64) -> EventRecord {
        EventRecord {
            seq,
            block_number: 1,
            tx_hash: TxHash::compute(&Address::from_label("user1"), seq, b"deposit"),
            emitter: Address::from_label("vault"),
            event: LedgerEvent::Deposited {
                vault_id: 1,
                user: Address::from_label("user1"),
                amount: 3,
                timestamp: 1_700_000_000,
            },
        }
    }

    fn make_receipt(nonce: u64, events: Vec<EventRecord>) -> Receipt {
        Receipt {
            tx_hash: TxHash::compute(&Address::from_label("user1"), nonce, b"deposit"),
            block_number: 1,
            sender: Address::from_label("user1"),
            method: "deposit".to_string(),
            status: TxStatus::Success,
            events,
        }
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn open_temporary_database() {
        let db = LedgerDB::open_temporary().expect("should create temp db");
        assert_eq!(db.receipt_count(), 0);
        assert_eq!(db.event_count(), 0);
        assert!(db.latest_block().unwrap().is_none());
    }

    #[test]
    fn reopen_persistent_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = LedgerDB::open(dir.path()).expect("should open db");
            db.put_state("counter", &42u64).unwrap();
            db.flush().unwrap();
        }
        let db = LedgerDB::open(dir.path()).expect("should reopen db");
        assert_eq!(db.get_state::<u64>("counter").unwrap(), Some(42));
    }

    #[test]
    fn state_snapshot_round_trip() {
        let db = LedgerDB::open_temporary().unwrap();
        assert!(db.get_state::<BTreeMap<u64, u128>>(WORLD_STATE_KEY).unwrap().is_none());

        let mut world = BTreeMap::new();
        world.insert(1u64, 3u128);
        world.insert(2u64, 7u128);
        db.put_state(WORLD_STATE_KEY, &world).unwrap();

        let loaded: BTreeMap<u64, u128> = db.get_state(WORLD_STATE_KEY).unwrap().unwrap();
        assert_eq!(loaded, world);
    }

    #[test]
    fn persist_transaction_writes_every_tree() {
        let db = LedgerDB::open_temporary().unwrap();
        let receipt = make_receipt(0, vec![make_record(0), make_record(1)]);
        let block = BlockInfo {
            number: 1,
            timestamp: 1_700_000_000,
        };

        db.persist_transaction(&7u32, block, &receipt).unwrap();

        assert_eq!(db.get_receipt(&receipt.tx_hash).unwrap(), Some(receipt));
        assert_eq!(db.event_count(), 2);
        assert_eq!(db.latest_block().unwrap(), Some(block));
        assert_eq!(db.get_state::<u32>(WORLD_STATE_KEY).unwrap(), Some(7));
    }

    #[test]
    fn reverted_receipt_is_stored_without_events() {
        let db = LedgerDB::open_temporary().unwrap();
        let mut receipt = make_receipt(3, vec![]);
        receipt.status = TxStatus::Reverted {
            kind: ErrorKind::InsufficientBalance,
            reason: "withdraw 5 exceeds balance 1".into(),
        };
        db.put_receipt(&receipt).unwrap();

        let stored = db.get_receipt(&receipt.tx_hash).unwrap().unwrap();
        assert_eq!(stored.revert_kind(), Some(ErrorKind::InsufficientBalance));
        assert_eq!(db.event_count(), 0);
    }

    #[test]
    fn unknown_receipt_is_none() {
        let db = LedgerDB::open_temporary().unwrap();
        assert!(db.get_receipt(&TxHash::default()).unwrap().is_none());
    }

    #[test]
    fn events_page_in_numeric_order() {
        let db = LedgerDB::open_temporary().unwrap();
        // Past 255 so a little-endian key layout would sort wrongly.
        let records: Vec<_> = (0..300).map(make_record).collect();
        db.append_events(&records).unwrap();

        let page = db.events_from(250, 10).unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page.first().unwrap().seq, 250);
        assert_eq!(page.last().unwrap().seq, 259);

        let tail = db.events_from(295, 100).unwrap();
        assert_eq!(tail.len(), 5);
        assert!(db.events_from(300, 10).unwrap().is_empty());
    }

    #[test]
    fn schema_version_is_checked_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = LedgerDB::open(dir.path()).unwrap();
            db.metadata
                .insert(META_SCHEMA_VERSION, 99u32.to_be_bytes().to_vec())
                .unwrap();
            db.flush().unwrap();
        }
        match LedgerDB::open(dir.path()) {
            Err(DbError::SchemaMismatch { found, expected }) => {
                assert_eq!(found, 99);
                assert_eq!(expected, STORAGE_SCHEMA_VERSION);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_reads_do_not_block() {
        use std::sync::Arc;
        use std::thread;

        let db = Arc::new(LedgerDB::open_temporary().unwrap());
        let records: Vec<_> = (0..20).map(make_record).collect();
        db.append_events(&records).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    let page = db.events_from(0, 20).unwrap();
                    assert_eq!(page.len(), 20);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("reader thread should not panic");
        }
    }
}
