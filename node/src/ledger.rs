//! # Ledger Service
//!
//! Wraps the in-memory [`Chain`] with persistence, metrics and live event
//! fan-out. All writes go through [`Ledger::submit`] and
//! [`Ledger::advance_block`], which hold the chain's write lock for the
//! whole execute-and-persist step so the database never sees transactions
//! out of order.

use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use shm_contracts::chain::{Chain, ChainState, Transaction};
use shm_contracts::genesis::{Deployment, GenesisConfig};
use shm_protocol::storage::{DbResult, LedgerDB, WORLD_STATE_KEY};
use shm_protocol::{BlockInfo, EventRecord, Receipt};

use crate::metrics::SharedMetrics;

/// Key in the `state` tree holding the genesis deployment addresses.
pub const DEPLOYMENT_KEY: &str = "deployment";

/// Messages pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// The block clock advanced.
    NewBlock { number: u64, timestamp: u64 },
    /// A committed ledger event.
    Event { record: EventRecord },
}

pub struct Ledger {
    chain: RwLock<Chain>,
    db: LedgerDB,
    deployment: Deployment,
    event_tx: broadcast::Sender<NodeEvent>,
    metrics: SharedMetrics,
}

impl Ledger {
    /// Restores the ledger from `db`, or applies `genesis` to an empty one.
    pub fn open(
        db: LedgerDB,
        genesis: &GenesisConfig,
        event_tx: broadcast::Sender<NodeEvent>,
        metrics: SharedMetrics,
    ) -> Result<Self> {
        let state: Option<ChainState> = db
            .get_state(WORLD_STATE_KEY)
            .context("failed to read world state")?;
        let deployment: Option<Deployment> = db
            .get_state(DEPLOYMENT_KEY)
            .context("failed to read deployment")?;

        let (chain, deployment) = match (state, deployment) {
            (Some(state), Some(deployment)) => {
                let chain = Chain::from_state(state);
                info!(
                    block = chain.block().number,
                    tx_count = chain.tx_count(),
                    next_event = chain.next_event_seq(),
                    "ledger restored from disk"
                );
                (chain, deployment)
            }
            (None, None) => {
                let genesis = genesis.build().context("failed to apply genesis")?;
                persist_genesis(&db, &genesis.chain, &genesis.deployment, &genesis.receipts)
                    .context("failed to persist genesis")?;
                info!(receipts = genesis.receipts.len(), "genesis persisted");
                (genesis.chain, genesis.deployment)
            }
            (state, deployment) => {
                anyhow::bail!(
                    "database is partially initialized (world state {}, deployment {}); \
                     refusing to apply genesis over it",
                    if state.is_some() { "present" } else { "missing" },
                    if deployment.is_some() { "present" } else { "missing" },
                );
            }
        };

        metrics.set_block_height(chain.block().number);
        metrics.set_total_value_locked(chain.total_value_locked());

        Ok(Self {
            chain: RwLock::new(chain),
            db,
            deployment,
            event_tx,
            metrics,
        })
    }

    pub fn deployment(&self) -> Deployment {
        self.deployment
    }

    pub fn db(&self) -> &LedgerDB {
        &self.db
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    /// Runs `f` against a read-locked chain.
    pub async fn read<R>(&self, f: impl FnOnce(&Chain) -> R) -> R {
        let chain = self.chain.read().await;
        f(&chain)
    }

    /// Executes and persists one transaction, then publishes its events.
    ///
    /// A reverted transaction still yields `Ok` with a reverted receipt; only
    /// a storage failure is an error, and then the chain is left untouched.
    pub async fn submit(&self, tx: Transaction) -> DbResult<Receipt> {
        let started = Instant::now();
        let mut chain = self.chain.write().await;
        let receipt = chain
            .execute_and_persist(tx, |state, receipt| {
                self.db.persist_transaction(state, state.block, receipt)
            })
            .map_err(|e| {
                error!(error = %e, "failed to persist transaction, not applied");
                e
            })?;
        let tvl = chain.total_value_locked();
        drop(chain);

        self.metrics
            .observe_receipt(&receipt, started.elapsed().as_secs_f64());
        self.metrics.set_total_value_locked(tvl);

        for record in &receipt.events {
            // No subscribers is fine.
            let _ = self.event_tx.send(NodeEvent::Event {
                record: record.clone(),
            });
        }
        Ok(receipt)
    }

    /// Moves the clock to a new block stamped with the current time.
    pub async fn advance_block(&self) -> DbResult<BlockInfo> {
        let mut chain = self.chain.write().await;
        let now = BlockInfo::now(0).timestamp.max(chain.block().timestamp);
        let block = match chain.advance_block(now) {
            Ok(block) => block,
            Err(e) => {
                // Unreachable with a clamped timestamp; keep the old block.
                error!(error = %e, "block clock rejected timestamp");
                chain.block()
            }
        };
        self.db.put_state(WORLD_STATE_KEY, chain.state())?;
        self.db.set_latest_block(block)?;
        drop(chain);

        self.metrics.set_block_height(block.number);
        self.metrics.blocks_produced_total.inc();
        let _ = self.event_tx.send(NodeEvent::NewBlock {
            number: block.number,
            timestamp: block.timestamp,
        });
        debug!(number = block.number, "block produced");
        Ok(block)
    }
}

fn persist_genesis(
    db: &LedgerDB,
    chain: &Chain,
    deployment: &Deployment,
    receipts: &[Receipt],
) -> DbResult<()> {
    for receipt in receipts {
        db.put_receipt(receipt)?;
        db.append_events(&receipt.events)?;
    }
    db.put_state(DEPLOYMENT_KEY, deployment)?;
    db.put_state(WORLD_STATE_KEY, chain.state())?;
    db.set_latest_block(chain.block())?;
    db.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use shm_contracts::chain::Call;
    use shm_protocol::{Address, LedgerEvent};
    use std::sync::Arc;

    fn open(db: LedgerDB) -> Ledger {
        let (event_tx, _) = broadcast::channel(16);
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        Ledger::open(db, &GenesisConfig::development(), event_tx, metrics).unwrap()
    }

    fn deposit(ledger: &Ledger, amount: u128) -> Transaction {
        Transaction::new(
            Address::from_label("user1"),
            Call::Deposit {
                contract: ledger.deployment().deposit_vault,
                vault_id: 1,
            },
        )
        .with_value(amount)
    }

    #[tokio::test]
    async fn restart_restores_state_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (deployment, next_seq) = {
            let ledger = open(LedgerDB::open(dir.path()).unwrap());
            let receipt = ledger.submit(deposit(&ledger, 5)).await.unwrap();
            assert!(receipt.status.is_success());
            let next = ledger.read(|c| c.next_event_seq()).await;
            (ledger.deployment(), next)
        };

        let ledger = open(LedgerDB::open(dir.path()).unwrap());
        assert_eq!(ledger.deployment(), deployment);
        let balance = ledger
            .read(|c| c.balance_of(&deployment.deposit_vault, 1, &Address::from_label("user1")))
            .await;
        assert_eq!(balance, Ok(5));

        let receipt = ledger.submit(deposit(&ledger, 1)).await.unwrap();
        assert_eq!(receipt.events[0].seq, next_seq);
        assert_eq!(
            ledger.db().events_from(0, 100).unwrap().len() as u64,
            next_seq + 1
        );
    }

    #[tokio::test]
    async fn committed_events_are_broadcast() {
        let ledger = open(LedgerDB::open_temporary().unwrap());
        let mut rx = ledger.subscribe();

        ledger.submit(deposit(&ledger, 2)).await.unwrap();
        match rx.recv().await.unwrap() {
            NodeEvent::Event { record } => {
                assert!(matches!(record.event, LedgerEvent::Deposited { amount: 2, .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reverted_transactions_are_stored_but_not_broadcast() {
        let ledger = open(LedgerDB::open_temporary().unwrap());
        let mut rx = ledger.subscribe();

        let receipt = ledger.submit(deposit(&ledger, 0)).await.unwrap();
        assert!(!receipt.status.is_success());
        assert!(rx.try_recv().is_err());
        assert_eq!(
            ledger.db().get_receipt(&receipt.tx_hash).unwrap(),
            Some(receipt)
        );
    }

    #[tokio::test]
    async fn clock_advances_and_persists() {
        let ledger = open(LedgerDB::open_temporary().unwrap());
        let block = ledger.advance_block().await.unwrap();
        assert_eq!(block.number, 1);
        assert_eq!(ledger.db().latest_block().unwrap(), Some(block));
    }

    #[tokio::test]
    async fn half_initialized_database_is_rejected() {
        let db = LedgerDB::open_temporary().unwrap();
        let deployment = GenesisConfig::development().build().unwrap().deployment;
        db.put_state(DEPLOYMENT_KEY, &deployment).unwrap();

        let (event_tx, _) = broadcast::channel(16);
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let result = Ledger::open(db, &GenesisConfig::development(), event_tx, metrics);
        let err = result.err().expect("partial database must not open");
        assert!(err.to_string().contains("partially initialized"));
    }
}
