//! # Prometheus Metrics
//!
//! Operational metrics for the ledger node, scraped at `/metrics` on the
//! configured metrics port. Everything lives in a dedicated registry under
//! the `shm` namespace.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use shm_protocol::config::NATIVE_DECIMALS;
use shm_protocol::{Amount, Receipt};

/// Metric handles for the node. Prometheus handles are `Arc`s internally,
/// so cloning is cheap.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Transactions that committed.
    pub transactions_executed_total: IntCounter,
    /// Transactions that reverted.
    pub transactions_reverted_total: IntCounter,
    /// Committed events.
    pub events_emitted_total: IntCounter,
    /// Current block number.
    pub block_height: IntGauge,
    /// Blocks produced by the clock loop since start.
    pub blocks_produced_total: IntCounter,
    /// Native currency held across deposit vaults, in whole SHM.
    pub total_value_locked: Gauge,
    /// Execute-and-persist latency.
    pub transaction_latency_seconds: Histogram,
}

fn register<M: Collector + Clone + 'static>(
    registry: &Registry,
    metric: M,
) -> Result<M, prometheus::Error> {
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("shm".into()), None)?;

        let transactions_executed_total = register(
            &registry,
            IntCounter::new(
                "transactions_executed_total",
                "Total number of committed transactions",
            )?,
        )?;
        let transactions_reverted_total = register(
            &registry,
            IntCounter::new(
                "transactions_reverted_total",
                "Total number of reverted transactions",
            )?,
        )?;
        let events_emitted_total = register(
            &registry,
            IntCounter::new("events_emitted_total", "Total number of committed events")?,
        )?;
        let block_height = register(
            &registry,
            IntGauge::new("block_height", "Current block number")?,
        )?;
        let blocks_produced_total = register(
            &registry,
            IntCounter::new("blocks_produced_total", "Blocks produced since start")?,
        )?;
        let total_value_locked = register(
            &registry,
            Gauge::new(
                "total_value_locked",
                "Native currency held by deposit vaults, in SHM",
            )?,
        )?;
        let transaction_latency_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "transaction_latency_seconds",
                    "Transaction execute-and-persist latency in seconds",
                )
                .buckets(vec![
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ]),
            )?,
        )?;

        Ok(Self {
            registry,
            transactions_executed_total,
            transactions_reverted_total,
            events_emitted_total,
            block_height,
            blocks_produced_total,
            total_value_locked,
            transaction_latency_seconds,
        })
    }

    /// Records the outcome of one executed transaction.
    pub fn observe_receipt(&self, receipt: &Receipt, latency_secs: f64) {
        if receipt.status.is_success() {
            self.transactions_executed_total.inc();
            self.events_emitted_total.inc_by(receipt.events.len() as u64);
        } else {
            self.transactions_reverted_total.inc();
        }
        self.transaction_latency_seconds.observe(latency_secs);
    }

    pub fn set_block_height(&self, number: u64) {
        self.block_height.set(i64::try_from(number).unwrap_or(i64::MAX));
    }

    pub fn set_total_value_locked(&self, tvl: Amount) {
        let scale = 10f64.powi(i32::from(NATIVE_DECIMALS));
        self.total_value_locked.set(tvl as f64 / scale);
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
