// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SHM Vault Ledger Node
//!
//! Entry point for the `shm-node` binary. Parses CLI arguments, initializes
//! logging and metrics, restores or creates the ledger, runs the block
//! clock and serves the HTTP/WS API.
//!
//! - `run`     — start the node
//! - `init`    — create the data directory and a development genesis file
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod ledger;
mod logging;
mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;
use tokio::sync::broadcast;

use shm_contracts::genesis::GenesisConfig;
use shm_protocol::config::{BLOCK_TIME, EVENT_CHANNEL_CAPACITY, PROTOCOL_VERSION};
use shm_protocol::storage::LedgerDB;
use shm_protocol::BlockInfo;

use cli::{Commands, ShmNodeCli};
use ledger::Ledger;
use logging::LogFormat;
use metrics::NodeMetrics;

const GENESIS_FILE: &str = "genesis.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShmNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: ledger, block clock, API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "shm_node=info,shm_contracts=info,shm_protocol=info,tower_http=debug",
        args.log_format,
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting shm-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = LedgerDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Genesis ---
    let genesis = load_genesis(&args.data_dir, args.genesis.as_deref())?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Ledger ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let ledger = Arc::new(Ledger::open(
        db,
        &genesis,
        event_tx,
        Arc::clone(&node_metrics),
    )?);
    let deployment = ledger.deployment();
    tracing::info!(
        token = %deployment.token,
        deposit_vault = %deployment.deposit_vault,
        withdraw_handler = %deployment.withdraw_handler,
        yield_vault = %deployment.yield_vault,
        "contracts ready"
    );

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        ledger: Arc::clone(&ledger),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Block clock ---
    // Transactions execute in the current block; the clock moves the chain
    // to a new block (and timestamp) every BLOCK_TIME.
    let clock_ledger = Arc::clone(&ledger);
    let block_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(BLOCK_TIME);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = clock_ledger.advance_block().await {
                tracing::error!(error = %e, "failed to persist new block");
            }
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    block_loop.abort();
    ledger.db().flush().context("failed to flush database")?;
    tracing::info!("shm-node stopped");
    Ok(())
}

/// Picks the genesis: an explicit file, then `genesis.json` in the data
/// directory, then the built-in development genesis stamped with now.
fn load_genesis(data_dir: &Path, explicit: Option<&Path>) -> Result<GenesisConfig> {
    let default_path = data_dir.join(GENESIS_FILE);
    let path = explicit.or_else(|| default_path.exists().then_some(default_path.as_path()));

    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading genesis");
            GenesisConfig::from_json_file(path)
                .with_context(|| format!("failed to load genesis from {}", path.display()))
        }
        None => {
            tracing::info!("no genesis file, using development genesis");
            Ok(development_genesis())
        }
    }
}

fn development_genesis() -> GenesisConfig {
    GenesisConfig {
        timestamp: BlockInfo::now(0).timestamp,
        ..GenesisConfig::development()
    }
}

/// Creates the data directory and writes a development genesis file.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("shm_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let genesis_path: PathBuf = data_dir.join(GENESIS_FILE);
    if genesis_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            genesis_path.display()
        );
    }

    let genesis = development_genesis();
    genesis
        .to_json_file(&genesis_path)
        .with_context(|| format!("failed to write genesis to {}", genesis_path.display()))?;
    tracing::info!(path = %genesis_path.display(), "genesis written");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Genesis        : {}", genesis_path.display());
    println!("  Owner          : {}", genesis.owner);
    for allocation in &genesis.native_allocations {
        println!("  Funded account : {}", allocation.address);
    }

    Ok(())
}

/// Queries a running node's status endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let body = http_get(&args.rpc_addr, "/status").await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP/1.1 GET over a raw TCP stream; enough for `status`.
async fn http_get(addr: &str, path: &str) -> Result<String> {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("shm-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", PROTOCOL_VERSION);
    println!("network  {} (chain id {})", shm_protocol::config::NETWORK_NAME, shm_protocol::config::CHAIN_ID);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
