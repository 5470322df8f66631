//! # CLI Interface
//!
//! Command-line structure for `shm-node`, built with `clap` derive. Four
//! subcommands: `run`, `init`, `status` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shm_protocol::config::{DEFAULT_DATA_DIR, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

use crate::logging::LogFormat;

/// SHM vault ledger node.
///
/// Runs the deposit, withdraw and yield vault contracts on a local ledger,
/// serves the REST/WebSocket API and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "shm-node",
    about = "SHM vault ledger node",
    version,
    propagate_version = true
)]
pub struct ShmNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and write a development genesis file.
    Init(InitArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the ledger database and genesis file.
    #[arg(long, short = 'd', env = "SHM_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "SHM_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SHM_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Genesis file. Defaults to `genesis.json` in the data directory, or the
    /// built-in development genesis when that does not exist either.
    ///
    /// Only read on first start; a restored ledger ignores it.
    #[arg(long, short = 'g', env = "SHM_GENESIS")]
    pub genesis: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "SHM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize.
    #[arg(long, short = 'd', env = "SHM_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Overwrite an existing genesis file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// `host:port` of the running node's API.
    #[arg(long, default_value = "127.0.0.1:9741")]
    pub rpc_addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ShmNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = ShmNodeCli::try_parse_from(["shm-node", "run", "--log-format", "json"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
                assert_eq!(args.log_format, LogFormat::Json);
                assert!(args.genesis.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
