//! # Ledger Configuration & Constants
//!
//! Every magic number in the vault ledger lives here. If you're hardcoding
//! a constant somewhere else, move it here before review does it for you.
//!
//! The chain parameters mirror Shardeum Sphinx, the network the front-end
//! talks to, so that amounts and ids line up with what wallets display.

use std::time::Duration;

use crate::units::VaultId;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// EVM chain id of Shardeum Sphinx (betanet).
pub const CHAIN_ID: u64 = 8082;

/// Human-readable network name, used in logs and `/status`.
pub const NETWORK_NAME: &str = "shardeum-sphinx";

/// Block explorer the front-end links transactions to.
pub const EXPLORER_URL: &str = "https://explorer-sphinx.shardeum.org";

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Ledger format version. Bump when the persisted world-state layout
/// changes, because old snapshots will no longer decode.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Storage schema version written into the `metadata` tree.
pub const STORAGE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Ticker of the native currency deposited into vaults.
pub const NATIVE_SYMBOL: &str = "SHM";

/// Decimals of the native currency. 18, same as ether, so `parseEther`
/// strings from the front-end map one-to-one.
pub const NATIVE_DECIMALS: u8 = 18;

/// Decimals of the reward token. Matches the native currency so a 1:1
/// reward reads naturally in wallets.
pub const TOKEN_DECIMALS: u8 = 18;

/// Default reward-token name at genesis.
pub const DEFAULT_TOKEN_NAME: &str = "Shardeum Token";

/// Default reward-token symbol at genesis.
pub const DEFAULT_TOKEN_SYMBOL: &str = "SHM";

/// The vault id the dashboard creates first. Nothing special on-chain,
/// but genesis pre-creates it so a fresh node is immediately usable.
pub const DEFAULT_VAULT_ID: VaultId = 1;

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// How often the dev node advances its block clock.
pub const BLOCK_TIME: Duration = Duration::from_secs(2);

/// Block time as milliseconds. Keep in sync with [`BLOCK_TIME`].
pub const BLOCK_TIME_MS: u64 = 2_000;

// ---------------------------------------------------------------------------
// Node Parameters
// ---------------------------------------------------------------------------

/// Default REST/WebSocket API port.
pub const DEFAULT_RPC_PORT: u16 = 9741;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

/// Default data directory for the sled database.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Page size for `/events` when the client does not ask for one.
pub const DEFAULT_EVENT_PAGE: usize = 100;

/// Hard cap on `/events` page size. Larger requests are clamped.
pub const MAX_EVENT_PAGE: usize = 1_000;

/// Capacity of the broadcast channel feeding WebSocket subscribers. Slow
/// subscribers that fall further behind than this miss events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimals_agree() {
        // Reward math assumes both sides share a scale.
        assert_eq!(NATIVE_DECIMALS, TOKEN_DECIMALS);
    }

    #[test]
    fn test_timing_constants_sanity() {
        assert!(BLOCK_TIME.as_millis() > 0);
        assert_eq!(BLOCK_TIME.as_millis() as u64, BLOCK_TIME_MS);
    }

    #[test]
    fn test_ports_are_distinct() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_event_page_bounds() {
        assert!(DEFAULT_EVENT_PAGE > 0);
        assert!(DEFAULT_EVENT_PAGE <= MAX_EVENT_PAGE);
        assert!(EVENT_CHANNEL_CAPACITY >= DEFAULT_EVENT_PAGE);
    }
}
