//! # Genesis
//!
//! Deploys the four components of a vault system in dependency order,
//! wires them together and seeds initial balances:
//!
//! 1. reward token, deposit vault
//! 2. withdraw handler (bound to the deposit vault)
//! 3. yield vault (bound to the deposit vault and the token)
//! 4. native allocations, then owner transactions: authorize the handler,
//!    create the initial vaults, mint token allocations
//!
//! Step 4 runs through the normal executor, so genesis leaves receipts and
//! events behind like any other transaction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shm_protocol::config::{DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_SYMBOL, DEFAULT_VAULT_ID, NATIVE_DECIMALS, TOKEN_DECIMALS};
use shm_protocol::error::ErrorKind;
use shm_protocol::units::{amount_string, unit};
use shm_protocol::{Address, Amount, BlockInfo, Receipt, TxStatus, VaultId};
use thiserror::Error;
use tracing::info;

use crate::chain::{Call, Chain, ExecutionError, Transaction};

/// Errors raised while loading or applying a genesis configuration.
#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("genesis file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("genesis file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("genesis deployment failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("genesis transaction {method} reverted ({kind}): {reason}")]
    Reverted {
        method: String,
        kind: ErrorKind,
        reason: String,
    },
}

/// A balance handed out at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

fn default_token_name() -> String {
    DEFAULT_TOKEN_NAME.to_string()
}

fn default_token_symbol() -> String {
    DEFAULT_TOKEN_SYMBOL.to_string()
}

fn default_vaults() -> Vec<VaultId> {
    vec![DEFAULT_VAULT_ID]
}

fn default_true() -> bool {
    true
}

/// Genesis parameters, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Deployer and owner of every component.
    pub owner: Address,
    #[serde(default = "default_token_name")]
    pub token_name: String,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    /// Native currency credited out of thin air.
    #[serde(default)]
    pub native_allocations: Vec<Allocation>,
    /// Reward tokens minted by the owner.
    #[serde(default)]
    pub token_allocations: Vec<Allocation>,
    #[serde(default = "default_true")]
    pub authorize_withdraw_handler: bool,
    #[serde(default = "default_vaults")]
    pub vaults: Vec<VaultId>,
    /// Timestamp of block 0.
    #[serde(default)]
    pub timestamp: u64,
}

/// Where genesis put each component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub token: Address,
    pub deposit_vault: Address,
    pub withdraw_handler: Address,
    pub yield_vault: Address,
}

/// The result of applying a genesis configuration.
#[derive(Debug, Clone)]
pub struct Genesis {
    pub chain: Chain,
    pub deployment: Deployment,
    pub receipts: Vec<Receipt>,
}

impl GenesisConfig {
    /// A local development setup: `owner`, `user1` and `user2` each get
    /// 1,000 SHM of native currency and the owner holds 1,000,000 reward
    /// tokens.
    pub fn development() -> Self {
        let owner = Address::from_label("owner");
        let native = unit(NATIVE_DECIMALS).unwrap_or(1) * 1_000;
        let tokens = unit(TOKEN_DECIMALS).unwrap_or(1) * 1_000_000;

        Self {
            owner,
            token_name: default_token_name(),
            token_symbol: default_token_symbol(),
            native_allocations: ["owner", "user1", "user2"]
                .into_iter()
                .map(|label| Allocation {
                    address: Address::from_label(label),
                    amount: native,
                })
                .collect(),
            token_allocations: vec![Allocation {
                address: owner,
                amount: tokens,
            }],
            authorize_withdraw_handler: true,
            vaults: default_vaults(),
            timestamp: 0,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GenesisError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), GenesisError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Deploys and seeds a fresh chain.
    ///
    /// # Errors
    ///
    /// Fails if an allocation overflows or any owner transaction reverts
    /// (duplicate vault ids, a zero-address allocation).
    pub fn build(&self) -> Result<Genesis, GenesisError> {
        let owner = self.owner;
        let mut chain = Chain::new(BlockInfo {
            number: 0,
            timestamp: self.timestamp,
        });

        let token = chain.deploy_token(&owner, &self.token_name, &self.token_symbol);
        let deposit_vault = chain.deploy_deposit_vault(&owner);
        let withdraw_handler = chain.deploy_withdraw_handler(&owner, &deposit_vault)?;
        let yield_vault = chain.deploy_yield_vault(&owner, &deposit_vault, &token)?;

        for allocation in &self.native_allocations {
            chain.credit(&allocation.address, allocation.amount)?;
        }

        let mut calls = Vec::new();
        if self.authorize_withdraw_handler {
            calls.push(Call::SetAuthorizedWithdrawer {
                contract: deposit_vault,
                withdrawer: withdraw_handler,
                allowed: true,
            });
        }
        calls.extend(self.vaults.iter().map(|&vault_id| Call::CreateVault {
            contract: deposit_vault,
            vault_id,
        }));
        calls.extend(self.token_allocations.iter().map(|a| Call::Mint {
            contract: token,
            to: a.address,
            amount: a.amount,
        }));

        let mut receipts = Vec::with_capacity(calls.len());
        for call in calls {
            let receipt = chain.execute(Transaction::new(owner, call));
            if let TxStatus::Reverted { kind, reason } = &receipt.status {
                return Err(GenesisError::Reverted {
                    method: receipt.method.clone(),
                    kind: *kind,
                    reason: reason.clone(),
                });
            }
            receipts.push(receipt);
        }

        let deployment = Deployment {
            token,
            deposit_vault,
            withdraw_handler,
            yield_vault,
        };
        info!(
            %token,
            %deposit_vault,
            %withdraw_handler,
            %yield_vault,
            vaults = self.vaults.len(),
            "genesis applied"
        );

        Ok(Genesis {
            chain,
            deployment,
            receipts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_genesis_wires_everything() {
        let genesis = GenesisConfig::development().build().unwrap();
        let chain = &genesis.chain;
        let d = genesis.deployment;

        assert_eq!(chain.vault_exists(&d.deposit_vault, DEFAULT_VAULT_ID), Ok(true));
        assert_eq!(
            chain.is_authorized_withdrawer(&d.deposit_vault, &d.withdraw_handler),
            Ok(true)
        );
        assert_eq!(
            chain.token_balance(&d.token, &Address::from_label("owner")),
            Ok(1_000_000 * unit(18).unwrap())
        );
        assert_eq!(
            chain.native_balance(&Address::from_label("user2")),
            1_000 * unit(18).unwrap()
        );
        assert_eq!(genesis.receipts.len(), 3);
        assert!(genesis.receipts.iter().all(|r| r.status.is_success()));
    }

    #[test]
    fn handler_authorization_is_optional() {
        let mut config = GenesisConfig::development();
        config.authorize_withdraw_handler = false;
        let genesis = config.build().unwrap();
        let d = genesis.deployment;
        assert_eq!(
            genesis
                .chain
                .is_authorized_withdrawer(&d.deposit_vault, &d.withdraw_handler),
            Ok(false)
        );
    }

    #[test]
    fn duplicate_vault_ids_fail_genesis() {
        let mut config = GenesisConfig::development();
        config.vaults = vec![1, 1];
        let err = config.build().unwrap_err();
        assert!(matches!(
            err,
            GenesisError::Reverted {
                kind: ErrorKind::AlreadyExists,
                ..
            }
        ));
    }

    #[test]
    fn json_file_round_trip_with_defaults() {
        let dir = std::env::temp_dir().join(format!("shm-genesis-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("genesis.json");

        std::fs::write(
            &path,
            format!(r#"{{"owner":"{}"}}"#, Address::from_label("owner")),
        )
        .unwrap();
        let minimal = GenesisConfig::from_json_file(&path).unwrap();
        assert_eq!(minimal.vaults, vec![DEFAULT_VAULT_ID]);
        assert!(minimal.authorize_withdraw_handler);
        assert_eq!(minimal.token_symbol, DEFAULT_TOKEN_SYMBOL);

        let dev = GenesisConfig::development();
        dev.to_json_file(&path).unwrap();
        assert_eq!(GenesisConfig::from_json_file(&path).unwrap(), dev);

        std::fs::remove_dir_all(&dir).ok();
    }
}
