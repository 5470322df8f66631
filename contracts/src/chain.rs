//! # Chain — Transaction Executor
//!
//! Owns the world state (native bank plus every deployed component) and
//! executes transactions against it one at a time.
//!
//! ## Atomicity
//!
//! A transaction runs against a *working copy* of the world state. Nested
//! calls (handler → deposit vault → bank, yield vault → token) all mutate
//! that copy. Only when the outermost call returns `Ok` does the copy
//! replace the live state and do the buffered events get sequence numbers.
//! Any error, at any depth, drops the copy: no partial debit, no partial
//! transfer, no orphaned event. The sender's nonce still advances so that
//! every submitted transaction has a distinct hash.
//!
//! ## Addressing
//!
//! Components are keyed by address in per-type tables. A call names the
//! contract it targets; cross-component references (a handler's deposit
//! vault, a yield vault's token) are resolved from those tables at call
//! time and handed over as capabilities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shm_protocol::bank::BankError;
use shm_protocol::config::TOKEN_DECIMALS;
use shm_protocol::error::{ErrorKind, HasErrorKind};
use shm_protocol::units::amount_string;
use shm_protocol::{
    Address, Amount, BlockInfo, Env, EventLog, EventRecord, NativeBank, Receipt, TxHash, TxStatus,
    VaultId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::deposit_vault::{DepositVault, VaultBalances, VaultError};
use crate::fungible_token::{FungibleToken, TokenError, TokenLedger};
use crate::withdraw_handler::{WithdrawError, WithdrawHandler};
use crate::yield_vault::{RewardPool, YieldError, YieldVault};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a transaction (or a deployment, or a read) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// No component of the expected type lives at the address.
    #[error("no {kind} deployed at {address}")]
    UnknownContract {
        kind: &'static str,
        address: Address,
    },

    /// Value was attached to a call that does not accept it.
    #[error("{method} is not payable (value {value} attached)")]
    NotPayable { method: &'static str, value: Amount },

    /// The block clock only moves forward.
    #[error("block timestamp {requested} precedes current {current}")]
    ClockWentBackwards { current: u64, requested: u64 },

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Withdraw(#[from] WithdrawError),

    #[error(transparent)]
    Yield(#[from] YieldError),
}

impl HasErrorKind for ExecutionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownContract { .. } => ErrorKind::NotFound,
            Self::NotPayable { .. } | Self::ClockWentBackwards { .. } => ErrorKind::InvalidInput,
            Self::Bank(e) => e.kind(),
            Self::Token(e) => e.kind(),
            Self::Vault(e) => e.kind(),
            Self::Withdraw(e) => e.kind(),
            Self::Yield(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A write entry point on a deployed component.
///
/// On the wire a call is keyed by its method name:
/// `{"withdraw": {"contract": "0x..", "vault_id": 1, "amount": 5}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Call {
    // -- DepositVault -------------------------------------------------------
    CreateVault {
        contract: Address,
        vault_id: VaultId,
    },
    /// Payable: the transaction's `value` is the deposit.
    Deposit {
        contract: Address,
        vault_id: VaultId,
    },
    SetAuthorizedWithdrawer {
        contract: Address,
        withdrawer: Address,
        allowed: bool,
    },
    TransferOwnership {
        contract: Address,
        new_owner: Address,
    },

    // -- WithdrawHandler ----------------------------------------------------
    Withdraw {
        contract: Address,
        vault_id: VaultId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },

    // -- YieldVault ---------------------------------------------------------
    FundRewards {
        contract: Address,
        vault_id: VaultId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    ClaimYield {
        contract: Address,
        vault_id: VaultId,
    },

    // -- FungibleToken ------------------------------------------------------
    Mint {
        contract: Address,
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Approve {
        contract: Address,
        spender: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Transfer {
        contract: Address,
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    TransferFrom {
        contract: Address,
        from: Address,
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
}

impl Call {
    /// ABI-style method name, as recorded in receipts.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateVault { .. } => "createVault",
            Self::Deposit { .. } => "deposit",
            Self::SetAuthorizedWithdrawer { .. } => "setAuthorizedWithdrawer",
            Self::TransferOwnership { .. } => "transferOwnership",
            Self::Withdraw { .. } => "withdraw",
            Self::FundRewards { .. } => "fundRewards",
            Self::ClaimYield { .. } => "claimYield",
            Self::Mint { .. } => "mint",
            Self::Approve { .. } => "approve",
            Self::Transfer { .. } => "transfer",
            Self::TransferFrom { .. } => "transferFrom",
        }
    }

    /// The targeted component.
    pub fn contract(&self) -> Address {
        match self {
            Self::CreateVault { contract, .. }
            | Self::Deposit { contract, .. }
            | Self::SetAuthorizedWithdrawer { contract, .. }
            | Self::TransferOwnership { contract, .. }
            | Self::Withdraw { contract, .. }
            | Self::FundRewards { contract, .. }
            | Self::ClaimYield { contract, .. }
            | Self::Mint { contract, .. }
            | Self::Approve { contract, .. }
            | Self::Transfer { contract, .. }
            | Self::TransferFrom { contract, .. } => *contract,
        }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Deposit { .. })
    }
}

/// A call submitted by `sender`, optionally carrying native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    /// Native currency moved to the callee before the call runs.
    #[serde(default, with = "amount_string")]
    pub value: Amount,
    pub call: Call,
}

impl Transaction {
    pub fn new(sender: Address, call: Call) -> Self {
        Self {
            sender,
            value: 0,
            call,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }

    /// Canonical bytes fed into the transaction hash.
    fn encode(&self) -> Vec<u8> {
        bincode::serialize(&(self.value, &self.call)).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

fn lookup<'a, T>(
    table: &'a BTreeMap<Address, T>,
    address: &Address,
    kind: &'static str,
) -> Result<&'a T, ExecutionError> {
    table.get(address).ok_or(ExecutionError::UnknownContract {
        kind,
        address: *address,
    })
}

fn lookup_mut<'a, T>(
    table: &'a mut BTreeMap<Address, T>,
    address: &Address,
    kind: &'static str,
) -> Result<&'a mut T, ExecutionError> {
    table.get_mut(address).ok_or(ExecutionError::UnknownContract {
        kind,
        address: *address,
    })
}

const TOKEN: &str = "token";
const DEPOSIT_VAULT: &str = "deposit vault";
const WITHDRAW_HANDLER: &str = "withdraw handler";
const YIELD_VAULT: &str = "yield vault";

/// Every balance and every component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    bank: NativeBank,
    tokens: BTreeMap<Address, FungibleToken>,
    deposit_vaults: BTreeMap<Address, DepositVault>,
    withdraw_handlers: BTreeMap<Address, WithdrawHandler>,
    yield_vaults: BTreeMap<Address, YieldVault>,
}

impl WorldState {
    pub fn bank(&self) -> &NativeBank {
        &self.bank
    }

    pub fn token(&self, address: &Address) -> Result<&FungibleToken, ExecutionError> {
        lookup(&self.tokens, address, TOKEN)
    }

    pub fn deposit_vault(&self, address: &Address) -> Result<&DepositVault, ExecutionError> {
        lookup(&self.deposit_vaults, address, DEPOSIT_VAULT)
    }

    pub fn withdraw_handler(&self, address: &Address) -> Result<&WithdrawHandler, ExecutionError> {
        lookup(&self.withdraw_handlers, address, WITHDRAW_HANDLER)
    }

    pub fn yield_vault(&self, address: &Address) -> Result<&YieldVault, ExecutionError> {
        lookup(&self.yield_vaults, address, YIELD_VAULT)
    }

    /// Native currency held by every deposit vault's books.
    pub fn total_value_locked(&self) -> Amount {
        self.deposit_vaults
            .values()
            .fold(0u128, |acc, dv| acc.saturating_add(dv.total_value_locked()))
    }

    fn apply(&mut self, env: &mut Env, tx: &Transaction) -> Result<(), ExecutionError> {
        let sender = &tx.sender;
        if tx.value > 0 && !tx.call.is_payable() {
            return Err(ExecutionError::NotPayable {
                method: tx.call.method(),
                value: tx.value,
            });
        }

        match &tx.call {
            Call::CreateVault { contract, vault_id } => {
                lookup_mut(&mut self.deposit_vaults, contract, DEPOSIT_VAULT)?
                    .create_vault(env, *vault_id)?;
            }
            Call::Deposit { contract, vault_id } => {
                let dv = lookup_mut(&mut self.deposit_vaults, contract, DEPOSIT_VAULT)?;
                self.bank.transfer(sender, contract, tx.value)?;
                dv.deposit(env, sender, *vault_id, tx.value)?;
            }
            Call::SetAuthorizedWithdrawer {
                contract,
                withdrawer,
                allowed,
            } => {
                lookup_mut(&mut self.deposit_vaults, contract, DEPOSIT_VAULT)?
                    .set_authorized_withdrawer(env, sender, withdrawer, *allowed)?;
            }
            Call::TransferOwnership {
                contract,
                new_owner,
            } => {
                lookup_mut(&mut self.deposit_vaults, contract, DEPOSIT_VAULT)?
                    .transfer_ownership(env, sender, new_owner)?;
            }
            Call::Withdraw {
                contract,
                vault_id,
                amount,
            } => {
                let handler = *lookup(&self.withdraw_handlers, contract, WITHDRAW_HANDLER)?;
                let dv = lookup_mut(
                    &mut self.deposit_vaults,
                    &handler.deposit_vault(),
                    DEPOSIT_VAULT,
                )?;
                handler.withdraw(env, sender, *vault_id, *amount, dv, &mut self.bank)?;
            }
            Call::FundRewards {
                contract,
                vault_id,
                amount,
            } => {
                let yv = lookup_mut(&mut self.yield_vaults, contract, YIELD_VAULT)?;
                let dv = lookup(&self.deposit_vaults, &yv.deposit_vault(), DEPOSIT_VAULT)?;
                let token = lookup_mut(&mut self.tokens, &yv.reward_token(), TOKEN)?;
                yv.fund_rewards(env, sender, *vault_id, *amount, dv, token)?;
            }
            Call::ClaimYield { contract, vault_id } => {
                let yv = lookup_mut(&mut self.yield_vaults, contract, YIELD_VAULT)?;
                let dv = lookup(&self.deposit_vaults, &yv.deposit_vault(), DEPOSIT_VAULT)?;
                let token = lookup_mut(&mut self.tokens, &yv.reward_token(), TOKEN)?;
                let share = yv.claim_yield(env, sender, *vault_id, dv, token)?;
                debug!(%sender, vault_id, share, "yield claimed");
            }
            Call::Mint {
                contract,
                to,
                amount,
            } => {
                lookup_mut(&mut self.tokens, contract, TOKEN)?.mint(env, sender, to, *amount)?;
            }
            Call::Approve {
                contract,
                spender,
                amount,
            } => {
                lookup_mut(&mut self.tokens, contract, TOKEN)?
                    .approve(env, sender, spender, *amount)?;
            }
            Call::Transfer {
                contract,
                to,
                amount,
            } => {
                lookup_mut(&mut self.tokens, contract, TOKEN)?
                    .transfer(env, sender, to, *amount)?;
            }
            Call::TransferFrom {
                contract,
                from,
                to,
                amount,
            } => {
                lookup_mut(&mut self.tokens, contract, TOKEN)?
                    .transfer_from(env, sender, from, to, *amount)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Everything that must survive a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub world: WorldState,
    pub block: BlockInfo,
    /// Per-account count of submitted transactions and deployments.
    pub nonces: BTreeMap<Address, u64>,
    pub tx_count: u64,
    pub reverted_count: u64,
    pub next_event_seq: u64,
}

/// The ledger: world state, block clock and committed event log.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    state: ChainState,
    events: EventLog,
}

impl Chain {
    /// An empty chain whose clock starts at `genesis`.
    pub fn new(genesis: BlockInfo) -> Self {
        Self {
            state: ChainState {
                block: genesis,
                ..ChainState::default()
            },
            events: EventLog::new(),
        }
    }

    /// Resumes a chain from persisted state. The in-memory event log starts
    /// empty at the persisted sequence number.
    pub fn from_state(state: ChainState) -> Self {
        let events = EventLog::starting_at(state.next_event_seq);
        Self { state, events }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn world(&self) -> &WorldState {
        &self.state.world
    }

    // -- Deployment -----------------------------------------------------------

    /// Credits native currency out of thin air. Genesis and dev faucets only.
    pub fn credit(&mut self, to: &Address, amount: Amount) -> Result<(), ExecutionError> {
        self.state.world.bank.credit(to, amount)?;
        Ok(())
    }

    /// Deploys a reward token owned by `deployer`.
    pub fn deploy_token(&mut self, deployer: &Address, name: &str, symbol: &str) -> Address {
        let address = self.next_contract_address(deployer);
        self.state.world.tokens.insert(
            address,
            FungibleToken::new(address, *deployer, name, symbol, TOKEN_DECIMALS),
        );
        info!(%address, %deployer, symbol, "token deployed");
        address
    }

    /// Deploys a deposit vault owned by `deployer`.
    pub fn deploy_deposit_vault(&mut self, deployer: &Address) -> Address {
        let address = self.next_contract_address(deployer);
        self.state
            .world
            .deposit_vaults
            .insert(address, DepositVault::new(address, *deployer));
        info!(%address, %deployer, "deposit vault deployed");
        address
    }

    /// Deploys a withdraw handler bound to `deposit_vault`.
    pub fn deploy_withdraw_handler(
        &mut self,
        deployer: &Address,
        deposit_vault: &Address,
    ) -> Result<Address, ExecutionError> {
        self.state.world.deposit_vault(deposit_vault)?;
        let address = self.next_contract_address(deployer);
        self.state
            .world
            .withdraw_handlers
            .insert(address, WithdrawHandler::new(address, *deposit_vault));
        info!(%address, %deposit_vault, "withdraw handler deployed");
        Ok(address)
    }

    /// Deploys a yield vault bound to `deposit_vault` and `reward_token`.
    pub fn deploy_yield_vault(
        &mut self,
        deployer: &Address,
        deposit_vault: &Address,
        reward_token: &Address,
    ) -> Result<Address, ExecutionError> {
        self.state.world.deposit_vault(deposit_vault)?;
        self.state.world.token(reward_token)?;
        let address = self.next_contract_address(deployer);
        self.state.world.yield_vaults.insert(
            address,
            YieldVault::new(address, *deposit_vault, *reward_token),
        );
        info!(%address, %deposit_vault, %reward_token, "yield vault deployed");
        Ok(address)
    }

    fn next_contract_address(&mut self, deployer: &Address) -> Address {
        let nonce = self.bump_nonce(deployer);
        Address::contract(deployer, nonce)
    }

    fn bump_nonce(&mut self, account: &Address) -> u64 {
        let slot = self.state.nonces.entry(*account).or_insert(0);
        let nonce = *slot;
        *slot += 1;
        nonce
    }

    // -- Execution ------------------------------------------------------------

    /// Executes one transaction atomically and returns its receipt.
    pub fn execute(&mut self, tx: Transaction) -> Receipt {
        let nonce = self.bump_nonce(&tx.sender);
        let tx_hash = TxHash::compute(&tx.sender, nonce, &tx.encode());
        let method = tx.call.method();
        let block = self.state.block;

        let mut working = self.state.world.clone();
        let mut env = Env::new(block, tx_hash);
        let outcome = working.apply(&mut env, &tx);
        self.state.tx_count += 1;

        let (status, events) = match outcome {
            Ok(()) => {
                self.state.world = working;
                let records = env.into_records(self.state.next_event_seq);
                self.state.next_event_seq += records.len() as u64;
                self.events.extend(records.iter().cloned());
                info!(
                    tx = %tx_hash,
                    sender = %tx.sender,
                    method,
                    block = block.number,
                    events = records.len(),
                    "transaction committed"
                );
                (TxStatus::Success, records)
            }
            Err(e) => {
                self.state.reverted_count += 1;
                warn!(
                    tx = %tx_hash,
                    sender = %tx.sender,
                    method,
                    kind = %e.kind(),
                    error = %e,
                    "transaction reverted"
                );
                (
                    TxStatus::Reverted {
                        kind: e.kind(),
                        reason: e.to_string(),
                    },
                    Vec::new(),
                )
            }
        };

        Receipt {
            tx_hash,
            block_number: block.number,
            sender: tx.sender,
            method: method.to_string(),
            status,
            events,
        }
    }

    /// Executes `tx` and hands the result to `persist` before it counts.
    ///
    /// If `persist` fails the chain is put back exactly as it was, nonce and
    /// counters included, so memory never runs ahead of storage.
    ///
    /// # Errors
    ///
    /// Returns whatever `persist` returned. The transaction's own revert is
    /// not an error; it is reported in the receipt.
    pub fn execute_and_persist<E>(
        &mut self,
        tx: Transaction,
        persist: impl FnOnce(&ChainState, &Receipt) -> Result<(), E>,
    ) -> Result<Receipt, E> {
        let before = self.state.clone();
        let receipt = self.execute(tx);
        if let Err(e) = persist(&self.state, &receipt) {
            warn!(tx = %receipt.tx_hash, "persist failed, rolling back transaction");
            self.events.truncate(before.next_event_seq);
            self.state = before;
            return Err(e);
        }
        Ok(receipt)
    }

    /// Moves the clock to the next block at `timestamp`.
    pub fn advance_block(&mut self, timestamp: u64) -> Result<BlockInfo, ExecutionError> {
        let current = self.state.block;
        if timestamp < current.timestamp {
            return Err(ExecutionError::ClockWentBackwards {
                current: current.timestamp,
                requested: timestamp,
            });
        }
        self.state.block = BlockInfo {
            number: current.number + 1,
            timestamp,
        };
        debug!(number = self.state.block.number, timestamp, "block advanced");
        Ok(self.state.block)
    }

    // -- Reads ------------------------------------------------------------------

    pub fn block(&self) -> BlockInfo {
        self.state.block
    }

    pub fn nonce(&self, account: &Address) -> u64 {
        self.state.nonces.get(account).copied().unwrap_or(0)
    }

    pub fn tx_count(&self) -> u64 {
        self.state.tx_count
    }

    pub fn reverted_count(&self) -> u64 {
        self.state.reverted_count
    }

    pub fn native_balance(&self, account: &Address) -> Amount {
        self.state.world.bank.balance_of(account)
    }

    /// `balanceOf(vaultId, user)` on the deposit vault at `contract`.
    pub fn balance_of(
        &self,
        contract: &Address,
        vault_id: VaultId,
        user: &Address,
    ) -> Result<Amount, ExecutionError> {
        Ok(self.state.world.deposit_vault(contract)?.balance_of(vault_id, user))
    }

    /// `getVaultBalance(vaultId)` on the deposit vault at `contract`.
    pub fn vault_balance(&self, contract: &Address, vault_id: VaultId) -> Result<Amount, ExecutionError> {
        Ok(self.state.world.deposit_vault(contract)?.vault_balance(vault_id)?)
    }

    pub fn vault_exists(&self, contract: &Address, vault_id: VaultId) -> Result<bool, ExecutionError> {
        Ok(self.state.world.deposit_vault(contract)?.vault_exists(vault_id))
    }

    pub fn is_authorized_withdrawer(
        &self,
        contract: &Address,
        withdrawer: &Address,
    ) -> Result<bool, ExecutionError> {
        Ok(self
            .state
            .world
            .deposit_vault(contract)?
            .is_authorized_withdrawer(withdrawer))
    }

    pub fn reward_pool(
        &self,
        contract: &Address,
        vault_id: VaultId,
    ) -> Result<Option<RewardPool>, ExecutionError> {
        Ok(self
            .state
            .world
            .yield_vault(contract)?
            .reward_pool(vault_id)
            .cloned())
    }

    pub fn pending_yield(
        &self,
        contract: &Address,
        vault_id: VaultId,
        user: &Address,
    ) -> Result<Amount, ExecutionError> {
        let yv = self.state.world.yield_vault(contract)?;
        let dv = self.state.world.deposit_vault(&yv.deposit_vault())?;
        Ok(yv.pending_yield(vault_id, user, dv)?)
    }

    pub fn token_balance(&self, contract: &Address, owner: &Address) -> Result<Amount, ExecutionError> {
        Ok(self.state.world.token(contract)?.balance_of(owner))
    }

    pub fn token_decimals(&self, contract: &Address) -> Result<u8, ExecutionError> {
        Ok(self.state.world.token(contract)?.decimals())
    }

    pub fn allowance(
        &self,
        contract: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Amount, ExecutionError> {
        Ok(self.state.world.token(contract)?.allowance(owner, spender))
    }

    pub fn total_value_locked(&self) -> Amount {
        self.state.world.total_value_locked()
    }

    /// Committed events held in memory, from sequence number `from`.
    pub fn events_since(&self, from: u64, limit: usize) -> &[EventRecord] {
        self.events.since(from, limit)
    }

    /// Sequence number the next committed event will carry.
    pub fn next_event_seq(&self) -> u64 {
        self.state.next_event_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn user() -> Address {
        Address::from_label("user1")
    }

    #[test]
    fn calls_serialize_with_abi_method_names() {
        let call = Call::SetAuthorizedWithdrawer {
            contract: Address::ZERO,
            withdrawer: Address::ZERO,
            allowed: true,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json[call.method()]["allowed"], true);

        let back: Call = serde_json::from_value(json).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn transaction_value_defaults_to_zero() {
        let json = format!(
            r#"{{"sender":"{}","call":{{"claimYield":{{"contract":"{}","vault_id":1}}}}}}"#,
            user(),
            owner()
        );
        let tx: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx.value, 0);
        assert_eq!(tx.call.method(), "claimYield");
    }

    #[test]
    fn large_amounts_survive_json() {
        let tx = Transaction::new(
            user(),
            Call::Withdraw {
                contract: owner(),
                vault_id: 1,
                amount: u128::MAX,
            },
        );
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn deployments_get_distinct_addresses() {
        let mut chain = Chain::new(BlockInfo::default());
        let token = chain.deploy_token(&owner(), "Shardeum Token", "SHM");
        let dv = chain.deploy_deposit_vault(&owner());
        assert_ne!(token, dv);
        assert_eq!(chain.nonce(&owner()), 2);
        assert_eq!(token, Address::contract(&owner(), 0));
    }

    #[test]
    fn binding_to_missing_contracts_fails() {
        let mut chain = Chain::new(BlockInfo::default());
        let err = chain
            .deploy_withdraw_handler(&owner(), &Address::from_label("nowhere"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unknown_contract_reverts_and_advances_nonce() {
        let mut chain = Chain::new(BlockInfo::default());
        let receipt = chain.execute(Transaction::new(
            user(),
            Call::CreateVault {
                contract: Address::from_label("nowhere"),
                vault_id: 1,
            },
        ));
        assert_eq!(receipt.revert_kind(), Some(ErrorKind::NotFound));
        assert_eq!(chain.nonce(&user()), 1);
        assert_eq!(chain.reverted_count(), 1);
    }

    #[test]
    fn value_on_non_payable_call_is_rejected() {
        let mut chain = Chain::new(BlockInfo::default());
        let dv = chain.deploy_deposit_vault(&owner());
        chain.credit(&owner(), 10).unwrap();

        let receipt = chain.execute(
            Transaction::new(
                owner(),
                Call::CreateVault {
                    contract: dv,
                    vault_id: 1,
                },
            )
            .with_value(5),
        );
        assert_eq!(receipt.revert_kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(chain.native_balance(&owner()), 10);
        assert_eq!(chain.vault_exists(&dv, 1), Ok(false));
    }

    #[test]
    fn identical_calls_get_distinct_hashes() {
        let mut chain = Chain::new(BlockInfo::default());
        let dv = chain.deploy_deposit_vault(&owner());
        let call = Call::CreateVault {
            contract: dv,
            vault_id: 1,
        };
        let first = chain.execute(Transaction::new(user(), call.clone()));
        let second = chain.execute(Transaction::new(user(), call));
        assert_ne!(first.tx_hash, second.tx_hash);
        assert!(first.status.is_success());
        assert_eq!(second.revert_kind(), Some(ErrorKind::AlreadyExists));
    }

    #[test]
    fn clock_is_monotonic() {
        let mut chain = Chain::new(BlockInfo {
            number: 0,
            timestamp: 100,
        });
        let next = chain.advance_block(100).unwrap();
        assert_eq!(next.number, 1);
        assert!(matches!(
            chain.advance_block(99),
            Err(ExecutionError::ClockWentBackwards { .. })
        ));
        assert_eq!(chain.block().number, 1);
    }

    #[test]
    fn state_survives_bincode_and_resumes_sequence() {
        let mut chain = Chain::new(BlockInfo::default());
        let dv = chain.deploy_deposit_vault(&owner());
        chain.execute(Transaction::new(
            owner(),
            Call::CreateVault {
                contract: dv,
                vault_id: 1,
            },
        ));

        let bytes = bincode::serialize(chain.state()).unwrap();
        let state: ChainState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(&state, chain.state());

        let mut resumed = Chain::from_state(state);
        assert_eq!(resumed.next_event_seq(), 1);
        let receipt = resumed.execute(Transaction::new(
            owner(),
            Call::CreateVault {
                contract: dv,
                vault_id: 2,
            },
        ));
        assert_eq!(receipt.events[0].seq, 1);
        assert_eq!(resumed.events_since(0, 10).len(), 1);
    }

    #[test]
    fn failed_persist_rolls_the_chain_back() {
        let mut chain = Chain::new(BlockInfo::default());
        let dv = chain.deploy_deposit_vault(&owner());
        let create = |vault_id| {
            Transaction::new(
                owner(),
                Call::CreateVault {
                    contract: dv,
                    vault_id,
                },
            )
        };
        chain
            .execute_and_persist(create(1), |_, _| Ok::<(), String>(()))
            .unwrap();
        let before = chain.state().clone();

        let err = chain
            .execute_and_persist(create(2), |state, receipt| {
                assert_eq!(state.next_event_seq, 2);
                assert!(receipt.status.is_success());
                Err("disk full".to_string())
            })
            .unwrap_err();
        assert_eq!(err, "disk full");
        assert_eq!(chain.state(), &before);
        assert_eq!(chain.vault_exists(&dv, 2), Ok(false));
        assert_eq!(chain.events_since(0, 10).len(), 1);

        let retry = chain
            .execute_and_persist(create(2), |_, _| Ok::<(), String>(()))
            .unwrap();
        assert_eq!(retry.events[0].seq, 1);
        assert_eq!(chain.nonce(&owner()), before.nonces[&owner()] + 1);
    }

}
