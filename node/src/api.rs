//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the ledger node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Description                      |
//! |--------|------------------------------------|----------------------------------|
//! | GET    | `/health`                          | Liveness probe                   |
//! | GET    | `/status`                          | Chain summary and deployment     |
//! | GET    | `/accounts/:address`               | Native balance and nonce         |
//! | GET    | `/vaults/:vault_id`                | Vault existence and total        |
//! | GET    | `/vaults/:vault_id/balances/:user` | A user's vault balance           |
//! | GET    | `/vaults/:vault_id/rewards`        | Current reward pool              |
//! | GET    | `/vaults/:vault_id/rewards/:user`  | A user's pending yield           |
//! | GET    | `/tokens/balances/:address`        | Reward-token balance             |
//! | POST   | `/transactions`                    | Execute a transaction            |
//! | GET    | `/transactions/:hash`              | Receipt by hash                  |
//! | GET    | `/events?from=&limit=`             | Committed events by sequence     |
//! | GET    | `/ws`                              | Live blocks and events           |
//!
//! This is a development node: the sender of a transaction is whatever the
//! request body says it is.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use shm_contracts::chain::{ExecutionError, Transaction};
use shm_contracts::genesis::Deployment;
use shm_protocol::config::{
    CHAIN_ID, DEFAULT_EVENT_PAGE, MAX_EVENT_PAGE, NATIVE_DECIMALS, NETWORK_NAME,
};
use shm_protocol::error::{ErrorKind, HasErrorKind};
use shm_protocol::units::{amount_string, format_units};
use shm_protocol::{Address, Amount, EventRecord, Receipt, TxHash, VaultId};

use crate::ledger::Ledger;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub ledger: Arc<Ledger>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/vaults/:vault_id", get(vault_handler))
        .route("/vaults/:vault_id/balances/:user", get(vault_balance_handler))
        .route("/vaults/:vault_id/rewards", get(reward_pool_handler))
        .route("/vaults/:vault_id/rewards/:user", get(pending_yield_handler))
        .route("/tokens/balances/:address", get(token_balance_handler))
        .route("/transactions", post(submit_transaction_handler))
        .route("/transactions/:hash", get(transaction_by_hash_handler))
        .route("/events", get(events_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub chain_id: u64,
    pub block_number: u64,
    /// RFC 3339 time of the current block.
    pub block_time: Option<String>,
    pub tx_count: u64,
    pub reverted_count: u64,
    /// Sequence number the next committed event will carry.
    pub next_event_seq: u64,
    #[serde(with = "amount_string")]
    pub total_value_locked: Amount,
    /// TVL in whole SHM, e.g. `"3.5"`.
    pub total_value_locked_formatted: String,
    pub deployment: Deployment,
    /// RFC 3339 time of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub balance: Amount,
    pub balance_formatted: String,
    pub nonce: u64,
}

/// Response payload for `GET /vaults/:vault_id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultResponse {
    pub vault_id: VaultId,
    pub exists: bool,
    #[serde(with = "amount_string")]
    pub total_balance: Amount,
}

/// Response payload for `GET /vaults/:vault_id/balances/:user`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultBalanceResponse {
    pub vault_id: VaultId,
    pub user: Address,
    #[serde(with = "amount_string")]
    pub balance: Amount,
}

/// Response payload for `GET /vaults/:vault_id/rewards`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RewardPoolResponse {
    pub vault_id: VaultId,
    pub round: u64,
    #[serde(with = "amount_string")]
    pub snapshot_total: Amount,
    #[serde(with = "amount_string")]
    pub total_funded: Amount,
    #[serde(with = "amount_string")]
    pub distributed: Amount,
    #[serde(with = "amount_string")]
    pub remaining: Amount,
    pub claimants: usize,
}

/// Response payload for `GET /vaults/:vault_id/rewards/:user`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingYieldResponse {
    pub vault_id: VaultId,
    pub user: Address,
    #[serde(with = "amount_string")]
    pub pending: Amount,
}

/// Response payload for `GET /tokens/balances/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenBalanceResponse {
    pub token: Address,
    pub address: Address,
    pub decimals: u8,
    #[serde(with = "amount_string")]
    pub balance: Amount,
}

/// Query parameters for `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub from: Option<u64>,
    pub limit: Option<usize>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Ledger error kind, when the failure came from the ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                kind: None,
            },
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {error}"),
        )
    }
}

impl From<ExecutionError> for ApiError {
    fn from(e: ExecutionError) -> Self {
        let kind = e.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            body: ErrorResponse {
                error: e.to_string(),
                kind: Some(kind),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::from_str(raw).map_err(|e| ApiError::bad_request(format!("invalid address {raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — chain summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let deployment = state.ledger.deployment();
    let (block, tx_count, reverted_count, next_event_seq, tvl) = state
        .ledger
        .read(|c| {
            (
                c.block(),
                c.tx_count(),
                c.reverted_count(),
                c.next_event_seq(),
                c.total_value_locked(),
            )
        })
        .await;

    Json(StatusResponse {
        version: state.version.clone(),
        network: NETWORK_NAME.to_string(),
        chain_id: CHAIN_ID,
        block_number: block.number,
        block_time: block.time().map(|t| t.to_rfc3339()),
        tx_count,
        reverted_count,
        next_event_seq,
        total_value_locked: tvl,
        total_value_locked_formatted: format_units(tvl, NATIVE_DECIMALS),
        deployment,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /accounts/:address` — native balance and nonce. Unknown addresses
/// report zero.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<AccountResponse> {
    let address = parse_address(&address)?;
    let (balance, nonce) = state
        .ledger
        .read(|c| (c.native_balance(&address), c.nonce(&address)))
        .await;

    Ok(Json(AccountResponse {
        address,
        balance,
        balance_formatted: format_units(balance, NATIVE_DECIMALS),
        nonce,
    }))
}

/// `GET /vaults/:vault_id` — existence and total balance.
async fn vault_handler(
    Path(vault_id): Path<VaultId>,
    State(state): State<AppState>,
) -> ApiResult<VaultResponse> {
    let dv = state.ledger.deployment().deposit_vault;
    let (exists, total_balance) = state
        .ledger
        .read(|c| -> Result<_, ExecutionError> {
            let exists = c.vault_exists(&dv, vault_id)?;
            let total = if exists { c.vault_balance(&dv, vault_id)? } else { 0 };
            Ok((exists, total))
        })
        .await?;

    Ok(Json(VaultResponse {
        vault_id,
        exists,
        total_balance,
    }))
}

/// `GET /vaults/:vault_id/balances/:user` — `balanceOf(vaultId, user)`.
async fn vault_balance_handler(
    Path((vault_id, user)): Path<(VaultId, String)>,
    State(state): State<AppState>,
) -> ApiResult<VaultBalanceResponse> {
    let user = parse_address(&user)?;
    let dv = state.ledger.deployment().deposit_vault;
    let balance = state
        .ledger
        .read(|c| c.balance_of(&dv, vault_id, &user))
        .await?;

    Ok(Json(VaultBalanceResponse {
        vault_id,
        user,
        balance,
    }))
}

/// `GET /vaults/:vault_id/rewards` — the current reward round. 404 if the
/// vault was never funded.
async fn reward_pool_handler(
    Path(vault_id): Path<VaultId>,
    State(state): State<AppState>,
) -> ApiResult<RewardPoolResponse> {
    let yv = state.ledger.deployment().yield_vault;
    let pool = state
        .ledger
        .read(|c| c.reward_pool(&yv, vault_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No reward pool for vault {vault_id}")))?;

    Ok(Json(RewardPoolResponse {
        vault_id,
        round: pool.round,
        snapshot_total: pool.snapshot_total,
        total_funded: pool.total_funded,
        distributed: pool.distributed,
        remaining: pool.remaining(),
        claimants: pool.claimant_count(),
    }))
}

/// `GET /vaults/:vault_id/rewards/:user` — what a claim would pay now.
async fn pending_yield_handler(
    Path((vault_id, user)): Path<(VaultId, String)>,
    State(state): State<AppState>,
) -> ApiResult<PendingYieldResponse> {
    let user = parse_address(&user)?;
    let yv = state.ledger.deployment().yield_vault;
    let pending = state
        .ledger
        .read(|c| c.pending_yield(&yv, vault_id, &user))
        .await?;

    Ok(Json(PendingYieldResponse {
        vault_id,
        user,
        pending,
    }))
}

/// `GET /tokens/balances/:address` — reward-token balance.
async fn token_balance_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<TokenBalanceResponse> {
    let address = parse_address(&address)?;
    let token = state.ledger.deployment().token;
    let (balance, decimals) = state
        .ledger
        .read(|c| -> Result<_, ExecutionError> {
            Ok((c.token_balance(&token, &address)?, c.token_decimals(&token)?))
        })
        .await?;

    Ok(Json(TokenBalanceResponse {
        token,
        address,
        decimals,
        balance,
    }))
}

/// `POST /transactions` — executes a transaction and returns its receipt.
///
/// A reverted transaction is still a 200: the receipt's status says why.
async fn submit_transaction_handler(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> ApiResult<Receipt> {
    let receipt = state.ledger.submit(tx).await.map_err(ApiError::internal)?;
    Ok(Json(receipt))
}

/// `GET /transactions/:hash` — a stored receipt by hex-encoded hash.
async fn transaction_by_hash_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Receipt> {
    let tx_hash = TxHash::from_str(&hash)
        .map_err(|e| ApiError::bad_request(format!("invalid transaction hash {hash}: {e}")))?;

    match state.ledger.db().get_receipt(&tx_hash) {
        Ok(Some(receipt)) => Ok(Json(receipt)),
        Ok(None) => Err(ApiError::not_found(format!("Transaction not found: {hash}"))),
        Err(e) => Err(ApiError::internal(e)),
    }
}

/// `GET /events?from=&limit=` — committed events in sequence order, served
/// from storage so pages survive restarts.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<EventRecord>> {
    let from = query.from.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE).min(MAX_EVENT_PAGE);
    let records = state
        .ledger
        .db()
        .events_from(from, limit)
        .map_err(ApiError::internal)?;
    Ok(Json(records))
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`NodeEvent`](crate::ledger::NodeEvent)
/// messages. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Forwards broadcast events until the client disconnects or the channel
/// closes.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.ledger.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Missed records can be recovered through /events.
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
