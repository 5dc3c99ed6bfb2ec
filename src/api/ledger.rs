//! Development Ledger API endpoints
//!
//! Balance and allowance management against the in-memory asset ledger.
//!
//! Endpoints:
//!   POST /faucet                       -> Mint funds to the caller (dev only)
//!   POST /approve                      -> Set the caller's custody allowance
//!   GET  /balances/{id}/{asset}        -> Balance and allowance of an identity
//!   GET  /custody/{asset}              -> Custody account balance
//!   GET  /accounts/{id}/{asset}        -> Posted account snapshot
//!   GET  /transfers                    -> Posted transfer history

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::middleware::Caller;
use super::pool::{ApiError, ErrorResponse};
use crate::config::LedgerConfig;
use crate::ledger::{AccountSnapshot, InMemoryLedger, TransferSnapshot};
use crate::staking::{AssetId, Identity, PoolService};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct LedgerApiState {
    pub service: PoolService<InMemoryLedger>,
    pub config: LedgerConfig,
}

impl LedgerApiState {
    pub fn new(service: PoolService<InMemoryLedger>, config: LedgerConfig) -> Self {
        Self { service, config }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AssetAmountRequest {
    pub asset: String,
    pub amount: u128,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub identity: Identity,
    pub asset: AssetId,
    pub balance: u128,
    pub allowance: u128,
}

#[derive(Debug, Serialize)]
pub struct CustodyResponse {
    pub asset: AssetId,
    pub balance: u128,
}

fn bad_request(error: &str, message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
}

/// Reject faucet requests above the configured cap
pub fn check_faucet_amount(config: &LedgerConfig, amount: u128) -> Result<(), ApiError> {
    if amount == 0 {
        return Err(bad_request("zero_amount", "Amount must be greater than zero".to_string()));
    }
    if amount > config.max_faucet_amount {
        return Err(bad_request(
            "faucet_limit",
            format!(
                "Faucet amount {} exceeds the per-call limit of {}",
                amount, config.max_faucet_amount
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

pub async fn faucet(
    State(state): State<LedgerApiState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<AssetAmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    check_faucet_amount(&state.config, request.amount)?;
    let asset = AssetId::new(request.asset);

    let (balance, allowance) = state
        .service
        .with_ledger_mut(|ledger| {
            ledger
                .faucet(&caller, &asset, request.amount)
                .map(|_| (ledger.balance_of(&caller, &asset), ledger.allowance(&caller, &asset)))
        })
        .await
        .map_err(|err| {
            warn!("Faucet failed for {}: {}", caller, err);
            bad_request("transfer_failed", err.to_string())
        })?;

    Ok(Json(BalanceResponse {
        identity: caller,
        asset,
        balance,
        allowance,
    }))
}

pub async fn approve(
    State(state): State<LedgerApiState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<AssetAmountRequest>,
) -> Json<BalanceResponse> {
    let asset = AssetId::new(request.asset);
    let balance = state
        .service
        .with_ledger_mut(|ledger| {
            ledger.approve(&caller, &asset, request.amount);
            ledger.balance_of(&caller, &asset)
        })
        .await;

    info!("Custody allowance for {} set to {} {}", caller, request.amount, asset);
    Json(BalanceResponse {
        identity: caller,
        asset,
        balance,
        allowance: request.amount,
    })
}

pub async fn get_balance(
    State(state): State<LedgerApiState>,
    Path((id, asset)): Path<(String, String)>,
) -> Json<BalanceResponse> {
    let identity = Identity::new(id);
    let asset = AssetId::new(asset);
    let (balance, allowance) = state
        .service
        .with_ledger(|ledger| {
            (
                ledger.balance_of(&identity, &asset),
                ledger.allowance(&identity, &asset),
            )
        })
        .await;

    Json(BalanceResponse {
        identity,
        asset,
        balance,
        allowance,
    })
}

pub async fn get_custody(
    State(state): State<LedgerApiState>,
    Path(asset): Path<String>,
) -> Json<CustodyResponse> {
    let asset = AssetId::new(asset);
    let balance = state
        .service
        .with_ledger(|ledger| ledger.custody_balance(&asset))
        .await;

    Json(CustodyResponse { asset, balance })
}

pub async fn get_account(
    State(state): State<LedgerApiState>,
    Path((id, asset)): Path<(String, String)>,
) -> Result<Json<AccountSnapshot>, ApiError> {
    let identity = Identity::new(id);
    let asset = AssetId::new(asset);
    state
        .service
        .with_ledger(|ledger| ledger.account(&identity, &asset).cloned())
        .await
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "unknown_account".to_string(),
                    message: format!("No {} account for {}", asset, identity),
                }),
            )
        })
}

pub async fn get_transfers(
    State(state): State<LedgerApiState>,
) -> Json<Vec<TransferSnapshot>> {
    Json(
        state
            .service
            .with_ledger(|ledger| ledger.transfers().to_vec())
            .await,
    )
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: LedgerApiState) -> Router {
    let mut router = Router::new()
        .route("/approve", post(approve))
        .route("/balances/{id}/{asset}", get(get_balance))
        .route("/custody/{asset}", get(get_custody))
        .route("/accounts/{id}/{asset}", get(get_account))
        .route("/transfers", get(get_transfers));

    if state.config.dev_faucet {
        warn!("Development faucet is enabled");
        router = router.route("/faucet", post(faucet));
    }

    router.with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
