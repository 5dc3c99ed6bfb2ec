//! Staking Pool API endpoints
//!
//! Endpoints (all act as the caller named by the `x-caller-id` header):
//!   GET  /                              -> Pool summary
//!   POST /stake                         -> Stake principal
//!   POST /withdraw                      -> Withdraw an exact amount
//!   POST /withdraw-all                  -> Withdraw all principal
//!   POST /claim                         -> Claim every pending reward
//!   POST /claim/{asset}                 -> Claim pending reward in one asset
//!   POST /rewards/{asset}               -> Inject reward (operator)
//!   POST /assets/{asset}                -> Allow-list a reward asset (operator)
//!   GET  /assets/{asset}                -> Accumulator and reserve for an asset
//!   GET  /stakers/{id}                  -> Staker principal and rewards
//!   GET  /stakers/{id}/rewards/{asset}  -> Staker rewards in one asset
//!   GET  /stakers/{id}/events           -> Events concerning one staker
//!   GET  /events?since=N                -> Event log
//!   GET  /replay                        -> Balances rebuilt from the event log

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::middleware::Caller;
use crate::ledger::AssetTransfer;
use crate::staking::{
    AssetId, AssetRewards, ClaimedReward, EventRecord, Identity, LedgerError, PoolService,
    PoolSummary, ReplayedBalances, StakerRewards,
};

// ============================================================================
// State
// ============================================================================

/// Pool API state
pub struct PoolApiState<L> {
    pub service: PoolService<L>,
}

impl<L> Clone for PoolApiState<L> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<L> PoolApiState<L> {
    pub fn new(service: PoolService<L>) -> Self {
        Self { service }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: u128,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub staker: Identity,
    pub amount: u128,
    pub principal: u128,
    pub total_principal: u128,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub staker: Identity,
    pub claimed: Vec<ClaimedReward>,
}

#[derive(Debug, Serialize)]
pub struct InjectResponse {
    pub asset: AssetId,
    pub amount: u128,
    pub reserve: u128,
    pub acc_per_share: U256,
}

#[derive(Debug, Serialize)]
pub struct AllowAssetResponse {
    pub asset: AssetId,
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct AssetRewardsResponse {
    pub asset: AssetId,
    pub rewards: AssetRewards,
}

#[derive(Debug, Serialize)]
pub struct StakerAssetRewards {
    pub asset: AssetId,
    pub rewards: StakerRewards,
}

#[derive(Debug, Serialize)]
pub struct StakerResponse {
    pub staker: Identity,
    pub principal: u128,
    pub rewards: Vec<StakerAssetRewards>,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Unauthorized => StatusCode::FORBIDDEN,
        LedgerError::UnknownAsset(_) => StatusCode::NOT_FOUND,
        LedgerError::TransferFailed(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Overflow => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::ZeroAmount
        | LedgerError::InsufficientPrincipal { .. }
        | LedgerError::NoStakers => StatusCode::BAD_REQUEST,
    }
}

pub fn api_error(err: LedgerError) -> ApiError {
    let status = status_for(&err);
    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}

// ============================================================================
// API Handlers
// ============================================================================

pub async fn get_pool<L>(State(state): State<PoolApiState<L>>) -> Json<PoolSummary>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    Json(state.service.summary().await)
}

pub async fn stake<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<PrincipalResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    state
        .service
        .stake(&caller, request.amount)
        .await
        .map_err(api_error)?;

    Ok(Json(PrincipalResponse {
        principal: state.service.staker_principal(&caller).await,
        total_principal: state.service.pool_principal().await,
        staker: caller,
        amount: request.amount,
    }))
}

pub async fn withdraw<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<PrincipalResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    state
        .service
        .withdraw_exact(&caller, request.amount)
        .await
        .map_err(api_error)?;

    Ok(Json(PrincipalResponse {
        principal: state.service.staker_principal(&caller).await,
        total_principal: state.service.pool_principal().await,
        staker: caller,
        amount: request.amount,
    }))
}

pub async fn withdraw_all<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<PrincipalResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let amount = state
        .service
        .withdraw_all(&caller)
        .await
        .map_err(api_error)?;

    Ok(Json(PrincipalResponse {
        principal: 0,
        total_principal: state.service.pool_principal().await,
        staker: caller,
        amount,
    }))
}

pub async fn claim_rewards<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<ClaimResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let claimed = state
        .service
        .claim_rewards(&caller)
        .await
        .map_err(api_error)?;

    Ok(Json(ClaimResponse {
        staker: caller,
        claimed,
    }))
}

pub async fn claim_reward<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(asset): Path<String>,
) -> Result<Json<ClaimResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let asset = AssetId::new(asset);
    let claimed = state
        .service
        .claim_reward(&caller, &asset)
        .await
        .map_err(api_error)?;

    Ok(Json(ClaimResponse {
        staker: caller,
        claimed: claimed.into_iter().collect(),
    }))
}

pub async fn inject_reward<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(asset): Path<String>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<InjectResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let asset = AssetId::new(asset);
    state
        .service
        .inject_reward(&caller, &asset, request.amount)
        .await
        .map_err(api_error)?;

    let rewards = state
        .service
        .asset_rewards(&asset)
        .await
        .map_err(api_error)?;

    Ok(Json(InjectResponse {
        asset,
        amount: request.amount,
        reserve: rewards.reserve,
        acc_per_share: rewards.acc_per_share,
    }))
}

pub async fn allow_asset<L>(
    State(state): State<PoolApiState<L>>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(asset): Path<String>,
) -> Result<Json<AllowAssetResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let asset = AssetId::new(asset);
    let added = state
        .service
        .allow_asset(&caller, asset.clone())
        .await
        .map_err(api_error)?;

    if added {
        info!("Asset {} allow-listed via API", asset);
    }
    Ok(Json(AllowAssetResponse { asset, added }))
}

pub async fn get_asset<L>(
    State(state): State<PoolApiState<L>>,
    Path(asset): Path<String>,
) -> Result<Json<AssetRewardsResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let asset = AssetId::new(asset);
    let rewards = state
        .service
        .asset_rewards(&asset)
        .await
        .map_err(api_error)?;

    Ok(Json(AssetRewardsResponse { asset, rewards }))
}

pub async fn get_staker<L>(
    State(state): State<PoolApiState<L>>,
    Path(id): Path<String>,
) -> Result<Json<StakerResponse>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let staker = Identity::new(id);
    let mut rewards = Vec::new();
    for asset in state.service.registered_assets().await {
        let position = state
            .service
            .staker_rewards(&staker, &asset)
            .await
            .map_err(api_error)?;
        rewards.push(StakerAssetRewards {
            asset,
            rewards: position,
        });
    }

    Ok(Json(StakerResponse {
        principal: state.service.staker_principal(&staker).await,
        staker,
        rewards,
    }))
}

pub async fn get_staker_rewards<L>(
    State(state): State<PoolApiState<L>>,
    Path((id, asset)): Path<(String, String)>,
) -> Result<Json<StakerAssetRewards>, ApiError>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    let staker = Identity::new(id);
    let asset = AssetId::new(asset);
    let rewards = state
        .service
        .staker_rewards(&staker, &asset)
        .await
        .map_err(|err| {
            warn!("Reward query failed for {}: {}", staker, err);
            api_error(err)
        })?;

    Ok(Json(StakerAssetRewards { asset, rewards }))
}

pub async fn get_staker_events<L>(
    State(state): State<PoolApiState<L>>,
    Path(id): Path<String>,
) -> Json<Vec<EventRecord>>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    Json(state.service.staker_events(&Identity::new(id)).await)
}

pub async fn get_events<L>(
    State(state): State<PoolApiState<L>>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<EventRecord>>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    Json(state.service.events_since(query.since).await)
}

pub async fn get_replay<L>(State(state): State<PoolApiState<L>>) -> Json<ReplayedBalances>
where
    L: AssetTransfer + Send + Sync + 'static,
{
    Json(state.service.replay().await)
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router<L>(state: PoolApiState<L>) -> Router
where
    L: AssetTransfer + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(get_pool::<L>))
        // Principal
        .route("/stake", post(stake::<L>))
        .route("/withdraw", post(withdraw::<L>))
        .route("/withdraw-all", post(withdraw_all::<L>))
        // Rewards
        .route("/claim", post(claim_rewards::<L>))
        .route("/claim/{asset}", post(claim_reward::<L>))
        .route("/rewards/{asset}", post(inject_reward::<L>))
        // Assets
        .route("/assets/{asset}", post(allow_asset::<L>).get(get_asset::<L>))
        // Stakers
        .route("/stakers/{id}", get(get_staker::<L>))
        .route("/stakers/{id}/rewards/{asset}", get(get_staker_rewards::<L>))
        .route("/stakers/{id}/events", get(get_staker_events::<L>))
        // Events
        .route("/events", get(get_events::<L>))
        .route("/replay", get(get_replay::<L>))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
