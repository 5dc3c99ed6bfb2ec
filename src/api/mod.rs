//! HTTP API endpoints for the staking pool
//!
//! Provides REST APIs for:
//! - Pool operations (stake, withdraw, claim, inject) and queries
//! - Development ledger (faucet, allowances, balances)
//! - Middleware (caller identity, request logging)

pub mod ledger;
pub mod middleware;
pub mod pool;

pub use ledger::{LedgerApiState, create_router as create_ledger_router};
pub use middleware::{
    CALLER_HEADER, Caller, IdentityConfig, IdentityState, caller_from_headers,
    identity_middleware, logging_middleware,
};
pub use pool::{
    ApiError, ErrorResponse, PoolApiState, api_error, create_router as create_pool_router,
    status_for,
};
