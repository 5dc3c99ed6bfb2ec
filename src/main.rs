use anyhow::{Context, Result};
use axum::{Router, middleware, routing::get};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use silica_staking::{
    InMemoryLedger, PoolService, StakingConfig, StakingPool,
    api::{
        IdentityConfig, IdentityState, LedgerApiState, PoolApiState, create_ledger_router,
        create_pool_router, identity_middleware, logging_middleware,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - fails fast on a missing operator
    let config = StakingConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check CHERT_STAKING_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting Chert staking pool server");

    // Build the pool and allow-list the configured reward assets
    let operator = config.operator();
    let mut pool = StakingPool::new(operator.clone(), config.staking_asset());
    for asset in config.reward_assets() {
        pool.allow_asset(&operator, asset.clone())
            .with_context(|| format!("Failed to allow reward asset {}", asset))?;
    }
    if pool.registered_assets().is_empty() {
        warn!("No reward assets configured; the operator must allow assets before injecting");
    }

    let service = PoolService::new(pool, InMemoryLedger::new());

    let identity_state = IdentityState::new(IdentityConfig {
        log_requests: config.logging.log_requests,
        ..IdentityConfig::default()
    });

    let app = Router::new()
        // Pool operations and queries
        .nest("/pool", create_pool_router(PoolApiState::new(service.clone())))
        // Development ledger (balances, allowances, faucet)
        .nest(
            "/ledger",
            create_ledger_router(LedgerApiState::new(service.clone(), config.ledger.clone())),
        )
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Middleware layers (outermost last)
        .layer(middleware::from_fn_with_state(
            identity_state.clone(),
            identity_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            identity_state.clone(),
            logging_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    // Start the server on configured host/port
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Staking pool server listening on {}", bind_addr);
    info!(
        "Operator: {}, staking asset: {}, dev faucet: {}",
        config.pool.operator, config.pool.staking_asset, config.ledger.dev_faucet
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging(config: &StakingConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
