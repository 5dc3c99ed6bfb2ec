use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use tracing::{info, warn};

use crate::staking::{AssetId, Identity};

/// Configuration for the staking pool service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Pool identity and assets
    pub pool: PoolConfig,
    /// Development ledger configuration
    pub ledger: LedgerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Identity allowed to inject rewards and allow-list assets
    pub operator: String,
    /// Asset principal is denominated in
    pub staking_asset: String,
    /// Reward assets allow-listed at startup
    pub reward_assets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Mount the faucet route on the dev ledger API
    pub dev_faucet: bool,
    /// Largest amount a single faucet call may mint
    pub max_faucet_amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log every HTTP request
    pub log_requests: bool,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8780,
            },
            pool: PoolConfig {
                operator: "".to_string(), // MUST be configured
                staking_asset: "CHERT".to_string(),
                reward_assets: Vec::new(),
            },
            ledger: LedgerConfig {
                dev_faucet: false,
                max_faucet_amount: 1_000_000_000_000_000_000_000, // 1000 units at 18 decimals
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
            },
        }
    }
}

impl StakingConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Some(host) = lookup("CHERT_STAKING_HOST") {
            config.server.host = host;
        }

        if let Some(port) = lookup("CHERT_STAKING_PORT") {
            config.server.port = port.parse().context("Invalid CHERT_STAKING_PORT value")?;
        }

        // Pool configuration
        config.pool.operator = lookup("CHERT_STAKING_OPERATOR")
            .context("CHERT_STAKING_OPERATOR environment variable is required")?;

        if let Some(asset) = lookup("CHERT_STAKING_ASSET") {
            config.pool.staking_asset = asset;
        }

        if let Some(assets) = lookup("CHERT_STAKING_REWARD_ASSETS") {
            config.pool.reward_assets = assets.split(',').map(|s| s.trim().to_string()).collect();
        } else {
            warn!("CHERT_STAKING_REWARD_ASSETS not set, no reward assets allowed at startup");
        }

        // Ledger configuration
        if let Some(dev_faucet) = lookup("CHERT_STAKING_DEV_FAUCET") {
            config.ledger.dev_faucet = dev_faucet
                .parse()
                .context("Invalid CHERT_STAKING_DEV_FAUCET value")?;
        }

        if let Some(max) = lookup("CHERT_STAKING_MAX_FAUCET") {
            config.ledger.max_faucet_amount = max
                .parse()
                .context("Invalid CHERT_STAKING_MAX_FAUCET value")?;
        }

        // Logging configuration
        if let Some(log_level) = lookup("CHERT_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Some(log_requests) = lookup("CHERT_LOG_REQUESTS") {
            config.logging.log_requests = log_requests
                .parse()
                .context("Invalid CHERT_LOG_REQUESTS value")?;
        }

        config.validate()?;

        info!(
            operator = %config.pool.operator,
            staking_asset = %config.pool.staking_asset,
            reward_assets = config.pool.reward_assets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validate configuration for consistency
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.pool.operator.trim().is_empty() {
            return Err(anyhow::anyhow!("Pool operator identity is required"));
        }

        if self.pool.staking_asset.trim().is_empty() {
            return Err(anyhow::anyhow!("Staking asset cannot be empty"));
        }

        let mut seen = HashSet::new();
        for asset in &self.pool.reward_assets {
            if asset.is_empty() {
                return Err(anyhow::anyhow!("Reward asset names cannot be empty"));
            }
            if !seen.insert(asset.as_str()) {
                return Err(anyhow::anyhow!("Reward asset {} is listed twice", asset));
            }
        }

        if self.ledger.dev_faucet && self.ledger.max_faucet_amount == 0 {
            return Err(anyhow::anyhow!(
                "Faucet is enabled but CHERT_STAKING_MAX_FAUCET is zero"
            ));
        }

        Ok(())
    }

    pub fn operator(&self) -> Identity {
        Identity::new(self.pool.operator.trim())
    }

    pub fn staking_asset(&self) -> AssetId {
        AssetId::new(self.pool.staking_asset.trim())
    }

    pub fn reward_assets(&self) -> Vec<AssetId> {
        self.pool.reward_assets.iter().map(AssetId::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_operator_is_required() {
        let result = StakingConfig::from_lookup(vars(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_vars() {
        let config = StakingConfig::from_lookup(vars(&[
            ("CHERT_STAKING_OPERATOR", "operator"),
            ("CHERT_STAKING_PORT", "9000"),
            ("CHERT_STAKING_REWARD_ASSETS", "CHERT, LINK"),
            ("CHERT_STAKING_DEV_FAUCET", "true"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.operator(), Identity::new("operator"));
        assert_eq!(
            config.reward_assets(),
            vec![AssetId::new("CHERT"), AssetId::new("LINK")]
        );
        assert!(config.ledger.dev_faucet);
    }

    #[test]
    fn test_config_validation() {
        let bad_port = StakingConfig::from_lookup(vars(&[
            ("CHERT_STAKING_OPERATOR", "operator"),
            ("CHERT_STAKING_PORT", "0"),
        ]));
        assert!(bad_port.is_err());

        let duplicate = StakingConfig::from_lookup(vars(&[
            ("CHERT_STAKING_OPERATOR", "operator"),
            ("CHERT_STAKING_REWARD_ASSETS", "LINK,LINK"),
        ]));
        assert!(duplicate.is_err());

        let empty = StakingConfig::from_lookup(vars(&[
            ("CHERT_STAKING_OPERATOR", "operator"),
            ("CHERT_STAKING_REWARD_ASSETS", "LINK,,CHERT"),
        ]));
        assert!(empty.is_err());

        let not_a_number = StakingConfig::from_lookup(vars(&[
            ("CHERT_STAKING_OPERATOR", "operator"),
            ("CHERT_STAKING_PORT", "http"),
        ]));
        assert!(not_a_number.is_err());
    }
}
