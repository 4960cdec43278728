//! Application configuration loaded from environment variables.

use alloy::primitives::Address;

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Read-only JSON-RPC endpoint used for queries and event backfill.
    /// Available regardless of wallet state so unauthenticated views work.
    pub rpc_url: String,
    /// JSON-RPC endpoint of the wallet-managed node used for signing.
    /// `None` means every write operation fails with `WalletUnavailable`.
    pub wallet_rpc_url: Option<String>,
    /// Deployed Green Token contract address.
    pub contract_address: Address,
    /// Path to the SQLite cache file.
    pub database_url: String,
    /// Port for the REST API server.
    pub api_port: u16,
    /// How often (in seconds) to poll for new contract events.
    pub poll_interval_secs: u64,
    /// Minimum interval (in seconds) between non-forced refreshes.
    pub refresh_min_secs: u64,
    /// Block to start the event backfill from (contract deployment block).
    pub start_block: u64,
    /// Content-addressed evidence store API (IPFS-style `/api/v0/add`).
    pub evidence_api_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),
            wallet_rpc_url: env_var("WALLET_RPC_URL").ok(),
            contract_address: env_var("CONTRACT_ADDRESS")
                .map_err(|_| {
                    ServiceError::Config(
                        "CONTRACT_ADDRESS environment variable is required".to_string(),
                    )
                })?
                .parse()
                .map_err(|_| ServiceError::Config("Invalid CONTRACT_ADDRESS".to_string()))?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./greentoken_cache.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid API_PORT".to_string()))?,
            poll_interval_secs: env_var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid POLL_INTERVAL_SECS".to_string()))?,
            refresh_min_secs: env_var("REFRESH_MIN_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid REFRESH_MIN_SECS".to_string()))?,
            start_block: env_var("START_BLOCK")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid START_BLOCK".to_string()))?,
            evidence_api_url: env_var("EVIDENCE_API_URL").ok(),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}
