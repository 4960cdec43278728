//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No wallet endpoint is available")]
    WalletUnavailable,

    #[error("Wallet access request was rejected by the user")]
    UserRejected,

    #[error("No wallet is connected")]
    NotConnected,

    #[error("Caller is not the contract owner")]
    NotAuthorized,

    #[error("A previous invocation of this operation is still in flight")]
    AlreadyInProgress,

    #[error("Transfer amount exceeds the sender balance")]
    InsufficientBalance,

    #[error("Contract balance does not cover the reward")]
    InsufficientContractFunds,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Event sync failed: {0}")]
    EventSync(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    #[error("Contract call error: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("Transaction confirmation error: {0}")]
    Confirmation(#[from] alloy::providers::PendingTransactionError),

    #[error("Evidence upload error: {0}")]
    Evidence(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Errors raised by precondition checks, before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::NotAuthorized
                | Self::InvalidAmount(_)
                | Self::InvalidAddress(_)
                | Self::AlreadyInProgress
        )
    }
}
