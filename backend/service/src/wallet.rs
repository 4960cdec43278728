//! Wallet provider boundary.
//!
//! The service depends on the capability set of a user-controlled wallet:
//! request account access, query exposed accounts, and get notified when
//! the selected account changes. [`NodeWallet`] speaks JSON-RPC to a
//! wallet-managed node (`eth_requestAccounts` / `eth_accounts`) and
//! emulates the accounts-changed notification by polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::TransportError;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::errors::{Result, ServiceError};

/// EIP-1193 code for a declined account-access request.
const USER_REJECTED_CODE: i64 = 4001;

const ACCOUNT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt the wallet for account access.
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Query currently exposed accounts without prompting. Used for the
    /// best-effort silent reconnect on startup.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Receive accounts-changed notifications. Each subscription sees the
    /// same single upstream watcher; subscribing never duplicates it.
    fn subscribe(&self) -> broadcast::Receiver<Vec<Address>>;

    /// Start the accounts-changed watcher. Idempotent: the second and
    /// later calls are no-ops.
    fn start_watcher(self: Arc<Self>);

    /// Provider used to build the signer-bound contract handle.
    fn provider(&self) -> Result<DynProvider>;
}

// ─────────────────────────────────────────────────────────
// Node-backed wallet
// ─────────────────────────────────────────────────────────

pub struct NodeWallet {
    provider: DynProvider,
    notify: broadcast::Sender<Vec<Address>>,
    watcher_started: AtomicBool,
}

impl NodeWallet {
    pub fn new(wallet_rpc_url: &str) -> Result<Self> {
        let url = wallet_rpc_url.parse().map_err(|_| {
            ServiceError::Config(format!("Invalid WALLET_RPC_URL: {wallet_rpc_url}"))
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        let (notify, _) = broadcast::channel(8);
        Ok(NodeWallet {
            provider,
            notify,
            watcher_started: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl WalletProvider for NodeWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let accounts: Vec<Address> = self
            .provider
            .raw_request("eth_requestAccounts".into(), Vec::<String>::new())
            .await
            .map_err(map_wallet_error)?;
        Ok(accounts)
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.provider.get_accounts().await?)
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Address>> {
        self.notify.subscribe()
    }

    fn start_watcher(self: Arc<Self>) {
        if self.watcher_started.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(async move {
            let mut last: Option<Vec<Address>> = None;
            loop {
                match self.provider.get_accounts().await {
                    Ok(accounts) => {
                        if last.as_ref() != Some(&accounts) {
                            if last.is_some() {
                                debug!("Wallet accounts changed: {accounts:?}");
                                let _ = self.notify.send(accounts.clone());
                            }
                            last = Some(accounts);
                        }
                    }
                    Err(e) => warn!("Account poll failed: {e}"),
                }
                tokio::time::sleep(ACCOUNT_POLL_INTERVAL).await;
            }
        });
    }

    fn provider(&self) -> Result<DynProvider> {
        Ok(self.provider.clone())
    }
}

/// Map a wallet RPC failure onto the session error taxonomy.
fn map_wallet_error(e: TransportError) -> ServiceError {
    if let Some(payload) = e.as_error_resp() {
        if payload.code == USER_REJECTED_CODE {
            return ServiceError::UserRejected;
        }
    }
    ServiceError::Transport(e)
}

// ─────────────────────────────────────────────────────────
// Missing wallet
// ─────────────────────────────────────────────────────────

/// Stand-in used when no wallet endpoint is configured. Every operation
/// that needs the wallet fails with `WalletUnavailable`; reads through the
/// fallback provider are unaffected.
#[derive(Default)]
pub struct UnavailableWallet {
    notify: std::sync::OnceLock<broadcast::Sender<Vec<Address>>>,
}

impl UnavailableWallet {
    fn sender(&self) -> &broadcast::Sender<Vec<Address>> {
        self.notify.get_or_init(|| broadcast::channel(1).0)
    }
}

#[async_trait]
impl WalletProvider for UnavailableWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Err(ServiceError::WalletUnavailable)
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Err(ServiceError::WalletUnavailable)
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Address>> {
        self.sender().subscribe()
    }

    fn start_watcher(self: Arc<Self>) {}

    fn provider(&self) -> Result<DynProvider> {
        Err(ServiceError::WalletUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::RpcError;

    #[test]
    fn rejection_code_maps_to_user_rejected() {
        let payload = ErrorPayload {
            code: USER_REJECTED_CODE,
            message: "User rejected the request".into(),
            data: None,
        };
        let err = map_wallet_error(RpcError::ErrorResp(payload));
        assert!(matches!(err, ServiceError::UserRejected));
    }

    #[test]
    fn other_rpc_errors_stay_transport_errors() {
        let payload = ErrorPayload {
            code: -32000,
            message: "nonce too low".into(),
            data: None,
        };
        let err = map_wallet_error(RpcError::ErrorResp(payload));
        assert!(matches!(err, ServiceError::Transport(_)));
    }

    #[tokio::test]
    async fn unavailable_wallet_refuses_account_requests() {
        let wallet = UnavailableWallet::default();
        assert!(matches!(
            wallet.request_accounts().await,
            Err(ServiceError::WalletUnavailable)
        ));
        assert!(matches!(
            wallet.provider(),
            Err(ServiceError::WalletUnavailable)
        ));
    }
}
