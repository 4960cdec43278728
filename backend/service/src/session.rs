//! Wallet session state.
//!
//! Owns the `{account, is_admin, connected}` triple. The admin flag is
//! derived by comparing the contract owner to the session account and is
//! recomputed on every (re)connect, so an account switch can never act on
//! a stale flag. The previous session is restored from the local cache on
//! startup, best effort: a failed silent reconnect just leaves the session
//! disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chain::ContractGateway;
use crate::errors::{Result, ServiceError};
use crate::store::Store;
use crate::wallet::WalletProvider;

/// Published session state, read-only for the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionView {
    pub account: Option<Address>,
    pub is_admin: bool,
    pub connected: bool,
}

pub struct Session {
    gateway: Arc<dyn ContractGateway>,
    wallet: Arc<dyn WalletProvider>,
    cache: Option<Store>,
    state: RwLock<SessionView>,
    watcher_started: AtomicBool,
}

impl Session {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        wallet: Arc<dyn WalletProvider>,
        cache: Option<Store>,
    ) -> Arc<Self> {
        Arc::new(Session {
            gateway,
            wallet,
            cache,
            state: RwLock::new(SessionView::default()),
            watcher_started: AtomicBool::new(false),
        })
    }

    /// Restore a previously persisted session. Never surfaces an error:
    /// any failure falls back to the disconnected state.
    pub async fn restore(&self) {
        let cached = match &self.cache {
            Some(store) => store.load_session().await.ok().flatten(),
            None => None,
        };
        let Some((account, _)) = cached else {
            return;
        };
        match self.reconnect_as(account).await {
            Ok(()) => info!("Restored session for {account}"),
            Err(e) => debug!("Silent reconnect for {account} failed: {e}"),
        }
    }

    /// Connect the wallet: request access, bind the signer handle, and
    /// derive the admin flag from the contract owner.
    pub async fn connect(&self) -> Result<Address> {
        let account = self.gateway.connect().await?;
        self.finish_connect(account).await?;
        Ok(account)
    }

    pub async fn disconnect(&self) {
        self.gateway.disconnect().await;
        *self.state.write().await = SessionView::default();
        if let Some(store) = &self.cache {
            if let Err(e) = store.clear_session().await {
                warn!("Failed to clear cached session: {e}");
            }
        }
    }

    async fn reconnect_as(&self, account: Address) -> Result<()> {
        self.gateway.rebind(account).await?;
        self.finish_connect(account).await
    }

    async fn finish_connect(&self, account: Address) -> Result<()> {
        let owner = self.gateway.owner().await?;
        let is_admin = owner == account;
        *self.state.write().await = SessionView {
            account: Some(account),
            is_admin,
            connected: true,
        };
        if let Some(store) = &self.cache {
            if let Err(e) = store.save_session(account, is_admin).await {
                warn!("Failed to persist session: {e}");
            }
        }
        Ok(())
    }

    /// Start the accounts-changed listener. Exactly one listener exists
    /// per session regardless of how many times this is called.
    pub fn start_account_watcher(self: &Arc<Self>) {
        if self.watcher_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.wallet.clone().start_watcher();
        let mut rx = self.wallet.subscribe();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(accounts) => session.on_accounts_changed(accounts).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Accounts-changed stream lagged by {n} updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// React to a wallet account change: zero accounts disconnects, a new
    /// account re-runs the full connect flow including the owner re-check.
    pub async fn on_accounts_changed(&self, accounts: Vec<Address>) {
        match accounts.first() {
            None => {
                info!("Wallet reported no accounts; disconnecting");
                self.disconnect().await;
            }
            Some(&account) => {
                if self.state.read().await.account == Some(account) {
                    return;
                }
                if let Err(e) = self.reconnect_as(account).await {
                    warn!("Reconnect for {account} failed: {e}; disconnecting");
                    self.disconnect().await;
                }
            }
        }
    }

    pub async fn view(&self) -> SessionView {
        self.state.read().await.clone()
    }

    /// Fail with `NotConnected` unless a wallet session is active.
    pub async fn require_connected(&self) -> Result<Address> {
        self.state
            .read()
            .await
            .account
            .ok_or(ServiceError::NotConnected)
    }

    /// Fail unless the session account is the contract owner.
    pub async fn require_admin(&self) -> Result<Address> {
        let state = self.state.read().await;
        let account = state.account.ok_or(ServiceError::NotConnected)?;
        if !state.is_admin {
            return Err(ServiceError::NotAuthorized);
        }
        Ok(account)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
