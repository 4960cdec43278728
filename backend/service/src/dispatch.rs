//! Write-operation dispatchers.
//!
//! Every dispatcher validates its preconditions before touching the
//! network, submits exactly one contract call, waits for confirmation
//! (inside the gateway), then applies its optimistic local update. A
//! per-operation in-flight flag rejects concurrent re-entry so a
//! double-click can never produce two transactions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{B256, U256};
use chrono::Utc;
use tracing::info;

use crate::chain::ContractGateway;
use crate::errors::{Result, ServiceError};
use crate::events::{parse_wallet, CompanyProfile, RegistrationEvent};
use crate::evidence::EvidenceClient;
use crate::session::Session;
use crate::sync::Synchronizer;

/// Single-owner busy flag with a scoped release.
struct InFlight(AtomicBool);

struct InFlightGuard<'a>(&'a AtomicBool);

impl InFlight {
    const fn new() -> Self {
        InFlight(AtomicBool::new(false))
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>> {
        if self.0.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyInProgress);
        }
        Ok(InFlightGuard(&self.0))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Evidence attached to a report: either an already-stored locator or raw
/// bytes to upload to the content-addressed store first.
pub enum EvidenceSource {
    Uri(String),
    Inline { filename: String, bytes: Vec<u8> },
}

pub struct Dispatchers {
    gateway: Arc<dyn ContractGateway>,
    session: Arc<Session>,
    sync: Arc<Synchronizer>,
    evidence: Option<EvidenceClient>,
    register: InFlight,
    verify_company: InFlight,
    transfer: InFlight,
    mint: InFlight,
    submit_report: InFlight,
    verify_report: InFlight,
}

impl Dispatchers {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        session: Arc<Session>,
        sync: Arc<Synchronizer>,
        evidence: Option<EvidenceClient>,
    ) -> Self {
        Dispatchers {
            gateway,
            session,
            sync,
            evidence,
            register: InFlight::new(),
            verify_company: InFlight::new(),
            transfer: InFlight::new(),
            mint: InFlight::new(),
            submit_report: InFlight::new(),
            verify_report: InFlight::new(),
        }
    }

    /// Submit a company registration for the connected wallet.
    pub async fn register_company(&self, profile: CompanyProfile) -> Result<B256> {
        let account = self.session.require_connected().await?;
        let _busy = self.register.acquire()?;

        let hash = self.gateway.register_company(&profile).await?;
        info!("Company registration confirmed: {hash}");

        self.sync
            .note_registration(&RegistrationEvent {
                wallet: account,
                profile,
                verified: false,
                block: 0,
                timestamp: Utc::now().timestamp(),
            })
            .await;
        Ok(hash)
    }

    /// Verify a registered company (admin only).
    pub async fn verify_company(&self, wallet: &str) -> Result<B256> {
        let wallet = parse_wallet(wallet)?;
        self.session.require_admin().await?;
        let _busy = self.verify_company.acquire()?;

        let hash = self.gateway.verify_company(wallet).await?;
        info!("Company {wallet} verified: {hash}");

        self.sync.mark_verified(wallet).await;
        Ok(hash)
    }

    /// Transfer tokens from the admin account. The sender balance is read
    /// first; an amount above it never reaches the chain.
    pub async fn transfer_tokens(&self, to: &str, amount: &str) -> Result<B256> {
        let to = parse_wallet(to)?;
        let amount = parse_amount(amount)?;
        let account = self.session.require_admin().await?;
        let _busy = self.transfer.acquire()?;

        let balance = self.gateway.balance_of(account).await?;
        if amount > balance {
            return Err(ServiceError::InsufficientBalance);
        }

        let hash = self.gateway.transfer(to, amount).await?;
        info!("Transfer of {amount} to {to} confirmed: {hash}");
        Ok(hash)
    }

    /// Mint tokens to a company (admin only).
    pub async fn mint_tokens(&self, to: &str, amount: &str, name: &str) -> Result<B256> {
        let to = parse_wallet(to)?;
        let amount = parse_amount(amount)?;
        self.session.require_admin().await?;
        let _busy = self.mint.acquire()?;

        let hash = self.gateway.mint(to, amount, name).await?;
        info!("Mint of {amount} to {to} confirmed: {hash}");
        Ok(hash)
    }

    /// Submit a sustainability report, uploading inline evidence to the
    /// content-addressed store first.
    pub async fn submit_report(
        &self,
        description: &str,
        location: &str,
        evidence: EvidenceSource,
    ) -> Result<B256> {
        self.session.require_connected().await?;
        let _busy = self.submit_report.acquire()?;

        let evidence_uri = match evidence {
            EvidenceSource::Uri(uri) => uri,
            EvidenceSource::Inline { filename, bytes } => {
                let client = self.evidence.as_ref().ok_or_else(|| {
                    ServiceError::Evidence("no evidence store configured".to_string())
                })?;
                client.upload(&filename, bytes).await?
            }
        };

        let hash = self
            .gateway
            .submit_report(description, location, &evidence_uri)
            .await?;
        info!("Report submitted ({evidence_uri}): {hash}");
        Ok(hash)
    }

    /// Verify a report and pay its reward (admin only). The reward must be
    /// positive and covered by the contract's native balance.
    pub async fn verify_report(&self, id: u64, reward: &str) -> Result<B256> {
        let reward = parse_amount(reward)?;
        self.session.require_admin().await?;
        let _busy = self.verify_report.acquire()?;

        let funds = self.gateway.contract_native_balance().await?;
        if reward > funds {
            return Err(ServiceError::InsufficientContractFunds);
        }

        let hash = self.gateway.verify_report(id, reward).await?;
        info!("Report {id} verified with reward {reward}: {hash}");
        Ok(hash)
    }
}

/// Parse a user-supplied token amount (whole-token units). Rejects
/// anything non-numeric, negative, or zero.
fn parse_amount(s: &str) -> Result<U256> {
    let amount =
        parse_ether(s.trim()).map_err(|e| ServiceError::InvalidAmount(format!("{s:?}: {e}")))?;
    if amount.is_zero() {
        return Err(ServiceError::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(amount)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
