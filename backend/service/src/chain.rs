//! Unified chain client.
//!
//! One owned client for the whole service: a read-only contract handle
//! bound to the fallback RPC (alive regardless of wallet state, so
//! unauthenticated views can still query), plus an optional signer-bound
//! handle established by `connect` and torn down by `disconnect`.
//!
//! Everything downstream (session, synchronizer, dispatchers, report
//! service) talks to the [`ContractGateway`] trait, never to providers
//! directly; every write waits for on-chain inclusion before returning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::primitives::utils::format_ether;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::contract::GreenToken::{self, GreenTokenInstance};
use crate::errors::{Result, ServiceError};
use crate::events::{self, CompanyProfile, RegistrationEvent, VerificationEvent};
use crate::wallet::WalletProvider;

/// One page of registry history: both event streams from `from_block` to
/// the chain tip observed at query time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySlice {
    pub registrations: Vec<RegistrationEvent>,
    pub verifications: Vec<VerificationEvent>,
    /// Chain tip the slice was read against; the next query starts after it.
    pub tip: u64,
}

/// Decoded report state, as read back from the contract.
#[derive(Debug, Clone, Serialize)]
pub struct ReportStatus {
    pub id: u64,
    pub description: String,
    pub location: String,
    pub reporter: Address,
    pub timestamp: i64,
    pub evidence_uri: String,
    pub verified: bool,
    /// Reward in whole-token units, formatted from the raw amount.
    pub reward: String,
}

/// A token transfer reconstructed from `Transfer` events (view-layer data,
/// never persisted).
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub amount: String,
    pub block: u64,
    pub tx_hash: Option<B256>,
}

#[async_trait]
pub trait ContractGateway: Send + Sync {
    // Session lifecycle
    async fn connect(&self) -> Result<Address>;
    async fn rebind(&self, account: Address) -> Result<()>;
    async fn disconnect(&self);
    async fn connected_account(&self) -> Option<Address>;

    // Reads (served by the fallback handle, no wallet required)
    async fn owner(&self) -> Result<Address>;
    async fn balance_of(&self, who: Address) -> Result<U256>;
    async fn total_supply(&self) -> Result<U256>;
    async fn registered_company(&self, wallet: Address) -> Result<(CompanyProfile, bool)>;
    async fn contract_native_balance(&self) -> Result<U256>;
    async fn report(&self, id: u64) -> Result<ReportStatus>;
    async fn visible_reports(&self) -> Result<Vec<ReportStatus>>;
    async fn registry_events(&self, from_block: u64) -> Result<RegistrySlice>;
    async fn transfer_history(&self, from_block: u64) -> Result<Vec<TransferRecord>>;

    // Writes (signer-bound handle; confirmation awaited before returning)
    async fn register_company(&self, profile: &CompanyProfile) -> Result<B256>;
    async fn verify_company(&self, wallet: Address) -> Result<B256>;
    async fn transfer(&self, to: Address, amount: U256) -> Result<B256>;
    async fn mint(&self, to: Address, amount: U256, name: &str) -> Result<B256>;
    async fn submit_report(
        &self,
        description: &str,
        location: &str,
        evidence_uri: &str,
    ) -> Result<B256>;
    async fn verify_report(&self, id: u64, reward: U256) -> Result<B256>;
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct WriteHandle {
    account: Address,
    contract: GreenTokenInstance<DynProvider>,
}

pub struct ChainClient {
    contract_address: Address,
    read_provider: DynProvider,
    read: GreenTokenInstance<DynProvider>,
    wallet: Arc<dyn WalletProvider>,
    write: RwLock<Option<WriteHandle>>,
}

impl ChainClient {
    pub fn new(config: &Config, wallet: Arc<dyn WalletProvider>) -> Result<Self> {
        let url = config
            .rpc_url
            .parse()
            .map_err(|_| ServiceError::Config(format!("Invalid RPC_URL: {}", config.rpc_url)))?;
        let read_provider = ProviderBuilder::new().connect_http(url).erased();
        let read = GreenToken::new(config.contract_address, read_provider.clone());
        Ok(ChainClient {
            contract_address: config.contract_address,
            read_provider,
            read,
            wallet,
            write: RwLock::new(None),
        })
    }

    async fn bind(&self, account: Address) -> Result<()> {
        let provider = self.wallet.provider()?;
        let contract = GreenToken::new(self.contract_address, provider);
        *self.write.write().await = Some(WriteHandle { account, contract });
        debug!("Signer handle bound to {account}");
        Ok(())
    }

    async fn write_handle(&self) -> Result<WriteHandle> {
        self.write
            .read()
            .await
            .clone()
            .ok_or(ServiceError::NotConnected)
    }

    /// Resolve block timestamps from headers. `eth_getLogs` responses
    /// usually omit the non-standard `blockTimestamp` field, so registry
    /// events need the header of each affected block.
    async fn block_timestamps(&self, blocks: HashSet<u64>) -> Result<HashMap<u64, i64>> {
        let mut out = HashMap::with_capacity(blocks.len());
        for number in blocks {
            if let Some(block) = self.read_provider.get_block_by_number(number.into()).await? {
                out.insert(number, block.header.timestamp as i64);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ContractGateway for ChainClient {
    async fn connect(&self) -> Result<Address> {
        let accounts = self.wallet.request_accounts().await?;
        let account = *accounts.first().ok_or(ServiceError::UserRejected)?;
        self.bind(account).await?;
        info!("Wallet connected: {account}");
        Ok(account)
    }

    async fn rebind(&self, account: Address) -> Result<()> {
        let available = self.wallet.accounts().await?;
        if !available.contains(&account) {
            return Err(ServiceError::NotConnected);
        }
        self.bind(account).await
    }

    async fn disconnect(&self) {
        *self.write.write().await = None;
    }

    async fn connected_account(&self) -> Option<Address> {
        self.write.read().await.as_ref().map(|h| h.account)
    }

    async fn owner(&self) -> Result<Address> {
        Ok(self.read.owner().call().await?)
    }

    async fn balance_of(&self, who: Address) -> Result<U256> {
        Ok(self.read.balanceOf(who).call().await?)
    }

    async fn total_supply(&self) -> Result<U256> {
        Ok(self.read.totalSupply().call().await?)
    }

    async fn registered_company(&self, wallet: Address) -> Result<(CompanyProfile, bool)> {
        let r = self.read.getRegisteredUser(wallet).call().await?;
        let profile = CompanyProfile {
            name: r.name,
            company_type: r.companyType,
            registration_number: r.registrationNumber,
            country: r.country,
            city: r.city,
            address: r.physicalAddress,
            email: r.email,
            phone: r.phone,
        };
        Ok((profile, r.verified))
    }

    async fn contract_native_balance(&self) -> Result<U256> {
        Ok(self.read_provider.get_balance(self.contract_address).await?)
    }

    async fn report(&self, id: u64) -> Result<ReportStatus> {
        let r = self.read.reports(U256::from(id)).call().await?;
        Ok(ReportStatus {
            id,
            description: r.description,
            location: r.location,
            reporter: r.reporter,
            timestamp: r.timestamp.try_into().unwrap_or(i64::MAX),
            evidence_uri: r.evidenceUri,
            verified: r.verified,
            reward: format_ether(r.reward),
        })
    }

    async fn visible_reports(&self) -> Result<Vec<ReportStatus>> {
        let ids: Vec<U256> = self.read.getVisibleReports().call().await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.try_into().unwrap_or(u64::MAX);
            out.push(self.report(id).await?);
        }
        Ok(out)
    }

    async fn registry_events(&self, from_block: u64) -> Result<RegistrySlice> {
        let tip = self.read_provider.get_block_number().await?;
        if from_block > tip {
            return Ok(RegistrySlice {
                tip,
                ..Default::default()
            });
        }

        let registered_filter = self
            .read
            .UserRegistered_filter()
            .from_block(from_block)
            .to_block(tip);
        let verified_filter = self
            .read
            .CompanyVerified_filter()
            .from_block(from_block)
            .to_block(tip);
        let (registered, verified) =
            tokio::try_join!(registered_filter.query(), verified_filter.query())?;

        let missing: HashSet<u64> = registered
            .iter()
            .filter(|(_, log)| log.block_timestamp.is_none())
            .filter_map(|(_, log)| log.block_number)
            .collect();
        let timestamps = self.block_timestamps(missing).await?;

        Ok(RegistrySlice {
            registrations: registered
                .iter()
                .map(|(ev, log)| events::decode_registration(ev, log, &timestamps))
                .collect(),
            verifications: verified
                .iter()
                .map(|(ev, log)| events::decode_verification(ev, log))
                .collect(),
            tip,
        })
    }

    async fn transfer_history(&self, from_block: u64) -> Result<Vec<TransferRecord>> {
        let logs = self
            .read
            .Transfer_filter()
            .from_block(from_block)
            .query()
            .await?;
        Ok(logs
            .iter()
            .map(|(ev, log)| TransferRecord {
                from: ev.from,
                to: ev.to,
                amount: format_ether(ev.value),
                block: log.block_number.unwrap_or(0),
                tx_hash: log.transaction_hash,
            })
            .collect())
    }

    async fn register_company(&self, profile: &CompanyProfile) -> Result<B256> {
        let h = self.write_handle().await?;
        let pending = h
            .contract
            .registerUser(
                profile.name.clone(),
                profile.company_type.clone(),
                profile.registration_number.clone(),
                profile.country.clone(),
                profile.city.clone(),
                profile.address.clone(),
                profile.email.clone(),
                profile.phone.clone(),
            )
            .from(h.account)
            .send()
            .await?;
        Ok(pending.watch().await?)
    }

    async fn verify_company(&self, wallet: Address) -> Result<B256> {
        let h = self.write_handle().await?;
        let pending = h
            .contract
            .verifyCompany(wallet)
            .from(h.account)
            .send()
            .await?;
        Ok(pending.watch().await?)
    }

    async fn transfer(&self, to: Address, amount: U256) -> Result<B256> {
        let h = self.write_handle().await?;
        let pending = h.contract.transfer(to, amount).from(h.account).send().await?;
        Ok(pending.watch().await?)
    }

    async fn mint(&self, to: Address, amount: U256, name: &str) -> Result<B256> {
        let h = self.write_handle().await?;
        let pending = h
            .contract
            .mint(to, amount, name.to_string())
            .from(h.account)
            .send()
            .await?;
        Ok(pending.watch().await?)
    }

    async fn submit_report(
        &self,
        description: &str,
        location: &str,
        evidence_uri: &str,
    ) -> Result<B256> {
        let h = self.write_handle().await?;
        let pending = h
            .contract
            .submitReport(
                description.to_string(),
                location.to_string(),
                evidence_uri.to_string(),
            )
            .from(h.account)
            .send()
            .await?;
        Ok(pending.watch().await?)
    }

    async fn verify_report(&self, id: u64, reward: U256) -> Result<B256> {
        let h = self.write_handle().await?;
        // The reward is escrowed by the call itself.
        let pending = h
            .contract
            .verifyReport(U256::from(id), reward)
            .value(reward)
            .from(h.account)
            .send()
            .await?;
        Ok(pending.watch().await?)
    }
}
