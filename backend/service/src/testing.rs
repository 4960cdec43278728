//! Test doubles for the gateway and wallet seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};

use crate::chain::{ContractGateway, RegistrySlice, ReportStatus, TransferRecord};
use crate::errors::{Result, ServiceError};
use crate::events::CompanyProfile;
use crate::wallet::WalletProvider;

// ─────────────────────────────────────────────────────────
// MockWallet
// ─────────────────────────────────────────────────────────

pub struct MockWallet {
    available: bool,
    accounts: Mutex<Vec<Address>>,
    notify: broadcast::Sender<Vec<Address>>,
}

impl MockWallet {
    pub fn unavailable() -> Self {
        MockWallet {
            available: false,
            accounts: Mutex::new(Vec::new()),
            notify: broadcast::channel(8).0,
        }
    }

    pub fn with_accounts(accounts: Vec<Address>) -> Self {
        MockWallet {
            available: true,
            accounts: Mutex::new(accounts),
            notify: broadcast::channel(8).0,
        }
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.lock().unwrap() = accounts.clone();
        let _ = self.notify.send(accounts);
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        if !self.available {
            return Err(ServiceError::WalletUnavailable);
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.request_accounts().await
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Address>> {
        self.notify.subscribe()
    }

    fn start_watcher(self: Arc<Self>) {}

    fn provider(&self) -> Result<alloy::providers::DynProvider> {
        Err(ServiceError::WalletUnavailable)
    }
}

// ─────────────────────────────────────────────────────────
// MockGateway
// ─────────────────────────────────────────────────────────

/// Scripted gateway: `registry_events` pops pre-loaded slices, write
/// operations record their name and can be made to block so re-entry
/// guards are observable.
pub struct MockGateway {
    owner: Address,
    wallet: Mutex<Option<Arc<MockWallet>>>,
    connected: Mutex<Option<Address>>,
    balances: Mutex<HashMap<Address, U256>>,
    native_balance: Mutex<U256>,
    total_supply: Mutex<U256>,
    company: Mutex<Option<(CompanyProfile, bool)>>,
    reports: Mutex<Vec<ReportStatus>>,
    slices: Mutex<VecDeque<std::result::Result<RegistrySlice, String>>>,
    registry_calls: AtomicUsize,
    owner_checks: AtomicUsize,
    submitted: Mutex<Vec<String>>,
    blocking: AtomicBool,
    release: Semaphore,
}

impl MockGateway {
    pub fn new(owner: Address) -> Self {
        MockGateway {
            owner,
            wallet: Mutex::new(None),
            connected: Mutex::new(None),
            balances: Mutex::new(HashMap::new()),
            native_balance: Mutex::new(U256::ZERO),
            total_supply: Mutex::new(U256::ZERO),
            company: Mutex::new(None),
            reports: Mutex::new(Vec::new()),
            slices: Mutex::new(VecDeque::new()),
            registry_calls: AtomicUsize::new(0),
            owner_checks: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            blocking: AtomicBool::new(false),
            release: Semaphore::new(0),
        }
    }

    pub fn set_wallet(&self, wallet: Arc<MockWallet>) {
        *self.wallet.lock().unwrap() = Some(wallet);
    }

    pub fn set_balance(&self, who: Address, amount: U256) {
        self.balances.lock().unwrap().insert(who, amount);
    }

    pub fn set_native_balance(&self, amount: U256) {
        *self.native_balance.lock().unwrap() = amount;
    }

    pub fn set_total_supply(&self, amount: U256) {
        *self.total_supply.lock().unwrap() = amount;
    }

    pub fn set_company(&self, profile: CompanyProfile, verified: bool) {
        *self.company.lock().unwrap() = Some((profile, verified));
    }

    pub fn push_report(&self, report: ReportStatus) {
        self.reports.lock().unwrap().push(report);
    }

    pub fn push_slice(&self, slice: RegistrySlice) {
        self.slices.lock().unwrap().push_back(Ok(slice));
    }

    pub fn push_failure(&self, msg: &str) {
        self.slices.lock().unwrap().push_back(Err(msg.to_string()));
    }

    pub fn registry_calls(&self) -> usize {
        self.registry_calls.load(Ordering::SeqCst)
    }

    pub fn owner_checks(&self) -> usize {
        self.owner_checks.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    /// Make the next write operations park until [`Self::release_writes`].
    pub fn block_writes(&self) {
        self.blocking.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self, n: usize) {
        self.blocking.store(false, Ordering::SeqCst);
        self.release.add_permits(n);
    }

    async fn submit(&self, op: String) -> Result<B256> {
        self.submitted.lock().unwrap().push(op);
        if self.blocking.load(Ordering::SeqCst) {
            let permit = self
                .release
                .acquire()
                .await
                .map_err(|_| ServiceError::EventSync("mock closed".to_string()))?;
            permit.forget();
        }
        Ok(B256::repeat_byte(0xab))
    }

    fn mock_wallet(&self) -> Result<Arc<MockWallet>> {
        self.wallet
            .lock()
            .unwrap()
            .clone()
            .ok_or(ServiceError::WalletUnavailable)
    }
}

#[async_trait]
impl ContractGateway for MockGateway {
    async fn connect(&self) -> Result<Address> {
        let wallet = self.mock_wallet()?;
        let accounts = wallet.request_accounts().await?;
        let account = *accounts.first().ok_or(ServiceError::UserRejected)?;
        *self.connected.lock().unwrap() = Some(account);
        Ok(account)
    }

    async fn rebind(&self, account: Address) -> Result<()> {
        let wallet = self.mock_wallet()?;
        if !wallet.accounts().await?.contains(&account) {
            return Err(ServiceError::NotConnected);
        }
        *self.connected.lock().unwrap() = Some(account);
        Ok(())
    }

    async fn disconnect(&self) {
        *self.connected.lock().unwrap() = None;
    }

    async fn connected_account(&self) -> Option<Address> {
        *self.connected.lock().unwrap()
    }

    async fn owner(&self) -> Result<Address> {
        self.owner_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.owner)
    }

    async fn balance_of(&self, who: Address) -> Result<U256> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&who)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn total_supply(&self) -> Result<U256> {
        Ok(*self.total_supply.lock().unwrap())
    }

    async fn registered_company(&self, _wallet: Address) -> Result<(CompanyProfile, bool)> {
        self.company
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ServiceError::EventSync("not scripted".to_string()))
    }

    async fn contract_native_balance(&self) -> Result<U256> {
        Ok(*self.native_balance.lock().unwrap())
    }

    async fn report(&self, id: u64) -> Result<ReportStatus> {
        if let Some(report) = self
            .reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
        {
            return Ok(report);
        }
        Ok(ReportStatus {
            id,
            description: "scripted".to_string(),
            location: "nowhere".to_string(),
            reporter: self.owner,
            timestamp: 0,
            evidence_uri: String::new(),
            verified: false,
            reward: "0".to_string(),
        })
    }

    async fn visible_reports(&self) -> Result<Vec<ReportStatus>> {
        Ok(self.reports.lock().unwrap().clone())
    }

    async fn registry_events(&self, _from_block: u64) -> Result<RegistrySlice> {
        self.registry_calls.fetch_add(1, Ordering::SeqCst);
        match self.slices.lock().unwrap().pop_front() {
            Some(Ok(slice)) => Ok(slice),
            Some(Err(msg)) => Err(ServiceError::EventSync(msg)),
            None => Ok(RegistrySlice::default()),
        }
    }

    async fn transfer_history(&self, _from_block: u64) -> Result<Vec<TransferRecord>> {
        Ok(Vec::new())
    }

    async fn register_company(&self, profile: &CompanyProfile) -> Result<B256> {
        self.submit(format!("register:{}", profile.name)).await
    }

    async fn verify_company(&self, wallet: Address) -> Result<B256> {
        self.submit(format!("verify_company:{wallet}")).await
    }

    async fn transfer(&self, to: Address, amount: U256) -> Result<B256> {
        self.submit(format!("transfer:{to}:{amount}")).await
    }

    async fn mint(&self, to: Address, amount: U256, name: &str) -> Result<B256> {
        self.submit(format!("mint:{to}:{amount}:{name}")).await
    }

    async fn submit_report(
        &self,
        description: &str,
        _location: &str,
        evidence_uri: &str,
    ) -> Result<B256> {
        self.submit(format!("submit_report:{description}:{evidence_uri}"))
            .await
    }

    async fn verify_report(&self, id: u64, reward: U256) -> Result<B256> {
        self.submit(format!("verify_report:{id}:{reward}")).await
    }
}
