//! Report verification facade.
//!
//! Thin service over the shared [`ContractGateway`]; it owns no second
//! chain client and no hidden state, it is constructed and injected like
//! everything else.

use std::sync::Arc;

use alloy::primitives::B256;
use tracing::warn;

use crate::chain::{ContractGateway, ReportStatus};
use crate::dispatch::Dispatchers;
use crate::errors::Result;

pub struct ReportService {
    gateway: Arc<dyn ContractGateway>,
    dispatchers: Arc<Dispatchers>,
}

impl ReportService {
    pub fn new(gateway: Arc<dyn ContractGateway>, dispatchers: Arc<Dispatchers>) -> Self {
        ReportService {
            gateway,
            dispatchers,
        }
    }

    /// Whether the connected account is the contract owner. Answers
    /// `false` (rather than erroring) when disconnected or unreachable.
    pub async fn is_owner(&self) -> bool {
        let Some(account) = self.gateway.connected_account().await else {
            return false;
        };
        match self.gateway.owner().await {
            Ok(owner) => owner == account,
            Err(e) => {
                warn!("Owner check failed: {e}");
                false
            }
        }
    }

    pub async fn get_report_status(&self, id: u64) -> Result<ReportStatus> {
        self.gateway.report(id).await
    }

    /// All reports the contract currently exposes.
    pub async fn list_reports(&self) -> Result<Vec<ReportStatus>> {
        self.gateway.visible_reports().await
    }

    /// Verify a report and pay out its reward; all validation and the
    /// in-flight guard live in the dispatcher.
    pub async fn verify_and_reward_report(&self, id: u64, reward: &str) -> Result<B256> {
        self.dispatchers.verify_report(id, reward).await
    }
}
