//! Event synchronizer — keeps the pending-company set consistent with the
//! chain by replaying history once, then applying polled deltas.
//!
//! Backfill and live updates share one code path keyed on the last-seen
//! block, so no event is processed twice and there is nothing to
//! double-subscribe. A failed query leaves the previous set untouched;
//! the next successful poll self-heals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::ContractGateway;
use crate::errors::{Result, ServiceError};
use crate::events::{PendingCompany, PendingSet, RegistrationEvent};
use crate::store::Store;

struct SyncState {
    set: PendingSet,
    next_block: u64,
    backfilled: bool,
}

pub struct Synchronizer {
    gateway: Arc<dyn ContractGateway>,
    cache: Option<Store>,
    state: Mutex<SyncState>,
    last_refresh: Mutex<Option<Instant>>,
    refresh_min: Duration,
    start_block: u64,
    started: AtomicBool,
}

impl Synchronizer {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        cache: Option<Store>,
        start_block: u64,
        refresh_min: Duration,
    ) -> Self {
        Synchronizer {
            gateway,
            cache,
            state: Mutex::new(SyncState {
                set: PendingSet::default(),
                next_block: start_block,
                backfilled: false,
            }),
            last_refresh: Mutex::new(None),
            refresh_min,
            start_block,
            started: AtomicBool::new(false),
        }
    }

    /// Seed the in-memory set from the persisted cache so the first render
    /// has data while the backfill runs. The backfill overwrites this.
    pub async fn preload(&self) {
        let Some(store) = &self.cache else { return };
        let mut st = self.state.lock().await;
        if st.backfilled {
            return;
        }
        match store.load_pending().await {
            Ok(cached) if !cached.is_empty() => {
                info!("Preloaded {} pending companies from cache", cached.len());
                st.set = PendingSet::from_cache(cached);
            }
            Ok(_) => {}
            Err(e) => warn!("Cache preload failed: {e}"),
        }
    }

    /// Start the polling loop. Idempotent: later calls are no-ops, so a
    /// reconnect can never create a second subscription.
    pub fn spawn(self: Arc<Self>, poll_interval: Duration) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(async move {
            info!("Event synchronizer starting from block {}", self.start_block);
            loop {
                if let Err(e) = self.sync_once().await {
                    warn!("Sync pass failed: {e}");
                }
                tokio::time::sleep(poll_interval).await;
            }
        });
    }

    /// One sync pass: full replay if history has not been loaded yet,
    /// otherwise a delta query from the last-seen block.
    pub async fn sync_once(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        let from = if st.backfilled {
            st.next_block
        } else {
            self.start_block
        };

        let slice = self
            .gateway
            .registry_events(from)
            .await
            .map_err(|e| ServiceError::EventSync(e.to_string()))?;

        if st.backfilled {
            let mut ordered: Vec<&RegistrationEvent> = slice.registrations.iter().collect();
            ordered.sort_by_key(|r| r.block);
            for r in ordered {
                st.set.apply_registration(r);
            }
            for v in &slice.verifications {
                st.set.apply_verification(v.wallet);
            }
            if !slice.registrations.is_empty() || !slice.verifications.is_empty() {
                debug!(
                    "Applied {} registrations, {} verifications",
                    slice.registrations.len(),
                    slice.verifications.len()
                );
            }
        } else {
            st.set = PendingSet::replay(&slice.registrations, &slice.verifications);
            st.backfilled = true;
            info!(
                "Backfill complete: {} events → {} pending companies",
                slice.registrations.len() + slice.verifications.len(),
                st.set.len()
            );
        }

        st.next_block = st.next_block.max(slice.tip.saturating_add(1));
        self.persist(&st.set).await;
        Ok(())
    }

    /// UI-triggered refresh. Non-forced calls inside the throttle window
    /// are skipped (returns `Ok(false)`); `force` always syncs.
    pub async fn refresh(&self, force: bool) -> Result<bool> {
        if !force {
            let last = self.last_refresh.lock().await;
            if let Some(at) = *last {
                if at.elapsed() < self.refresh_min {
                    debug!("Refresh skipped (throttled)");
                    return Ok(false);
                }
            }
        }
        self.sync_once().await?;
        // Arm the throttle only after a successful sync; a failed refresh
        // must stay retryable.
        *self.last_refresh.lock().await = Some(Instant::now());
        Ok(true)
    }

    /// Optimistic hint after a successful registration transaction. Keyed
    /// by wallet, so the later event echo replaces rather than duplicates.
    pub async fn note_registration(&self, ev: &RegistrationEvent) {
        let mut st = self.state.lock().await;
        st.set.apply_registration(ev);
        self.persist(&st.set).await;
    }

    /// Optimistic removal after a successful verification transaction.
    /// Idempotent with respect to the event echo.
    pub async fn mark_verified(&self, wallet: Address) {
        let mut st = self.state.lock().await;
        st.set.apply_verification(wallet);
        self.persist(&st.set).await;
    }

    pub async fn pending(&self) -> Vec<PendingCompany> {
        self.state.lock().await.set.snapshot()
    }

    async fn persist(&self, set: &PendingSet) {
        if let Some(store) = &self.cache {
            if let Err(e) = store.replace_pending(&set.snapshot()).await {
                warn!("Failed to persist pending-company cache: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
