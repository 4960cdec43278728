//! Decoded registry events and the pending-company replay logic.
//!
//! These mirror the `UserRegistered` / `CompanyVerified` events declared in
//! `contract.rs`. The replay rule: a wallet is pending iff it has a
//! registration event and no verification event; one entry per wallet, the
//! latest registration wins.

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::contract::GreenToken;
use crate::errors::{Result, ServiceError};

/// Company profile fields as carried by the registration event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub company_type: String,
    pub registration_number: String,
    pub country: String,
    pub city: String,
    pub address: String,
    pub email: String,
    pub phone: String,
}

/// A decoded `UserRegistered` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEvent {
    pub wallet: Address,
    pub profile: CompanyProfile,
    pub verified: bool,
    pub block: u64,
    pub timestamp: i64,
}

/// A decoded `CompanyVerified` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEvent {
    pub wallet: Address,
    pub block: u64,
}

/// A company awaiting verification, as published to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCompany {
    pub wallet: Address,
    #[serde(flatten)]
    pub profile: CompanyProfile,
    pub registered_at: i64,
    pub registered_date: String,
}

impl From<&RegistrationEvent> for PendingCompany {
    fn from(ev: &RegistrationEvent) -> Self {
        PendingCompany {
            wallet: ev.wallet,
            profile: ev.profile.clone(),
            registered_at: ev.timestamp,
            registered_date: iso_date(ev.timestamp),
        }
    }
}

/// Format a Unix timestamp as RFC 3339; out-of-range values format empty.
pub fn iso_date(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Parse a wallet address string from the UI layer. Hex case is irrelevant;
/// two casings of the same address compare equal after parsing.
pub fn parse_wallet(s: &str) -> Result<Address> {
    s.trim()
        .parse::<Address>()
        .map_err(|e| ServiceError::InvalidAddress(format!("{s:?}: {e}")))
}

// ─────────────────────────────────────────────────────────
// Log decoding
// ─────────────────────────────────────────────────────────

/// Decode a `UserRegistered` log. `eth_getLogs` responses rarely carry the
/// non-standard `blockTimestamp` field, so the caller supplies header
/// timestamps for the affected blocks; an inline timestamp wins when present.
pub fn decode_registration(
    ev: &GreenToken::UserRegistered,
    log: &Log,
    block_timestamps: &HashMap<u64, i64>,
) -> RegistrationEvent {
    let block = log.block_number.unwrap_or(0);
    let timestamp = log
        .block_timestamp
        .map(|t| t as i64)
        .or_else(|| block_timestamps.get(&block).copied())
        .unwrap_or(0);
    RegistrationEvent {
        wallet: ev.wallet,
        profile: CompanyProfile {
            name: ev.name.clone(),
            company_type: ev.companyType.clone(),
            registration_number: ev.registrationNumber.clone(),
            country: ev.country.clone(),
            city: ev.city.clone(),
            address: ev.physicalAddress.clone(),
            email: ev.email.clone(),
            phone: ev.phone.clone(),
        },
        verified: ev.verified,
        block,
        timestamp,
    }
}

pub fn decode_verification(ev: &GreenToken::CompanyVerified, log: &Log) -> VerificationEvent {
    VerificationEvent {
        wallet: ev.wallet,
        block: log.block_number.unwrap_or(0),
    }
}

// ─────────────────────────────────────────────────────────
// Pending set
// ─────────────────────────────────────────────────────────

/// The derived set of companies awaiting verification.
///
/// Invariants: at most one entry per wallet; a wallet with an observed
/// verification event is never present and can never re-enter.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    entries: HashMap<Address, PendingCompany>,
    verified: HashSet<Address>,
}

impl PendingSet {
    /// Rebuild the set from full event history. Registrations are applied
    /// in block order so the latest record for a wallet wins.
    pub fn replay(
        registrations: &[RegistrationEvent],
        verifications: &[VerificationEvent],
    ) -> Self {
        let mut set = PendingSet::default();
        for v in verifications {
            set.verified.insert(v.wallet);
        }
        let mut ordered: Vec<&RegistrationEvent> = registrations.iter().collect();
        ordered.sort_by_key(|r| r.block);
        for r in ordered {
            set.apply_registration(r);
        }
        set
    }

    /// Apply a live registration delta. No-op for already-verified wallets;
    /// replaces any earlier registration for the same wallet.
    pub fn apply_registration(&mut self, ev: &RegistrationEvent) {
        if ev.verified || self.verified.contains(&ev.wallet) {
            return;
        }
        self.entries.insert(ev.wallet, PendingCompany::from(ev));
    }

    /// Apply a verification delta. Removal is idempotent: verifying a wallet
    /// that is not pending leaves the set unchanged.
    pub fn apply_verification(&mut self, wallet: Address) {
        self.verified.insert(wallet);
        self.entries.remove(&wallet);
    }

    pub fn contains(&self, wallet: Address) -> bool {
        self.entries.contains_key(&wallet)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot for publication, newest registration first.
    pub fn snapshot(&self) -> Vec<PendingCompany> {
        let mut out: Vec<PendingCompany> = self.entries.values().cloned().collect();
        out.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        out
    }

    /// Seed the set from a persisted cache (display-only preload; the next
    /// backfill overwrites it).
    pub fn from_cache(cached: Vec<PendingCompany>) -> Self {
        let mut set = PendingSet::default();
        for c in cached {
            set.entries.insert(c.wallet, c);
        }
        set
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
