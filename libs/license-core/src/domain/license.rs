use crate::{
    AccessAction, AccessLog, AddressSighting, Clock, CoreError, KeyRepository, PresenceTracker,
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const KEY_PREFIX: &str = "TW-";
pub const KEY_BODY_LEN: usize = 13;
pub const DEFAULT_ONLINE_WINDOW_SECS: i64 = 60;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
// A collision needs two equal 13-char base36 draws; three tries is plenty.
const CREATE_ATTEMPTS: usize = 3;

// --- License key ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKey {
    pub key: String,
    pub owner: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_address: Option<String>,
}

impl LicenseKey {
    /// A fresh, active key with a newly generated token.
    pub fn issue(owner: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: generate_token(),
            owner: owner.to_string(),
            active: true,
            created_at: now,
            last_used_at: None,
            last_heartbeat_at: None,
            last_address: None,
        }
    }

    pub fn is_online_at(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.last_heartbeat_at
            .is_some_and(|last| now - last <= window)
    }
}

/// `TW-` followed by 13 uppercase base36 characters.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let body: String = (0..KEY_BODY_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{KEY_PREFIX}{body}")
}

pub fn default_online_window() -> TimeDelta {
    TimeDelta::seconds(DEFAULT_ONLINE_WINDOW_SECS)
}

// --- Verification outcome ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidKey,
    Inactive,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidKey => "invalid_key",
            RejectReason::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid { owner: String },
    Rejected(RejectReason),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid { .. })
    }

    /// Status tag written to the access log.
    pub fn status(&self) -> &'static str {
        match self {
            Verification::Valid { .. } => "success",
            Verification::Rejected(reason) => reason.as_str(),
        }
    }
}

/// Everything known about one key, as shown to admins and to the key's operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    #[serde(flatten)]
    pub license: LicenseKey,
    pub online: bool,
    pub unique_address_count: u64,
    pub comment_count: u64,
    pub addresses: Vec<AddressSighting>,
}

// --- Component ---

/// Owns license keys and the state transitions clients and admins drive.
/// Each transition appends exactly one access event.
#[derive(Clone)]
pub struct KeyStore {
    keys: Arc<dyn KeyRepository>,
    presence: PresenceTracker,
    log: AccessLog,
    clock: Arc<dyn Clock>,
}

impl KeyStore {
    pub fn new(
        keys: Arc<dyn KeyRepository>,
        presence: PresenceTracker,
        log: AccessLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            presence,
            log,
            clock,
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn access_log(&self) -> &AccessLog {
        &self.log
    }

    pub async fn create(&self, owner: &str) -> Result<LicenseKey, CoreError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(CoreError::Validation("owner must not be empty".into()));
        }

        let mut attempt = 1;
        loop {
            let record = LicenseKey::issue(owner, self.clock.now());
            match self.keys.insert(&record).await {
                Ok(()) => {
                    info!(key = %record.key, owner, "License key created");
                    self.log
                        .append(&record.key, AccessAction::Create, "created", None)
                        .await;
                    return Ok(record);
                }
                Err(CoreError::DuplicateKey(token)) if attempt < CREATE_ATTEMPTS => {
                    warn!(%token, attempt, "Generated license key collided, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<LicenseKey, CoreError> {
        self.keys.get(key).await?.ok_or_else(|| not_found(key))
    }

    pub async fn list(&self) -> Result<Vec<LicenseKey>, CoreError> {
        self.keys.list().await
    }

    /// Unknown and inactive keys are ordinary outcomes, not errors. Every
    /// outcome is journaled.
    pub async fn verify(&self, key: &str, address: Option<&str>) -> Result<Verification, CoreError> {
        let outcome = match self.keys.mark_used(key, self.clock.now()).await? {
            None => Verification::Rejected(RejectReason::InvalidKey),
            Some(record) if !record.active => Verification::Rejected(RejectReason::Inactive),
            Some(record) => Verification::Valid {
                owner: record.owner,
            },
        };
        self.log
            .append(key, AccessAction::Verify, outcome.status(), address)
            .await;
        Ok(outcome)
    }

    pub async fn toggle_active(&self, key: &str) -> Result<bool, CoreError> {
        let active = self
            .keys
            .toggle_active(key)
            .await?
            .ok_or_else(|| not_found(key))?;
        let status = if active { "activated" } else { "deactivated" };
        info!(key, status, "License key toggled");
        self.log.append(key, AccessAction::Toggle, status, None).await;
        Ok(active)
    }

    /// Journal entries for the key stay behind as history; its sightings go.
    pub async fn delete(&self, key: &str) -> Result<(), CoreError> {
        if !self.keys.delete(key).await? {
            return Err(not_found(key));
        }
        if let Err(e) = self.presence.forget(key).await {
            warn!(key, error = %e, "Failed to discard sightings of deleted key");
        }
        info!(key, "License key deleted");
        self.log.append(key, AccessAction::Delete, "success", None).await;
        Ok(())
    }

    pub async fn record_heartbeat(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !self.keys.record_heartbeat(key, address, now).await? {
            self.log
                .append(key, AccessAction::Heartbeat, "invalid_key", Some(address))
                .await;
            return Err(not_found(key));
        }
        if let Err(e) = self.presence.record(key, address, now).await {
            self.log
                .append(key, AccessAction::Heartbeat, "error", Some(address))
                .await;
            return Err(e);
        }
        // A delete that ran between the two writes has already forgotten the
        // key's sightings; drop the one just added.
        if self.keys.get(key).await?.is_none() {
            if let Err(e) = self.presence.forget(key).await {
                warn!(key, error = %e, "Failed to discard sighting of deleted key");
            }
            self.log
                .append(key, AccessAction::Heartbeat, "invalid_key", Some(address))
                .await;
            return Err(not_found(key));
        }
        self.log
            .append(key, AccessAction::Heartbeat, "success", Some(address))
            .await;
        Ok(())
    }

    pub async fn is_online(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> Result<bool, CoreError> {
        Ok(self.get(key).await?.is_online_at(now, window))
    }

    /// Client report that it posted a comment. Only active keys may report.
    pub async fn record_comment(&self, key: &str, address: Option<&str>) -> Result<(), CoreError> {
        let record = self.get(key).await?;
        if !record.active {
            return Err(CoreError::Forbidden(format!("license key is inactive: {key}")));
        }
        self.log
            .append(key, AccessAction::CommentPosted, "success", address)
            .await;
        Ok(())
    }

    /// Removes every `comment_posted` event for the key and journals the reset.
    pub async fn reset_comments(&self, key: &str) -> Result<u64, CoreError> {
        self.get(key).await?;
        let removed = self.log.purge(key, AccessAction::CommentPosted).await?;
        info!(key, removed, "Comment count reset");
        self.log
            .append(key, AccessAction::CommentsReset, "success", None)
            .await;
        Ok(removed)
    }

    pub async fn stats(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> Result<KeyStats, CoreError> {
        let license = self.get(key).await?;
        self.stats_for(license, now, window).await
    }

    pub async fn detailed_stats(
        &self,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> Result<Vec<KeyStats>, CoreError> {
        let mut stats = Vec::new();
        for license in self.keys.list().await? {
            stats.push(self.stats_for(license, now, window).await?);
        }
        Ok(stats)
    }

    async fn stats_for(
        &self,
        license: LicenseKey,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> Result<KeyStats, CoreError> {
        let addresses = self.presence.addresses_for(&license.key).await?;
        let comment_count = self
            .log
            .count_by_action(&license.key, AccessAction::CommentPosted)
            .await?;
        Ok(KeyStats {
            online: license.is_online_at(now, window),
            unique_address_count: addresses.len() as u64,
            comment_count,
            addresses,
            license,
        })
    }
}

fn not_found(key: &str) -> CoreError {
    CoreError::NotFound(format!("license key {key}"))
}
