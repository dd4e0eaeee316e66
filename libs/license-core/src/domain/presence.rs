use crate::{CoreError, SightingRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One observed (key, address) pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSighting {
    pub key: String,
    pub address: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl AddressSighting {
    pub fn first(key: &str, address: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            address: address.to_string(),
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Repeat sighting: `last_seen_at` never moves backwards and
    /// `first_seen_at` never moves at all.
    pub fn seen_again(&mut self, now: DateTime<Utc>) {
        if now > self.last_seen_at {
            self.last_seen_at = now;
        }
    }
}

/// Records every network address a key has been seen from.
///
/// Kept apart from the key's single `last_address` so that the full history
/// survives after the bounded access log has rotated.
#[derive(Clone)]
pub struct PresenceTracker {
    sightings: Arc<dyn SightingRepository>,
}

impl PresenceTracker {
    pub fn new(sightings: Arc<dyn SightingRepository>) -> Self {
        Self { sightings }
    }

    pub async fn record(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<AddressSighting, CoreError> {
        self.sightings.upsert(key, address, now).await
    }

    pub async fn unique_address_count(&self, key: &str) -> Result<u64, CoreError> {
        self.sightings.count(key).await
    }

    pub async fn addresses_for(&self, key: &str) -> Result<Vec<AddressSighting>, CoreError> {
        self.sightings.list(key).await
    }

    pub async fn forget(&self, key: &str) -> Result<u64, CoreError> {
        self.sightings.remove_all(key).await
    }
}
