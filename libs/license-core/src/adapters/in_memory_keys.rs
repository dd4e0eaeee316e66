use crate::{CoreError, KeyRepository, LicenseKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// License keys held in a `DashMap`. Every mutation happens under the shard
/// lock of its entry, so concurrent callers never interleave on one key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyRepository {
    keys: Arc<DashMap<String, LicenseKey>>,
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn insert(&self, key: &LicenseKey) -> Result<(), CoreError> {
        match self.keys.entry(key.key.clone()) {
            Entry::Occupied(_) => Err(CoreError::DuplicateKey(key.key.clone())),
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<LicenseKey>, CoreError> {
        Ok(self.keys.get(key).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<LicenseKey>, CoreError> {
        let mut keys: Vec<LicenseKey> = self.keys.iter().map(|e| e.value().clone()).collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(keys)
    }

    async fn mark_used(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LicenseKey>, CoreError> {
        Ok(self.keys.get_mut(key).map(|mut entry| {
            if entry.active {
                entry.last_used_at = Some(now);
            }
            entry.value().clone()
        }))
    }

    async fn toggle_active(&self, key: &str) -> Result<Option<bool>, CoreError> {
        Ok(self.keys.get_mut(key).map(|mut entry| {
            entry.active = !entry.active;
            entry.active
        }))
    }

    async fn record_heartbeat(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        match self.keys.get_mut(key) {
            Some(mut entry) => {
                entry.last_heartbeat_at = Some(now);
                entry.last_address = Some(address.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.keys.remove(key).is_some())
    }
}
