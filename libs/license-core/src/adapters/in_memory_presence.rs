use crate::{AddressSighting, CoreError, SightingRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Sightings grouped per key: key -> (address -> sighting).
#[derive(Debug, Clone, Default)]
pub struct InMemorySightingRepository {
    sightings: Arc<DashMap<String, HashMap<String, AddressSighting>>>,
}

#[async_trait]
impl SightingRepository for InMemorySightingRepository {
    async fn upsert(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<AddressSighting, CoreError> {
        let mut per_key = self.sightings.entry(key.to_string()).or_default();
        let sighting = per_key
            .entry(address.to_string())
            .and_modify(|s| s.seen_again(now))
            .or_insert_with(|| AddressSighting::first(key, address, now));
        Ok(sighting.clone())
    }

    async fn count(&self, key: &str) -> Result<u64, CoreError> {
        Ok(self
            .sightings
            .get(key)
            .map_or(0, |per_key| per_key.len() as u64))
    }

    async fn list(&self, key: &str) -> Result<Vec<AddressSighting>, CoreError> {
        let mut sightings: Vec<AddressSighting> = self
            .sightings
            .get(key)
            .map(|per_key| per_key.values().cloned().collect())
            .unwrap_or_default();
        sightings.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then_with(|| a.address.cmp(&b.address))
        });
        Ok(sightings)
    }

    async fn remove_all(&self, key: &str) -> Result<u64, CoreError> {
        Ok(self
            .sightings
            .remove(key)
            .map_or(0, |(_, per_key)| per_key.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_all_reports_how_many_went() {
        let repo = InMemorySightingRepository::default();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        repo.upsert("TW-A", "10.0.0.1", now).await.unwrap();
        repo.upsert("TW-A", "10.0.0.2", now).await.unwrap();

        assert_eq!(repo.remove_all("TW-A").await.unwrap(), 2);
        assert_eq!(repo.remove_all("TW-A").await.unwrap(), 0);
        assert_eq!(repo.count("TW-A").await.unwrap(), 0);
    }
}
