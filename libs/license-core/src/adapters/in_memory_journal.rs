use crate::{AccessAction, AccessEvent, CoreError, EventJournal, NewAccessEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Default)]
struct Ring {
    next_id: u64,
    events: VecDeque<AccessEvent>,
}

/// Bounded in-memory journal. Once full, each append evicts the oldest event.
#[derive(Debug, Clone)]
pub struct InMemoryEventJournal {
    ring: Arc<Mutex<Ring>>,
    capacity: usize,
}

impl InMemoryEventJournal {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(Ring::default())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Ring>, CoreError> {
        self.ring
            .lock()
            .map_err(|_| CoreError::Internal("access journal lock poisoned".into()))
    }
}

impl Default for InMemoryEventJournal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventJournal for InMemoryEventJournal {
    async fn append(&self, event: NewAccessEvent) -> Result<(), CoreError> {
        let mut ring = self.lock()?;
        ring.next_id += 1;
        let id = ring.next_id;
        ring.events.push_back(AccessEvent {
            id,
            key: event.key,
            action: event.action,
            status: event.status,
            address: event.address,
            timestamp: event.timestamp,
        });
        while ring.events.len() > self.capacity {
            ring.events.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AccessEvent>, CoreError> {
        let ring = self.lock()?;
        Ok(ring.events.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self, key: &str, action: AccessAction) -> Result<u64, CoreError> {
        let ring = self.lock()?;
        Ok(ring
            .events
            .iter()
            .filter(|e| e.key == key && e.action == action)
            .count() as u64)
    }

    async fn purge(&self, key: &str, action: AccessAction) -> Result<u64, CoreError> {
        let mut ring = self.lock()?;
        let before = ring.events.len();
        ring.events.retain(|e| !(e.key == key && e.action == action));
        Ok((before - ring.events.len()) as u64)
    }
}
