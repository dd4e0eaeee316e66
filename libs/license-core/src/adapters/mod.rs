// Storage adapters for the ports declared at the crate root.
pub mod in_memory_accounts;
pub mod in_memory_journal;
pub mod in_memory_keys;
pub mod in_memory_presence;
pub mod postgres_repository;

use crate::{AccountRepository, EventJournal, KeyRepository, SightingRepository};
use std::sync::Arc;

pub use in_memory_accounts::InMemoryAccountRepository;
pub use in_memory_journal::InMemoryEventJournal;
pub use in_memory_keys::InMemoryKeyRepository;
pub use in_memory_presence::InMemorySightingRepository;
pub use postgres_repository::PostgresStore;

/// One handle per port, all backed by the same store.
#[derive(Clone)]
pub struct Stores {
    pub keys: Arc<dyn KeyRepository>,
    pub sightings: Arc<dyn SightingRepository>,
    pub journal: Arc<dyn EventJournal>,
    pub accounts: Arc<dyn AccountRepository>,
}

impl Stores {
    /// Process-local stores. The journal keeps at most `log_capacity` events.
    pub fn in_memory(log_capacity: usize) -> Self {
        Self {
            keys: Arc::new(InMemoryKeyRepository::default()),
            sightings: Arc::new(InMemorySightingRepository::default()),
            journal: Arc::new(InMemoryEventJournal::with_capacity(log_capacity)),
            accounts: Arc::new(InMemoryAccountRepository::default()),
        }
    }

    pub fn postgres(store: PostgresStore) -> Self {
        let store = Arc::new(store);
        Self {
            keys: store.clone(),
            sightings: store.clone(),
            journal: store.clone(),
            accounts: store,
        }
    }
}
