use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;

pub mod adapters;
pub mod clock;
pub mod domain;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::access_log::{AccessAction, AccessEvent, AccessLog, NewAccessEvent};
pub use domain::account::{Account, AccountDirectory, Role, CREATOR_USERNAME};
pub use domain::license::{KeyStore, LicenseKey, RejectReason, Verification};
pub use domain::presence::{AddressSighting, PresenceTracker};

/// Error taxonomy shared by every component and adapter.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Username already taken: {0}")]
    DuplicateUsername(String),
    #[error("License key already exists: {0}")]
    DuplicateKey(String),
    // No detail: callers must not learn which check failed.
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the same request may succeed if the caller retries it later.
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}

// --- Storage ports ---
//
// Every mutating method is a single atomic operation at the store level.
// Implementations must never split one of them into a read followed by a write.

#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Insert a new key, failing with `DuplicateKey` if the token is taken.
    async fn insert(&self, key: &LicenseKey) -> Result<(), CoreError>;

    async fn get(&self, key: &str) -> Result<Option<LicenseKey>, CoreError>;

    /// All keys, newest first.
    async fn list(&self) -> Result<Vec<LicenseKey>, CoreError>;

    /// Set `last_used_at = now` if the key is active and return the record as
    /// it stands afterwards. Inactive keys are returned untouched.
    async fn mark_used(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LicenseKey>, CoreError>;

    /// Flip `active`, returning the new value.
    async fn toggle_active(&self, key: &str) -> Result<Option<bool>, CoreError>;

    /// Returns `false` when the key does not exist.
    async fn record_heartbeat(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>;

    async fn delete(&self, key: &str) -> Result<bool, CoreError>;
}

#[async_trait]
pub trait SightingRepository: Send + Sync {
    /// Insert-or-update keyed on (key, address).
    async fn upsert(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<AddressSighting, CoreError>;

    async fn count(&self, key: &str) -> Result<u64, CoreError>;

    /// Sightings for a key, most recently seen first.
    async fn list(&self, key: &str) -> Result<Vec<AddressSighting>, CoreError>;

    async fn remove_all(&self, key: &str) -> Result<u64, CoreError>;
}

#[async_trait]
pub trait EventJournal: Send + Sync {
    async fn append(&self, event: NewAccessEvent) -> Result<(), CoreError>;

    /// Most recent events first.
    async fn recent(&self, limit: usize) -> Result<Vec<AccessEvent>, CoreError>;

    async fn count(&self, key: &str, action: AccessAction) -> Result<u64, CoreError>;

    /// Delete every event matching (key, action), returning how many went.
    async fn purge(&self, key: &str, action: AccessAction) -> Result<u64, CoreError>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Fails with `DuplicateUsername` if the username is taken.
    async fn insert(&self, account: &Account) -> Result<(), CoreError>;

    /// Conditional insert; returns `false` and leaves the stored row alone
    /// when the username already exists.
    async fn insert_if_absent(&self, account: &Account) -> Result<bool, CoreError>;

    async fn find(&self, username: &str) -> Result<Option<Account>, CoreError>;

    async fn list(&self) -> Result<Vec<Account>, CoreError>;

    async fn update_role(
        &self,
        username: &str,
        role: Role,
        bound_license_key: Option<&str>,
    ) -> Result<bool, CoreError>;

    async fn record_login(&self, username: &str, now: DateTime<Utc>) -> Result<bool, CoreError>;

    async fn delete(&self, username: &str) -> Result<bool, CoreError>;
}
