use crate::{
    AccessAction, AccessEvent, Account, AccountRepository, AddressSighting, CoreError,
    EventJournal, KeyRepository, LicenseKey, NewAccessEvent, Role, SightingRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::future::Future;
use std::time::Duration;

// --- Row types ---

#[derive(sqlx::FromRow, Debug)]
struct KeyRow {
    key: String,
    owner: String,
    active: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    last_address: Option<String>,
}

impl From<KeyRow> for LicenseKey {
    fn from(row: KeyRow) -> Self {
        Self {
            key: row.key,
            owner: row.owner,
            active: row.active,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
            last_heartbeat_at: row.last_heartbeat_at,
            last_address: row.last_address,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct SightingRow {
    key: String,
    address: String,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl From<SightingRow> for AddressSighting {
    fn from(row: SightingRow) -> Self {
        Self {
            key: row.key,
            address: row.address,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct EventRow {
    id: i64,
    key: String,
    action: String,
    status: String,
    address: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<EventRow> for AccessEvent {
    type Error = CoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id as u64,
            key: row.key,
            action: row.action.parse()?,
            status: row.status,
            address: row.address,
            timestamp: row.timestamp,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct AccountRow {
    username: String,
    password_hash: String,
    role: String,
    bound_license_key: Option<String>,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for Account {
    type Error = CoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| CoreError::Internal(format!("stored role is unknown: {}", row.role)))?;
        Ok(Self {
            username: row.username,
            password_hash: row.password_hash,
            role,
            bound_license_key: row.bound_license_key,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        })
    }
}

const KEY_COLUMNS: &str =
    "key, owner, active, created_at, last_used_at, last_heartbeat_at, last_address";
const ACCOUNT_COLUMNS: &str =
    "username, password_hash, role, bound_license_key, created_at, last_login_at";

// --- Store ---

/// PostgreSQL implementation of all four storage ports using sqlx.
///
/// Every statement runs under `op_timeout`. Timeouts, pool exhaustion and
/// connection failures become `StoreUnavailable`; anything else sqlx reports
/// is `Infrastructure`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        op_timeout: Duration,
    ) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(op_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool, op_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, sqlx::Error>> + Send,
    ) -> Result<T, CoreError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(CoreError::StoreUnavailable(format!(
                "{operation} timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

fn map_sqlx_error(e: sqlx::Error) -> CoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CoreError::StoreUnavailable(e.to_string())
        }
        other => CoreError::Infrastructure(Box::new(other)),
    }
}

#[async_trait]
impl KeyRepository for PostgresStore {
    async fn insert(&self, key: &LicenseKey) -> Result<(), CoreError> {
        let result = self
            .bounded(
                "insert license key",
                sqlx::query(
                    "INSERT INTO license_keys (key, owner, active, created_at) VALUES ($1, $2, $3, $4)
                     ON CONFLICT (key) DO NOTHING",
                )
                .bind(&key.key)
                .bind(&key.owner)
                .bind(key.active)
                .bind(key.created_at)
                .execute(&self.pool),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::DuplicateKey(key.key.clone()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<LicenseKey>, CoreError> {
        let query = format!("SELECT {KEY_COLUMNS} FROM license_keys WHERE key = $1");
        let row: Option<KeyRow> = self
            .bounded(
                "get license key",
                sqlx::query_as(&query).bind(key).fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<LicenseKey>, CoreError> {
        let query = format!("SELECT {KEY_COLUMNS} FROM license_keys ORDER BY created_at DESC, key");
        let rows: Vec<KeyRow> = self
            .bounded("list license keys", sqlx::query_as(&query).fetch_all(&self.pool))
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_used(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LicenseKey>, CoreError> {
        let query = format!(
            "UPDATE license_keys
             SET last_used_at = CASE WHEN active THEN $2 ELSE last_used_at END
             WHERE key = $1
             RETURNING {KEY_COLUMNS}"
        );
        let row: Option<KeyRow> = self
            .bounded(
                "mark license key used",
                sqlx::query_as(&query)
                    .bind(key)
                    .bind(now)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(Into::into))
    }

    async fn toggle_active(&self, key: &str) -> Result<Option<bool>, CoreError> {
        self.bounded(
            "toggle license key",
            sqlx::query_scalar(
                "UPDATE license_keys SET active = NOT active WHERE key = $1 RETURNING active",
            )
            .bind(key)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn record_heartbeat(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = self
            .bounded(
                "record heartbeat",
                sqlx::query(
                    "UPDATE license_keys SET last_heartbeat_at = $3, last_address = $2 WHERE key = $1",
                )
                .bind(key)
                .bind(address)
                .bind(now)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, CoreError> {
        let result = self
            .bounded(
                "delete license key",
                sqlx::query("DELETE FROM license_keys WHERE key = $1")
                    .bind(key)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SightingRepository for PostgresStore {
    async fn upsert(
        &self,
        key: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<AddressSighting, CoreError> {
        let row: SightingRow = self
            .bounded(
                "upsert sighting",
                sqlx::query_as(
                    "INSERT INTO address_sightings (key, address, first_seen_at, last_seen_at)
                     VALUES ($1, $2, $3, $3)
                     ON CONFLICT (key, address) DO UPDATE
                     SET last_seen_at = GREATEST(address_sightings.last_seen_at, EXCLUDED.last_seen_at)
                     RETURNING key, address, first_seen_at, last_seen_at",
                )
                .bind(key)
                .bind(address)
                .bind(now)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.into())
    }

    async fn count(&self, key: &str) -> Result<u64, CoreError> {
        let count: i64 = self
            .bounded(
                "count sightings",
                sqlx::query_scalar("SELECT COUNT(*) FROM address_sightings WHERE key = $1")
                    .bind(key)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(count as u64)
    }

    async fn list(&self, key: &str) -> Result<Vec<AddressSighting>, CoreError> {
        let rows: Vec<SightingRow> = self
            .bounded(
                "list sightings",
                sqlx::query_as(
                    "SELECT key, address, first_seen_at, last_seen_at FROM address_sightings
                     WHERE key = $1 ORDER BY last_seen_at DESC, address",
                )
                .bind(key)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn remove_all(&self, key: &str) -> Result<u64, CoreError> {
        let result = self
            .bounded(
                "remove sightings",
                sqlx::query("DELETE FROM address_sightings WHERE key = $1")
                    .bind(key)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EventJournal for PostgresStore {
    async fn append(&self, event: NewAccessEvent) -> Result<(), CoreError> {
        self.bounded(
            "append access event",
            sqlx::query(
                "INSERT INTO access_events (key, action, status, address, timestamp)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&event.key)
            .bind(event.action.as_str())
            .bind(&event.status)
            .bind(&event.address)
            .bind(event.timestamp)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AccessEvent>, CoreError> {
        let rows: Vec<EventRow> = self
            .bounded(
                "read recent access events",
                sqlx::query_as(
                    "SELECT id, key, action, status, address, timestamp FROM access_events
                     ORDER BY id DESC LIMIT $1",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self, key: &str, action: AccessAction) -> Result<u64, CoreError> {
        let count: i64 = self
            .bounded(
                "count access events",
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM access_events WHERE key = $1 AND action = $2",
                )
                .bind(key)
                .bind(action.as_str())
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(count as u64)
    }

    async fn purge(&self, key: &str, action: AccessAction) -> Result<u64, CoreError> {
        let result = self
            .bounded(
                "purge access events",
                sqlx::query("DELETE FROM access_events WHERE key = $1 AND action = $2")
                    .bind(key)
                    .bind(action.as_str())
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AccountRepository for PostgresStore {
    async fn insert(&self, account: &Account) -> Result<(), CoreError> {
        if self.insert_if_absent(account).await? {
            Ok(())
        } else {
            Err(CoreError::DuplicateUsername(account.username.clone()))
        }
    }

    async fn insert_if_absent(&self, account: &Account) -> Result<bool, CoreError> {
        let result = self
            .bounded(
                "insert account",
                sqlx::query(
                    "INSERT INTO accounts (username, password_hash, role, bound_license_key, created_at, last_login_at)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     ON CONFLICT (username) DO NOTHING",
                )
                .bind(&account.username)
                .bind(&account.password_hash)
                .bind(account.role.as_str())
                .bind(&account.bound_license_key)
                .bind(account.created_at)
                .bind(account.last_login_at)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, username: &str) -> Result<Option<Account>, CoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        let row: Option<AccountRow> = self
            .bounded(
                "find account",
                sqlx::query_as(&query).bind(username).fetch_optional(&self.pool),
            )
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> Result<Vec<Account>, CoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY username");
        let rows: Vec<AccountRow> = self
            .bounded("list accounts", sqlx::query_as(&query).fetch_all(&self.pool))
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_role(
        &self,
        username: &str,
        role: Role,
        bound_license_key: Option<&str>,
    ) -> Result<bool, CoreError> {
        let result = self
            .bounded(
                "update account role",
                sqlx::query(
                    "UPDATE accounts SET role = $2, bound_license_key = $3 WHERE username = $1",
                )
                .bind(username)
                .bind(role.as_str())
                .bind(bound_license_key)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, username: &str, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let result = self
            .bounded(
                "record login",
                sqlx::query("UPDATE accounts SET last_login_at = $2 WHERE username = $1")
                    .bind(username)
                    .bind(now)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, username: &str) -> Result<bool, CoreError> {
        let result = self
            .bounded(
                "delete account",
                sqlx::query("DELETE FROM accounts WHERE username = $1")
                    .bind(username)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
