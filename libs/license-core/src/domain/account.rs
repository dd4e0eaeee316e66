use crate::{AccessAction, AccessLog, AccountRepository, Clock, CoreError, KeyRepository};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// The one account that can never be created, re-roled or deleted through the API.
pub const CREATOR_USERNAME: &str = "creator";

// --- Roles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Creator,
    Admin,
    Operator,
    /// Accounts migrated from the old guest table. Read-only compatibility:
    /// behaves like `Operator` but can no longer be assigned.
    #[serde(alias = "guest")]
    LegacyOperator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::LegacyOperator => "legacy-operator",
        }
    }

    /// Roles the authorization gate will grant on the admin surface.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Creator | Role::Admin)
    }

    pub fn requires_bound_key(&self) -> bool {
        matches!(self, Role::Operator | Role::LegacyOperator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Role::Creator),
            "admin" => Ok(Role::Admin),
            "operator" => Ok(Role::Operator),
            "legacy-operator" | "guest" => Ok(Role::LegacyOperator),
            other => Err(CoreError::Validation(format!("unknown role: {other}"))),
        }
    }
}

// --- Account ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    /// Argon2 PHC string. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub bound_license_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

// --- Component ---

#[derive(Clone)]
pub struct AccountDirectory {
    accounts: Arc<dyn AccountRepository>,
    keys: Arc<dyn KeyRepository>,
    log: AccessLog,
    clock: Arc<dyn Clock>,
}

impl AccountDirectory {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        keys: Arc<dyn KeyRepository>,
        log: AccessLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            keys,
            log,
            clock,
        }
    }

    /// Unknown usernames and wrong passwords both come back as the same
    /// `Unauthorized`. Records the login on success.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Account, CoreError> {
        let account = self.check_credentials(username, password).await?;
        let now = self.clock.now();
        self.accounts.record_login(username, now).await?;
        Ok(Account {
            last_login_at: Some(now),
            ..account
        })
    }

    /// Same checks as `authenticate` without touching `last_login_at`.
    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Account, CoreError> {
        let account = self.accounts.find(username).await?;
        // Unknown usernames still pay for a full Argon2 verification.
        let stored_hash = account
            .as_ref()
            .map_or(UNKNOWN_ACCOUNT_HASH, |account| account.password_hash.as_str());
        let matches = verify_password(password, stored_hash).await?;
        match account {
            Some(account) if matches => Ok(account),
            _ => Err(CoreError::Unauthorized),
        }
    }

    pub async fn get(&self, username: &str) -> Result<Account, CoreError> {
        self.accounts
            .find(username)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("account {username}")))
    }

    pub async fn list(&self) -> Result<Vec<Account>, CoreError> {
        self.accounts.list().await
    }

    pub async fn create(
        &self,
        username: &str,
        password: &str,
        role: Role,
        bound_license_key: Option<&str>,
    ) -> Result<Account, CoreError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(CoreError::Validation(
                "username and password are required".into(),
            ));
        }
        if role == Role::Creator || username == CREATOR_USERNAME {
            return Err(CoreError::Forbidden(
                "the creator account cannot be created".into(),
            ));
        }
        let bound_license_key = self.validate_binding(role, bound_license_key).await?;

        let account = Account {
            username: username.to_string(),
            password_hash: hash_password(password).await?,
            role,
            bound_license_key,
            created_at: self.clock.now(),
            last_login_at: None,
        };
        self.accounts.insert(&account).await?;

        info!(username, role = %role, "Account created");
        self.log
            .append(username, AccessAction::AccountCreate, "created", None)
            .await;
        Ok(account)
    }

    pub async fn update_role(
        &self,
        username: &str,
        new_role: Role,
        new_license_key: Option<&str>,
    ) -> Result<(), CoreError> {
        if username == CREATOR_USERNAME || new_role == Role::Creator {
            return Err(CoreError::Forbidden(
                "the creator role cannot be changed or assigned".into(),
            ));
        }
        if self.get(username).await?.role == Role::Creator {
            return Err(CoreError::Forbidden(
                "the creator role cannot be changed or assigned".into(),
            ));
        }
        let bound_license_key = self.validate_binding(new_role, new_license_key).await?;

        if !self
            .accounts
            .update_role(username, new_role, bound_license_key.as_deref())
            .await?
        {
            return Err(CoreError::NotFound(format!("account {username}")));
        }

        info!(username, role = %new_role, "Account role updated");
        self.log
            .append(username, AccessAction::AccountUpdate, "updated", None)
            .await;
        Ok(())
    }

    /// The creator is refused by name before anything is looked up.
    pub async fn delete(&self, username: &str) -> Result<(), CoreError> {
        if username == CREATOR_USERNAME {
            return Err(CoreError::Forbidden(
                "the creator account cannot be deleted".into(),
            ));
        }
        if self.get(username).await?.role == Role::Creator {
            return Err(CoreError::Forbidden(
                "the creator account cannot be deleted".into(),
            ));
        }
        if !self.accounts.delete(username).await? {
            return Err(CoreError::NotFound(format!("account {username}")));
        }

        info!(username, "Account deleted");
        self.log
            .append(username, AccessAction::AccountDelete, "deleted", None)
            .await;
        Ok(())
    }

    /// Inserts the creator account if there is none. An existing creator is
    /// never touched. Returns whether an insert happened.
    pub async fn bootstrap_creator(&self, password: &str) -> Result<bool, CoreError> {
        if self.accounts.find(CREATOR_USERNAME).await?.is_some() {
            debug!("Creator account already present");
            return Ok(false);
        }
        if password.is_empty() {
            return Err(CoreError::Validation(
                "creator password must not be empty".into(),
            ));
        }

        let creator = Account {
            username: CREATOR_USERNAME.to_string(),
            password_hash: hash_password(password).await?,
            role: Role::Creator,
            bound_license_key: None,
            created_at: self.clock.now(),
            last_login_at: None,
        };
        let inserted = self.accounts.insert_if_absent(&creator).await?;
        if inserted {
            info!("Creator account bootstrapped");
        }
        Ok(inserted)
    }

    async fn validate_binding(
        &self,
        role: Role,
        bound_license_key: Option<&str>,
    ) -> Result<Option<String>, CoreError> {
        if role == Role::LegacyOperator {
            return Err(CoreError::Validation(
                "legacy-operator can no longer be assigned; use operator".into(),
            ));
        }
        let bound_license_key = bound_license_key.map(str::trim).filter(|k| !k.is_empty());
        match (role.requires_bound_key(), bound_license_key) {
            (true, None) => Err(CoreError::Validation(
                "operator accounts require a bound license key".into(),
            )),
            (false, Some(_)) => Err(CoreError::Validation(
                "only operator accounts may be bound to a license key".into(),
            )),
            (false, None) => Ok(None),
            (true, Some(key)) => {
                if self.keys.get(key).await?.is_none() {
                    return Err(CoreError::Validation(format!(
                        "bound license key does not exist: {key}"
                    )));
                }
                Ok(Some(key.to_string()))
            }
        }
    }
}

// --- Password hashing ---
// Argon2 is CPU bound, so both directions run on the blocking pool.

/// Verified against when the username is unknown. Same parameters as
/// `Argon2::default()`; no password maps to it.
const UNKNOWN_ACCOUNT_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$y+8xe60jQw/5w4xs1+eanA$tgvyjgwzeTay9087mRlzwXroGX/8UcsudVrCOwVQei8";

async fn hash_password(password: &str) -> Result<String, CoreError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CoreError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| CoreError::Internal(format!("password hashing task failed: {e}")))?
}

async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, CoreError> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| CoreError::Internal(format!("stored password hash is malformed: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| CoreError::Internal(format!("password verification task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Stores;
    use crate::{KeyStore, ManualClock, PresenceTracker};

    struct Fixture {
        directory: AccountDirectory,
        keys: KeyStore,
        log: AccessLog,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let stores = Stores::in_memory(1000);
        let log = AccessLog::new(stores.journal.clone(), clock.clone());
        let keys = KeyStore::new(
            stores.keys.clone(),
            PresenceTracker::new(stores.sightings.clone()),
            log.clone(),
            clock.clone(),
        );
        let directory =
            AccountDirectory::new(stores.accounts.clone(), stores.keys.clone(), log.clone(), clock);
        Fixture {
            directory,
            keys,
            log,
        }
    }

    #[tokio::test]
    async fn admin_authenticates_and_records_login() {
        let Fixture { directory, .. } = fixture();
        directory.create("alice", "s3cret", Role::Admin, None).await.unwrap();

        let account = directory.authenticate("alice", "s3cret").await.unwrap();

        assert_eq!(account.role, Role::Admin);
        assert!(account.last_login_at.is_some());
        assert_eq!(
            directory.get("alice").await.unwrap().last_login_at,
            account.last_login_at
        );
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let Fixture { directory, .. } = fixture();
        directory.create("alice", "s3cret", Role::Admin, None).await.unwrap();

        let wrong = directory.authenticate("alice", "nope").await.unwrap_err();
        let unknown = directory.authenticate("mallory", "nope").await.unwrap_err();

        assert!(matches!(wrong, CoreError::Unauthorized));
        assert!(matches!(unknown, CoreError::Unauthorized));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn unknown_user_hash_is_a_real_argon2_verification() {
        let parsed = PasswordHash::new(UNKNOWN_ACCOUNT_HASH).unwrap();
        let reference = hash_password("s3cret").await.unwrap();
        let reference = PasswordHash::new(&reference).unwrap();
        assert_eq!(parsed.algorithm, reference.algorithm);
        assert_eq!(parsed.params, reference.params);

        assert!(!verify_password("", UNKNOWN_ACCOUNT_HASH).await.unwrap());
        assert!(!verify_password("s3cret", UNKNOWN_ACCOUNT_HASH).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_costs_as_much_as_a_wrong_password() {
        let Fixture { directory, .. } = fixture();
        directory.create("alice", "s3cret", Role::Admin, None).await.unwrap();

        let started = std::time::Instant::now();
        for _ in 0..3 {
            directory.check_credentials("alice", "wrong").await.unwrap_err();
        }
        let existing = started.elapsed();

        let started = std::time::Instant::now();
        for _ in 0..3 {
            directory.check_credentials("nobody", "wrong").await.unwrap_err();
        }
        let unknown = started.elapsed();

        // Without the fallback hash the gap is three orders of magnitude.
        assert!(unknown * 10 >= existing, "existing {existing:?}, unknown {unknown:?}");
    }

    #[tokio::test]
    async fn credential_check_leaves_last_login_alone() {
        let Fixture { directory, .. } = fixture();
        directory.create("alice", "s3cret", Role::Admin, None).await.unwrap();

        directory.check_credentials("alice", "s3cret").await.unwrap();

        assert!(directory.get("alice").await.unwrap().last_login_at.is_none());
    }

    #[tokio::test]
    async fn password_is_not_stored_verbatim() {
        let Fixture { directory, .. } = fixture();
        let account = directory.create("alice", "s3cret", Role::Admin, None).await.unwrap();
        assert_ne!(account.password_hash, "s3cret");
        assert!(account.password_hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn operator_requires_existing_bound_key() {
        let Fixture {
            directory, keys, ..
        } = fixture();

        let missing = directory.create("op", "pw", Role::Operator, None).await;
        assert!(matches!(missing, Err(CoreError::Validation(_))));

        let dangling = directory
            .create("op", "pw", Role::Operator, Some("TW-DOESNOTEXIST"))
            .await;
        assert!(matches!(dangling, Err(CoreError::Validation(_))));

        let license = keys.create("Acme").await.unwrap();
        let operator = directory
            .create("op", "pw", Role::Operator, Some(&license.key))
            .await
            .unwrap();
        assert_eq!(operator.bound_license_key.as_deref(), Some(license.key.as_str()));
    }

    #[tokio::test]
    async fn admin_may_not_be_bound_to_a_key() {
        let Fixture {
            directory, keys, ..
        } = fixture();
        let license = keys.create("Acme").await.unwrap();

        let result = directory
            .create("alice", "pw", Role::Admin, Some(&license.key))
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let Fixture { directory, .. } = fixture();
        directory.create("alice", "pw", Role::Admin, None).await.unwrap();

        let result = directory.create("alice", "other", Role::Admin, None).await;

        assert!(matches!(result, Err(CoreError::DuplicateUsername(_))));
        // Original credentials still work.
        directory.authenticate("alice", "pw").await.unwrap();
    }

    #[tokio::test]
    async fn creator_cannot_be_created_updated_or_deleted() {
        let Fixture { directory, .. } = fixture();

        // Refused even before the creator exists.
        assert!(matches!(
            directory.delete(CREATOR_USERNAME).await,
            Err(CoreError::Forbidden(_))
        ));

        directory.bootstrap_creator("root-pw").await.unwrap();

        assert!(matches!(
            directory.delete(CREATOR_USERNAME).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            directory.update_role(CREATOR_USERNAME, Role::Admin, None).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            directory.create(CREATOR_USERNAME, "pw", Role::Admin, None).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            directory.create("another", "pw", Role::Creator, None).await,
            Err(CoreError::Forbidden(_))
        ));
        assert_eq!(directory.get(CREATOR_USERNAME).await.unwrap().role, Role::Creator);
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_and_keeps_credentials() {
        let Fixture { directory, .. } = fixture();

        assert!(directory.bootstrap_creator("first").await.unwrap());
        assert!(!directory.bootstrap_creator("second").await.unwrap());

        directory.authenticate(CREATOR_USERNAME, "first").await.unwrap();
        assert!(matches!(
            directory.authenticate(CREATOR_USERNAME, "second").await,
            Err(CoreError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn update_role_rebinds_or_clears_key() {
        let Fixture {
            directory, keys, ..
        } = fixture();
        let license = keys.create("Acme").await.unwrap();
        directory.create("bob", "pw", Role::Admin, None).await.unwrap();

        directory
            .update_role("bob", Role::Operator, Some(&license.key))
            .await
            .unwrap();
        let bob = directory.get("bob").await.unwrap();
        assert_eq!(bob.role, Role::Operator);
        assert_eq!(bob.bound_license_key.as_deref(), Some(license.key.as_str()));

        directory.update_role("bob", Role::Admin, None).await.unwrap();
        let bob = directory.get("bob").await.unwrap();
        assert_eq!(bob.role, Role::Admin);
        assert!(bob.bound_license_key.is_none());

        assert!(matches!(
            directory.update_role("bob", Role::Operator, None).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            directory.update_role("ghost", Role::Admin, None).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_account_and_logs() {
        let Fixture { directory, log, .. } = fixture();
        directory.create("carol", "pw", Role::Admin, None).await.unwrap();

        directory.delete("carol").await.unwrap();

        assert!(matches!(directory.get("carol").await, Err(CoreError::NotFound(_))));
        assert!(matches!(directory.delete("carol").await, Err(CoreError::NotFound(_))));
        assert_eq!(
            log.count_by_action("carol", AccessAction::AccountDelete).await.unwrap(),
            1
        );
        assert_eq!(
            log.count_by_action("carol", AccessAction::AccountCreate).await.unwrap(),
            1
        );
    }

    #[test]
    fn legacy_role_names_parse_as_legacy_operator() {
        assert_eq!("guest".parse::<Role>().unwrap(), Role::LegacyOperator);
        assert_eq!("legacy-operator".parse::<Role>().unwrap(), Role::LegacyOperator);
        assert!(Role::LegacyOperator.requires_bound_key());
        assert!(!Role::LegacyOperator.is_admin());
        assert!("superuser".parse::<Role>().is_err());
    }
}
