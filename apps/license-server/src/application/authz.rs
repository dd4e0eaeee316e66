use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use license_core::{AccountDirectory, CoreError, Role};
use std::sync::Arc;
use tracing::warn;

/// Principal name recorded for requests authorized by the legacy secret.
pub const LEGACY_PRINCIPAL: &str = "legacy-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Bearer <secret>`
    LegacySecret(String),
    /// `Authorization: Basic base64(username:password)`
    Basic { username: String, password: String },
}

impl Credentials {
    /// `None` for a missing, unknown or undecodable Authorization header.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

        if let Some(secret) = value.strip_prefix("Bearer ") {
            let secret = secret.trim();
            return (!secret.is_empty()).then(|| Credentials::LegacySecret(secret.to_string()));
        }

        let encoded = value.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Who passed the admin gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContext {
    pub principal: String,
    pub role: Role,
}

/// Decides whether a request may use the admin surface.
#[derive(Clone)]
pub struct AuthorizationGate {
    legacy_secret: Option<Arc<str>>,
    accounts: AccountDirectory,
}

impl AuthorizationGate {
    pub fn new(legacy_secret: Option<String>, accounts: AccountDirectory) -> Self {
        Self {
            legacy_secret: legacy_secret.filter(|s| !s.is_empty()).map(Arc::from),
            accounts,
        }
    }

    /// Legacy secret first, then account credentials. Only admin and creator
    /// accounts pass. Every refusal is the same `Unauthorized`.
    pub async fn authorize_admin(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<AdminContext, CoreError> {
        match credentials {
            Some(Credentials::LegacySecret(presented)) => {
                let Some(expected) = &self.legacy_secret else {
                    return Err(CoreError::Unauthorized);
                };
                if !constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
                    return Err(CoreError::Unauthorized);
                }
                warn!("Legacy admin secret used; this fallback is deprecated, switch to an admin account");
                Ok(AdminContext {
                    principal: LEGACY_PRINCIPAL.to_string(),
                    role: Role::Admin,
                })
            }
            Some(Credentials::Basic { username, password }) => {
                let account = self.accounts.check_credentials(&username, &password).await?;
                if !account.role.is_admin() {
                    return Err(CoreError::Unauthorized);
                }
                Ok(AdminContext {
                    principal: account.username,
                    role: account.role,
                })
            }
            None => Err(CoreError::Unauthorized),
        }
    }
}

/// Byte comparison whose running time depends only on the lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use license_core::adapters::Stores;
    use license_core::{AccessLog, Clock, KeyStore, ManualClock, PresenceTracker};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn basic(username: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
    }

    async fn gate(secret: Option<&str>) -> (AuthorizationGate, KeyStore, AccountDirectory) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let stores = Stores::in_memory(100);
        let log = AccessLog::new(stores.journal.clone(), clock.clone());
        let keys = KeyStore::new(
            stores.keys.clone(),
            PresenceTracker::new(stores.sightings.clone()),
            log.clone(),
            clock.clone(),
        );
        let accounts = AccountDirectory::new(stores.accounts.clone(), stores.keys.clone(), log, clock);
        accounts.bootstrap_creator("root-pw").await.unwrap();
        (
            AuthorizationGate::new(secret.map(str::to_string), accounts.clone()),
            keys,
            accounts,
        )
    }

    #[test]
    fn parses_bearer_and_basic_headers() {
        assert_eq!(
            Credentials::from_headers(&headers_with("Bearer s3cret")),
            Some(Credentials::LegacySecret("s3cret".into()))
        );
        assert_eq!(
            Credentials::from_headers(&headers_with(&basic("alice", "pa:ss"))),
            Some(Credentials::Basic {
                username: "alice".into(),
                password: "pa:ss".into()
            })
        );
        assert_eq!(Credentials::from_headers(&headers_with("Bearer   ")), None);
        assert_eq!(Credentials::from_headers(&headers_with("Basic !!!")), None);
        assert_eq!(Credentials::from_headers(&headers_with("Token abc")), None);
        assert_eq!(Credentials::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }

    #[tokio::test]
    async fn legacy_secret_grants_admin_only_when_configured() {
        let (with_secret, _, _) = gate(Some("s3cret")).await;
        let ctx = with_secret
            .authorize_admin(Some(Credentials::LegacySecret("s3cret".into())))
            .await
            .unwrap();
        assert_eq!(ctx.role, Role::Admin);
        assert_eq!(ctx.principal, LEGACY_PRINCIPAL);

        assert!(matches!(
            with_secret
                .authorize_admin(Some(Credentials::LegacySecret("wrong".into())))
                .await,
            Err(CoreError::Unauthorized)
        ));

        let (without_secret, _, _) = gate(None).await;
        assert!(matches!(
            without_secret
                .authorize_admin(Some(Credentials::LegacySecret("s3cret".into())))
                .await,
            Err(CoreError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn creator_and_admin_pass_operator_does_not() {
        let (gate, keys, accounts) = gate(None).await;
        let license = keys.create("Acme").await.unwrap();
        accounts.create("alice", "pw", Role::Admin, None).await.unwrap();
        accounts
            .create("op", "pw", Role::Operator, Some(&license.key))
            .await
            .unwrap();

        let creator = gate
            .authorize_admin(Some(Credentials::Basic {
                username: "creator".into(),
                password: "root-pw".into(),
            }))
            .await
            .unwrap();
        assert_eq!(creator.role, Role::Creator);

        let admin = gate
            .authorize_admin(Some(Credentials::Basic {
                username: "alice".into(),
                password: "pw".into(),
            }))
            .await
            .unwrap();
        assert_eq!(admin.principal, "alice");

        assert!(matches!(
            gate.authorize_admin(Some(Credentials::Basic {
                username: "op".into(),
                password: "pw".into(),
            }))
            .await,
            Err(CoreError::Unauthorized)
        ));
        assert!(matches!(gate.authorize_admin(None).await, Err(CoreError::Unauthorized)));
    }
}
