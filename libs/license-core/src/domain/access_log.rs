use crate::{Clock, CoreError, EventJournal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;

pub const DEFAULT_RECENT_LIMIT: usize = 100;
pub const MAX_RECENT_LIMIT: usize = 1000;

// --- Event model ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Verify,
    Heartbeat,
    Create,
    Toggle,
    Delete,
    CommentPosted,
    CommentsReset,
    AccountCreate,
    AccountUpdate,
    AccountDelete,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Verify => "verify",
            AccessAction::Heartbeat => "heartbeat",
            AccessAction::Create => "create",
            AccessAction::Toggle => "toggle",
            AccessAction::Delete => "delete",
            AccessAction::CommentPosted => "comment_posted",
            AccessAction::CommentsReset => "comments_reset",
            AccessAction::AccountCreate => "account_create",
            AccessAction::AccountUpdate => "account_update",
            AccessAction::AccountDelete => "account_delete",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verify" => Ok(AccessAction::Verify),
            "heartbeat" => Ok(AccessAction::Heartbeat),
            "create" => Ok(AccessAction::Create),
            "toggle" => Ok(AccessAction::Toggle),
            "delete" => Ok(AccessAction::Delete),
            "comment_posted" => Ok(AccessAction::CommentPosted),
            "comments_reset" => Ok(AccessAction::CommentsReset),
            "account_create" => Ok(AccessAction::AccountCreate),
            "account_update" => Ok(AccessAction::AccountUpdate),
            "account_delete" => Ok(AccessAction::AccountDelete),
            other => Err(CoreError::Internal(format!("unknown access action: {other}"))),
        }
    }
}

/// An event as handed to the journal, before it is assigned a sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessEvent {
    pub key: String,
    pub action: AccessAction,
    pub status: String,
    pub address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A stored journal entry. `key` holds the license key, or the username for
/// account actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub id: u64,
    pub key: String,
    pub action: AccessAction,
    pub status: String,
    pub address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// --- Component ---

/// Append-only journal of what happened to keys and accounts.
///
/// Appending never fails the operation that triggered it: journal errors are
/// reported on the diagnostic channel and otherwise dropped.
#[derive(Clone)]
pub struct AccessLog {
    journal: Arc<dyn EventJournal>,
    clock: Arc<dyn Clock>,
}

impl AccessLog {
    pub fn new(journal: Arc<dyn EventJournal>, clock: Arc<dyn Clock>) -> Self {
        Self { journal, clock }
    }

    pub async fn append(&self, key: &str, action: AccessAction, status: &str, address: Option<&str>) {
        let event = NewAccessEvent {
            key: key.to_string(),
            action,
            status: status.to_string(),
            address: address.map(str::to_string),
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.journal.append(event).await {
            error!(
                key,
                action = %action,
                status,
                error = %e,
                "Failed to append access event; dropping it"
            );
        }
    }

    /// Most recent events first. `None` means the default of 100; anything
    /// else is clamped to `1..=1000`.
    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<AccessEvent>, CoreError> {
        let limit = limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, MAX_RECENT_LIMIT);
        self.journal.recent(limit).await
    }

    pub async fn count_by_action(&self, key: &str, action: AccessAction) -> Result<u64, CoreError> {
        self.journal.count(key, action).await
    }

    pub async fn purge(&self, key: &str, action: AccessAction) -> Result<u64, CoreError> {
        self.journal.purge(key, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use crate::adapters::in_memory_journal::InMemoryEventJournal;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct BrokenJournal;

    #[async_trait]
    impl EventJournal for BrokenJournal {
        async fn append(&self, _event: NewAccessEvent) -> Result<(), CoreError> {
            Err(CoreError::StoreUnavailable("journal offline".into()))
        }
        async fn recent(&self, _limit: usize) -> Result<Vec<AccessEvent>, CoreError> {
            Err(CoreError::StoreUnavailable("journal offline".into()))
        }
        async fn count(&self, _key: &str, _action: AccessAction) -> Result<u64, CoreError> {
            Err(CoreError::StoreUnavailable("journal offline".into()))
        }
        async fn purge(&self, _key: &str, _action: AccessAction) -> Result<u64, CoreError> {
            Err(CoreError::StoreUnavailable("journal offline".into()))
        }
    }

    fn access_log() -> AccessLog {
        AccessLog::new(
            Arc::new(InMemoryEventJournal::default()),
            Arc::new(ManualClock::default()),
        )
    }

    #[tokio::test]
    async fn append_swallows_journal_failures() {
        let log = AccessLog::new(Arc::new(BrokenJournal), Arc::new(ManualClock::default()));
        // Must not panic or surface the error.
        log.append("TW-ANY", AccessAction::Verify, "success", None).await;
        assert!(log.recent(None).await.is_err());
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let log = access_log();
        log.append("TW-A", AccessAction::Verify, "success", None).await;
        log.append("TW-B", AccessAction::Heartbeat, "success", Some("10.0.0.1")).await;

        let events = log.recent(None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key, "TW-B");
        assert_eq!(events[0].address.as_deref(), Some("10.0.0.1"));
        assert_eq!(events[1].key, "TW-A");
    }

    #[tokio::test]
    async fn recent_clamps_zero_limit_to_one() {
        let log = access_log();
        for _ in 0..3 {
            log.append("TW-A", AccessAction::Verify, "success", None).await;
        }
        assert_eq!(log.recent(Some(0)).await.unwrap().len(), 1);
        assert_eq!(log.recent(Some(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn purge_only_touches_matching_key_and_action() {
        let log = access_log();
        log.append("TW-A", AccessAction::CommentPosted, "success", None).await;
        log.append("TW-A", AccessAction::CommentPosted, "success", None).await;
        log.append("TW-A", AccessAction::Verify, "success", None).await;
        log.append("TW-B", AccessAction::CommentPosted, "success", None).await;

        let removed = log.purge("TW-A", AccessAction::CommentPosted).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(log.count_by_action("TW-A", AccessAction::CommentPosted).await.unwrap(), 0);
        assert_eq!(log.count_by_action("TW-A", AccessAction::Verify).await.unwrap(), 1);
        assert_eq!(log.count_by_action("TW-B", AccessAction::CommentPosted).await.unwrap(), 1);
    }

    #[test]
    fn action_names_round_trip_through_from_str() {
        for action in [
            AccessAction::Verify,
            AccessAction::CommentPosted,
            AccessAction::CommentsReset,
            AccessAction::AccountDelete,
        ] {
            assert_eq!(action.as_str().parse::<AccessAction>().unwrap(), action);
        }
        assert!("bogus".parse::<AccessAction>().is_err());
    }
}
