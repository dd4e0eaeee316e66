use crate::{Account, AccountRepository, CoreError, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountRepository {
    accounts: Arc<DashMap<String, Account>>,
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn insert(&self, account: &Account) -> Result<(), CoreError> {
        if self.insert_if_absent(account).await? {
            Ok(())
        } else {
            Err(CoreError::DuplicateUsername(account.username.clone()))
        }
    }

    async fn insert_if_absent(&self, account: &Account) -> Result<bool, CoreError> {
        match self.accounts.entry(account.username.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(true)
            }
        }
    }

    async fn find(&self, username: &str) -> Result<Option<Account>, CoreError> {
        Ok(self.accounts.get(username).map(|e| e.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Account>, CoreError> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|e| e.value().clone()).collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }

    async fn update_role(
        &self,
        username: &str,
        role: Role,
        bound_license_key: Option<&str>,
    ) -> Result<bool, CoreError> {
        match self.accounts.get_mut(username) {
            Some(mut account) => {
                account.role = role;
                account.bound_license_key = bound_license_key.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_login(&self, username: &str, now: DateTime<Utc>) -> Result<bool, CoreError> {
        match self.accounts.get_mut(username) {
            Some(mut account) => {
                account.last_login_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, username: &str) -> Result<bool, CoreError> {
        Ok(self.accounts.remove(username).is_some())
    }
}
