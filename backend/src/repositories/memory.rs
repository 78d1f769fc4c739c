//! In-memory user store for tests and development

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use livecode_shared::UniqueField;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DuplicateUser, NewUser, UserRecord, UserStore};

/// User store held in process memory
///
/// Uniqueness is enforced under the write lock, so concurrent registrations
/// behave like the unique constraints of the Postgres schema.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, simulating an outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("in-memory user store marked unavailable");
        }
        Ok(())
    }
}

fn field_value(user: &UserRecord, field: UniqueField) -> &str {
    match field {
        UniqueField::Email => &user.email,
        UniqueField::Username => &user.username,
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>> {
        self.ensure_available()?;
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email == identifier || u.username == identifier)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.ensure_available()?;
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord> {
        self.ensure_available()?;
        let mut users = self.users.write().await;

        for field in [UniqueField::Email, UniqueField::Username] {
            let wanted = match field {
                UniqueField::Email => user.email.as_str(),
                UniqueField::Username => user.username.as_str(),
            };
            if users.values().any(|u| field_value(u, field) == wanted) {
                return Err(DuplicateUser(field).into());
            }
        }
        if users.contains_key(&user.id) {
            bail!("user id {} already exists", user.id);
        }

        let record = UserRecord {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn exists_by_field(&self, field: UniqueField, value: &str) -> Result<bool> {
        self.ensure_available()?;
        let users = self.users.read().await;
        Ok(users.values().any(|u| field_value(u, field) == value))
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_available()
    }
}
