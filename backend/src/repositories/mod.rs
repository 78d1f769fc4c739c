//! User store
//!
//! The credential flows only see the `UserStore` trait. `PgUserStore` is the
//! production implementation; `InMemoryUserStore` backs tests and
//! database-less development runs.

pub mod memory;
pub mod user;

pub use memory::InMemoryUserStore;
pub use user::PgUserStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livecode_shared::{UniqueField, UserData};
use thiserror::Error;
use uuid::Uuid;

/// User record as stored
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Public view, without the password hash
    pub fn public(&self) -> UserData {
        UserData {
            id: self.id.to_string(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Raised by `UserStore::create` when a unique field is already taken
///
/// Stores return it inside `anyhow::Error`; callers recover it with
/// `downcast_ref`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0} already taken")]
pub struct DuplicateUser(pub UniqueField);

/// Persistence collaborator for the credential flows
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user whose email or username equals `identifier`
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;

    async fn create(&self, user: NewUser) -> Result<UserRecord>;

    async fn exists_by_field(&self, field: UniqueField, value: &str) -> Result<bool>;

    /// Cheap liveness probe used by the readiness endpoint
    async fn health_check(&self) -> Result<()>;
}
