//! Postgres-backed user store

use anyhow::Result;
use async_trait::async_trait;
use livecode_shared::UniqueField;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DuplicateUser, NewUser, UserRecord, UserStore};
use crate::db;

/// User store on a Postgres pool
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique-constraint violation onto the field it guards
fn duplicate_field(err: &sqlx::Error) -> Option<UniqueField> {
    let db_err = err.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }
    match db_err.constraint() {
        Some("users_email_key") => Some(UniqueField::Email),
        Some("users_username_key") => Some(UniqueField::Username),
        _ => None,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1 OR username = $1
            LIMIT 1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord> {
        let result = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(e) => match duplicate_field(&e) {
                Some(field) => Err(DuplicateUser(field).into()),
                None => Err(e.into()),
            },
        }
    }

    async fn exists_by_field(&self, field: UniqueField, value: &str) -> Result<bool> {
        // Column names are never interpolated from input
        let query = match field {
            UniqueField::Email => "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
            UniqueField::Username => "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
        };

        let exists = sqlx::query_scalar::<_, bool>(query)
            .bind(value)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn health_check(&self) -> Result<()> {
        db::health_check(&self.pool).await
    }
}
