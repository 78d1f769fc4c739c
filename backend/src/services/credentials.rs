//! Credential flows: login, registration and access-token refresh
//!
//! Each flow is stateless between requests. Outcomes a client caused are
//! returned as `Ok(..)` variants; `FlowError` is reserved for broken
//! dependencies so callers can never mistake an outage for bad credentials.
//!
//! # Performance
//!
//! Password hashing/verification runs on the blocking thread pool, so one
//! expensive hash never stalls unrelated requests.

use std::sync::Arc;

use chrono::Utc;
use livecode_shared::{FieldError, UniqueField, UserData};
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{PasswordError, PasswordHasher, TokenError, TokenPair, TokenService};
use crate::repositories::{DuplicateUser, NewUser, UserStore};

/// Dependency or configuration failure inside a flow
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("user store failure: {0:#}")]
    Store(anyhow::Error),

    #[error(transparent)]
    Hashing(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Tokens plus the public view of the user they were issued for
#[derive(Debug, Clone)]
pub struct Session {
    pub tokens: TokenPair,
    pub user: UserData,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// Unknown identifier or wrong password; deliberately indistinguishable
    InvalidCredentials,
}

#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    Created(Session),
    /// Every unique field that is already taken
    Conflict(Vec<FieldError>),
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed { access_token: String, user_id: Uuid },
    /// Expired, forged, malformed, or for a user that no longer exists
    Invalid,
}

fn taken(field: UniqueField) -> FieldError {
    FieldError::new(
        field.as_str(),
        format!("This {} is already taken.", field.as_str()),
    )
}

/// Orchestrates the password hasher, token service and user store
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    tokens: TokenService,
    passwords: PasswordHasher,
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenService, passwords: PasswordHasher) -> Self {
        Self {
            store,
            tokens,
            passwords,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Authenticate by email or username
    ///
    /// An unknown identifier still pays for one password verification against
    /// a decoy record, so it costs the same as a wrong password.
    pub async fn login(
        &self,
        identifier: &str,
        password: SecretString,
    ) -> Result<LoginOutcome, FlowError> {
        let user = self
            .store
            .find_by_identifier(identifier)
            .await
            .map_err(FlowError::Store)?;

        let Some(user) = user else {
            self.passwords.verify_decoy_async(password).await?;
            metrics::counter!("auth_login_total", "outcome" => "invalid").increment(1);
            debug!("Login rejected");
            return Ok(LoginOutcome::InvalidCredentials);
        };

        let valid = match self
            .passwords
            .verify_async(password, user.password_hash.clone())
            .await
        {
            Ok(valid) => valid,
            Err(PasswordError::MalformedRecord(reason)) => {
                warn!(user_id = %user.id, reason, "Stored password record is malformed");
                false
            }
            Err(e) => return Err(e.into()),
        };

        if !valid {
            metrics::counter!("auth_login_total", "outcome" => "invalid").increment(1);
            debug!("Login rejected");
            return Ok(LoginOutcome::InvalidCredentials);
        }

        let tokens = self.tokens.issue_pair(
            &user.id.to_string(),
            &user.username,
            &user.email,
            Utc::now(),
        )?;

        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
        info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome::Authenticated(Session {
            tokens,
            user: user.public(),
        }))
    }

    /// Create an account and issue its first token pair
    ///
    /// Email and username availability are both checked before anything is
    /// written, and all conflicts are reported together.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: SecretString,
    ) -> Result<RegisterOutcome, FlowError> {
        let (email_taken, username_taken) = tokio::try_join!(
            self.store.exists_by_field(UniqueField::Email, email),
            self.store.exists_by_field(UniqueField::Username, username),
        )
        .map_err(FlowError::Store)?;

        let mut conflicts = Vec::new();
        if email_taken {
            conflicts.push(taken(UniqueField::Email));
        }
        if username_taken {
            conflicts.push(taken(UniqueField::Username));
        }
        if !conflicts.is_empty() {
            metrics::counter!("auth_register_total", "outcome" => "conflict").increment(1);
            debug!(fields = conflicts.len(), "Registration conflicts");
            return Ok(RegisterOutcome::Conflict(conflicts));
        }

        let record = self.passwords.hash_async(password).await?;

        let created = self
            .store
            .create(NewUser {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: email.to_string(),
                password_hash: record.to_string(),
            })
            .await;

        let user = match created {
            Ok(user) => user,
            // Lost a race with a concurrent registration after the pre-check
            Err(e) => match e.downcast_ref::<DuplicateUser>() {
                Some(DuplicateUser(field)) => {
                    metrics::counter!("auth_register_total", "outcome" => "conflict")
                        .increment(1);
                    return Ok(RegisterOutcome::Conflict(vec![taken(*field)]));
                }
                None => return Err(FlowError::Store(e)),
            },
        };

        let tokens = self.tokens.issue_pair(
            &user.id.to_string(),
            &user.username,
            &user.email,
            Utc::now(),
        )?;

        metrics::counter!("auth_register_total", "outcome" => "success").increment(1);
        info!(user_id = %user.id, "User registered");

        Ok(RegisterOutcome::Created(Session {
            tokens,
            user: user.public(),
        }))
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token itself is not rotated; it stays valid until its own
    /// expiry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, FlowError> {
        let claims = match self.tokens.verify(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                metrics::counter!("auth_refresh_total", "outcome" => "invalid").increment(1);
                debug!(reason = %e, "Refresh token rejected");
                return Ok(RefreshOutcome::Invalid);
            }
        };

        let Ok(user_id) = Uuid::parse_str(&claims.user_id) else {
            metrics::counter!("auth_refresh_total", "outcome" => "invalid").increment(1);
            debug!("Refresh token carries a non-UUID user id");
            return Ok(RefreshOutcome::Invalid);
        };

        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(FlowError::Store)?;

        let Some(user) = user else {
            metrics::counter!("auth_refresh_total", "outcome" => "invalid").increment(1);
            debug!(user_id = %user_id, "Refresh token for missing user");
            return Ok(RefreshOutcome::Invalid);
        };

        let access_token = self.tokens.issue_access_token(
            &user.id.to_string(),
            &user.username,
            &user.email,
            Utc::now(),
        )?;

        metrics::counter!("auth_refresh_total", "outcome" => "success").increment(1);
        debug!(user_id = %user.id, "Access token refreshed");

        Ok(RefreshOutcome::Refreshed {
            access_token,
            user_id: user.id,
        })
    }

    /// Whether `value` is still free for `field`; `None` for unknown fields
    pub async fn check_field(&self, field: &str, value: &str) -> Result<Option<bool>, FlowError> {
        let Ok(field) = field.parse::<UniqueField>() else {
            return Ok(None);
        };

        let exists = self
            .store
            .exists_by_field(field, value)
            .await
            .map_err(FlowError::Store)?;

        Ok(Some(!exists))
    }
}
