//! Application state management
//!
//! This module provides the shared application state that is passed
//! to all request handlers via Axum's state extraction.
//!
//! # Design Principles
//!
//! 1. **Pre-compute expensive resources**: token keys and limiters are created once
//! 2. **Cheap cloning**: All fields use Arc or are already Clone-cheap
//! 3. **Immutable after creation**: State is read-only during request handling

use crate::auth::{PasswordHasher, TokenService};
use crate::config::AppConfig;
use crate::rate_limit::RateLimiters;
use crate::repositories::UserStore;
use crate::services::CredentialService;
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
///
/// # Performance
///
/// - `store`: trait object behind an Arc, cloning is O(1)
/// - `config`: Wrapped in Arc, cloning is O(1)
/// - `tokens`: Pre-computed keys wrapped in Arc, cloning is O(1)
/// - `limiters`: bucket maps wrapped in Arc, clones share state
#[derive(Clone)]
pub struct AppState {
    /// User persistence
    pub store: Arc<dyn UserStore>,
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Pre-initialized token service with cached keys
    pub tokens: TokenService,
    pub passwords: PasswordHasher,
    pub credentials: CredentialService,
    pub limiters: RateLimiters,
    /// Present only when the Prometheus recorder was installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state
    ///
    /// Fails on an empty signing secret, unusable hash parameters or
    /// invalid limiter settings, so a bad deployment never binds a port.
    pub fn new(store: Arc<dyn UserStore>, config: AppConfig) -> Result<Self> {
        let tokens = TokenService::new(
            &config.jwt.secret,
            config.jwt.access_token_expiry_secs,
            config.jwt.refresh_token_expiry_secs,
        )
        .context("invalid JWT configuration")?;

        let passwords = PasswordHasher::new(config.password.hash_params())
            .context("invalid password hashing configuration")?;

        let limiters = RateLimiters::from_config(&config.rate_limit)
            .context("invalid rate limit configuration")?;

        let credentials = CredentialService::new(store.clone(), tokens.clone(), passwords.clone());

        Ok(Self {
            store,
            config: Arc::new(config),
            tokens,
            passwords,
            credentials,
            limiters,
            metrics: None,
        })
    }

    /// Attach the handle used to render `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get a reference to the configuration
    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a reference to the token service
    #[inline]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[inline]
    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }
}
