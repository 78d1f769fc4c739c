//! Rate limiting
//!
//! Independent token-bucket limiters for general traffic, credential
//! endpoints and the field availability check. Limiters are built once from
//! configuration and handed to the router; there is no global state.

mod limiter;
mod middleware;

pub use limiter::{RateLimitError, RateLimiter};
pub use middleware::{client_key, limit, RateLimitGuard};

use crate::config::RateLimitConfig;

/// The limiters guarding the API
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub general: RateLimiter,
    pub auth: RateLimiter,
    pub check_field: RateLimiter,
    trust_proxy_headers: bool,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let build = |name: &'static str, capacity: f64, refill: f64| {
            let limiter = RateLimiter::new(capacity, refill)?.named(name);
            Ok::<_, RateLimitError>(match config.max_keys {
                0 => limiter,
                max => limiter.with_max_keys(max),
            })
        };

        Ok(Self {
            general: build(
                "general",
                config.general.capacity,
                config.general.refill_per_sec,
            )?,
            auth: build("auth", config.auth.capacity, config.auth.refill_per_sec)?,
            check_field: build(
                "check_field",
                config.check_field.capacity,
                config.check_field.refill_per_sec,
            )?,
            trust_proxy_headers: config.trust_proxy_headers,
        })
    }

    /// Middleware state for one of the limiters
    pub fn guard(&self, limiter: &RateLimiter) -> RateLimitGuard {
        RateLimitGuard::new(limiter.clone(), self.trust_proxy_headers)
    }

    /// Drop idle buckets from every limiter
    pub fn prune_idle(&self) -> usize {
        let now = std::time::Instant::now();
        self.general.prune_idle(now) + self.auth.prune_idle(now) + self.check_field.prune_idle(now)
    }
}
