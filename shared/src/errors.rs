//! Error kinds for the LiveCode API
//!
//! These are the client-facing failure kinds. Each carries a fixed,
//! non-enumerating message; the snake_case name is serialized as `kind`
//! so clients can branch without parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-fault kinds surfaced by the authentication endpoints
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token.")]
    InvalidRefreshToken,

    #[error("Invalid or expired token.")]
    InvalidToken,

    #[error("Authorization header required.")]
    MissingToken,

    #[error("Invalid authorization format. Expected 'Bearer <token>'.")]
    MalformedAuthorization,

    #[error("Too many requests. Please try again later.")]
    RateLimited,

    #[error("Account could not be created.")]
    DuplicateField,

    #[error("Validation failed")]
    Validation,
}

impl AuthError {
    /// Stable machine-readable name, identical to the serialized form
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidRefreshToken => "invalid_refresh_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedAuthorization => "malformed_authorization",
            AuthError::RateLimited => "rate_limited",
            AuthError::DuplicateField => "duplicate_field",
            AuthError::Validation => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_serde_name() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::InvalidRefreshToken,
            AuthError::InvalidToken,
            AuthError::MissingToken,
            AuthError::MalformedAuthorization,
            AuthError::RateLimited,
            AuthError::DuplicateField,
            AuthError::Validation,
        ] {
            let json = serde_json::to_string(&err).unwrap();
            assert_eq!(json, format!("\"{}\"", err.kind()));
        }
    }

    #[test]
    fn test_messages_do_not_leak_cause() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials.");
        assert_eq!(
            AuthError::InvalidRefreshToken.to_string(),
            "Invalid or expired refresh token."
        );
    }
}
