//! Bearer-token authentication
//!
//! # Performance
//!
//! Uses the pre-computed token keys from AppState, so no key derivation
//! happens per request.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::FromRef,
    http::{header::AUTHORIZATION, request::Parts},
};
use livecode_shared::AuthError;
use tracing::debug;
use uuid::Uuid;

/// Authenticated user extracted from an access token
///
/// Username and email come straight from the token claims; no store lookup
/// happens on this path.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::MalformedAuthorization)?;

        let token = bearer_token(header).ok_or(AuthError::MalformedAuthorization)?;

        let claims = app_state.tokens().verify(token).map_err(|e| {
            debug!(reason = %e, "Access token rejected");
            AuthError::InvalidToken
        })?;

        let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            username: claims.username,
            email: claims.email,
        })
    }
}
