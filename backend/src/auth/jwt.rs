//! JWT token generation and validation
//!
//! Provides access and refresh token management with pre-computed keys.
//! Tokens are HS256 compact JWS strings carrying a flat claim map; nothing is
//! stored server-side, so validity is purely signature plus `exp`.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// The only accepted signing algorithm
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Token errors
///
/// Variants identify the failure for logging and tests; callers facing
/// clients collapse all of them into one generic message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token service misconfigured: {0}")]
    Configuration(&'static str),

    #[error("unexpected signing algorithm")]
    Algorithm,

    #[error("signature verification failed")]
    Signature,

    #[error("token expired")]
    Expired,

    #[error("missing claim: {0}")]
    MissingClaim(&'static str),

    #[error("malformed token")]
    Malformed,

    #[error("token revoked")]
    Revoked,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// JWT claims
///
/// Access tokens carry `username` and `email`; refresh tokens only the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique token id, the handle a revocation list would key on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    fn from_map(map: &Map<String, Value>) -> Result<Self, TokenError> {
        let user_id = map
            .get("user_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingClaim("user_id"))?;
        let exp = map
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(TokenError::MissingClaim("exp"))?;
        let iat = map
            .get("iat")
            .and_then(Value::as_i64)
            .ok_or(TokenError::MissingClaim("iat"))?;
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            user_id: user_id.to_string(),
            username: text("username"),
            email: text("email"),
            exp,
            iat,
            jti: text("jti"),
        })
    }
}

/// Access and refresh token issued together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Extension point for server-side revocation
///
/// No implementation ships by default; without one every correctly signed,
/// unexpired token is accepted.
pub trait RevocationCheck: Send + Sync {
    fn is_revoked(&self, claims: &TokenClaims) -> bool;
}

/// Pre-computed JWT keys for efficient token operations
/// These are expensive to create, so we cache them in AppState
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl JwtKeys {
    fn new(secret: &str) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

/// Issues and verifies HS256 tokens
///
/// Keys are derived once at startup; clones share them.
#[derive(Clone)]
pub struct TokenService {
    keys: JwtKeys,
    validation: Arc<Validation>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revocation: Option<Arc<dyn RevocationCheck>>,
}

impl TokenService {
    /// Create a token service, refusing an empty secret or non-positive lifetimes
    pub fn new(
        secret: &str,
        access_token_expiry_secs: i64,
        refresh_token_expiry_secs: i64,
    ) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::Configuration("signing secret is empty"));
        }
        if access_token_expiry_secs <= 0 || refresh_token_expiry_secs <= 0 {
            return Err(TokenError::Configuration("token lifetimes must be positive"));
        }

        // Expiry is checked by hand against the caller's clock, with no leeway
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            keys: JwtKeys::new(secret),
            validation: Arc::new(validation),
            access_ttl: Duration::seconds(access_token_expiry_secs),
            refresh_ttl: Duration::seconds(refresh_token_expiry_secs),
            revocation: None,
        })
    }

    /// Install a revocation hook consulted on every verification
    pub fn with_revocation(mut self, check: Arc<dyn RevocationCheck>) -> Self {
        self.revocation = Some(check);
        self
    }

    /// Access token lifetime in seconds
    #[inline]
    pub fn access_token_expiry_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Refresh token lifetime in seconds
    #[inline]
    pub fn refresh_token_expiry_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Generate an access token for a user
    pub fn issue_access_token(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            jti: Some(Uuid::new_v4().to_string()),
        };
        self.sign(&claims)
    }

    /// Generate a refresh token for a user
    pub fn issue_refresh_token(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            username: None,
            email: None,
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
            jti: Some(Uuid::new_v4().to_string()),
        };
        self.sign(&claims)
    }

    /// Generate an access/refresh pair sharing one issue time
    pub fn issue_pair(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, username, email, now)?,
            refresh_token: self.issue_refresh_token(user_id, now)?,
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate a token against the current time
    #[inline]
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Validate a token as of `now`
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        // Pin the algorithm before any key material is touched
        check_header_algorithm(token)?;

        let data = decode::<Map<String, Value>>(token, &self.keys.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::Signature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::Algorithm
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        let claims = TokenClaims::from_map(&data.claims)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        if let Some(check) = &self.revocation {
            if check.is_revoked(&claims) {
                return Err(TokenError::Revoked);
            }
        }

        Ok(claims)
    }
}

fn check_header_algorithm(token: &str) -> Result<(), TokenError> {
    let header_segment = token.split('.').next().ok_or(TokenError::Malformed)?;
    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_segment)
        .map_err(|_| TokenError::Malformed)?;
    let header: Map<String, Value> =
        serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;

    match header.get("alg").and_then(Value::as_str) {
        Some("HS256") => Ok(()),
        _ => Err(TokenError::Algorithm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "test-secret-key-for-testing-only-32chars";

    fn create_test_service() -> TokenService {
        TokenService::new(SECRET, 900, 30 * 24 * 3600).unwrap()
    }

    fn user_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn b64(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let service = create_test_service();
        let id = user_id();

        let token = service
            .issue_access_token(&id, "@abc", "a@b.com", Utc::now())
            .unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.user_id, id);
        assert_eq!(claims.username.as_deref(), Some("@abc"));
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_refresh_token_carries_only_user_id() {
        let service = create_test_service();
        let id = user_id();

        let token = service.issue_refresh_token(&id, Utc::now()).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.user_id, id);
        assert!(claims.username.is_none());
        assert!(claims.email.is_none());
        assert!(claims.jti.is_some());
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 3600);
    }

    #[test]
    fn test_expiry_boundaries() {
        let service = create_test_service();
        let now = Utc::now();
        let token = service
            .issue_access_token(&user_id(), "@abc", "a@b.com", now)
            .unwrap();

        assert!(service.verify_at(&token, now + Duration::minutes(14)).is_ok());
        assert_eq!(
            service.verify_at(&token, now + Duration::minutes(16)),
            Err(TokenError::Expired)
        );
        assert_eq!(
            service.verify_at(&token, now + Duration::minutes(15)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_expiry_truncated_to_seconds() {
        let service = create_test_service();
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00.999Z")
            .unwrap()
            .with_timezone(&Utc);
        let token = service.issue_refresh_token(&user_id(), now).unwrap();
        let claims = service.verify_at(&token, now).unwrap();

        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 30 * 24 * 3600);
    }

    #[test]
    fn test_pair_tokens_are_distinct() {
        let service = create_test_service();
        let now = Utc::now();
        let id = user_id();
        let first = service.issue_pair(&id, "@abc", "a@b.com", now).unwrap();
        let second = service.issue_pair(&id, "@abc", "a@b.com", now).unwrap();

        assert_ne!(first.access_token, first.refresh_token);
        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = create_test_service();
        let other = TokenService::new("wrong-secret-key", 900, 3600).unwrap();
        let token = other
            .issue_access_token(&user_id(), "@abc", "a@b.com", Utc::now())
            .unwrap();

        assert_eq!(service.verify(&token), Err(TokenError::Signature));
    }

    #[test]
    fn test_alg_none_rejected() {
        let service = create_test_service();
        let now = Utc::now().timestamp();
        let header = b64(&serde_json::json!({ "alg": "none", "typ": "JWT" }));
        let claims = b64(&serde_json::json!({
            "user_id": user_id(), "exp": now + 600, "iat": now
        }));

        for token in [
            format!("{}.{}.", header, claims),
            format!("{}.{}", header, claims),
        ] {
            assert_eq!(service.verify(&token), Err(TokenError::Algorithm));
        }
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let service = create_test_service();
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({ "user_id": user_id(), "exp": now + 600, "iat": now });
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(service.verify(&token), Err(TokenError::Algorithm));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let service = create_test_service();
        let token = service
            .issue_access_token(&user_id(), "@abc", "a@b.com", Utc::now())
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let now = Utc::now().timestamp();
        let forged = b64(&serde_json::json!({
            "user_id": user_id(), "username": "@admin", "exp": now + 600, "iat": now
        }));
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert_eq!(service.verify(&tampered), Err(TokenError::Signature));
    }

    #[test]
    fn test_missing_user_id_rejected() {
        let service = create_test_service();
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({ "exp": now + 600, "iat": now });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(service.verify(&token), Err(TokenError::MissingClaim("user_id")));
    }

    #[test]
    fn test_missing_exp_rejected() {
        let service = create_test_service();
        let claims = serde_json::json!({ "user_id": user_id(), "iat": Utc::now().timestamp() });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(service.verify(&token), Err(TokenError::MissingClaim("exp")));
    }

    #[test]
    fn test_garbage_rejected() {
        let service = create_test_service();
        for token in ["", "invalid", "invalid.token.here", "a.b.c.d"] {
            assert!(service.verify(token).is_err(), "accepted {:?}", token);
        }
    }

    #[test]
    fn test_empty_secret_is_configuration_error() {
        assert!(matches!(
            TokenService::new("", 900, 3600),
            Err(TokenError::Configuration(_))
        ));
        assert!(matches!(
            TokenService::new("   ", 900, 3600),
            Err(TokenError::Configuration(_))
        ));
        assert!(matches!(
            TokenService::new(SECRET, 0, 3600),
            Err(TokenError::Configuration(_))
        ));
    }

    #[test]
    fn test_revocation_hook() {
        struct DenyAll;
        impl RevocationCheck for DenyAll {
            fn is_revoked(&self, _claims: &TokenClaims) -> bool {
                true
            }
        }

        let service = create_test_service();
        let token = service.issue_refresh_token(&user_id(), Utc::now()).unwrap();
        assert!(service.verify(&token).is_ok());

        let revoking = service.clone().with_revocation(Arc::new(DenyAll));
        assert_eq!(revoking.verify(&token), Err(TokenError::Revoked));
    }

    #[test]
    fn test_service_is_clone_cheap() {
        let service = create_test_service();
        let cloned = service.clone();
        let token = service.issue_refresh_token(&user_id(), Utc::now()).unwrap();
        assert!(cloned.verify(&token).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_random_strings_never_verify(token in "[A-Za-z0-9_.-]{0,120}") {
            let service = create_test_service();
            prop_assert!(service.verify(&token).is_err());
        }
    }
}
