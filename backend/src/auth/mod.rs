//! Authentication module
//!
//! Argon2id password records, HS256 session tokens and the bearer-token
//! extractor for protected routes.

mod jwt;
mod middleware;
mod password;

pub use jwt::{
    RevocationCheck, TokenClaims, TokenError, TokenPair, TokenService, SIGNING_ALGORITHM,
};
pub use middleware::AuthUser;
pub use password::{HashParams, PasswordError, PasswordHasher, PasswordRecord};
