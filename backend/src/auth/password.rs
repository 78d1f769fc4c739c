//! Password hashing using argon2id
//!
//! Records are stored in the self-describing form
//! `$argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>` (base64, no padding), so a
//! record keeps verifying after the process-wide cost parameters are tuned.
//!
//! # Performance Considerations
//!
//! Argon2 is intentionally CPU- and memory-intensive. In async contexts use the
//! `*_async` variants, which run on the blocking thread pool.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        Output,
    },
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Algorithm tag written into every record
pub const ALGORITHM_TAG: &str = "argon2id";
pub const SALT_LEN: usize = 16;
pub const HASH_LEN: usize = 32;

/// Only argon2 version 0x13 records are accepted
pub const RECORD_VERSION: u32 = 19;

const MIN_SALT_LEN: usize = 8;
const MAX_SALT_LEN: usize = 64;

/// Password hashing errors
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("random source failure: {0}")]
    Entropy(String),

    #[error("malformed password record: {0}")]
    MalformedRecord(&'static str),

    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),

    #[error("hashing failed: {0}")]
    Hashing(String),

    #[error("hashing task failed: {0}")]
    Join(String),
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParams {
    /// Working memory in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl HashParams {
    fn argon2(&self, output_len: usize) -> Result<Argon2<'static>, argon2::Error> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(output_len),
        )?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Check the parameters are usable; called once at startup
    pub fn validate(&self) -> Result<(), PasswordError> {
        self.argon2(HASH_LEN)
            .map(|_| ())
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }
}

/// A parsed password record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    pub version: u32,
    pub params: HashParams,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl PasswordRecord {
    pub fn algorithm(&self) -> &'static str {
        ALGORITHM_TAG
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }
}

impl fmt::Display for PasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}$v={}$m={},t={},p={}${}${}",
            ALGORITHM_TAG,
            self.version,
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            STANDARD_NO_PAD.encode(&self.salt),
            STANDARD_NO_PAD.encode(&self.hash),
        )
    }
}

fn parse_kv(part: Option<&str>, key: &str) -> Result<u32, PasswordError> {
    part.and_then(|kv| kv.strip_prefix(key))
        .and_then(|v| v.strip_prefix('='))
        .and_then(|v| v.parse().ok())
        .ok_or(PasswordError::MalformedRecord("cost parameters"))
}

impl FromStr for PasswordRecord {
    type Err = PasswordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Leading '$' yields an empty first part
        let parts: Vec<&str> = s.split('$').collect();
        if parts.len() != 6 || !parts[0].is_empty() {
            return Err(PasswordError::MalformedRecord("field count"));
        }

        if parts[1] != ALGORITHM_TAG {
            return Err(PasswordError::MalformedRecord("algorithm tag"));
        }

        let version = parse_kv(Some(parts[2]), "v")
            .map_err(|_| PasswordError::MalformedRecord("version"))?;
        if version != RECORD_VERSION {
            return Err(PasswordError::MalformedRecord("version"));
        }

        let mut costs = parts[3].split(',');
        let params = HashParams {
            memory_kib: parse_kv(costs.next(), "m")?,
            iterations: parse_kv(costs.next(), "t")?,
            parallelism: parse_kv(costs.next(), "p")?,
        };
        if costs.next().is_some() {
            return Err(PasswordError::MalformedRecord("cost parameters"));
        }

        let salt = STANDARD_NO_PAD
            .decode(parts[4])
            .map_err(|_| PasswordError::MalformedRecord("salt encoding"))?;
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&salt.len()) {
            return Err(PasswordError::MalformedRecord("salt length"));
        }

        let hash = STANDARD_NO_PAD
            .decode(parts[5])
            .map_err(|_| PasswordError::MalformedRecord("hash encoding"))?;
        if !(Output::MIN_LENGTH..=Output::MAX_LENGTH).contains(&hash.len()) {
            return Err(PasswordError::MalformedRecord("hash length"));
        }

        Ok(Self {
            version,
            params,
            salt,
            hash,
        })
    }
}

/// Password hashing service
///
/// Holds the process-wide cost parameters. Cloning is cheap; the decoy
/// record is built once at construction and shared behind an `Arc`.
#[derive(Clone)]
pub struct PasswordHasher {
    params: HashParams,
    decoy: Arc<PasswordRecord>,
}

fn hash_with(
    params: &HashParams,
    password: &SecretString,
) -> Result<PasswordRecord, PasswordError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| PasswordError::Entropy(e.to_string()))?;

    let mut hash = vec![0u8; HASH_LEN];
    params
        .argon2(HASH_LEN)
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?
        .hash_password_into(password.expose_secret().as_bytes(), &salt, &mut hash)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    Ok(PasswordRecord {
        version: Version::V0x13 as u32,
        params: *params,
        salt,
        hash,
    })
}

impl PasswordHasher {
    /// Validate the parameters and build the decoy record (blocking operation)
    ///
    /// The decoy is hashed here so no login ever pays for building it.
    pub fn new(params: HashParams) -> Result<Self, PasswordError> {
        params.validate()?;
        let decoy = hash_with(&params, &SecretString::new("decoy-password".to_string()))?;
        Ok(Self {
            params,
            decoy: Arc::new(decoy),
        })
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Hash a password with a fresh random salt (blocking operation)
    pub fn hash(&self, password: &SecretString) -> Result<PasswordRecord, PasswordError> {
        hash_with(&self.params, password)
    }

    /// Verify a password against a record using the record's own parameters
    ///
    /// The digest comparison goes through `password_hash::Output`, whose
    /// equality is constant-time.
    pub fn verify(
        &self,
        password: &SecretString,
        record: &PasswordRecord,
    ) -> Result<bool, PasswordError> {
        let argon2 = record
            .params
            .argon2(record.hash.len())
            .map_err(|_| PasswordError::MalformedRecord("cost parameters"))?;

        let mut computed = vec![0u8; record.hash.len()];
        argon2
            .hash_password_into(password.expose_secret().as_bytes(), &record.salt, &mut computed)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        let expected = Output::new(&record.hash)
            .map_err(|_| PasswordError::MalformedRecord("hash length"))?;
        let computed =
            Output::new(&computed).map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(expected == computed)
    }

    /// Parse and verify a stored record string
    pub fn verify_encoded(
        &self,
        password: &SecretString,
        encoded: &str,
    ) -> Result<bool, PasswordError> {
        let record: PasswordRecord = encoded.parse()?;
        self.verify(password, &record)
    }

    /// Like `verify_encoded`, but any failure counts as "not this password"
    pub fn matches(&self, password: &SecretString, encoded: &str) -> bool {
        match self.verify_encoded(password, encoded) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Password record could not be verified");
                false
            }
        }
    }

    /// Spend the same work as a real verification, then report no match
    ///
    /// Used when a login names an unknown account so the miss is not
    /// distinguishable by latency.
    pub fn verify_decoy(&self, password: &SecretString) -> Result<bool, PasswordError> {
        self.verify(password, &self.decoy)?;
        Ok(false)
    }

    /// Hash a password on the blocking thread pool
    pub async fn hash_async(&self, password: SecretString) -> Result<PasswordRecord, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Join(e.to_string()))?
    }

    /// Verify a stored record string on the blocking thread pool
    pub async fn verify_async(
        &self,
        password: SecretString,
        encoded: String,
    ) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_encoded(&password, &encoded))
            .await
            .map_err(|e| PasswordError::Join(e.to_string()))?
    }

    /// Run `verify_decoy` on the blocking thread pool
    pub async fn verify_decoy_async(&self, password: SecretString) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_decoy(&password))
            .await
            .map_err(|e| PasswordError::Join(e.to_string()))?
    }
}
