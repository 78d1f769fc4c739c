//! LiveCode Backend Library
//!
//! Credential lifecycle for the LiveCode API: argon2id password records,
//! HS256 access/refresh tokens, token-bucket rate limiting and the HTTP
//! surface around them. Exposed as a library for tests and other crates.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod rate_limit;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
