//! Input validation functions
//!
//! Single-field validators return the first problem they find; the request
//! validators collect every problem across fields so a client sees them all
//! in one response.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::types::{FieldError, LoginRequest, RegisterRequest};

pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_USERNAME_LEN: usize = 17;
pub const MIN_PASSWORD_LEN: usize = 8;
/// Upper bound on password bytes accepted by login and registration
pub const MAX_PASSWORD_LEN: usize = 72;
pub const MAX_IDENTIFIER_LEN: usize = 255;
pub const MAX_REFRESH_TOKEN_LEN: usize = 500;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@[a-z0-9]{3,16}$").expect("username pattern compiles"));

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email cannot be empty".to_string());
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err("Email must not exceed 255 characters".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Validate username format: `@` followed by 3-16 lowercase letters or digits
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.len() > MAX_USERNAME_LEN {
        return Err("Username must not exceed 17 characters".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must start with @ and contain 3-16 lowercase letters or digits".to_string(),
        );
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err("Password must not exceed 72 characters".to_string());
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());

    if !(has_lower && has_upper && has_digit && has_special) {
        return Err(
            "Password must include lowercase, uppercase, number and special character".to_string(),
        );
    }
    Ok(())
}

fn contains_null_bytes(values: &[&str]) -> bool {
    values.iter().any(|v| v.contains('\0'))
}

/// Validate a registration request, reporting every failing field
pub fn validate_register_request(req: &RegisterRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if let Err(msg) = validate_email(&req.email) {
        errors.push(FieldError::new("email", msg));
    }
    if let Err(msg) = validate_username(&req.username) {
        errors.push(FieldError::new("username", msg));
    }
    if let Err(msg) = validate_password(&req.password) {
        errors.push(FieldError::new("password", msg));
    }
    if contains_null_bytes(&[&req.email, &req.username, &req.password]) {
        errors.push(FieldError::new("general", "Invalid characters detected"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a login request
///
/// Only presence and length are checked; format is deliberately not, so a
/// malformed identifier takes the same path as an unknown one.
pub fn validate_login_request(req: &LoginRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if req.identifier.is_empty() {
        errors.push(FieldError::new("identifier", "Email or username is required"));
    } else if req.identifier.len() > MAX_IDENTIFIER_LEN {
        errors.push(FieldError::new(
            "identifier",
            "Email or username must not exceed 255 characters",
        ));
    }

    if req.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    } else if req.password.len() > MAX_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            "Password must not exceed 72 characters",
        ));
    }

    if contains_null_bytes(&[&req.identifier, &req.password]) {
        errors.push(FieldError::new("general", "Invalid characters detected"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the shape of a refresh token before any cryptographic work
pub fn validate_refresh_token(token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("Refresh token is required.".to_string());
    }
    if token.len() > MAX_REFRESH_TOKEN_LEN {
        return Err("Invalid refresh token format.".to_string());
    }
    Ok(())
}
