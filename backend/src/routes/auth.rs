//! Authentication routes
//!
//! Provides endpoints for user registration, login, token refresh and the
//! field availability check.
//!
//! # Performance Optimizations
//!
//! - Uses pre-computed JWT keys from AppState (no per-request allocation)
//! - Password hashing runs on blocking thread pool (doesn't block async runtime)

use crate::error::{ApiError, ApiResult};
use crate::rate_limit;
use crate::services::{LoginOutcome, RefreshOutcome, RegisterOutcome};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use livecode_shared::validation::{
    validate_login_request, validate_refresh_token, validate_register_request,
};
use livecode_shared::{
    AuthError, CheckFieldQuery, FieldAvailability, LoginRequest, LoginResponse,
    RefreshTokenRequest, RefreshTokenResponse, RegisterRequest, RegisterResponse,
};
use secrecy::SecretString;
use tracing::{debug, error};

/// Create auth routes
///
/// Register and login share the strict `auth` limiter; the availability
/// check has its own. Refresh is covered only by the general limiter applied
/// to the whole API.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let limiters = &state.limiters;
    let auth_limit =
        middleware::from_fn_with_state(limiters.guard(&limiters.auth), rate_limit::limit);
    let check_field_limit =
        middleware::from_fn_with_state(limiters.guard(&limiters.check_field), rate_limit::limit);

    Router::new()
        .route("/register", post(register).layer(auth_limit.clone()))
        .route("/login", post(login).layer(auth_limit))
        .route("/refresh", post(refresh_token))
        .route("/check-field", get(check_field).layer(check_field_limit))
}

/// Unwrap a JSON body, answering malformed input with a generic 400
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!(error = %rejection, "Rejected request body");
        ApiError::BadRequest("Invalid request format.".to_string())
    })
}

/// Register a new user
///
/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let req = json_body(payload)?;
    validate_register_request(&req).map_err(ApiError::Validation)?;

    let outcome = state
        .credentials()
        .register(&req.email, &req.username, SecretString::new(req.password))
        .await?;

    match outcome {
        RegisterOutcome::Created(session) => Ok((
            StatusCode::CREATED,
            Json(RegisterResponse {
                success: true,
                message: "Your account has been created successfully.".to_string(),
                field_errors: Vec::new(),
                access_token: Some(session.tokens.access_token),
                refresh_token: Some(session.tokens.refresh_token),
                user: Some(session.user),
            }),
        )),
        RegisterOutcome::Conflict(field_errors) => Err(ApiError::Conflict(field_errors)),
    }
}

/// Login with email or username and password
///
/// POST /api/v1/auth/login
///
/// Unknown identifiers and wrong passwords produce the same response.
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let req = json_body(payload)?;
    validate_login_request(&req).map_err(ApiError::Validation)?;

    let outcome = state
        .credentials()
        .login(&req.identifier, SecretString::new(req.password))
        .await?;

    match outcome {
        LoginOutcome::Authenticated(session) => Ok(Json(LoginResponse {
            success: true,
            message: "Login successful.".to_string(),
            access_token: Some(session.tokens.access_token),
            refresh_token: Some(session.tokens.refresh_token),
            user: Some(session.user),
        })),
        LoginOutcome::InvalidCredentials => Err(AuthError::InvalidCredentials.into()),
    }
}

/// Exchange a refresh token for a new access token
///
/// POST /api/v1/auth/refresh
async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> ApiResult<Json<RefreshTokenResponse>> {
    let req = json_body(payload)?;
    validate_refresh_token(&req.refresh_token).map_err(ApiError::BadRequest)?;

    match state.credentials().refresh(&req.refresh_token).await? {
        RefreshOutcome::Refreshed { access_token, .. } => Ok(Json(RefreshTokenResponse {
            success: true,
            message: "Access token refreshed successfully.".to_string(),
            access_token: Some(access_token),
        })),
        RefreshOutcome::Invalid => Err(AuthError::InvalidRefreshToken.into()),
    }
}

/// Check whether an email or username is still free
///
/// GET /api/v1/auth/check-field?field=email&value=a@b.com
async fn check_field(
    State(state): State<AppState>,
    query: Option<Query<CheckFieldQuery>>,
) -> (StatusCode, Json<FieldAvailability>) {
    let unknown = (
        StatusCode::BAD_REQUEST,
        Json(FieldAvailability { available: None }),
    );

    let Some(Query(query)) = query else {
        return unknown;
    };
    if query.field.is_empty() || query.value.is_empty() {
        return unknown;
    }

    match state.credentials().check_field(&query.field, &query.value).await {
        Ok(Some(available)) => (
            StatusCode::OK,
            Json(FieldAvailability {
                available: Some(available),
            }),
        ),
        Ok(None) => unknown,
        Err(e) => {
            error!(error = %e, "Field availability check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FieldAvailability { available: None }),
            )
        }
    }
}
