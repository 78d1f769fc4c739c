//! Route definitions for the LiveCode API
//!
//! This module organizes all API routes and applies middleware.

use crate::rate_limit;
use crate::state::AppState;
use crate::telemetry;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

mod auth;
mod health;
mod profile;

#[cfg(test)]
mod auth_tests;

pub use auth::auth_routes;
pub use profile::profile_routes;

/// Credential payloads are tiny; anything larger is not a real client
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Create the main application router with all middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(render_metrics))
        .nest("/api/v1", api_routes(&state))
        // Apply middleware layers
        .layer(middleware::from_fn(telemetry::track_metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API v1 routes, all behind the general limiter
fn api_routes(state: &AppState) -> Router<AppState> {
    let general_limit = middleware::from_fn_with_state(
        state.limiters.guard(&state.limiters.general),
        rate_limit::limit,
    );

    Router::new()
        .route("/", get(|| async { "LiveCode API v1" }))
        .nest("/auth", auth::auth_routes(state))
        .nest("/profile", profile::profile_routes())
        .layer(general_limit)
}

/// Prometheus exposition; 404 when the recorder is not installed
async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
