//! Profile of the authenticated caller

use crate::auth::AuthUser;
use crate::state::AppState;
use axum::{routing::get, Json, Router};
use livecode_shared::{ProfileResponse, UserData};

/// Create profile routes
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/", get(get_profile))
}

/// GET /api/v1/profile
///
/// Answered from the access token claims alone.
async fn get_profile(auth: AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        success: true,
        message: "Profile retrieved successfully.".to_string(),
        user: UserData {
            id: auth.user_id.to_string(),
            username: auth.username.unwrap_or_default(),
            email: auth.email.unwrap_or_default(),
        },
    })
}
