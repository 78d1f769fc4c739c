//! Router-level tests for the authentication endpoints
//!
//! Requests go through the full middleware stack with an in-memory user
//! store, so no database is needed.

#[cfg(test)]
mod tests {
    use crate::auth::TokenService;
    use crate::config::AppConfig;
    use crate::repositories::InMemoryUserStore;
    use crate::routes::create_router;
    use crate::state::AppState;
    use axum::{
        body::{Body, Bytes},
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        AppState::new(Arc::new(InMemoryUserStore::new()), AppConfig::for_tests()).unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn json_of(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn register_default(app: &Router) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/auth/register",
            Some(json!({"email": "a@b.com", "username": "@abc", "password": "Abcdef1!"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json_of(&body)
    }

    /// Generate random authorization header values that must not authenticate
    fn bad_authorization_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            "[a-zA-Z0-9]{10,50}".prop_map(Some),
            "[a-zA-Z0-9]{10,50}".prop_map(|t| Some(format!("Basic {}", t))),
            "[a-zA-Z0-9_-]{20}\\.[a-zA-Z0-9_-]{20}\\.[a-zA-Z0-9_-]{20}"
                .prop_map(|t| Some(format!("Bearer {}", t))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Property: the profile endpoint never answers without a valid token
        #[test]
        fn prop_unauthenticated_profile_returns_401(
            authorization in bad_authorization_strategy()
        ) {
            tokio_test::block_on(async {
                let app = create_router(create_test_state());

                let mut builder = Request::builder().uri("/api/v1/profile").method("GET");
                if let Some(value) = authorization {
                    builder = builder.header(header::AUTHORIZATION, value);
                }
                let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();

                prop_assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
                Ok(())
            })?;
        }
    }

    #[tokio::test]
    async fn test_register_login_profile() {
        let app = create_router(create_test_state());
        let registered = register_default(&app).await;
        assert_eq!(registered["success"], true);
        assert_eq!(registered["user"]["username"], "@abc");
        assert!(registered.get("password_hash").is_none());

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"identifier": "@abc", "password": "Abcdef1!"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let login = json_of(&body);
        let access = login["access_token"].as_str().unwrap();

        let (status, body) = send(&app, "GET", "/api/v1/profile", None, Some(access)).await;
        assert_eq!(status, StatusCode::OK);
        let profile = json_of(&body);
        assert_eq!(profile["user"]["email"], "a@b.com");
        assert_eq!(profile["user"]["id"], registered["user"]["id"]);
    }

    #[tokio::test]
    async fn test_login_failures_are_byte_identical() {
        let app = create_router(create_test_state());
        register_default(&app).await;

        let (unknown_status, unknown_body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"identifier": "@nobody", "password": "Abcdef1!"})),
            None,
        )
        .await;
        let (wrong_status, wrong_body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"identifier": "@abc", "password": "Wrong123!"})),
            None,
        )
        .await;

        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, wrong_status);
        assert_eq!(unknown_body, wrong_body);
        assert_eq!(json_of(&unknown_body)["message"], "Invalid credentials.");
    }

    #[tokio::test]
    async fn test_duplicate_registration_reports_both_fields() {
        let app = create_router(create_test_state());
        register_default(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            Some(json!({"email": "a@b.com", "username": "@abc", "password": "Abcdef1!"})),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        let json = json_of(&body);
        assert_eq!(json["success"], false);
        let errors = json["field_errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["message"], "This email is already taken.");
        assert_eq!(errors[1]["message"], "This username is already taken.");
    }

    #[tokio::test]
    async fn test_invalid_registration_is_400() {
        let app = create_router(create_test_state());

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            Some(json!({"email": "not-an-email", "username": "abc", "password": "short"})),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<String> = json_of(&body)["field_errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap().to_string())
            .collect();
        assert!(fields.contains(&"email".to_string()));
        assert!(fields.contains(&"username".to_string()));
        assert!(fields.contains(&"password".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let app = create_router(create_test_state());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_endpoint() {
        let app = create_router(create_test_state());
        let registered = register_default(&app).await;
        let refresh = registered["refresh_token"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": refresh})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json = json_of(&body);
        assert!(json["access_token"].is_string());
        assert!(json.get("refresh_token").is_none());

        let (status, _) = send(&app, "POST", "/api/v1/auth/refresh", Some(json!({})), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": "garbage"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json_of(&body)["message"], "Invalid or expired refresh token.");
    }

    #[tokio::test]
    async fn test_check_field() {
        let app = create_router(create_test_state());
        register_default(&app).await;

        let (status, body) = send(
            &app,
            "GET",
            "/api/v1/auth/check-field?field=email&value=a@b.com",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"available": false}));

        let (_, body) = send(
            &app,
            "GET",
            "/api/v1/auth/check-field?field=username&value=@free",
            None,
            None,
        )
        .await;
        assert_eq!(json_of(&body), json!({"available": true}));

        for uri in [
            "/api/v1/auth/check-field",
            "/api/v1/auth/check-field?field=password&value=x",
        ] {
            let (status, body) = send(&app, "GET", uri, None, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json_of(&body), json!({"available": null}));
        }
    }

    #[tokio::test]
    async fn test_auth_limiter_rejects_sixth_attempt() {
        let app = create_router(create_test_state());
        let body = json!({"identifier": "@nobody", "password": "Abcdef1!"});

        for _ in 0..5 {
            let (status, _) = send(&app, "POST", "/api/v1/auth/login", Some(body.clone()), None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, bytes) = send(&app, "POST", "/api/v1/auth/login", Some(body), None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_of(&bytes)["message"],
            "Too many requests. Please try again later."
        );

        // Refresh is not behind the auth limiter
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": "garbage"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_with_wrong_secret_returns_401() {
        let app = create_router(create_test_state());

        let other = TokenService::new("a-completely-different-secret-value", 900, 86400).unwrap();
        let token = other
            .issue_access_token(&uuid::Uuid::new_v4().to_string(), "@abc", "a@b.com", Utc::now())
            .unwrap();

        let (status, _) = send(&app, "GET", "/api/v1/profile", None, Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_metrics_absent_without_recorder() {
        let app = create_router(create_test_state());
        let (status, _) = send(&app, "GET", "/metrics", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
