//! Axum middleware applying a `RateLimiter` per client IP

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use livecode_shared::AuthError;
use tracing::warn;

use super::RateLimiter;
use crate::error::ApiError;

/// Middleware state: the limiter to apply and how to find the caller
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    limiter: RateLimiter,
    trust_proxy_headers: bool,
}

impl RateLimitGuard {
    pub fn new(limiter: RateLimiter, trust_proxy_headers: bool) -> Self {
        Self {
            limiter,
            trust_proxy_headers,
        }
    }
}

/// Derive the limiter key for a request
///
/// The first `X-Forwarded-For` hop is only honoured behind a trusted proxy;
/// otherwise the peer address is used. Requests without connection info
/// (in-process tests) share the `unknown` bucket.
pub fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject the request with 429 when the caller's bucket is empty
pub async fn limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&request, guard.trust_proxy_headers);

    if !guard.limiter.allow(&key) {
        metrics::counter!("rate_limit_rejections_total", "limiter" => guard.limiter.name())
            .increment(1);
        warn!(
            limiter = guard.limiter.name(),
            client = %key,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        return Err(ApiError::Auth(AuthError::RateLimited));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(capacity: f64, trust_proxy_headers: bool) -> Router {
        let limiter = RateLimiter::new(capacity, 0.0).unwrap().named("test");
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                RateLimitGuard::new(limiter, trust_proxy_headers),
                limit,
            ))
    }

    fn request(forwarded_for: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_after_capacity() {
        let app = app(2.0, false);

        for _ in 0..2 {
            let response = app.clone().oneshot(request(None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["kind"], "rate_limited");
    }

    #[tokio::test]
    async fn test_forwarded_for_honoured_only_when_trusted() {
        let trusted = app(1.0, true);
        let ok = trusted.clone().oneshot(request(Some("198.51.100.1"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let other = trusted
            .clone()
            .oneshot(request(Some("198.51.100.2, 10.0.0.1")))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);

        let untrusted = app(1.0, false);
        let first = untrusted.clone().oneshot(request(Some("198.51.100.1"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let spoofed = untrusted.oneshot(request(Some("198.51.100.2"))).await.unwrap();
        assert_eq!(spoofed.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_client_key_from_connect_info() {
        let mut req = request(Some("198.51.100.9"));
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5555))));

        assert_eq!(client_key(&req, false), "192.0.2.4");
        assert_eq!(client_key(&req, true), "198.51.100.9");
    }
}
