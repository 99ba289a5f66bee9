//! HTTP basic authentication middleware
//!
//! Enabled when `[api.auth]` has `type = "basic"` and a non-empty user and
//! password. Every route, including event streams, requires the credentials.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use gantry_core::ErrorBody;
use std::sync::Arc;
use tracing::{debug, warn};

const CHALLENGE: &str = "Basic realm=\"Authorization Required\"";

/// Expected credentials for the API
pub struct BasicAuth {
    user: String,
    pass: String,
}

impl BasicAuth {
    pub fn new(user: &str, pass: &str) -> Self {
        Self {
            user: user.to_string(),
            pass: pass.to_string(),
        }
    }

    /// Check an `Authorization` header value
    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let Some(encoded) = authorization.and_then(|h| h.strip_prefix("Basic ")) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, pass)) => user == self.user && pass == self.pass,
            None => false,
        }
    }
}

/// Reject requests without valid basic credentials
pub async fn require_basic_auth(
    State(auth): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if auth.verify(authorization) {
        return next.run(request).await;
    }

    if authorization.is_some() {
        warn!(path = %request.uri().path(), "Invalid credentials");
    } else {
        debug!(path = %request.uri().path(), "Missing authorization header");
    }
    unauthorized()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE))],
        Json(ErrorBody::new("Unauthorized")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn encode(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    fn app() -> Router {
        let auth = Arc::new(BasicAuth::new("admin", "s3cret:x"));
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(auth, require_basic_auth))
    }

    #[test]
    fn test_verify() {
        let auth = BasicAuth::new("admin", "secret");
        assert!(auth.verify(Some(&encode("admin:secret"))));
        assert!(!auth.verify(Some(&encode("admin:wrong"))));
        assert!(!auth.verify(Some(&encode("admin"))));
        assert!(!auth.verify(Some("Bearer abc")));
        assert!(!auth.verify(Some("Basic !!!")));
        assert!(!auth.verify(None));
    }

    #[tokio::test]
    async fn test_missing_credentials_are_challenged() {
        let response = app()
            .oneshot(http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], CHALLENGE);
    }

    #[tokio::test]
    async fn test_valid_credentials_pass_through() {
        // Only the first colon separates user from password
        let request = http::Request::get("/")
            .header(header::AUTHORIZATION, encode("admin:s3cret:x"))
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
