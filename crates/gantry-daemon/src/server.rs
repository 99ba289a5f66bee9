//! HTTPS API server setup and routing

use anyhow::{bail, Context, Result};
use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::{any, get},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use crate::api;
use crate::auth::{self, BasicAuth};
use crate::config::ApiConfig;
use crate::master::Master;
use crate::sse;

/// Grace period given to open requests and event streams on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct ApiServer {
    master: Arc<Master>,
    config: ApiConfig,
}

impl ApiServer {
    pub fn new(master: Arc<Master>, config: ApiConfig) -> Self {
        Self { master, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Build the REST and event-stream routes with auth and CORS layers applied
    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/robots", get(api::list_robots))
            .route("/robots/{robot}", get(api::get_robot))
            .route("/robots/{robot}/commands", get(api::robot_commands))
            .route("/robots/{robot}/commands/{command}", any(api::robot_command))
            .route("/robots/{robot}/devices", get(api::list_devices))
            .route("/robots/{robot}/devices/{device}", get(api::get_device))
            .route(
                "/robots/{robot}/devices/{device}/events/{event}",
                get(sse::device_events),
            )
            .route("/robots/{robot}/devices/{device}/commands", get(api::device_commands))
            .route(
                "/robots/{robot}/devices/{device}/commands/{command}",
                any(api::device_command),
            )
            .route("/robots/{robot}/connections", get(api::list_connections))
            .route("/robots/{robot}/connections/{connection}", get(api::get_connection))
            .route(
                "/robots/{robot}/connections/{connection}/commands/{command}",
                any(api::connection_command),
            )
            .fallback(api::not_found)
            .with_state(Arc::clone(&self.master));

        if let Some(credentials) = self.config.basic_auth() {
            info!(user = %credentials.user, "Basic authentication enabled");
            let state = Arc::new(BasicAuth::new(&credentials.user, &credentials.pass));
            app = app.layer(middleware::from_fn_with_state(state, auth::require_basic_auth));
        }

        app.layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.cors_origin(),
        ))
    }

    fn cors_origin(&self) -> HeaderValue {
        let origin = self.config.cors_origin();
        HeaderValue::from_str(origin).unwrap_or_else(|_| {
            warn!(origin, "Invalid CORS origin, allowing any");
            HeaderValue::from_static("*")
        })
    }

    /// Load TLS material, bind and serve in the background.
    ///
    /// Resolves once the listener is bound.
    pub async fn listen(self) -> Result<ApiHandle> {
        let (cert_path, key_path) = match (&self.config.cert, &self.config.key) {
            (Some(cert), Some(key)) => (cert.clone(), key.clone()),
            _ => bail!("TLS certificate and key are required to serve the API (set api.cert and api.key)"),
        };

        // Verify files exist
        if !cert_path.exists() {
            bail!("TLS certificate file not found: {}", cert_path.display());
        }
        if !key_path.exists() {
            bail!("TLS key file not found: {}", key_path.display());
        }

        let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .context("Failed to load TLS certificate and key")?;

        let bind = format!("{}:{}", self.config.host, self.config.port);
        let addr = tokio::net::lookup_host(&bind)
            .await
            .with_context(|| format!("Failed to resolve API address {}", bind))?
            .next()
            .with_context(|| format!("No address found for {}", bind))?;

        let app = self.router();
        let handle = axum_server::Handle::new();
        let server = axum_server::bind_rustls(addr, rustls_config).handle(handle.clone());
        let task = tokio::spawn(async move { server.serve(app.into_make_service()).await });

        let Some(bound) = handle.listening().await else {
            task.await??;
            bail!("API server stopped before it started listening");
        };

        info!(cert = %cert_path.display(), "Gantry API Server is now online");
        info!("Listening at https://{}", bound);

        Ok(ApiHandle {
            addr: bound,
            handle,
            task,
        })
    }
}

/// A running API server
pub struct ApiHandle {
    addr: SocketAddr,
    handle: axum_server::Handle,
    task: JoinHandle<io::Result<()>>,
}

impl ApiHandle {
    /// The address actually bound, with any `:0` port resolved
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the server task to finish
    pub async fn shutdown(self) {
        info!(addr = %self.addr, "Shutting down API server");
        self.handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
            Err(e) => warn!(error = %e, "API server task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use gantry_core::{DeviceSpec, ProviderRegistry, RobotConfig, RobotEnv, SequentialIds};
    use tower::ServiceExt;

    fn master() -> Arc<Master> {
        let master =
            Master::with_env(RobotEnv::new(ProviderRegistry::with_builtins(), SequentialIds::new()));
        master
            .robot(RobotConfig::named("Ultron").device(DeviceSpec::new("ping", "ping")))
            .unwrap();
        master
    }

    #[tokio::test]
    async fn test_default_headers() {
        let server = ApiServer::new(master(), ApiConfig::default());
        let response = server
            .router()
            .oneshot(Request::get("/robots").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_configured_cors_origin() {
        let config = ApiConfig {
            cors: Some("https://dash.example.com".to_string()),
            ..Default::default()
        };
        let response = ApiServer::new(master(), config)
            .router()
            .oneshot(Request::get("/robots/Ultron").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://dash.example.com"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_json() {
        let response = ApiServer::new(master(), ApiConfig::default())
            .router()
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("/nowhere"));
    }

    #[tokio::test]
    async fn test_auth_failure_keeps_cors_headers() {
        let config = ApiConfig {
            auth: Some(AuthConfig::basic("admin", "secret")),
            ..Default::default()
        };
        let response = ApiServer::new(master(), config)
            .router()
            .oneshot(Request::get("/robots").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_listen_requires_tls_material() {
        let err = ApiServer::new(master(), ApiConfig::default()).listen().await.err().unwrap();
        assert!(err.to_string().contains("TLS certificate and key are required"));
    }

    #[tokio::test]
    async fn test_listen_reports_missing_cert_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ApiConfig {
            cert: Some(dir.path().join("cert.pem")),
            key: Some(dir.path().join("key.pem")),
            ..Default::default()
        };
        let err = ApiServer::new(master(), config).listen().await.err().unwrap();
        assert!(err.to_string().starts_with("TLS certificate file not found"));
    }
}
