//! Axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use certchain_node::CertificateService;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::handlers;
use crate::RpcError;

/// Shared state handed to every handler.
pub struct AppState {
    pub service: Arc<CertificateService>,
}

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub bind: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser.
    pub cors_origins: Vec<String>,
    pub enable_metrics: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
            cors_origins: vec!["http://localhost:2206".into()],
            enable_metrics: true,
        }
    }
}

pub struct RpcServer {
    config: RpcConfig,
    state: Arc<AppState>,
}

impl RpcServer {
    pub fn new(config: RpcConfig, service: Arc<CertificateService>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { service }),
        }
    }

    /// Build the router with every route and the CORS layer.
    pub fn router(&self) -> Result<Router, RpcError> {
        let mut router = Router::new()
            .route("/api/issue-certificate", post(handlers::issue_certificate))
            .route("/api/revoke-certificate", post(handlers::revoke_certificate))
            .route(
                "/api/verify-certificate/:id",
                get(handlers::verify_certificate),
            )
            .route("/api/events", get(handlers::list_events))
            .route("/api/certificates", get(handlers::list_certificates))
            .route(
                "/api/admins",
                get(handlers::list_admins).post(handlers::add_admin),
            )
            .route("/api/admins/:address", delete(handlers::remove_admin))
            .route("/api/transactions/:hash", get(handlers::transaction_status))
            .route("/health", get(handlers::health));
        if self.config.enable_metrics {
            router = router.route("/metrics", get(handlers::metrics));
        }
        Ok(router
            .layer(self.cors_layer()?)
            .with_state(self.state.clone()))
    }

    fn cors_layer(&self) -> Result<CorsLayer, RpcError> {
        let origins = self
            .config
            .cors_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|e| RpcError::Server(format!("CORS origin {o:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE]))
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), RpcError> {
        let router = self.router()?;
        let (bind, port) = (self.config.bind.as_str(), self.config.port);
        let listener = tokio::net::TcpListener::bind((bind, port))
            .await
            .map_err(|e| RpcError::Server(format!("bind {bind}:{port}: {e}")))?;
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(?addr, "HTTP API listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
