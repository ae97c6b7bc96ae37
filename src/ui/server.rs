//! Status API server

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::StatusConfig;
use crate::dispatch::SessionRegistry;
use crate::protocol::StreamMode;
use crate::ui::handlers;

/// State shared with the handlers
pub struct AppState {
    pub registry: SessionRegistry,
    pub mode: StreamMode,
    pub started: Instant,
}

/// HTTP server exposing pipeline status
pub struct WebServer {
    config: StatusConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: StatusConfig, registry: SessionRegistry, mode: StreamMode) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                registry,
                mode,
                started: Instant::now(),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/sessions", get(handlers::get_sessions))
            .fallback(handlers::not_found)
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the process exits.
    pub async fn run(self) -> std::io::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Status API listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Serve on a background task.
    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Status API failed: {}", e);
            }
        })
    }
}
