//! HTTP server assembly
//!
//! Mounts the Messages API routes next to the health endpoints and wraps
//! them in the body-limit, tracing and CORS layers.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod cors;
mod health;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use switchboard_config::Config;
use switchboard_llm::LlmState;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::health::HealthState;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let llm_state = LlmState::from_config(&config.backend, &config.models)?;
        Ok(Self::with_state(config, llm_state))
    }

    /// Build the server around an existing LLM state
    pub fn with_state(config: &Config, llm_state: LlmState) -> Self {
        let health_state = Arc::new(HealthState::new(config));

        let mut app = Router::new()
            .route("/", get(health::root_handler))
            .route("/ready", get(health::ready_handler));

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, get(health::health_handler));
        }

        let mut app = app
            .with_state(health_state)
            .merge(switchboard_llm::llm_router(llm_state))
            .fallback(health::not_found_handler)
            .layer(DefaultBodyLimit::max(config.server.body_limit_bytes))
            .layer(TraceLayer::new_for_http());

        if let Some(cors_config) = &config.server.cors {
            app = app.layer(cors::cors_layer(cors_config));
        }

        Self {
            router: app,
            listen_address: config.server.listen_address(),
        }
    }

    /// Get the configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
