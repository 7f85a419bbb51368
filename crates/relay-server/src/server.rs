//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_store::MessageRepository;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::protocol::{EngineConfig, ProtocolEngine};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::Registry;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Protocol engine shared by every session.
    pub engine: Arc<ProtocolEngine>,
    /// Live sessions.
    pub registry: Arc<Registry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The chat relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    engine: Arc<ProtocolEngine>,
    registry: Arc<Registry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a server around an explicitly constructed repository.
    pub fn new(
        config: ServerConfig,
        repository: Arc<dyn MessageRepository>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let engine = Arc::new(ProtocolEngine::new(
            registry.clone(),
            repository,
            EngineConfig::from(&config),
        ));
        Self {
            config: Arc::new(config),
            engine,
            registry,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address (useful with port 0) and the serve task,
    /// which finishes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "relay server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server terminated with error");
            }
            info!("relay server stopped");
        });
        Ok((addr, handle))
    }

    /// Live session registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Protocol engine.
    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let live = state.registry.connection_count().await;
    if live >= state.config.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(live, max = state.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let token = state.shutdown.token();
    let guard = state.shutdown.session_guard();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, state.engine, state.config, token).await;
            drop(guard);
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.connection_count().await;
    let rooms = state.registry.room_count().await;
    Json(health::health_check(state.start_time, connections, rooms))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
