//! `RelayServer`: Axum HTTP + WebSocket front end for the relay core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{Method, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::{RelayError, Result};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastLoop;
use crate::websocket::connection::ConnectionId;
use crate::websocket::dispatch::{DispatchSender, dispatch_queue};
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connected clients.
    pub registry: Arc<ConnectionRegistry>,
    /// Producer side of the dispatch queue.
    pub queue: DispatchSender,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
    /// Max inbound frame size for upgraded sockets.
    pub max_message_size: usize,
    /// Bounds each session's final close, same as a broadcast write.
    pub write_timeout: Duration,
}

impl AppState {
    fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: self.registry.clone(),
            queue: self.queue.clone(),
            shutdown: self.shutdown.token(),
            close_timeout: self.write_timeout,
        }
    }
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    queue: DispatchSender,
    /// Taken by the first successful [`listen`](Self::listen).
    broadcast_loop: Mutex<Option<BroadcastLoop>>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server. Nothing is bound or spawned until
    /// [`listen`](Self::listen).
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let (queue, queue_rx) = dispatch_queue();
        let broadcast_loop = BroadcastLoop::new(registry.clone(), queue_rx, config.write_timeout);
        Self {
            config,
            registry,
            queue,
            broadcast_loop: Mutex::new(Some(broadcast_loop)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            queue: self.queue.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
            max_message_size: self.config.max_message_size,
            write_timeout: self.config.write_timeout,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(cors_layer())
            .with_state(state)
    }

    /// Bind the listener, start the broadcast loop and serve.
    ///
    /// Returns the bound address and a handle that completes once the HTTP
    /// server and the broadcast loop have both stopped.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RelayError::bind(bind_addr.as_str(), e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RelayError::bind(bind_addr.as_str(), e))?;

        let broadcast_loop = self
            .broadcast_loop
            .lock()
            .take()
            .ok_or(RelayError::AlreadyListening)?;

        let token = self.shutdown.token();
        let loop_handle = tokio::spawn(broadcast_loop.run(token.clone()));
        let router = self.router();

        info!(%addr, "relay listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "http server failed");
            }
            let _ = loop_handle.await;
            info!("relay stopped");
        });

        Ok((addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Any origin, the methods a browser uses around an upgrade, and
/// `Content-Type`.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let client_id = ConnectionId::next();
    let ctx = state.session_context();
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(move |err| {
            warn!(client_id = %client_id, error = %err, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| run_ws_session(socket, client_id, ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}
