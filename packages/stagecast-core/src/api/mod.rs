//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the dispatcher and
//! registry. It provides the router construction and server startup
//! functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::dispatcher::Dispatcher;
use crate::external::AudioSourceResolver;
use crate::registry::Registry;
use crate::runtime::TokioSpawner;
use crate::state::Config;
use crate::storage::BlobStore;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services. All business
/// logic lives in the dispatcher and registry themselves.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide room/user registry.
    pub registry: Arc<Registry>,
    /// Stores host-uploaded audio files.
    pub upload_store: Arc<dyn BlobStore>,
    /// Stores pre-downloaded remote audio files.
    pub download_store: Arc<dyn BlobStore>,
    /// Resolves third-party audio sources (used by the upload/resolve edges).
    pub resolver: Arc<dyn AudioSourceResolver>,
    /// The protocol state machine.
    pub dispatcher: Arc<Dispatcher<TokioSpawner>>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    registry: Option<Arc<Registry>>,
    upload_store: Option<Arc<dyn BlobStore>>,
    download_store: Option<Arc<dyn BlobStore>>,
    resolver: Option<Arc<dyn AudioSourceResolver>>,
    dispatcher: Option<Arc<Dispatcher<TokioSpawner>>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    config: Option<Arc<RwLock<Config>>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates all shared service fields from a `BootstrappedServices` container.
    pub fn from_services(mut self, services: &crate::bootstrap::BootstrappedServices) -> Self {
        self.registry = Some(Arc::clone(&services.registry));
        self.upload_store = Some(Arc::clone(&services.upload_store));
        self.download_store = Some(Arc::clone(&services.download_store));
        self.resolver = Some(Arc::clone(&services.resolver));
        self.dispatcher = Some(Arc::clone(&services.dispatcher));
        self.ws_manager = Some(Arc::clone(&services.ws_manager));
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Arc<RwLock<Config>>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            registry: self.registry.expect("registry is required"),
            upload_store: self.upload_store.expect("upload_store is required"),
            download_store: self.download_store.expect("download_store is required"),
            resolver: self.resolver.expect("resolver is required"),
            dispatcher: self.dispatcher.expect("dispatcher is required"),
            ws_manager: self.ws_manager.expect("ws_manager is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(49400, 49410).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);
    let app = http::create_router(state).layer(cors);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
