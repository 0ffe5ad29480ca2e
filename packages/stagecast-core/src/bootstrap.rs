//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::dispatcher::Dispatcher;
use crate::error::{StageError, StageResult};
use crate::external::{AudioAnalyzer, AudioSourceResolver, HttpCollaborator, ParamSynthesizer};
use crate::registry::Registry;
use crate::runtime::TokioSpawner;
use crate::state::Config;
use crate::storage::{BlobStore, FsBlobStore};

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Process-wide room/user registry.
    pub registry: Arc<Registry>,
    /// Stores host-uploaded audio files.
    pub upload_store: Arc<dyn BlobStore>,
    /// Stores pre-downloaded remote audio files.
    pub download_store: Arc<dyn BlobStore>,
    /// Extracts audio features for visualizer synthesis.
    pub analyzer: Arc<dyn AudioAnalyzer>,
    /// Synthesizes visualizer parameters from audio features.
    pub synthesizer: Arc<dyn ParamSynthesizer>,
    /// Resolves and downloads third-party audio sources.
    pub resolver: Arc<dyn AudioSourceResolver>,
    /// The protocol state machine, wired to the registry and resolver.
    pub dispatcher: Arc<Dispatcher<TokioSpawner>>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[bootstrap] beginning graceful shutdown");
        self.cancel_token.cancel();
        let connections_closed = self.ws_manager.close_all();
        log::info!("[bootstrap] closed {connections_closed} connection(s), {} room(s) open", self.registry.room_count());
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters - services are created in
/// dependency order:
///
/// 1. Blob stores (uploads, downloads)
/// 2. External collaborator client (analysis, synthesis, resolution)
/// 3. Registry (process-wide room/user index)
/// 4. Dispatcher (wraps registry + resolver + spawner)
/// 5. Connection manager and cancellation token
///
/// # Errors
///
/// Returns an error if a blob store directory cannot be created, or if the
/// configuration itself fails validation.
pub fn bootstrap_services(config: &Config) -> StageResult<BootstrappedServices> {
    config
        .validate()
        .map_err(StageError::Configuration)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let upload_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
        config.upload_dir.clone(),
        config.upload_base_url.clone(),
    )?);
    let download_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
        config.download_dir.clone(),
        config.download_base_url.clone(),
    )?);

    let collaborator = Arc::new(HttpCollaborator::new(
        config.analysis_base_url.clone(),
        config.synthesis_base_url.clone(),
        config.resolver_base_url.clone(),
    ));
    let analyzer: Arc<dyn AudioAnalyzer> = Arc::clone(&collaborator) as Arc<dyn AudioAnalyzer>;
    let synthesizer: Arc<dyn ParamSynthesizer> = Arc::clone(&collaborator) as Arc<dyn ParamSynthesizer>;
    let resolver: Arc<dyn AudioSourceResolver> = collaborator as Arc<dyn AudioSourceResolver>;

    let registry = Arc::new(Registry::new());
    let ws_manager = Arc::new(WsConnectionManager::new());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&resolver),
        Arc::new(spawner.clone()),
        Arc::clone(&upload_store),
    ));

    Ok(BootstrappedServices {
        registry,
        upload_store,
        download_store,
        analyzer,
        synthesizer,
        resolver,
        dispatcher,
        ws_manager,
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_wires_an_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.upload_dir = dir.path().join("uploads");
        config.download_dir = dir.path().join("downloads");

        let services = bootstrap_services(&config).unwrap();
        assert_eq!(services.registry.room_count(), 0);
        assert_eq!(services.registry.user_count(), 0);
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_config() {
        let mut config = Config::default();
        config.max_upload_bytes = 0;
        assert!(bootstrap_services(&config).is_err());
    }
}
