//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP/WS server to. 0 auto-allocates.
    /// Override: `STAGECAST_BIND_PORT`
    pub bind_port: u16,

    /// Directory host-uploaded audio is written to.
    /// Override: `STAGECAST_UPLOAD_DIR`
    pub upload_dir: PathBuf,

    /// Public base URL the uploads directory is served under.
    /// Override: `STAGECAST_UPLOAD_BASE_URL`
    pub upload_base_url: String,

    /// Directory pre-downloaded remote audio is cached in.
    /// Override: `STAGECAST_DOWNLOAD_DIR`
    pub download_dir: PathBuf,

    /// Public base URL the downloads directory is served under.
    /// Override: `STAGECAST_DOWNLOAD_BASE_URL`
    pub download_base_url: String,

    /// Base URL of the audio feature analysis service.
    /// Override: `STAGECAST_ANALYSIS_BASE_URL`
    pub analysis_base_url: Option<String>,

    /// Base URL of the visualizer parameter synthesis service.
    /// Override: `STAGECAST_SYNTHESIS_BASE_URL`
    pub synthesis_base_url: Option<String>,

    /// Base URL of the third-party audio source resolver.
    /// Override: `STAGECAST_RESOLVER_BASE_URL`
    pub resolver_base_url: Option<String>,

    /// Capacity hint for logging a slow outbound consumer.
    pub outbound_queue_warn_threshold: usize,

    /// Maximum upload size accepted by the audio upload endpoint, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = stagecast_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            upload_dir: core.upload_dir,
            upload_base_url: core.upload_base_url,
            download_dir: core.download_dir,
            download_base_url: core.download_base_url,
            analysis_base_url: core.analysis_base_url,
            synthesis_base_url: core.synthesis_base_url,
            resolver_base_url: core.resolver_base_url,
            outbound_queue_warn_threshold: core.outbound_queue_warn_threshold,
            max_upload_bytes: core.max_upload_bytes,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STAGECAST_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(val) = std::env::var("STAGECAST_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("STAGECAST_UPLOAD_BASE_URL") {
            self.upload_base_url = val;
        }
        if let Ok(val) = std::env::var("STAGECAST_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("STAGECAST_DOWNLOAD_BASE_URL") {
            self.download_base_url = val;
        }
        if let Ok(val) = std::env::var("STAGECAST_ANALYSIS_BASE_URL") {
            self.analysis_base_url = Some(val);
        }
        if let Ok(val) = std::env::var("STAGECAST_SYNTHESIS_BASE_URL") {
            self.synthesis_base_url = Some(val);
        }
        if let Ok(val) = std::env::var("STAGECAST_RESOLVER_BASE_URL") {
            self.resolver_base_url = Some(val);
        }
    }

    /// Converts to stagecast-core's `Config` type.
    pub fn to_core_config(&self) -> stagecast_core::Config {
        stagecast_core::Config {
            preferred_port: self.bind_port,
            upload_dir: self.upload_dir.clone(),
            upload_base_url: self.upload_base_url.clone(),
            download_dir: self.download_dir.clone(),
            download_base_url: self.download_base_url.clone(),
            analysis_base_url: self.analysis_base_url.clone(),
            synthesis_base_url: self.synthesis_base_url.clone(),
            resolver_base_url: self.resolver_base_url.clone(),
            outbound_queue_warn_threshold: self.outbound_queue_warn_threshold,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
