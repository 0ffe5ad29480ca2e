//! Server-wide configuration.
//!
//! All fields have sensible defaults; [`Config::validate`] catches the values
//! that would cause runtime trouble (zero-sized channels, missing
//! directories that can't be created) before the server starts accepting
//! connections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the stage coordination server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    // Storage
    /// Directory uploaded audio files are written to.
    pub upload_dir: PathBuf,
    /// Public base URL the uploads directory is served under.
    pub upload_base_url: String,
    /// Directory pre-downloaded remote audio is cached in.
    pub download_dir: PathBuf,
    /// Public base URL the downloads directory is served under.
    pub download_base_url: String,

    // External collaborators (§4.7)
    /// Base URL of the audio feature analysis service, if configured.
    pub analysis_base_url: Option<String>,
    /// Base URL of the visualizer parameter synthesis service, if configured.
    pub synthesis_base_url: Option<String>,
    /// Base URL of the third-party audio source resolver, if configured.
    pub resolver_base_url: Option<String>,

    // Connection model
    /// Capacity hint for the per-user outbound channel. `UnboundedSender` is
    /// used in practice, but this bounds how aggressively a slow consumer's
    /// backlog is logged as a warning.
    pub outbound_queue_warn_threshold: usize,

    /// Maximum upload size accepted by the audio upload endpoint, in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> Result<(), String> {
        if self.outbound_queue_warn_threshold == 0 {
            return Err("outbound_queue_warn_threshold must be >= 1".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be >= 1".to_string());
        }
        if self.upload_base_url.is_empty() {
            return Err("upload_base_url must not be empty".to_string());
        }
        if self.download_base_url.is_empty() {
            return Err("download_base_url must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            upload_dir: PathBuf::from("data/uploads"),
            upload_base_url: "http://0.0.0.0:8080/rooms/uploads".to_string(),
            download_dir: PathBuf::from("data/downloads"),
            download_base_url: "http://0.0.0.0:8080/rooms/downloads".to_string(),
            analysis_base_url: None,
            synthesis_base_url: None,
            resolver_base_url: None,
            outbound_queue_warn_threshold: 500,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_zero_thresholds() {
        let mut config = Config::default();
        config.outbound_queue_warn_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_default_has_no_external_collaborators() {
        let config = Config::default();
        assert!(config.analysis_base_url.is_none());
        assert!(config.synthesis_base_url.is_none());
        assert!(config.resolver_base_url.is_none());
    }
}
