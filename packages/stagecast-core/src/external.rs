//! External collaborator interfaces (§4.7).
//!
//! Audio feature analysis, visualizer-parameter synthesis, and third-party
//! audio source resolution are all out of scope for this server; it only
//! defines the interface each collaborator must satisfy and ships an
//! HTTP-backed default implementation an embedder can point at a real
//! service (or replace entirely).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StageError, StageResult};

const ANALYSIS_TIMEOUT_SECS: u64 = 30;
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Tempo/RMS/spectral/section features extracted from an audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureReport {
    pub tempo_bpm: f64,
    pub rms: Vec<f32>,
    pub spectral_centroid: Vec<f32>,
    pub sections: Vec<Value>,
}

/// Extracts audio features from raw bytes.
#[async_trait]
pub trait AudioAnalyzer: Send + Sync {
    async fn analyze(&self, audio: &[u8]) -> StageResult<FeatureReport>;
}

/// Synthesizes visualizer parameters from a feature report.
#[async_trait]
pub trait ParamSynthesizer: Send + Sync {
    async fn synthesize(&self, features: &FeatureReport) -> StageResult<Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub duration_secs: Option<f64>,
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub title: String,
    pub tracks: Vec<TrackInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvedInfo {
    Track(TrackInfo),
    Playlist(PlaylistInfo),
}

/// A downloaded track, already persisted behind the server's blob store.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub serving_url: String,
}

/// Resolves metadata for, and downloads, third-party audio sources (the
/// `soundcloud/*` family of endpoints named in §6).
#[async_trait]
pub trait AudioSourceResolver: Send + Sync {
    async fn resolve_info(&self, url: &str) -> StageResult<ResolvedInfo>;
    async fn download_audio(&self, url: &str) -> StageResult<DownloadedFile>;
}

/// HTTP-backed default implementation of all three collaborator traits,
/// hitting a configurable base URL for each concern.
pub struct HttpCollaborator {
    client: Client,
    analysis_base_url: Option<String>,
    synthesis_base_url: Option<String>,
    resolver_base_url: Option<String>,
}

impl HttpCollaborator {
    pub fn new(
        analysis_base_url: Option<String>,
        synthesis_base_url: Option<String>,
        resolver_base_url: Option<String>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
                .build()
                .expect("failed to build external collaborator HTTP client"),
            analysis_base_url,
            synthesis_base_url,
            resolver_base_url,
        }
    }

    fn require(base: &Option<String>, what: &str) -> StageResult<&str> {
        base.as_deref()
            .ok_or_else(|| StageError::Configuration(format!("{what} endpoint not configured")))
    }
}

#[async_trait]
impl AudioAnalyzer for HttpCollaborator {
    async fn analyze(&self, audio: &[u8]) -> StageResult<FeatureReport> {
        let base = Self::require(&self.analysis_base_url, "audio analysis")?;
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(audio.to_vec()));
        let resp = self
            .client
            .post(format!("{base}/analyze"))
            .timeout(Duration::from_secs(ANALYSIS_TIMEOUT_SECS))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))?;
        resp.json::<FeatureReport>()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))
    }
}

#[async_trait]
impl ParamSynthesizer for HttpCollaborator {
    async fn synthesize(&self, features: &FeatureReport) -> StageResult<Value> {
        let base = Self::require(&self.synthesis_base_url, "param synthesis")?;
        let resp = self
            .client
            .post(format!("{base}/synthesize"))
            .timeout(Duration::from_secs(ANALYSIS_TIMEOUT_SECS))
            .json(features)
            .send()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))?;
        resp.json::<Value>()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))
    }
}

#[async_trait]
impl AudioSourceResolver for HttpCollaborator {
    async fn resolve_info(&self, url: &str) -> StageResult<ResolvedInfo> {
        let base = Self::require(&self.resolver_base_url, "audio source resolver")?;
        let resp = self
            .client
            .post(format!("{base}/info"))
            .timeout(Duration::from_secs(ANALYSIS_TIMEOUT_SECS))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))?;
        resp.json::<ResolvedInfo>()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))
    }

    async fn download_audio(&self, url: &str) -> StageResult<DownloadedFile> {
        let base = Self::require(&self.resolver_base_url, "audio source resolver")?;
        let resp = self
            .client
            .post(format!("{base}/download"))
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))?;
        #[derive(Deserialize)]
        struct DownloadResponse {
            filename: String,
        }
        let body: DownloadResponse = resp
            .json()
            .await
            .map_err(|e| StageError::ExternalService(e.to_string()))?;
        Ok(DownloadedFile {
            serving_url: format!("{base}/file/{}", body.filename),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn unconfigured_analyzer_returns_configuration_error() {
        let collaborator = HttpCollaborator::new(None, None, None);
        let err = collaborator.analyze(&[]).await.unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }
}
