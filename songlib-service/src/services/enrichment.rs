//! Song-info enrichment API client
//!
//! Resolves release date, lyrics text and external link for a bare
//! group/title pair: `GET <host>/info?group=<group>&song=<title>`.
//!
//! Failure classification is explicit so the ingestion handler can map it to
//! message outcomes without inline status-code branching: transport errors
//! and 5xx are transient, 4xx carries whatever partial detail the body still
//! decoded to, and an undecodable body is permanent.

use std::time::Duration;

use async_trait::async_trait;
use songlib_common::models::SongDetail;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Enrichment failure, classified for outcome mapping
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Transport-level failure (connect, timeout, ...)
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 5xx from the enrichment API
    #[error("server error {0}")]
    Server(u16),

    /// HTTP 4xx; `partial` holds whatever detail the body still decoded to
    #[error("client error {status}")]
    Client {
        status: u16,
        partial: Option<SongDetail>,
    },

    /// Response body did not decode as a song detail
    #[error("parse error: {0}")]
    Parse(String),
}

impl EnrichmentError {
    /// Whether retrying the same request can plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EnrichmentError::Network(_) | EnrichmentError::Server(_))
    }
}

/// How enrichment 4xx responses map to message outcomes
///
/// 5xx and transport errors always retry; an undecodable body always
/// discards. Only the client-error leg is a policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentPolicy {
    /// Tolerate 4xx: log and continue with the partial (or empty) detail
    RetryOnServerError,
    /// Treat 4xx as a permanent data problem and discard the message
    StrictClientError,
}

/// External metadata lookup for a song
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn song_detail(&self, group: &str, song: &str) -> Result<SongDetail, EnrichmentError>;
}

/// HTTP [`EnrichmentClient`] against a configured host
pub struct HttpEnrichmentClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEnrichmentClient {
    pub fn new(base_url: String) -> Result<Self, EnrichmentError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EnrichmentClient for HttpEnrichmentClient {
    async fn song_detail(&self, group: &str, song: &str) -> Result<SongDetail, EnrichmentError> {
        let url = format!("{}/info", self.base_url);
        debug!(group, song, url = %url, "querying song-info API");

        let response = self
            .http
            .get(&url)
            .query(&[("group", group), ("song", song)])
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(EnrichmentError::Server(status.as_u16()));
        }
        if status.is_client_error() {
            // The source API sometimes returns a usable body alongside a 4xx;
            // carry it so the tolerant policy can keep going.
            let partial = response.json::<SongDetail>().await.ok();
            return Err(EnrichmentError::Client {
                status: status.as_u16(),
                partial,
            });
        }

        response
            .json::<SongDetail>()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))
    }
}
