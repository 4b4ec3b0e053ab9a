#![warn(missing_docs)]
//! # deepscan-upload
//!
//! ## Purpose
//! Sends a validated image to the remote analysis service.
//!
//! ## Responsibilities
//! - Define the [`AnalysisGateway`] seam the scan core awaits.
//! - Validate the analysis endpoint policy (http/https, `/analyze` path).
//! - POST the image as multipart form data and parse the response contract.
//! - Provide a canned gateway for offline runs and tests.
//!
//! ## Data flow
//! [`ImageFile`] -> bytes read from memory or disk -> multipart POST ->
//! response body -> [`parse_analysis_response`] -> provider results.
//!
//! ## Ownership and lifetimes
//! The gateway borrows the image handle for the duration of one call; request
//! bodies own their bytes.
//!
//! ## Error model
//! Every failure (IO, network, non-2xx status, `success: false`, malformed
//! body) is a [`GatewayError`] and maps to one failed scan. No retries are
//! attempted here.
//!
//! ## Security and privacy notes
//! Image bytes are never logged; only the content digest and size are.

use std::time::Duration;

use async_trait::async_trait;
use deepscan_analysis_contract::{
    ANALYZE_PATH, AnalysisContractError, FILE_FIELD_NAME, parse_analysis_response,
};
use deepscan_core::{ImageFile, ImageSource, ProviderResult};
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Header carrying the hex SHA-256 of the uploaded bytes.
pub const CONTENT_DIGEST_HEADER: &str = "x-content-sha256";

/// Asynchronous remote analysis call.
///
/// The call has unknown latency and no built-in cancellation; callers decide
/// whether to bound it.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Submits one image and resolves with provider verdicts.
    ///
    /// # Errors
    /// Returns [`GatewayError`] for any failure; all variants mean the scan
    /// failed.
    async fn analyze(&self, file: &ImageFile) -> Result<Vec<ProviderResult>, GatewayError>;
}

/// Validates analysis endpoint constraints.
///
/// # Errors
/// Returns [`GatewayError::InvalidEndpoint`] for unparsable URLs, schemes
/// other than http/https, or paths not ending with `/analyze`.
pub fn validate_analysis_endpoint(endpoint: &str) -> Result<Url, GatewayError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| GatewayError::InvalidEndpoint(format!("invalid analysis url: {error}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GatewayError::InvalidEndpoint(
            "analysis endpoint must use http or https".to_string(),
        ));
    }

    if !parsed.path().ends_with(ANALYZE_PATH) {
        return Err(GatewayError::InvalidEndpoint(format!(
            "analysis endpoint path must end with {ANALYZE_PATH}"
        )));
    }

    Ok(parsed)
}

/// Hex-encoded SHA-256 of the upload body, sent as [`CONTENT_DIGEST_HEADER`].
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// HTTP gateway posting multipart form data.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Creates a gateway for a validated endpoint.
    ///
    /// `request_timeout` bounds the whole request when set; without it the
    /// call may wait indefinitely.
    ///
    /// # Errors
    /// Returns [`GatewayError::InvalidEndpoint`] for endpoint policy
    /// violations and [`GatewayError::Transport`] if the client cannot be
    /// built.
    pub fn new(endpoint: &str, request_timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let endpoint = validate_analysis_endpoint(endpoint)?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            endpoint,
            client: builder.build()?,
        })
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisGateway for HttpGateway {
    async fn analyze(&self, file: &ImageFile) -> Result<Vec<ProviderResult>, GatewayError> {
        let bytes = read_image_bytes(file).await?;
        let digest = content_digest(&bytes);
        debug!(digest = %digest, size = bytes.len(), endpoint = %self.endpoint, "posting image");

        let part = Part::bytes(bytes)
            .file_name(file.name().to_string())
            .mime_str(file.mime())?;
        let form = Form::new().part(FILE_FIELD_NAME, part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_DIGEST_HEADER, &digest)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), digest = %digest, "analysis endpoint returned error status");
            return Err(GatewayError::Status(status.as_u16()));
        }

        let results = parse_analysis_response(&body)?;
        info!(digest = %digest, providers = results.len(), "analysis response received");
        Ok(results)
    }
}

async fn read_image_bytes(file: &ImageFile) -> Result<Vec<u8>, GatewayError> {
    match file.source() {
        ImageSource::Memory(bytes) => Ok(bytes.clone()),
        ImageSource::Path(path) => {
            tokio::fs::read(path)
                .await
                .map_err(|source| GatewayError::Io {
                    path: path.display().to_string(),
                    source,
                })
        }
    }
}

/// Gateway answering from a fixed script, for offline runs and tests.
#[derive(Debug, Clone)]
pub struct CannedGateway {
    outcome: Result<Vec<ProviderResult>, String>,
    latency: Duration,
}

impl CannedGateway {
    /// Always succeeds with `results`.
    pub fn succeeding(results: Vec<ProviderResult>) -> Self {
        Self {
            outcome: Ok(results),
            latency: Duration::ZERO,
        }
    }

    /// Always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            latency: Duration::ZERO,
        }
    }

    /// The demo verdicts of the reference analysis service.
    pub fn demo() -> Self {
        Self::succeeding(vec![
            ProviderResult::new("Deepware", "92% Authentic").with_status("safe"),
            ProviderResult::new("Sensity AI", "88% Authentic").with_status("safe"),
            ProviderResult::new("Reality Check", "42% Suspicious").with_status("warning"),
        ])
    }

    /// Delays every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl AnalysisGateway for CannedGateway {
    async fn analyze(&self, file: &ImageFile) -> Result<Vec<ProviderResult>, GatewayError> {
        debug!(name = file.name(), latency_ms = self.latency.as_millis() as u64, "canned analysis");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.outcome
            .clone()
            .map_err(|message| GatewayError::Contract(AnalysisContractError::Unsuccessful(message)))
    }
}

/// Gateway failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Endpoint violates the analysis endpoint policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Image bytes could not be read.
    #[error("cannot read image '{path}': {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Network or HTTP client failure.
    #[error("analysis transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// Endpoint answered with a non-2xx status.
    #[error("analysis endpoint returned status {0}")]
    Status(u16),
    /// Response body violated the analysis contract.
    #[error(transparent)]
    Contract(#[from] AnalysisContractError),
}
