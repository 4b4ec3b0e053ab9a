#![warn(missing_docs)]
//! # deepscan-analysis-contract
//!
//! ## Purpose
//! Defines the analysis endpoint response contract and the score aggregation
//! that drives the gauge.
//!
//! ## Responsibilities
//! - Parse `{ success, results }` responses into provider results.
//! - Treat `success: false` and missing result lists as failures.
//! - Reduce heterogeneous score strings into one 0–100 mean.
//!
//! ## Data flow
//! Raw JSON body -> [`parse_analysis_response`] -> [`summarize`] -> mean score
//! for the gauge plus the unchanged display list.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned so they outlive the transient network buffer.
//!
//! ## Error model
//! Invalid JSON, reported failures, and contract violations return
//! [`AnalysisContractError`]; every variant maps to a failed scan.

use std::sync::LazyLock;

use deepscan_core::ProviderResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path suffix every analysis endpoint must end with.
pub const ANALYZE_PATH: &str = "/analyze";

/// Multipart field carrying the image.
pub const FILE_FIELD_NAME: &str = "file";

/// Highest gauge value.
pub const MAX_SCORE: u8 = 100;

static NUMERIC_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d*)?|\.\d+").expect("numeric score pattern is a valid regex")
});

/// Response body returned by the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Whether the service produced results.
    pub success: bool,
    /// Provider verdicts, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ProviderResult>>,
    /// Where the service stored the upload, if it reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Service-side error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parses a raw response body into provider results.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON,
/// [`AnalysisContractError::Unsuccessful`] when `success` is `false`, and
/// [`AnalysisContractError::InvalidContract`] when a successful response has
/// no `results` list.
pub fn parse_analysis_response(raw: &str) -> Result<Vec<ProviderResult>, AnalysisContractError> {
    let parsed: AnalysisResponse = serde_json::from_str(raw)?;

    if !parsed.success {
        return Err(AnalysisContractError::Unsuccessful(
            parsed
                .error
                .unwrap_or_else(|| "service reported failure".to_string()),
        ));
    }

    parsed.results.ok_or_else(|| {
        AnalysisContractError::InvalidContract("successful response has no results".to_string())
    })
}

/// Extracts the first numeric substring of a score string.
///
/// A decimal point is allowed inside the number; a lone `.` is not numeric.
pub fn extract_numeric(score: &str) -> Option<f64> {
    NUMERIC_SCORE
        .find(score)
        .and_then(|found| found.as_str().parse::<f64>().ok())
}

/// Provider result paired with the number it contributed, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    /// Result exactly as returned by the service.
    pub result: ProviderResult,
    /// Numeric value extracted from the score.
    pub value: Option<f64>,
}

/// Outcome of aggregating one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Mean of all numeric scores, rounded and clamped to 0–100.
    pub mean_score: u8,
    /// Every result in service order, numeric or not.
    pub entries: Vec<ScoredResult>,
}

impl Aggregation {
    /// Number of entries that contributed to the mean.
    pub fn numeric_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    /// Display list in service order.
    pub fn results(&self) -> Vec<ProviderResult> {
        self.entries
            .iter()
            .map(|entry| entry.result.clone())
            .collect()
    }
}

/// Computes the gauge mean for a list of results.
///
/// Entries without a numeric substring are excluded from the mean. An input
/// with no numeric entries yields `0`.
pub fn aggregate(results: &[ProviderResult]) -> u8 {
    mean_of(results.iter().filter_map(|result| extract_numeric(&result.score)))
}

/// Aggregates results while keeping every entry for display.
pub fn summarize(results: Vec<ProviderResult>) -> Aggregation {
    let entries: Vec<ScoredResult> = results
        .into_iter()
        .map(|result| ScoredResult {
            value: extract_numeric(&result.score),
            result,
        })
        .collect();

    let mean_score = mean_of(entries.iter().filter_map(|entry| entry.value));
    Aggregation {
        mean_score,
        entries,
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> u8 {
    let (sum, count) = values.fold((0.0_f64, 0_u32), |(sum, count), value| {
        (sum + value, count + 1)
    });

    if count == 0 {
        return 0;
    }

    (sum / f64::from(count)).round().clamp(0.0, f64::from(MAX_SCORE)) as u8
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure.
    #[error("analysis decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// The service answered with `success: false`.
    #[error("analysis unsuccessful: {0}")]
    Unsuccessful(String),
    /// Parsed payload violates contract invariants.
    #[error("analysis contract violation: {0}")]
    InvalidContract(String),
}
