#![warn(missing_docs)]
//! # deepscan-app
//!
//! ## Purpose
//! Orchestrates validation, the remote analysis call, aggregation, display
//! state, and history for `deepscan`.
//!
//! ## Responsibilities
//! - Own the scan session state machine ([`ScanController`]).
//! - Enforce the single in-flight scan guard and the session mode gate on
//!   saves.
//! - Layer configuration from defaults, environment, and CLI flags.
//! - Assemble store, gateway, and controller for the binary.
//!
//! ## Data flow
//! Upload event -> validation -> phase timeline + gateway call -> aggregation
//! -> gauge animation -> back / confirm / save.
//!
//! ## Ownership and lifetimes
//! The controller is an `Arc` handle; its state lock is never held across the
//! gateway `.await`. Timer tasks only touch the shared display state.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`ScanError`] (per scan) or
//! [`AppError`] (assembly and configuration). No scan error is fatal.
//!
//! ## Security and privacy notes
//! Image bytes and store contents are never logged.

mod config;
mod controller;

use std::sync::Arc;

use deepscan_auth::StoredSessionMode;
use deepscan_store::{HistoryStore, JsonFileStore, KeyValueStore, StoreError};
use deepscan_upload::{AnalysisGateway, CannedGateway, GatewayError, HttpGateway};
use thiserror::Error;
use tracing::info;

pub use config::{
    AppConfig, CONFIRM_DELAY, DEFAULT_ENDPOINT, DEFAULT_STORE_PATH, ENDPOINT_ENV,
    REQUEST_TIMEOUT_ENV, STORE_ENV, ScanTimings, parse_timeout_ms,
};
pub use controller::{
    CompletedScan, ScanController, ScanError, ScanEvent, ScanSession, UploadEvent,
};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("DEEPSCAN_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Builds the gateway selected by `config`.
///
/// # Errors
/// Returns [`AppError::Gateway`] when the endpoint violates policy.
pub fn build_gateway(
    config: &AppConfig,
    offline: bool,
) -> Result<Arc<dyn AnalysisGateway>, AppError> {
    if offline {
        info!("using canned offline analysis");
        return Ok(Arc::new(CannedGateway::demo()));
    }

    let gateway = HttpGateway::new(&config.endpoint, config.request_timeout)?;
    info!(endpoint = %gateway.endpoint(), "using remote analysis");
    Ok(Arc::new(gateway))
}

/// Opens the store at `config.store_path`.
pub fn open_store(config: &AppConfig) -> Arc<dyn KeyValueStore> {
    Arc::new(JsonFileStore::new(config.store_path.clone()))
}

/// Assembles a controller over `store` and `gateway`.
///
/// The session mode is read from `store` here and never again.
pub fn build_controller(
    config: &AppConfig,
    store: Arc<dyn KeyValueStore>,
    gateway: Arc<dyn AnalysisGateway>,
) -> ScanController {
    let gate = StoredSessionMode::load(store.as_ref());
    ScanController::new(gateway, HistoryStore::new(store), &gate, config.timings)
}

/// Application assembly and configuration errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration value is invalid.
    #[error("config error: {0}")]
    Config(String),
    /// Gateway could not be constructed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    /// Store could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A scan or action failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
}
