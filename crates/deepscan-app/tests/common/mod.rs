//! Shared fixtures for scan controller integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use deepscan_app::{ScanController, ScanTimings};
use deepscan_auth::FixedSessionMode;
use deepscan_core::{ImageFile, ProviderResult, ScanStatus, SessionMode};
use deepscan_store::{HistoryStore, MemoryStore};
use deepscan_ui::{GaugeView, SharedUi, snapshot};
use deepscan_upload::{AnalysisGateway, GatewayError};
use tokio::sync::Notify;

pub const MIB: usize = 1024 * 1024;

type Outcome = Result<Vec<ProviderResult>, u16>;

/// Gateway answering from a script, optionally held until released.
pub struct MockGateway {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    release: Option<Arc<Notify>>,
    calls: AtomicUsize,
    ui: OnceLock<SharedUi>,
    gauges: Mutex<Vec<GaugeView>>,
}

impl MockGateway {
    pub fn succeeding(results: Vec<ProviderResult>) -> Self {
        Self::with_fallback(Ok(results))
    }

    /// Fails every call with HTTP `status`.
    pub fn failing(status: u16) -> Self {
        Self::with_fallback(Err(status))
    }

    fn with_fallback(fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            release: None,
            calls: AtomicUsize::new(0),
            ui: OnceLock::new(),
            gauges: Mutex::new(Vec::new()),
        }
    }

    /// Answers the next call with `outcome` before falling back.
    pub fn first(self, outcome: Outcome) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .push_back(outcome);
        self
    }

    /// Holds every call until the returned notifier is signalled once per call.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        self.release = Some(release.clone());
        (self, release)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records the displayed gauge of `ui` on every call.
    pub fn watch(&self, ui: SharedUi) {
        let _ = self.ui.set(ui);
    }

    /// Gauge as seen at the start of each call, in call order.
    pub fn gauges_at_call(&self) -> Vec<GaugeView> {
        self.gauges.lock().expect("gauge lock").clone()
    }
}

#[async_trait]
impl AnalysisGateway for MockGateway {
    async fn analyze(&self, _file: &ImageFile) -> Result<Vec<ProviderResult>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ui) = self.ui.get() {
            self.gauges.lock().expect("gauge lock").push(snapshot(ui).gauge);
        }
        if let Some(release) = &self.release {
            release.notified().await;
        }

        let scripted = self.script.lock().expect("script lock").pop_front();
        scripted
            .unwrap_or_else(|| self.fallback.clone())
            .map_err(GatewayError::Status)
    }
}

/// Controller wired to in-memory collaborators.
pub struct Harness {
    pub controller: ScanController,
    pub gateway: Arc<MockGateway>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(mode: SessionMode, gateway: MockGateway) -> Harness {
    harness_with_store(mode, gateway, MemoryStore::new())
}

pub fn harness_with_store(mode: SessionMode, gateway: MockGateway, store: MemoryStore) -> Harness {
    let gateway = Arc::new(gateway);
    let store = Arc::new(store);
    let controller = ScanController::new(
        gateway.clone(),
        HistoryStore::new(store.clone()),
        &FixedSessionMode(mode),
        ScanTimings::default(),
    );
    gateway.watch(controller.ui());
    Harness {
        controller,
        gateway,
        store,
    }
}

pub fn gan_detector() -> Vec<ProviderResult> {
    vec![ProviderResult::new("GAN Detector", "85% SAFE")]
}

pub fn png(size: usize) -> ImageFile {
    ImageFile::in_memory("scan.png", "image/png", vec![0; size])
}

pub fn pdf() -> ImageFile {
    ImageFile::in_memory("report.pdf", "application/pdf", vec![0; 1024])
}

/// Yields to spawned tasks until `controller` reports `status`.
pub async fn wait_for_status(controller: &ScanController, status: ScanStatus) {
    for _ in 0..1_000 {
        if controller.status() == status {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("controller never reached {status}");
}
