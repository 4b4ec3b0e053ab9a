//! Scan session state machine.
//!
//! One [`ScanController`] owns the single in-flight slot. It validates the
//! candidate file, starts the phase timeline, awaits the gateway, folds the
//! verdicts into a score, and drives the post-scan actions. Timer tasks and
//! the gateway continuation carry an [`EpochToken`]; a new session or a
//! reset advances the epoch so late writers become no-ops.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use deepscan_analysis_contract::summarize;
use deepscan_auth::SessionModeGate;
use deepscan_core::{
    CoreError, HistoryEntry, ImageFile, ProviderResult, ScanStatus, SessionMode, ValidationError,
    validate,
};
use deepscan_store::{HistoryStore, StoreError};
use deepscan_ui::{
    EpochToken, GaugeAnimator, RESULT_SAVED_TEXT, SessionEpoch, SharedUi, TimerHandle, Tone,
    UiState, scan_phases, share, snapshot, start_timeline, with_ui,
};
use deepscan_upload::{AnalysisGateway, GatewayError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ScanTimings;

const EVENT_CAPACITY: usize = 64;

/// File handed in by the upload affordance.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// File picker result; `None` when the dialog was dismissed.
    Picked(Option<ImageFile>),
    /// Drop of one or more files. Only the first is scanned.
    Dropped(Vec<ImageFile>),
}

impl UploadEvent {
    /// The single file this event contributes, if any.
    pub fn into_first(self) -> Option<ImageFile> {
        match self {
            Self::Picked(file) => file,
            Self::Dropped(files) => {
                if files.len() > 1 {
                    debug!(ignored = files.len() - 1, "extra dropped files ignored");
                }
                files.into_iter().next()
            }
        }
    }
}

/// Observable change of the scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// The status moved from `from` to `to`.
    StatusChanged {
        /// Session the transition belongs to, if one is open.
        session: Option<u64>,
        /// Previous status.
        from: ScanStatus,
        /// New status.
        to: ScanStatus,
    },
    /// User-facing message that does not change the status.
    Notice {
        /// Session the notice belongs to, if one is open.
        session: Option<u64>,
        /// Message text.
        message: String,
    },
}

/// Data of the scan currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    /// Monotonic session id.
    pub id: u64,
    /// Image reference (path or name).
    pub image: String,
    /// Declared MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// Current status.
    pub status: ScanStatus,
    /// Phase shown by the timeline, once started.
    pub phase_index: Option<usize>,
    /// Verdicts, once completed.
    pub results: Vec<ProviderResult>,
    /// Aggregated score, once completed.
    pub mean_score: Option<u8>,
}

impl ScanSession {
    fn open(id: u64, file: &ImageFile) -> Self {
        Self {
            id,
            image: file.reference(),
            mime: file.mime().to_string(),
            size: file.size(),
            status: ScanStatus::Validating,
            phase_index: None,
            results: Vec::new(),
            mean_score: None,
        }
    }
}

/// Result of a successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedScan {
    /// Session the result belongs to.
    pub session_id: u64,
    /// Rounded mean of the numeric scores.
    pub mean_score: u8,
    /// All verdicts in display order.
    pub results: Vec<ProviderResult>,
}

/// Scan controller failures. None of them is fatal to the controller.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A scan is already in flight; the file was ignored.
    #[error("a scan is already in progress")]
    Busy,
    /// The upload event carried no file.
    #[error("no file selected")]
    NoFile,
    /// The file failed validation; no session was opened.
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    /// The gateway call failed; the session is `Failed`.
    #[error("analysis failed: {0}")]
    Gateway(#[from] GatewayError),
    /// Guest sessions may not save.
    #[error("Login required to save results")]
    PersistenceRefused,
    /// History could not be written.
    #[error("history store failure: {0}")]
    Store(StoreError),
    /// History entry could not be stamped.
    #[error(transparent)]
    Core(#[from] CoreError),
    /// The action is not available in the current status.
    #[error("'{action}' is not available while {status}")]
    InvalidAction {
        /// Requested action.
        action: &'static str,
        /// Status at the time of the request.
        status: ScanStatus,
    },
    /// Controller state lock was poisoned.
    #[error("scan controller state is poisoned")]
    Poisoned,
}

impl From<StoreError> for ScanError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Refused => Self::PersistenceRefused,
            other => Self::Store(other),
        }
    }
}

struct ControllerState {
    status: ScanStatus,
    session: Option<ScanSession>,
    last_session_id: u64,
    timeline: Option<TimerHandle>,
    gauge: GaugeAnimator,
    pending_reset: Option<TimerHandle>,
}

struct Inner {
    state: Mutex<ControllerState>,
    ui: SharedUi,
    gateway: Arc<dyn AnalysisGateway>,
    history: HistoryStore,
    mode: SessionMode,
    timings: ScanTimings,
    epoch: SessionEpoch,
    events: broadcast::Sender<ScanEvent>,
}

/// Orchestrates one scan at a time. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScanController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

impl ScanController {
    /// Creates an idle controller. The session mode is read from `gate` once.
    pub fn new(
        gateway: Arc<dyn AnalysisGateway>,
        history: HistoryStore,
        gate: &dyn SessionModeGate,
        timings: ScanTimings,
    ) -> Self {
        let mode = gate.mode();
        let mut initial = UiState::new(mode);
        if mode.is_secure() {
            match history.entries() {
                Ok(entries) => initial.history = entries,
                Err(error) => warn!(%error, "history unreadable; showing an empty panel"),
            }
        }

        let ui = share(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = ControllerState {
            status: ScanStatus::Idle,
            session: None,
            last_session_id: 0,
            timeline: None,
            gauge: GaugeAnimator::new(ui.clone(), timings.gauge_tick),
            pending_reset: None,
        };

        info!(mode = mode.label(), "scan controller ready");
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                ui,
                gateway,
                history,
                mode,
                timings,
                epoch: SessionEpoch::new(),
                events,
            }),
        }
    }

    /// Session mode captured at construction.
    pub fn mode(&self) -> SessionMode {
        self.inner.mode
    }

    /// Current status.
    pub fn status(&self) -> ScanStatus {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Copy of the open session with its current phase index.
    pub fn session(&self) -> Option<ScanSession> {
        let mut session = self.lock_state().ok()?.session.clone()?;
        session.phase_index = with_ui(&self.inner.ui, |state| state.timeline.active);
        Some(session)
    }

    /// Shared display state for renderers.
    pub fn ui(&self) -> SharedUi {
        self.inner.ui.clone()
    }

    /// Copy of the display state.
    pub fn snapshot(&self) -> UiState {
        snapshot(&self.inner.ui)
    }

    /// Subscribes to status changes and notices.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.inner.events.subscribe()
    }

    /// Scans the file carried by an upload event.
    ///
    /// # Errors
    /// Returns [`ScanError::NoFile`] for empty events, otherwise the result
    /// of [`ScanController::submit`].
    pub async fn handle_upload(&self, event: UploadEvent) -> Result<CompletedScan, ScanError> {
        let Some(file) = event.into_first() else {
            debug!("upload event without a file");
            return Err(ScanError::NoFile);
        };
        self.submit(file).await
    }

    /// Validates `file`, runs the analysis, and resolves the session.
    ///
    /// A file arriving while a scan is in flight is ignored. A file arriving
    /// after a finished scan discards that scan first. Dropping the returned
    /// future mid-flight marks the session `Failed` so the controller stays
    /// usable.
    ///
    /// While the analysis is awaited the session cannot leave
    /// `AwaitingResult` by any other path: new files are `Busy` and every
    /// action is `InvalidAction`. Only this call resolves it.
    ///
    /// # Errors
    /// - [`ScanError::Busy`] while another scan is in flight.
    /// - [`ScanError::Rejected`] when validation fails; the status and any
    ///   finished session are left as they were.
    /// - [`ScanError::Gateway`] when the analysis fails (status is `Failed`).
    pub async fn submit(&self, file: ImageFile) -> Result<CompletedScan, ScanError> {
        let (session_id, token) = self.open_session(&file)?;

        let mut guard = InFlightGuard {
            controller: self,
            session_id,
            armed: true,
        };
        let outcome = self.inner.gateway.analyze(&file).await;
        guard.armed = false;

        self.resolve_session(session_id, &token, outcome)
    }

    /// Returns a completed scan to idle immediately.
    ///
    /// # Errors
    /// Returns [`ScanError::InvalidAction`] unless the status is `Completed`.
    pub fn back(&self) -> Result<(), ScanError> {
        let mut state = self.lock_state()?;
        self.require(&state, "back", ScanStatus::Completed)?;
        self.discard(&mut state);
        Ok(())
    }

    /// Returns a completed scan to idle after the confirm delay.
    ///
    /// The delayed reset is dropped if `back`, `reset`, or a new file gets
    /// there first.
    ///
    /// # Errors
    /// Returns [`ScanError::InvalidAction`] unless the status is `Completed`.
    ///
    /// # Panics
    /// Panics outside a tokio runtime.
    pub fn confirm(&self) -> Result<(), ScanError> {
        let mut state = self.lock_state()?;
        self.require(&state, "confirm", ScanStatus::Completed)?;

        let token = self.inner.epoch.token();
        let delay = self.inner.timings.confirm_delay;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.pending_reset = Some(TimerHandle::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let controller = ScanController { inner };
            if let Ok(mut state) = controller.lock_state()
                && token.is_current()
                && state.status == ScanStatus::Completed
            {
                controller.discard(&mut state);
            }
        }));

        debug!(
            session = ?state.session.as_ref().map(|session| session.id),
            delay_ms = delay.as_millis() as u64,
            "confirm scheduled reset"
        );
        Ok(())
    }

    /// Saves the completed scan to history.
    ///
    /// Guest sessions get a notice and nothing changes.
    ///
    /// # Errors
    /// - [`ScanError::PersistenceRefused`] in guest mode.
    /// - [`ScanError::InvalidAction`] unless the status is `Completed`.
    /// - [`ScanError::Store`] when the history cannot be written.
    pub fn save(&self) -> Result<HistoryEntry, ScanError> {
        let state = self.lock_state()?;
        self.require(&state, "save", ScanStatus::Completed)?;
        let Some(session) = state.session.as_ref() else {
            return Err(ScanError::InvalidAction {
                action: "save",
                status: state.status,
            });
        };

        if !self.inner.mode.is_secure() {
            let message = StoreError::Refused.to_string();
            warn!(session = session.id, "save refused for guest session");
            with_ui(&self.inner.ui, |ui| ui.notice = Some(message.clone()));
            self.publish(ScanEvent::Notice {
                session: Some(session.id),
                message,
            });
            return Err(ScanError::PersistenceRefused);
        }

        let entry = HistoryEntry::stamped_now(session.image.clone(), session.results.clone())?;
        self.inner.history.append(self.inner.mode, entry.clone())?;

        with_ui(&self.inner.ui, |ui| {
            ui.history.insert(0, entry.clone());
            ui.set_status(RESULT_SAVED_TEXT, Tone::Success);
        });
        info!(session = session.id, "scan result saved");
        self.publish(ScanEvent::Notice {
            session: Some(session.id),
            message: RESULT_SAVED_TEXT.to_string(),
        });
        Ok(entry)
    }

    /// Returns a finished scan to idle. A no-op when already idle.
    ///
    /// # Errors
    /// Returns [`ScanError::InvalidAction`] while a scan is in flight.
    pub fn reset(&self) -> Result<(), ScanError> {
        let mut state = self.lock_state()?;
        match state.status {
            ScanStatus::Idle => Ok(()),
            status if status.is_in_flight() => Err(ScanError::InvalidAction {
                action: "reset",
                status,
            }),
            _ => {
                self.discard(&mut state);
                Ok(())
            }
        }
    }

    fn open_session(&self, file: &ImageFile) -> Result<(u64, EpochToken), ScanError> {
        let mut state = self.lock_state()?;
        if state.status.is_in_flight() {
            debug!(name = file.name(), "scan in flight; file ignored");
            return Err(ScanError::Busy);
        }

        if let Err(rejection) = validate(file) {
            let message = rejection.to_string();
            warn!(mime = file.mime(), size = file.size(), reason = %message, "file rejected");
            with_ui(&self.inner.ui, |ui| ui.set_status(message.clone(), Tone::Error));
            self.publish(ScanEvent::Notice {
                session: state.session.as_ref().map(|session| session.id),
                message,
            });
            return Err(ScanError::Rejected(rejection));
        }

        if state.status.is_terminal() {
            self.discard(&mut state);
        }

        state.last_session_id += 1;
        let session_id = state.last_session_id;
        state.session = Some(ScanSession::open(session_id, file));
        self.transition(&mut state, ScanStatus::Validating);

        let token = self.inner.epoch.advance();
        state.gauge.reset();
        if let Some(stale) = state.timeline.take() {
            stale.cancel();
        }
        with_ui(&self.inner.ui, |ui| ui.enter_awaiting(file));
        state.timeline = Some(start_timeline(
            scan_phases(),
            self.inner.timings.timeline,
            self.inner.ui.clone(),
            token.clone(),
        ));
        self.transition(&mut state, ScanStatus::AwaitingResult);
        info!(session = session_id, name = file.name(), size = file.size(), "scan submitted");

        Ok((session_id, token))
    }

    fn resolve_session(
        &self,
        session_id: u64,
        token: &EpochToken,
        outcome: Result<Vec<ProviderResult>, GatewayError>,
    ) -> Result<CompletedScan, ScanError> {
        let mut state = self.lock_state()?;
        if let Some(timeline) = state.timeline.take() {
            timeline.cancel();
        }

        match outcome {
            Ok(results) => {
                let summary = summarize(results);
                let results = summary.results();
                let mean_score = summary.mean_score;

                if let Some(session) = state.session.as_mut() {
                    session.results = results.clone();
                    session.mean_score = Some(mean_score);
                }
                with_ui(&self.inner.ui, |ui| ui.enter_completed(results.clone()));
                state.gauge.animate_to(mean_score, token.clone());
                self.transition(&mut state, ScanStatus::Completed);
                info!(
                    session = session_id,
                    mean_score,
                    providers = results.len(),
                    numeric = summary.numeric_count(),
                    "scan completed"
                );

                Ok(CompletedScan {
                    session_id,
                    mean_score,
                    results,
                })
            }
            Err(error) => {
                with_ui(&self.inner.ui, UiState::enter_failed);
                self.transition(&mut state, ScanStatus::Failed);
                warn!(session = session_id, %error, "scan failed");
                Err(ScanError::Gateway(error))
            }
        }
    }

    fn abandon(&self, session_id: u64) {
        let Ok(mut state) = self.lock_state() else {
            return;
        };
        let in_flight = state.status == ScanStatus::AwaitingResult
            && state.session.as_ref().is_some_and(|s| s.id == session_id);
        if !in_flight {
            return;
        }

        if let Some(timeline) = state.timeline.take() {
            timeline.cancel();
        }
        with_ui(&self.inner.ui, UiState::enter_failed);
        self.transition(&mut state, ScanStatus::Failed);
        warn!(session = session_id, "scan abandoned before the analysis returned");
    }

    fn discard(&self, state: &mut ControllerState) {
        self.inner.epoch.advance();
        if let Some(timeline) = state.timeline.take() {
            timeline.cancel();
        }
        if let Some(pending) = state.pending_reset.take() {
            pending.cancel();
        }
        state.gauge.reset();
        with_ui(&self.inner.ui, |ui| ui.reset(self.inner.mode));
        self.transition(state, ScanStatus::Idle);
        state.session = None;
    }

    fn require(
        &self,
        state: &ControllerState,
        action: &'static str,
        expected: ScanStatus,
    ) -> Result<(), ScanError> {
        if state.status == expected {
            return Ok(());
        }
        debug!(action, status = %state.status, "action not available");
        Err(ScanError::InvalidAction {
            action,
            status: state.status,
        })
    }

    fn transition(&self, state: &mut ControllerState, to: ScanStatus) {
        let from = std::mem::replace(&mut state.status, to);
        let session = state.session.as_mut().map(|session| {
            session.status = to;
            session.id
        });
        info!(session = ?session, %from, %to, "scan status changed");
        self.publish(ScanEvent::StatusChanged { session, from, to });
    }

    fn publish(&self, event: ScanEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ControllerState>, ScanError> {
        self.inner.state.lock().map_err(|_| ScanError::Poisoned)
    }
}

/// Marks the session failed if the submitting future is dropped mid-flight.
struct InFlightGuard<'a> {
    controller: &'a ScanController,
    session_id: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.controller.abandon(self.session_id);
        }
    }
}
