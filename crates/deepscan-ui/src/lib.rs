#![warn(missing_docs)]
//! # deepscan-ui
//!
//! ## Purpose
//! Defines the display model of the scan screen and the two cosmetic
//! animations that drive it: the phase timeline and the score gauge.
//!
//! ## Responsibilities
//! - Represent status line, preview, timeline, gauge, results, scan actions,
//!   and history as one [`UiState`].
//! - Run the phase timeline on a fixed cadence with a hard deadline.
//! - Animate the gauge one unit per tick toward a target.
//! - Hand out cancellable [`TimerHandle`]s and session [`EpochToken`]s so a
//!   stale ticker never writes into a newer session's display.
//!
//! ## Data flow
//! The scan controller mutates [`UiState`] on transitions; timer tasks mutate
//! only the timeline and gauge views, and only while their epoch token is
//! current. Renderers read snapshots through [`with_ui`].
//!
//! ## Ownership and lifetimes
//! The state is shared as [`SharedUi`]; the lock is held only for short,
//! synchronous updates and never across an `.await`.
//!
//! ## Error model
//! Display updates cannot fail. A poisoned lock is recovered because the
//! display model has no invariants a panicking writer could half-apply.

mod gauge;
mod timeline;
mod timer;

use std::sync::{Arc, Mutex, PoisonError};

use deepscan_core::{HistoryEntry, ImageFile, ProviderResult, SessionMode};

pub use gauge::{GAUGE_RING_CIRCUMFERENCE, GAUGE_TICK, GaugeAnimator, step_toward};
pub use timeline::{
    FINALIZING_TEXT, PHASE_MAX_DURATION, PHASE_TICK, PhaseCursor, SCAN_PHASES, TimelineSettings,
    scan_phases, start_timeline,
};
pub use timer::{EpochToken, SessionEpoch, TimerHandle};

/// Status text after a successful scan.
pub const SCAN_COMPLETE_TEXT: &str = "Scan Complete";
/// Status text after a failed scan.
pub const SCAN_FAILED_TEXT: &str = "Scan Failed";
/// Status text after a saved result.
pub const RESULT_SAVED_TEXT: &str = "Result Saved";

/// Visual emphasis of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Plain informational text.
    Neutral,
    /// Work in progress.
    Busy,
    /// Positive outcome.
    Success,
    /// Failure or rejection.
    Error,
}

/// One-line status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Message text.
    pub text: String,
    /// Emphasis.
    pub tone: Tone,
}

/// Per-step rendering state of the timeline list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Not reached yet.
    Pending,
    /// Currently shown.
    Active,
    /// Already passed.
    Done,
}

/// Phase timeline projection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimelineView {
    /// Whether the timeline is shown.
    pub visible: bool,
    /// Phase labels in order.
    pub labels: Vec<String>,
    /// Index of the active phase.
    pub active: Option<usize>,
    /// Whether the driver may still advance the phases.
    pub running: bool,
}

impl TimelineView {
    /// Rendering state of every step.
    pub fn step_states(&self) -> Vec<StepState> {
        (0..self.labels.len())
            .map(|index| match self.active {
                Some(active) if index < active => StepState::Done,
                Some(active) if index == active => StepState::Active,
                _ => StepState::Pending,
            })
            .collect()
    }
}

/// Gauge projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GaugeView {
    /// Value currently shown.
    pub displayed: u8,
    /// Value the animation is heading to.
    pub target: u8,
}

impl GaugeView {
    /// Ring stroke offset for the target value; the ring is filled by target
    /// while the number counts up.
    pub fn stroke_offset(&self) -> f32 {
        GAUGE_RING_CIRCUMFERENCE - GAUGE_RING_CIRCUMFERENCE * f32::from(self.target) / 100.0
    }
}

/// Preview of the image under scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewView {
    /// Image reference.
    pub reference: String,
    /// MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
}

/// Aggregate display state of the scan screen.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    /// Header label (`Guest Mode` / `Secure Mode`).
    pub mode_label: String,
    /// Whether the history panel is locked.
    pub history_locked: bool,
    /// Status line.
    pub status: StatusLine,
    /// Image preview, if any.
    pub preview: Option<PreviewView>,
    /// Whether the scanning visual effect is on.
    pub scanning: bool,
    /// Whether a new file may be picked or dropped.
    pub upload_enabled: bool,
    /// Phase timeline.
    pub timeline: TimelineView,
    /// Score gauge.
    pub gauge: GaugeView,
    /// Provider results shown under the gauge.
    pub results: Vec<ProviderResult>,
    /// Whether back/confirm/save are shown.
    pub scan_actions_visible: bool,
    /// Last transient notice (refusals, confirmations).
    pub notice: Option<String>,
    /// Saved scans, newest first.
    pub history: Vec<HistoryEntry>,
}

impl UiState {
    /// Creates the initial screen for `mode`.
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode_label: mode.label().to_string(),
            history_locked: !mode.is_secure(),
            status: StatusLine {
                text: idle_status_text(mode).to_string(),
                tone: Tone::Neutral,
            },
            preview: None,
            scanning: false,
            upload_enabled: true,
            timeline: TimelineView::default(),
            gauge: GaugeView::default(),
            results: Vec::new(),
            scan_actions_visible: false,
            notice: None,
            history: Vec::new(),
        }
    }

    /// Replaces the status line.
    pub fn set_status(&mut self, text: impl Into<String>, tone: Tone) {
        self.status = StatusLine {
            text: text.into(),
            tone,
        };
    }

    /// Entry effects of a scan going in flight.
    ///
    /// The gauge is reset separately by the gauge animator.
    pub fn enter_awaiting(&mut self, file: &ImageFile) {
        self.results.clear();
        self.notice = None;
        self.scan_actions_visible = false;
        self.upload_enabled = false;
        self.scanning = true;
        self.preview = Some(PreviewView {
            reference: file.reference(),
            mime: file.mime().to_string(),
            size: file.size(),
        });
    }

    /// Entry effects of a successful scan.
    pub fn enter_completed(&mut self, results: Vec<ProviderResult>) {
        self.scanning = false;
        self.timeline.running = false;
        self.results = results;
        self.scan_actions_visible = true;
        self.upload_enabled = true;
        self.set_status(SCAN_COMPLETE_TEXT, Tone::Success);
    }

    /// Entry effects of a failed scan. Preview stays for retry.
    pub fn enter_failed(&mut self) {
        self.scanning = false;
        self.timeline.running = false;
        self.upload_enabled = true;
        self.set_status(SCAN_FAILED_TEXT, Tone::Error);
    }

    /// Returns the screen to its idle look. History is kept.
    pub fn reset(&mut self, mode: SessionMode) {
        self.preview = None;
        self.results.clear();
        self.notice = None;
        self.scan_actions_visible = false;
        self.scanning = false;
        self.upload_enabled = true;
        self.timeline = TimelineView::default();
        self.gauge = GaugeView::default();
        self.set_status(idle_status_text(mode), Tone::Neutral);
    }
}

/// Idle status line for `mode`.
pub fn idle_status_text(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Guest => "Guest Mode Active",
        SessionMode::Secure => "Secure Mode Active",
    }
}

/// Display state shared between the controller and timer tasks.
pub type SharedUi = Arc<Mutex<UiState>>;

/// Wraps a state for sharing.
pub fn share(state: UiState) -> SharedUi {
    Arc::new(Mutex::new(state))
}

/// Runs `f` with exclusive access to the display state.
pub fn with_ui<T>(ui: &SharedUi, f: impl FnOnce(&mut UiState) -> T) -> T {
    let mut guard = ui.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Clones the current display state.
pub fn snapshot(ui: &SharedUi) -> UiState {
    with_ui(ui, |state| state.clone())
}
