//! Phase timeline driver.
//!
//! The timeline is cosmetic pacing. It never waits for, nor signals, the
//! analysis result; the controller cancels it when the result arrives.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::debug;

use crate::timer::{EpochToken, TimerHandle};
use crate::{SharedUi, Tone, with_ui};

/// Phase labels shown while a scan is in flight.
pub const SCAN_PHASES: [&str; 4] = [
    "Extracting image features…",
    "Analyzing pixel consistency…",
    "Verifying metadata integrity…",
    "Running GAN detection models…",
];

/// Status text once the deadline passes without a result.
pub const FINALIZING_TEXT: &str = "Finalizing analysis…";

/// Interval between phase advances.
pub const PHASE_TICK: Duration = Duration::from_millis(900);

/// Deadline after which the timeline stops advancing.
pub const PHASE_MAX_DURATION: Duration = Duration::from_millis(4500);

/// Owned copy of [`SCAN_PHASES`].
pub fn scan_phases() -> Vec<String> {
    SCAN_PHASES.iter().map(|phase| phase.to_string()).collect()
}

/// Timeline pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSettings {
    /// Interval between advances.
    pub tick: Duration,
    /// Deadline measured from start.
    pub max_duration: Duration,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            tick: PHASE_TICK,
            max_duration: PHASE_MAX_DURATION,
        }
    }
}

/// Monotonic position in a phase list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCursor {
    index: usize,
    len: usize,
}

impl PhaseCursor {
    /// Cursor at phase 0, or `None` for an empty list.
    pub fn new(len: usize) -> Option<Self> {
        (len > 0).then_some(Self { index: 0, len })
    }

    /// Current phase index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` when the final phase is shown.
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.len
    }

    /// Moves one phase forward; `None` when already at the final phase.
    pub fn advance(&mut self) -> Option<usize> {
        if self.is_last() {
            return None;
        }
        self.index += 1;
        Some(self.index)
    }

    /// Jumps to the final phase.
    pub fn force_final(&mut self) -> usize {
        self.index = self.len - 1;
        self.index
    }
}

/// Starts the timeline: phase 0 is shown before this returns, later phases
/// every `settings.tick`, until the last phase is shown or
/// `settings.max_duration` elapses.
///
/// At the deadline the final phase is forced, the status becomes
/// [`FINALIZING_TEXT`], and the task ends. Writes are dropped once `token`
/// is stale or once the display leaves the running state (the scan
/// resolved), so a tick racing the resolution never overwrites the outcome.
///
/// # Panics
/// Panics outside a tokio runtime.
pub fn start_timeline(
    phases: Vec<String>,
    settings: TimelineSettings,
    ui: SharedUi,
    token: EpochToken,
) -> TimerHandle {
    let Some(mut cursor) = PhaseCursor::new(phases.len()) else {
        return TimerHandle::spawn(async {});
    };

    with_ui(&ui, |state| {
        state.timeline.visible = true;
        state.timeline.labels = phases.clone();
        state.timeline.active = Some(0);
        state.timeline.running = true;
        state.set_status(phases[0].clone(), Tone::Busy);
    });

    let started = Instant::now();
    let deadline = started + settings.max_duration;

    TimerHandle::spawn(async move {
        let mut ticker = interval_at(started + settings.tick, settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    let index = cursor.force_final();
                    with_ui(&ui, |state| {
                        if token.is_current() && state.timeline.running {
                            state.timeline.active = Some(index);
                            state.timeline.running = false;
                            state.set_status(FINALIZING_TEXT, Tone::Busy);
                        }
                    });
                    debug!(epoch = token.value(), "phase timeline reached deadline");
                    break;
                }
                _ = ticker.tick(), if !cursor.is_last() => {
                    if let Some(index) = cursor.advance() {
                        with_ui(&ui, |state| {
                            if token.is_current() && state.timeline.running {
                                state.timeline.active = Some(index);
                                state.set_status(phases[index].clone(), Tone::Busy);
                            }
                        });
                    }
                }
            }
        }
    })
}
