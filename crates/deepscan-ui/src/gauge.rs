//! Score gauge animator.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::timer::{EpochToken, TimerHandle};
use crate::{SharedUi, with_ui};

/// Interval between gauge steps.
pub const GAUGE_TICK: Duration = Duration::from_millis(16);

/// Stroke length of the gauge ring.
pub const GAUGE_RING_CIRCUMFERENCE: f32 = 126.0;

/// Next displayed value one unit closer to `target`.
pub fn step_toward(current: u8, target: u8) -> u8 {
    match current.cmp(&target) {
        std::cmp::Ordering::Less => current + 1,
        std::cmp::Ordering::Greater => current - 1,
        std::cmp::Ordering::Equal => current,
    }
}

/// Drives the displayed gauge value with at most one ticker at a time.
#[derive(Debug)]
pub struct GaugeAnimator {
    ui: SharedUi,
    tick: Duration,
    ticker: Option<TimerHandle>,
}

impl GaugeAnimator {
    /// Creates an idle animator writing into `ui`.
    pub fn new(ui: SharedUi, tick: Duration) -> Self {
        Self {
            ui,
            tick,
            ticker: None,
        }
    }

    /// Animates from the current displayed value to `target` (clamped to
    /// 100), one unit per tick.
    ///
    /// Any running animation is cancelled first.
    ///
    /// # Panics
    /// Panics outside a tokio runtime.
    pub fn animate_to(&mut self, target: u8, token: EpochToken) {
        self.cancel();
        let target = target.min(100);

        let already_there = with_ui(&self.ui, |state| {
            state.gauge.target = target;
            state.gauge.displayed == target
        });
        if already_there {
            return;
        }

        let ui = self.ui.clone();
        let tick = self.tick;
        self.ticker = Some(TimerHandle::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let finished = with_ui(&ui, |state| {
                    if !token.is_current() || state.gauge.target != target {
                        return true;
                    }
                    state.gauge.displayed = step_toward(state.gauge.displayed, target);
                    state.gauge.displayed == target
                });
                if finished {
                    debug!(epoch = token.value(), target, "gauge animation finished");
                    break;
                }
            }
        }));
    }

    /// Cancels any animation and forces displayed value and target to 0.
    pub fn reset(&mut self) {
        self.cancel();
        with_ui(&self.ui, |state| {
            state.gauge.displayed = 0;
            state.gauge.target = 0;
        });
    }

    /// Cancels any animation, leaving the displayed value where it is.
    pub fn cancel(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Returns `true` while a ticker is running.
    pub fn is_animating(&self) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }
}
