//! # Client-Side Prediction
//!
//! Locally owned ghosts run ahead of the server. Every simulation step the
//! controller decides, per ghost, where the replay of local inputs has to
//! start from:
//!
//! ```text
//!  server record ──▶ applied_tick == record?  ──no──▶ start = record (correction)
//!                          │ yes
//!                          ▼
//!                    last predicted ahead? ──no──▶ start = record
//!                          │ yes
//!                          ▼
//!                    start = last predicted (keep running ahead)
//! ```
//!
//! When the start is the server tick the record is written into the live
//! components, and the external replay pass re-simulates every tick in
//! `(start, target]` from there. The oldest start across all ghosts bounds
//! that replay ([`ReplayPlan`]).

mod input;

pub use input::{InputHistory, StoredInput, DEFAULT_INPUT_HISTORY_CAPACITY};

use crate::sequence::Tick;

/// Reconciliation bookkeeping for one predicted ghost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PredictedState {
    /// Server tick of the record most recently reconciled against.
    pub applied_tick: Tick,
    /// Tick the local replay starts from.
    pub prediction_start_tick: Tick,
}

impl PredictedState {
    /// State of a ghost that has not been reconciled yet.
    pub const FRESH: Self = Self {
        applied_tick: Tick::NONE,
        prediction_start_tick: Tick::NONE,
    };
}

/// Returns true iff the replay pass should simulate `tick` for this ghost.
#[inline]
#[must_use]
pub fn should_predict(tick: Tick, state: &PredictedState) -> bool {
    tick.is_newer_than(state.prediction_start_tick)
}

/// Step-level prediction clock.
///
/// Remembers the last fully simulated tick between steps. A partial step
/// (fraction below one) forgets it, so the next step starts from the server
/// record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PredictionController {
    last_predicted_tick: Tick,
}

impl PredictionController {
    /// Creates a controller with nothing predicted yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_predicted_tick: Tick::NONE,
        }
    }

    /// Last fully predicted tick, or [`Tick::NONE`].
    #[must_use]
    pub const fn last_predicted_tick(&self) -> Tick {
        self.last_predicted_tick
    }

    /// Opens a step toward `target`.
    #[must_use]
    pub const fn begin(&self, target: Tick) -> PredictionStep {
        PredictionStep {
            target,
            last_predicted: self.last_predicted_tick,
        }
    }

    /// Closes a step, remembering `target` unless the step was partial.
    pub fn complete(&mut self, step: PredictionStep, fraction: f32) {
        self.last_predicted_tick = if fraction < 1.0 {
            Tick::NONE
        } else {
            step.target
        };
    }

    /// Forgets all prediction progress.
    pub fn reset(&mut self) {
        self.last_predicted_tick = Tick::NONE;
    }
}

/// One prediction step, shared read-only by every worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PredictionStep {
    /// Server tick being predicted toward.
    pub target: Tick,
    /// Last fully predicted tick when the step began.
    pub last_predicted: Tick,
}

impl PredictionStep {
    /// Reconciles one ghost against the server record at `record_tick`.
    ///
    /// Updates `state` and returns true when the record must be written into
    /// the live components.
    pub fn reconcile(&self, state: &mut PredictedState, record_tick: Tick) -> bool {
        // A new record is a correction; otherwise keep running ahead when
        // the previous step already got past it.
        let running_ahead = !self.last_predicted.is_none()
            && state.applied_tick == record_tick
            && self.last_predicted.is_newer_than(record_tick);
        let start = if running_ahead {
            self.last_predicted
        } else {
            record_tick
        };

        *state = PredictedState {
            applied_tick: record_tick,
            prediction_start_tick: start,
        };
        start == record_tick
    }
}

/// Ticks the replay pass has to simulate, oldest first.
///
/// Covers `(start, target]`; empty when `start` is not older than `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayPlan {
    next: Tick,
    target: Tick,
    done: bool,
}

impl ReplayPlan {
    /// Plans a replay from just after `start` up to and including `target`.
    ///
    /// A sentinel on either end means nothing needs replaying.
    #[must_use]
    pub fn new(start: Tick, target: Tick) -> Self {
        Self {
            next: start.next(),
            target,
            done: start.is_none() || target.is_none() || !target.is_newer_than(start),
        }
    }

    /// Number of ticks left.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        if self.done {
            return 0;
        }
        let span = self.target.ticks_since(self.next) + 1;
        // The sentinel is skipped when the range crosses zero.
        if self.next.get() > self.target.get() {
            span - 1
        } else {
            span
        }
    }
}

impl Iterator for ReplayPlan {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        if self.done {
            return None;
        }
        let tick = self.next;
        if tick == self.target {
            self.done = true;
        } else {
            self.next = tick.next();
        }
        Some(tick)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}
