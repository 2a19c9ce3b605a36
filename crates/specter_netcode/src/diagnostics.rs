//! # Tick Diagnostics
//!
//! Anomalies never abort a pass. They are counted per worker, merged after
//! the join, summarized in a report and, for the ones worth a human's
//! attention, forwarded to a [`DiagnosticsSink`].
//!
//! ```text
//!  worker 0 ─ PassScratch ─┐
//!  worker 1 ─ PassScratch ─┼─ merge ─▶ StepReport ─▶ sink (desync, unresolved)
//!  worker N ─ PassScratch ─┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use specter_core::Scratch;
use thiserror::Error;

use crate::error::NetcodeError;
use crate::ghost_map::NetId;
use crate::protocol::MessageKind;
use crate::schema::FieldValue;
use crate::sequence::Tick;

// ============================================================================
// TICK RANGE
// ============================================================================

/// Wrap-aware min/max over a set of ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickRange {
    bounds: Option<(Tick, Tick)>,
}

impl TickRange {
    /// Empty range.
    #[must_use]
    pub const fn new() -> Self {
        Self { bounds: None }
    }

    /// Widens the range to include `tick`. The sentinel is ignored.
    pub fn include(&mut self, tick: Tick) {
        if tick.is_none() {
            return;
        }
        self.bounds = Some(match self.bounds {
            None => (tick, tick),
            Some((min, max)) => (
                if min.is_newer_than(tick) { tick } else { min },
                if tick.is_newer_than(max) { tick } else { max },
            ),
        });
    }

    /// Union of two ranges.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let mut merged = self;
        if let Some((min, max)) = other.bounds {
            merged.include(min);
            merged.include(max);
        }
        merged
    }

    /// Oldest tick seen, or [`Tick::NONE`].
    #[must_use]
    pub fn min(&self) -> Tick {
        self.bounds.map_or(Tick::NONE, |(min, _)| min)
    }

    /// Newest tick seen, or [`Tick::NONE`].
    #[must_use]
    pub fn max(&self) -> Tick {
        self.bounds.map_or(Tick::NONE, |(_, max)| max)
    }

    /// Ticks between oldest and newest.
    #[must_use]
    pub fn spread(&self) -> u32 {
        self.bounds.map_or(0, |(min, max)| max.ticks_since(min))
    }

    /// Returns true if no tick was included.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }
}

// ============================================================================
// PASS SCRATCH
// ============================================================================

/// A reference field class that failed to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnresolvedRef {
    /// Archetype name.
    pub archetype: &'static str,
    /// Field name.
    pub field: &'static str,
}

/// Per-worker accumulator for the interpolation and prediction passes.
#[derive(Debug, Default)]
pub struct PassScratch {
    /// Latest received ticks of visited ghosts.
    pub latest: TickRange,
    /// Oldest prediction start among visited ghosts.
    pub starts: TickRange,
    /// Ghosts whose components were written.
    pub applied: usize,
    /// Ghosts visited but left untouched.
    pub skipped: usize,
    /// Predicted ghosts with no record at or before the target tick.
    pub buffer_misses: usize,
    /// Unresolved reference classes seen by this worker.
    pub unresolved: Vec<UnresolvedRef>,
    /// Reusable sample buffer.
    pub sample_buf: Vec<FieldValue>,
}

impl Scratch for PassScratch {
    fn merge(mut self, other: Self) -> Self {
        self.latest = self.latest.union(other.latest);
        self.starts = self.starts.union(other.starts);
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.buffer_misses += other.buffer_misses;
        for class in other.unresolved {
            if !self.unresolved.contains(&class) {
                self.unresolved.push(class);
            }
        }
        self
    }
}

// ============================================================================
// ANOMALIES
// ============================================================================

/// Non-fatal conditions surfaced by the receive path and the passes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// A snapshot arrived for a tick that is not newer than the latest one.
    #[error("stale update for {net_id}: {tick} is not newer than {latest}")]
    StaleUpdate {
        /// Ghost the snapshot was for.
        net_id: NetId,
        /// Tick carried by the snapshot.
        tick: Tick,
        /// Latest tick already stored.
        latest: Tick,
    },

    /// A reference field named a ghost that is not bound locally.
    #[error("unresolved ghost reference in {archetype}.{field}")]
    UnresolvedReference {
        /// Archetype name.
        archetype: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// Predicted ghosts had no record at or before the target tick.
    #[error("{count} {archetype} ghosts had no history at {tick}")]
    BufferMiss {
        /// Archetype name.
        archetype: &'static str,
        /// Number of ghosts skipped.
        count: usize,
        /// Target tick of the step.
        tick: Tick,
    },

    /// One message of a batch could not be applied. The rest of the batch was.
    #[error("rejected {kind:?} for {net_id}: {reason}")]
    RejectedMessage {
        /// Kind of the rejected message.
        kind: MessageKind,
        /// Ghost the message was for.
        net_id: NetId,
        /// Why it was rejected.
        reason: NetcodeError,
    },

    /// Latest received ticks diverged by more than the configured threshold.
    #[error("desync detected: latest ticks span {min}..{max} ({spread} > {threshold})")]
    DesyncDetected {
        /// Oldest latest-tick among sampled ghosts.
        min: Tick,
        /// Newest latest-tick among sampled ghosts.
        max: Tick,
        /// Distance between the two.
        spread: u32,
        /// Configured threshold.
        threshold: u32,
    },
}

// ============================================================================
// SINKS
// ============================================================================

/// External telemetry for anomalies.
pub trait DiagnosticsSink: Send + Sync {
    /// Receives one anomaly. Must not block.
    fn report(&self, anomaly: &Anomaly);
}

/// Sink that writes anomalies to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, anomaly: &Anomaly) {
        match anomaly {
            Anomaly::UnresolvedReference { .. }
            | Anomaly::RejectedMessage { .. }
            | Anomaly::DesyncDetected { .. } => {
                tracing::warn!("{anomaly}");
            }
            Anomaly::StaleUpdate { .. } | Anomaly::BufferMiss { .. } => {
                tracing::debug!("{anomaly}");
            }
        }
    }
}

/// Sink that forwards anomalies to a telemetry thread.
///
/// Sending never blocks: when the channel is full the anomaly is dropped and
/// counted.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<Anomaly>,
    dropped: AtomicUsize,
}

impl ChannelSink {
    /// Creates a sink with a bounded channel and returns its receiving end.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Anomaly>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self::from_sender(sender), receiver)
    }

    /// Creates a sink with an unbounded channel.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<Anomaly>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::from_sender(sender), receiver)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub fn from_sender(sender: Sender<Anomaly>) -> Self {
        Self {
            sender,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Anomalies lost to a full or disconnected channel.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl DiagnosticsSink for ChannelSink {
    fn report(&self, anomaly: &Anomaly) {
        match self.sender.try_send(anomaly.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// Summary of one interpolation or prediction step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Tick the step ran for.
    pub tick: Tick,
    /// Ghosts visited.
    pub visited: usize,
    /// Ghosts whose components were written.
    pub applied: usize,
    /// Ghosts visited but left untouched.
    pub skipped: usize,
    /// Predicted ghosts skipped for lack of history.
    pub buffer_misses: usize,
    /// Distinct unresolved reference classes seen this step.
    pub unresolved: usize,
    /// Wrap-aware range of the visited ghosts' latest ticks.
    pub latest: TickRange,
    /// Oldest prediction start tick, or [`Tick::NONE`].
    pub oldest_prediction_start: Tick,
    /// Set when the latest-tick spread exceeded the threshold.
    pub desync: bool,
}

/// Summary of one received batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Ghosts spawned.
    pub spawned: usize,
    /// Snapshot records stored.
    pub inserted: usize,
    /// Snapshots rejected as stale.
    pub stale: usize,
    /// Snapshots for ghosts that are not bound locally.
    pub unknown: usize,
    /// Messages that failed and were left out of the batch.
    pub rejected: usize,
    /// Ghosts despawned.
    pub despawned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_range_is_wrap_aware() {
        let mut range = TickRange::new();
        range.include(Tick::new(3));
        range.include(Tick::new(u32::MAX - 2));
        range.include(Tick::NONE);

        assert_eq!(range.min(), Tick::new(u32::MAX - 2));
        assert_eq!(range.max(), Tick::new(3));
        assert_eq!(range.spread(), 6);
    }

    #[test]
    fn test_union_matches_single_pass() {
        let ticks = [10u32, 40, 25, 7, 31];
        let mut single = TickRange::new();
        for t in ticks {
            single.include(Tick::new(t));
        }

        let mut left = TickRange::new();
        let mut right = TickRange::new();
        for (i, t) in ticks.iter().enumerate() {
            if i % 2 == 0 {
                left.include(Tick::new(*t));
            } else {
                right.include(Tick::new(*t));
            }
        }

        assert_eq!(left.union(right), single);
        assert_eq!(right.union(TickRange::new()), right);
    }

    #[test]
    fn test_scratch_merge_dedups_unresolved() {
        let class = UnresolvedRef {
            archetype: "character",
            field: "target",
        };
        let a = PassScratch {
            applied: 2,
            unresolved: vec![class],
            ..PassScratch::default()
        };
        let b = PassScratch {
            applied: 3,
            buffer_misses: 1,
            unresolved: vec![class],
            ..PassScratch::default()
        };

        let merged = a.merge(b);
        assert_eq!(merged.applied, 5);
        assert_eq!(merged.buffer_misses, 1);
        assert_eq!(merged.unresolved, vec![class]);
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, receiver) = ChannelSink::bounded(1);
        let anomaly = Anomaly::UnresolvedReference {
            archetype: "character",
            field: "target",
        };

        sink.report(&anomaly);
        sink.report(&anomaly);

        assert_eq!(receiver.try_recv(), Ok(anomaly));
        assert_eq!(sink.dropped(), 1);
    }
}
