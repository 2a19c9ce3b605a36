//! Per-tick local input ring used when replaying predicted ticks.

use crate::sequence::Tick;

/// Default number of ticks of input kept.
pub const DEFAULT_INPUT_HISTORY_CAPACITY: usize = 64;

/// Input captured for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredInput<I> {
    /// Tick the input was sampled for.
    pub tick: Tick,
    /// The input itself.
    pub input: I,
}

/// Ring buffer of local inputs, oldest overwritten first.
#[derive(Clone, Debug)]
pub struct InputHistory<I> {
    inputs: Vec<StoredInput<I>>,
    write_index: usize,
    capacity: usize,
}

impl<I: Copy> InputHistory<I> {
    /// Creates an empty history. Capacity is clamped to at least one tick.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inputs: Vec::with_capacity(capacity),
            write_index: 0,
            capacity,
        }
    }

    /// Maximum number of ticks kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ticks stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Tick of the most recent input, or [`Tick::NONE`].
    #[must_use]
    pub fn latest_tick(&self) -> Tick {
        self.newest_first().next().map_or(Tick::NONE, |stored| stored.tick)
    }

    /// Records the input for `tick`.
    ///
    /// Returns false, leaving the ring untouched, when `tick` is the
    /// sentinel or not newer than the latest recorded tick.
    pub fn add(&mut self, tick: Tick, input: I) -> bool {
        if tick.is_none() {
            return false;
        }
        let latest = self.latest_tick();
        if !latest.is_none() && !tick.is_newer_than(latest) {
            return false;
        }

        let stored = StoredInput { tick, input };
        if self.inputs.len() < self.capacity {
            self.inputs.push(stored);
        } else {
            self.inputs[self.write_index] = stored;
        }
        self.write_index = (self.write_index + 1) % self.capacity;
        true
    }

    /// Inputs from newest to oldest.
    fn newest_first(&self) -> impl Iterator<Item = &StoredInput<I>> + '_ {
        let count = self.inputs.len();
        (0..count).map(move |i| {
            let idx = (self.write_index + self.capacity - 1 - i) % self.capacity;
            &self.inputs[idx]
        })
    }

    /// Input recorded for exactly `tick`.
    #[must_use]
    pub fn input_exact(&self, tick: Tick) -> Option<I> {
        self.newest_first()
            .find(|stored| stored.tick == tick)
            .map(|stored| stored.input)
    }

    /// Last known input at or before `tick`.
    ///
    /// Ticks with no sampled input repeat the previous one.
    #[must_use]
    pub fn input_at(&self, tick: Tick) -> Option<I> {
        self.newest_first()
            .find(|stored| !stored.tick.is_newer_than(tick))
            .map(|stored| stored.input)
    }

    /// Inputs newer than `tick`, oldest first.
    pub fn inputs_after(&self, tick: Tick) -> impl Iterator<Item = StoredInput<I>> + '_ {
        let mut newer: Vec<StoredInput<I>> = self
            .newest_first()
            .take_while(|stored| stored.tick.is_newer_than(tick))
            .copied()
            .collect();
        newer.reverse();
        newer.into_iter()
    }

    /// Drops every input.
    pub fn clear(&mut self) {
        self.inputs.clear();
        self.write_index = 0;
    }
}
