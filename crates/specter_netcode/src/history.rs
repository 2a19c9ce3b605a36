//! # Snapshot History
//!
//! Fixed-capacity ring of authoritative records for one ghost.
//!
//! ```text
//!  slots:  [ t=34 ][ t=35 ][ t=36 ][ t=33 ]      capacity 4
//!                            ▲        ▲
//!                         newest    oldest (next overwrite)
//! ```
//!
//! Records arrive in strictly increasing wraparound tick order; anything
//! else is stale and dropped. Lookups walk newest to oldest, which is also
//! the order the samplers need.

use crate::schema::{FieldDescriptor, FieldValue};
use crate::sequence::Tick;

/// Default ring capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// One authoritative state of a ghost at one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotRecord {
    /// Server tick the state belongs to.
    pub tick: Tick,
    /// Field values in schema order.
    pub fields: Vec<FieldValue>,
}

/// Result of [`SnapshotHistory::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record is now the newest one.
    Inserted,
    /// The tick was not newer than the latest stored tick, or was the
    /// sentinel. Nothing changed.
    Stale,
}

impl InsertOutcome {
    /// Returns true if the record was stored.
    #[inline]
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Per-ghost ring buffer of snapshot records.
#[derive(Clone, Debug)]
pub struct SnapshotHistory {
    schema: &'static [FieldDescriptor],
    slots: Vec<SnapshotRecord>,
    /// Index of the oldest record once the ring is full; 0 before that.
    head: usize,
    capacity: usize,
}

impl SnapshotHistory {
    /// Creates an empty history for an archetype's field list.
    ///
    /// Capacity is clamped to at least one record.
    #[must_use]
    pub fn new(capacity: usize, schema: &'static [FieldDescriptor]) -> Self {
        let capacity = capacity.max(1);
        Self {
            schema,
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Field list this history blends with.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &'static [FieldDescriptor] {
        self.schema
    }

    /// Maximum number of records kept.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records currently stored.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing has been stored yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    /// Slot index of the `age`-th newest record (0 = newest).
    #[inline]
    fn slot_of(&self, age: usize) -> usize {
        (self.head + self.slots.len() - 1 - age) % self.capacity
    }

    /// Newest record, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&SnapshotRecord> {
        if self.slots.is_empty() {
            None
        } else {
            Some(&self.slots[self.slot_of(0)])
        }
    }

    /// Newest stored tick, or [`Tick::NONE`] when empty.
    #[must_use]
    pub fn latest_tick(&self) -> Tick {
        self.latest().map_or(Tick::NONE, |record| record.tick)
    }

    /// Iterates records from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &SnapshotRecord> + '_ {
        (0..self.slots.len()).map(move |age| &self.slots[self.slot_of(age)])
    }

    /// Stores a record, evicting the oldest one when full.
    pub fn insert(&mut self, tick: Tick, fields: &[FieldValue]) -> InsertOutcome {
        if tick.is_none() {
            return InsertOutcome::Stale;
        }
        if let Some(latest) = self.latest() {
            if !tick.is_newer_than(latest.tick) {
                return InsertOutcome::Stale;
            }
        }

        if self.slots.len() < self.capacity {
            self.slots.push(SnapshotRecord {
                tick,
                fields: fields.to_vec(),
            });
        } else {
            // Reuse the evicted record's allocation.
            let slot = &mut self.slots[self.head];
            slot.tick = tick;
            slot.fields.clear();
            slot.fields.extend_from_slice(fields);
            self.head = (self.head + 1) % self.capacity;
        }
        InsertOutcome::Inserted
    }

    /// Record stored for exactly `tick`.
    #[must_use]
    pub fn sample_exact(&self, tick: Tick) -> Option<&SnapshotRecord> {
        self.iter().find(|record| record.tick == tick)
    }

    /// Newest record whose tick is not newer than `tick`.
    #[must_use]
    pub fn sample_at_or_before(&self, tick: Tick) -> Option<&SnapshotRecord> {
        self.iter().find(|record| !record.tick.is_newer_than(tick))
    }

    /// Field values at `tick` advanced by `fraction` toward the next record.
    ///
    /// See [`SnapshotHistory::sample_interpolated_into`].
    #[must_use]
    pub fn sample_interpolated(&self, tick: Tick, fraction: f32) -> Option<Vec<FieldValue>> {
        let mut out = Vec::with_capacity(self.schema.len());
        self.sample_interpolated_into(tick, fraction, &mut out)
            .then_some(out)
    }

    /// Writes the interpolated field values into `out`.
    ///
    /// With `t0` the newest record at or before `tick` and `t1` the record
    /// right after it, the blend weight is
    /// `((tick - t0) + fraction * (t1 - tick)) / (t1 - t0)`. Without `t1` the
    /// values of `t0` are held. Returns false, leaving `out` empty, when no
    /// record is at or before `tick`.
    pub fn sample_interpolated_into(
        &self,
        tick: Tick,
        fraction: f32,
        out: &mut Vec<FieldValue>,
    ) -> bool {
        out.clear();

        let mut newer: Option<&SnapshotRecord> = None;
        let mut before: Option<&SnapshotRecord> = None;
        for record in self.iter() {
            if record.tick.is_newer_than(tick) {
                newer = Some(record);
            } else {
                before = Some(record);
                break;
            }
        }

        let Some(t0) = before else {
            return false;
        };
        let Some(t1) = newer else {
            out.extend_from_slice(&t0.fields);
            return true;
        };

        let fraction = fraction.clamp(0.0, 1.0);
        let span = t1.tick.ticks_since(t0.tick) as f32;
        let elapsed = tick.ticks_since(t0.tick) as f32;
        let remaining = t1.tick.ticks_since(tick) as f32;
        let weight = ((elapsed + fraction * remaining) / span).clamp(0.0, 1.0);

        out.extend(
            t0.fields
                .iter()
                .zip(&t1.fields)
                .zip(self.schema)
                .map(|((a, b), descriptor)| a.blend(b, weight, descriptor.blend)),
        );
        true
    }
}
