//! # Archetype Tables
//!
//! Each registered archetype gets one table of rows:
//!
//! ```text
//!  GhostTable<Character>
//!  ┌────────┬────────┬──────────────────┬────────────┬────────────────┐
//!  │ entity │ net_id │ SnapshotHistory  │ Components │ PredictedState │
//!  ├────────┼────────┼──────────────────┼────────────┼────────────────┤
//!  │ 0v1    │ 42     │ [t=98 t=99 ...]  │ {...}      │ None (remote)  │
//!  │ 3v2    │ 17     │ [t=97 t=99 ...]  │ {...}      │ Some(start=99) │
//!  └────────┴────────┴──────────────────┴────────────┴────────────────┘
//! ```
//!
//! Passes hand disjoint chunks of rows to rayon workers. The table is
//! erased behind [`ReplicatedTable`] so the session can hold every
//! archetype in one map.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use specter_core::{ChunkedPass, ComponentAccess, EntityId, EntityQuery};

use crate::diagnostics::PassScratch;
use crate::ghost_map::{GhostMap, NetId};
use crate::history::SnapshotHistory;
use crate::prediction::{PredictedState, PredictionStep};
use crate::schema::{ArchetypeId, FieldDescriptor, FieldReader, GhostArchetype};
use crate::sequence::Tick;

/// One replicated ghost.
#[derive(Debug)]
struct GhostRow<C> {
    entity: EntityId,
    net_id: NetId,
    history: SnapshotHistory,
    components: C,
    /// `Some` for locally owned, predicted ghosts.
    prediction: Option<PredictedState>,
}

/// Type-erased view of a [`GhostTable`].
///
/// [`EntityQuery`] enumerates the table's ghosts; passes skip a table whose
/// query is empty.
pub trait ReplicatedTable: EntityQuery + Send + Sync {
    /// Archetype stored in this table.
    fn archetype(&self) -> ArchetypeId;

    /// Archetype name.
    fn name(&self) -> &'static str;

    /// Archetype field list.
    fn schema(&self) -> &'static [FieldDescriptor];

    /// Adds a row with default components and an empty history.
    fn spawn(&mut self, entity: EntityId, net_id: NetId, predicted: bool);

    /// Removes a row. Returns false if the entity is not in this table.
    fn despawn(&mut self, entity: EntityId) -> bool;

    /// History of one ghost.
    fn history(&self, entity: EntityId) -> Option<&SnapshotHistory>;

    /// Mutable history of one ghost.
    fn history_mut(&mut self, entity: EntityId) -> Option<&mut SnapshotHistory>;

    /// Prediction bookkeeping of one ghost, `None` for remote ghosts.
    fn prediction(&self, entity: EntityId) -> Option<PredictedState>;

    /// Samples every remote ghost at `tick + fraction`.
    fn interpolate_pass(&mut self, ghosts: &GhostMap, tick: Tick, fraction: f32) -> PassScratch;

    /// Reconciles every predicted ghost against its history.
    fn predict_pass(&mut self, ghosts: &GhostMap, step: PredictionStep) -> PassScratch;

    /// Resets every predicted ghost to the unreconciled state.
    fn reset_prediction(&mut self);

    /// Drops every row.
    fn clear(&mut self);

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed mutable access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Rows of one archetype.
pub struct GhostTable<A: GhostArchetype> {
    rows: Vec<GhostRow<A::Components>>,
    index: HashMap<EntityId, usize>,
    history_capacity: usize,
    pass: ChunkedPass,
    _archetype: PhantomData<fn() -> A>,
}

impl<A: GhostArchetype> GhostTable<A> {
    /// Creates an empty table.
    #[must_use]
    pub fn new(history_capacity: usize, pass: ChunkedPass) -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
            history_capacity,
            pass,
            _archetype: PhantomData,
        }
    }

    fn row(&self, entity: EntityId) -> Option<&GhostRow<A::Components>> {
        self.index.get(&entity).map(|&i| &self.rows[i])
    }

    fn row_mut(&mut self, entity: EntityId) -> Option<&mut GhostRow<A::Components>> {
        self.index.get(&entity).map(|&i| &mut self.rows[i])
    }

    /// Network id of a ghost in this table.
    #[must_use]
    pub fn net_id(&self, entity: EntityId) -> Option<NetId> {
        self.row(entity).map(|row| row.net_id)
    }
}

impl<A: GhostArchetype> ComponentAccess<A::Components> for GhostTable<A> {
    fn component(&self, entity: EntityId) -> Option<&A::Components> {
        self.row(entity).map(|row| &row.components)
    }

    fn component_mut(&mut self, entity: EntityId) -> Option<&mut A::Components> {
        self.row_mut(entity).map(|row| &mut row.components)
    }
}

impl<A: GhostArchetype> EntityQuery for GhostTable<A> {
    fn matching_entities(&self) -> Vec<EntityId> {
        self.rows.iter().map(|row| row.entity).collect()
    }

    fn is_empty_query(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<A: GhostArchetype> ReplicatedTable for GhostTable<A> {
    fn archetype(&self) -> ArchetypeId {
        A::ID
    }

    fn name(&self) -> &'static str {
        A::NAME
    }

    fn schema(&self) -> &'static [FieldDescriptor] {
        A::FIELDS
    }

    fn spawn(&mut self, entity: EntityId, net_id: NetId, predicted: bool) {
        if self.index.contains_key(&entity) {
            return;
        }
        self.index.insert(entity, self.rows.len());
        self.rows.push(GhostRow {
            entity,
            net_id,
            history: SnapshotHistory::new(self.history_capacity, A::FIELDS),
            components: A::Components::default(),
            prediction: predicted.then_some(PredictedState::FRESH),
        });
    }

    fn despawn(&mut self, entity: EntityId) -> bool {
        let Some(index) = self.index.remove(&entity) else {
            return false;
        };
        self.rows.swap_remove(index);
        if let Some(moved) = self.rows.get(index) {
            self.index.insert(moved.entity, index);
        }
        true
    }

    fn history(&self, entity: EntityId) -> Option<&SnapshotHistory> {
        self.row(entity).map(|row| &row.history)
    }

    fn history_mut(&mut self, entity: EntityId) -> Option<&mut SnapshotHistory> {
        self.row_mut(entity).map(|row| &mut row.history)
    }

    fn prediction(&self, entity: EntityId) -> Option<PredictedState> {
        self.row(entity).and_then(|row| row.prediction)
    }

    fn interpolate_pass(&mut self, ghosts: &GhostMap, tick: Tick, fraction: f32) -> PassScratch {
        self.pass.run(&mut self.rows, |scratch: &mut PassScratch, _, chunk| {
            for row in chunk.iter_mut().filter(|row| row.prediction.is_none()) {
                scratch.latest.include(row.history.latest_tick());

                let mut sample = std::mem::take(&mut scratch.sample_buf);
                if row.history.sample_interpolated_into(tick, fraction, &mut sample) {
                    let mut fields = FieldReader::new(
                        A::NAME,
                        A::FIELDS,
                        &sample,
                        ghosts,
                        &mut scratch.unresolved,
                    );
                    A::apply(&mut fields, &mut row.components);
                    scratch.applied += 1;
                } else {
                    scratch.skipped += 1;
                }
                scratch.sample_buf = sample;
            }
        })
    }

    fn predict_pass(&mut self, ghosts: &GhostMap, step: PredictionStep) -> PassScratch {
        self.pass.run(&mut self.rows, |scratch: &mut PassScratch, _, chunk| {
            for row in chunk.iter_mut() {
                let Some(state) = row.prediction.as_mut() else {
                    continue;
                };
                scratch.latest.include(row.history.latest_tick());

                let Some(record) = row.history.sample_at_or_before(step.target) else {
                    scratch.buffer_misses += 1;
                    continue;
                };

                let apply = step.reconcile(state, record.tick);
                scratch.starts.include(state.prediction_start_tick);
                if apply {
                    let mut fields = FieldReader::new(
                        A::NAME,
                        A::FIELDS,
                        &record.fields,
                        ghosts,
                        &mut scratch.unresolved,
                    );
                    A::apply(&mut fields, &mut row.components);
                    scratch.applied += 1;
                } else {
                    scratch.skipped += 1;
                }
            }
        })
    }

    fn reset_prediction(&mut self) {
        for row in &mut self.rows {
            if let Some(state) = row.prediction.as_mut() {
                *state = PredictedState::FRESH;
            }
        }
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
