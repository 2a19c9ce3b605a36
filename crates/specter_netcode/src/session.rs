//! # Replication Session
//!
//! Owns everything one client connection replicates: the ghost identity
//! map, local handles, one table per archetype and the prediction clock.
//!
//! ## Step Order
//!
//! ```text
//!  ┌──────────────┐   ┌───────────────────┐   ┌──────────────────┐
//!  │ receive(...) │──▶│ predict(tick, f)  │──▶│ interpolate(t, f)│
//!  │  &mut self   │   │  tables: &mut     │   │  tables: &mut    │
//!  │  sole writer │   │  ghosts: &        │   │  ghosts: &       │
//!  └──────────────┘   └───────────────────┘   └──────────────────┘
//! ```
//!
//! The receive path takes the session exclusively and runs to completion
//! before any pass can start. Passes read the ghost map through a shared
//! borrow while rayon workers write disjoint chunks of table rows.

use std::collections::{HashMap, HashSet};

use specter_core::{ChunkedPass, ComponentAccess, EntityAllocator, EntityId, EntityQuery, Scratch};

use crate::config::ReplicationConfig;
use crate::diagnostics::{
    Anomaly, DiagnosticsSink, LogSink, PassScratch, ReceiveReport, StepReport, UnresolvedRef,
};
use crate::error::{NetcodeError, NetcodeResult};
use crate::ghost_map::{GhostMap, NetId};
use crate::history::{InsertOutcome, SnapshotRecord};
use crate::prediction::{should_predict, InputHistory, PredictionController, ReplayPlan};
use crate::protocol::{GhostMessage, MessageBatch, PacketReader, SchemaSource, SERVER_OWNER};
use crate::schema::{self, validate, ArchetypeId, FieldDescriptor, FieldValue, GhostArchetype};
use crate::sequence::Tick;
use crate::table::{GhostTable, ReplicatedTable};

/// Client-side replication state for one connection.
pub struct ReplicationSession {
    config: ReplicationConfig,
    ghosts: GhostMap,
    entities: EntityAllocator,
    tables: HashMap<ArchetypeId, Box<dyn ReplicatedTable>>,
    /// Which table each live ghost lives in.
    entity_tables: HashMap<EntityId, ArchetypeId>,
    controller: PredictionController,
    oldest_prediction_start: Tick,
    local_owner: u32,
    sink: Box<dyn DiagnosticsSink>,
    /// Unresolved reference classes already reported.
    warned: HashSet<UnresolvedRef>,
}

impl ReplicationSession {
    /// Opens a session for the connection identified by `local_owner`.
    ///
    /// Ghosts spawned with this owner are predicted; all others are
    /// interpolated. Anomalies go to [`LogSink`] until
    /// [`ReplicationSession::set_sink`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::InvalidConfig`] if `config` fails validation.
    pub fn connect(config: ReplicationConfig, local_owner: u32) -> NetcodeResult<Self> {
        config.validate()?;
        tracing::info!(
            "Replication session connected: owner={}, max_ghosts={}, history={}",
            local_owner,
            config.max_ghosts,
            config.history_capacity
        );

        Ok(Self {
            ghosts: GhostMap::with_capacity(config.max_ghosts),
            entities: EntityAllocator::new(config.max_ghosts),
            tables: HashMap::new(),
            entity_tables: HashMap::with_capacity(config.max_ghosts),
            controller: PredictionController::new(),
            oldest_prediction_start: Tick::NONE,
            local_owner,
            sink: Box::new(LogSink),
            warned: HashSet::new(),
            config,
        })
    }

    /// Replaces the diagnostics sink.
    pub fn set_sink<S: DiagnosticsSink + 'static>(&mut self, sink: S) {
        self.sink = Box::new(sink);
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Owner id of this connection.
    #[must_use]
    pub const fn local_owner(&self) -> u32 {
        self.local_owner
    }

    /// Registers a replicated archetype.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::DuplicateArchetype`] if the id is taken.
    pub fn register<A: GhostArchetype>(&mut self) -> NetcodeResult<()> {
        if self.tables.contains_key(&A::ID) {
            return Err(NetcodeError::DuplicateArchetype(A::ID));
        }
        let pass = ChunkedPass::new(self.config.chunk_size, self.config.parallel_threshold);
        let table: GhostTable<A> = GhostTable::new(self.config.history_capacity, pass);
        self.tables.insert(A::ID, Box::new(table));
        tracing::debug!("Registered archetype {} as {}", A::NAME, A::ID);
        Ok(())
    }

    // =========================================================================
    // RECEIVE PATH
    // =========================================================================

    /// Applies one batch of messages.
    ///
    /// Spawns bind first, snapshots are inserted next and despawns unbind
    /// last, so a snapshot and a despawn for the same ghost in one batch
    /// still land in its history before it goes away.
    ///
    /// A message that cannot be applied (a spawn for an unregistered
    /// archetype, a conflicting or over-capacity spawn, a snapshot that does
    /// not match its schema) is counted in [`ReceiveReport::rejected`] and
    /// reported as [`Anomaly::RejectedMessage`]. Every other message of the
    /// batch is still applied.
    pub fn receive(&mut self, batch: MessageBatch) -> ReceiveReport {
        let mut report = ReceiveReport {
            unknown: batch.skipped_snapshots(),
            rejected: batch.rejected_snapshots(),
            ..ReceiveReport::default()
        };
        let messages = batch.into_messages();

        for message in &messages {
            if let GhostMessage::Spawn {
                net_id,
                archetype,
                owner,
            } = message
            {
                match self.spawn(*net_id, *archetype, *owner) {
                    Ok(true) => report.spawned += 1,
                    Ok(false) => {}
                    Err(reason) => self.reject(message, reason, &mut report),
                }
            }
        }

        for message in &messages {
            if let GhostMessage::Snapshot {
                tick,
                net_id,
                fields,
            } = message
            {
                if let Err(reason) = self.insert_snapshot(*tick, *net_id, fields, &mut report) {
                    self.reject(message, reason, &mut report);
                }
            }
        }

        for message in &messages {
            if let GhostMessage::Despawn { net_id } = message {
                if self.despawn(*net_id) {
                    report.despawned += 1;
                }
            }
        }

        report
    }

    /// Decodes a packet and applies it.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::Truncated`] or
    /// [`NetcodeError::UnknownMessage`] when the packet cannot be framed.
    /// Nothing from such a packet is applied.
    pub fn receive_packet(&mut self, bytes: &[u8]) -> NetcodeResult<ReceiveReport> {
        let batch = PacketReader::new(bytes).read_batch(&*self)?;
        Ok(self.receive(batch))
    }

    fn reject(&self, message: &GhostMessage, reason: NetcodeError, report: &mut ReceiveReport) {
        let net_id = match message {
            GhostMessage::Spawn { net_id, .. }
            | GhostMessage::Snapshot { net_id, .. }
            | GhostMessage::Despawn { net_id } => *net_id,
        };
        report.rejected += 1;
        self.sink.report(&Anomaly::RejectedMessage {
            kind: message.kind(),
            net_id,
            reason,
        });
    }

    /// Binds a new ghost. Returns false for a repeated spawn.
    fn spawn(&mut self, net_id: NetId, archetype: ArchetypeId, owner: u32) -> NetcodeResult<bool> {
        if let Some(existing) = self.ghosts.resolve(net_id) {
            if self.entity_tables.get(&existing) == Some(&archetype) {
                tracing::debug!("Ignoring repeated spawn of {}", net_id);
                return Ok(false);
            }
            return Err(NetcodeError::DuplicateGhost(net_id));
        }

        let table = self
            .tables
            .get_mut(&archetype)
            .ok_or(NetcodeError::UnknownArchetype(archetype))?;
        let entity = self.entities.spawn().ok_or(NetcodeError::GhostCapacity {
            capacity: self.config.max_ghosts,
        })?;
        if let Err(err) = self.ghosts.bind(net_id, entity) {
            self.entities.despawn(entity);
            return Err(err);
        }

        let predicted = owner != SERVER_OWNER && owner == self.local_owner;
        table.spawn(entity, net_id, predicted);
        self.entity_tables.insert(entity, archetype);
        tracing::debug!(
            "Bound {} to {} ({}, predicted={})",
            net_id,
            entity,
            table.name(),
            predicted
        );
        Ok(true)
    }

    fn insert_snapshot(
        &mut self,
        tick: Tick,
        net_id: NetId,
        fields: &[FieldValue],
        report: &mut ReceiveReport,
    ) -> NetcodeResult<()> {
        let located = self.ghosts.resolve(net_id).and_then(|entity| {
            let archetype = self.entity_tables.get(&entity)?;
            Some((entity, *archetype))
        });
        let Some((entity, archetype)) = located else {
            tracing::debug!("Dropping snapshot for unknown {} at {}", net_id, tick);
            report.unknown += 1;
            return Ok(());
        };
        let Some(table) = self.tables.get_mut(&archetype) else {
            report.unknown += 1;
            return Ok(());
        };
        validate(table.name(), table.schema(), fields)?;

        let Some(history) = table.history_mut(entity) else {
            report.unknown += 1;
            return Ok(());
        };
        match history.insert(tick, fields) {
            InsertOutcome::Inserted => report.inserted += 1,
            InsertOutcome::Stale => {
                report.stale += 1;
                self.sink.report(&Anomaly::StaleUpdate {
                    net_id,
                    tick,
                    latest: history.latest_tick(),
                });
            }
        }
        Ok(())
    }

    /// Unbinds a ghost and releases its handle.
    fn despawn(&mut self, net_id: NetId) -> bool {
        let Some(entity) = self.ghosts.unbind(net_id) else {
            tracing::debug!("Ignoring despawn of unknown {}", net_id);
            return false;
        };
        if let Some(archetype) = self.entity_tables.remove(&entity) {
            if let Some(table) = self.tables.get_mut(&archetype) {
                table.despawn(entity);
            }
        }
        self.entities.despawn(entity);
        tracing::debug!("Unbound {} from {}", net_id, entity);
        true
    }

    // =========================================================================
    // PER-STEP PASSES
    // =========================================================================

    /// Interpolates every remote ghost at render tick `tick` plus `fraction`.
    pub fn interpolate(&mut self, tick: Tick, fraction: f32) -> StepReport {
        let ghosts = &self.ghosts;
        let merged = self
            .tables
            .values_mut()
            .filter(|table| !table.is_empty_query())
            .map(|table| table.interpolate_pass(ghosts, tick, fraction))
            .fold(PassScratch::default(), Scratch::merge);

        let report = self.finish_step(tick, merged, Tick::NONE);
        tracing::trace!(
            "Interpolated {}: applied={}, skipped={}, latest={}..{}",
            tick,
            report.applied,
            report.skipped,
            report.latest.min(),
            report.latest.max()
        );
        report
    }

    /// Reconciles every predicted ghost against server tick `target`.
    ///
    /// A `fraction` below one marks a partial step; the next step then
    /// restarts every ghost from its server record.
    pub fn predict(&mut self, target: Tick, fraction: f32) -> StepReport {
        let step = self.controller.begin(target);
        let ghosts = &self.ghosts;
        let sink = &self.sink;

        let merged = self
            .tables
            .values_mut()
            .filter(|table| !table.is_empty_query())
            .map(|table| {
                let scratch = table.predict_pass(ghosts, step);
                if scratch.buffer_misses > 0 {
                    sink.report(&Anomaly::BufferMiss {
                        archetype: table.name(),
                        count: scratch.buffer_misses,
                        tick: target,
                    });
                }
                scratch
            })
            .fold(PassScratch::default(), Scratch::merge);

        self.oldest_prediction_start = merged.starts.min();
        self.controller.complete(step, fraction);

        let report = self.finish_step(target, merged, self.oldest_prediction_start);
        tracing::trace!(
            "Predicted {}: applied={}, misses={}, oldest_start={}",
            target,
            report.applied,
            report.buffer_misses,
            report.oldest_prediction_start
        );
        report
    }

    /// Turns merged scratch into a report and forwards anomalies.
    fn finish_step(&mut self, tick: Tick, scratch: PassScratch, oldest_start: Tick) -> StepReport {
        for class in &scratch.unresolved {
            if self.warned.insert(*class) {
                self.sink.report(&Anomaly::UnresolvedReference {
                    archetype: class.archetype,
                    field: class.field,
                });
            }
        }

        let spread = scratch.latest.spread();
        let threshold = self.config.desync_threshold_ticks;
        let desync = spread > threshold;
        if desync {
            self.sink.report(&Anomaly::DesyncDetected {
                min: scratch.latest.min(),
                max: scratch.latest.max(),
                spread,
                threshold,
            });
        }

        StepReport {
            tick,
            visited: scratch.applied + scratch.skipped + scratch.buffer_misses,
            applied: scratch.applied,
            skipped: scratch.skipped,
            buffer_misses: scratch.buffer_misses,
            unresolved: scratch.unresolved.len(),
            latest: scratch.latest,
            oldest_prediction_start: oldest_start,
            desync,
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    fn table_of(&self, entity: EntityId) -> Option<&dyn ReplicatedTable> {
        let archetype = self.entity_tables.get(&entity)?;
        self.tables.get(archetype).map(|table| &**table)
    }

    /// Typed table of an archetype.
    #[must_use]
    pub fn table<A: GhostArchetype>(&self) -> Option<&GhostTable<A>> {
        self.tables
            .get(&A::ID)
            .and_then(|table| table.as_any().downcast_ref())
    }

    /// Typed mutable table of an archetype.
    pub fn table_mut<A: GhostArchetype>(&mut self) -> Option<&mut GhostTable<A>> {
        self.tables
            .get_mut(&A::ID)
            .and_then(|table| table.as_any_mut().downcast_mut())
    }

    /// Live components of a ghost.
    #[must_use]
    pub fn component<A: GhostArchetype>(&self, entity: EntityId) -> Option<&A::Components> {
        self.table::<A>()?.component(entity)
    }

    /// Mutable live components of a ghost, for the external replay pass.
    pub fn component_mut<A: GhostArchetype>(
        &mut self,
        entity: EntityId,
    ) -> Option<&mut A::Components> {
        self.table_mut::<A>()?.component_mut(entity)
    }

    /// Local handle of a ghost.
    #[must_use]
    pub fn resolve(&self, net_id: NetId) -> Option<EntityId> {
        self.ghosts.resolve(net_id)
    }

    /// Network id of a local handle.
    #[must_use]
    pub fn net_id_of(&self, entity: EntityId) -> Option<NetId> {
        self.ghosts.net_id_of(entity)
    }

    /// The identity map.
    #[must_use]
    pub fn ghosts(&self) -> &GhostMap {
        &self.ghosts
    }

    /// Number of live ghosts.
    #[must_use]
    pub fn ghost_count(&self) -> usize {
        self.ghosts.len()
    }

    /// Newest received tick for a ghost, or [`Tick::NONE`].
    #[must_use]
    pub fn latest_tick(&self, entity: EntityId) -> Tick {
        self.table_of(entity)
            .and_then(|table| table.history(entity))
            .map_or(Tick::NONE, |history| history.latest_tick())
    }

    /// Interpolated fields of a ghost at `tick` plus `fraction`.
    #[must_use]
    pub fn sample_interpolated(
        &self,
        entity: EntityId,
        tick: Tick,
        fraction: f32,
    ) -> Option<Vec<FieldValue>> {
        self.table_of(entity)?
            .history(entity)?
            .sample_interpolated(tick, fraction)
    }

    /// Returns true if the ghost is locally predicted.
    #[must_use]
    pub fn is_predicted(&self, entity: EntityId) -> bool {
        self.table_of(entity)
            .and_then(|table| table.prediction(entity))
            .is_some()
    }

    /// Replay start tick of a predicted ghost.
    #[must_use]
    pub fn prediction_start_tick(&self, entity: EntityId) -> Option<Tick> {
        self.table_of(entity)?
            .prediction(entity)
            .map(|state| state.prediction_start_tick)
    }

    /// Oldest replay start across all predicted ghosts after the last
    /// prediction step, or [`Tick::NONE`].
    #[must_use]
    pub const fn oldest_prediction_start_tick(&self) -> Tick {
        self.oldest_prediction_start
    }

    /// Last fully predicted tick, or [`Tick::NONE`].
    #[must_use]
    pub const fn last_predicted_tick(&self) -> Tick {
        self.controller.last_predicted_tick()
    }

    /// Returns true iff the replay pass should simulate `tick` for `entity`.
    #[must_use]
    pub fn should_predict(&self, entity: EntityId, tick: Tick) -> bool {
        self.table_of(entity)
            .and_then(|table| table.prediction(entity))
            .is_some_and(|state| should_predict(tick, &state))
    }

    /// Ticks the replay pass has to simulate to reach `target`.
    #[must_use]
    pub fn replay_plan(&self, target: Tick) -> ReplayPlan {
        ReplayPlan::new(self.oldest_prediction_start, target)
    }

    /// Server record a predicted ghost's replay starts from.
    #[must_use]
    pub fn rollback_base(&self, entity: EntityId) -> Option<&SnapshotRecord> {
        let table = self.table_of(entity)?;
        let start = table.prediction(entity)?.prediction_start_tick;
        table.history(entity)?.sample_exact(start)
    }

    /// Empty input ring sized by the configuration.
    #[must_use]
    pub fn input_history<I: Copy>(&self) -> InputHistory<I> {
        InputHistory::new(self.config.input_history_capacity)
    }

    /// Captures a ghost's live components as snapshot fields.
    #[must_use]
    pub fn capture<A: GhostArchetype>(&self, entity: EntityId) -> Option<Vec<FieldValue>> {
        let components = self.component::<A>(entity)?;
        Some(schema::capture::<A>(components, &self.ghosts))
    }

    // =========================================================================
    // RESET
    // =========================================================================

    /// Forgets prediction progress but keeps every ghost and its history.
    pub fn reset_prediction(&mut self) {
        for table in self.tables.values_mut() {
            table.reset_prediction();
        }
        self.controller.reset();
        self.oldest_prediction_start = Tick::NONE;
    }

    /// Drops all replicated state ahead of a reconnect.
    ///
    /// Registered archetypes are kept; everything else is rebuilt from the
    /// incoming stream.
    pub fn reset_for_reconnect(&mut self) {
        for table in self.tables.values_mut() {
            table.clear();
        }
        self.ghosts.clear();
        self.entities.clear();
        self.entity_tables.clear();
        self.controller.reset();
        self.oldest_prediction_start = Tick::NONE;
        self.warned.clear();
        tracing::info!("Replication session reset for reconnect");
    }
}

impl SchemaSource for ReplicationSession {
    fn archetype_schema(
        &self,
        archetype: ArchetypeId,
    ) -> Option<(&'static str, &'static [FieldDescriptor])> {
        self.tables
            .get(&archetype)
            .map(|table| (table.name(), table.schema()))
    }

    fn ghost_archetype(&self, net_id: NetId) -> Option<ArchetypeId> {
        let entity = self.ghosts.resolve(net_id)?;
        self.entity_tables.get(&entity).copied()
    }
}
