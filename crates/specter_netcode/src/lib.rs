//! # SPECTER Netcode - Snapshot History & Reconciliation
//!
//! Client-side replication core: keeps a tick-indexed history of server
//! state per ghost, interpolates remote ghosts and decides where locally
//! predicted ghosts have to roll back to.
//!
//! ## Architecture
//!
//! - **Sequence**: wraparound-safe tick comparison, used for every ordering
//! - **History**: per-ghost ring buffer of snapshot records
//! - **Schema**: one generic engine over per-archetype field lists
//! - **Prediction**: start-tick reconciliation and replay planning
//! - **Diagnostics**: per-worker scratch merged into step reports
//! - **Protocol**: spawn / snapshot / despawn messages (< 1200 bytes MTU)
//!
//! ## Step Loop
//!
//! ```text
//!  packet ──▶ receive_packet ──▶ predict(server_tick) ──▶ replay pass (yours)
//!                                        │
//!                                        └──▶ interpolate(render_tick)
//! ```
//!
//! The server stays authoritative. Local prediction is always replaced by
//! the server record once one arrives for a newer tick.
//!
//! ## Example
//!
//! ```rust,ignore
//! use specter_netcode::{ReplicationConfig, ReplicationSession, Tick};
//!
//! let mut session = ReplicationSession::connect(ReplicationConfig::default(), my_id)?;
//! session.register::<Character>()?;
//!
//! session.receive_packet(&bytes)?;
//! let step = session.predict(server_tick, 1.0);
//! for tick in session.replay_plan(server_tick) {
//!     // re-simulate owned ghosts where session.should_predict(entity, tick)
//! }
//! session.interpolate(render_tick, render_fraction);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ghost_map;
pub mod history;
pub mod prediction;
pub mod protocol;
pub mod schema;
pub mod sequence;
pub mod session;
pub mod table;

// Re-exports for convenience
pub use config::ReplicationConfig;
pub use diagnostics::{
    Anomaly, ChannelSink, DiagnosticsSink, LogSink, PassScratch, ReceiveReport, StepReport,
    TickRange, UnresolvedRef,
};
pub use error::{NetcodeError, NetcodeResult};
pub use ghost_map::{GhostMap, NetId};
pub use history::{InsertOutcome, SnapshotHistory, SnapshotRecord, DEFAULT_HISTORY_CAPACITY};
pub use prediction::{
    should_predict, InputHistory, PredictedState, PredictionController, PredictionStep,
    ReplayPlan, StoredInput,
};
pub use protocol::{
    GhostMessage, MessageBatch, MessageKind, PacketReader, PacketWriter, SchemaSource,
    MAX_PACKET_SIZE, SERVER_OWNER,
};
pub use schema::{
    ArchetypeId, Blend, FieldDescriptor, FieldKind, FieldReader, FieldValue, FieldWriter,
    GhostArchetype,
};
pub use sequence::{is_newer, SequenceNumber, Tick};
pub use session::ReplicationSession;
pub use table::{GhostTable, ReplicatedTable};

pub use specter_core::{Component, ComponentAccess, EntityId, EntityQuery};
