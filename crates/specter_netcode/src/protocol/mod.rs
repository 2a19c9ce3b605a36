//! # Replication Protocol
//!
//! Binary encoding of ghost lifecycle and state messages.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ message_count: u16                                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 1 Spawn     │ net_id u32 │ archetype u16 │ owner u32          │
//! │ 2 Snapshot  │ tick u32 │ net_id u32 │ len u16 │ fields...     │
//! │ 3 Despawn   │ net_id u32                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Fields follow the archetype's schema:
//! f32, 3×f32, i32, u32, bool as one byte, ghost reference as u32 with 0
//! meaning "none".
//!
//! Delivery is unreliable and unordered; the receive side tolerates
//! duplicates and stale snapshots.

mod messages;
mod wire;

pub use messages::{GhostMessage, MessageBatch, MessageKind, SchemaSource, SERVER_OWNER};
pub use wire::{fields_wire_size, PacketReader, PacketWriter, MAX_PACKET_SIZE};
