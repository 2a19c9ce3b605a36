//! # Netcode Error Types
//!
//! Errors that abort the call that produced them. Anomalies that only
//! degrade to "hold last good state" live in [`crate::diagnostics::Anomaly`].

use thiserror::Error;

use crate::ghost_map::NetId;
use crate::schema::ArchetypeId;

/// Errors that can occur while receiving, decoding or configuring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetcodeError {
    /// A packet ended before a complete value could be read.
    #[error("packet truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the next read required.
        needed: usize,
        /// Bytes left in the packet.
        remaining: usize,
    },

    /// An outbound packet would exceed the maximum packet size.
    #[error("packet buffer full: {capacity} bytes")]
    BufferFull {
        /// Maximum packet size.
        capacity: usize,
    },

    /// A message tag that this protocol does not define.
    #[error("unknown message tag: {0}")]
    UnknownMessage(u8),

    /// A spawn referenced an archetype that was never registered.
    #[error("unknown archetype: {0}")]
    UnknownArchetype(ArchetypeId),

    /// An archetype id was registered twice.
    #[error("archetype {0} registered twice")]
    DuplicateArchetype(ArchetypeId),

    /// A spawn reused a network id that is still bound.
    #[error("ghost {0} is already bound")]
    DuplicateGhost(NetId),

    /// The network id 0 is reserved for "no ghost".
    #[error("network id 0 is reserved")]
    ReservedNetId,

    /// Every local entity slot is in use.
    #[error("ghost capacity exhausted: {capacity}")]
    GhostCapacity {
        /// Configured maximum number of ghosts.
        capacity: usize,
    },

    /// Snapshot fields do not match the archetype's declared schema.
    #[error("schema mismatch for {archetype}: field {index} expected {expected}")]
    SchemaMismatch {
        /// Archetype name.
        archetype: &'static str,
        /// Index of the offending field.
        index: usize,
        /// Kind the schema declares for that field.
        expected: &'static str,
    },

    /// A bool field carried a byte other than 0 or 1.
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for netcode operations.
pub type NetcodeResult<T> = Result<T, NetcodeError>;
