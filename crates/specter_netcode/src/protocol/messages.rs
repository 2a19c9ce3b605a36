//! Ghost replication messages.

use crate::error::{NetcodeError, NetcodeResult};
use crate::ghost_map::NetId;
use crate::schema::{ArchetypeId, FieldDescriptor, FieldValue};
use crate::sequence::Tick;

/// Owner id of server-controlled ghosts.
pub const SERVER_OWNER: u32 = 0;

/// Message tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// A ghost enters the client's scope.
    Spawn = 1,
    /// Authoritative state of one ghost at one tick.
    Snapshot = 2,
    /// A ghost leaves the client's scope.
    Despawn = 3,
}

impl MessageKind {
    /// Decodes a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::UnknownMessage`] for undefined tags.
    pub fn from_u8(value: u8) -> NetcodeResult<Self> {
        match value {
            1 => Ok(Self::Spawn),
            2 => Ok(Self::Snapshot),
            3 => Ok(Self::Despawn),
            other => Err(NetcodeError::UnknownMessage(other)),
        }
    }
}

/// One decoded message.
#[derive(Clone, Debug, PartialEq)]
pub enum GhostMessage {
    /// Binds a new ghost.
    Spawn {
        /// Server-assigned id.
        net_id: NetId,
        /// Archetype of the ghost.
        archetype: ArchetypeId,
        /// Owning connection, [`SERVER_OWNER`] for server-driven ghosts.
        owner: u32,
    },
    /// Authoritative state.
    Snapshot {
        /// Server tick.
        tick: Tick,
        /// Ghost the state belongs to.
        net_id: NetId,
        /// Field values in schema order.
        fields: Vec<FieldValue>,
    },
    /// Unbinds a ghost.
    Despawn {
        /// Ghost leaving scope.
        net_id: NetId,
    },
}

impl GhostMessage {
    /// Tag of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Spawn { .. } => MessageKind::Spawn,
            Self::Snapshot { .. } => MessageKind::Snapshot,
            Self::Despawn { .. } => MessageKind::Despawn,
        }
    }
}

/// Messages received together, in arrival order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageBatch {
    messages: Vec<GhostMessage>,
    /// Snapshots skipped while decoding because their ghost was unknown.
    skipped_snapshots: usize,
    /// Snapshots whose bytes did not decode against their schema.
    rejected_snapshots: usize,
}

impl MessageBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a spawn.
    pub fn spawn(&mut self, net_id: NetId, archetype: ArchetypeId, owner: u32) -> &mut Self {
        self.messages.push(GhostMessage::Spawn {
            net_id,
            archetype,
            owner,
        });
        self
    }

    /// Appends a snapshot.
    pub fn snapshot(&mut self, tick: Tick, net_id: NetId, fields: Vec<FieldValue>) -> &mut Self {
        self.messages.push(GhostMessage::Snapshot {
            tick,
            net_id,
            fields,
        });
        self
    }

    /// Appends a despawn.
    pub fn despawn(&mut self, net_id: NetId) -> &mut Self {
        self.messages.push(GhostMessage::Despawn { net_id });
        self
    }

    /// Messages in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[GhostMessage] {
        &self.messages
    }

    /// Consumes the batch.
    #[must_use]
    pub fn into_messages(self) -> Vec<GhostMessage> {
        self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the batch holds no message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Snapshots the decoder had to skip.
    #[must_use]
    pub const fn skipped_snapshots(&self) -> usize {
        self.skipped_snapshots
    }

    /// Snapshots the decoder could not parse.
    #[must_use]
    pub const fn rejected_snapshots(&self) -> usize {
        self.rejected_snapshots
    }

    pub(crate) fn record_skipped_snapshot(&mut self) {
        self.skipped_snapshots += 1;
    }

    pub(crate) fn record_rejected_snapshot(&mut self) {
        self.rejected_snapshots += 1;
    }
}

/// What the decoder needs to know about registered archetypes and live
/// ghosts to parse snapshot fields.
pub trait SchemaSource {
    /// Name and field list of a registered archetype.
    fn archetype_schema(
        &self,
        archetype: ArchetypeId,
    ) -> Option<(&'static str, &'static [FieldDescriptor])>;

    /// Archetype of a bound ghost.
    fn ghost_archetype(&self, net_id: NetId) -> Option<ArchetypeId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in [MessageKind::Spawn, MessageKind::Snapshot, MessageKind::Despawn] {
            assert_eq!(MessageKind::from_u8(kind as u8), Ok(kind));
        }
        assert_eq!(MessageKind::from_u8(9), Err(NetcodeError::UnknownMessage(9)));
    }

    #[test]
    fn test_batch_keeps_arrival_order() {
        let mut batch = MessageBatch::new();
        batch
            .spawn(NetId(1), ArchetypeId(3), SERVER_OWNER)
            .snapshot(Tick::new(5), NetId(1), vec![FieldValue::Float(1.0)])
            .despawn(NetId(1));

        let kinds: Vec<MessageKind> = batch.messages().iter().map(GhostMessage::kind).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::Spawn, MessageKind::Snapshot, MessageKind::Despawn]
        );
    }
}
