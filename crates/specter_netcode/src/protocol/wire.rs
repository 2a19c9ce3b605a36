//! # Packet Encoding
//!
//! Little-endian, fixed-buffer encoding of ghost messages.
//!
//! ## Design
//!
//! - The writer owns a pre-allocated buffer; encoding never allocates
//! - A message that does not fit is rolled back, so the packet stays valid
//! - The reader borrows the received bytes and never panics on bad input

use std::collections::HashMap;

use crate::error::{NetcodeError, NetcodeResult};
use crate::ghost_map::NetId;
use crate::schema::{ArchetypeId, FieldDescriptor, FieldKind, FieldValue};
use crate::sequence::Tick;

use super::messages::{GhostMessage, MessageBatch, MessageKind, SchemaSource};

/// Maximum packet size in bytes.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Bytes taken by the message count at the start of every packet.
const COUNT_SIZE: usize = 2;

/// Encoded size of a field list.
#[must_use]
pub fn fields_wire_size(fields: &[FieldValue]) -> usize {
    fields.iter().map(|value| value.kind().wire_size()).sum()
}

/// Packet writer - encodes messages into a pre-allocated buffer.
///
/// The message count at the head of the buffer is kept current after every
/// write, so [`PacketWriter::as_slice`] is always a complete packet.
pub struct PacketWriter {
    buffer: [u8; MAX_PACKET_SIZE],
    position: usize,
    count: u16,
}

impl PacketWriter {
    /// Creates an empty packet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_PACKET_SIZE],
            position: COUNT_SIZE,
            count: 0,
        }
    }

    /// Clears the packet for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = COUNT_SIZE;
        self.count = 0;
        self.buffer[..COUNT_SIZE].fill(0);
    }

    /// Bytes written, including the message count.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no message has been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Messages written so far.
    #[inline]
    #[must_use]
    pub const fn message_count(&self) -> u16 {
        self.count
    }

    /// Bytes still available.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        MAX_PACKET_SIZE - self.position
    }

    /// The encoded packet.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    fn put(&mut self, bytes: &[u8]) -> NetcodeResult<()> {
        if self.position + bytes.len() > MAX_PACKET_SIZE {
            return Err(NetcodeError::BufferFull {
                capacity: MAX_PACKET_SIZE,
            });
        }
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    #[inline]
    fn put_u8(&mut self, value: u8) -> NetcodeResult<()> {
        self.put(&[value])
    }

    #[inline]
    fn put_u16(&mut self, value: u16) -> NetcodeResult<()> {
        self.put(&value.to_le_bytes())
    }

    #[inline]
    fn put_u32(&mut self, value: u32) -> NetcodeResult<()> {
        self.put(&value.to_le_bytes())
    }

    #[inline]
    fn put_f32(&mut self, value: f32) -> NetcodeResult<()> {
        self.put(&value.to_le_bytes())
    }

    fn put_field(&mut self, value: &FieldValue) -> NetcodeResult<()> {
        match value {
            FieldValue::Float(v) => self.put_f32(*v),
            FieldValue::Vec3(v) => {
                let bits: [u32; 3] = bytemuck::cast(*v);
                self.put_u32(bits[0])?;
                self.put_u32(bits[1])?;
                self.put_u32(bits[2])
            }
            FieldValue::Int(v) => self.put(&v.to_le_bytes()),
            FieldValue::UInt(v) => self.put_u32(*v),
            FieldValue::Bool(v) => self.put_u8(u8::from(*v)),
            FieldValue::GhostRef(reference) => self.put_u32(NetId::to_wire(*reference)),
        }
    }

    /// Runs `encode` as one message, rolling back on failure.
    fn message<F>(&mut self, encode: F) -> NetcodeResult<()>
    where
        F: FnOnce(&mut Self) -> NetcodeResult<()>,
    {
        if self.count == u16::MAX {
            return Err(NetcodeError::BufferFull {
                capacity: MAX_PACKET_SIZE,
            });
        }
        let start = self.position;
        if let Err(err) = encode(self) {
            self.position = start;
            return Err(err);
        }
        self.count += 1;
        self.buffer[..COUNT_SIZE].copy_from_slice(&self.count.to_le_bytes());
        Ok(())
    }

    /// Encodes a spawn.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::BufferFull`] if the message does not fit.
    pub fn write_spawn(
        &mut self,
        net_id: NetId,
        archetype: ArchetypeId,
        owner: u32,
    ) -> NetcodeResult<()> {
        self.message(|w| {
            w.put_u8(MessageKind::Spawn as u8)?;
            w.put_u32(net_id.0)?;
            w.put_u16(archetype.0)?;
            w.put_u32(owner)
        })
    }

    /// Encodes a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::BufferFull`] if the message does not fit.
    pub fn write_snapshot(
        &mut self,
        tick: Tick,
        net_id: NetId,
        fields: &[FieldValue],
    ) -> NetcodeResult<()> {
        let field_bytes = u16::try_from(fields_wire_size(fields)).map_err(|_| {
            NetcodeError::BufferFull {
                capacity: MAX_PACKET_SIZE,
            }
        })?;
        self.message(|w| {
            w.put_u8(MessageKind::Snapshot as u8)?;
            w.put_u32(tick.get())?;
            w.put_u32(net_id.0)?;
            w.put_u16(field_bytes)?;
            fields.iter().try_for_each(|value| w.put_field(value))
        })
    }

    /// Encodes a despawn.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::BufferFull`] if the message does not fit.
    pub fn write_despawn(&mut self, net_id: NetId) -> NetcodeResult<()> {
        self.message(|w| {
            w.put_u8(MessageKind::Despawn as u8)?;
            w.put_u32(net_id.0)
        })
    }

    /// Encodes one message of any kind.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::BufferFull`] if the message does not fit.
    pub fn write_message(&mut self, message: &GhostMessage) -> NetcodeResult<()> {
        match message {
            GhostMessage::Spawn {
                net_id,
                archetype,
                owner,
            } => self.write_spawn(*net_id, *archetype, *owner),
            GhostMessage::Snapshot {
                tick,
                net_id,
                fields,
            } => self.write_snapshot(*tick, *net_id, fields),
            GhostMessage::Despawn { net_id } => self.write_despawn(*net_id),
        }
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Packet reader - decodes messages from a received buffer.
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    /// Wraps a received packet.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Bytes not yet consumed.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, needed: usize) -> NetcodeResult<&'a [u8]> {
        if needed > self.remaining() {
            return Err(NetcodeError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buffer[self.position..self.position + needed];
        self.position += needed;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> NetcodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> NetcodeResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> NetcodeResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> NetcodeResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> NetcodeResult<i32> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Reads a little-endian f32.
    #[inline]
    pub fn read_f32(&mut self) -> NetcodeResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads one field of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::Truncated`] at end of packet and
    /// [`NetcodeError::InvalidBool`] for a bool byte other than 0 or 1.
    pub fn read_field(&mut self, kind: FieldKind) -> NetcodeResult<FieldValue> {
        Ok(match kind {
            FieldKind::Float => FieldValue::Float(self.read_f32()?),
            FieldKind::Vec3 => {
                let bits = [self.read_u32()?, self.read_u32()?, self.read_u32()?];
                FieldValue::Vec3(bytemuck::cast(bits))
            }
            FieldKind::Int => FieldValue::Int(self.read_i32()?),
            FieldKind::UInt => FieldValue::UInt(self.read_u32()?),
            FieldKind::Bool => match self.read_u8()? {
                0 => FieldValue::Bool(false),
                1 => FieldValue::Bool(true),
                other => return Err(NetcodeError::InvalidBool(other)),
            },
            FieldKind::GhostRef => FieldValue::GhostRef(NetId::from_wire(self.read_u32()?)),
        })
    }

    /// Decodes a whole packet.
    ///
    /// Spawns are collected in a first scan, so a snapshot is parsed with the
    /// schema of a ghost spawned anywhere in the same packet. Snapshots for
    /// ghosts `schemas` does not know are skipped, and snapshots whose bytes
    /// do not decode against their schema are rejected. Both are counted on
    /// the batch without losing the rest of the packet.
    ///
    /// # Errors
    ///
    /// Fails on truncation or an unknown tag. Either leaves no way to find
    /// the next message.
    pub fn read_batch<S: SchemaSource + ?Sized>(
        &mut self,
        schemas: &S,
    ) -> NetcodeResult<MessageBatch> {
        let spawned = Self {
            buffer: self.buffer,
            position: self.position,
        }
        .scan_spawns()?;

        let count = self.read_u16()?;
        let mut batch = MessageBatch::new();
        for _ in 0..count {
            match MessageKind::from_u8(self.read_u8()?)? {
                MessageKind::Spawn => {
                    let net_id = NetId(self.read_u32()?);
                    let archetype = ArchetypeId(self.read_u16()?);
                    let owner = self.read_u32()?;
                    batch.spawn(net_id, archetype, owner);
                }
                MessageKind::Snapshot => {
                    let tick = Tick::new(self.read_u32()?);
                    let net_id = NetId(self.read_u32()?);
                    let field_bytes = usize::from(self.read_u16()?);
                    let body = self.take(field_bytes)?;

                    let schema = spawned
                        .get(&net_id)
                        .copied()
                        .or_else(|| schemas.ghost_archetype(net_id))
                        .and_then(|archetype| schemas.archetype_schema(archetype));
                    let Some((name, fields)) = schema else {
                        batch.record_skipped_snapshot();
                        continue;
                    };

                    match PacketReader::new(body).read_fields(name, fields) {
                        Ok(values) => {
                            batch.snapshot(tick, net_id, values);
                        }
                        Err(err) => {
                            tracing::debug!(
                                "Rejecting snapshot for {} at {}: {}",
                                net_id,
                                tick,
                                err
                            );
                            batch.record_rejected_snapshot();
                        }
                    }
                }
                MessageKind::Despawn => {
                    let net_id = NetId(self.read_u32()?);
                    batch.despawn(net_id);
                }
            }
        }
        Ok(batch)
    }

    /// Reads one snapshot body, which must be exactly the schema's fields.
    fn read_fields(
        &mut self,
        archetype: &'static str,
        fields: &[FieldDescriptor],
    ) -> NetcodeResult<Vec<FieldValue>> {
        let values = fields
            .iter()
            .map(|descriptor| self.read_field(descriptor.kind))
            .collect::<NetcodeResult<Vec<_>>>()?;
        if self.remaining() != 0 {
            return Err(NetcodeError::SchemaMismatch {
                archetype,
                index: fields.len(),
                expected: "declared snapshot length",
            });
        }
        Ok(values)
    }

    /// Archetypes of every ghost spawned in the packet.
    fn scan_spawns(mut self) -> NetcodeResult<HashMap<NetId, ArchetypeId>> {
        let count = self.read_u16()?;
        let mut spawned = HashMap::new();
        for _ in 0..count {
            match MessageKind::from_u8(self.read_u8()?)? {
                MessageKind::Spawn => {
                    let net_id = NetId(self.read_u32()?);
                    let archetype = ArchetypeId(self.read_u16()?);
                    self.read_u32()?;
                    spawned.insert(net_id, archetype);
                }
                MessageKind::Snapshot => {
                    self.read_u32()?;
                    self.read_u32()?;
                    let field_bytes = usize::from(self.read_u16()?);
                    self.take(field_bytes)?;
                }
                MessageKind::Despawn => {
                    self.read_u32()?;
                }
            }
        }
        Ok(spawned)
    }
}
