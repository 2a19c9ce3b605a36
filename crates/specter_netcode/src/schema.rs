//! # Field Schemas
//!
//! One generic engine serves every replicated archetype. An archetype only
//! declares its fields in order, together with how each one blends:
//!
//! ```text
//! Character:  [ translation: Vec3  lerp ]
//!             [ health:      UInt  step ]
//!             [ target:      Ref   step ]  ──▶ resolved through the GhostMap
//! ```
//!
//! Decoding, interpolation and reference resolution all walk that list, so
//! there is no per-archetype serializer to keep in sync.

use std::fmt;

use specter_core::{Component, EntityId};

use crate::diagnostics::UnresolvedRef;
use crate::error::{NetcodeError, NetcodeResult};
use crate::ghost_map::{GhostMap, NetId};

/// Wire identifier of a replicated archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ArchetypeId(pub u16);

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archetype#{}", self.0)
    }
}

/// Type of a replicated field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 32-bit float.
    Float,
    /// Three 32-bit floats.
    Vec3,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    /// Boolean flag.
    Bool,
    /// Reference to another ghost by network id.
    GhostRef,
}

impl FieldKind {
    /// Human-readable kind name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec3 => "vec3",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Bool => "bool",
            Self::GhostRef => "ghost_ref",
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub const fn wire_size(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::UInt | Self::GhostRef => 4,
            Self::Vec3 => 12,
            Self::Bool => 1,
        }
    }
}

/// How a field behaves between two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Blend {
    /// Linear interpolation. Only meaningful for numeric kinds.
    Lerp,
    /// Discrete: the later snapshot's value once the blend has started.
    Step,
}

/// One entry of an archetype's field list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name (diagnostics only).
    pub name: &'static str,
    /// Field type.
    pub kind: FieldKind,
    /// Blend policy.
    pub blend: Blend,
}

impl FieldDescriptor {
    /// Interpolated float.
    #[must_use]
    pub const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Float,
            blend: Blend::Lerp,
        }
    }

    /// Interpolated 3-vector.
    #[must_use]
    pub const fn vec3(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Vec3,
            blend: Blend::Lerp,
        }
    }

    /// Stepped signed integer.
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Int,
            blend: Blend::Step,
        }
    }

    /// Stepped unsigned integer.
    #[must_use]
    pub const fn uint(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::UInt,
            blend: Blend::Step,
        }
    }

    /// Stepped flag.
    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Bool,
            blend: Blend::Step,
        }
    }

    /// Reference to another ghost.
    #[must_use]
    pub const fn ghost_ref(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::GhostRef,
            blend: Blend::Step,
        }
    }

    /// Same field, interpolated instead of stepped.
    ///
    /// Bools and ghost references ignore this and always step.
    #[must_use]
    pub const fn lerped(self) -> Self {
        Self {
            blend: Blend::Lerp,
            ..self
        }
    }

    /// Same field, stepped instead of interpolated.
    #[must_use]
    pub const fn stepped(self) -> Self {
        Self {
            blend: Blend::Step,
            ..self
        }
    }
}

/// A single replicated value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    /// 32-bit float.
    Float(f32),
    /// Three 32-bit floats.
    Vec3([f32; 3]),
    /// Signed 32-bit integer.
    Int(i32),
    /// Unsigned 32-bit integer.
    UInt(u32),
    /// Boolean flag.
    Bool(bool),
    /// Reference to another ghost, or none.
    GhostRef(Option<NetId>),
}

impl FieldValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Float(_) => FieldKind::Float,
            Self::Vec3(_) => FieldKind::Vec3,
            Self::Int(_) => FieldKind::Int,
            Self::UInt(_) => FieldKind::UInt,
            Self::Bool(_) => FieldKind::Bool,
            Self::GhostRef(_) => FieldKind::GhostRef,
        }
    }

    /// Blends toward `next` by `weight` in `[0, 1]`.
    ///
    /// Mismatched kinds fall back to stepping.
    #[must_use]
    pub fn blend(&self, next: &Self, weight: f32, blend: Blend) -> Self {
        match (blend, self, next) {
            (Blend::Lerp, Self::Float(a), Self::Float(b)) => Self::Float(lerp(*a, *b, weight)),
            (Blend::Lerp, Self::Vec3(a), Self::Vec3(b)) => Self::Vec3([
                lerp(a[0], b[0], weight),
                lerp(a[1], b[1], weight),
                lerp(a[2], b[2], weight),
            ]),
            (Blend::Lerp, Self::Int(a), Self::Int(b)) => {
                let value = f64::from(*a) + (f64::from(*b) - f64::from(*a)) * f64::from(weight);
                Self::Int(value.round() as i32)
            }
            (Blend::Lerp, Self::UInt(a), Self::UInt(b)) => {
                let value = f64::from(*a) + (f64::from(*b) - f64::from(*a)) * f64::from(weight);
                Self::UInt(value.round().max(0.0) as u32)
            }
            _ => {
                if weight > 0.0 {
                    *next
                } else {
                    *self
                }
            }
        }
    }
}

/// Linear interpolation.
#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Checks decoded values against an archetype's field list.
///
/// # Errors
///
/// Returns [`NetcodeError::SchemaMismatch`] on a missing, extra or
/// wrongly-typed field.
pub fn validate(
    archetype: &'static str,
    schema: &[FieldDescriptor],
    values: &[FieldValue],
) -> NetcodeResult<()> {
    for (index, descriptor) in schema.iter().enumerate() {
        match values.get(index) {
            Some(value) if value.kind() == descriptor.kind => {}
            _ => {
                return Err(NetcodeError::SchemaMismatch {
                    archetype,
                    index,
                    expected: descriptor.kind.name(),
                })
            }
        }
    }
    if values.len() > schema.len() {
        return Err(NetcodeError::SchemaMismatch {
            archetype,
            index: schema.len(),
            expected: "end of fields",
        });
    }
    Ok(())
}

/// A replicated entity kind.
///
/// Implementors declare the field list once; the engine handles decoding,
/// history, interpolation and prediction for every archetype the same way.
///
/// # Example
///
/// ```rust,ignore
/// struct Character;
///
/// impl GhostArchetype for Character {
///     type Components = CharacterState;
///     const ID: ArchetypeId = ArchetypeId(1);
///     const NAME: &'static str = "character";
///     const FIELDS: &'static [FieldDescriptor] = &[
///         FieldDescriptor::vec3("translation"),
///         FieldDescriptor::uint("health"),
///         FieldDescriptor::ghost_ref("target"),
///     ];
///
///     fn apply(fields: &mut FieldReader<'_>, state: &mut CharacterState) {
///         state.translation = fields.vec3(0);
///         state.health = fields.uint(1);
///         state.target = fields.entity(2);
///     }
///
///     fn capture(state: &CharacterState, fields: &mut FieldWriter<'_>) {
///         fields.push_vec3(state.translation);
///         fields.push_uint(state.health);
///         fields.push_entity(state.target);
///     }
/// }
/// ```
pub trait GhostArchetype: Send + Sync + 'static {
    /// Live component bundle written by passes.
    type Components: Component;

    /// Wire identifier.
    const ID: ArchetypeId;

    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Ordered field list.
    const FIELDS: &'static [FieldDescriptor];

    /// Copies snapshot fields into the live components.
    fn apply(fields: &mut FieldReader<'_>, components: &mut Self::Components);

    /// Copies live components into snapshot fields (server side).
    fn capture(components: &Self::Components, fields: &mut FieldWriter<'_>);
}

/// Typed, reference-resolving view over one snapshot's fields.
///
/// Accessors return the kind's zero value (or `EntityId::NULL`) when the
/// index is out of range or holds a different kind.
pub struct FieldReader<'a> {
    archetype: &'static str,
    schema: &'static [FieldDescriptor],
    values: &'a [FieldValue],
    ghosts: &'a GhostMap,
    unresolved: &'a mut Vec<UnresolvedRef>,
}

impl<'a> FieldReader<'a> {
    /// Creates a reader. Unresolved references are recorded into `unresolved`.
    pub fn new(
        archetype: &'static str,
        schema: &'static [FieldDescriptor],
        values: &'a [FieldValue],
        ghosts: &'a GhostMap,
        unresolved: &'a mut Vec<UnresolvedRef>,
    ) -> Self {
        Self {
            archetype,
            schema,
            values,
            ghosts,
            unresolved,
        }
    }

    /// Float field.
    #[must_use]
    pub fn float(&self, index: usize) -> f32 {
        match self.values.get(index) {
            Some(FieldValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    /// 3-vector field.
    #[must_use]
    pub fn vec3(&self, index: usize) -> [f32; 3] {
        match self.values.get(index) {
            Some(FieldValue::Vec3(v)) => *v,
            _ => [0.0; 3],
        }
    }

    /// Signed integer field.
    #[must_use]
    pub fn int(&self, index: usize) -> i32 {
        match self.values.get(index) {
            Some(FieldValue::Int(v)) => *v,
            _ => 0,
        }
    }

    /// Unsigned integer field.
    #[must_use]
    pub fn uint(&self, index: usize) -> u32 {
        match self.values.get(index) {
            Some(FieldValue::UInt(v)) => *v,
            _ => 0,
        }
    }

    /// Flag field.
    #[must_use]
    pub fn boolean(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(FieldValue::Bool(true)))
    }

    /// Network id carried by a reference field, unresolved.
    #[must_use]
    pub fn net_ref(&self, index: usize) -> Option<NetId> {
        match self.values.get(index) {
            Some(FieldValue::GhostRef(reference)) => *reference,
            _ => None,
        }
    }

    /// Reference field resolved to a local handle.
    ///
    /// A reference to a ghost that is not bound locally degrades to
    /// `EntityId::NULL` and is recorded once per (archetype, field).
    pub fn entity(&mut self, index: usize) -> EntityId {
        let Some(net_id) = self.net_ref(index) else {
            return EntityId::NULL;
        };
        if let Some(entity) = self.ghosts.resolve(net_id) {
            return entity;
        }

        let field = self.schema.get(index).map_or("?", |d| d.name);
        let class = UnresolvedRef {
            archetype: self.archetype,
            field,
        };
        if !self.unresolved.contains(&class) {
            self.unresolved.push(class);
        }
        EntityId::NULL
    }
}

/// Builder for one snapshot's fields on the sending side.
pub struct FieldWriter<'a> {
    ghosts: &'a GhostMap,
    values: &'a mut Vec<FieldValue>,
}

impl<'a> FieldWriter<'a> {
    /// Creates a writer appending to `values`.
    pub fn new(ghosts: &'a GhostMap, values: &'a mut Vec<FieldValue>) -> Self {
        Self { ghosts, values }
    }

    /// Appends a float.
    pub fn push_float(&mut self, value: f32) {
        self.values.push(FieldValue::Float(value));
    }

    /// Appends a 3-vector.
    pub fn push_vec3(&mut self, value: [f32; 3]) {
        self.values.push(FieldValue::Vec3(value));
    }

    /// Appends a signed integer.
    pub fn push_int(&mut self, value: i32) {
        self.values.push(FieldValue::Int(value));
    }

    /// Appends an unsigned integer.
    pub fn push_uint(&mut self, value: u32) {
        self.values.push(FieldValue::UInt(value));
    }

    /// Appends a flag.
    pub fn push_bool(&mut self, value: bool) {
        self.values.push(FieldValue::Bool(value));
    }

    /// Appends a reference, translating the local handle to its network id.
    ///
    /// Null or unreplicated entities are written as "no ghost".
    pub fn push_entity(&mut self, entity: EntityId) {
        let reference = if entity.is_null() {
            None
        } else {
            self.ghosts.net_id_of(entity)
        };
        self.values.push(FieldValue::GhostRef(reference));
    }
}

/// Captures an archetype's components into a fresh field list.
#[must_use]
pub fn capture<A: GhostArchetype>(
    components: &A::Components,
    ghosts: &GhostMap,
) -> Vec<FieldValue> {
    let mut values = Vec::with_capacity(A::FIELDS.len());
    A::capture(components, &mut FieldWriter::new(ghosts, &mut values));
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[FieldDescriptor] = &[
        FieldDescriptor::vec3("translation"),
        FieldDescriptor::uint("health"),
        FieldDescriptor::ghost_ref("target"),
    ];

    #[test]
    fn test_lerp_fields_blend() {
        let a = FieldValue::Float(0.0);
        let b = FieldValue::Float(2.0);
        assert_eq!(a.blend(&b, 0.5, Blend::Lerp), FieldValue::Float(1.0));

        let a = FieldValue::Vec3([0.0, 10.0, -4.0]);
        let b = FieldValue::Vec3([10.0, 20.0, 4.0]);
        assert_eq!(
            a.blend(&b, 0.25, Blend::Lerp),
            FieldValue::Vec3([2.5, 12.5, -2.0])
        );
    }

    #[test]
    fn test_stepped_fields_take_later_value_once_started() {
        let a = FieldValue::UInt(100);
        let b = FieldValue::UInt(80);
        assert_eq!(a.blend(&b, 0.0, Blend::Step), a);
        assert_eq!(a.blend(&b, 0.1, Blend::Step), b);

        let a = FieldValue::GhostRef(None);
        let b = FieldValue::GhostRef(Some(NetId(4)));
        assert_eq!(a.blend(&b, 0.5, Blend::Lerp), b);
    }

    #[test]
    fn test_lerped_integers_round() {
        let a = FieldValue::Int(-10);
        let b = FieldValue::Int(10);
        assert_eq!(a.blend(&b, 0.75, Blend::Lerp), FieldValue::Int(5));

        let a = FieldValue::UInt(0);
        let b = FieldValue::UInt(3);
        assert_eq!(a.blend(&b, 0.5, Blend::Lerp), FieldValue::UInt(2));
    }

    #[test]
    fn test_validate_accepts_matching_fields() {
        let values = [
            FieldValue::Vec3([1.0, 2.0, 3.0]),
            FieldValue::UInt(5),
            FieldValue::GhostRef(None),
        ];
        assert!(validate("character", SCHEMA, &values).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_kind_and_length() {
        let wrong_kind = [
            FieldValue::Vec3([1.0, 2.0, 3.0]),
            FieldValue::Float(5.0),
            FieldValue::GhostRef(None),
        ];
        assert_eq!(
            validate("character", SCHEMA, &wrong_kind),
            Err(NetcodeError::SchemaMismatch {
                archetype: "character",
                index: 1,
                expected: "uint",
            })
        );

        let short = [FieldValue::Vec3([1.0, 2.0, 3.0])];
        assert!(validate("character", SCHEMA, &short).is_err());
    }

    #[test]
    fn test_reader_resolves_and_records_unresolved_once() {
        let mut ghosts = GhostMap::new();
        let target = EntityId::new(2, 1);
        ghosts.bind(NetId(9), target).unwrap();

        let bound = [
            FieldValue::Vec3([0.0; 3]),
            FieldValue::UInt(1),
            FieldValue::GhostRef(Some(NetId(9))),
        ];
        let unbound = [
            FieldValue::Vec3([0.0; 3]),
            FieldValue::UInt(1),
            FieldValue::GhostRef(Some(NetId(77))),
        ];

        let mut unresolved = Vec::new();
        let mut reader = FieldReader::new("character", SCHEMA, &bound, &ghosts, &mut unresolved);
        assert_eq!(reader.entity(2), target);

        let mut reader = FieldReader::new("character", SCHEMA, &unbound, &ghosts, &mut unresolved);
        assert_eq!(reader.entity(2), EntityId::NULL);
        assert_eq!(reader.entity(2), EntityId::NULL);

        assert_eq!(
            unresolved,
            vec![UnresolvedRef {
                archetype: "character",
                field: "target",
            }]
        );
    }

    #[test]
    fn test_writer_translates_entities_to_net_ids() {
        let mut ghosts = GhostMap::new();
        let target = EntityId::new(5, 2);
        ghosts.bind(NetId(31), target).unwrap();

        let mut values = Vec::new();
        let mut writer = FieldWriter::new(&ghosts, &mut values);
        writer.push_entity(target);
        writer.push_entity(EntityId::NULL);
        writer.push_entity(EntityId::new(6, 1));

        assert_eq!(
            values,
            vec![
                FieldValue::GhostRef(Some(NetId(31))),
                FieldValue::GhostRef(None),
                FieldValue::GhostRef(None),
            ]
        );
    }
}
