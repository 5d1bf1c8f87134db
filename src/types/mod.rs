//! The runtime type model that drives object decoding.
//!
//! Class descriptors are data: the archive only stores type hashes, and a [`TypeFactory`] supplied by the hosting
//! application maps them to descriptors. A descriptor lists its serializable fields in stream order, each with a
//! [`FieldShape`] taken from a closed set, so the decoder dispatches once per field instead of inspecting types at
//! runtime.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use thiserror::Error;

pub mod registry;
pub mod value;

pub use value::{EnumValue, Identifier, Instance, ObjectRef, Pointer, StreamingDataSource, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHash(pub u64);

impl Display for TypeHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("Unknown type {0}")]
    UnknownType(TypeHash),

    #[error("Type {name} ({hash}) is registered twice")]
    DuplicateType { name: String, hash: TypeHash },
}

/// Supplies class descriptors and default instances for the type hashes found in an archive.
pub trait TypeFactory: Send + Sync {
    fn resolve(&self, hash: TypeHash) -> Result<Arc<ClassDescriptor>, TypeError>;

    /// A constructed, but not yet deserialized instance of `class`.
    fn new_instance(&self, class: &ClassDescriptor) -> Instance {
        Instance::new(class)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AtomicKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
}

impl AtomicKind {
    pub fn from_name(name: &str) -> Option<AtomicKind> {
        Some(match name {
            "bool" => AtomicKind::Bool,
            "i8" => AtomicKind::I8,
            "u8" => AtomicKind::U8,
            "i16" => AtomicKind::I16,
            "u16" => AtomicKind::U16,
            "i32" => AtomicKind::I32,
            "u32" => AtomicKind::U32,
            "i64" => AtomicKind::I64,
            "u64" => AtomicKind::U64,
            "f32" => AtomicKind::F32,
            "f64" => AtomicKind::F64,
            "string" => AtomicKind::String,
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, AtomicKind::Bool | AtomicKind::F32 | AtomicKind::F64 | AtomicKind::String)
    }

    /// Encoded size in bytes, strings count their length prefix only.
    pub fn min_size(&self) -> usize {
        match self {
            AtomicKind::Bool | AtomicKind::I8 | AtomicKind::U8 => 1,
            AtomicKind::I16 | AtomicKind::U16 => 2,
            AtomicKind::I32 | AtomicKind::U32 | AtomicKind::F32 | AtomicKind::String => 4,
            AtomicKind::I64 | AtomicKind::U64 | AtomicKind::F64 => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PointerKind {
    /// Resolved through the link table.
    Link,
    /// Needs game state to resolve, only ever yields a placeholder.
    Forward,
    /// Carries an inline identifier that a higher level resolves.
    Identifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumShape {
    /// integer representation on the wire
    pub repr: AtomicKind,
    pub variants: Vec<(String, i64)>,
}

impl EnumShape {
    pub fn variant_name(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, variant)| *variant == value)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum FieldShape {
    Atomic(AtomicKind),
    Enum(EnumShape),
    /// A nested object, stored inline without a size prefix.
    Compound(Arc<ClassDescriptor>),
    /// Fixed length sequence.
    Array { element: Box<FieldShape>, length: u32 },
    /// Count prefixed sequence.
    Vector(Box<FieldShape>),
    Pointer { target: TypeHash, kind: PointerKind },
    /// A payload descriptor whose bytes are either inline or addressed through the locator table.
    StreamingData,
}

impl FieldShape {
    /// The fewest bytes a value of this shape can occupy in a record. Zero for field-less compounds and empty arrays.
    pub fn min_size(&self) -> usize {
        match self {
            FieldShape::Atomic(kind) => kind.min_size(),
            FieldShape::Enum(shape) => shape.repr.min_size(),
            FieldShape::Compound(class) => class.fields().iter().map(|field| field.shape.min_size()).sum(),
            FieldShape::Array { element, length } => element.min_size().saturating_mul(*length as usize),
            FieldShape::Vector(_) => 4,
            // presence flag
            FieldShape::Pointer { .. } => 1,
            // channel and length
            FieldShape::StreamingData => 12,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub shape: FieldShape,
}

#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: String,
    hash: TypeHash,
    /// ancestors, closest first
    lineage: Vec<TypeHash>,
    fields: Vec<FieldDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>, hash: TypeHash) -> Self {
        Self {
            name: name.into(),
            hash,
            lineage: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Derives from `parent`: the parent's fields are serialized first and the class becomes assignable to it.
    pub fn with_parent(mut self, parent: &ClassDescriptor) -> Self {
        let mut lineage = Vec::with_capacity(parent.lineage.len() + 1);
        lineage.push(parent.hash);
        lineage.extend_from_slice(&parent.lineage);
        self.lineage = lineage;

        let own_fields = std::mem::take(&mut self.fields);
        self.fields = parent.fields.clone();
        self.fields.extend(own_fields);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, shape: FieldShape) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            shape,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn is_assignable_to(&self, target: TypeHash) -> bool {
        self.hash == target || self.lineage.contains(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_assignability() {
        let resource =
            ClassDescriptor::new("Resource", TypeHash(1)).with_field("name", FieldShape::Atomic(AtomicKind::String));
        let mesh = ClassDescriptor::new("Mesh", TypeHash(2))
            .with_field("vertex_count", FieldShape::Atomic(AtomicKind::U32))
            .with_parent(&resource);
        let skinned = ClassDescriptor::new("SkinnedMesh", TypeHash(3)).with_parent(&mesh);

        assert!(skinned.is_assignable_to(TypeHash(3)));
        assert!(skinned.is_assignable_to(TypeHash(2)));
        assert!(skinned.is_assignable_to(TypeHash(1)));
        assert!(!resource.is_assignable_to(TypeHash(2)));
        assert!(!mesh.is_assignable_to(TypeHash(3)));

        // parent fields come first, regardless of the builder order
        let names: Vec<_> = mesh.fields().iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["name", "vertex_count"]);
        assert_eq!(skinned.field_index("vertex_count"), Some(1));
    }

    #[test]
    fn enum_variant_names() {
        let shape = EnumShape {
            repr: AtomicKind::U8,
            variants: vec![("Opaque".into(), 0), ("Blend".into(), 2)],
        };
        assert_eq!(shape.variant_name(2), Some("Blend"));
        assert_eq!(shape.variant_name(1), None);
    }

    #[test]
    fn shape_sizes() {
        let empty = Arc::new(ClassDescriptor::new("Empty", TypeHash(4)));
        let pair = Arc::new(
            ClassDescriptor::new("Pair", TypeHash(5))
                .with_field("key", FieldShape::Atomic(AtomicKind::U16))
                .with_field(
                    "value",
                    FieldShape::Pointer {
                        target: TypeHash(4),
                        kind: PointerKind::Link,
                    },
                ),
        );

        assert_eq!(FieldShape::Compound(empty.clone()).min_size(), 0);
        assert_eq!(FieldShape::Compound(pair.clone()).min_size(), 3);
        assert_eq!(
            FieldShape::Array {
                element: Box::new(FieldShape::Compound(pair)),
                length: 4
            }
            .min_size(),
            12
        );
        assert_eq!(
            FieldShape::Array {
                element: Box::new(FieldShape::Atomic(AtomicKind::F64)),
                length: 0
            }
            .min_size(),
            0
        );
        assert_eq!(FieldShape::Vector(Box::new(FieldShape::Compound(empty))).min_size(), 4);
        assert_eq!(FieldShape::Atomic(AtomicKind::String).min_size(), 4);
    }
}
