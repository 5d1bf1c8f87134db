use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use streamgraph_files::graph::types::{Locator, StreamingChannel};

use crate::streaming::{GroupResult, ObjectInfo};
use crate::types::{AtomicKind, ClassDescriptor, FieldShape, TypeHash};

/// The field values of one object, in the order of its class' fields.
#[derive(Debug, Clone)]
pub struct Instance {
    fields: Vec<Value>,
}

impl Instance {
    pub fn new(class: &ClassDescriptor) -> Self {
        Self {
            fields: class
                .fields()
                .iter()
                .map(|field| Value::default_for(&field.shape))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// Looks a field up by name, `class` has to be the class this instance was created for.
    pub fn get(&self, class: &ClassDescriptor, name: &str) -> Option<&Value> {
        class.field_index(name).and_then(|index| self.field(index))
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub raw: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Enum(EnumValue),
    Compound(Instance),
    Sequence(Vec<Value>),
    Pointer(Pointer),
    StreamingData(StreamingDataSource),
}

impl Value {
    pub fn default_for(shape: &FieldShape) -> Value {
        match shape {
            FieldShape::Atomic(kind) => match kind {
                AtomicKind::Bool => Value::Bool(false),
                AtomicKind::I8 | AtomicKind::I16 | AtomicKind::I32 | AtomicKind::I64 => Value::Int(0),
                AtomicKind::U8 | AtomicKind::U16 | AtomicKind::U32 | AtomicKind::U64 => Value::UInt(0),
                AtomicKind::F32 | AtomicKind::F64 => Value::Float(0.0),
                AtomicKind::String => Value::String(String::new()),
            },
            FieldShape::Enum(_) => Value::Enum(EnumValue { raw: 0, name: None }),
            FieldShape::Compound(class) => Value::Compound(Instance::new(class)),
            FieldShape::Array { element, length } => {
                Value::Sequence((0..*length).map(|_| Value::default_for(element)).collect())
            }
            FieldShape::Vector(_) => Value::Sequence(Vec::new()),
            FieldShape::Pointer { .. } => Value::Pointer(Pointer::Null),
            FieldShape::StreamingData => Value::StreamingData(StreamingDataSource::default()),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(value) => Some(*value),
            Value::Int(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => i64::try_from(*value).ok(),
            Value::Enum(value) => Some(value.raw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Value::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    pub fn as_streaming_data(&self) -> Option<&StreamingDataSource> {
        match self {
            Value::StreamingData(source) => Some(source),
            _ => None,
        }
    }
}

/// Key of an identifier-keyed reference, resolved outside of this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub u64);

#[derive(Debug, Clone)]
pub enum Pointer {
    /// Absent, or not resolved because the group was read without its sub-groups.
    Null,
    Object(ObjectRef),
    /// Placeholder for a reference that can only be resolved with game state.
    Forward { target: TypeHash },
    Identifier(Identifier),
}

impl Pointer {
    pub fn is_null(&self) -> bool {
        matches!(self, Pointer::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Pointer::Object(reference) => Some(reference),
            _ => None,
        }
    }
}

/// A resolved pointer. Pointers into the declaring group are indices, because that group is still being built when
/// they are decoded; pointers into sub-groups keep the sub-group alive. Groups form a DAG, so this never cycles.
#[derive(Clone)]
pub enum ObjectRef {
    Local { index: u32 },
    External { group: Arc<GroupResult>, index: u32 },
}

impl ObjectRef {
    pub fn index(&self) -> u32 {
        match self {
            ObjectRef::Local { index } | ObjectRef::External { index, .. } => *index,
        }
    }

    /// The referenced object. `owner` is the group result holding the object that carries this pointer.
    pub fn target<'a>(&'a self, owner: &'a GroupResult) -> Option<&'a ObjectInfo> {
        match self {
            ObjectRef::Local { index } => owner.object(*index as usize),
            ObjectRef::External { group, index } => group.object(*index as usize),
        }
    }

    /// The group result the referenced object lives in.
    pub fn group<'a>(&'a self, owner: &'a GroupResult) -> &'a GroupResult {
        match self {
            ObjectRef::Local { .. } => owner,
            ObjectRef::External { group, .. } => group,
        }
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Printing the target group would dump the whole dependency tree.
        match self {
            ObjectRef::Local { index } => write!(f, "Local(#{})", index),
            ObjectRef::External { group, index } => write!(f, "External(group {}, #{})", group.group_id(), index),
        }
    }
}

/// Describes a payload whose bytes are read separately from the object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingDataSource {
    pub channel: StreamingChannel,
    pub length: u64,
    /// payload bytes of the inline channel
    pub inline: Vec<u8>,
    /// position of a streamed payload, `None` until the reader resolved it
    pub locator: Option<Locator>,
}

impl StreamingDataSource {
    pub fn is_out_of_line(&self) -> bool {
        self.channel == StreamingChannel::Streamed && self.length > 0
    }
}

impl Default for StreamingDataSource {
    fn default() -> Self {
        Self {
            channel: StreamingChannel::Inline,
            length: 0,
            inline: Vec::new(),
            locator: None,
        }
    }
}
