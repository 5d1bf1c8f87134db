use std::io::{Cursor, Read};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use streamgraph_files::graph::types::StreamingChannel;
use streamgraph_files::link::{LinkGroup, decode_link};

use crate::StreamError;
use crate::graph::Graph;
use crate::streaming::{GroupResult, ObjectInfo};
use crate::types::{
    AtomicKind, ClassDescriptor, EnumShape, EnumValue, FieldShape, Identifier, Instance, ObjectRef, Pointer,
    PointerKind, StreamingDataSource, TypeFactory, TypeHash, Value,
};

type Rdr<'b> = Cursor<&'b [u8]>;

// vectors of elements without bytes on the wire, e.g. field-less compounds
const MAX_ZERO_SIZED_ELEMENTS: usize = 1 << 16;

/// Decoding state of the one group that is being materialized. Both cursors start at the group's offsets into the
/// shared link and locator tables and only ever move forward.
pub(crate) struct GroupContext<'a> {
    pub graph: &'a Graph,
    pub group_id: u32,
    /// class of every slot of the group
    pub classes: &'a [Arc<ClassDescriptor>],
    /// resolved sub-groups, in declaration order
    pub sub_groups: &'a [Arc<GroupResult>],
    pub resolve_references: bool,
    pub link_cursor: usize,
    pub locator_cursor: usize,
}

impl GroupContext<'_> {
    /// Deserializes consecutive object records from one span into the next free slots.
    pub fn read_span(
        &mut self,
        data: &[u8],
        factory: &dyn TypeFactory,
        objects: &mut Vec<ObjectInfo>,
    ) -> Result<(), StreamError> {
        let mut rdr = Cursor::new(data);
        while (rdr.position() as usize) < data.len() {
            let slot = objects.len();
            let Some(class) = self.classes.get(slot) else {
                return Err(StreamError::format(
                    self.group_id,
                    format!("{} bytes left after all {} objects", data.len() - rdr.position() as usize, slot),
                ));
            };

            let mut instance = factory.new_instance(class);
            self.read_object(&mut rdr, class, &mut instance)?;
            objects.push(ObjectInfo::new(class.clone(), instance));
        }
        Ok(())
    }

    fn read_object(
        &mut self,
        rdr: &mut Rdr<'_>,
        class: &ClassDescriptor,
        instance: &mut Instance,
    ) -> Result<(), StreamError> {
        let size = rdr.read_u32::<LittleEndian>().map_err(|err| self.truncated(err))? as usize;
        let start = rdr.position() as usize;
        let record = rdr
            .get_ref()
            .get(start..start + size)
            .ok_or_else(|| {
                StreamError::format(
                    self.group_id,
                    format!("{} record of {} bytes exceeds its span", class.name(), size),
                )
            })?;

        let mut fields = Cursor::new(record);
        self.read_fields(&mut fields, class, instance)?;

        let consumed = fields.position() as usize;
        if consumed != size {
            return Err(StreamError::format(
                self.group_id,
                format!("{} record declares {} bytes, but its fields consumed {}", class.name(), size, consumed),
            ));
        }

        rdr.set_position((start + size) as u64);
        Ok(())
    }

    fn read_fields(
        &mut self,
        rdr: &mut Rdr<'_>,
        class: &ClassDescriptor,
        instance: &mut Instance,
    ) -> Result<(), StreamError> {
        for (index, field) in class.fields().iter().enumerate() {
            let value = self.read_value(rdr, &field.shape)?;
            instance.set(index, value);
        }
        Ok(())
    }

    fn read_value(&mut self, rdr: &mut Rdr<'_>, shape: &FieldShape) -> Result<Value, StreamError> {
        Ok(match shape {
            FieldShape::Atomic(kind) => self.read_atomic(rdr, *kind)?,
            FieldShape::Enum(shape) => Value::Enum(self.read_enum(rdr, shape)?),
            FieldShape::Compound(class) => {
                let mut instance = Instance::new(class);
                self.read_fields(rdr, class, &mut instance)?;
                Value::Compound(instance)
            }
            FieldShape::Array { element, length } => {
                let mut elements = Vec::with_capacity(*length as usize);
                for _ in 0..*length {
                    elements.push(self.read_value(rdr, element)?);
                }
                Value::Sequence(elements)
            }
            FieldShape::Vector(element) => {
                let count = rdr.read_u32::<LittleEndian>().map_err(|err| self.truncated(err))? as usize;
                self.check_vector_count(rdr, element, count)?;
                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(self.read_value(rdr, element)?);
                }
                Value::Sequence(elements)
            }
            FieldShape::Pointer { target, kind } => Value::Pointer(self.read_pointer(rdr, *target, *kind)?),
            FieldShape::StreamingData => Value::StreamingData(self.read_streaming_data(rdr)?),
        })
    }

    /// Rejects counts the rest of the record cannot hold before anything is allocated.
    fn check_vector_count(&self, rdr: &Rdr<'_>, element: &FieldShape, count: usize) -> Result<(), StreamError> {
        let width = element.min_size();
        let fits = if width == 0 {
            count <= MAX_ZERO_SIZED_ELEMENTS
        } else {
            count.saturating_mul(width) <= remaining(rdr)
        };

        if fits {
            Ok(())
        } else {
            Err(StreamError::format(
                self.group_id,
                format!(
                    "vector of {} elements ({} bytes each) exceeds the {} bytes left in the record",
                    count,
                    width,
                    remaining(rdr)
                ),
            ))
        }
    }

    fn read_atomic(&self, rdr: &mut Rdr<'_>, kind: AtomicKind) -> Result<Value, StreamError> {
        let value = match kind {
            AtomicKind::Bool => rdr.read_u8().map(|value| Value::Bool(value != 0)),
            AtomicKind::I8 => rdr.read_i8().map(|value| Value::Int(value.into())),
            AtomicKind::U8 => rdr.read_u8().map(|value| Value::UInt(value.into())),
            AtomicKind::I16 => rdr.read_i16::<LittleEndian>().map(|value| Value::Int(value.into())),
            AtomicKind::U16 => rdr.read_u16::<LittleEndian>().map(|value| Value::UInt(value.into())),
            AtomicKind::I32 => rdr.read_i32::<LittleEndian>().map(|value| Value::Int(value.into())),
            AtomicKind::U32 => rdr.read_u32::<LittleEndian>().map(|value| Value::UInt(value.into())),
            AtomicKind::I64 => rdr.read_i64::<LittleEndian>().map(Value::Int),
            AtomicKind::U64 => rdr.read_u64::<LittleEndian>().map(Value::UInt),
            AtomicKind::F32 => rdr.read_f32::<LittleEndian>().map(|value| Value::Float(value.into())),
            AtomicKind::F64 => rdr.read_f64::<LittleEndian>().map(Value::Float),
            AtomicKind::String => return self.read_string(rdr).map(Value::String),
        };
        value.map_err(|err| self.truncated(err))
    }

    fn read_string(&self, rdr: &mut Rdr<'_>) -> Result<String, StreamError> {
        let length = rdr.read_u32::<LittleEndian>().map_err(|err| self.truncated(err))? as usize;
        let bytes = self.read_bytes(rdr, length)?;
        String::from_utf8(bytes)
            .map_err(|err| StreamError::format(self.group_id, format!("string field is not UTF-8: {}", err)))
    }

    fn read_bytes(&self, rdr: &mut Rdr<'_>, length: usize) -> Result<Vec<u8>, StreamError> {
        if length > remaining(rdr) {
            return Err(StreamError::format(
                self.group_id,
                format!("{} bytes requested, but the record only has {} left", length, remaining(rdr)),
            ));
        }

        let mut bytes = vec![0; length];
        rdr.read_exact(&mut bytes).map_err(|err| self.truncated(err))?;
        Ok(bytes)
    }

    fn read_enum(&self, rdr: &mut Rdr<'_>, shape: &EnumShape) -> Result<EnumValue, StreamError> {
        if !shape.repr.is_integer() {
            return Err(StreamError::Unsupported {
                group: self.group_id,
                feature: format!("enum representation {:?}", shape.repr),
            });
        }

        let raw = match self.read_atomic(rdr, shape.repr)? {
            Value::Int(value) => value,
            // u64 enums keep their bit pattern
            Value::UInt(value) => value as i64,
            other => {
                return Err(StreamError::format(self.group_id, format!("enum decoded to {:?}", other)));
            }
        };

        Ok(EnumValue {
            raw,
            name: shape.variant_name(raw).map(str::to_string),
        })
    }

    fn read_pointer(&mut self, rdr: &mut Rdr<'_>, target: TypeHash, kind: PointerKind) -> Result<Pointer, StreamError> {
        let present = rdr.read_u8().map_err(|err| self.truncated(err))? != 0;
        if !present {
            return Ok(Pointer::Null);
        }

        match kind {
            PointerKind::Identifier => {
                // the identifier is part of the record, it has to be consumed either way
                let identifier = rdr.read_u64::<LittleEndian>().map_err(|err| self.truncated(err))?;
                if self.resolve_references {
                    Ok(Pointer::Identifier(Identifier(identifier)))
                } else {
                    Ok(Pointer::Null)
                }
            }
            _ if !self.resolve_references => Ok(Pointer::Null),
            PointerKind::Forward => Ok(Pointer::Forward { target }),
            PointerKind::Link => self.resolve_link(target).map(Pointer::Object),
        }
    }

    fn resolve_link(&mut self, target: TypeHash) -> Result<ObjectRef, StreamError> {
        let entry = decode_link(self.graph.link_table(), self.link_cursor).map_err(|err| StreamError::DanglingLink {
            group: self.group_id,
            reason: format!("link table entry at {} is unreadable: {}", self.link_cursor, err),
        })?;
        self.link_cursor = entry.next;

        let index = entry.index;
        let (class, reference) = match entry.group {
            LinkGroup::Current => {
                let class = self.classes.get(index as usize).ok_or_else(|| StreamError::DanglingLink {
                    group: self.group_id,
                    reason: format!("object {} is out of range, the group has {}", index, self.classes.len()),
                })?;
                (class, ObjectRef::Local { index })
            }
            LinkGroup::SubGroup(position) => {
                let sub_group = self.sub_groups.get(position as usize).ok_or_else(|| StreamError::DanglingLink {
                    group: self.group_id,
                    reason: format!("sub-group {} is out of range, the group has {}", position, self.sub_groups.len()),
                })?;
                let object = sub_group.object(index as usize).ok_or_else(|| StreamError::DanglingLink {
                    group: self.group_id,
                    reason: format!(
                        "object {} is out of range, sub-group {} has {}",
                        index,
                        sub_group.group_id(),
                        sub_group.len()
                    ),
                })?;
                (
                    object.class(),
                    ObjectRef::External {
                        group: sub_group.clone(),
                        index,
                    },
                )
            }
        };

        if !class.is_assignable_to(target) {
            return Err(StreamError::PointerTypeMismatch {
                group: self.group_id,
                expected: target,
                found: class.name().to_string(),
            });
        }

        Ok(reference)
    }

    fn read_streaming_data(&mut self, rdr: &mut Rdr<'_>) -> Result<StreamingDataSource, StreamError> {
        let raw_channel = rdr.read_u32::<LittleEndian>().map_err(|err| self.truncated(err))?;
        let channel = StreamingChannel::try_from(raw_channel).map_err(|err| StreamError::Unsupported {
            group: self.group_id,
            feature: format!("streaming channel {}", err.number),
        })?;
        let length = rdr.read_u64::<LittleEndian>().map_err(|err| self.truncated(err))?;

        let mut source = StreamingDataSource {
            channel,
            length,
            ..Default::default()
        };

        match channel {
            StreamingChannel::Inline => {
                let length = usize::try_from(length).map_err(|_| {
                    StreamError::format(self.group_id, format!("inline payload of {} bytes", length))
                })?;
                source.inline = self.read_bytes(rdr, length)?;
            }
            StreamingChannel::Streamed if length > 0 && self.resolve_references => {
                let locator = self.graph.locator(self.locator_cursor).ok_or_else(|| {
                    StreamError::format(
                        self.group_id,
                        format!("streamed payload needs locator {}, but the table ends before", self.locator_cursor),
                    )
                })?;
                self.locator_cursor += 1;
                source.locator = Some(locator);
            }
            StreamingChannel::Streamed => {}
        }

        Ok(source)
    }

    fn truncated(&self, err: std::io::Error) -> StreamError {
        StreamError::format(self.group_id, format!("object record ends early: {}", err))
    }
}

fn remaining(rdr: &Rdr<'_>) -> usize {
    rdr.get_ref().len().saturating_sub(rdr.position() as usize)
}
