use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::types::{ClassDescriptor, Instance, Value};

pub mod cache;
mod deserializer;
pub mod reader;

/// One deserialized object: the class it was constructed as, and its field values.
#[derive(Clone)]
pub struct ObjectInfo {
    class: Arc<ClassDescriptor>,
    instance: Instance,
}

impl ObjectInfo {
    pub(crate) fn new(class: Arc<ClassDescriptor>, instance: Instance) -> Self {
        Self { class, instance }
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.instance.get(&self.class, field)
    }
}

impl Debug for ObjectInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct(self.class.name());
        for (descriptor, value) in self.class.fields().iter().zip(self.instance.fields()) {
            dbg.field(&descriptor.name, value);
        }
        dbg.finish()
    }
}

/// A fully materialized group. Immutable, shared between the cache and everybody who requested it.
#[derive(Debug)]
pub struct GroupResult {
    group_id: u32,
    objects: Vec<ObjectInfo>,
}

impl GroupResult {
    pub(crate) fn new(group_id: u32, objects: Vec<ObjectInfo>) -> Self {
        Self { group_id, objects }
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn object(&self, index: usize) -> Option<&ObjectInfo> {
        self.objects.get(index)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
