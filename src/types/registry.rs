use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{ClassDescriptor, TypeError, TypeFactory, TypeHash};

/// A [`TypeFactory`] over a fixed set of classes.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_hash: HashMap<TypeHash, Arc<ClassDescriptor>>,
    by_name: HashMap<String, TypeHash>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ClassDescriptor) -> Result<Arc<ClassDescriptor>, TypeError> {
        if self.by_hash.contains_key(&class.hash()) || self.by_name.contains_key(class.name()) {
            return Err(TypeError::DuplicateType {
                name: class.name().to_string(),
                hash: class.hash(),
            });
        }

        let class = Arc::new(class);
        self.by_name.insert(class.name().to_string(), class.hash());
        self.by_hash.insert(class.hash(), class.clone());
        Ok(class)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<ClassDescriptor>> {
        self.by_name.get(name).and_then(|hash| self.by_hash.get(hash))
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

impl TypeFactory for TypeRegistry {
    fn resolve(&self, hash: TypeHash) -> Result<Arc<ClassDescriptor>, TypeError> {
        self.by_hash
            .get(&hash)
            .cloned()
            .ok_or(TypeError::UnknownType(hash))
    }
}
