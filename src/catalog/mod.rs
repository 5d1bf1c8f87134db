//! Class catalogs as XML, so that a hosting application can describe its types as data:
//!
//! ```xml
//! <Catalog>
//!   <Class name="Resource" hash="0x10">
//!     <Field name="name" type="string"/>
//!   </Class>
//!   <Class name="Mesh" hash="0x11" parent="Resource">
//!     <Field name="bounds" type="array&lt;f32;6&gt;"/>
//!     <Field name="material" type="ptr&lt;Material&gt;"/>
//!     <Field name="blend" type="enum&lt;u8&gt;">
//!       <Variant name="Opaque" value="0"/>
//!     </Field>
//!   </Class>
//! </Catalog>
//! ```
//!
//! Parents and compound fields have to be declared before they are used, pointer targets can be declared anywhere.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use quick_xml::de::{DeError, Deserializer};
use serde::Deserialize;
use thiserror::Error;

use crate::types::registry::TypeRegistry;
use crate::types::{AtomicKind, ClassDescriptor, EnumShape, FieldShape, PointerKind, TypeError, TypeHash};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Xml(#[from] DeError),

    #[error("Class {class} has an invalid hash {value:?}")]
    InvalidHash { class: String, value: String },

    #[error("Class {class} derives from {parent}, which is not declared before it")]
    UnknownParent { class: String, parent: String },

    #[error("{class}.{field}: unknown type {name:?}")]
    UnknownType { class: String, field: String, name: String },

    #[error("{class}.{field}: {reason}")]
    InvalidType { class: String, field: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

#[derive(Deserialize, Debug)]
pub struct Catalog {
    #[serde(rename = "Class", default)]
    pub classes: Vec<ClassDef>,
}

#[derive(Deserialize, Debug)]
pub struct ClassDef {
    #[serde(rename = "@name")]
    pub name: String,
    /// decimal, or hexadecimal with a `0x` prefix
    #[serde(rename = "@hash")]
    pub hash: String,
    #[serde(rename = "@parent", default)]
    pub parent: Option<String>,
    #[serde(rename = "Field", default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Deserialize, Debug)]
pub struct FieldDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub type_expr: String,
    #[serde(rename = "Variant", default)]
    pub variants: Vec<VariantDef>,
}

#[derive(Deserialize, Debug)]
pub struct VariantDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value")]
    pub value: i64,
}

impl Catalog {
    pub fn from_xml(xml: &str) -> Result<Catalog, CatalogError> {
        let mut deserializer = Deserializer::from_str(xml);
        Ok(Catalog::deserialize(&mut deserializer)?)
    }

    pub fn from_reader<T: BufRead>(read: T) -> Result<Catalog, CatalogError> {
        let mut deserializer = Deserializer::from_reader(read);
        Ok(Catalog::deserialize(&mut deserializer)?)
    }

    pub fn into_registry(self) -> Result<TypeRegistry, CatalogError> {
        let hashes = self
            .classes
            .iter()
            .map(|class| parse_hash(class).map(|hash| (class.name.as_str(), hash)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        let mut registry = TypeRegistry::new();
        for class in &self.classes {
            let builder = ShapeBuilder {
                class: &class.name,
                registry: &registry,
                hashes: &hashes,
            };

            let mut descriptor = ClassDescriptor::new(class.name.as_str(), hashes[class.name.as_str()]);
            for field in &class.fields {
                let shape = builder.parse(&field.name, &field.type_expr, &field.variants)?;
                descriptor = descriptor.with_field(field.name.as_str(), shape);
            }

            if let Some(parent) = &class.parent {
                let parent = registry
                    .by_name(parent)
                    .ok_or_else(|| CatalogError::UnknownParent {
                        class: class.name.clone(),
                        parent: parent.clone(),
                    })?;
                descriptor = descriptor.with_parent(parent);
            }

            registry.register(descriptor)?;
        }

        debug!("Loaded {} classes from catalog", registry.len());
        Ok(registry)
    }
}

pub fn load_catalog_file(path: &Path) -> Result<TypeRegistry, CatalogError> {
    let file = File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Catalog::from_reader(BufReader::new(file))?.into_registry()
}

fn parse_hash(class: &ClassDef) -> Result<TypeHash, CatalogError> {
    let value = class.hash.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };

    parsed.map(TypeHash).map_err(|_| CatalogError::InvalidHash {
        class: class.name.clone(),
        value: class.hash.clone(),
    })
}

/// Strips `name<` and `>` off `expr`.
fn generic<'e>(expr: &'e str, name: &str) -> Option<&'e str> {
    expr.strip_prefix(name)?
        .strip_prefix('<')?
        .strip_suffix('>')
        .map(str::trim)
}

struct ShapeBuilder<'c> {
    class: &'c str,
    registry: &'c TypeRegistry,
    hashes: &'c HashMap<&'c str, TypeHash>,
}

impl ShapeBuilder<'_> {
    fn parse(&self, field: &str, expr: &str, variants: &[VariantDef]) -> Result<FieldShape, CatalogError> {
        let expr = expr.trim();

        if let Some(inner) = generic(expr, "array") {
            let (element, length) = inner
                .rsplit_once(';')
                .ok_or_else(|| self.invalid(field, format!("{} lacks a length", expr)))?;
            let length = length
                .trim()
                .parse()
                .map_err(|_| self.invalid(field, format!("{} has an invalid length", expr)))?;
            return Ok(FieldShape::Array {
                element: Box::new(self.parse(field, element, &[])?),
                length,
            });
        }

        if let Some(inner) = generic(expr, "vector") {
            return Ok(FieldShape::Vector(Box::new(self.parse(field, inner, &[])?)));
        }

        for (name, kind) in [
            ("ptr", PointerKind::Link),
            ("fwd", PointerKind::Forward),
            ("id", PointerKind::Identifier),
        ] {
            if let Some(target) = generic(expr, name) {
                let target = self
                    .hashes
                    .get(target)
                    .copied()
                    .ok_or_else(|| self.unknown(field, target))?;
                return Ok(FieldShape::Pointer { target, kind });
            }
        }

        if let Some(repr) = generic(expr, "enum") {
            let repr = AtomicKind::from_name(repr)
                .filter(AtomicKind::is_integer)
                .ok_or_else(|| self.invalid(field, format!("{} is not an integer enum", expr)))?;
            return Ok(FieldShape::Enum(EnumShape {
                repr,
                variants: variants
                    .iter()
                    .map(|variant| (variant.name.clone(), variant.value))
                    .collect(),
            }));
        }

        if expr == "stream" {
            return Ok(FieldShape::StreamingData);
        }

        if let Some(kind) = AtomicKind::from_name(expr) {
            return Ok(FieldShape::Atomic(kind));
        }

        self.registry
            .by_name(expr)
            .map(|class| FieldShape::Compound(class.clone()))
            .ok_or_else(|| self.unknown(field, expr))
    }

    fn unknown(&self, field: &str, name: &str) -> CatalogError {
        CatalogError::UnknownType {
            class: self.class.to_string(),
            field: field.to_string(),
            name: name.to_string(),
        }
    }

    fn invalid(&self, field: &str, reason: String) -> CatalogError {
        CatalogError::InvalidType {
            class: self.class.to_string(),
            field: field.to_string(),
            reason,
        }
    }
}
