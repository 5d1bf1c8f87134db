#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{LittleEndian, WriteBytesExt};
use streamgraph::catalog::Catalog;
use streamgraph::graph::Graph;
use streamgraph::io::common::loader::{ArchiveFile, StorageDevice, StorageError};
use streamgraph::io::memory::loader::MemoryStorage;
use streamgraph::streaming::reader::{ReaderSettings, StreamingReader};
use streamgraph::types::TypeHash;
use streamgraph::types::registry::TypeRegistry;
use streamgraph_files::common::types::fourcc;
use streamgraph_files::graph::types::Locator;

pub const RESOURCE: TypeHash = TypeHash(0x10);
pub const TEXTURE: TypeHash = TypeHash(0x11);
pub const MATERIAL: TypeHash = TypeHash(0x12);
pub const MESH: TypeHash = TypeHash(0x13);
pub const BATCH: TypeHash = TypeHash(0x15);

pub const GROUPS_FILE: &str = "groups.bin";
pub const PAYLOAD_FILE: &str = "payload.bin";
const PAYLOAD_FILE_INDEX: u32 = 1;

pub const CATALOG: &str = r#"
<Catalog>
  <Class name="Resource" hash="0x10">
    <Field name="name" type="string"/>
  </Class>
  <Class name="Texture" hash="0x11" parent="Resource">
    <Field name="width" type="u32"/>
    <Field name="pixels" type="stream"/>
  </Class>
  <Class name="Material" hash="0x12" parent="Resource">
    <Field name="texture" type="ptr&lt;Texture&gt;"/>
    <Field name="blend" type="enum&lt;u8&gt;">
      <Variant name="Opaque" value="0"/>
      <Variant name="Additive" value="2"/>
    </Field>
  </Class>
  <Class name="Mesh" hash="0x13" parent="Resource">
    <Field name="material" type="ptr&lt;Material&gt;"/>
    <Field name="next" type="ptr&lt;Resource&gt;"/>
    <Field name="bounds" type="array&lt;f32;2&gt;"/>
    <Field name="indices" type="vector&lt;u16&gt;"/>
    <Field name="script" type="id&lt;Resource&gt;"/>
    <Field name="skeleton" type="fwd&lt;Resource&gt;"/>
  </Class>
  <Class name="Marker" hash="0x14"/>
  <Class name="Batch" hash="0x15">
    <Field name="markers" type="vector&lt;Marker&gt;"/>
    <Field name="weights" type="vector&lt;u32&gt;"/>
  </Class>
</Catalog>
"#;

pub fn registry() -> TypeRegistry {
    Catalog::from_xml(CATALOG)
        .and_then(Catalog::into_registry)
        .expect("test catalog is valid")
}

/// Field bytes of one object record.
#[derive(Debug, Default, Clone)]
pub struct Fields {
    data: Vec<u8>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.data.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.data.write_u16::<LittleEndian>(value).unwrap();
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.data.write_u32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.data.write_u64::<LittleEndian>(value).unwrap();
        self
    }

    pub fn f32(mut self, value: f32) -> Self {
        self.data.write_f32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn string(self, value: &str) -> Self {
        let mut fields = self.u32(value.len() as u32);
        fields.data.extend_from_slice(value.as_bytes());
        fields
    }

    /// Presence flag of a pointer.
    pub fn pointer(self, present: bool) -> Self {
        self.u8(present as u8)
    }

    pub fn inline_payload(self, payload: &[u8]) -> Self {
        let mut fields = self.u32(0).u64(payload.len() as u64);
        fields.data.extend_from_slice(payload);
        fields
    }

    pub fn streamed_payload(self, length: u64) -> Self {
        self.u32(1).u64(length)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Size prefixed, as stored in a span.
    pub fn into_record(self) -> Vec<u8> {
        let mut record = Vec::with_capacity(self.data.len() + 4);
        record.write_u32::<LittleEndian>(self.data.len() as u32).unwrap();
        record.extend(self.data);
        record
    }
}

pub fn texture(name: &str, width: u32, pixels: Fields) -> Fields {
    let fields = Fields::new().string(name).u32(width);
    let mut data = fields.into_bytes();
    data.extend(pixels.into_bytes());
    Fields { data }
}

pub fn material(name: &str, has_texture: bool, blend: u8) -> Fields {
    Fields::new().string(name).pointer(has_texture).u8(blend)
}

pub fn resource(name: &str) -> Fields {
    Fields::new().string(name)
}

#[derive(Debug, Default)]
pub struct GroupBuilder {
    group_id: u32,
    sub_groups: Vec<u32>,
    types: Vec<TypeHash>,
    spans: Vec<Vec<u8>>,
    roots: Vec<(u64, u32)>,
    links: Vec<u8>,
    locators: Vec<Locator>,
    patch: bool,
}

impl GroupBuilder {
    pub fn sub_group(&mut self, group_id: u32) -> &mut Self {
        self.sub_groups.push(group_id);
        self
    }

    pub fn object(&mut self, class: TypeHash, fields: Fields) -> &mut Self {
        self.raw_object(class, &fields.into_record())
    }

    /// An object slot whose record bytes are taken as they are.
    pub fn raw_object(&mut self, class: TypeHash, record: &[u8]) -> &mut Self {
        self.types.push(class);
        self.current_span().extend_from_slice(record);
        self
    }

    /// An object slot without any bytes in the spans.
    pub fn slot(&mut self, class: TypeHash) -> &mut Self {
        self.types.push(class);
        self
    }

    pub fn trailing_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.current_span().extend_from_slice(bytes);
        self
    }

    /// Following objects go into a new span.
    pub fn next_span(&mut self) -> &mut Self {
        self.spans.push(Vec::new());
        self
    }

    pub fn root(&mut self, identifier: u64, object_index: u32) -> &mut Self {
        self.roots.push((identifier, object_index));
        self
    }

    pub fn links(&mut self, bytes: &[u8]) -> &mut Self {
        self.links.extend_from_slice(bytes);
        self
    }

    pub fn locator(&mut self, locator: Locator) -> &mut Self {
        self.locators.push(locator);
        self
    }

    pub fn patch(&mut self) -> &mut Self {
        self.patch = true;
        self
    }

    fn current_span(&mut self) -> &mut Vec<u8> {
        if self.spans.is_empty() {
            self.spans.push(Vec::new());
        }
        self.spans.last_mut().unwrap()
    }
}

/// Writes archives with one span file for the base groups, one for patched groups and one for streamed payloads.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    groups: Vec<GroupBuilder>,
    payload: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&mut self, group_id: u32) -> &mut GroupBuilder {
        self.groups.push(GroupBuilder {
            group_id,
            ..Default::default()
        });
        self.groups.last_mut().unwrap()
    }

    /// Appends a streamed payload and returns its locator.
    pub fn payload(&mut self, bytes: &[u8]) -> Locator {
        let locator = Locator::new(PAYLOAD_FILE_INDEX, self.payload.len() as u64);
        self.payload.extend_from_slice(bytes);
        locator
    }

    pub fn build(&self) -> (Vec<u8>, MemoryStorage) {
        let mut groups = Vec::new();
        let mut roots = Vec::new();
        let mut sub_groups = Vec::new();
        let mut type_hashes: Vec<u64> = Vec::new();
        let mut type_indices = Vec::new();
        let mut spans = Vec::new();
        let mut locators = Vec::new();
        let mut links = Vec::new();
        let mut base_file = Vec::new();
        let mut patch_file = Vec::new();

        let (mut root_count, mut sub_group_count, mut type_count, mut span_count, mut locator_count) = (0, 0, 0, 0, 0);
        for group in &self.groups {
            let span_data = if group.spans.is_empty() { vec![Vec::new()] } else { group.spans.clone() };

            for value in [
                group.group_id,
                root_count,
                group.roots.len() as u32,
                sub_group_count,
                group.sub_groups.len() as u32,
                type_count,
                group.types.len() as u32,
                group.types.len() as u32,
                span_count,
                span_data.len() as u32,
                links.len() as u32,
                locator_count,
            ] {
                groups.write_u32::<LittleEndian>(value).unwrap();
            }

            for (identifier, index) in &group.roots {
                roots.write_u64::<LittleEndian>(*identifier).unwrap();
                roots.write_u32::<LittleEndian>(*index).unwrap();
            }
            for sub_group in &group.sub_groups {
                sub_groups.write_u32::<LittleEndian>(*sub_group).unwrap();
            }
            for class in &group.types {
                let index = match type_hashes.iter().position(|hash| *hash == class.0) {
                    Some(index) => index,
                    None => {
                        type_hashes.push(class.0);
                        type_hashes.len() - 1
                    }
                };
                type_indices.write_u16::<LittleEndian>(index as u16).unwrap();
            }

            let (file, flag) = if group.patch { (&mut patch_file, 0x8000_0000) } else { (&mut base_file, 0) };
            for data in &span_data {
                spans.write_u32::<LittleEndian>(flag).unwrap();
                spans.write_u64::<LittleEndian>(file.len() as u64).unwrap();
                spans.write_u32::<LittleEndian>(data.len() as u32).unwrap();
                file.extend_from_slice(data);
            }

            for locator in &group.locators {
                locators.write_u64::<LittleEndian>(locator.0).unwrap();
            }
            links.extend_from_slice(&group.links);

            root_count += group.roots.len() as u32;
            sub_group_count += group.sub_groups.len() as u32;
            type_count += group.types.len() as u32;
            span_count += span_data.len() as u32;
            locator_count += group.locators.len() as u32;
        }

        let mut hashes = Vec::new();
        for hash in &type_hashes {
            hashes.write_u64::<LittleEndian>(*hash).unwrap();
        }

        let mut type_table = Vec::new();
        for value in [0, 2, type_count as i32, type_count as i32, 1] {
            type_table.write_i32::<LittleEndian>(value).unwrap();
        }
        type_table.extend(type_indices);

        let files = format!("{}\0{}\0", GROUPS_FILE, PAYLOAD_FILE).into_bytes();

        let mut archive = Vec::new();
        chunk(&mut archive, b"MVER", &1u32.to_le_bytes());
        chunk(&mut archive, b"GRPS", &groups);
        chunk(&mut archive, b"ROOT", &roots);
        chunk(&mut archive, b"SUBG", &sub_groups);
        chunk(&mut archive, b"THSH", &hashes);
        chunk(&mut archive, b"TYPE", &type_table);
        chunk(&mut archive, b"FILE", &files);
        chunk(&mut archive, b"SPAN", &spans);
        chunk(&mut archive, b"LOCR", &locators);
        chunk(&mut archive, b"LINK", &links);

        let mut storage = MemoryStorage::new();
        storage.insert(GROUPS_FILE, false, base_file);
        storage.insert(GROUPS_FILE, true, patch_file);
        storage.insert(PAYLOAD_FILE, false, self.payload.clone());
        (archive, storage)
    }

    pub fn open(&self) -> Result<Fixture, anyhow::Error> {
        let (archive, storage) = self.build();
        let registry = Arc::new(registry());
        let graph = Graph::parse(&mut archive.as_slice(), registry.as_ref())?;
        Ok(Fixture {
            graph: Arc::new(graph),
            registry,
            storage: Arc::new(CountingStorage::new(storage)),
        })
    }
}

fn chunk(out: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
    out.write_u32::<LittleEndian>(fourcc(tag)).unwrap();
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(data);
}

pub struct Fixture {
    pub graph: Arc<Graph>,
    pub registry: Arc<TypeRegistry>,
    pub storage: Arc<CountingStorage>,
}

impl Fixture {
    pub fn reader(&self) -> StreamingReader {
        StreamingReader::new(
            self.graph.clone(),
            self.registry.clone(),
            self.storage.clone(),
            ReaderSettings::default(),
        )
    }
}

/// Counts every range read, to tell cache hits from materializations.
pub struct CountingStorage {
    inner: MemoryStorage,
    reads: AtomicUsize,
}

impl CountingStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl StorageDevice for CountingStorage {
    fn read_range(&self, file: &ArchiveFile<'_>, offset: u64, length: usize) -> Result<Vec<u8>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_range(file, offset, length)
    }
}
