//! The archive's structural metadata, with the lookups the reader needs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Read;
use std::sync::Arc;

use log::{debug, trace};
use streamgraph_files::graph::reader::GraphReader;
use streamgraph_files::graph::types::{GraphAsset, Locator, RootRecord, SpanRecord};

use crate::StreamError;
use crate::io::common::loader::ArchiveFile;
use crate::types::{ClassDescriptor, TypeFactory, TypeHash};

pub use streamgraph_files::graph::types::GroupRecord as Group;

/// Immutable after construction, shared read-only by every reader.
pub struct Graph {
    asset: GraphAsset,
    /// one class per type table entry
    slot_classes: Vec<Arc<ClassDescriptor>>,
    by_id: HashMap<u32, usize>,
    /// root identifier to (group position, object index)
    by_root: HashMap<u64, (usize, u32)>,
    dependents: HashMap<u32, Vec<u32>>,
}

impl Graph {
    pub fn parse<R: Read>(rdr: &mut R, factory: &dyn TypeFactory) -> Result<Graph, StreamError> {
        let asset = GraphReader::parse_asset(rdr)?;
        Graph::build(asset, factory)
    }

    /// Builds the graph from tables that were assembled elsewhere, validating them first.
    pub fn from_asset(asset: GraphAsset, factory: &dyn TypeFactory) -> Result<Graph, StreamError> {
        GraphReader::validate(&asset)?;
        Graph::build(asset, factory)
    }

    fn build(asset: GraphAsset, factory: &dyn TypeFactory) -> Result<Graph, StreamError> {
        // Resolve every distinct hash once, then fan out to the slots.
        let hash_classes = asset
            .type_hashes
            .iter()
            .map(|&hash| factory.resolve(TypeHash(hash)))
            .collect::<Result<Vec<_>, _>>()?;

        let slot_classes = asset
            .type_table
            .hash_indices
            .iter()
            .map(|&index| hash_classes[index as usize].clone())
            .collect::<Vec<_>>();

        let mut by_id = HashMap::with_capacity(asset.groups.len());
        let mut by_root = HashMap::with_capacity(asset.roots.len());
        let mut dependents: HashMap<u32, Vec<u32>> = HashMap::new();

        for (position, group) in asset.groups.iter().enumerate() {
            by_id.insert(group.group_id, position);

            for root in &asset.roots[group.roots()] {
                by_root.insert(root.identifier, (position, root.object_index));
            }

            for &sub_group in &asset.sub_groups[group.sub_groups()] {
                let parents = dependents.entry(sub_group).or_default();
                // a group may list the same sub-group twice
                if !parents.contains(&group.group_id) {
                    parents.push(group.group_id);
                }
            }
        }

        debug!(
            "Loaded graph with {} groups, {} roots, {} classes and {} files",
            asset.groups.len(),
            asset.roots.len(),
            hash_classes.len(),
            asset.files.len()
        );

        Ok(Graph {
            asset,
            slot_classes,
            by_id,
            by_root,
            dependents,
        })
    }

    pub fn version(&self) -> u32 {
        self.asset.mver.version
    }

    pub fn groups(&self) -> &[Group] {
        &self.asset.groups
    }

    pub fn group(&self, group_id: u32) -> Option<&Group> {
        self.by_id.get(&group_id).map(|&position| &self.asset.groups[position])
    }

    pub fn group_by_root(&self, root: u64) -> Option<&Group> {
        self.by_root
            .get(&root)
            .map(|&(position, _)| &self.asset.groups[position])
    }

    /// Index of the root object inside the group owning it.
    pub fn root_index(&self, root: u64) -> Option<u32> {
        self.by_root.get(&root).map(|&(_, index)| index)
    }

    pub fn roots(&self, group: &Group) -> &[RootRecord] {
        &self.asset.roots[group.roots()]
    }

    /// The class of every object slot of `group`, in slot order.
    pub fn types(&self, group: &Group) -> &[Arc<ClassDescriptor>] {
        &self.slot_classes[group.types()]
    }

    pub fn sub_group_ids(&self, group: &Group) -> &[u32] {
        &self.asset.sub_groups[group.sub_groups()]
    }

    pub fn spans(&self, group: &Group) -> &[SpanRecord] {
        &self.asset.spans[group.spans()]
    }

    /// Groups that list `group_id` as a direct sub-group.
    pub fn incoming_groups(&self, group_id: u32) -> &[u32] {
        self.dependents
            .get(&group_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every group that directly or indirectly depends on `group_id`, nearest first. Does not include `group_id`
    /// itself, unless the archive is cyclic.
    pub fn dependents_closure(&self, group_id: u32) -> Vec<u32> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::from([group_id]);

        while let Some(current) = queue.pop_front() {
            for &parent in self.incoming_groups(current) {
                if seen.insert(parent) {
                    trace!("Group {} depends on {}", parent, current);
                    result.push(parent);
                    queue.push_back(parent);
                }
            }
        }

        result
    }

    pub fn files(&self) -> &[String] {
        &self.asset.files
    }

    pub fn file(&self, index: u32, patch: bool) -> Option<ArchiveFile<'_>> {
        self.asset.files.get(index as usize).map(|name| ArchiveFile {
            name: name.as_str(),
            patch,
        })
    }

    /// The file holding `span`. Validation guarantees that it exists.
    pub fn span_file(&self, span: &SpanRecord) -> Option<ArchiveFile<'_>> {
        self.file(span.file_index(), span.is_patch())
    }

    pub fn locators(&self) -> &[Locator] {
        &self.asset.locators
    }

    pub fn locator(&self, index: usize) -> Option<Locator> {
        self.asset.locators.get(index).copied()
    }

    pub fn link_table(&self) -> &[u8] {
        &self.asset.link_table
    }
}
