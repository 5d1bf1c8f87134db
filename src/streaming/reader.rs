use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use streamgraph_files::graph::types::StreamingChannel;

use crate::StreamError;
use crate::graph::{Graph, Group};
use crate::io::common::loader::StorageDevice;
use crate::streaming::cache::{CacheStats, DEFAULT_CACHE_CAPACITY, GroupCache};
use crate::streaming::deserializer::GroupContext;
use crate::streaming::{GroupResult, ObjectInfo};
use crate::types::{StreamingDataSource, TypeFactory};

#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    pub cache_capacity: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// A root object: the group it lives in and its index inside that group.
#[derive(Debug, Clone)]
pub struct RootObject {
    pub group: Arc<GroupResult>,
    pub index: u32,
}

impl RootObject {
    pub fn object(&self) -> Option<&ObjectInfo> {
        self.group.object(self.index as usize)
    }
}

/// State of one top level request, threaded through the recursion.
#[derive(Default)]
struct Request {
    /// every group finished during this request
    resolved: Vec<Arc<GroupResult>>,
    /// the chain of groups currently being resolved, outermost first
    in_progress: Vec<u32>,
}

/// Materializes groups on demand, dependencies first.
///
/// The reader itself carries no per-request state, so one instance serves concurrent requests. The cache is shared
/// and only locked around lookups and inserts, two requests racing for the same group may both materialize it.
pub struct StreamingReader {
    graph: Arc<Graph>,
    factory: Arc<dyn TypeFactory>,
    storage: Arc<dyn StorageDevice>,
    cache: Arc<Mutex<GroupCache>>,
}

impl StreamingReader {
    pub fn new(
        graph: Arc<Graph>,
        factory: Arc<dyn TypeFactory>,
        storage: Arc<dyn StorageDevice>,
        settings: ReaderSettings,
    ) -> Self {
        let cache = Arc::new(Mutex::new(GroupCache::new(settings.cache_capacity)));
        Self::with_cache(graph, factory, storage, cache)
    }

    /// Shares `cache` with other readers of the same archive.
    pub fn with_cache(
        graph: Arc<Graph>,
        factory: Arc<dyn TypeFactory>,
        storage: Arc<dyn StorageDevice>,
        cache: Arc<Mutex<GroupCache>>,
    ) -> Self {
        Self {
            graph,
            factory,
            storage,
            cache,
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<Mutex<GroupCache>> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    /// Resolves a group. With `include_subgroups`, every sub-group is resolved first and pointers and locators are
    /// fixed up. Without, the group is read flat: pointers stay null and streamed payloads have no locator.
    ///
    /// A group that is already cached is returned as cached, regardless of the mode it was read in.
    pub fn resolve(&self, group_id: u32, include_subgroups: bool) -> Result<Arc<GroupResult>, StreamError> {
        let mut request = Request::default();
        self.resolve_in(&mut request, group_id, include_subgroups)
    }

    pub fn resolve_root(&self, root: u64, include_subgroups: bool) -> Result<RootObject, StreamError> {
        let (group_id, index) = self
            .graph
            .group_by_root(root)
            .zip(self.graph.root_index(root))
            .map(|(group, index)| (group.group_id, index))
            .ok_or(StreamError::UnknownRoot(root))?;

        let group = self.resolve(group_id, include_subgroups)?;
        Ok(RootObject { group, index })
    }

    /// The bytes of a streaming payload: inline bytes as they are, streamed ones through the storage device.
    pub fn read_payload(&self, source: &StreamingDataSource) -> Result<Vec<u8>, StreamError> {
        if source.channel == StreamingChannel::Inline {
            return Ok(source.inline.clone());
        }

        if source.length == 0 {
            return Ok(Vec::new());
        }

        let locator = source.locator.ok_or(StreamError::UnresolvedLocator)?;
        let file = self
            .graph
            .file(locator.file_id(), false)
            .ok_or(StreamError::UnknownFile(locator.file_id()))?;

        // an unaddressable length is rejected by the storage device's range check
        let length = usize::try_from(source.length).unwrap_or(usize::MAX);
        trace!("Reading {} payload bytes at {} from {}", length, locator.offset(), file);
        Ok(self.storage.read_range(&file, locator.offset(), length)?)
    }

    fn resolve_in(
        &self,
        request: &mut Request,
        group_id: u32,
        include_subgroups: bool,
    ) -> Result<Arc<GroupResult>, StreamError> {
        let group = self
            .graph
            .group(group_id)
            .ok_or(StreamError::UnknownGroup(group_id))?;

        if let Some(result) = request
            .resolved
            .iter()
            .find(|result| result.group_id() == group_id)
        {
            return Ok(result.clone());
        }

        if request.in_progress.contains(&group_id) {
            return Err(StreamError::DependencyCycle { group: group_id });
        }

        let depth = request.in_progress.len();
        trace!("{:indent$}Resolving group {}", "", group_id, indent = depth * 2);
        request.in_progress.push(group_id);

        let mut sub_groups = Vec::new();
        if include_subgroups {
            for &sub_group in self.graph.sub_group_ids(group) {
                sub_groups.push(self.resolve_in(request, sub_group, true)?);
            }
        }

        let cached = self.lock_cache().get(group_id);
        let result = match cached {
            Some(result) => {
                debug!("Cache hit for group {}", group_id);
                result
            }
            None => {
                debug!("Cache miss for group {}", group_id);
                let result = Arc::new(self.materialize(group, &sub_groups, include_subgroups)?);
                self.lock_cache().put(group_id, result.clone());
                result
            }
        };

        request.in_progress.pop();
        request.resolved.push(result.clone());
        trace!("{:indent$}Resolved group {} ({} objects)", "", group_id, result.len(), indent = depth * 2);
        Ok(result)
    }

    fn materialize(
        &self,
        group: &Group,
        sub_groups: &[Arc<GroupResult>],
        resolve_references: bool,
    ) -> Result<GroupResult, StreamError> {
        profiling::scope!("StreamingReader::materialize");
        let mut context = GroupContext {
            graph: &self.graph,
            group_id: group.group_id,
            classes: self.graph.types(group),
            sub_groups,
            resolve_references,
            link_cursor: group.link_start as usize,
            locator_cursor: group.locator_start as usize,
        };

        let mut objects = Vec::with_capacity(group.num_objects as usize);
        for span in self.graph.spans(group) {
            if span.length == 0 {
                continue;
            }

            let file = self.graph.span_file(span).ok_or_else(|| {
                StreamError::format(group.group_id, format!("span names unknown file {}", span.file_index()))
            })?;
            let data = self
                .storage
                .read_range(&file, span.offset, span.length as usize)?;
            context.read_span(&data, self.factory.as_ref(), &mut objects)?;
        }

        if objects.len() != group.num_objects as usize {
            return Err(StreamError::format(
                group.group_id,
                format!("{} objects declared, but the spans only hold {}", group.num_objects, objects.len()),
            ));
        }

        trace!(
            "Materialized group {}: consumed {} link bytes and {} locators",
            group.group_id,
            context.link_cursor - group.link_start as usize,
            context.locator_cursor - group.locator_start as usize
        );
        Ok(GroupResult::new(group.group_id, objects))
    }

    fn lock_cache(&self) -> MutexGuard<'_, GroupCache> {
        // the cache is only mutated through complete get and put calls
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
