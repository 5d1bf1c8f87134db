use std::collections::HashSet;
use std::io::{Cursor, Read};

use crate::ParserError;
use crate::common::reader::{
    CStringList, get_mandatory_chunk_by_name, get_mandatory_record_chunk, get_optional_chunk_by_name,
    get_optional_record_chunk,
};
use crate::common::types::{IffChunk, MVerChunk};
use crate::graph::types::{
    FOURCC_FILES, FOURCC_GROUPS, FOURCC_LINKS, FOURCC_LOCATORS, FOURCC_MVER, FOURCC_ROOTS, FOURCC_SPANS,
    FOURCC_SUB_GROUPS, FOURCC_TYPE_HASHES, FOURCC_TYPE_TABLE, GRAPH_VERSION, GraphAsset, GroupRecord, Locator,
    RootRecord, SpanRecord, TypeTable,
};

pub struct GraphReader {}

impl GraphReader {
    pub fn parse_asset<R: Read>(rdr: &mut R) -> Result<GraphAsset, ParserError> {
        let version_hdr = IffChunk::read_next_chunk(rdr)?;
        if version_hdr.magic != FOURCC_MVER {
            return Err(ParserError::InvalidMagicValue {
                magic: version_hdr.magic,
            });
        }

        let mver = version_hdr.parse::<MVerChunk>()?;
        if mver.version != GRAPH_VERSION {
            return Err(ParserError::UnsupportedVersion {
                reason: "Unknown MVER Version",
            });
        }

        // Every chunk must be complete: a truncated optional chunk would otherwise vanish silently.
        let mut data = Vec::new();
        rdr.read_to_end(&mut data)?;
        let mut cursor = Cursor::new(data.as_slice());
        let mut chunk_list = Vec::<IffChunk>::new();
        while (cursor.position() as usize) < data.len() {
            chunk_list.push(IffChunk::read_next_chunk(&mut cursor)?);
        }

        let type_table = get_mandatory_chunk_by_name::<TypeTable>(&chunk_list, FOURCC_TYPE_TABLE)?;
        let groups = get_mandatory_record_chunk::<GroupRecord>(&chunk_list, FOURCC_GROUPS, GroupRecord::SIZE)?;
        let roots = get_mandatory_record_chunk::<RootRecord>(&chunk_list, FOURCC_ROOTS, RootRecord::SIZE)?;
        let sub_groups = get_mandatory_record_chunk::<u32>(&chunk_list, FOURCC_SUB_GROUPS, 4)?;
        let type_hashes = get_mandatory_record_chunk::<u64>(&chunk_list, FOURCC_TYPE_HASHES, 8)?;
        let files = get_mandatory_chunk_by_name::<CStringList>(&chunk_list, FOURCC_FILES)?.strings;
        let spans = get_mandatory_record_chunk::<SpanRecord>(&chunk_list, FOURCC_SPANS, SpanRecord::SIZE)?;
        let locators = get_optional_record_chunk::<Locator>(&chunk_list, FOURCC_LOCATORS, Locator::SIZE)?;
        let link_table = get_optional_chunk_by_name::<Vec<u8>>(&chunk_list, FOURCC_LINKS)?.unwrap_or_default();

        let asset = GraphAsset {
            mver,
            groups,
            roots,
            sub_groups,
            type_hashes,
            type_table,
            files,
            spans,
            locators,
            link_table,
        };

        GraphReader::validate(&asset)?;
        Ok(asset)
    }

    /// Checks every cross-table reference, so that consumers can index the tables of a parsed asset directly.
    pub fn validate(asset: &GraphAsset) -> Result<(), ParserError> {
        let mut group_ids = HashSet::with_capacity(asset.groups.len());
        for group in &asset.groups {
            if !group_ids.insert(group.group_id) {
                return Err(ParserError::InvalidTable {
                    table: "group",
                    reason: format!("group id {} is not unique", group.group_id),
                });
            }
        }

        let mut root_ids = HashSet::with_capacity(asset.roots.len());
        for group in &asset.groups {
            check_range("root", group, group.root_start, group.root_count, asset.roots.len())?;
            check_range(
                "sub group",
                group,
                group.sub_group_start,
                group.sub_group_count,
                asset.sub_groups.len(),
            )?;
            check_range(
                "type",
                group,
                group.type_start,
                group.type_count,
                asset.type_table.hash_indices.len(),
            )?;
            check_range("span", group, group.span_start, group.span_count, asset.spans.len())?;

            if group.type_count != group.num_objects {
                return Err(ParserError::InvalidTable {
                    table: "group",
                    reason: format!(
                        "group {} declares {} objects but {} types",
                        group.group_id, group.num_objects, group.type_count
                    ),
                });
            }

            if group.link_start as usize > asset.link_table.len() {
                return Err(ParserError::InvalidTable {
                    table: "link",
                    reason: format!("group {} starts past the end of the link table", group.group_id),
                });
            }

            if group.locator_start as usize > asset.locators.len() {
                return Err(ParserError::InvalidTable {
                    table: "locator",
                    reason: format!("group {} starts past the end of the locator table", group.group_id),
                });
            }

            for root in &asset.roots[group.roots()] {
                if !root_ids.insert(root.identifier) {
                    return Err(ParserError::InvalidTable {
                        table: "root",
                        reason: format!("root identifier {:#018x} is not unique", root.identifier),
                    });
                }

                if root.object_index >= group.num_objects {
                    return Err(ParserError::InvalidTable {
                        table: "root",
                        reason: format!(
                            "root {:#018x} names object {} of group {}, which only has {}",
                            root.identifier, root.object_index, group.group_id, group.num_objects
                        ),
                    });
                }
            }

            if let Some(unknown) = asset.sub_groups[group.sub_groups()]
                .iter()
                .find(|&&sub_group| !group_ids.contains(&sub_group))
            {
                return Err(ParserError::InvalidTable {
                    table: "sub group",
                    reason: format!("group {} depends on unknown group {}", group.group_id, unknown),
                });
            }

            if let Some(span) = asset.spans[group.spans()]
                .iter()
                .find(|span| span.file_index() as usize >= asset.files.len())
            {
                return Err(ParserError::InvalidTable {
                    table: "span",
                    reason: format!(
                        "group {} reads from file {}, but there are only {} files",
                        group.group_id,
                        span.file_index(),
                        asset.files.len()
                    ),
                });
            }
        }

        if let Some(index) = asset
            .type_table
            .hash_indices
            .iter()
            .find(|&&index| index as usize >= asset.type_hashes.len())
        {
            return Err(ParserError::InvalidTable {
                table: "type",
                reason: format!(
                    "type hash index {} exceeds the {} known hashes",
                    index,
                    asset.type_hashes.len()
                ),
            });
        }

        Ok(())
    }
}

fn check_range(
    table: &'static str,
    group: &GroupRecord,
    start: u32,
    count: u32,
    len: usize,
) -> Result<(), ParserError> {
    if u64::from(start) + u64::from(count) > len as u64 {
        return Err(ParserError::TableRange {
            table,
            group: group.group_id,
            start,
            count,
            len,
        });
    }
    Ok(())
}
