use std::io::Read;
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt};
use num_enum::TryFromPrimitive;
use streamgraph_files_derive_parseable::Parse;

use crate::ParserError;
use crate::common::reader::Parseable;
use crate::common::types::{MVerChunk, fourcc};

pub const FOURCC_MVER: u32 = fourcc(b"MVER");
pub const FOURCC_GROUPS: u32 = fourcc(b"GRPS");
pub const FOURCC_ROOTS: u32 = fourcc(b"ROOT");
pub const FOURCC_SUB_GROUPS: u32 = fourcc(b"SUBG");
pub const FOURCC_TYPE_HASHES: u32 = fourcc(b"THSH");
pub const FOURCC_TYPE_TABLE: u32 = fourcc(b"TYPE");
pub const FOURCC_FILES: u32 = fourcc(b"FILE");
pub const FOURCC_SPANS: u32 = fourcc(b"SPAN");
pub const FOURCC_LOCATORS: u32 = fourcc(b"LOCR");
pub const FOURCC_LINKS: u32 = fourcc(b"LINK");

pub const GRAPH_VERSION: u32 = 1;

/// The structural tables of one archive, exactly as stored. [`crate::graph::reader::GraphReader`] only hands out
/// instances whose cross-table ranges have been validated.
#[derive(Debug)]
pub struct GraphAsset {
    pub mver: MVerChunk,
    pub groups: Vec<GroupRecord>,
    pub roots: Vec<RootRecord>,
    pub sub_groups: Vec<u32>,
    pub type_hashes: Vec<u64>,
    pub type_table: TypeTable,
    pub files: Vec<String>,
    pub spans: Vec<SpanRecord>,
    pub locators: Vec<Locator>,
    pub link_table: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Parse)]
pub struct GroupRecord {
    pub group_id: u32,
    pub root_start: u32,
    pub root_count: u32,
    pub sub_group_start: u32,
    pub sub_group_count: u32,
    pub type_start: u32,
    pub type_count: u32,
    pub num_objects: u32,
    pub span_start: u32,
    pub span_count: u32,
    pub link_start: u32,   // byte offset into the link table
    pub locator_start: u32, // entry index into the locator table
}

impl GroupRecord {
    pub const SIZE: usize = 12 * 4;

    pub fn roots(&self) -> Range<usize> {
        range(self.root_start, self.root_count)
    }

    pub fn sub_groups(&self) -> Range<usize> {
        range(self.sub_group_start, self.sub_group_count)
    }

    pub fn types(&self) -> Range<usize> {
        range(self.type_start, self.type_count)
    }

    pub fn spans(&self) -> Range<usize> {
        range(self.span_start, self.span_count)
    }
}

fn range(start: u32, count: u32) -> Range<usize> {
    start as usize..start as usize + count as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Parse)]
pub struct RootRecord {
    pub identifier: u64,
    /// index of the root object inside its owning group
    pub object_index: u32,
}

impl RootRecord {
    pub const SIZE: usize = 8 + 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Parse)]
pub struct SpanRecord {
    pub file_index_and_is_patch: u32,
    pub offset: u64,
    pub length: u32,
}

impl SpanRecord {
    pub const SIZE: usize = 4 + 8 + 4;
    const PATCH_FLAG: u32 = 0x8000_0000;

    pub fn file_index(&self) -> u32 {
        self.file_index_and_is_patch & !Self::PATCH_FLAG
    }

    pub fn is_patch(&self) -> bool {
        self.file_index_and_is_patch & Self::PATCH_FLAG != 0
    }
}

/// A packed out-of-line payload position: the low 24 bits are the file id, the remaining bits the byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator(pub u64);

impl Locator {
    pub const SIZE: usize = 8;
    const FILE_BITS: u32 = 24;
    const FILE_MASK: u64 = (1 << Self::FILE_BITS) - 1;

    pub fn new(file_id: u32, offset: u64) -> Self {
        Locator((offset << Self::FILE_BITS) | (u64::from(file_id) & Self::FILE_MASK))
    }

    pub fn file_id(&self) -> u32 {
        (self.0 & Self::FILE_MASK) as u32
    }

    pub fn offset(&self) -> u64 {
        self.0 >> Self::FILE_BITS
    }
}

impl Parseable<Locator> for Locator {
    fn parse<R: Read>(rdr: &mut R) -> Result<Locator, ParserError> {
        Ok(Locator(rdr.read_u64::<LittleEndian>()?))
    }
}

#[derive(Debug, Clone, Copy, Parse)]
pub struct TypeTableHeader {
    pub compression: i32,
    pub stride: i32,
    pub count: i32,
    pub count2: i32,
    pub reserved: i32,
}

impl TypeTableHeader {
    pub fn validate(&self) -> Result<usize, ParserError> {
        if self.compression != 0 {
            return Err(ParserError::UnsupportedVersion {
                reason: "type table compression must be 0",
            });
        }

        if self.stride != 2 {
            return Err(ParserError::UnsupportedVersion {
                reason: "type table entries must be 2 bytes wide",
            });
        }

        if self.count != self.count2 {
            return Err(ParserError::UnsupportedVersion {
                reason: "type table entry counts disagree",
            });
        }

        if self.reserved != 1 {
            return Err(ParserError::UnsupportedVersion {
                reason: "type table reserved flag must be 1",
            });
        }

        usize::try_from(self.count).map_err(|_| ParserError::FormatError {
            reason: "type table entry count is negative",
        })
    }
}

/// One entry per object slot across all groups, each an index into the type hash table.
#[derive(Debug, Clone)]
pub struct TypeTable {
    pub header: TypeTableHeader,
    pub hash_indices: Vec<u16>,
}

impl Parseable<TypeTable> for TypeTable {
    fn parse<R: Read>(rdr: &mut R) -> Result<TypeTable, ParserError> {
        let header = TypeTableHeader::parse(rdr)?;
        let count = header.validate()?;

        let mut hash_indices = Vec::with_capacity(count.min(u16::MAX as usize));
        for _ in 0..count {
            hash_indices.push(rdr.read_u16::<LittleEndian>()?);
        }

        let mut trailing = Vec::new();
        rdr.read_to_end(&mut trailing)?;
        if !trailing.is_empty() {
            return Err(ParserError::InvalidTable {
                table: "type",
                reason: format!("{} bytes follow the last of {} entries", trailing.len(), count),
            });
        }

        Ok(TypeTable { header, hash_indices })
    }
}

/// How the bytes of a streaming payload are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum StreamingChannel {
    /// the payload follows the descriptor inside the object record
    Inline = 0,
    /// the payload lives out-of-line and is addressed through the locator table
    Streamed = 1,
}
