//! Decoder for the link table, the byte stream that encodes inter-object pointers.
//!
//! An entry is one or two variable length integers. The first byte decides the shape: with bit `0x40` set, the entry
//! names a sub-group (relative to the declaring group's sub-group list) followed by an object index, otherwise it only
//! carries an object index inside the declaring group itself. Entries have no delimiter and are read strictly in
//! cursor order.

use std::io::{Cursor, Read};

use byteorder::ReadBytesExt;

use crate::ParserError;

const EXPLICIT_GROUP_FLAG: u8 = 0x40;
const CONTINUATION_FLAG: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;
// 5 * 7 bits cover a u32, anything longer is corrupt even when its leading groups are zero
const MAX_CONTINUATION_BYTES: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkGroup {
    /// The group that declares the pointer.
    Current,
    /// Position in the declaring group's sub-group list.
    SubGroup(u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub group: LinkGroup,
    pub index: u32,
    /// cursor position of the following entry
    pub next: usize,
}

/// Decodes the entry starting at `position`. Running past the end of `table` yields an `UnexpectedEof` I/O error.
pub fn decode_link(table: &[u8], position: usize) -> Result<LinkEntry, ParserError> {
    let mut rdr = Cursor::new(table);
    rdr.set_position(position as u64);

    let first = rdr.read_u8()?;
    let (group, index) = if first & EXPLICIT_GROUP_FLAG != 0 {
        let group = read_varint(&mut rdr, first & !EXPLICIT_GROUP_FLAG)?;
        let seed = rdr.read_u8()?;
        let index = read_varint(&mut rdr, seed)?;
        (LinkGroup::SubGroup(group), index)
    } else {
        let index = read_varint(&mut rdr, first & !EXPLICIT_GROUP_FLAG)?;
        (LinkGroup::Current, index)
    };

    Ok(LinkEntry {
        group,
        index,
        next: rdr.position() as usize,
    })
}

/// Big endian base-128: the seed's low 7 bits come first, every further byte is appended while the previous one had
/// its high bit set.
pub fn read_varint<R: Read>(rdr: &mut R, seed: u8) -> Result<u32, ParserError> {
    let mut value = u32::from(seed & PAYLOAD_MASK);
    let mut byte = seed;
    let mut continuations = 0;

    while byte & CONTINUATION_FLAG != 0 {
        continuations += 1;
        if continuations > MAX_CONTINUATION_BYTES {
            return Err(ParserError::FormatError {
                reason: "link table integer exceeds 32 bits",
            });
        }

        if value > u32::MAX >> 7 {
            return Err(ParserError::FormatError {
                reason: "link table integer exceeds 32 bits",
            });
        }

        byte = rdr.read_u8()?;
        value = (value << 7) | u32::from(byte & PAYLOAD_MASK);
    }

    Ok(value)
}
