use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::common::reader::Parseable;

/// Builds the numeric magic of a chunk. The magic is stored little endian, so "MVER" is found as "REVM" on disk.
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

pub fn magic_str(magic: u32) -> String {
    String::from_utf8_lossy(&magic.to_be_bytes()[..]).into_owned()
}

#[derive(Debug)]
pub struct IffChunk {
    pub magic: u32,
    pub size: u32,
    pub data: Vec<u8>,
}

impl IffChunk {
    pub fn magic_str(&self) -> String {
        magic_str(self.magic)
    }

    pub fn parse<T: Parseable<T>>(&self) -> Result<T, ParserError> {
        T::parse(&mut Cursor::new(&self.data))
    }

    pub fn read_next_chunk<R: Read>(rdr: &mut R) -> Result<IffChunk, ParserError> {
        let magic = rdr.read_u32::<LittleEndian>()?;
        let size = rdr.read_u32::<LittleEndian>()?;
        let mut data = vec![0; size as usize];
        rdr.read_exact(&mut data)?;

        Ok(IffChunk { magic, size, data })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MVerChunk {
    pub version: u32,
}

impl Parseable<MVerChunk> for MVerChunk {
    fn parse<R: Read>(rdr: &mut R) -> Result<MVerChunk, ParserError> {
        Ok(MVerChunk {
            version: rdr.read_u32::<LittleEndian>()?,
        })
    }
}
