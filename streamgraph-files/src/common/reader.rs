use std::ffi::CString;
use std::io::ErrorKind::UnexpectedEof;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::common::types::{IffChunk, magic_str};

pub trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, ParserError>;
}

impl Parseable<i32> for i32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<i32, ParserError> {
        Ok(rdr.read_i32::<LittleEndian>()?)
    }
}

impl Parseable<u32> for u32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u32, ParserError> {
        Ok(rdr.read_u32::<LittleEndian>()?)
    }
}

impl Parseable<u64> for u64 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u64, ParserError> {
        Ok(rdr.read_u64::<LittleEndian>()?)
    }
}

impl Parseable<Vec<u8>> for Vec<u8> {
    fn parse<R: Read>(rdr: &mut R) -> Result<Vec<u8>, ParserError> {
        let mut buf = Vec::new();
        rdr.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// NUL-terminated strings, addressed by their position in the list. Empty strings are entries as well, every later
/// position would shift otherwise.
#[derive(Debug, Clone, Default)]
pub struct CStringList {
    pub strings: Vec<String>,
}

impl Parseable<CStringList> for CStringList {
    fn parse<R: Read>(rdr: &mut R) -> Result<CStringList, ParserError> {
        let mut data = Vec::new();
        rdr.read_to_end(&mut data)?;

        // An unterminated trailing string fails with UnexpectedEof.
        let mut cursor = Cursor::new(data.as_slice());
        let mut strings = Vec::new();
        while (cursor.position() as usize) < data.len() {
            strings.push(read_cstring(&mut cursor)?.into_string()?);
        }

        Ok(CStringList { strings })
    }
}

pub fn read_cstring<R: Read>(rdr: &mut R) -> Result<CString, ParserError> {
    let mut buf = Vec::new();
    loop {
        let c = rdr.read_u8()?;
        if c == 0 {
            // SAFETY: We can ensure, that there are no nul-bytes in buf
            return Ok(unsafe { CString::from_vec_unchecked(buf) });
        }
        buf.push(c);
    }
}

pub fn read_chunk_array<T: Parseable<T>, R: Read>(rdr: &mut R) -> Result<Vec<T>, ParserError> {
    let mut list = Vec::<T>::new();
    let mut element = T::parse(rdr);
    while element.is_ok() {
        list.push(element?);
        element = T::parse(rdr);
    }

    // weird error handling because when EoF, we get that inside a parser error.
    match element {
        Err(ParserError::IOError(internal)) if internal.kind() == UnexpectedEof => (),
        err => return err.map(|_| Vec::with_capacity(0)),
    };
    Ok(list)
}

fn find_chunk(chunk_list: &[IffChunk], chunk_magic: u32) -> Option<&IffChunk> {
    chunk_list.iter().find(|chunk| chunk.magic == chunk_magic)
}

pub fn get_mandatory_chunk_by_name<T: Parseable<T>>(
    chunk_list: &[IffChunk],
    chunk_magic: u32,
) -> Result<T, ParserError> {
    find_chunk(chunk_list, chunk_magic)
        .ok_or_else(|| ParserError::MissingChunk {
            magic: magic_str(chunk_magic),
        })?
        .parse::<T>()
}

pub fn get_optional_chunk_by_name<T: Parseable<T>>(
    chunk_list: &[IffChunk],
    chunk_magic: u32,
) -> Result<Option<T>, ParserError> {
    find_chunk(chunk_list, chunk_magic)
        .map(|chunk| chunk.parse::<T>())
        .transpose()
}

/// Like [`get_mandatory_chunk_by_name`], but for chunks that are an array of fixed size records. A chunk whose size
/// is not a multiple of `stride` has a truncated trailing record, which would otherwise be silently dropped.
pub fn get_mandatory_record_chunk<T>(
    chunk_list: &[IffChunk],
    chunk_magic: u32,
    stride: usize,
) -> Result<Vec<T>, ParserError>
where
    T: Parseable<T>,
{
    let chunk = find_chunk(chunk_list, chunk_magic).ok_or_else(|| ParserError::MissingChunk {
        magic: magic_str(chunk_magic),
    })?;
    parse_records(chunk, stride)
}

pub fn get_optional_record_chunk<T>(
    chunk_list: &[IffChunk],
    chunk_magic: u32,
    stride: usize,
) -> Result<Vec<T>, ParserError>
where
    T: Parseable<T>,
{
    match find_chunk(chunk_list, chunk_magic) {
        Some(chunk) => parse_records(chunk, stride),
        None => Ok(Vec::new()),
    }
}

fn parse_records<T: Parseable<T>>(chunk: &IffChunk, stride: usize) -> Result<Vec<T>, ParserError> {
    if chunk.data.len() % stride != 0 {
        return Err(ParserError::InvalidChunkSize {
            magic: chunk.magic_str(),
            size: chunk.size,
            stride,
        });
    }

    let mut rdr = chunk.data.as_slice();
    read_chunk_array(&mut rdr)
}
