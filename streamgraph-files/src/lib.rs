use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("The file's magic value does not match the expectation {magic}")]
    InvalidMagicValue { magic: u32 },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    /// A header field carries a value this reader has no decoding rule for, i.e. the archive was written by a newer
    /// (or older) tool chain.
    #[error("Unsupported archive version: {reason}")]
    UnsupportedVersion { reason: &'static str },

    #[error("Missing mandatory {magic} chunk")]
    MissingChunk { magic: String },

    #[error("The {magic} chunk is {size} bytes, which is not a multiple of its record size {stride}")]
    InvalidChunkSize { magic: String, size: u32, stride: usize },

    #[error("Group {group} references {table}[{start}..{start}+{count}], but the table only has {len} entries")]
    TableRange {
        table: &'static str,
        group: u32,
        start: u32,
        count: u32,
        len: usize,
    },

    #[error("The {table} table is inconsistent: {reason}")]
    InvalidTable { table: &'static str, reason: String },

    /// Represents all other cases of `std::io::Error`, most notably truncated input.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    StringConversationError(#[from] std::ffi::IntoStringError),

    #[error(transparent)]
    UTF8ConversationError(#[from] std::string::FromUtf8Error),
}

pub mod common;
pub mod graph;
pub mod link;
