//! Loads group partitioned asset archives into typed object graphs, on demand.
//!
//! An archive's metadata ([`graph::Graph`]) describes groups of objects, the groups they depend on, and where their
//! serialized bytes live. [`streaming::reader::StreamingReader`] materializes one group at a time: dependencies first,
//! then the group's own objects, with pointers between objects fixed up through the archive's link table and large
//! payloads left on disk as locators that can be read later.

use thiserror::Error;

use streamgraph_files::ParserError;

use crate::io::common::loader::StorageError;
use crate::types::{TypeError, TypeHash};

pub mod catalog;
pub mod graph;
pub mod io;
pub mod streaming;
pub mod types;
pub mod util;

/// Any failure aborts the whole request, no partially resolved group is ever returned or cached.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error("Group {group} is malformed: {reason}")]
    Format { group: u32, reason: String },

    #[error("Unknown group {0}")]
    UnknownGroup(u32),

    #[error("Unknown root identifier {0:#018x}")]
    UnknownRoot(u64),

    #[error("Group {group} depends on itself")]
    DependencyCycle { group: u32 },

    #[error("Group {group}: {reason}")]
    DanglingLink { group: u32, reason: String },

    #[error("Group {group}: pointer to {expected} resolved to a {found}")]
    PointerTypeMismatch {
        group: u32,
        expected: TypeHash,
        found: String,
    },

    #[error("Group {group}: unsupported {feature}")]
    Unsupported { group: u32, feature: String },

    #[error("Streamed payload has no locator, its group was read without sub-groups")]
    UnresolvedLocator,

    #[error("Locator names unknown file {0}")]
    UnknownFile(u32),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StreamError {
    pub(crate) fn format(group: u32, reason: impl Into<String>) -> Self {
        StreamError::Format {
            group,
            reason: reason.into(),
        }
    }
}
