use std::fmt::{Display, Formatter};

use thiserror::Error;

/// A file named by the archive's file table. Patch files live in a separate location than the base files.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveFile<'a> {
    pub name: &'a str,
    pub patch: bool,
}

impl Display for ArchiveFile<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.patch {
            write!(f, "{} (patch)", self.name)
        } else {
            f.write_str(self.name)
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Could not locate {0}")]
    NotFound(String),

    #[error("{file}: requested {length} bytes at {offset}, but the file only has {size}")]
    OutOfRange {
        file: String,
        offset: u64,
        length: usize,
        size: u64,
    },

    #[error("I/O error on {file}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies byte ranges of archive files. Implementations must be safe to call from several readers at once.
pub trait StorageDevice: Send + Sync {
    fn read_range(&self, file: &ArchiveFile<'_>, offset: u64, length: usize) -> Result<Vec<u8>, StorageError>;
}
