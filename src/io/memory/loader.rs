use std::collections::HashMap;

use log::trace;

use crate::io::common::loader::{ArchiveFile, StorageDevice, StorageError};

/// Keeps whole files in memory, for embedding archives into other containers and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: HashMap<(String, bool), Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, patch: bool, data: Vec<u8>) {
        self.files.insert((name.into(), patch), data);
    }

    pub fn get(&self, file: &ArchiveFile<'_>) -> Option<&[u8]> {
        self.files
            .get(&(file.name.to_string(), file.patch))
            .map(Vec::as_slice)
    }
}

impl StorageDevice for MemoryStorage {
    fn read_range(&self, file: &ArchiveFile<'_>, offset: u64, length: usize) -> Result<Vec<u8>, StorageError> {
        let data = self
            .get(file)
            .ok_or_else(|| StorageError::NotFound(file.to_string()))?;

        let out_of_range = || StorageError::OutOfRange {
            file: file.to_string(),
            offset,
            length,
            size: data.len() as u64,
        };

        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = start.checked_add(length).ok_or_else(out_of_range)?;
        let range = data.get(start..end).ok_or_else(out_of_range)?;

        trace!("Reading {} bytes at {} from {}", length, offset, file);
        Ok(range.to_vec())
    }
}
