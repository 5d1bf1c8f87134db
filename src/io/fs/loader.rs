use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use log::{debug, trace};

use crate::io::common::loader::{ArchiveFile, StorageDevice, StorageError};

/// Reads archive files from a data folder, and patch files from an optional patch folder.
///
/// Every file is opened once and kept open. A file handle carries one cursor that all callers share, so each seek and
/// read pair happens under that file's mutex. Different files are read in parallel.
pub struct FsStorage {
    data_folder: PathBuf,
    patch_folder: Option<PathBuf>,
    open_files: DashMap<PathBuf, Arc<Mutex<File>>>,
}

impl FsStorage {
    pub fn new(data_folder: impl Into<PathBuf>, patch_folder: Option<PathBuf>) -> Self {
        Self {
            data_folder: data_folder.into(),
            patch_folder,
            open_files: DashMap::new(),
        }
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn path_of(&self, file: &ArchiveFile<'_>) -> Result<PathBuf, StorageError> {
        let folder = if file.patch {
            self.patch_folder
                .as_ref()
                .ok_or_else(|| StorageError::NotFound(file.to_string()))?
        } else {
            &self.data_folder
        };

        // archives written on windows use backslashes
        Ok(folder.join(file.name.replace('\\', "/")))
    }

    fn handle(&self, file: &ArchiveFile<'_>) -> Result<Arc<Mutex<File>>, StorageError> {
        let path = self.path_of(file)?;
        if let Some(handle) = self.open_files.get(&path) {
            return Ok(Arc::clone(handle.value()));
        }

        let handle = self
            .open_files
            .entry(path.clone())
            .or_try_insert_with(|| {
                debug!("Opening {}", path.display());
                File::open(&path).map(|f| Arc::new(Mutex::new(f)))
            })
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => StorageError::NotFound(file.to_string()),
                _ => StorageError::Io {
                    file: file.to_string(),
                    source: err,
                },
            })?;

        Ok(Arc::clone(handle.value()))
    }

    /// Reads a whole file from the data folder, e.g. the archive's graph metadata.
    pub fn read_all(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let file = ArchiveFile { name, patch: false };
        let path = self.path_of(&file)?;
        trace!("Loading {}", path.display());
        std::fs::read(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(file.to_string()),
            _ => StorageError::Io {
                file: file.to_string(),
                source: err,
            },
        })
    }
}

impl StorageDevice for FsStorage {
    fn read_range(&self, file: &ArchiveFile<'_>, offset: u64, length: usize) -> Result<Vec<u8>, StorageError> {
        let handle = self.handle(file)?;
        let io_error = |source: std::io::Error| StorageError::Io {
            file: file.to_string(),
            source,
        };

        // every read seeks first, so a poisoned handle is still consistent
        let mut guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
        let size = guard.metadata().map_err(io_error)?.len();
        if offset.saturating_add(length as u64) > size {
            return Err(StorageError::OutOfRange {
                file: file.to_string(),
                offset,
                length,
                size,
            });
        }

        trace!("Reading {} bytes at {} from {}", length, offset, file);
        let mut buf: Vec<u8> = vec![0; length];
        guard.seek(SeekFrom::Start(offset)).map_err(io_error)?;
        guard.read_exact(&mut buf).map_err(io_error)?;
        Ok(buf)
    }
}
