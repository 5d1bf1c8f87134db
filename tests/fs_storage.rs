mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{ArchiveBuilder, Fields, GROUPS_FILE, PAYLOAD_FILE, RESOURCE, TEXTURE, registry, resource, texture};
use streamgraph::io::common::loader::{ArchiveFile, StorageDevice, StorageError};
use streamgraph::io::fs::load_graph;
use streamgraph::io::fs::loader::FsStorage;
use streamgraph::streaming::reader::{ReaderSettings, StreamingReader};
use streamgraph::types::Value;

const GRAPH_FILE: &str = "graph.bin";

/// Writes the archive the way it is shipped: the graph and base files in the data folder, patches next to it.
fn install(archive: &ArchiveBuilder, data: &Path, patch: &Path) -> Result<(), anyhow::Error> {
    let (graph, storage) = archive.build();
    fs::write(data.join(GRAPH_FILE), graph)?;

    for (name, is_patch, folder) in [
        (GROUPS_FILE, false, data),
        (PAYLOAD_FILE, false, data),
        (GROUPS_FILE, true, patch),
    ] {
        let file = ArchiveFile { name, patch: is_patch };
        if let Some(bytes) = storage.get(&file) {
            fs::write(folder.join(name), bytes)?;
        }
    }
    Ok(())
}

#[test]
fn reads_groups_and_payloads_from_disk() -> Result<(), anyhow::Error> {
    let data = tempfile::tempdir()?;
    let patch = tempfile::tempdir()?;

    let mut archive = ArchiveBuilder::new();
    let pixels = archive.payload(b"pixels");
    archive
        .group(1)
        .object(TEXTURE, texture("base", 8, Fields::new().streamed_payload(6)))
        .locator(pixels);
    archive.group(2).object(RESOURCE, resource("patched")).patch();
    install(&archive, data.path(), patch.path())?;

    let registry = Arc::new(registry());
    let storage = Arc::new(FsStorage::new(data.path(), Some(patch.path().to_path_buf())));
    let graph = Arc::new(load_graph(&storage, GRAPH_FILE, registry.as_ref())?);
    let reader = StreamingReader::new(graph, registry, storage, ReaderSettings::default());

    let textures = reader.resolve(1, true)?;
    let pixels = textures
        .object(0)
        .and_then(|object| object.get("pixels"))
        .and_then(Value::as_streaming_data)
        .expect("texture has pixels");
    assert_eq!(reader.read_payload(pixels)?, b"pixels".to_vec());

    let patched = reader.resolve(2, true)?;
    assert_eq!(
        patched.object(0).and_then(|object| object.get("name")).and_then(Value::as_str),
        Some("patched")
    );
    Ok(())
}

#[test]
fn missing_files_and_ranges() -> Result<(), anyhow::Error> {
    let data = tempfile::tempdir()?;
    fs::write(data.path().join("small.bin"), [1, 2, 3])?;

    let storage = FsStorage::new(data.path(), None);
    let small = ArchiveFile {
        name: "small.bin",
        patch: false,
    };

    assert_eq!(storage.read_range(&small, 1, 2)?, vec![2, 3]);
    assert!(matches!(
        storage.read_range(&small, 2, 2),
        Err(StorageError::OutOfRange { size: 3, .. })
    ));
    assert!(matches!(
        storage.read_range(&ArchiveFile { name: "absent.bin", patch: false }, 0, 1),
        Err(StorageError::NotFound(_))
    ));
    // no patch folder configured
    assert!(matches!(
        storage.read_range(&ArchiveFile { name: "small.bin", patch: true }, 0, 1),
        Err(StorageError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn backslash_paths() -> Result<(), anyhow::Error> {
    let data = tempfile::tempdir()?;
    fs::create_dir(data.path().join("world"))?;
    fs::write(data.path().join("world").join("tile.bin"), [9; 4])?;

    let storage = FsStorage::new(data.path(), None);
    let tile = ArchiveFile {
        name: "world\\tile.bin",
        patch: false,
    };
    assert_eq!(storage.read_range(&tile, 0, 4)?, vec![9; 4]);
    Ok(())
}

#[test]
fn concurrent_reads_of_one_file() -> Result<(), anyhow::Error> {
    let data = tempfile::tempdir()?;
    let contents: Vec<u8> = (0..=255).collect();
    fs::write(data.path().join("shared.bin"), &contents)?;

    let storage = FsStorage::new(data.path(), None);
    let storage = &storage;
    std::thread::scope(|scope| {
        for worker in 0..8u64 {
            scope.spawn(move || {
                let file = ArchiveFile {
                    name: "shared.bin",
                    patch: false,
                };
                for round in 0..64u64 {
                    let offset = (worker * 31 + round * 7) % 240;
                    let bytes = storage.read_range(&file, offset, 16).unwrap();
                    // every seek and read pair is atomic, so the bytes always start at the requested offset
                    assert_eq!(bytes[0] as u64, offset);
                    assert_eq!(bytes.len(), 16);
                }
            });
        }
    });
    Ok(())
}
