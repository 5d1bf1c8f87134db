use std::io::Cursor;

use log::trace;

use crate::StreamError;
use crate::graph::Graph;
use crate::io::fs::loader::FsStorage;
use crate::types::TypeFactory;

pub mod loader;

/// Loads and indexes the graph metadata file `name` from the data folder.
pub fn load_graph(storage: &FsStorage, name: &str, factory: &dyn TypeFactory) -> Result<Graph, StreamError> {
    let buf = storage.read_all(name)?;
    trace!("Loaded {} ({} bytes)", name, buf.len());
    Graph::parse(&mut Cursor::new(buf), factory)
}
