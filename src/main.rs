use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use itertools::Itertools;
use streamgraph::catalog::load_catalog_file;
use streamgraph::graph::Graph;
use streamgraph::io::fs::load_graph;
use streamgraph::io::fs::loader::FsStorage;
use streamgraph::streaming::GroupResult;
use streamgraph::streaming::reader::StreamingReader;

use crate::settings::{CliArgs, OperationMode};

mod settings;

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    #[cfg(feature = "tracy")]
    tracy_client::Client::start();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let registry = Arc::new(
        load_catalog_file(&args.catalog)
            .with_context(|| format!("Failed to load the catalog {}", args.catalog.display()))?,
    );
    let storage = Arc::new(FsStorage::new(&args.data_dir, args.patch_dir.as_ref().map(PathBuf::from)));
    let graph = Arc::new(
        load_graph(&storage, &args.archive, registry.as_ref())
            .with_context(|| format!("Failed to load {} from {}", args.archive, args.data_dir))?,
    );

    let reader = StreamingReader::new(graph.clone(), registry, storage, args.reader_settings());

    match args.operation_mode {
        OperationMode::Summary => print_summary(&graph),
        OperationMode::Dependents { group_id } => {
            graph
                .group(group_id)
                .with_context(|| format!("Unknown group {}", group_id))?;
            let dependents = graph.dependents_closure(group_id);
            println!(
                "{} groups depend on group {}: {}",
                dependents.len(),
                group_id,
                dependents.iter().join(", ")
            );
        }
        OperationMode::Group { group_id, flat } => {
            let result = reader.resolve(group_id, !flat)?;
            print_group(&result);
        }
        OperationMode::Root { identifier, flat } => {
            let root = reader.resolve_root(identifier, !flat)?;
            let object = root
                .object()
                .with_context(|| format!("Root {:#018x} points outside of its group", identifier))?;
            println!(
                "Root {:#018x} is object #{} of group {}",
                identifier,
                root.index,
                root.group.group_id()
            );
            println!("{:#?}", object);
        }
    }

    let stats = reader.cache_stats();
    log::debug!(
        "Cache holds {} groups, {} alive, {} hits, {} misses",
        stats.strong,
        stats.weak_alive,
        stats.hits,
        stats.misses
    );
    Ok(())
}

fn print_summary(graph: &Graph) {
    let objects: u64 = graph
        .groups()
        .iter()
        .map(|group| u64::from(group.num_objects))
        .sum();
    let top_level = graph
        .groups()
        .iter()
        .filter(|group| graph.incoming_groups(group.group_id).is_empty())
        .count();

    println!("Archive version {}", graph.version());
    println!("{} groups ({} without dependents), {} objects", graph.groups().len(), top_level, objects);
    println!("{} locators, {} link bytes", graph.locators().len(), graph.link_table().len());
    println!("Files: {}", graph.files().iter().join(", "));
}

fn print_group(result: &GroupResult) {
    println!("Group {} ({} objects)", result.group_id(), result.len());
    for (index, object) in result.objects().iter().enumerate() {
        println!("#{} {:#?}", index, object);
    }
}
