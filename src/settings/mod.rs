use std::path::PathBuf;

use clap::{Parser, Subcommand};
use streamgraph::streaming::cache::DEFAULT_CACHE_CAPACITY;
use streamgraph::streaming::reader::ReaderSettings;

#[derive(Parser, Debug)]
#[command(name = "streamgraph")]
#[command(version)]
#[command(about = "Inspects group partitioned asset archives")]
pub struct CliArgs {
    #[arg(long, env = "STREAMGRAPH_DATA_DIR", default_value_t = default_data_dir())]
    pub data_dir: String,

    /// Where files flagged as patches are read from. Archives without patches don't need it.
    #[arg(long, env = "STREAMGRAPH_PATCH_DIR")]
    pub patch_dir: Option<String>,

    /// The graph metadata file, relative to the data dir
    #[arg(long, default_value = "graph.bin", env = "STREAMGRAPH_ARCHIVE")]
    pub archive: String,

    /// XML class catalog describing every type the archive uses
    #[arg(long, env = "STREAMGRAPH_CATALOG")]
    pub catalog: PathBuf,

    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    #[command(subcommand)]
    pub operation_mode: OperationMode,
}

impl CliArgs {
    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            cache_capacity: self.cache_capacity,
        }
    }
}

pub fn default_data_dir() -> String {
    std::env::current_dir()
        .unwrap_or_default()
        .join("_data")
        .to_string_lossy()
        .to_string()
}

#[derive(Subcommand, Debug)]
pub enum OperationMode {
    /// Resolves a group and prints its objects
    Group {
        group_id: u32,
        /// Skip sub-groups, pointers stay unresolved
        #[arg(long)]
        flat: bool,
    },
    /// Resolves the group owning a root identifier and prints the root object
    Root {
        #[arg(value_parser = parse_identifier)]
        identifier: u64,
        #[arg(long)]
        flat: bool,
    },
    /// Lists every group that needs to be reloaded when a group changes
    Dependents { group_id: u32 },
    /// Prints the archive's table sizes
    Summary,
}

// 0x prefixed hex, or decimal
fn parse_identifier(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse::<u64>(),
    };
    parsed.map_err(|err| format!("{} is not a root identifier: {}", input, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(parse_identifier("0xDEADBEEF"), Ok(0xDEAD_BEEF));
        assert_eq!(parse_identifier(" 42 "), Ok(42));
        assert!(parse_identifier("0xZZ").is_err());
        assert!(parse_identifier("-1").is_err());
    }

    #[test]
    fn subcommands() {
        let args = CliArgs::parse_from([
            "streamgraph",
            "--catalog",
            "types.xml",
            "--cache-capacity",
            "16",
            "group",
            "7",
            "--flat",
        ]);
        assert_eq!(args.reader_settings().cache_capacity, 16);
        assert!(matches!(
            args.operation_mode,
            OperationMode::Group {
                group_id: 7,
                flat: true
            }
        ));

        let args = CliArgs::parse_from(["streamgraph", "--catalog", "types.xml", "root", "0x10"]);
        assert!(matches!(
            args.operation_mode,
            OperationMode::Root {
                identifier: 0x10,
                flat: false
            }
        ));
    }
}
