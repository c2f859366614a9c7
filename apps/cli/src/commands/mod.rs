use std::path::Path;

use anyhow::Context;
use clap::Subcommand;
use para_tranz_core::{Project, ToolkitConfig};

pub mod export;
pub mod import;
pub mod mapping;
pub mod search;

#[derive(Subcommand)]
pub enum Commands {
    /// Extract strings from game files into platform snapshots
    Export,

    /// Write translated snapshots back into the game files
    Import {
        /// Match entries of renamed classes to the current build
        #[arg(short, long)]
        migrate: bool,
    },

    /// Print a mapping descriptor for one class (`jar:class` or `class`)
    GenerateMapping {
        /// Class path, with or without the jar prefix
        class: String,
    },

    /// Find the classes that contain a string
    Search {
        /// Substring to look for
        pattern: String,
    },

    /// Merge duplicate class descriptors in the mapping file
    DedupMapping,
}

impl Commands {
    pub fn execute(&self, config: ToolkitConfig) -> anyhow::Result<()> {
        let mut project = Project::open(config).context("Failed to open the project mapping")?;
        match self {
            Commands::Export => export::execute(&project),
            Commands::Import { migrate } => import::execute(&mut project, *migrate),
            Commands::GenerateMapping { class } => mapping::generate(&project, class),
            Commands::Search { pattern } => search::execute(&project, pattern),
            Commands::DedupMapping => mapping::dedup(&mut project),
        }
    }
}

/// Configuration from `--config`, or defaults anchored at `--project-dir`
/// (the working directory when neither is given).
pub fn load_config(
    config_file: Option<&Path>,
    project_dir: Option<&Path>,
) -> anyhow::Result<ToolkitConfig> {
    let config = match config_file {
        Some(path) => ToolkitConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ToolkitConfig::default(),
    };

    Ok(match project_dir {
        Some(dir) => config.with_project_dir(dir),
        None if config_file.is_none() => config.with_project_dir(std::env::current_dir()?),
        None => config,
    })
}
