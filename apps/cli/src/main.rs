use std::path::PathBuf;

use clap::Parser;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "para-tranz")]
#[command(about = "Localization toolkit for para-tranz game projects", long_about = None)]
struct Cli {
    /// Toolkit configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root that relative configured paths resolve against
    #[arg(short, long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    // Setup logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.project_dir.as_deref())?;
    cli.command.execute(config)?;

    Ok(())
}
