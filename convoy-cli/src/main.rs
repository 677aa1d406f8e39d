use clap::{Parser, Subcommand};
use color_eyre::Result;

mod commands;
mod delivery;
mod output;

/// Drive the built-in delivery pipeline against simulated collaborators
#[derive(Parser, Debug)]
#[command(name = "convoy", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a simulated delivery run and report per-instance status
    Run(commands::run::RunArgs),
    /// Show the pipeline's jobs, dependencies, and execution tiers
    Graph(commands::graph::GraphArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Graph(args) => commands::graph::execute(args),
    }
}
