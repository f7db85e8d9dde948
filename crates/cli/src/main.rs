use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
use commands::{rules::RulesCommand, scan::ScanCommand};

#[derive(Parser)]
#[command(name = "kensa")]
#[command(about = "Multi-engine artifact scanning orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    Scan {
        #[command(subcommand)]
        subcommand: ScanCommand,
    },

    Rules {
        #[command(subcommand)]
        subcommand: RulesCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Scan { subcommand } => runtime.block_on(subcommand.execute()),
        Commands::Rules { subcommand } => runtime.block_on(subcommand.execute()),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
