//! ICE CLI - Command-line interface for intent resolution and session context.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ice")]
#[command(about = "Intent resolution and session context for coding assistants", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ICE workspace in the current directory
    Init,
    /// Show a summary of the indexed codebase
    Codebase {
        /// Number of largest files to list
        #[arg(long, default_value = "5")]
        largest: usize,
    },
    /// Search the codebase index
    Find {
        /// Symbol name, path fragment or text to look for
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Re-extract files that changed on disk
    Reindex {
        /// Rebuild every file instead of only changed ones
        #[arg(long)]
        full: bool,
    },
    /// Show session and index status
    Status,
    /// Revert the most recent edits
    Undo {
        /// Number of edits to revert
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Resolve one request as a turn of the saved session
    Ask {
        /// The request, e.g. "create a python function for parsing dates"
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Answer yes to confirmation prompts
        #[arg(short, long)]
        yes: bool,
        /// Print the resolved intent as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session
    Repl,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Codebase { largest } => commands::codebase::run(largest),
        Commands::Find { query, limit } => commands::find::run(&query, limit),
        Commands::Reindex { full } => commands::reindex::run(full),
        Commands::Status => commands::status::run(),
        Commands::Undo { count, yes } => commands::undo::run(count, yes),
        Commands::Ask { text, yes, json } => commands::ask::run(&text.join(" "), yes, json),
        Commands::Repl => commands::repl::run(),
    }
}
