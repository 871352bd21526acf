//! Freewrite CLI - local model management and text enhancement.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Freewrite - enhance your writing with a local language model
#[derive(Parser)]
#[command(name = "freewrite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage downloadable models
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },

    /// Manage prompt passes
    Passes {
        #[command(subcommand)]
        command: PassesCommand,
    },

    /// Enhance a text file with the selected model
    Enhance {
        /// Input file
        file: PathBuf,
        /// Run a single pass (id or name) instead of the combined enhancements
        #[arg(short, long)]
        pass: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List catalog models and their state
    List,
    /// Download a model
    Pull {
        /// Model id
        id: String,
    },
    /// Select the model used for generation
    Select {
        /// Model id
        id: String,
    },
    /// Delete a downloaded model
    Rm {
        /// Model id
        id: String,
    },
    /// Show paths and engine configuration
    Info,
}

#[derive(Subcommand)]
enum PassesCommand {
    /// List built-in and custom passes
    List,
    /// Add a custom pass
    Add {
        /// Display name
        #[arg(long)]
        name: String,
        /// Prompt template; `{{text}}` is replaced with the input
        #[arg(long)]
        prompt: String,
    },
    /// Delete custom passes by index
    Rm {
        /// Indices as shown by `passes list`
        #[arg(required = true)]
        indices: Vec<usize>,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::Models { command } => match command {
            ModelsCommand::List => commands::models::list(),
            ModelsCommand::Pull { id } => runtime.block_on(commands::models::pull(&id)),
            ModelsCommand::Select { id } => commands::models::select(&id),
            ModelsCommand::Rm { id } => runtime.block_on(commands::models::rm(&id)),
            ModelsCommand::Info => commands::models::info(),
        },
        Commands::Passes { command } => match command {
            PassesCommand::List => commands::passes::list(),
            PassesCommand::Add { name, prompt } => commands::passes::add(&name, &prompt),
            PassesCommand::Rm { indices } => commands::passes::rm(&indices),
        },
        Commands::Enhance { file, pass, json } => {
            runtime.block_on(commands::enhance::run(&file, pass.as_deref(), json))
        }
    }
}
