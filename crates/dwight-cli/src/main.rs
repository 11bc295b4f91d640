//! Dwight CLI - chat with local models served by Ollama.

use clap::{Parser, Subcommand};
use dwight_engine::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// Dwight - a terminal chat client for local language models
#[derive(Parser)]
#[command(name = "dwight")]
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
    /// Start an interactive chat session
    Chat {
        /// Profile number to start with (see `dwight profiles list`)
        #[arg(short, long)]
        profile: Option<usize>,
        /// Continue a saved conversation
        #[arg(short, long)]
        resume: Option<String>,
        /// Wait for complete replies instead of streaming them
        #[arg(long)]
        no_stream: bool,
    },

    /// Manage models on the backend
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },

    /// Browse, export and delete saved conversations
    Conversations {
        #[command(subcommand)]
        command: ConversationCommands,
    },

    /// Show or select model profiles
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Start or stop the backend
    Backend {
        #[command(subcommand)]
        command: BackendCommands,
    },

    /// Show configuration and data paths
    Info,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List installed models
    List,
    /// Download a model
    Pull {
        /// Model name, e.g. llama3.2:3b
        name: String,
    },
    /// Show the curated model library
    Library {
        /// Only show models matching this text
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConversationCommands {
    /// List saved conversations, newest first
    List,
    /// Search by title, model or tag
    Search {
        query: String,
    },
    /// Print a conversation
    Show {
        id: String,
    },
    /// Export a conversation to a file
    Export {
        id: String,
        /// md, json or txt
        #[arg(short, long, default_value = "md")]
        format: String,
        /// Output file (default: exports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a conversation
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List profiles
    List,
    /// Make a profile current
    Use {
        /// Profile number
        number: usize,
    },
}

#[derive(Subcommand)]
enum BackendCommands {
    /// Make sure the backend is running
    Start,
    /// Stop a managed backend
    Stop,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with chat output
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut config = EngineConfig::from_env();

    match cli.command {
        Commands::Chat {
            profile,
            resume,
            no_stream,
        } => {
            if no_stream {
                config.stream = false;
            }
            commands::chat::run(&config, profile, resume.as_deref()).await
        }
        Commands::Models { command } => match command {
            ModelCommands::List => commands::models::list(&config).await,
            ModelCommands::Pull { name } => commands::models::pull(&config, &name).await,
            ModelCommands::Library { filter } => commands::models::library(&config, filter.as_deref()).await,
        },
        Commands::Conversations { command } => match command {
            ConversationCommands::List => commands::conversations::list(&config, None),
            ConversationCommands::Search { query } => commands::conversations::list(&config, Some(&query)),
            ConversationCommands::Show { id } => commands::conversations::show(&config, &id),
            ConversationCommands::Export { id, format, output } => {
                commands::conversations::export(&config, &id, &format, output.as_deref())
            }
            ConversationCommands::Delete { id } => commands::conversations::delete(&config, &id),
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => commands::profiles::list(&config),
            ProfileCommands::Use { number } => commands::profiles::select(&config, number),
        },
        Commands::Backend { command } => match command {
            BackendCommands::Start => commands::backend::start(&config).await,
            BackendCommands::Stop => commands::backend::stop(&config).await,
        },
        Commands::Info => commands::info::run(&config),
    }
}
