//! Switchyard CLI, the main entry point.
//!
//! Commands:
//! - `ask`        Answer one question and exit
//! - `chat`       Interactive session with memory of earlier turns
//! - `providers`  List, validate or reload the provider registry
//! - `memory`     Inspect stored history, similar queries and sessions
//! - `config`     Show or initialise configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard: route questions to the right capability providers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question text
        text: String,

        /// User the question belongs to
        #[arg(short, long, default_value = commands::DEFAULT_USER, env = "SWITCHYARD_USER")]
        user: String,

        /// Run every selected provider to completion instead of answering fast
        #[arg(short, long)]
        batch: bool,

        /// Skip scoring and ask every provider declaring this capability
        #[arg(short, long)]
        capability: Option<String>,
    },

    /// Start an interactive chat session
    Chat {
        #[arg(short, long, default_value = commands::DEFAULT_USER, env = "SWITCHYARD_USER")]
        user: String,
    },

    /// Manage the provider registry
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },

    /// Inspect memory
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ProvidersCommand {
    /// List loaded providers with their statistics
    List,
    /// Check every descriptor against its implementation
    Validate,
    /// Re-read the registry file and rebuild providers
    Reload {
        /// Reload a single provider
        id: Option<String>,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Show stored interactions for a user
    History {
        #[arg(short, long, default_value = commands::DEFAULT_USER, env = "SWITCHYARD_USER")]
        user: String,

        /// Only interactions answered by this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Only the last N days
        #[arg(short, long)]
        days: Option<i64>,
    },
    /// Find earlier queries similar to the given text
    Search {
        text: String,

        #[arg(short, long, default_value = commands::DEFAULT_USER, env = "SWITCHYARD_USER")]
        user: String,

        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Show conversation sessions for a user
    Session {
        #[arg(short, long, default_value = commands::DEFAULT_USER, env = "SWITCHYARD_USER")]
        user: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write default config and an example provider registry
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    match cli.command {
        Commands::Ask {
            text,
            user,
            batch,
            capability,
        } => commands::ask::run(&user, &text, batch, capability.as_deref(), json).await?,
        Commands::Chat { user } => commands::chat::run(&user).await?,
        Commands::Providers { command } => match command {
            ProvidersCommand::List => commands::providers::list(json).await?,
            ProvidersCommand::Validate => commands::providers::validate(json).await?,
            ProvidersCommand::Reload { id } => commands::providers::reload(id.as_deref(), json).await?,
        },
        Commands::Memory { command } => match command {
            MemoryCommand::History { user, provider, days } => {
                commands::memory::history(&user, provider.as_deref(), days, json).await?
            }
            MemoryCommand::Search { text, user, provider } => {
                commands::memory::search(&user, &text, provider.as_deref(), json).await?
            }
            MemoryCommand::Session { user } => commands::memory::session(&user, json).await?,
        },
        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config_cmd::show(json).await?,
            ConfigCommand::Init { force } => commands::config_cmd::init(force).await?,
        },
    }

    Ok(())
}
