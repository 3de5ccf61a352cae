//! Leadline CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway and the session sweeper
//! - `chat`    — Interactive or single-message chat against the engine
//! - `config`  — Print, locate, or validate configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "leadline",
    about = "Leadline — chat orchestration for real-estate lead research",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LEADLINE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant as an agent
    Chat {
        /// Agent id; also the session id
        #[arg(short, long)]
        agent: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print fragments as they arrive
        #[arg(short, long)]
        stream: bool,
    },

    /// Configuration commands (prints the default config when no action is given)
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            agent,
            message,
            stream,
        } => commands::chat::run(agent, message, stream).await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
    }

    Ok(())
}
