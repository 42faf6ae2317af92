//! loomterm CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat, or one message with `-m`
//! - `tools`   — List the registered tools and their inputs
//! - `config`  — Show the effective configuration, or write a default one

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod render;

#[derive(Parser)]
#[command(
    name = "loomterm",
    about = "loomterm — a streaming AI agent for your terminal",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.loomterm/config.toml
    #[arg(long, global = true, env = "LOOMTERM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (the default)
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List available tools
    Tools,

    /// Show the effective configuration
    Config {
        /// Write a default config file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr and stay quiet by default so they don't interleave
    // with the conversation.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command.unwrap_or(Commands::Chat { message: None }) {
        Commands::Chat { message } => commands::chat::run(config_path, message).await?,
        Commands::Tools => commands::tools::run(config_path)?,
        Commands::Config { init, force } => {
            if init {
                commands::config_cmd::init(config_path, force)?;
            } else {
                commands::config_cmd::show(config_path)?;
            }
        }
    }

    Ok(())
}
