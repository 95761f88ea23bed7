//! DeepSearch CLI, the main entry point.
//!
//! Commands:
//! - `onboard`     Write a default config file
//! - `serve`       Start the HTTP gateway
//! - `users add`   Provision a user row
//! - `chats list`  List a user's conversations
//! - `chats show`  Print one conversation
//! - `doctor`      Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deepsearch",
    about = "DeepSearch: a streaming web-search agent server",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config directory and a default config.toml
    Onboard,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage users
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Inspect stored conversations
    Chats {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user, or update the name/email of an existing one
    Add {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
enum ChatAction {
    /// List a user's conversations, most recently updated first
    List { user: String },

    /// Print one conversation owned by `user`
    Show { user: String, id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Users {
            action: UserAction::Add { id, name, email },
        } => commands::users::add(&id, name.as_deref(), email.as_deref()).await?,
        Commands::Chats { action } => match action {
            ChatAction::List { user } => commands::chats::list(&user).await?,
            ChatAction::Show { user, id } => commands::chats::show(&user, &id).await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
