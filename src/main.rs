//! Memory Bridge - MCP over SSE for personal note memory
//!
//! Entry point for the bridge server and its provisioning commands.

use anyhow::Context;
use clap::{Parser, Subcommand};
use memory_bridge::{
    api::{self, AppState},
    config::SearchConfig,
    mcp::{RpcDispatcher, ToolHandler},
    services::{HttpSearchBackend, SearchBackend},
    storage::libsql::LibsqlStore,
    BridgeConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memory-bridge")]
#[command(about = "MCP-over-SSE bridge exposing note memory tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file (TOML)
    #[arg(long, env = "MEMORY_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, env = "MEMORY_BRIDGE_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP bridge
    Serve {
        /// Listen address
        #[arg(long, env = "MEMORY_BRIDGE_ADDR")]
        addr: Option<SocketAddr>,

        /// Search backend base URL
        #[arg(long, env = "MEMORY_BRIDGE_SEARCH_URL")]
        search_url: Option<String>,

        /// Search backend bearer token
        #[arg(long, env = "MEMORY_BRIDGE_SEARCH_API_KEY", hide_env_values = true)]
        search_api_key: Option<String>,
    },

    /// Create the database and schema
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Provision a user and print a fresh API key
    Create {
        /// Unique user name, also used as the search backend user id
        user_id: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// List users and how many memories each has stored
    List,
}

fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }

    if let Commands::Serve {
        addr,
        search_url,
        search_api_key,
    } = &cli.command
    {
        if let Some(addr) = addr {
            config.server.addr = *addr;
        }
        if let Some(url) = search_url {
            let search = config
                .search
                .get_or_insert_with(|| SearchConfig::new(url.clone()));
            search.url = url.clone();
        }
        if let (Some(key), Some(search)) = (search_api_key, config.search.as_mut()) {
            search.api_key = Some(key.clone());
        }
    }

    config.validate()?;
    Ok(config)
}

async fn run_server(config: BridgeConfig) -> anyhow::Result<()> {
    let store = Arc::new(LibsqlStore::open(&config.database.path).await?);

    let search: Option<Arc<dyn SearchBackend>> = match &config.search {
        Some(search) => {
            info!("Search backend: {}", search.url);
            Some(Arc::new(HttpSearchBackend::new(search)?))
        }
        None => {
            info!("No search backend configured, searches use the note store");
            None
        }
    };

    let dispatcher = Arc::new(RpcDispatcher::new(ToolHandler::new(store.clone(), search)));
    let shutdown = CancellationToken::new();
    let state = AppState::new(&config.server, dispatcher, store, shutdown.clone());

    api::serve(config.server.addr, state, shutdown).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Crate at the chosen level, HTTP and database internals at WARN
    let filter = EnvFilter::new(format!(
        "memory_bridge={level},tower_http={level},hyper=warn,libsql=warn,reqwest=warn",
        level = level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Memory Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    debug!("Database path: {}", config.database.path.display());

    match cli.command {
        Commands::Serve { .. } => run_server(config).await,
        Commands::Init => {
            LibsqlStore::open(&config.database.path).await?;
            println!("Database ready at {}", config.database.path.display());
            Ok(())
        }
        Commands::User {
            action: UserAction::Create { user_id, name },
        } => {
            let store = LibsqlStore::open(&config.database.path).await?;
            let (caller, api_key) = store.create_user(&user_id, name.as_deref()).await?;

            println!("Created user {} ({})", caller.user_id, caller.id);
            println!("API key: {}", api_key);
            println!();
            println!("Store this key now; it cannot be shown again.");
            Ok(())
        }
        Commands::User {
            action: UserAction::List,
        } => {
            let store = LibsqlStore::open(&config.database.path).await?;
            let users = store.list_users().await?;
            if users.is_empty() {
                println!("No users provisioned");
                return Ok(());
            }

            println!("{:<24} {:<24} {:>8}  CREATED", "USER", "NAME", "MEMORIES");
            for user in users {
                println!(
                    "{:<24} {:<24} {:>8}  {}",
                    user.user_id,
                    user.name.as_deref().unwrap_or("-"),
                    user.memory_count,
                    user.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
    }
}
