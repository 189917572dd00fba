//! lkp CLI
//!
//! Command-line interface for issuing service and user access tokens.
//!
//! # Usage
//!
//! ```bash
//! # Issue (or re-issue) the access key for a service/user pair
//! lkp key billing-api alice
//!
//! # Get or create a single token
//! lkp token service billing-api
//!
//! # Read-only lookup; exits with status 1 when absent
//! lkp lookup user alice
//!
//! # List registrations
//! lkp list service --format json
//!
//! # Create the token relations
//! lkp migrate
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lkp_core::{Config, DefaultTokenManager, Namespace, PostgresStore, StoreBackend, TokenStore};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

use commands::OutputFormat;

#[derive(Parser)]
#[command(name = "lkp")]
#[command(about = "Issue opaque access tokens for services and users")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML or JSON configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use a throwaway in-memory store instead of the configured database
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the access key for a service/user pair, creating tokens as needed
    Key {
        /// Service name
        service: String,

        /// User name
        user: String,
    },

    /// Get or create the token for one service or user
    Token {
        /// Namespace (service or user)
        namespace: Namespace,

        /// Entity name
        name: String,
    },

    /// Print an existing token without creating one
    Lookup {
        /// Namespace (service or user)
        namespace: Namespace,

        /// Entity name
        name: String,
    },

    /// List every registration in a namespace
    List {
        /// Namespace (service or user)
        namespace: Namespace,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Create the token relations in the configured database
    Migrate,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = load_config(&cli)?;

    let mut out = io::stdout().lock();
    let code = match cli.command {
        Commands::Key { service, user } => {
            let manager = open_manager(&config).await?;
            commands::key(&manager, &service, &user, &mut out).await?;
            ExitCode::SUCCESS
        }
        Commands::Token { namespace, name } => {
            let manager = open_manager(&config).await?;
            commands::token(&manager, namespace, &name, &mut out).await?;
            ExitCode::SUCCESS
        }
        Commands::Lookup { namespace, name } => {
            let manager = open_manager(&config).await?;
            if commands::lookup(&manager, namespace, &name, &mut out).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::List { namespace, format } => {
            let manager = open_manager(&config).await?;
            commands::list(manager.store(), namespace, format, &mut out).await?;
            ExitCode::SUCCESS
        }
        Commands::Migrate => {
            migrate(&config).await?;
            ExitCode::SUCCESS
        }
    };
    out.flush()?;

    Ok(code)
}

async fn open_manager(config: &Config) -> Result<DefaultTokenManager<Box<dyn TokenStore>>> {
    DefaultTokenManager::connect(config)
        .await
        .context("Failed to open token store")
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let (mut config, path) =
        Config::discover(cli.config.as_deref()).context("Failed to load configuration")?;

    match path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }

    if cli.memory {
        config.database.backend = StoreBackend::Memory;
    }

    Ok(config)
}

async fn migrate(config: &Config) -> Result<()> {
    if config.database.backend != StoreBackend::Postgres {
        bail!("migrate requires the postgres backend");
    }

    let store = PostgresStore::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    store.migrate().await.context("Migration failed")?;

    let services = store.list(Namespace::Service).await?.len();
    let users = store.list(Namespace::User).await?.len();
    info!(services, users, "Token relations ready");
    Ok(())
}
