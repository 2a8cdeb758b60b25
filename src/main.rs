//! Command-line interface for content-mirror
//!
//! # Usage Examples
//!
//! ```bash
//! # Poll the sync API every 15 seconds (the default)
//! content-mirror --config content-mirror.toml run
//!
//! # Webhook mode with the listener enabled in the config file
//! content-mirror run --mode webhook
//!
//! # Shorter poll interval, credentials from the environment
//! CONTENTFUL_SPACE=abc CONTENTFUL_ACCESS_TOKEN=... content-mirror run --interval 5s
//!
//! # A single run, then exit
//! content-mirror sync
//!
//! # Drop the cursor and all mirrored records; the next run starts over
//! content-mirror fresh --purge
//!
//! # Show the stored sync state
//! content-mirror status
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use content_mirror::app;
use content_mirror::config::{duration, Config, StoreBackend};
use content_mirror::shutdown::install_signal_handler;
use mirror_engine::SyncMode;
use mirror_mongodb::{MongoOpts, MongoStore};
use mirror_sink::{MemoryStore, MirrorStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "content-mirror")]
#[command(about = "Mirror a content delivery sync API into a document store")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./content-mirror.toml if present)
    #[arg(long, global = true, env = "CONTENT_MIRROR_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that take precedence over the configuration file
#[derive(clap::Args)]
struct Overrides {
    /// Space identifier
    #[arg(long, global = true, env = "CONTENTFUL_SPACE")]
    space: Option<String>,

    /// Delivery API access token
    #[arg(long, global = true, env = "CONTENTFUL_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Space environment
    #[arg(long, global = true, env = "CONTENTFUL_ENVIRONMENT")]
    environment: Option<String>,

    /// MongoDB connection string
    #[arg(long, global = true, env = "MONGODB_URI", hide_env_values = true)]
    mongodb_uri: Option<String>,

    /// Webhook Basic auth user
    #[arg(long, global = true, env = "CONTENT_MIRROR_WEBHOOK_USER")]
    webhook_user: Option<String>,

    /// Webhook Basic auth password
    #[arg(long, global = true, env = "CONTENT_MIRROR_WEBHOOK_PASSWORD", hide_env_values = true)]
    webhook_password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run {
        /// Trigger mode: poll or webhook
        #[arg(long, value_parser = parse_mode)]
        mode: Option<SyncMode>,

        /// Poll interval (e.g. 30, 30s, 5m)
        #[arg(long, value_parser = duration::parse_duration)]
        interval: Option<Duration>,
    },

    /// Perform a single run and exit
    Sync,

    /// Reset the sync state so the next run is a full refresh
    Fresh {
        /// Also delete every mirrored record now
        #[arg(long)]
        purge: bool,
    },

    /// Print the stored sync state
    Status,
}

fn parse_mode(s: &str) -> anyhow::Result<SyncMode> {
    SyncMode::from_str(s)
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(space) = self.space {
            config.source.space = space;
        }
        if let Some(token) = self.access_token {
            config.source.access_token = token;
        }
        if let Some(environment) = self.environment {
            config.source.environment = environment;
        }
        if let Some(uri) = self.mongodb_uri {
            config.store.uri = uri;
        }
        if let Some(user) = self.webhook_user {
            config.webhook.user = Some(user);
        }
        if let Some(password) = self.webhook_password {
            config.webhook.password = Some(password);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(content_mirror::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    if let Commands::Run { mode, interval } = &cli.command {
        if let Some(mode) = mode {
            config.runner.mode = *mode;
        }
        if let Some(interval) = interval {
            config.runner.interval = *interval;
        }
    }

    match config.store.backend {
        StoreBackend::Mongodb => {
            let mut opts = MongoOpts::new(&config.store.uri, &config.store.database);
            opts.collection = config.store.collection.clone();
            let store = MongoStore::connect(&opts)
                .await
                .context("Failed to connect to MongoDB")?;
            execute(cli.command, &config, Arc::new(store)).await
        }
        StoreBackend::Memory => {
            info!("Using the in-memory store; nothing is kept after exit");
            execute(cli.command, &config, Arc::new(MemoryStore::new())).await
        }
    }
}

async fn execute<S: MirrorStore + 'static>(
    command: Commands,
    config: &Config,
    store: Arc<S>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { .. } => {
            config.validate_source()?;
            config.validate_webhook()?;
            let source = Arc::new(app::delivery_client(config)?);
            let shutdown = install_signal_handler();

            info!(
                "Starting content-mirror in {} mode (space {}, environment {})",
                config.runner.mode, config.source.space, config.source.environment
            );
            let summary = app::run_scheduler(config, store, source, shutdown).await?;
            info!(
                "Stopped after {} completed, {} failed, {} skipped runs",
                summary.completed, summary.failed, summary.skipped
            );
        }
        Commands::Sync => {
            config.validate_source()?;
            let source = Arc::new(app::delivery_client(config)?);
            match app::sync_once(config, store, source).await? {
                Some(report) => println!("{}", app::describe_report(&report)),
                None => println!("Another run is in progress, nothing to do"),
            }
        }
        Commands::Fresh { purge } => {
            let state = app::fresh(store.as_ref(), purge).await?;
            println!("Started sync chain {}", state.id);
            if purge {
                println!("Deleted all mirrored records");
            }
        }
        Commands::Status => {
            let state = store.load_state().await?;
            println!("{}", app::describe_state(state.as_ref()));
        }
    }
    Ok(())
}
