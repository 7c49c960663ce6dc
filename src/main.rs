use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cell_relay::{
    config::{BackendKind, Config, LogFormat},
    pointer::FileConfigProvider,
    server::{self, AppState},
    storage::{CellStore, InMemoryBackend, KvBackend, RedisBackend},
    upstream::Forwarder,
};

#[derive(Debug, Parser)]
#[command(name = "cell-relay", version, about = "Session-scoped cell sharing service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Delete every stored cell in the backend
    Reset {
        /// Confirm the irreversible reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Cell relay starting..."
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Reset { yes } => run_reset(config, yes).await,
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;

    let pointers = match FileConfigProvider::new(&config.pointers.dir).await {
        Ok(p) => {
            info!(dir = %config.pointers.dir.display(), "Pointer store initialized");
            p
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize pointer store");
            store.close().await;
            return Err(e.into());
        }
    };

    let forwarder = match Forwarder::new(&config.upstream) {
        Ok(f) => f,
        Err(e) => {
            error!(error = %e, "Failed to initialize upstream client");
            store.close().await;
            return Err(e.into());
        }
    };

    let listener = match tokio::net::TcpListener::bind(config.server.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.server.bind_addr, error = %e, "Failed to bind listener");
            store.close().await;
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        forwarder,
        Arc::new(pointers),
    ));

    let result = server::serve(state, listener, shutdown_signal()).await;

    store.close().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn run_reset(config: Config, confirmed: bool) -> anyhow::Result<()> {
    if !confirmed {
        anyhow::bail!("Refusing to delete every stored cell without --yes");
    }

    let store = open_store(&config).await?;
    let result = store.reset_all().await;
    store.close().await;

    let deleted = result?;
    info!(deleted = deleted, "Backend reset");
    println!("Deleted {} keys", deleted);
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<CellStore> {
    let backend: Arc<dyn KvBackend> = match config.storage.backend {
        BackendKind::Redis => match RedisBackend::connect(&config.storage).await {
            Ok(b) => {
                info!(pool_size = config.storage.pool_size, "Redis backend connected");
                Arc::new(b)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to Redis");
                return Err(e.into());
            }
        },
        BackendKind::Memory => {
            warn!("Using in-memory backend; cells are lost on exit");
            Arc::new(InMemoryBackend::new())
        }
    };

    Ok(CellStore::new(backend, config.storage.scan_batch_size))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
