//! Seastreak Service - Daily streak scheduler and HTTP API.
//!
//! Run with: `cargo run -p seastreak-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use time::Date;
use tracing::info;

use seastreak_service::{AppState, Config, HttpLandOracle, Scheduler, api, execute_run};
use seastreak_store::Store;

/// Seastreak Service - Daily at-sea streak scheduler and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "seastreak-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Disable the daily scheduler (API only mode).
    #[arg(long, global = true)]
    no_scheduler: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Serve,

    /// Run the daily check once, print the summary as JSON and exit.
    RunOnce {
        /// Treat this UTC date as today (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        today: Option<Date>,
    },
}

fn parse_date(s: &str) -> Result<Date, String> {
    seastreak_types::parse_date(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seastreak_service=info".parse()?)
                .add_directive("seastreak_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::RunOnce { today }) => run_once(config, today).await,
        Some(Command::Serve) | None => run_server(config, args.no_scheduler).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let oracle = HttpLandOracle::new(&config.oracle).context("failed to build oracle client")?;
    info!("Land-proximity oracle at {}", config.oracle.url);

    Ok(AppState::new(store, config, Arc::new(oracle)))
}

async fn run_once(config: Config, today: Option<Date>) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let today = today.unwrap_or_else(|| time::OffsetDateTime::now_utc().date());

    let summary = execute_run(&state, today).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

async fn run_server(config: Config, no_scheduler: bool) -> anyhow::Result<()> {
    let addr: SocketAddr = config.server.bind.parse()?;
    let state = build_state(config)?;

    let scheduler_task = if no_scheduler {
        info!("Daily scheduler disabled");
        None
    } else {
        Scheduler::new(Arc::clone(&state)).start()
    };

    let app = api::app(Arc::clone(&state));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    if let Some(task) = scheduler_task {
        let _ = task.await;
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
    state.scheduler.signal_stop();
    state.shutdown.cancel();
}
