//! loadstone - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loadstone::{
    config::Config,
    store::Store,
    tracking::{ActivityRecorder, AssignmentReconciler, LoadMonitor, ShiftManager},
    web::{start_server, AppState},
};

#[derive(Parser)]
#[command(name = "loadstone", version, about = "Wizard load tracking service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Run schema migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = Store::new(&config.database).await?;
    store.run_migrations().await?;

    if let Some(Command::Migrate) = cli.command {
        tracing::info!("migrations complete");
        return Ok(());
    }

    let store = Arc::new(store);
    let recorder = ActivityRecorder::new(store.clone(), config.load.activity_window);
    let state = Arc::new(AppState {
        recorder: recorder.clone(),
        reconciler: AssignmentReconciler::new(store.clone()),
        shifts: ShiftManager::new(store.clone()),
        monitor: LoadMonitor::new(store.clone(), recorder, config.load.overload_threshold),
    });

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid HTTP_HOST/HTTP_PORT: {e}"))?;

    start_server(addr, state).await?;
    Ok(())
}
