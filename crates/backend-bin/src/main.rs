// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Entry point of the VPlan server.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vplan_backend_lib::{
    auth::hash_password, config::Settings, create_router, middleware::rate_limit::CLEANUP_INTERVAL,
    spawn_maintenance, AppState,
};

#[derive(Debug, Parser)]
#[command(name = "vplan-server", version, about = "School timetable (VPlan) backend")]
struct Cli {
    /// Config file, defaults to ./vplan.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override `server.bind_addr`
    #[arg(long)]
    bind: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print an scrypt hash for an `auth.users` entry
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::HashPassword { password } => {
            println!("{}", hash_password(&password)?);
            Ok(())
        },
        Command::Serve => {
            let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
            if let Some(bind) = cli.bind {
                settings.server.bind_addr = bind;
            }
            serve(settings).await
        },
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    init_tracing(&settings.log_level);

    let addr = settings.server.bind_addr;
    let state = Arc::new(
        AppState::from_settings(settings)
            .context("initialising application state")?,
    );
    tracing::info!(
        provider = state.auth.name(),
        database = %state.settings.database.path.display(),
        "state ready"
    );

    let maintenance = spawn_maintenance(Arc::clone(&state), CLEANUP_INTERVAL);
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
