//! `manga-server` binary — a thin CLI shell over the [`manga_server`] library crate.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use manga_server::config::InstanceConfig;
use manga_server::db::Catalog;
use manga_server::{http, AppState};

/// Self-hosted manga library server.
#[derive(Parser)]
#[command(name = "manga-server", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Instance directory holding the catalog database, cover cache, and
    /// backups (default: `$MANGA_HOME`, else a platform data directory).
    #[arg(long)]
    instance_dir: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, default_value_t = 8780)]
    port: u16,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions for this CLI.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("manga_server=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "manga-server", &mut std::io::stdout());
        return;
    }

    let instance_dir = cli.instance_dir.unwrap_or_else(InstanceConfig::resolve_default);
    let config = InstanceConfig::new(instance_dir);
    info!(profile = config.profile.as_str(), instance_dir = %config.instance_dir.display(), "starting manga-server");

    if let Err(e) = config.ensure_dirs() {
        error!(error = %e, "failed to create instance directories");
        std::process::exit(1);
    }

    let db = match Catalog::open(&config.db_path()) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %config.db_path().display(), "failed to open catalog database");
            std::process::exit(1);
        }
    };

    let state = match AppState::new(db, config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to initialize application state");
            std::process::exit(1);
        }
    };

    let app = http::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = addr.as_str(), error = %e, "could not bind to address");
            std::process::exit(1);
        }
    };

    info!(addr = addr.as_str(), "listening");
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "server exited with error");
    }
}
