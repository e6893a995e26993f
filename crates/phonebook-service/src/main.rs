mod failure;
mod routes;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use phonebook_core::ContactRepository;
use phonebook_store_sqlite::{ConnectionString, SqliteContactStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::routes::{app, frontend_bundle, ServiceState};

const DEFAULT_LOG_FILTER: &str =
    "phonebook_service=info,phonebook_store_sqlite=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "phonebook-service")]
#[command(about = "HTTP service for the phonebook")]
struct Args {
    #[arg(long, env = "PHONEBOOK_DATABASE_URL", default_value = "./phonebook.sqlite3")]
    database_url: String,
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,
    #[arg(long, env = "PHONEBOOK_FRONTEND_DIR", default_value = "dist")]
    frontend_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let connection = ConnectionString::parse(&args.database_url)?;
    let store = Arc::new(SqliteContactStore::open(&connection)?);
    store.migrate()?;

    let frontend_dir = frontend_bundle(&args.frontend_dir);
    if let Some(dir) = &frontend_dir {
        info!(dir = %dir.display(), "serving frontend bundle");
    } else {
        info!(dir = %args.frontend_dir.display(), "no frontend bundle found");
    }

    let contacts: Arc<dyn ContactRepository> = store.clone();
    let state = ServiceState::new(contacts, frontend_dir);

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on port {}", args.port);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Ok(store) = Arc::try_unwrap(store) {
        store.close()?;
    } else {
        warn!("contact store still referenced at shutdown; dropping without close");
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
