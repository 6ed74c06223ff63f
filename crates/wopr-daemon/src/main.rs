//! `woprd`: the long-running WOPR daemon process.

use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;
use wopr_daemon::{bootstrap, spawn_cron, http, DaemonPaths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let home = wopr_config::resolve_home()?;
    let paths = DaemonPaths::new(home.clone());

    let state = Arc::new(bootstrap(home).await?);
    let now = chrono::Utc::now();
    let cron_cancel = spawn_cron(&state, now).await?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::fs::write(paths.port_file(), addr.port().to_string()).await?;
    tokio::fs::write(paths.pid_file(), std::process::id().to_string()).await?;
    tracing::info!(%addr, "woprd listening");

    let app = http::router(Arc::clone(&state));
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    cron_cancel.cancel();
    let _ = tokio::fs::remove_file(paths.pid_file()).await;
    let _ = tokio::fs::remove_file(paths.port_file()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
