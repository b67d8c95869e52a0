/**
 * PIMON SERVER - Point d'entrée
 *
 * ROLE: .env → logging → config → sources → collectors → HTTP.
 * On Ctrl-C / SIGTERM the HTTP server drains, then every collector loop is
 * stopped and joined before the process exits.
 */

use anyhow::{Context, Result};
use pimon_server::{build_router, init_logging, load_config, start, Sources};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();
    init_logging();

    info!("PiMon server starting...");
    let config = load_config().await;
    let sources = Sources::real(&config)?;
    let (scheduler, app_state) = start(&config, sources);

    let app = build_router(app_state);
    let listener = TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.http.bind))?;
    info!("Listening on http://{}", config.http.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    scheduler.shutdown().await;
    info!("PiMon server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}
