// HeroDraft server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Load the hero catalog
// 4. Build the roster and session manager
// 5. Bind the WebSocket listener and serve until shutdown

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use herodraft::catalog::HeroCatalog;
use herodraft::config;
use herodraft::roster::StaticRoster;
use herodraft::session::SessionManager;
use herodraft::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("HeroDraft server starting up");

    // 2. Load config (path from the first CLI argument, default ./herodraft.toml)
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("herodraft.toml"));
    let config = config::load_config(&config_path).context("failed to load configuration")?;
    info!(
        "Config loaded from {}: {} draft(s), port {}",
        config_path.display(),
        config.drafts.len(),
        config.server.port
    );

    // 3. Load the hero catalog
    let catalog_file = config::catalog_path(&config, &config_path);
    let catalog = HeroCatalog::load(&catalog_file).context("failed to load hero catalog")?;
    info!(
        "Hero catalog loaded from {}: {} heroes",
        catalog_file.display(),
        catalog.len()
    );

    // 4. Build the roster and session manager
    let roster = StaticRoster::new(config.drafts.iter().map(|d| d.to_roster()));
    let manager = Arc::new(SessionManager::new(
        Arc::new(catalog),
        Arc::new(roster),
        config.timers.to_policy(),
        config.server.admin_token.clone(),
    ));

    // 5. Bind and serve
    let listener = TcpListener::bind(("127.0.0.1", config.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.port))?;

    let server = tokio::spawn(ws_server::run(listener, manager));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    server.abort();
    if let Ok(Err(e)) = server.await {
        error!("WebSocket server error: {e}");
    }

    info!("HeroDraft server shut down cleanly");
    Ok(())
}

/// Initialize tracing to stderr with env-filter support
/// (`RUST_LOG=herodraft=debug` etc.).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("herodraft=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
