#[cfg(not(target_arch = "wasm32"))]
use formwidget::config::ServerConfig;
#[cfg(not(target_arch = "wasm32"))]
use formwidget::server::{self, AppState};
#[cfg(not(target_arch = "wasm32"))]
use tracing_subscriber::EnvFilter;

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = ServerConfig::from_env()?;
    if config.widget.allowed_origins.is_empty() {
        tracing::warn!("FORMWIDGET_ALLOWED_ORIGINS unset; widgets will relay messages from any origin");
    }
    if !config.pkg_root.exists() {
        tracing::warn!(pkg_root = ?config.pkg_root, "wasm package directory missing; /pkg will 404");
    }

    let addr = config.bind_addr;
    let state = AppState::new(config);
    tracing::info!(%addr, "starting formwidget server");
    server::run(addr, state).await?;
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

// The wasm build is a library loaded by `formwidget.js`.
#[cfg(target_arch = "wasm32")]
fn main() {}
