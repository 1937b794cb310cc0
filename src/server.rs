use crate::api;
use crate::config::ServerConfig;
use crate::endpoint::EndpointTable;
use axum::Router;
use axum::routing::get;
use http::{HeaderValue, header};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub endpoints: Arc<EndpointTable>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            endpoints: Arc::new(EndpointTable::default()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let pkg = ServeDir::new(&state.config.pkg_root);
    let enable_cors = state.config.enable_cors;
    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/formwidget.js", get(api::serve_loader))
        .route("/demo", get(api::demo_page))
        .route("/api/widget/endpoint", get(api::resolve_endpoint))
        .route("/api/widget/iframe-src", get(api::build_iframe_src))
        .nest_service("/pkg", pkg)
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());
    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down formwidget server");
}
