//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::config::TlsConfig;
use crate::state::AppState;
use crate::ws;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/entities", get(api::list_entities))
        .route("/api/entities/{id}", get(api::get_entity).post(api::set_entity))
        .route("/api/climate", get(api::list_climates))
        .route("/api/snapshot", get(api::get_snapshot))
        .route("/api/components", get(api::get_components))
        .route("/api/poll", post(api::trigger_poll))
        .route("/api/config", get(api::get_config))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the web server (HTTP or HTTPS depending on config)
pub async fn run(state: Arc<AppState>, bind: &str, tls: Option<&TlsConfig>) -> Result<()> {
    let app = router(state.clone());

    // Start polling in background
    let poller = state.poller.clone();
    tokio::spawn(async move {
        poller.run().await;
    });

    if let Some(tls_config) = tls {
        run_https(app, bind, tls_config).await
    } else {
        run_http(app, bind).await
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    if !cert_path.exists() {
        anyhow::bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        anyhow::bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
