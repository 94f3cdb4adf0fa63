use std::net::SocketAddr;

use eclipse::config::init_config;
use eclipse::engine::{EngineConfig, LicenseEngine};
use eclipse::errors::{LicenseError, LicenseResult};
use eclipse::logging::init_tracing;
use eclipse::server::{build_router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> LicenseResult<()> {
    let config = init_config()?;
    init_tracing(&config.logging);

    let engine = LicenseEngine::in_memory(EngineConfig::from(&config.license));
    let app = build_router(AppState::new(engine));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| LicenseError::ConfigError(format!("invalid listen address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LicenseError::ConfigError(format!("failed to bind {addr}: {e}")))?;

    info!("Eclipse license server listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| LicenseError::StorageError(format!("server error: {e}")))
}
