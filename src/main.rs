use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_dispatch::georoute::HttpGeoRouter;
use delivery_dispatch::notify::LogNotifier;
use delivery_dispatch::{api, config, dispatch, error, state};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let geo = Arc::new(HttpGeoRouter::new(
        config.geocode_base_url.clone(),
        config.route_base_url.clone(),
    ));
    let http_port = config.http_port;

    let (app_state, ready_rx) = state::AppState::new(config, geo, Arc::new(LogNotifier));
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(dispatch::run_dispatch_engine(shared_state.clone(), ready_rx));

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
