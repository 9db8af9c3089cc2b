use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vaani_gateway::http::reqwest::default_dyn_transport;
use vaani_gateway::session::spawn_session_eviction;
use vaani_gateway::{AppState, GatewayConfig, build_client_from_config, build_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = GatewayConfig::from_env()
        .inspect_err(|err| error!(error = %err, "refusing to start"))?;
    let client = build_client_from_config(&config, default_dyn_transport()?)?;
    info!(providers = ?client.kinds(), default_model = %config.default_model, "providers configured");

    let state = AppState::from_config(&config, client);
    if let Some(ttl) = config.session_idle_ttl {
        spawn_session_eviction(state.sessions.clone(), ttl);
    }

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
