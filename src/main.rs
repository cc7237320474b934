use habit_tracker::models::Notice;
use habit_tracker::{router, AppConfig, AppState, Controller, SupabaseGateway};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    let gateway = SupabaseGateway::from_config(&config).await?;
    let state = AppState::new(Controller::new(Arc::new(gateway)));

    match state.controller.startup().await {
        Ok(Some(user)) => info!("restored session for user {}", user.id),
        Ok(None) => info!("no stored session, waiting for sign-in"),
        Err(err) => {
            error!("failed to restore session: {err}");
            state
                .flash(Notice::error(format!("Could not restore your session: {err}")))
                .await;
        }
    }

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
