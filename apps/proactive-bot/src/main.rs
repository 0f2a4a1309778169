use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use proactive_bot::{
    AppState, BotConfig, HttpTriggerDispatcher, QueuedTriggerDispatcher, build_router,
    purge_interval, spawn_purge_task,
};
use proactive_core::{ConnectorClient, ConnectorCredentials};
use proactive_state::build_storage;
use proactive_telemetry::{install as init_telemetry, shutdown_telemetry};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry("proactive-bot")?;

    let config = BotConfig::from_env()?;
    let storage = build_storage(&config.storage).await?;
    if let Some(ttl) = config.storage.ttl {
        spawn_purge_task(Arc::clone(&storage), purge_interval(ttl));
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let connector = ConnectorClient::new(
        http.clone(),
        ConnectorCredentials::new(
            config.app_id.clone(),
            config.app_password.clone(),
            config.tenant_id.clone(),
        ),
        config.auth_base.clone(),
    );
    if config.app_id.is_empty() {
        warn!("MICROSOFT_APP_ID is not set; outbound calls are unauthenticated");
    }

    let (dispatcher, _worker) = QueuedTriggerDispatcher::spawn(Arc::new(
        HttpTriggerDispatcher::new(http, config.trigger_url.clone()),
    ));
    let state = AppState::new(
        config.app_id.clone(),
        Arc::new(connector),
        storage,
        Arc::new(dispatcher),
        config.delivery_timeout,
    );

    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "proactive-bot listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
