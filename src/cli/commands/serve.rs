use anyhow::Context;
use std::sync::Arc;

use crate::config;
use crate::database;
use crate::handlers;
use crate::server::{app, AppState};

pub async fn handle(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = config::config().clone();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    tracing::info!("Starting ESS mobile API in {:?} mode", config.environment);

    let store = database::connect(&config.database)
        .await
        .context("failed to open document store")?;
    let table = handlers::endpoints().context("invalid endpoint table")?;
    tracing::info!("Registered {} endpoints on {} store", table.len(), store.backend());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(Arc::new(config), store, table);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("ESS mobile API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
