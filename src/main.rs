//! Last Words Match Server
//!
//! Serves the session engine over WebSocket with an in-memory store.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use last_words::{
    VERSION,
    config::ServerConfig,
    game::ModuleRegistry,
    network::{GameServer, LocalPushChannel, SessionService},
    store::MemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = ServerConfig::from_env().context("loading configuration")?;
    info!("Last Words Server v{}", VERSION);

    let registry = Arc::new(ModuleRegistry::builtin());
    info!("Modules: {:?}", registry.keys().collect::<Vec<_>>());

    let store = Arc::new(MemoryStore::new());
    let push = Arc::new(LocalPushChannel::new(config.outbound_capacity));
    let service = SessionService::new(
        config.session.clone(),
        registry,
        store.clone(),
        store.clone(),
        push.clone(),
    );

    if let Some(modules) = &config.bootstrap_match {
        let record = service
            .create_match(service.fresh_match(modules.clone(), Vec::new()))
            .await
            .context("creating bootstrap match")?;
        info!("Bootstrap match ready: {}", record.id);
    }

    let server = Arc::new(GameServer::new(config, service, push, store));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_server.shutdown();
        }
    });

    server.run().await.context("server terminated")?;
    info!("Server stopped");
    Ok(())
}
