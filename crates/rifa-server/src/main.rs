// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use rifa_registry::{RegistryConfig, TicketRegistry};
use rifa_server::{build_router, AppState, ServerConfig};
use rifa_store::{DocumentStore, MemoryStore, RestStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cfg = ServerConfig::from_env();
    init_tracing(cfg.log_json);

    let store: Arc<dyn DocumentStore> = match &cfg.store_url {
        Some(url) => Arc::new(RestStore::new(
            url.clone(),
            cfg.store_bearer.clone(),
            cfg.retry.clone(),
            cfg.store_allow_private_hosts,
        )),
        None => Arc::new(MemoryStore::default()),
    };
    info!("board store backend={}", store.backend_tag());

    let registry = Arc::new(TicketRegistry::new(
        store,
        RegistryConfig {
            collection: cfg.collection.clone(),
            op_timeout: cfg.op_timeout,
            poll_interval: cfg.poll_interval,
            ..RegistryConfig::default()
        },
    ));
    let state = AppState::new(registry.clone());

    // Ready only after the first full snapshot has arrived, the same
    // gate the board UI put on its loading screen.
    let ready = state.ready.clone();
    let registry_bg = registry.clone();
    tokio::spawn(async move {
        registry_bg.wait_ready().await;
        ready.store(true, Ordering::Relaxed);
        info!("first board snapshot loaded");
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&cfg.bind_addr)
        .await
        .map_err(|e| format!("bind failed on {}: {e}", cfg.bind_addr))?;
    info!("rifa-server listening on {}", cfg.bind_addr);

    let drain = cfg.shutdown_drain;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received, draining");
            tokio::time::sleep(drain).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
