// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ledger_gateway::{
    api::router,
    config::{GatewayConfig, StoreBackend, LOG_FORMAT_ENV},
    state::AppState,
    storage::{FsObjectStore, MemoryObjectStore, ObjectStore, S3ObjectStore},
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(handle: axum_server::Handle<std::net::SocketAddr>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Required before any TLS operation, inbound or outbound
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::warn!("rustls crypto provider already installed");
    }

    let config = match GatewayConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let objects: Arc<dyn ObjectStore> = match &config.store_backend {
        StoreBackend::Filesystem(root) => {
            let store = FsObjectStore::new(root);
            if let Err(e) = store.initialize().await {
                tracing::error!(root = %root.display(), error = %e, "Failed to open credential bucket");
                std::process::exit(1);
            }
            tracing::info!(root = %root.display(), "Credential store ready");
            Arc::new(store)
        }
        StoreBackend::S3 { bucket, endpoint } => {
            let store = S3ObjectStore::connect(bucket.clone(), &config.region, endpoint.as_deref()).await;
            if let Err(e) = store.health_check().await {
                tracing::warn!(bucket = %bucket, error = %e, "Credential bucket not reachable yet");
            }
            tracing::info!(bucket = %bucket, "Credential store ready");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory credential store; enrollments are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    let state = match AppState::new(config.clone(), objects) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize token verification");
            std::process::exit(1);
        }
    };
    let app = router(state);

    let addr = config.bind_addr;
    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    let served = match &config.server_tls {
        Some(tls) => {
            let tls_config = match RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load server TLS certificate");
                    std::process::exit(1);
                }
            };
            tracing::info!(%addr, channel = %config.channel.channel_id, "Ledger gateway listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            tracing::info!(%addr, channel = %config.channel.channel_id, "Ledger gateway listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    if let Err(e) = served {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
