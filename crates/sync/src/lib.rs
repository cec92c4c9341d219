// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artery sync: real-time cache synchronization for the signal dashboard.
//!
//! One WebSocket event stream per client session is decoded, fanned out to
//! subscribers and merged into a query cache seeded from the REST API.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod refresh;
pub mod registry;
pub mod rest;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::{Arc, Once};

use tokio::sync::broadcast;

use crate::auth::StaticToken;
use crate::client::{ClientSettings, Collaborators, SyncClient};
use crate::config::SyncConfig;
use crate::dispatch::LogNotifier;
use crate::rest::HttpRestSource;
use crate::transport::WsConnector;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the sync client until ctrl-c.
pub async fn run(config: SyncConfig) -> anyhow::Result<()> {
    ensure_crypto();

    let auth = Arc::new(StaticToken::new(config.token.clone()));
    let rest = Arc::new(HttpRestSource::new(&config.url, auth.clone(), config.connect_timeout())?);
    let client = SyncClient::new(
        ClientSettings::from(&config),
        Collaborators {
            connector: Arc::new(WsConnector),
            auth,
            rest,
            notifier: Arc::new(LogNotifier),
        },
    );

    client.on_connection_status(|connected| {
        if connected {
            tracing::info!("live updates on");
        } else {
            tracing::warn!("live updates paused");
        }
    });
    client.on_reconnect_exhausted(|attempts| {
        tracing::error!(attempts, "live updates unavailable until reconnect");
    });

    // Log cache replacements as they happen.
    {
        let mut rx = client.cache().subscribe_changes();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        tracing::debug!(query = %change.key, source = ?change.source, "cache updated")
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });
    }

    let loaded = client.seed_defaults().await;
    tracing::info!(loaded, url = %config.url, "initial queries loaded");
    client.start()?;

    tokio::signal::ctrl_c().await?;
    client.shutdown();
    Ok(())
}
