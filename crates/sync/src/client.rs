// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Root composition: one client session's registry, dispatcher, connection
//! and caches, wired together.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::cache::sync::{Capacities, Synchronizer};
use crate::cache::{CachedData, EntityKind, QueryCache, QueryKey};
use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionSettings, ListenerId};
use crate::dispatch::{Dispatcher, Notifier};
use crate::error::SyncError;
use crate::event::EventKind;
use crate::refresh::spawn_refresher;
use crate::registry::{Callback, Subscription, SubscriptionRegistry};
use crate::rest::RestSource;
use crate::transport::Connector;

/// Everything [`SyncClient::new`] needs that is not a collaborator.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connection: ConnectionSettings,
    pub capacities: Capacities,
    pub stale_window: Duration,
    pub refresh_interval: Duration,
}

impl From<&SyncConfig> for ClientSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            connection: config.connection_settings(),
            capacities: config.capacities(),
            stale_window: config.stale_window(),
            refresh_interval: config.refresh_interval(),
        }
    }
}

/// Collaborators supplied by the host application.
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub auth: Arc<dyn AuthProvider>,
    pub rest: Arc<dyn RestSource>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Default)]
struct Running {
    subscriptions: Vec<Subscription>,
    refresher: Option<(CancellationToken, JoinHandle<()>)>,
}

/// One client session's sync layer.
pub struct SyncClient {
    settings: ClientSettings,
    auth: Arc<dyn AuthProvider>,
    rest: Arc<dyn RestSource>,
    registry: Arc<SubscriptionRegistry>,
    connection: ConnectionManager,
    cache: Arc<QueryCache>,
    synchronizers: Vec<Arc<Synchronizer>>,
    running: Mutex<Running>,
}

impl SyncClient {
    pub fn new(settings: ClientSettings, collaborators: Collaborators) -> Self {
        let Collaborators { connector, auth, rest, notifier } = collaborators;
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), notifier));
        let connection = ConnectionManager::new(
            settings.connection.clone(),
            connector,
            Arc::clone(&auth),
            dispatcher,
        );
        let cache = Arc::new(QueryCache::new());
        let synchronizers = EntityKind::ALL
            .into_iter()
            .map(|kind| Arc::new(Synchronizer::new(kind, Arc::clone(&cache), settings.capacities)))
            .collect();

        Self {
            settings,
            auth,
            rest,
            registry,
            connection,
            cache,
            synchronizers,
            running: Mutex::new(Running::default()),
        }
    }

    /// Attach the synchronizers, start the refresher and open the event
    /// stream. Idempotent while running.
    pub fn start(&self) -> Result<(), SyncError> {
        if !self.auth.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }
        {
            let mut running = self.running.lock();
            if running.subscriptions.is_empty() {
                for sync in &self.synchronizers {
                    running.subscriptions.extend(sync.attach(&self.registry));
                }
            }
            if running.refresher.is_none() {
                let cancel = CancellationToken::new();
                let handle = spawn_refresher(
                    Arc::clone(&self.cache),
                    Arc::clone(&self.rest),
                    self.settings.stale_window,
                    self.settings.refresh_interval,
                    cancel.clone(),
                );
                running.refresher = Some((cancel, handle));
            }
        }
        tracing::info!(url = %self.settings.connection.url, "sync client starting");
        self.connection.connect();
        Ok(())
    }

    /// Close the event stream, detach the synchronizers and stop the
    /// refresher. The cache keeps its last snapshots.
    pub fn shutdown(&self) {
        self.connection.disconnect();
        let running = std::mem::take(&mut *self.running.lock());
        if let Some((cancel, _handle)) = running.refresher {
            cancel.cancel();
        }
        drop(running.subscriptions);
        tracing::info!("sync client stopped");
    }

    /// Manual retry after reconnects are exhausted.
    pub fn reconnect(&self) {
        self.connection.reconnect();
    }

    /// Load the default queries (every list, the dashboard and the alert
    /// feed) so events have something to patch. Returns how many loaded.
    pub async fn seed_defaults(&self) -> usize {
        let mut loaded = 0;
        for kind in EntityKind::ALL {
            if kind == EntityKind::Bandwidth {
                continue;
            }
            match self.load(&QueryKey::all(kind)).await {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!(kind = %kind, err = %e, "initial fetch failed"),
            }
        }
        loaded
    }

    /// Current snapshot for `key`, fetching it when missing or stale.
    pub async fn load(&self, key: &QueryKey) -> anyhow::Result<Arc<CachedData>> {
        self.cache.load(key, self.rest.as_ref(), self.settings.stale_window).await
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn on_connection_status<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.connection.on_connection_status(listener)
    }

    pub fn on_reconnect_exhausted<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.connection.on_reconnect_exhausted(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.connection.remove_listener(id)
    }

    pub fn subscribe(&self, kind: EventKind, cb: &Callback) {
        self.registry.subscribe(kind, cb);
    }

    pub fn unsubscribe(&self, kind: EventKind, cb: &Callback) -> bool {
        self.registry.unsubscribe(kind, cb)
    }

    pub fn subscribe_scoped(&self, kind: EventKind, cb: Callback) -> Subscription {
        self.registry.subscribe_scoped(kind, cb)
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.connection.disconnect();
        if let Some((cancel, _)) = self.running.get_mut().refresher.take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
