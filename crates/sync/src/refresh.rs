// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background refetch of stale cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::QueryCache;
use crate::rest::RestSource;

/// Spawn a task that refetches entries older than `stale_window` every
/// `interval` until `cancel` fires. Failed refetches keep the previous
/// snapshot and are retried on the next tick.
pub fn spawn_refresher(
    cache: Arc<QueryCache>,
    rest: Arc<dyn RestSource>,
    stale_window: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            refresh_stale(&cache, rest.as_ref(), stale_window).await;
        }
    })
}

/// Refetch every stale entry once. Returns how many refetches succeeded.
pub async fn refresh_stale(cache: &QueryCache, rest: &dyn RestSource, stale_window: Duration) -> usize {
    let mut refreshed = 0;
    for key in cache.stale_keys(stale_window) {
        match cache.refetch(&key, rest).await {
            Ok(_) => refreshed += 1,
            Err(e) => tracing::debug!(query = %key, err = %e, "refetch failed"),
        }
    }
    refreshed
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
