// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-kind synchronizers: subscribe to events and patch cached queries.

use std::sync::Arc;

use crate::cache::merge::{merge, MergeStrategy, Patch};
use crate::cache::{EntityKind, QueryCache, Scope};
use crate::event::ServerEvent;
use crate::registry::{callback, Subscription, SubscriptionRegistry};

/// Size bounds for the growing collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacities {
    /// Points kept per bandwidth series; `None` is unbounded.
    pub series: Option<usize>,
    /// Entries kept in the alert feed.
    pub alerts: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self { series: Some(300), alerts: 50 }
    }
}

/// Keeps every cached query of one entity kind in step with pushed events.
pub struct Synchronizer {
    kind: EntityKind,
    cache: Arc<QueryCache>,
    capacities: Capacities,
}

impl Synchronizer {
    pub fn new(kind: EntityKind, cache: Arc<QueryCache>, capacities: Capacities) -> Self {
        Self { kind, cache, capacities }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Merge strategy for a query of this kind with `scope`.
    pub fn strategy(&self, scope: &Scope) -> MergeStrategy {
        match (self.kind, scope) {
            (EntityKind::Bandwidth, _) => MergeStrategy::TimeSeries { capacity: self.capacities.series },
            (EntityKind::Alert, _) => MergeStrategy::AppendFeed { capacity: self.capacities.alerts },
            (_, Scope::Id(_)) => MergeStrategy::UpsertScalar,
            _ => MergeStrategy::UpsertList,
        }
    }

    /// Patch every materialized query of this kind with `event`. Returns the
    /// number of entries that changed; events this kind does not consume and
    /// events for entities nobody has cached change nothing.
    pub fn apply(&self, event: &ServerEvent) -> usize {
        if !self.kind.events().contains(&event.kind()) {
            return 0;
        }

        let changed = match event {
            ServerEvent::BandwidthAlert(sample) => {
                let Some(channel) = &sample.channel else {
                    tracing::trace!(timestamp = %sample.timestamp, "bandwidth sample without channel");
                    return 0;
                };
                let patch = Patch {
                    key: &sample.timestamp,
                    key_field: self.kind.key_field(),
                    fields: &sample.fields,
                };
                self.cache.apply(self.kind, |key, data| match &key.scope {
                    Scope::Series(scoped) if scoped == channel => {
                        merge(self.strategy(&key.scope), data, patch)
                    }
                    _ => Arc::clone(data),
                })
            }
            ServerEvent::SystemAlert(alert) => {
                let patch = Patch { key: &alert.key, key_field: alert.key_field, fields: &alert.record };
                self.cache.apply(self.kind, |key, data| merge(self.strategy(&key.scope), data, patch))
            }
            ServerEvent::ChannelStatusUpdate(p)
            | ServerEvent::FaultEvent(p)
            | ServerEvent::SourceStatusUpdate(p)
            | ServerEvent::DestinationStatusUpdate(p) => {
                let patch = Patch { key: &p.id, key_field: self.kind.key_field(), fields: &p.fields };
                self.cache.apply(self.kind, |key, data| merge(self.strategy(&key.scope), data, patch))
            }
        };

        if changed == 0 {
            tracing::trace!(kind = %self.kind, event = %event.kind(), "no cached entry matched");
        }
        changed
    }

    /// Subscribe to every event kind this synchronizer consumes. Dropping the
    /// returned guards detaches it.
    pub fn attach(self: &Arc<Self>, registry: &Arc<SubscriptionRegistry>) -> Vec<Subscription> {
        self.kind
            .events()
            .iter()
            .map(|&event_kind| {
                let this = Arc::clone(self);
                let cb = callback(move |event| {
                    this.apply(event);
                    Ok(())
                });
                registry.subscribe_scoped(event_kind, cb)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
