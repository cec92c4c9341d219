// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-type to callback registry.
//!
//! Callbacks are identified by `Arc` pointer identity: two closures with the
//! same body are still distinct subscribers, and unsubscribing one never
//! removes the other.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::event::{EventKind, ServerEvent};

/// A subscriber callback. Returning `Err` is logged by the dispatcher and
/// does not affect sibling callbacks.
pub type Callback = Arc<dyn Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered callback lists keyed by event kind.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<EventKind, Vec<Callback>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `cb` to the list for `kind`. Subscribing the same callback
    /// twice yields two entries.
    pub fn subscribe(&self, kind: EventKind, cb: &Callback) {
        self.entries.lock().entry(kind).or_default().push(Arc::clone(cb));
    }

    /// Remove the first entry for `kind` that is the same `Arc` as `cb`.
    ///
    /// Returns whether anything was removed; absent callbacks are a no-op.
    pub fn unsubscribe(&self, kind: EventKind, cb: &Callback) -> bool {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|c| Arc::ptr_eq(c, cb)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            entries.remove(&kind);
        }
        true
    }

    /// Subscribe and return a guard that unsubscribes when dropped.
    pub fn subscribe_scoped(self: &Arc<Self>, kind: EventKind, cb: Callback) -> Subscription {
        self.subscribe(kind, &cb);
        Subscription { registry: Arc::downgrade(self), kind, callback: cb }
    }

    /// Copy of the callback list for `kind` as of now.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Callback> {
        self.entries.lock().get(&kind).cloned().unwrap_or_default()
    }

    /// Number of active entries for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.entries.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of kinds with at least one subscriber.
    pub fn active_kinds(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Scoped registration; dropping it removes exactly this entry.
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    kind: EventKind,
    callback: Callback,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.kind, &self.callback);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("kind", &self.kind).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
