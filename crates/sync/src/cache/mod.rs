// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query-addressable cache of REST results, patched in place by events.

pub mod merge;
pub mod sync;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::event::{EntityKey, EventKind};
use crate::rest::{self, RestSource};

pub use merge::{CachedData, ListPage, MergeStrategy, Patch};
pub use sync::Synchronizer;

// -- Keys --------------------------------------------------------------------

/// Kinds of cached collections, one synchronizer each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Channel,
    Artery,
    Source,
    Destination,
    Dashboard,
    Bandwidth,
    Alert,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::Channel,
        Self::Artery,
        Self::Source,
        Self::Destination,
        Self::Dashboard,
        Self::Bandwidth,
        Self::Alert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Artery => "artery",
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Dashboard => "dashboard",
            Self::Bandwidth => "bandwidth",
            Self::Alert => "alert",
        }
    }

    /// Event kinds whose payloads patch this kind's cache entries.
    pub fn events(&self) -> &'static [EventKind] {
        match self {
            Self::Channel | Self::Artery | Self::Dashboard => {
                &[EventKind::ChannelStatusUpdate, EventKind::FaultEvent]
            }
            Self::Source => &[EventKind::SourceStatusUpdate],
            Self::Destination => &[EventKind::DestinationStatusUpdate],
            Self::Bandwidth => &[EventKind::BandwidthAlert],
            Self::Alert => &[EventKind::SystemAlert],
        }
    }

    /// Field that identifies a cached record of this kind.
    pub fn key_field(&self) -> &'static str {
        match self {
            Self::Bandwidth => "timestamp",
            _ => "id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slice of a kind a query holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The default (unpaginated) list, or the whole feed/aggregate.
    All,
    /// One page of a paginated list.
    Page(u32),
    /// A single entity (detail view).
    Id(EntityKey),
    /// A time series scoped to one channel.
    Series(EntityKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: EntityKind,
    pub scope: Scope,
}

impl QueryKey {
    pub fn new(kind: EntityKind, scope: Scope) -> Self {
        Self { kind, scope }
    }

    pub fn all(kind: EntityKind) -> Self {
        Self::new(kind, Scope::All)
    }

    pub fn page(kind: EntityKind, page: u32) -> Self {
        Self::new(kind, Scope::Page(page))
    }

    pub fn detail(kind: EntityKind, id: impl Into<EntityKey>) -> Self {
        Self::new(kind, Scope::Id(id.into()))
    }

    pub fn series(channel: impl Into<EntityKey>) -> Self {
        Self::new(EntityKind::Bandwidth, Scope::Series(channel.into()))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::All => write!(f, "{}", self.kind),
            Scope::Page(n) => write!(f, "{}?page={n}", self.kind),
            Scope::Id(id) => write!(f, "{}/{id}", self.kind),
            Scope::Series(ch) => write!(f, "{}@{ch}", self.kind),
        }
    }
}

// -- Entries -----------------------------------------------------------------

/// A materialized query.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<CachedData>,
    pub fetched_at: Instant,
    pub invalidated: bool,
}

impl CacheEntry {
    pub fn is_stale(&self, window: Duration, now: Instant) -> bool {
        self.invalidated || now.saturating_duration_since(self.fetched_at) >= window
    }
}

/// Why a cached entry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Seed,
    Event,
}

/// Broadcast to reactive consumers whenever an entry is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChange {
    pub key: QueryKey,
    pub source: ChangeSource,
}

// -- Cache -------------------------------------------------------------------

/// Shared query cache.
///
/// Readers get `Arc` snapshots and never block writers for longer than a
/// map lookup. Writes replace whole snapshots.
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    changes: broadcast::Sender<CacheChange>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { entries: RwLock::new(HashMap::new()), changes }
    }

    /// Subscribe to entry replacements.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }

    /// Current snapshot for `key`, if materialized.
    pub fn get(&self, key: &QueryKey) -> Option<Arc<CachedData>> {
        self.entries.read().get(key).map(|e| Arc::clone(&e.data))
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Store an authoritative result, replacing whatever was cached.
    pub fn seed(&self, key: QueryKey, data: CachedData) {
        let entry = CacheEntry { data: Arc::new(data), fetched_at: Instant::now(), invalidated: false };
        self.entries.write().insert(key.clone(), entry);
        let _ = self.changes.send(CacheChange { key, source: ChangeSource::Seed });
    }

    /// Mark an entry for refetch on its next load or refresh tick.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        match self.entries.write().get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        }
    }

    /// Mark every entry of `kind` for refetch.
    pub fn invalidate_kind(&self, kind: EntityKind) -> usize {
        let mut entries = self.entries.write();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.kind == kind {
                entry.invalidated = true;
                count += 1;
            }
        }
        count
    }

    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Keys of entries that are invalidated or older than `window`.
    pub fn stale_keys(&self, window: Duration) -> Vec<QueryKey> {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_stale(window, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Run `step` against every materialized entry of `kind` and keep the
    /// snapshots it returns. Returns how many entries changed.
    ///
    /// `step` must return its input `Arc` to signal "unchanged". The write
    /// lock is held for the whole pass so concurrent readers see either all
    /// of an event's effects or none of them.
    pub fn apply<F>(&self, kind: EntityKind, mut step: F) -> usize
    where
        F: FnMut(&QueryKey, &Arc<CachedData>) -> Arc<CachedData>,
    {
        let mut changed = Vec::new();
        {
            let mut entries = self.entries.write();
            for (key, entry) in entries.iter_mut().filter(|(k, _)| k.kind == kind) {
                let next = step(key, &entry.data);
                if !Arc::ptr_eq(&next, &entry.data) {
                    entry.data = next;
                    changed.push(key.clone());
                }
            }
        }
        for key in &changed {
            let _ = self.changes.send(CacheChange { key: key.clone(), source: ChangeSource::Event });
        }
        changed.len()
    }

    /// Fresh snapshot for `key`, fetching and seeding it through `rest` when
    /// it is missing or stale.
    pub async fn load(
        &self,
        key: &QueryKey,
        rest: &dyn RestSource,
        window: Duration,
    ) -> anyhow::Result<Arc<CachedData>> {
        if let Some(entry) = self.entry(key) {
            if !entry.is_stale(window, Instant::now()) {
                return Ok(entry.data);
            }
        }
        self.refetch(key, rest).await
    }

    /// Unconditionally fetch `key` and seed the result.
    pub async fn refetch(&self, key: &QueryKey, rest: &dyn RestSource) -> anyhow::Result<Arc<CachedData>> {
        let data = rest::fetch_query(rest, key).await?;
        self.seed(key.clone(), data);
        self.get(key).ok_or_else(|| anyhow::anyhow!("entry {key} vanished after seed"))
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
