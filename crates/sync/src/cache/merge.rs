// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The merge algorithm shared by every cached entity kind.
//!
//! Snapshots are immutable behind `Arc`. A merge that changes nothing hands
//! back the same `Arc`; a merge that changes something builds a new snapshot,
//! so a reader holding the previous one never observes a partial update.

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::event::{EntityKey, Record};

/// How an event patch is applied to a cached snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Merge into the matching row of a list; ignore unknown ids.
    UpsertList,
    /// Merge into a single detail record; ignore if it is another entity.
    UpsertScalar,
    /// Merge by exact timestamp, else insert keeping ascending order.
    /// Oldest points beyond `capacity` are dropped.
    TimeSeries { capacity: Option<usize> },
    /// Merge by key, else insert newest-first. Only the alert feed uses this.
    AppendFeed { capacity: usize },
}

/// Rows of one list query, keyed by entity id in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub rows: IndexMap<EntityKey, Record>,
    pub page: Option<u32>,
    pub total: Option<u64>,
}

impl ListPage {
    /// Key rows by `key_field`. Rows without a usable key cannot be targeted
    /// by events and are left out.
    pub fn from_records(records: Vec<Record>, key_field: &str) -> Self {
        let mut rows = IndexMap::with_capacity(records.len());
        for record in records {
            match record.get(key_field).and_then(EntityKey::from_value) {
                Some(key) => {
                    rows.insert(key, record);
                }
                None => tracing::debug!(key_field, "skipping row without key"),
            }
        }
        Self { rows, page: None, total: None }
    }
}

/// One cached query result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedData {
    List(ListPage),
    Scalar(Record),
    Series(Vec<Record>),
    Feed(Vec<Record>),
}

impl CachedData {
    /// Number of rows (1 for a scalar).
    pub fn len(&self) -> usize {
        match self {
            Self::List(page) => page.rows.len(),
            Self::Scalar(_) => 1,
            Self::Series(rows) | Self::Feed(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the row whose `key_field` equals `key`.
    pub fn find(&self, key_field: &str, key: &EntityKey) -> Option<&Record> {
        match self {
            Self::List(page) => page.rows.get(key),
            Self::Scalar(record) => Some(record).filter(|r| key.matches(r.get(key_field))),
            Self::Series(rows) | Self::Feed(rows) => {
                rows.iter().find(|r| key.matches(r.get(key_field)))
            }
        }
    }
}

/// An event reduced to what the merge needs.
#[derive(Debug, Clone, Copy)]
pub struct Patch<'a> {
    pub key: &'a EntityKey,
    /// Field holding the key inside cached records.
    pub key_field: &'a str,
    /// Fields to shallow-merge. Never contains the key field.
    pub fields: &'a Record,
}

/// Apply `patch` to `current` with `strategy`.
///
/// Returns `current` itself (pointer-equal) when nothing changed: a miss, a
/// patch whose values are already present, or a strategy that does not fit
/// the snapshot's shape.
pub fn merge(strategy: MergeStrategy, current: &Arc<CachedData>, patch: Patch<'_>) -> Arc<CachedData> {
    let next = match (strategy, current.as_ref()) {
        (MergeStrategy::UpsertList, CachedData::List(page)) => upsert_list(page, patch),
        (MergeStrategy::UpsertScalar, CachedData::Scalar(record)) => upsert_scalar(record, patch),
        (MergeStrategy::TimeSeries { capacity }, CachedData::Series(rows)) => {
            upsert_series(rows, patch, capacity)
        }
        (MergeStrategy::AppendFeed { capacity }, CachedData::Feed(rows)) => {
            append_feed(rows, patch, capacity)
        }
        (strategy, _) => {
            tracing::debug!(?strategy, "strategy does not fit cached shape");
            None
        }
    };
    match next {
        Some(data) => Arc::new(data),
        None => Arc::clone(current),
    }
}

/// Shallow-merge `fields` into `target`, skipping `key_field`. Returns whether
/// any value changed.
fn shallow_merge(target: &mut Record, fields: &Record, key_field: &str) -> bool {
    let mut changed = false;
    for (name, value) in fields {
        if name == key_field {
            continue;
        }
        if target.get(name) != Some(value) {
            target.insert(name.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

fn would_change(target: &Record, fields: &Record, key_field: &str) -> bool {
    fields.iter().any(|(name, value)| name != key_field && target.get(name) != Some(value))
}

fn upsert_list(page: &ListPage, patch: Patch<'_>) -> Option<CachedData> {
    let row = page.rows.get(patch.key)?;
    if !would_change(row, patch.fields, patch.key_field) {
        return None;
    }
    let mut next = page.clone();
    if let Some(row) = next.rows.get_mut(patch.key) {
        shallow_merge(row, patch.fields, patch.key_field);
    }
    Some(CachedData::List(next))
}

fn upsert_scalar(record: &Record, patch: Patch<'_>) -> Option<CachedData> {
    if !patch.key.matches(record.get(patch.key_field)) {
        return None;
    }
    let mut next = record.clone();
    shallow_merge(&mut next, patch.fields, patch.key_field).then_some(CachedData::Scalar(next))
}

fn series_order(a: &Record, b: &Record, key_field: &str) -> Ordering {
    record_key(a, key_field).cmp(&record_key(b, key_field))
}

/// Build a full record from the patch: its fields plus the key.
fn materialize(patch: Patch<'_>) -> Record {
    let mut record = patch.fields.clone();
    record.insert(patch.key_field.to_owned(), patch.key.to_value());
    record
}

fn upsert_series(rows: &[Record], patch: Patch<'_>, capacity: Option<usize>) -> Option<CachedData> {
    let mut next = rows.to_vec();
    match next.iter_mut().find(|r| patch.key.matches(r.get(patch.key_field))) {
        Some(row) => {
            if !shallow_merge(row, patch.fields, patch.key_field) {
                return None;
            }
        }
        None => {
            next.push(materialize(patch));
            next.sort_by(|a, b| series_order(a, b, patch.key_field));
        }
    }
    if let Some(cap) = capacity {
        let excess = next.len().saturating_sub(cap);
        next.drain(..excess);
    }
    Some(CachedData::Series(next))
}

fn append_feed(rows: &[Record], patch: Patch<'_>, capacity: usize) -> Option<CachedData> {
    let mut next = rows.to_vec();
    match next.iter_mut().find(|r| patch.key.matches(r.get(patch.key_field))) {
        Some(row) => {
            if !shallow_merge(row, patch.fields, patch.key_field) {
                return None;
            }
        }
        None => {
            next.insert(0, materialize(patch));
            next.truncate(capacity);
        }
    }
    Some(CachedData::Feed(next))
}

/// Read the key of a cached record.
pub fn record_key(record: &Record, key_field: &str) -> Option<EntityKey> {
    record.get(key_field).and_then(EntityKey::from_value)
}

/// Convenience for building records in tests and seeds.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
