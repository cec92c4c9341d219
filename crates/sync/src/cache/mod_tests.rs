// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::cache::merge::{merge, record};
use crate::test_support::FakeRest;

const WINDOW: Duration = Duration::from_secs(30);

fn channels() -> CachedData {
    let rows = vec![record(json!({"id": 1, "state": "ok"})), record(json!({"id": 2, "state": "ok"}))];
    CachedData::List(ListPage::from_records(rows, "id"))
}

#[test]
fn query_key_display() {
    assert_eq!(QueryKey::all(EntityKind::Channel).to_string(), "channel");
    assert_eq!(QueryKey::page(EntityKind::Source, 3).to_string(), "source?page=3");
    assert_eq!(QueryKey::detail(EntityKind::Artery, EntityKey::Int(9)).to_string(), "artery/9");
    assert_eq!(QueryKey::series(EntityKey::from("ch-1")).to_string(), "bandwidth@ch-1");
}

#[test]
fn every_event_kind_feeds_some_cache() {
    for event in EventKind::ALL {
        assert!(
            EntityKind::ALL.iter().any(|k| k.events().contains(&event)),
            "{event} is consumed by no entity kind"
        );
    }
}

#[tokio::test]
async fn seed_then_get_and_broadcast() -> anyhow::Result<()> {
    let cache = QueryCache::new();
    let mut changes = cache.subscribe_changes();
    let key = QueryKey::all(EntityKind::Channel);

    assert!(cache.get(&key).is_none());
    cache.seed(key.clone(), channels());

    assert_eq!(cache.get(&key).as_deref(), Some(&channels()));
    assert_eq!(changes.recv().await?, CacheChange { key, source: ChangeSource::Seed });
    Ok(())
}

#[tokio::test]
async fn apply_replaces_only_changed_entries() -> anyhow::Result<()> {
    let cache = QueryCache::new();
    let all = QueryKey::all(EntityKind::Channel);
    let other = QueryKey::page(EntityKind::Channel, 2);
    cache.seed(all.clone(), channels());
    cache.seed(other.clone(), CachedData::List(ListPage::default()));
    cache.seed(QueryKey::all(EntityKind::Source), channels());
    let mut changes = cache.subscribe_changes();
    let untouched = cache.get(&other);

    let id = EntityKey::Int(2);
    let fields = record(json!({"state": "down"}));
    let patch = Patch { key: &id, key_field: "id", fields: &fields };
    let changed = cache.apply(EntityKind::Channel, |_, data| merge(MergeStrategy::UpsertList, data, patch));
    assert_eq!(changed, 1);

    assert_eq!(changes.recv().await?, CacheChange { key: all.clone(), source: ChangeSource::Event });
    assert!(changes.try_recv().is_err());

    match (untouched, cache.get(&other)) {
        (Some(before), Some(after)) => assert!(Arc::ptr_eq(&before, &after)),
        _ => anyhow::bail!("page entry missing"),
    }
    let row = cache.get(&all).and_then(|d| d.find("id", &id).cloned());
    assert_eq!(row, Some(record(json!({"id": 2, "state": "down"}))));

    // Same kind only: the source list holding id 2 is not touched.
    let source = cache.get(&QueryKey::all(EntityKind::Source));
    assert_eq!(source.as_deref(), Some(&channels()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn entries_go_stale_after_window() {
    let cache = QueryCache::new();
    let key = QueryKey::all(EntityKind::Channel);
    cache.seed(key.clone(), channels());
    assert!(cache.stale_keys(WINDOW).is_empty());

    tokio::time::advance(WINDOW).await;
    assert_eq!(cache.stale_keys(WINDOW), vec![key]);
}

#[tokio::test(start_paused = true)]
async fn invalidate_marks_stale_immediately() {
    let cache = QueryCache::new();
    let a = QueryKey::all(EntityKind::Channel);
    let b = QueryKey::detail(EntityKind::Channel, EntityKey::Int(1));
    cache.seed(a.clone(), channels());
    cache.seed(b.clone(), CachedData::Scalar(record(json!({"id": 1}))));
    cache.seed(QueryKey::all(EntityKind::Source), channels());

    assert!(cache.invalidate(&a));
    assert!(!cache.invalidate(&QueryKey::all(EntityKind::Alert)));
    assert_eq!(cache.stale_keys(WINDOW), vec![a.clone()]);

    assert_eq!(cache.invalidate_kind(EntityKind::Channel), 2);
    let mut stale = cache.stale_keys(WINDOW);
    stale.sort_by_key(|k| k.to_string());
    assert_eq!(stale, vec![a, b]);
}

#[tokio::test(start_paused = true)]
async fn load_fetches_missing_then_serves_fresh() -> anyhow::Result<()> {
    let cache = QueryCache::new();
    let rest = FakeRest::new();
    rest.set_rows(EntityKind::Channel, vec![record(json!({"id": 1, "state": "ok"}))]);
    let key = QueryKey::all(EntityKind::Channel);

    let first = cache.load(&key, rest.as_ref(), WINDOW).await?;
    let second = cache.load(&key, rest.as_ref(), WINDOW).await?;
    assert_eq!(rest.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.len(), 1);

    tokio::time::advance(WINDOW).await;
    let third = cache.load(&key, rest.as_ref(), WINDOW).await?;
    assert_eq!(rest.calls(), 2);
    assert!(!Arc::ptr_eq(&first, &third));
    Ok(())
}

#[tokio::test]
async fn failed_load_keeps_previous_snapshot() -> anyhow::Result<()> {
    let cache = QueryCache::new();
    let rest = FakeRest::new();
    let key = QueryKey::all(EntityKind::Channel);
    cache.seed(key.clone(), channels());
    cache.invalidate(&key);
    rest.set_failing(true);

    assert!(cache.load(&key, rest.as_ref(), WINDOW).await.is_err());
    assert_eq!(cache.get(&key).as_deref(), Some(&channels()));
    assert!(cache.entry(&key).is_some_and(|e| e.invalidated));
    Ok(())
}

#[test]
fn remove_and_clear() {
    let cache = QueryCache::default();
    cache.seed(QueryKey::all(EntityKind::Channel), channels());
    cache.seed(QueryKey::all(EntityKind::Source), channels());
    assert_eq!(cache.len(), 2);

    assert!(cache.remove(&QueryKey::all(EntityKind::Channel)).is_some());
    assert!(!cache.contains(&QueryKey::all(EntityKind::Channel)));
    cache.clear();
    assert!(cache.is_empty());
}
