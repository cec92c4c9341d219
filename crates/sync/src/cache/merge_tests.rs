// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;
use serde_json::json;

use super::*;

fn list(rows: Vec<Value>) -> Arc<CachedData> {
    let records = rows.into_iter().map(record).collect();
    Arc::new(CachedData::List(ListPage::from_records(records, "id")))
}

fn fields(value: Value) -> Record {
    record(value)
}

fn rows_of(data: &CachedData) -> Vec<Record> {
    match data {
        CachedData::List(page) => page.rows.values().cloned().collect(),
        CachedData::Scalar(r) => vec![r.clone()],
        CachedData::Series(rows) | CachedData::Feed(rows) => rows.clone(),
    }
}

// ── upsert list ───────────────────────────────────────────────────────

#[test]
fn upsert_list_changes_exactly_one_row() {
    let current = list(vec![
        json!({"id": 5, "name": "a", "status": "online"}),
        json!({"id": 6, "name": "b", "status": "online", "channelLink1Status": "online"}),
        json!({"id": 7, "name": "c", "status": "online"}),
    ]);
    let key = EntityKey::Int(6);
    let patch_fields = fields(json!({"channelLink1Status": "offline"}));
    let next =
        merge(MergeStrategy::UpsertList, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });

    assert!(!Arc::ptr_eq(&current, &next));
    assert_eq!(next.len(), current.len());

    let before = rows_of(&current);
    let after = rows_of(&next);
    let differing: Vec<_> = before.iter().zip(&after).filter(|(a, b)| a != b).collect();
    assert_eq!(differing.len(), 1);
    let changed = next.find("id", &key).cloned().unwrap_or_default();
    assert_eq!(changed["channelLink1Status"], "offline");
    assert_eq!(changed["name"], "b");
    assert_eq!(changed["status"], "online");
}

#[test]
fn upsert_list_miss_is_reference_unchanged() {
    let current = list(vec![json!({"id": 1, "status": "online"})]);
    let key = EntityKey::Int(99);
    let patch_fields = fields(json!({"status": "offline"}));
    let next =
        merge(MergeStrategy::UpsertList, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    assert!(Arc::ptr_eq(&current, &next));
}

#[test]
fn upsert_list_noop_patch_is_reference_unchanged() {
    let current = list(vec![json!({"id": 1, "status": "online"})]);
    let key = EntityKey::Int(1);
    let patch_fields = fields(json!({"status": "online"}));
    let next =
        merge(MergeStrategy::UpsertList, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    assert!(Arc::ptr_eq(&current, &next));
}

#[test]
fn upsert_list_preserves_row_order() {
    let current = list(vec![json!({"id": 3}), json!({"id": 1}), json!({"id": 2})]);
    let key = EntityKey::Int(1);
    let patch_fields = fields(json!({"status": "x"}));
    let next =
        merge(MergeStrategy::UpsertList, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    let CachedData::List(page) = next.as_ref() else {
        unreachable!("list stays a list");
    };
    let keys: Vec<_> = page.rows.keys().cloned().collect();
    assert_eq!(keys, vec![EntityKey::Int(3), EntityKey::Int(1), EntityKey::Int(2)]);
}

#[test]
fn from_records_skips_rows_without_key() {
    let page = ListPage::from_records(vec![record(json!({"name": "orphan"})), record(json!({"id": "x"}))], "id");
    assert_eq!(page.rows.len(), 1);
}

// ── upsert scalar ─────────────────────────────────────────────────────

#[test]
fn upsert_scalar_merges_matching_record() {
    let current = Arc::new(CachedData::Scalar(record(json!({"id": 4, "status": "idle", "name": "src"}))));
    let key = EntityKey::Int(4);
    let patch_fields = fields(json!({"status": "live"}));
    let next =
        merge(MergeStrategy::UpsertScalar, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    assert_eq!(rows_of(&next)[0]["status"], "live");
    assert_eq!(rows_of(&next)[0]["name"], "src");
}

#[test]
fn upsert_scalar_other_entity_is_noop() {
    let current = Arc::new(CachedData::Scalar(record(json!({"id": 4, "status": "idle"}))));
    let key = EntityKey::Int(5);
    let patch_fields = fields(json!({"status": "live"}));
    let next =
        merge(MergeStrategy::UpsertScalar, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    assert!(Arc::ptr_eq(&current, &next));
}

#[test]
fn key_field_is_never_overwritten() {
    let current = Arc::new(CachedData::Scalar(record(json!({"id": 4}))));
    let key = EntityKey::Int(4);
    let patch_fields = fields(json!({"id": 8, "status": "live"}));
    let next =
        merge(MergeStrategy::UpsertScalar, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    assert_eq!(rows_of(&next)[0]["id"], 4);
}

#[test]
fn mismatched_strategy_is_noop() {
    let current = Arc::new(CachedData::Series(vec![]));
    let key = EntityKey::Int(1);
    let patch_fields = fields(json!({"v": 1}));
    let next =
        merge(MergeStrategy::UpsertList, &current, Patch { key: &key, key_field: "id", fields: &patch_fields });
    assert!(Arc::ptr_eq(&current, &next));
}

// ── time series ───────────────────────────────────────────────────────

fn series_insert(current: &Arc<CachedData>, ts: i64, value: i64, capacity: Option<usize>) -> Arc<CachedData> {
    let key = EntityKey::Int(ts);
    let patch_fields = fields(json!({ "mbps": value }));
    merge(
        MergeStrategy::TimeSeries { capacity },
        current,
        Patch { key: &key, key_field: "timestamp", fields: &patch_fields },
    )
}

fn timestamps(data: &CachedData) -> Vec<i64> {
    rows_of(data).iter().filter_map(|r| r["timestamp"].as_i64()).collect()
}

#[test]
fn series_inserts_out_of_order_sorted() {
    let mut data = Arc::new(CachedData::Series(vec![]));
    for ts in [30, 10, 20] {
        data = series_insert(&data, ts, ts, None);
    }
    assert_eq!(timestamps(&data), vec![10, 20, 30]);
}

#[test]
fn series_exact_timestamp_merges_in_place() {
    let mut data = Arc::new(CachedData::Series(vec![]));
    data = series_insert(&data, 10, 1, None);
    data = series_insert(&data, 10, 2, None);
    assert_eq!(timestamps(&data), vec![10]);
    assert_eq!(rows_of(&data)[0]["mbps"], 2);
}

#[test]
fn series_capacity_drops_oldest() {
    let mut data = Arc::new(CachedData::Series(vec![]));
    for ts in [5, 1, 4, 2, 3] {
        data = series_insert(&data, ts, 0, Some(3));
    }
    assert_eq!(timestamps(&data), vec![3, 4, 5]);
}

#[test]
fn series_iso_timestamps_sort_lexically() {
    let data = Arc::new(CachedData::Series(vec![]));
    let mut data = data;
    for ts in ["2026-01-03T00:00:00Z", "2026-01-01T00:00:00Z", "2026-01-02T00:00:00Z"] {
        let key = EntityKey::from(ts);
        let f = fields(json!({"mbps": 1}));
        data = merge(
            MergeStrategy::TimeSeries { capacity: None },
            &data,
            Patch { key: &key, key_field: "timestamp", fields: &f },
        );
    }
    let order: Vec<_> = rows_of(&data).iter().filter_map(|r| r["timestamp"].as_str().map(str::to_owned)).collect();
    assert_eq!(order, vec!["2026-01-01T00:00:00Z", "2026-01-02T00:00:00Z", "2026-01-03T00:00:00Z"]);
}

proptest! {
    #[test]
    fn series_stays_sorted_and_deduplicated(
        inserts in proptest::collection::vec((0i64..20, 0i64..5), 0..60)
    ) {
        let mut data = Arc::new(CachedData::Series(vec![]));
        let mut latest = std::collections::BTreeMap::new();
        for (ts, value) in &inserts {
            data = series_insert(&data, *ts, *value, None);
            latest.insert(*ts, *value);
        }

        let ts = timestamps(&data);
        prop_assert!(ts.windows(2).all(|w| w[0] < w[1]), "not strictly increasing: {:?}", ts);
        prop_assert_eq!(ts.len(), latest.len());
        for row in rows_of(&data) {
            let t = row["timestamp"].as_i64().unwrap_or(-1);
            prop_assert_eq!(row["mbps"].as_i64(), latest.get(&t).copied());
        }
    }
}

// ── alert feed ────────────────────────────────────────────────────────

fn feed_insert(current: &Arc<CachedData>, id: &str, message: &str, capacity: usize) -> Arc<CachedData> {
    let key = EntityKey::from(id);
    let patch_fields = fields(json!({ "message": message }));
    merge(MergeStrategy::AppendFeed { capacity }, current, Patch { key: &key, key_field: "id", fields: &patch_fields })
}

#[test]
fn feed_prepends_unknown_alerts_and_caps() {
    let mut data = Arc::new(CachedData::Feed(vec![]));
    for id in ["a", "b", "c"] {
        data = feed_insert(&data, id, id, 2);
    }
    let ids: Vec<_> = rows_of(&data).iter().filter_map(|r| r["id"].as_str().map(str::to_owned)).collect();
    assert_eq!(ids, vec!["c", "b"]);
}

#[test]
fn feed_merges_known_alert() {
    let mut data = Arc::new(CachedData::Feed(vec![]));
    data = feed_insert(&data, "a", "first", 10);
    let again = feed_insert(&data, "a", "first", 10);
    assert!(Arc::ptr_eq(&data, &again));

    let updated = feed_insert(&data, "a", "second", 10);
    assert_eq!(updated.len(), 1);
    assert_eq!(rows_of(&updated)[0]["message"], "second");
}

#[test]
fn record_key_reads_int_and_text() {
    assert_eq!(record_key(&record(json!({"id": 1, "v": 2})), "id"), Some(EntityKey::Int(1)));
    assert_eq!(record_key(&record(json!({"ts": "2026-01-01T00:00:00Z"})), "ts"), Some(EntityKey::from("2026-01-01T00:00:00Z")));
    assert_eq!(record_key(&record(json!({"id": null})), "id"), None);
    assert_eq!(record_key(&record(json!({"id": 1.5})), "id"), None);
}
