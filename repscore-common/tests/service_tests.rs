//! Read path: cache, negative caching and recompute scheduling

mod common;

use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;

use common::*;
use repscore_common::cache::MemoryCache;
use repscore_common::freshness::FreshnessPolicy;
use repscore_common::service::ScoreService;
use repscore_common::store::ScoreStore;
use repscore_common::time::ManualClock;
use repscore_common::{Error, Identity};

struct Harness {
    service: ScoreService,
    store: Arc<ScriptedStore>,
    queue: Arc<RecordingQueue>,
    clock: Arc<ManualClock>,
}

async fn harness() -> Harness {
    let store = Arc::new(ScriptedStore::new(memory_store().await));
    let queue = Arc::new(RecordingQueue::default());
    let clock = Arc::new(ManualClock::new(t0()));
    let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
    let service = ScoreService::new(
        cache,
        store.clone(),
        queue.clone(),
        FreshnessPolicy::default(),
        clock.clone(),
    );
    Harness {
        service,
        store,
        queue,
        clock,
    }
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_unknown_name_is_negatively_cached() {
    let h = harness().await;
    let nobody = Identity::screen_name("Nobody");

    let first = h.service.lookup(&nobody).await;
    assert_eq!(
        parse(&first.body),
        serde_json::json!({ "screen_name": "nobody", "last_updated": null })
    );
    assert_eq!(first.expires, Some(t0() + Duration::seconds(2)));
    assert_eq!(h.queue.identities(), vec![nobody.clone()]);

    // Within the negative TTL neither the store nor the queue is touched
    h.clock.advance(Duration::seconds(3));
    let second = h.service.lookup(&nobody).await;
    assert_eq!(second.body, first.body);
    assert_eq!(second.expires, None);
    assert_eq!(h.store.find_calls(), 1);
    assert_eq!(h.queue.identities().len(), 1);

    // After it the store is consulted again
    h.clock.advance(Duration::seconds(3));
    h.service.lookup(&nobody).await;
    assert_eq!(h.store.find_calls(), 2);
    assert_eq!(h.queue.identities().len(), 2);
}

#[tokio::test]
async fn test_unknown_id_expires_later() {
    let h = harness().await;
    let lookup = h.service.lookup(&Identity::platform_id(77)).await;

    assert_eq!(
        parse(&lookup.body),
        serde_json::json!({ "platform_id": 77, "last_updated": null })
    );
    assert_eq!(lookup.expires, Some(t0() + Duration::seconds(60)));
    assert_eq!(h.queue.identities(), vec![Identity::platform_id(77)]);
}

#[tokio::test]
async fn test_fresh_record_is_served_and_cached() {
    let h = harness().await;
    let updated = t0() - Duration::days(1);
    h.store.put(&record("Alice", 42, updated, 3.5)).await.unwrap();

    let lookup = h.service.lookup(&Identity::screen_name("alice")).await;
    let body = parse(&lookup.body);
    assert_eq!(body["screen_name"], "Alice");
    assert_eq!(body["platform_id"], 42);
    assert_eq!(body["score"], 3.5);
    assert_eq!(body["grades"]["spam"], 3.5);
    assert_eq!(body["last_updated"], updated.to_rfc3339());
    assert_eq!(lookup.expires, Some(t0() + Duration::days(1)));
    assert!(h.queue.identities().is_empty());

    h.clock.advance(Duration::hours(12));
    let again = h.service.lookup(&Identity::screen_name("ALICE")).await;
    assert_eq!(again.body, lookup.body);
    assert_eq!(h.store.find_calls(), 1);
}

#[tokio::test]
async fn test_stale_record_is_served_and_rescheduled() {
    let h = harness().await;
    h.store
        .put(&record("old", 9, t0() - Duration::days(8), 1.0))
        .await
        .unwrap();

    let lookup = h.service.lookup(&Identity::platform_id(9)).await;
    assert_eq!(parse(&lookup.body)["screen_name"], "old");
    assert_eq!(h.queue.identities(), vec![Identity::platform_id(9)]);
}

#[tokio::test]
async fn test_store_failure_degrades_to_uncached_negative() {
    let h = harness().await;
    h.store.fail_with(0, Error::Transient("pool timed out".to_string()));
    let who = Identity::screen_name("someone");

    let lookup = h.service.lookup(&who).await;
    assert_eq!(parse(&lookup.body)["last_updated"], Value::Null);
    assert_eq!(lookup.expires, None);
    assert!(h.queue.identities().is_empty());

    h.service.lookup(&who).await;
    assert_eq!(h.store.find_calls(), 2);
}
