//! Recomputation orchestrator behaviour against an in-memory store

mod common;

use chrono::Duration;
use std::sync::Arc;

use common::*;
use repscore_common::calculator::{GradeRule, KeywordCalculator};
use repscore_common::fetch::FetchError;
use repscore_common::freshness::FreshnessPolicy;
use repscore_common::orchestrator::{Outcome, Recomputer};
use repscore_common::store::ScoreStore;
use repscore_common::time::ManualClock;
use repscore_common::{Error, Identity};

fn calculator() -> Arc<KeywordCalculator> {
    Arc::new(KeywordCalculator::new(vec![
        GradeRule {
            grade: "spam".to_string(),
            terms: vec!["buy now".to_string(), "#giveaway".to_string()],
            weight: 2.0,
        },
        GradeRule {
            grade: "hostile".to_string(),
            terms: vec!["idiot".to_string()],
            weight: 1.0,
        },
    ]))
}

fn recomputer(
    store: Arc<dyn ScoreStore>,
    source: Arc<FakeSource>,
    clock: Arc<ManualClock>,
) -> Recomputer {
    Recomputer::new(store, source, calculator(), FreshnessPolicy::default(), clock)
}

#[tokio::test]
async fn test_create_then_skip_when_fresh() {
    let store = memory_store().await;
    let source = Arc::new(FakeSource::new().with_profile(
        profile("Alice", 42, "buy now"),
        Some(timeline(&["buy now #giveaway", "you idiot"])),
    ));
    let clock = Arc::new(ManualClock::new(t0()));
    let recomputer = recomputer(store.clone(), source.clone(), clock.clone());
    let alice = Identity::screen_name("Alice");

    assert_eq!(recomputer.recompute(&alice, 0).await.unwrap(), Outcome::Created);
    let created = store.get("alice").await.unwrap().unwrap();
    assert_eq!(created.screen_name, "Alice");
    assert_eq!(created.platform_id, 42);
    assert_eq!(created.last_updated, t0());
    assert_eq!(created.grades.0["spam"], 6.0);
    assert_eq!(created.grades.0["hostile"], 1.0);
    assert_eq!(created.score, 7.0);
    assert_eq!(created.hashtags, vec!["giveaway".to_string()]);

    clock.advance(Duration::days(1));
    assert_eq!(recomputer.recompute(&alice, 0).await.unwrap(), Outcome::Skipped);
    assert_eq!(store.get("alice").await.unwrap().unwrap(), created);
    // A fresh record never reaches upstream
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_recompute_by_platform_id_finds_existing_record() {
    let store = memory_store().await;
    store.put(&record("alice", 42, t0(), 1.0)).await.unwrap();
    let source = Arc::new(FakeSource::new());
    let clock = Arc::new(ManualClock::new(t0() + Duration::hours(1)));

    let outcome = recomputer(store, source.clone(), clock)
        .recompute(&Identity::platform_id(42), 0)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_not_found_deletes_every_copy() {
    let store = memory_store().await;
    let stale = t0() - Duration::days(30);
    store.put(&record("gone", 7, stale, 3.0)).await.unwrap();
    // Renamed copy sharing the platform id
    store.put(&record("gone_renamed", 7, stale, 3.0)).await.unwrap();
    store.put(&record("bystander", 8, stale, 3.0)).await.unwrap();

    let source = Arc::new(FakeSource::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&Identity::screen_name("gone"), 0)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Deleted { removed: 2 });
    assert!(store.get("gone").await.unwrap().is_none());
    assert!(store.get("gone_renamed").await.unwrap().is_none());
    assert!(store.get("bystander").await.unwrap().is_some());
}

#[tokio::test]
async fn test_not_found_without_record_is_noop_delete() {
    let store = memory_store().await;
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store, Arc::new(FakeSource::new()), clock)
        .recompute(&Identity::screen_name("nobody"), 0)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Deleted { removed: 0 });
}

#[tokio::test]
async fn test_suspended_is_skipped_and_record_kept() {
    let store = memory_store().await;
    let stale = t0() - Duration::days(30);
    let existing = record("banned", 9, stale, 4.0);
    store.put(&existing).await.unwrap();

    let banned = Identity::screen_name("banned");
    let source = Arc::new(
        FakeSource::new().with_failure(&banned, FetchError::Suspended("banned".to_string())),
    );
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&banned, 0)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(store.get("banned").await.unwrap().unwrap(), existing);
}

#[tokio::test]
async fn test_transient_failure_defers_without_writing() {
    let store = memory_store().await;
    let flaky = Identity::screen_name("flaky");
    let source = Arc::new(
        FakeSource::new().with_failure(&flaky, FetchError::Transient("503".to_string())),
    );
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&flaky, 0)
        .await
        .unwrap();

    assert!(outcome.is_deferred());
    assert!(store.get("flaky").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reserved_handle_gets_prefixed_key() {
    let store = memory_store().await;
    let source = Arc::new(FakeSource::new().with_profile(profile("__Dunder", 5, ""), None));
    let clock = Arc::new(ManualClock::new(t0()));
    let dunder = Identity::screen_name("__Dunder");

    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&dunder, 0)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Created);
    assert!(store.get(".__dunder").await.unwrap().is_some());
    assert!(store.get("__dunder").await.unwrap().is_none());
    assert_eq!(store.find(&dunder).await.unwrap().unwrap().platform_id, 5);
}

#[tokio::test]
async fn test_stale_record_is_regraded() {
    let store = memory_store().await;
    let stale = t0() - Duration::days(8);
    store.put(&record("bob", 11, stale, 0.0)).await.unwrap();

    let source = Arc::new(FakeSource::new().with_profile(
        profile("Bob", 11, "calm"),
        Some(timeline(&["buy now", "buy now"])),
    ));
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&Identity::screen_name("bob"), 0)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Updated { regraded: true });
    let updated = store.get("bob").await.unwrap().unwrap();
    assert_eq!(updated.screen_name, "Bob");
    assert_eq!(updated.last_updated, t0());
    assert_eq!(updated.score, 4.0);
    assert!(updated.timeline_text.is_some());
}

#[tokio::test]
async fn test_stale_record_without_timeline_keeps_grades() {
    let store = memory_store().await;
    let stale = t0() - Duration::days(8);
    let existing = record("carol", 12, stale, 9.0);
    store.put(&existing).await.unwrap();

    let fresh_profile = profile("Carol", 12, "new bio");
    let source = Arc::new(FakeSource::new().with_profile(fresh_profile.clone(), None));
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&Identity::screen_name("carol"), 0)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Updated { regraded: false });
    let updated = store.get("carol").await.unwrap().unwrap();
    assert_eq!(updated.grades, existing.grades);
    assert_eq!(updated.score, existing.score);
    assert_eq!(updated.last_updated, stale);
    assert_eq!(updated.screen_name, "Carol");
    assert_eq!(updated.profile_text, fresh_profile.raw);
}

#[tokio::test]
async fn test_boundary_age_is_not_recomputed() {
    let store = memory_store().await;
    store
        .put(&record("dave", 13, t0() - Duration::days(7), 1.0))
        .await
        .unwrap();
    let source = Arc::new(FakeSource::new().with_profile(profile("dave", 13, ""), None));
    let clock = Arc::new(ManualClock::new(t0()));

    let outcome = recomputer(store, source.clone(), clock)
        .recompute(&Identity::screen_name("dave"), 0)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_store_timeout_is_retryable_error() {
    let store = Arc::new(ScriptedStore::new(memory_store().await));
    store.fail_with(0, Error::Transient("pool timed out".to_string()));
    let clock = Arc::new(ManualClock::new(t0()));

    let err = recomputer(store, Arc::new(FakeSource::new()), clock)
        .recompute(&Identity::screen_name("erin"), 0)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_reused_handle_replaces_record_of_previous_owner() {
    let store = memory_store().await;
    store
        .put(&record("bob", 1, t0() - Duration::days(30), 9.0))
        .await
        .unwrap();

    // "bob" was renamed away and the handle now belongs to account 2
    let newcomer = profile("bob", 2, "buy now");
    let source = Arc::new(FakeSource::new().with_profile(newcomer.clone(), None));
    let clock = Arc::new(ManualClock::new(t0()));
    let outcome = recomputer(store.clone(), source, clock)
        .recompute(&Identity::screen_name("bob"), 0)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Created);
    let stored = store.get("bob").await.unwrap().unwrap();
    assert_eq!(stored.platform_id, 2);
    assert_eq!(stored.profile_text, newcomer.raw);
    assert_eq!(stored.last_updated, t0());
    assert_eq!(stored.score, 2.0);
    // Nothing about account 2 is served under account 1
    assert!(store.find(&Identity::platform_id(1)).await.unwrap().is_none());
}
