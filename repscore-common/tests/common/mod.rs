//! Shared fixtures for repscore-common integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use repscore_common::db::{init_memory_pool, Facet, Grades, RankedRow, ScanRow, ScoreRecord, SqliteScoreStore};
use repscore_common::fetch::{FetchError, Post, Profile, ProfileSource, Timeline};
use repscore_common::identity::canonical_key;
use repscore_common::queue::RecomputeQueue;
use repscore_common::store::{RankOrder, ScanCursor, ScoreStore};
use repscore_common::{Error, Identity, Result};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub async fn memory_store() -> Arc<SqliteScoreStore> {
    let pool = init_memory_pool().await.unwrap();
    Arc::new(SqliteScoreStore::new(pool))
}

pub fn record(screen_name: &str, platform_id: i64, last_updated: DateTime<Utc>, score: f64) -> ScoreRecord {
    let mut grades = Grades::new();
    grades.add("spam", score);
    ScoreRecord {
        key: canonical_key(screen_name),
        screen_name: screen_name.to_string(),
        platform_id,
        last_updated,
        grades,
        score,
        profile_text: format!(r#"{{"id":{},"screen_name":"{}"}}"#, platform_id, screen_name),
        timeline_text: None,
        hashtags: Vec::new(),
        websites: Vec::new(),
    }
}

pub fn profile(screen_name: &str, platform_id: i64, description: &str) -> Profile {
    Profile {
        platform_id,
        screen_name: screen_name.to_string(),
        description: Some(description.to_string()),
        raw: format!(
            r#"{{"id":{},"screen_name":"{}","description":"{}"}}"#,
            platform_id, screen_name, description
        ),
    }
}

pub fn timeline(texts: &[&str]) -> Timeline {
    Timeline {
        posts: texts
            .iter()
            .map(|text| Post {
                text: text.to_string(),
                hashtags: text
                    .split_whitespace()
                    .filter_map(|w| w.strip_prefix('#'))
                    .map(str::to_string)
                    .collect(),
                urls: Vec::new(),
            })
            .collect(),
        raw: "[]".to_string(),
    }
}

/// Canned upstream keyed by lowercased screen name (or `#id`)
#[derive(Default)]
pub struct FakeSource {
    profiles: Mutex<HashMap<String, std::result::Result<Profile, FetchError>>>,
    timelines: Mutex<HashMap<String, Timeline>>,
    pub profile_calls: AtomicUsize,
}

fn source_key(identity: &Identity) -> String {
    match identity {
        Identity::ScreenName(name) => name.to_lowercase(),
        Identity::PlatformId(id) => format!("#{}", id),
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile under both its name and its id
    pub fn with_profile(self, profile: Profile, timeline: Option<Timeline>) -> Self {
        let keys = [
            profile.screen_name.to_lowercase(),
            format!("#{}", profile.platform_id),
        ];
        for key in keys {
            self.profiles
                .lock()
                .unwrap()
                .insert(key.clone(), Ok(profile.clone()));
            if let Some(t) = &timeline {
                self.timelines.lock().unwrap().insert(key, t.clone());
            }
        }
        self
    }

    pub fn with_failure(self, identity: &Identity, err: FetchError) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(source_key(identity), Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileSource for FakeSource {
    async fn fetch_profile(&self, identity: &Identity) -> std::result::Result<Profile, FetchError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .unwrap()
            .get(&source_key(identity))
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NotFound(identity.to_string())))
    }

    async fn fetch_timeline(&self, identity: &Identity) -> Option<Timeline> {
        self.timelines
            .lock()
            .unwrap()
            .get(&source_key(identity))
            .cloned()
    }
}

/// Queue that only records what was scheduled
#[derive(Default)]
pub struct RecordingQueue {
    pub scheduled: Mutex<Vec<(Identity, u32)>>,
}

impl RecordingQueue {
    pub fn identities(&self) -> Vec<Identity> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(identity, _)| identity.clone())
            .collect()
    }
}

#[async_trait]
impl RecomputeQueue for RecordingQueue {
    async fn schedule(&self, identity: Identity, depth: u32) -> Result<()> {
        self.scheduled.lock().unwrap().push((identity, depth));
        Ok(())
    }
}

/// Store wrapper that counts reads and can be told to fail upcoming calls
pub struct ScriptedStore {
    inner: Arc<dyn ScoreStore>,
    pub finds: AtomicUsize,
    failures: Mutex<VecDeque<Error>>,
    /// Number of successful calls to let through before failures apply
    fail_after: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(inner: Arc<dyn ScoreStore>) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            fail_after: AtomicUsize::new(0),
        }
    }

    /// Fail the call made after `ok_calls` more successful calls
    pub fn fail_with(&self, ok_calls: usize, err: Error) {
        self.fail_after.store(ok_calls, Ordering::SeqCst);
        self.failures.lock().unwrap().push_back(err);
    }

    fn check(&self) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            return Ok(());
        }
        let remaining = self.fail_after.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_after.store(remaining - 1, Ordering::SeqCst);
            return Ok(());
        }
        Err(failures.pop_front().unwrap())
    }

    pub fn find_calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreStore for ScriptedStore {
    async fn get(&self, key: &str) -> Result<Option<ScoreRecord>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn find(&self, identity: &Identity) -> Result<Option<ScoreRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find(identity).await
    }

    async fn put(&self, record: &ScoreRecord) -> Result<()> {
        self.check()?;
        self.inner.put(record).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_matching(&self, identity: &Identity) -> Result<u64> {
        self.check()?;
        self.inner.delete_matching(identity).await
    }

    async fn stale_screen_names(&self, before: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        self.check()?;
        self.inner.stale_screen_names(before, limit).await
    }

    async fn scan_platform_ids(&self, after: Option<&ScanCursor>, limit: usize) -> Result<Vec<ScanRow>> {
        self.check()?;
        self.inner.scan_platform_ids(after, limit).await
    }

    async fn ranked(&self, order: RankOrder, limit: usize) -> Result<Vec<RankedRow>> {
        self.check()?;
        self.inner.ranked(order, limit).await
    }

    async fn facet_values(&self, facet: Facet, limit: usize) -> Result<Vec<Vec<String>>> {
        self.check()?;
        self.inner.facet_values(facet, limit).await
    }
}
