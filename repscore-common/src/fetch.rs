//! Profile/timeline fetch service
//!
//! [`ProfileSource`] is the only collaborator in the pipeline expected to be
//! slow or flaky. Its failures are classified up front so the orchestrator
//! can decide between delete, skip and retry.
//!
//! # API Reference
//! - Profile: `GET {base}/users/show.json?screen_name=..|user_id=..`
//! - Timeline: `GET {base}/statuses/user_timeline.json?..&count=200`

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::FetchConfig;
use crate::identity::Identity;
use crate::{Error, Result};

/// Upstream marker for deleted/nonexistent accounts
const NOT_FOUND_MARKER: &str = "User not found.";

/// Upstream marker for suspended accounts
const SUSPENDED_MARKER: &str = "User has been suspended.";

/// Posts requested per timeline fetch
const TIMELINE_COUNT: u32 = 200;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    /// The identity no longer exists upstream
    #[error("profile not found: {0}")]
    NotFound(String),

    /// The identity exists but cannot be fetched right now
    #[error("profile suspended: {0}")]
    Suspended(String),

    /// Network, timeout, rate limit or server failure
    #[error("transient fetch failure: {0}")]
    Transient(String),
}

/// Profile as returned by the fetch service
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub platform_id: i64,
    pub screen_name: String,
    pub description: Option<String>,
    /// Raw payload, stored for audit
    pub raw: String,
}

#[derive(Deserialize)]
struct ProfilePayload {
    id: i64,
    screen_name: String,
    #[serde(default)]
    description: Option<String>,
}

impl Profile {
    pub fn parse(raw: String) -> std::result::Result<Self, FetchError> {
        let payload: ProfilePayload = serde_json::from_str(&raw)
            .map_err(|e| FetchError::Transient(format!("unparseable profile: {}", e)))?;
        Ok(Self {
            platform_id: payload.id,
            screen_name: payload.screen_name,
            description: payload.description,
            raw,
        })
    }
}

/// A single timeline post with its extracted entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub text: String,
    pub hashtags: Vec<String>,
    pub urls: Vec<String>,
}

/// Recent posts of a profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub posts: Vec<Post>,
    /// Raw payload, stored for audit
    pub raw: String,
}

#[derive(Deserialize)]
struct PostPayload {
    #[serde(default, alias = "full_text")]
    text: String,
    #[serde(default)]
    entities: EntitiesPayload,
}

#[derive(Deserialize, Default)]
struct EntitiesPayload {
    #[serde(default)]
    hashtags: Vec<HashtagPayload>,
    #[serde(default)]
    urls: Vec<UrlPayload>,
}

#[derive(Deserialize)]
struct HashtagPayload {
    text: String,
}

#[derive(Deserialize)]
struct UrlPayload {
    #[serde(default)]
    expanded_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl Timeline {
    /// Parse a timeline payload; `None` when it is not a post array
    pub fn parse(raw: String) -> Option<Self> {
        let payload: Vec<PostPayload> = match serde_json::from_str(&raw) {
            Ok(posts) => posts,
            Err(e) => {
                debug!(error = %e, "Unparseable timeline payload");
                return None;
            }
        };
        let posts = payload
            .into_iter()
            .map(|p| Post {
                text: p.text,
                hashtags: p.entities.hashtags.into_iter().map(|h| h.text).collect(),
                urls: p
                    .entities
                    .urls
                    .into_iter()
                    .filter_map(|u| u.expanded_url.or(u.url))
                    .collect(),
            })
            .collect();
        Some(Self { posts, raw })
    }
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, identity: &Identity) -> std::result::Result<Profile, FetchError>;

    /// Timeline failures are not errors: `None` means "no timeline available"
    async fn fetch_timeline(&self, identity: &Identity) -> Option<Timeline>;
}

/// Map an unsuccessful upstream response onto the fetch error taxonomy.
///
/// Only the upstream's own "User not found." message counts as a definitive
/// not-found. A bare 404 (wrong base URL, proxy, moved endpoint) is
/// transient, since a not-found leads to deletes.
pub fn classify_failure(status: StatusCode, body: &str) -> FetchError {
    if body.contains(SUSPENDED_MARKER) {
        FetchError::Suspended(SUSPENDED_MARKER.to_string())
    } else if body.contains(NOT_FOUND_MARKER) {
        FetchError::NotFound(NOT_FOUND_MARKER.to_string())
    } else {
        FetchError::Transient(format!("upstream returned {}: {}", status, body))
    }
}

/// HTTP [`ProfileSource`]
///
/// Enforces a minimum interval between requests to stay under the upstream
/// rate limit.
pub struct HttpProfileSource {
    http_client: Client,
    base_url: String,
    min_interval: Duration,
    rate_limiter: Arc<Mutex<Option<Instant>>>,
}

impl HttpProfileSource {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = &config.bearer_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("Invalid fetch bearer token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repscore/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            min_interval: Duration::from_millis(config.min_interval_ms),
            rate_limiter: Arc::new(Mutex::new(None)),
        })
    }

    async fn enforce_rate_limit(&self) {
        let mut last_request = self.rate_limiter.lock().await;

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let sleep_duration = self.min_interval - elapsed;
                debug!(
                    sleep_ms = sleep_duration.as_millis() as u64,
                    "Rate limiting: sleeping before fetch request"
                );
                sleep(sleep_duration).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    fn identity_query(identity: &Identity) -> (&'static str, String) {
        match identity {
            Identity::ScreenName(name) => ("screen_name", name.clone()),
            Identity::PlatformId(id) => ("user_id", id.to_string()),
        }
    }

    async fn get_text(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<String, FetchError> {
        self.enforce_rate_limit().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("reading {} failed: {}", url, e)))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_failure(status, &body))
        }
    }
}

#[async_trait]
impl ProfileSource for HttpProfileSource {
    async fn fetch_profile(&self, identity: &Identity) -> std::result::Result<Profile, FetchError> {
        debug!(identity = %identity, "Fetching profile");
        let (param, value) = Self::identity_query(identity);
        let raw = self.get_text("/users/show.json", &[(param, value)]).await?;
        Profile::parse(raw)
    }

    async fn fetch_timeline(&self, identity: &Identity) -> Option<Timeline> {
        debug!(identity = %identity, "Fetching timeline");
        let (param, value) = Self::identity_query(identity);
        let query = [(param, value), ("count", TIMELINE_COUNT.to_string())];
        match self.get_text("/statuses/user_timeline.json", &query).await {
            Ok(raw) => Timeline::parse(raw),
            Err(e) => {
                debug!(identity = %identity, error = %e, "Timeline unavailable");
                None
            }
        }
    }
}
