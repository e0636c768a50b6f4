//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured score breakdown: grade name -> points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grades(pub BTreeMap<String, f64>);

impl Grades {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add points to a grade, creating it if missing
    pub fn add(&mut self, grade: &str, points: f64) {
        *self.0.entry(grade.to_string()).or_insert(0.0) += points;
    }

    /// Overall score is the sum of all grade points
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

/// One stored score per profile identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Canonical key, see [`crate::identity::canonical_key`]
    pub key: String,
    pub screen_name: String,
    pub platform_id: i64,
    pub last_updated: DateTime<Utc>,
    pub grades: Grades,
    pub score: f64,
    pub profile_text: String,
    pub timeline_text: Option<String>,
    pub hashtags: Vec<String>,
    pub websites: Vec<String>,
}

/// Projection used by the duplicate cleanup scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRow {
    pub key: String,
    pub platform_id: i64,
    pub last_updated: DateTime<Utc>,
}

/// Projection used by the worst/best reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub screen_name: String,
    pub platform_id: i64,
    pub score: f64,
}

/// Facet columns available to the frequency reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Hashtags,
    Websites,
}

impl Facet {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Facet::Hashtags => "hashtags",
            Facet::Websites => "websites",
        }
    }
}
