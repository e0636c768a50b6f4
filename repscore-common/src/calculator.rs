//! Score calculation
//!
//! The scoring heuristic is pluggable through [`ScoreCalculator`]. The
//! bundled [`KeywordCalculator`] counts configured terms; deployments with a
//! real model provide their own implementation.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::db::Grades;
use crate::fetch::{Profile, Timeline};

/// Pure function of (profile, timeline, depth) to grades
pub trait ScoreCalculator: Send + Sync {
    fn score(&self, profile: &Profile, timeline: Option<&Timeline>, depth: u32) -> Grades;
}

/// One grade of the keyword calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRule {
    pub grade: String,
    /// Plain terms match anywhere in the text; `#tag` terms match hashtags
    pub terms: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Term-counting calculator
///
/// Each occurrence of a rule's term in the profile description or a post
/// adds `weight` points to that rule's grade. Depth is ignored.
#[derive(Debug, Clone, Default)]
pub struct KeywordCalculator {
    rules: Vec<GradeRule>,
}

impl KeywordCalculator {
    pub fn new(rules: Vec<GradeRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| GradeRule {
                terms: rule.terms.iter().map(|t| t.to_lowercase()).collect(),
                ..rule
            })
            .collect();
        Self { rules }
    }

    fn count_in_text(term: &str, text: &str) -> usize {
        if term.is_empty() {
            return 0;
        }
        text.to_lowercase().matches(term).count()
    }
}

impl ScoreCalculator for KeywordCalculator {
    fn score(&self, profile: &Profile, timeline: Option<&Timeline>, _depth: u32) -> Grades {
        let mut grades = Grades::new();
        let description = profile.description.as_deref().unwrap_or_default();
        let posts = timeline.map(|t| t.posts.as_slice()).unwrap_or_default();

        for rule in &self.rules {
            let mut hits = 0usize;
            for term in &rule.terms {
                if let Some(tag) = term.strip_prefix('#') {
                    hits += posts
                        .iter()
                        .flat_map(|p| p.hashtags.iter())
                        .filter(|h| h.to_lowercase() == tag)
                        .count();
                } else {
                    hits += Self::count_in_text(term, description);
                    hits += posts
                        .iter()
                        .map(|p| Self::count_in_text(term, &p.text))
                        .sum::<usize>();
                }
            }
            grades.add(&rule.grade, hits as f64 * rule.weight);
        }
        grades
    }
}

/// Hashtags and website hosts mentioned in a timeline, deduplicated
pub fn extract_facets(timeline: Option<&Timeline>) -> (Vec<String>, Vec<String>) {
    let mut hashtags = BTreeSet::new();
    let mut websites = BTreeSet::new();

    for post in timeline.map(|t| t.posts.as_slice()).unwrap_or_default() {
        hashtags.extend(post.hashtags.iter().cloned());
        websites.extend(
            post.urls
                .iter()
                .filter_map(|u| Url::parse(u).ok())
                .filter_map(|u| u.host_str().map(|h| h.to_lowercase())),
        );
    }

    (hashtags.into_iter().collect(), websites.into_iter().collect())
}
