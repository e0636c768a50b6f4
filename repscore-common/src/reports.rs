//! Read-only aggregate reports
//!
//! Single bounded pass over a store snapshot; nothing here mutates.

use serde::Serialize;
use std::collections::HashMap;

use crate::db::{Facet, RankedRow};
use crate::store::{RankOrder, ScoreStore};
use crate::Result;

/// Row cap for worst/best exports
pub const RANKED_LIMIT: usize = 20_000;

/// Highest-scored records folded into facet counts
pub const FACET_SCAN_LIMIT: usize = 5_000;

/// Entries kept in facet reports
pub const FACET_TOP: usize = 100;

/// Hosts left out of the unknown websites report unless configured otherwise
pub const DEFAULT_KNOWN_WEBSITES: &[&str] = &[
    "twitter.com",
    "t.co",
    "x.com",
    "youtube.com",
    "youtu.be",
    "facebook.com",
    "instagram.com",
    "google.com",
    "wikipedia.org",
    "reddit.com",
    "bit.ly",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub value: String,
    pub count: usize,
}

/// Highest scores first
pub async fn worst(store: &dyn ScoreStore, limit: usize) -> Result<Vec<RankedRow>> {
    store.ranked(RankOrder::Worst, limit).await
}

/// Lowest scores first
pub async fn best(store: &dyn ScoreStore, limit: usize) -> Result<Vec<RankedRow>> {
    store.ranked(RankOrder::Best, limit).await
}

/// Most common facet values among the highest-scored records
pub async fn most_common(
    store: &dyn ScoreStore,
    facet: Facet,
    scan_limit: usize,
    top: usize,
) -> Result<Vec<FacetCount>> {
    let values = store.facet_values(facet, scan_limit).await?;
    Ok(fold_counts(values, top))
}

/// Like [`most_common`] over websites, skipping hosts in `known`
pub async fn most_common_unknown_websites(
    store: &dyn ScoreStore,
    known: &[String],
    scan_limit: usize,
    top: usize,
) -> Result<Vec<FacetCount>> {
    let values = store.facet_values(Facet::Websites, scan_limit).await?;
    let unknown = values.into_iter().map(|hosts| {
        hosts
            .into_iter()
            .filter(|host| !is_known_website(host, known))
            .collect::<Vec<_>>()
    });
    Ok(fold_counts(unknown, top))
}

/// Exact match or subdomain of a known host, ignoring case and `www.`
pub fn is_known_website(host: &str, known: &[String]) -> bool {
    let lowered = host.to_lowercase();
    let host = lowered.strip_prefix("www.").unwrap_or(&lowered);
    known.iter().any(|k| {
        let k = k.to_lowercase();
        host == k || host.ends_with(&format!(".{}", k))
    })
}

/// Case-folded frequency count, most common first (ties alphabetical)
pub fn fold_counts<I>(records: I, top: usize) -> Vec<FacetCount>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for values in records {
        for value in values {
            *counts.entry(value.to_lowercase()).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<FacetCount> = counts
        .into_iter()
        .map(|(value, count)| FacetCount { value, count })
        .collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    sorted.truncate(top);
    sorted
}

/// Comma-delimited rows with every field quoted
pub fn to_csv<R, F>(rows: R) -> String
where
    R: IntoIterator<Item = Vec<F>>,
    F: AsRef<str>,
{
    let mut out = String::new();
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|f| {
                let field: &str = f.as_ref();
                format!("\"{}\"", field.replace('"', "\"\""))
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

pub fn ranked_csv(rows: &[RankedRow]) -> String {
    to_csv(
        rows.iter()
            .map(|r| vec![r.screen_name.clone(), r.platform_id.to_string(), r.score.to_string()]),
    )
}

pub fn facet_csv(rows: &[FacetCount]) -> String {
    to_csv(rows.iter().map(|r| vec![r.value.clone(), r.count.to_string()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fold_counts_case_insensitive() {
        let counts = fold_counts(vec![tags(&["Foo", "bar"]), tags(&["FOO"]), tags(&["foo", "Bar"])], 10);
        assert_eq!(
            counts,
            vec![
                FacetCount { value: "foo".to_string(), count: 3 },
                FacetCount { value: "bar".to_string(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_fold_counts_truncates_and_breaks_ties_alphabetically() {
        let counts = fold_counts(vec![tags(&["c", "b", "a"])], 2);
        let values: Vec<_> = counts.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_known_websites_match_subdomains_only() {
        let known = tags(&["YouTube.com", "t.co"]);
        assert!(is_known_website("youtube.com", &known));
        assert!(is_known_website("www.youtube.com", &known));
        assert!(is_known_website("m.YOUTUBE.com", &known));
        assert!(is_known_website("t.co", &known));
        assert!(!is_known_website("notyoutube.com", &known));
        assert!(!is_known_website("t.com", &known));
        assert!(!is_known_website("example.org", &known));
    }

    #[test]
    fn test_csv_quotes_everything() {
        let csv = to_csv(vec![vec!["plain", "with \"quote\"", "a,b"]]);
        assert_eq!(csv, "\"plain\",\"with \"\"quote\"\"\",\"a,b\"\r\n");
    }

    #[test]
    fn test_ranked_csv() {
        let rows = vec![RankedRow {
            screen_name: "someone".to_string(),
            platform_id: 42,
            score: 80.5,
        }];
        assert_eq!(ranked_csv(&rows), "\"someone\",\"42\",\"80.5\"\r\n");
    }
}
