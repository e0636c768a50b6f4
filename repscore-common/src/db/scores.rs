//! SQLite-backed score store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::models::{Facet, Grades, RankedRow, ScanRow, ScoreRecord};
use super::store_err;
use crate::identity::{canonical_key, Identity};
use crate::store::{RankOrder, ScanCursor, ScoreStore};
use crate::time::{from_millis, to_millis};
use crate::Result;

const RECORD_COLUMNS: &str = "key, screen_name, platform_id, last_updated_ms, score, grades, \
     profile_text, timeline_text, hashtags, websites";

/// [`ScoreStore`] over the `scores` table
#[derive(Clone)]
pub struct SqliteScoreStore {
    db: SqlitePool,
}

impl SqliteScoreStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn fetch_one_where(&self, clause: &str, bind: &str) -> Result<Option<ScoreRecord>> {
        let sql = format!(
            "SELECT {} FROM scores WHERE {} ORDER BY last_updated_ms, key LIMIT 1",
            RECORD_COLUMNS, clause
        );
        let row = sqlx::query(&sql)
            .bind(bind)
            .fetch_optional(&self.db)
            .await
            .map_err(store_err)?;
        row.as_ref().map(record_from_row).transpose()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ScoreRecord> {
    let grades: String = row.try_get("grades").map_err(store_err)?;
    let hashtags: String = row.try_get("hashtags").map_err(store_err)?;
    let websites: String = row.try_get("websites").map_err(store_err)?;
    let last_updated_ms: i64 = row.try_get("last_updated_ms").map_err(store_err)?;

    Ok(ScoreRecord {
        key: row.try_get("key").map_err(store_err)?,
        screen_name: row.try_get("screen_name").map_err(store_err)?,
        platform_id: row.try_get("platform_id").map_err(store_err)?,
        last_updated: from_millis(last_updated_ms),
        grades: serde_json::from_str::<Grades>(&grades)?,
        score: row.try_get("score").map_err(store_err)?,
        profile_text: row.try_get("profile_text").map_err(store_err)?,
        timeline_text: row.try_get("timeline_text").map_err(store_err)?,
        hashtags: serde_json::from_str(&hashtags)?,
        websites: serde_json::from_str(&websites)?,
    })
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn get(&self, key: &str) -> Result<Option<ScoreRecord>> {
        self.fetch_one_where("key = ?", key).await
    }

    async fn find(&self, identity: &Identity) -> Result<Option<ScoreRecord>> {
        match identity {
            Identity::ScreenName(name) => {
                if let Some(record) = self.get(&canonical_key(name)).await? {
                    return Ok(Some(record));
                }
                // Renamed profiles keep their original key
                self.fetch_one_where("lower(screen_name) = ?", &name.to_lowercase())
                    .await
            }
            Identity::PlatformId(id) => {
                let sql = format!(
                    "SELECT {} FROM scores WHERE platform_id = ? \
                     ORDER BY last_updated_ms, key LIMIT 1",
                    RECORD_COLUMNS
                );
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(&self.db)
                    .await
                    .map_err(store_err)?;
                row.as_ref().map(record_from_row).transpose()
            }
        }
    }

    async fn put(&self, record: &ScoreRecord) -> Result<()> {
        let grades = serde_json::to_string(&record.grades)?;
        let hashtags = serde_json::to_string(&record.hashtags)?;
        let websites = serde_json::to_string(&record.websites)?;

        sqlx::query(
            r#"
            INSERT INTO scores (
                key, screen_name, platform_id, last_updated_ms, score, grades,
                profile_text, timeline_text, hashtags, websites
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                screen_name = excluded.screen_name,
                platform_id = excluded.platform_id,
                last_updated_ms = excluded.last_updated_ms,
                score = excluded.score,
                grades = excluded.grades,
                profile_text = excluded.profile_text,
                timeline_text = excluded.timeline_text,
                hashtags = excluded.hashtags,
                websites = excluded.websites
            "#,
        )
        .bind(&record.key)
        .bind(&record.screen_name)
        .bind(record.platform_id)
        .bind(to_millis(record.last_updated))
        .bind(record.score)
        .bind(grades)
        .bind(&record.profile_text)
        .bind(&record.timeline_text)
        .bind(hashtags)
        .bind(websites)
        .execute(&self.db)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scores WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_matching(&self, identity: &Identity) -> Result<u64> {
        let result = match identity {
            Identity::ScreenName(name) => {
                sqlx::query("DELETE FROM scores WHERE key = ? OR lower(screen_name) = ?")
                    .bind(canonical_key(name))
                    .bind(name.to_lowercase())
                    .execute(&self.db)
                    .await
            }
            Identity::PlatformId(id) => {
                sqlx::query("DELETE FROM scores WHERE platform_id = ?")
                    .bind(id)
                    .execute(&self.db)
                    .await
            }
        }
        .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn stale_screen_names(&self, before: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT screen_name FROM scores WHERE last_updated_ms < ? \
             ORDER BY last_updated_ms LIMIT ?",
        )
        .bind(to_millis(before))
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await
        .map_err(store_err)?;
        Ok(names)
    }

    async fn scan_platform_ids(&self, after: Option<&ScanCursor>, limit: usize) -> Result<Vec<ScanRow>> {
        let rows = match after {
            Some(cursor) => {
                sqlx::query(
                    "SELECT key, platform_id, last_updated_ms FROM scores \
                     WHERE (platform_id, last_updated_ms, key) > (?, ?, ?) \
                     ORDER BY platform_id, last_updated_ms, key LIMIT ?",
                )
                .bind(cursor.platform_id)
                .bind(cursor.last_updated_ms)
                .bind(&cursor.key)
                .bind(limit as i64)
                .fetch_all(&self.db)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT key, platform_id, last_updated_ms FROM scores \
                     ORDER BY platform_id, last_updated_ms, key LIMIT ?",
                )
                .bind(limit as i64)
                .fetch_all(&self.db)
                .await
            }
        }
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let last_updated_ms: i64 = row.try_get("last_updated_ms").map_err(store_err)?;
                Ok(ScanRow {
                    key: row.try_get("key").map_err(store_err)?,
                    platform_id: row.try_get("platform_id").map_err(store_err)?,
                    last_updated: from_millis(last_updated_ms),
                })
            })
            .collect()
    }

    async fn ranked(&self, order: RankOrder, limit: usize) -> Result<Vec<RankedRow>> {
        let direction = match order {
            RankOrder::Worst => "DESC",
            RankOrder::Best => "ASC",
        };
        let sql = format!(
            "SELECT DISTINCT screen_name, platform_id, score FROM scores \
             ORDER BY score {}, screen_name LIMIT ?",
            direction
        );
        let rows: Vec<(String, i64, f64)> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await
            .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|(screen_name, platform_id, score)| RankedRow {
                screen_name,
                platform_id,
                score,
            })
            .collect())
    }

    async fn facet_values(&self, facet: Facet, limit: usize) -> Result<Vec<Vec<String>>> {
        let sql = format!(
            "SELECT {} FROM scores ORDER BY score DESC LIMIT ?",
            facet.column()
        );
        let raw: Vec<String> = sqlx::query_scalar(&sql)
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await
            .map_err(store_err)?;

        Ok(raw
            .iter()
            .filter_map(|json| match serde_json::from_str::<Vec<String>>(json) {
                Ok(values) => Some(values),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed facet column");
                    None
                }
            })
            .collect())
    }
}
