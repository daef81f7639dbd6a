//! SQLite-backed persistence sink for classified records.
//!
//! The upsert is a single conditional statement keyed by external id, so
//! overlapping manual and scheduled cycles settle last-writer-wins without a
//! read-then-write race. Re-ingestion refreshes the classification columns
//! and `processed_at`; identity, text, engagement counters and creation time
//! keep their first-sight values. All reads are limited, filtered to active
//! rows and ordered by creation time descending.

use crate::{Category, ClassifiedRecord, Label, LabelStats};
use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS post (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    clean_text TEXT NOT NULL,
    author TEXT,
    created_at TEXT NOT NULL,
    label TEXT NOT NULL CHECK (label IN ('verified', 'rumor', 'unknown')),
    confidence REAL NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    score INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    media_url TEXT,
    model_version TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_post_label_confidence ON post(label, confidence);
CREATE INDEX IF NOT EXISTS idx_post_created_at ON post(created_at DESC);
"#;

const SELECT_COLUMNS: &str = "external_id, clean_text, author, created_at, label, confidence, \
     category, score, comment_count, media_url, model_version, processed_at, is_active";

// FIXME: add a `deactivate(external_id)` admin operation so soft-deletion does
// not require touching the table by hand.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent table/index bootstrap.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a record, or refresh the classification of an existing one.
    pub async fn upsert(&self, record: &ClassifiedRecord) -> Result<()> {
        let res = sqlx::query(
            r#"INSERT INTO post
               (external_id, clean_text, author, created_at, label, confidence, category,
                score, comment_count, media_url, model_version, processed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
               ON CONFLICT(external_id) DO UPDATE SET
                 label=excluded.label,
                 confidence=excluded.confidence,
                 category=excluded.category,
                 processed_at=excluded.processed_at"#,
        )
        .bind(&record.external_id)
        .bind(&record.clean_text)
        .bind(&record.author)
        .bind(record.created_at)
        .bind(record.label.as_str())
        .bind(record.confidence)
        .bind(record.category.as_str())
        .bind(record.score)
        .bind(record.comment_count)
        .bind(&record.media_url)
        .bind(&record.model_version)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;

        debug!(
            external_id = %record.external_id,
            label = %record.label,
            rows = res.rows_affected(),
            "store.upsert"
        );
        Ok(())
    }

    /// Active records carrying `label` at or above `min_confidence`,
    /// optionally narrowed to one category, newest first.
    pub async fn query_by_label(
        &self,
        label: Label,
        min_confidence: f64,
        category: Option<Category>,
        limit: i64,
    ) -> Result<Vec<ClassifiedRecord>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {SELECT_COLUMNS}
               FROM post
               WHERE label = ?1
                 AND confidence >= ?2
                 AND (?3 IS NULL OR category = ?3)
                 AND is_active = 1
               ORDER BY created_at DESC
               LIMIT ?4"#
        ))
        .bind(label.as_str())
        .bind(min_confidence)
        .bind(category.map(|c| c.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        info!(
            label = %label,
            min_confidence,
            category = ?category,
            rows = rows.len(),
            "store.query_by_label"
        );
        rows.into_iter().map(record_from_row).collect()
    }

    /// All active records, optionally narrowed to one category, newest first.
    pub async fn query_all(
        &self,
        category: Option<Category>,
        limit: i64,
    ) -> Result<Vec<ClassifiedRecord>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {SELECT_COLUMNS}
               FROM post
               WHERE (?1 IS NULL OR category = ?1)
                 AND is_active = 1
               ORDER BY created_at DESC
               LIMIT ?2"#
        ))
        .bind(category.map(|c| c.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    /// Per-label confidence aggregates over active records processed inside
    /// the trailing window. Recomputed on demand, never stored.
    pub async fn stats(&self, window_hours: i64) -> Result<HashMap<Label, LabelStats>> {
        let cutoff = Utc::now() - Duration::hours(window_hours);

        let rows = sqlx::query(
            r#"SELECT label,
                      COUNT(*) AS count,
                      AVG(confidence) AS avg_confidence,
                      MAX(confidence) AS max_confidence,
                      MIN(confidence) AS min_confidence
               FROM post
               WHERE processed_at >= ?1
                 AND is_active = 1
               GROUP BY label"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = HashMap::new();
        for row in rows {
            let label: String = row.try_get("label")?;
            snapshot.insert(
                Label::from_db(&label),
                LabelStats {
                    count: row.try_get("count")?,
                    avg_confidence: row.try_get("avg_confidence")?,
                    max_confidence: row.try_get("max_confidence")?,
                    min_confidence: row.try_get("min_confidence")?,
                },
            );
        }
        Ok(snapshot)
    }
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ClassifiedRecord> {
    let label: String = row.try_get("label")?;
    let category: String = row.try_get("category")?;
    Ok(ClassifiedRecord {
        external_id: row.try_get("external_id")?,
        clean_text: row.try_get("clean_text")?,
        author: row.try_get("author")?,
        created_at: row.try_get("created_at")?,
        label: Label::from_db(&label),
        confidence: row.try_get("confidence")?,
        category: Category::from_db(&category),
        score: row.try_get("score")?,
        comment_count: row.try_get("comment_count")?,
        media_url: row.try_get("media_url")?,
        model_version: row.try_get("model_version")?,
        processed_at: row.try_get("processed_at")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = Store::new(pool);
        store.ensure_schema().await.expect("schema");
        store
    }

    fn record(external_id: &str, created_at: DateTime<Utc>) -> ClassifiedRecord {
        ClassifiedRecord {
            external_id: external_id.to_string(),
            clean_text: "Official crews confirm flood damage along the levee.".to_string(),
            author: Some("u/riverwatcher".to_string()),
            created_at,
            label: Label::Verified,
            confidence: 0.82,
            category: Category::Flood,
            score: 120,
            comment_count: 9,
            media_url: None,
            model_version: "heuristic-v1".to_string(),
            processed_at: Utc::now(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_identifier() {
        let store = memory_store().await;
        let created = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        let first = record("reddit_a1", created);
        store.upsert(&first).await.unwrap();

        // Re-ingestion: classification changed, counters drifted upstream.
        let mut second = record("reddit_a1", created);
        second.label = Label::Rumor;
        second.confidence = 0.61;
        second.category = Category::General;
        second.score = 999;
        second.comment_count = 999;
        second.processed_at = first.processed_at + Duration::minutes(5);
        store.upsert(&second).await.unwrap();

        let rows = store.query_all(None, 10).await.unwrap();
        assert_eq!(rows.len(), 1, "exactly one active row per identifier");
        let row = &rows[0];
        assert_eq!(row.label, Label::Rumor);
        assert_eq!(row.confidence, 0.61);
        assert_eq!(row.category, Category::General);
        assert_eq!(row.processed_at, second.processed_at);
        // First-sight fields survive the re-ingestion.
        assert_eq!(row.score, 120);
        assert_eq!(row.comment_count, 9);
        assert_eq!(row.created_at, created);
    }

    #[tokio::test]
    async fn query_by_label_filters_confidence_and_category() {
        let store = memory_store().await;
        let base = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        let strong = record("reddit_v1", base);
        store.upsert(&strong).await.unwrap();

        let mut weak = record("reddit_v2", base + Duration::minutes(1));
        weak.confidence = 0.41;
        store.upsert(&weak).await.unwrap();

        let mut rumor = record("reddit_r1", base + Duration::minutes(2));
        rumor.label = Label::Rumor;
        store.upsert(&rumor).await.unwrap();

        let verified = store
            .query_by_label(Label::Verified, 0.5, None, 10)
            .await
            .unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].external_id, "reddit_v1");

        let by_category = store
            .query_by_label(Label::Verified, 0.5, Some(Category::Earthquake), 10)
            .await
            .unwrap();
        assert!(by_category.is_empty());

        let flood = store
            .query_by_label(Label::Verified, 0.5, Some(Category::Flood), 10)
            .await
            .unwrap();
        assert_eq!(flood.len(), 1);
    }

    #[tokio::test]
    async fn query_all_orders_newest_first_and_limits() {
        let store = memory_store().await;
        let base = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        for (i, id) in ["reddit_1", "reddit_2", "reddit_3"].iter().enumerate() {
            let r = record(id, base + Duration::hours(i as i64));
            store.upsert(&r).await.unwrap();
        }

        let rows = store.query_all(None, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].external_id, "reddit_3");
        assert_eq!(rows[1].external_id, "reddit_2");
    }

    #[tokio::test]
    async fn stats_cover_only_the_trailing_window() {
        let store = memory_store().await;
        let base = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        let mut recent_a = record("reddit_s1", base);
        recent_a.confidence = 0.9;
        store.upsert(&recent_a).await.unwrap();

        let mut recent_b = record("reddit_s2", base);
        recent_b.confidence = 0.7;
        store.upsert(&recent_b).await.unwrap();

        let mut stale = record("reddit_s3", base);
        stale.processed_at = Utc::now() - Duration::hours(48);
        store.upsert(&stale).await.unwrap();

        let snapshot = store.stats(24).await.unwrap();
        let verified = snapshot.get(&Label::Verified).expect("verified bucket");
        assert_eq!(verified.count, 2);
        assert!((verified.avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(verified.max_confidence, 0.9);
        assert_eq!(verified.min_confidence, 0.7);
        assert!(snapshot.get(&Label::Rumor).is_none());
    }
}
