use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{Article, DailySummary, InsertOutcome, NewArticle};

use super::schema::SCHEMA;

// Same shape as SQLite's datetime('now'), so text comparison orders correctly.
const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct Repository {
    conn: Connection,
    clock: Arc<dyn Clock>,
}

impl Repository {
    pub async fn new(db_path: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, clock })
    }

    fn now_text(&self) -> String {
        format_db_time(self.clock.now())
    }

    // Article operations

    /// Inserts every article whose url is not stored yet. Rows that fail
    /// are logged and skipped; the rest of the batch still commits.
    pub async fn insert_articles(&self, articles: Vec<NewArticle>) -> Result<usize> {
        let created_at = self.now_text();
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                for article in &articles {
                    let result = tx.execute(
                        r#"INSERT INTO articles (title, content, summary, source, url, category, created_at)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                           ON CONFLICT(url) DO NOTHING"#,
                        params![
                            article.title,
                            article.content,
                            article.summary,
                            article.source,
                            article.url,
                            article.category,
                            created_at,
                        ],
                    );
                    match result {
                        Ok(changed) => inserted += changed,
                        Err(e) => {
                            tracing::error!("Failed to save article {}: {}", article.url, e);
                        }
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    /// Articles created within the trailing window, newest first.
    pub async fn recent_articles(&self, window_hours: i64) -> Result<Vec<Article>> {
        let cutoff = format_db_time(self.clock.now() - Duration::hours(window_hours));
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, title, content, summary, source, url, category, created_at
                       FROM articles
                       WHERE created_at > ?1
                       ORDER BY created_at DESC, id DESC"#,
                )?;
                let articles = stmt
                    .query_map(params![cutoff], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn article_count(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Deletes articles created strictly before `now - days`, then compacts
    /// the database file.
    pub async fn purge_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = format_db_time(self.clock.now() - Duration::days(days));
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM articles WHERE created_at < ?1", params![cutoff])?;
                conn.execute_batch("VACUUM")?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    // Daily summary operations

    pub async fn insert_daily_summary(
        &self,
        summary: String,
        date: NaiveDate,
    ) -> Result<InsertOutcome> {
        let created_at = self.now_text();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO daily_summaries (summary, date, created_at)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(date) DO NOTHING"#,
                    params![summary, date.to_string(), created_at],
                )?;
                Ok(changed)
            })
            .await?;

        Ok(if changed == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    #[cfg(test)]
    pub async fn daily_summary_for(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        let summary = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, date, summary, created_at FROM daily_summaries WHERE date = ?1",
                )?;
                let summary = stmt
                    .query_row(params![date.to_string()], daily_summary_from_row)
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    pub async fn latest_daily_summary(&self) -> Result<Option<DailySummary>> {
        let summary = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, date, summary, created_at FROM daily_summaries ORDER BY date DESC LIMIT 1",
                )?;
                let summary = stmt.query_row([], daily_summary_from_row).optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    #[cfg(test)]
    pub async fn daily_summary_count(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM daily_summaries", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

fn format_db_time(dt: DateTime<Utc>) -> String {
    dt.format(DB_TIME_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try SQLite datetime format first (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, DB_TIME_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_datetime(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{}'", text).into(),
        )
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        source: row.get(4)?,
        url: row.get(5)?,
        category: row.get(6)?,
        created_at: datetime_column(row, 7)?,
    })
}

fn daily_summary_from_row(row: &Row) -> rusqlite::Result<DailySummary> {
    let date: String = row.get(1)?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DailySummary {
        id: row.get(0)?,
        date,
        summary: row.get(2)?,
        created_at: datetime_column(row, 3)?,
    })
}
