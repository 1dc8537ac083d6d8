use chrono::NaiveDate;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Article, DailySummary, InsertOutcome, SnapshotArticle};
use crate::snapshot::SnapshotFiles;

/// Articles and daily summaries, kept in SQLite with the article set also
/// mirrored to the JSON snapshot.
pub struct ArticleStore {
    repository: Repository,
    snapshot: SnapshotFiles,
}

impl ArticleStore {
    pub fn new(repository: Repository, snapshot: SnapshotFiles) -> Self {
        Self {
            repository,
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &SnapshotFiles {
        &self.snapshot
    }

    /// Rewrites the snapshot with the whole candidate set and inserts the
    /// candidates whose url is new. Returns the number inserted.
    pub async fn upsert_articles(&self, candidates: &[SnapshotArticle]) -> Result<usize> {
        if let Err(e) = self.snapshot.write(candidates).await {
            tracing::error!("Error saving snapshot: {}", e);
        }

        let rows = candidates.iter().map(SnapshotArticle::to_new_article).collect();
        let inserted = self.repository.insert_articles(rows).await?;
        tracing::info!(
            "Stored {} new of {} collected articles",
            inserted,
            candidates.len()
        );
        Ok(inserted)
    }

    pub async fn recent_articles(&self, window_hours: i64) -> Result<Vec<Article>> {
        self.repository.recent_articles(window_hours).await
    }

    pub async fn purge_older_than(&self, days: i64) -> Result<usize> {
        let deleted = self.repository.purge_older_than(days).await?;
        tracing::info!("Deleted {} old articles and optimized database", deleted);
        Ok(deleted)
    }

    pub async fn insert_daily_summary(
        &self,
        text: String,
        date: NaiveDate,
    ) -> Result<InsertOutcome> {
        self.repository.insert_daily_summary(text, date).await
    }

    pub async fn article_count(&self) -> Result<i64> {
        self.repository.article_count().await
    }

    pub async fn latest_daily_summary(&self) -> Result<Option<DailySummary>> {
        self.repository.latest_daily_summary().await
    }

    #[cfg(test)]
    pub fn repository(&self) -> &Repository {
        &self.repository
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::*;
    use crate::clock::ManualClock;

    fn candidate(id: &str, url: &str) -> SnapshotArticle {
        SnapshotArticle::from_value(json!({
            "id": id,
            "title": id,
            "summary": "s",
            "category": "Politics",
            "source": "Reuters",
            "timestamp": "2024-07-10T12:00:00Z",
            "content": "c",
            "url": url,
            "image": null
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn snapshot_holds_full_candidate_set_even_when_nothing_is_new() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap(),
        ));
        let repo = Repository::new(dir.path().join("news.db").to_str().unwrap(), clock)
            .await
            .unwrap();
        let store = ArticleStore::new(repo, SnapshotFiles::new(dir.path().join("news.json"), None));

        let batch = vec![
            candidate("a", "https://example.com/a"),
            candidate("a-dup", "https://example.com/a"),
            candidate("b", "https://example.com/b"),
        ];
        assert_eq!(store.upsert_articles(&batch).await.unwrap(), 2);
        assert_eq!(store.upsert_articles(&batch).await.unwrap(), 0);
        assert_eq!(store.article_count().await.unwrap(), 2);

        let written: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("news.json")).unwrap())
                .unwrap();
        assert_eq!(written.len(), 3);
    }
}
