use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::clock::Clock;
use crate::collector::Collector;
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::SnapshotArticle;
use crate::snapshot::SnapshotFiles;
use crate::store::ArticleStore;
use crate::summarizer::{GeneratedSummary, Summarizer};

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;
const HEALTH_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub recent_articles: usize,
    pub free_disk_gb: u64,
    pub low_disk: bool,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub total_articles: i64,
    pub latest_summary: Option<NaiveDate>,
    pub snapshot_path: PathBuf,
}

/// Everything a scheduled job can ask for, wired from one config.
pub struct NewsService {
    store: ArticleStore,
    collector: Collector,
    summarizer: Summarizer,
    retention_days: i64,
    min_free_disk_gb: u64,
    data_dir: PathBuf,
}

impl NewsService {
    /// Opens the database. Failing here is fatal for the process.
    pub async fn new(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let repository = Repository::new(&config.db_path, clock.clone()).await?;
        let snapshot = SnapshotFiles::new(
            &config.snapshot_path,
            config.mirror_path.as_ref().map(PathBuf::from),
        );

        Ok(Self {
            store: ArticleStore::new(repository, snapshot),
            collector: Collector::new(clock.clone(), config.feeds.clone())?,
            summarizer: Summarizer::new(clock, i64::from(config.summary_window_hours)),
            retention_days: i64::from(config.retention_days),
            min_free_disk_gb: config.min_free_disk_gb,
            data_dir: config.data_dir(),
        })
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    /// One collection pass: collect, then persist whatever was collected.
    pub async fn run_once(&self) -> Result<Vec<SnapshotArticle>> {
        let articles = self.collector.collect(self.store.snapshot()).await;
        if articles.is_empty() {
            tracing::warn!("No articles collected");
            return Ok(articles);
        }

        self.store.upsert_articles(&articles).await?;
        tracing::info!("Collected {} articles", articles.len());
        Ok(articles)
    }

    pub async fn daily_summary(&self) -> Result<Option<GeneratedSummary>> {
        self.summarizer.generate_daily_summary(&self.store).await
    }

    pub async fn health_check(&self) -> Result<HealthReport> {
        let recent_articles = self.store.recent_articles(HEALTH_WINDOW_HOURS).await?.len();
        tracing::info!("Articles in last {} hours: {}", HEALTH_WINDOW_HOURS, recent_articles);

        let free_disk_gb = fs2::available_space(&self.data_dir)? / BYTES_PER_GB;
        tracing::info!("Available disk space: {} GB", free_disk_gb);

        let low_disk = free_disk_gb < self.min_free_disk_gb;
        if low_disk {
            tracing::warn!("Less than {} GB disk space available", self.min_free_disk_gb);
        }

        Ok(HealthReport {
            recent_articles,
            free_disk_gb,
            low_disk,
        })
    }

    pub async fn retention_cleanup(&self) -> Result<usize> {
        self.store.purge_older_than(self.retention_days).await
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            total_articles: self.store.article_count().await?,
            latest_summary: self.store.latest_daily_summary().await?.map(|s| s.date),
            snapshot_path: self.store.snapshot().primary().to_path_buf(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    pub(crate) fn test_config(dir: &std::path::Path) -> Config {
        Config {
            db_path: dir.join("news.db").to_string_lossy().to_string(),
            snapshot_path: dir.join("news.json").to_string_lossy().to_string(),
            mirror_path: Some(dir.join("public/data/news.json").to_string_lossy().to_string()),
            ..toml::from_str::<Config>("").unwrap()
        }
    }

    pub(crate) fn seed_snapshot(dir: &std::path::Path) {
        let records = json!([
            {
                "id": "PM speech",
                "title": "PM gives speech",
                "summary": "s",
                "category": "Politics",
                "source": "BBC",
                "timestamp": "2024-07-01T00:00:00Z",
                "content": "c",
                "url": "https://www.bbc.co.uk/news",
                "image": null
            },
            {
                "id": "Rates held",
                "title": "Rates held",
                "summary": "s",
                "category": "Economy",
                "source": "FT",
                "timestamp": "2024-07-01T00:00:00Z",
                "content": "c",
                "url": "https://www.ft.com",
                "image": null
            },
            {
                "id": "Broken",
                "title": "Broken",
                "source": "Sky"
            }
        ]);
        std::fs::write(dir.join("news.json"), records.to_string()).unwrap();
    }

    #[tokio::test]
    async fn run_once_persists_snapshot_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        seed_snapshot(dir.path());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap(),
        ));
        let service = NewsService::new(&test_config(dir.path()), clock).await.unwrap();

        let articles = service.run_once().await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(service.store().article_count().await.unwrap(), 2);

        // The rewritten snapshot only holds the valid, re-stamped records.
        let mirror = std::fs::read_to_string(dir.path().join("public/data/news.json")).unwrap();
        let mirrored: Vec<SnapshotArticle> = serde_json::from_str(&mirror).unwrap();
        assert_eq!(mirrored[0].url, "https://www.bbc.co.uk/news/uk-politics-pm-speech");
        assert_eq!(mirrored[1].url, "https://www.ft.com/content/uk-politics-rates-held");

        // A second pass sees the same urls and inserts nothing new.
        service.run_once().await.unwrap();
        assert_eq!(service.store().article_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn run_once_with_nothing_to_collect_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = NewsService::new(&test_config(dir.path()), clock).await.unwrap();

        assert!(service.run_once().await.unwrap().is_empty());
        assert!(!dir.path().join("news.json").exists());
    }

    #[tokio::test]
    async fn retention_uses_configured_days() {
        let dir = tempfile::tempdir().unwrap();
        seed_snapshot(dir.path());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let service = NewsService::new(&test_config(dir.path()), clock.clone()).await.unwrap();
        service.run_once().await.unwrap();

        clock.advance(Duration::days(31));
        assert_eq!(service.retention_cleanup().await.unwrap(), 2);
        assert_eq!(service.store().article_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn health_check_flags_low_disk_space() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let mut config = test_config(dir.path());
        config.min_free_disk_gb = u64::MAX;
        let service = NewsService::new(&config, clock.clone()).await.unwrap();
        assert!(service.health_check().await.unwrap().low_disk);

        config.min_free_disk_gb = 0;
        let service = NewsService::new(&config, clock).await.unwrap();
        let health = service.health_check().await.unwrap();
        assert!(!health.low_disk);
        assert_eq!(health.recent_articles, 0);
    }

    #[tokio::test]
    async fn health_and_status_report_counts() {
        let dir = tempfile::tempdir().unwrap();
        seed_snapshot(dir.path());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap(),
        ));
        let service = NewsService::new(&test_config(dir.path()), clock).await.unwrap();
        service.run_once().await.unwrap();
        service.daily_summary().await.unwrap();

        let health = service.health_check().await.unwrap();
        assert_eq!(health.recent_articles, 2);

        let status = service.status().await.unwrap();
        assert_eq!(status.total_articles, 2);
        assert_eq!(status.latest_summary, NaiveDate::from_ymd_opt(2024, 7, 10));
        assert_eq!(status.snapshot_path, dir.path().join("news.json"));
    }
}
