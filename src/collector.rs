use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::FeedSource;
use crate::error::Result;
use crate::feed::FeedFetcher;
use crate::models::SnapshotArticle;
use crate::snapshot::SnapshotFiles;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Builds the candidate article set for a collection pass.
pub struct Collector {
    clock: Arc<dyn Clock>,
    feeds: Vec<FeedSource>,
    fetcher: Option<FeedFetcher>,
}

impl Collector {
    pub fn new(clock: Arc<dyn Clock>, feeds: Vec<FeedSource>) -> Result<Self> {
        let fetcher = if feeds.is_empty() {
            None
        } else {
            Some(FeedFetcher::new()?)
        };

        Ok(Self {
            clock,
            feeds,
            fetcher,
        })
    }

    /// Re-reads the latest snapshot, keeps the complete records, stamps them
    /// with the current time and canonical urls, then appends feed entries
    /// whose url is not already present. Each url appears at most once.
    pub async fn collect(&self, snapshot: &SnapshotFiles) -> Vec<SnapshotArticle> {
        let timestamp = self.clock.now().format(TIMESTAMP_FORMAT).to_string();

        let records = snapshot.read_latest().await;
        let total = records.len();
        let mut seen = HashSet::new();
        let mut articles: Vec<SnapshotArticle> = records
            .into_iter()
            .filter_map(SnapshotArticle::from_value)
            .map(|mut article| {
                article.timestamp = timestamp.clone();
                // Feed entries keep the link the feed gave them.
                if !article.is_from_feed() {
                    if let Some(url) = canonical_url(&article.source, &article.id) {
                        article.url = url;
                    }
                }
                article
            })
            .filter(|article| seen.insert(article.url.clone()))
            .collect();

        if articles.len() < total {
            tracing::debug!(
                "Dropped {} incomplete or duplicate snapshot records",
                total - articles.len()
            );
        }

        if let Some(fetcher) = &self.fetcher {
            let fresh = fetcher.fetch_all(&self.feeds, &timestamp).await;
            let before = articles.len();
            articles.extend(fresh.into_iter().filter(|a| seen.insert(a.url.clone())));
            tracing::info!("Merged {} new feed articles", articles.len() - before);
        }

        articles
    }
}

/// Lowercases the id and replaces spaces with hyphens.
pub fn slugify(id: &str) -> String {
    id.to_lowercase().replace(' ', "-")
}

/// Article url for publishers with a known url layout. Unknown sources get
/// `None` and keep whatever url they already have.
pub fn canonical_url(source: &str, id: &str) -> Option<String> {
    let source = source.to_lowercase();
    let slug = slugify(id);

    let prefix = if source.contains("bbc") {
        "https://www.bbc.co.uk/news/uk-politics-"
    } else if source.contains("guardian") {
        "https://www.theguardian.com/politics/"
    } else if source.contains("sky") {
        "https://news.sky.com/story/uk-politics-"
    } else if source.contains("times") {
        "https://www.thetimes.co.uk/article/uk-politics-"
    } else if source.contains("ft") {
        "https://www.ft.com/content/uk-politics-"
    } else {
        return None;
    };

    Some(format!("{}{}", prefix, slug))
}
