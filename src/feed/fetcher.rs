use std::time::Duration;

use feed_rs::model::Entry;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::config::FeedSource;
use crate::error::Result;
use crate::models::SnapshotArticle;

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("news-bot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub async fn fetch_source(
        &self,
        source: &FeedSource,
        timestamp: &str,
    ) -> Result<Vec<SnapshotArticle>> {
        let response = self.client.get(&source.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes, source, timestamp)
    }

    /// Fetch all sources concurrently. Failing sources are logged and left out.
    pub async fn fetch_all(&self, sources: &[FeedSource], timestamp: &str) -> Vec<SnapshotArticle> {
        let batches: Vec<Vec<SnapshotArticle>> = stream::iter(sources)
            .map(|source| async move {
                match self.fetch_source(source, timestamp).await {
                    Ok(articles) => {
                        tracing::debug!("Fetched {} articles from {}", articles.len(), source.name);
                        Some(articles)
                    }
                    Err(e) => {
                        tracing::warn!("Failed to fetch {}: {}", source.url, e);
                        None
                    }
                }
            })
            .buffer_unordered(5) // Max 5 concurrent fetches
            .boxed()
            .filter_map(|r| async { r })
            .collect()
            .await;

        batches.into_iter().flatten().collect()
    }
}

fn parse_feed(bytes: &[u8], source: &FeedSource, timestamp: &str) -> Result<Vec<SnapshotArticle>> {
    let feed = parser::parse(bytes)?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_article(entry, source, timestamp))
        .collect())
}

fn entry_to_article(entry: Entry, source: &FeedSource, timestamp: &str) -> Option<SnapshotArticle> {
    let url = entry.links.first().map(|l| l.href.clone())?;
    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    let summary = entry
        .summary
        .as_ref()
        .map(|s| html_to_text(&s.content))
        .unwrap_or_default();
    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .map(html_to_text)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| summary.clone());

    let image = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next();

    let mut extra = Map::new();
    if let Some(published) = entry.published.or(entry.updated) {
        extra.insert("published".to_string(), Value::String(published.to_rfc3339()));
    }

    let mut article = SnapshotArticle {
        id: title.clone(),
        title,
        summary,
        category: source.category.clone(),
        source: source.name.clone(),
        timestamp: timestamp.to_string(),
        content,
        url,
        image,
        extra,
    };
    article.mark_from_feed();
    Some(article)
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80)
        .map(|text| text.trim().to_string())
        .unwrap_or_else(|_| html.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Politics</title>
    <link>https://example.com/politics</link>
    <description>Politics news</description>
    <item>
      <title>Budget vote passes</title>
      <link>https://example.com/politics/budget-vote</link>
      <description>&lt;p&gt;The budget passed.&lt;/p&gt;</description>
      <pubDate>Wed, 10 Jul 2024 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>No link here</title>
      <description>Dropped</description>
    </item>
  </channel>
</rss>"#;

    fn source() -> FeedSource {
        FeedSource {
            name: "Example".to_string(),
            url: "https://example.com/rss.xml".to_string(),
            category: "Politics".to_string(),
        }
    }

    #[test]
    fn maps_entries_and_skips_linkless_ones() {
        let articles = parse_feed(RSS.as_bytes(), &source(), "2024-07-10T12:00:00Z").unwrap();

        assert_eq!(articles.len(), 1);
        let article = &articles[0];
        assert_eq!(article.id, "Budget vote passes");
        assert_eq!(article.url, "https://example.com/politics/budget-vote");
        assert_eq!(article.source, "Example");
        assert_eq!(article.category, "Politics");
        assert_eq!(article.timestamp, "2024-07-10T12:00:00Z");
        assert!(article.summary.contains("The budget passed."));
        assert_eq!(article.content, article.summary);
        assert!(article.extra.contains_key("published"));
        assert!(article.is_from_feed());
    }

    #[test]
    fn mapped_entries_pass_snapshot_validation() {
        let articles = parse_feed(RSS.as_bytes(), &source(), "2024-07-10T12:00:00Z").unwrap();
        let value = serde_json::to_value(&articles[0]).unwrap();
        assert_eq!(SnapshotArticle::from_value(value), Some(articles[0].clone()));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_feed(b"definitely not xml", &source(), "t").is_err());
    }
}
