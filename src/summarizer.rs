use std::sync::Arc;

use chrono::NaiveDate;

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{Article, InsertOutcome};
use crate::store::ArticleStore;

const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone)]
pub struct GeneratedSummary {
    pub date: NaiveDate,
    pub text: String,
    pub outcome: InsertOutcome,
}

/// Renders the once-a-day digest of recent articles.
pub struct Summarizer {
    clock: Arc<dyn Clock>,
    window_hours: i64,
}

impl Summarizer {
    pub fn new(clock: Arc<dyn Clock>, window_hours: i64) -> Self {
        Self {
            clock,
            window_hours,
        }
    }

    /// Builds today's digest and stores it. Returns `None` when the window
    /// holds no articles.
    pub async fn generate_daily_summary(
        &self,
        store: &ArticleStore,
    ) -> Result<Option<GeneratedSummary>> {
        let articles = store.recent_articles(self.window_hours).await?;

        if articles.is_empty() {
            tracing::warn!("No articles found for daily summary");
            return Ok(None);
        }

        let date = self.clock.now().date_naive();
        let text = render_digest(date, &articles);

        let outcome = store.insert_daily_summary(text.clone(), date).await?;
        match outcome {
            InsertOutcome::Inserted => {
                tracing::info!("Daily summary for {} saved to database", date)
            }
            InsertOutcome::AlreadyExists => {
                tracing::info!("Daily summary already exists for {}", date)
            }
        }

        Ok(Some(GeneratedSummary {
            date,
            text,
            outcome,
        }))
    }
}

/// Groups articles by category, in order of first appearance, under a dated
/// header.
pub fn render_digest(date: NaiveDate, articles: &[Article]) -> String {
    let mut groups: Vec<(&str, Vec<&Article>)> = Vec::new();
    for article in articles {
        let category = article.category.as_deref().unwrap_or(UNCATEGORIZED);
        match groups.iter().position(|(name, _)| *name == category) {
            Some(i) => groups[i].1.push(article),
            None => groups.push((category, vec![article])),
        }
    }

    let mut text = format!("Daily Summary - {}\n\n", date.format("%Y-%m-%d"));
    for (category, members) in groups {
        text.push_str(&format!("\n{} ({} articles):\n", category, members.len()));
        for article in members {
            text.push_str(&format!("- {}\n", article.title));
        }
    }
    text
}
