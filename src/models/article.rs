use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Keys every snapshot record must carry to be collected.
pub const REQUIRED_FIELDS: [&str; 9] = [
    "id", "title", "summary", "category", "source", "timestamp", "content", "url", "image",
];

/// Extra key marking records that came from a configured feed.
const ORIGIN_KEY: &str = "origin";
const FEED_ORIGIN: &str = "feed";

/// A row of the `articles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub source: String,
    pub url: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub source: String,
    pub url: String,
    pub category: Option<String>,
}

/// One element of the JSON snapshot array.
///
/// Keys outside the known set are kept in `extra` so a rewrite of the
/// snapshot does not lose them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotArticle {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub summary: String,
    pub category: String,
    pub source: String,
    pub timestamp: String,
    pub content: String,
    pub url: String,
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SnapshotArticle {
    /// Validates a raw snapshot element. Returns `None` when a required key
    /// is absent or a field has the wrong type.
    pub fn from_value(value: Value) -> Option<Self> {
        let record = value.as_object()?;
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !record.contains_key(**f)) {
            tracing::debug!("Dropping snapshot record without '{}'", missing);
            return None;
        }

        match serde_json::from_value(value) {
            Ok(article) => Some(article),
            Err(e) => {
                tracing::debug!("Dropping malformed snapshot record: {}", e);
                None
            }
        }
    }

    pub fn mark_from_feed(&mut self) {
        self.extra
            .insert(ORIGIN_KEY.to_string(), Value::String(FEED_ORIGIN.to_string()));
    }

    pub fn is_from_feed(&self) -> bool {
        self.extra.get(ORIGIN_KEY).and_then(Value::as_str) == Some(FEED_ORIGIN)
    }

    pub fn to_new_article(&self) -> NewArticle {
        NewArticle {
            title: self.title.clone(),
            content: self.content.clone(),
            summary: Some(self.summary.clone()),
            source: self.source.clone(),
            url: self.url.clone(),
            category: Some(self.category.clone()),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for id, found {}",
            other
        ))),
    }
}
