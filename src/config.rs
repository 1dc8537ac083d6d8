use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// An RSS/Atom feed whose entries join each collection pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_feed_category")]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Best-effort second copy of the snapshot.
    #[serde(default = "default_mirror_path")]
    pub mirror_path: Option<String>,

    #[serde(default = "default_collection_interval")]
    pub collection_interval_minutes: u32,

    #[serde(default = "default_daily_summary_time")]
    pub daily_summary_time: String,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_minutes: u32,

    #[serde(default = "default_retention_day")]
    pub retention_day: String,

    #[serde(default = "default_retention_time")]
    pub retention_time: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_summary_window")]
    pub summary_window_hours: u32,

    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_seconds: u64,

    #[serde(default = "default_min_free_disk")]
    pub min_free_disk_gb: u64,

    #[serde(default)]
    pub feeds: Vec<FeedSource>,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("news-bot");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("news.db").to_string_lossy().to_string()
}

fn default_snapshot_path() -> String {
    data_dir().join("news.json").to_string_lossy().to_string()
}

fn default_mirror_path() -> Option<String> {
    Some("public/data/news.json".to_string())
}

fn default_collection_interval() -> u32 {
    120
}

fn default_daily_summary_time() -> String {
    "09:00".to_string()
}

fn default_health_check_interval() -> u32 {
    360
}

fn default_retention_day() -> String {
    "mon".to_string()
}

fn default_retention_time() -> String {
    "02:00".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_summary_window() -> u32 {
    24
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_error_backoff() -> u64 {
    300
}

fn default_min_free_disk() -> u64 {
    1
}

fn default_feed_category() -> String {
    "General".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            snapshot_path: default_snapshot_path(),
            mirror_path: default_mirror_path(),
            collection_interval_minutes: default_collection_interval(),
            daily_summary_time: default_daily_summary_time(),
            health_check_interval_minutes: default_health_check_interval(),
            retention_day: default_retention_day(),
            retention_time: default_retention_time(),
            retention_days: default_retention_days(),
            summary_window_hours: default_summary_window(),
            tick_seconds: default_tick_seconds(),
            error_backoff_seconds: default_error_backoff(),
            min_free_disk_gb: default_min_free_disk(),
            feeds: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the config from `path`, or from the default location. A missing
    /// file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("news-bot")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        self.daily_summary_at()?;
        self.retention_at()?;
        if self.collection_interval_minutes == 0 || self.health_check_interval_minutes == 0 {
            return Err(AppError::Config("intervals must be at least one minute".to_string()));
        }
        if self.tick_seconds == 0 {
            return Err(AppError::Config("tick_seconds must be positive".to_string()));
        }
        for feed in &self.feeds {
            url::Url::parse(&feed.url).map_err(|e| {
                AppError::Config(format!("feed '{}' has an invalid url: {}", feed.name, e))
            })?;
        }
        Ok(())
    }

    pub fn daily_summary_at(&self) -> Result<NaiveTime> {
        parse_wall_clock(&self.daily_summary_time)
    }

    pub fn retention_at(&self) -> Result<(Weekday, NaiveTime)> {
        let day = self
            .retention_day
            .parse::<Weekday>()
            .map_err(|_| {
                AppError::Config(format!("invalid retention_day '{}'", self.retention_day))
            })?;
        Ok((day, parse_wall_clock(&self.retention_time)?))
    }

    /// Directory holding the database, used for free-space checks.
    pub fn data_dir(&self) -> PathBuf {
        Path::new(&self.db_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Parses "HH:MM" or "HH:MM:SS".
pub fn parse_wall_clock(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| AppError::Config(format!("invalid time of day '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_schedule() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.collection_interval_minutes, 120);
        assert_eq!(config.health_check_interval_minutes, 360);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.daily_summary_at().unwrap(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(
            config.retention_at().unwrap(),
            (Weekday::Mon, NaiveTime::from_hms_opt(2, 0, 0).unwrap())
        );
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn parses_feeds_and_overrides() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/news/news.db"
            daily_summary_time = "07:30:15"
            retention_day = "Sunday"

            [[feeds]]
            name = "BBC"
            url = "https://feeds.bbci.co.uk/news/politics/rss.xml"
            "#,
        )
        .unwrap();

        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.daily_summary_at().unwrap(), NaiveTime::from_hms_opt(7, 30, 15).unwrap());
        assert_eq!(config.retention_at().unwrap().0, Weekday::Sun);
        assert_eq!(config.feeds[0].category, "General");
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/news"));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_time: Config = toml::from_str(r#"daily_summary_time = "25:00""#).unwrap();
        assert!(matches!(bad_time.validate(), Err(AppError::Config(_))));

        let bad_day: Config = toml::from_str(r#"retention_day = "someday""#).unwrap();
        assert!(bad_day.validate().is_err());

        let bad_feed: Config = toml::from_str(
            r#"
            [[feeds]]
            name = "broken"
            url = "not a url"
            "#,
        )
        .unwrap();
        assert!(bad_feed.validate().is_err());
    }

    #[test]
    fn load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.db_path, config.db_path);
    }
}
