use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;

use crate::error::Result;
use crate::models::SnapshotArticle;

/// The JSON snapshot and its optional mirror copy.
pub struct SnapshotFiles {
    primary: PathBuf,
    mirror: Option<PathBuf>,
}

impl SnapshotFiles {
    pub fn new(primary: impl Into<PathBuf>, mirror: Option<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            mirror,
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    /// Raw records of whichever snapshot copy was written last. Missing or
    /// unreadable files yield an empty list.
    pub async fn read_latest(&self) -> Vec<Value> {
        let Some(path) = self.latest_path().await else {
            tracing::debug!("No snapshot found at {:?}", self.primary);
            return Vec::new();
        };

        match read_records(&path).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Error reading snapshot {:?}: {}", path, e);
                Vec::new()
            }
        }
    }

    /// Rewrites the primary snapshot with `articles`, then copies it to the
    /// mirror. Mirror failures only warn.
    pub async fn write(&self, articles: &[SnapshotArticle]) -> Result<()> {
        let content = serde_json::to_string_pretty(articles)?;

        write_file(&self.primary, &content).await?;
        tracing::info!("Saved {} articles to {:?}", articles.len(), self.primary);

        if let Some(mirror) = &self.mirror {
            match write_file(mirror, &content).await {
                Ok(()) => tracing::info!("Copied snapshot to {:?}", mirror),
                Err(e) => tracing::warn!("Could not copy snapshot to {:?}: {}", mirror, e),
            }
        }

        Ok(())
    }

    async fn latest_path(&self) -> Option<PathBuf> {
        let mut latest: Option<(SystemTime, &PathBuf)> = None;

        for path in std::iter::once(&self.primary).chain(self.mirror.as_ref()) {
            let Ok(meta) = tokio::fs::metadata(path).await else {
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            match latest {
                Some((newest, _)) if newest >= modified => {}
                _ => latest = Some((modified, path)),
            }
        }

        latest.map(|(_, path)| path.clone())
    }
}

async fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path).await?;
    let records: Vec<Value> = serde_json::from_str(&content)?;
    Ok(records)
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
