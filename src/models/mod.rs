mod article;
mod summary;

pub use article::{Article, NewArticle, SnapshotArticle};
pub use summary::{DailySummary, InsertOutcome};
