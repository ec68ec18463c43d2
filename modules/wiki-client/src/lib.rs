pub mod cache;
pub mod client;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod semaphore;

pub use client::{
    CrossLingualOutcome, CrossLingualPage, NewsArticle, RedirectInfo, WikiClient,
    WikiClientConfig, WikiPage, SEARCH_RESULT_LIMIT,
};
pub use error::WikiError;
pub use extract::{extract_article_text, normalize_title};
pub use metrics::{FetchMetrics, MetricsSnapshot};
pub use semaphore::AdaptiveSemaphore;
