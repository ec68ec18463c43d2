//! Article acquisition service: strategy registry + concurrent dispatch.

pub mod dataset;
pub mod online_wikinews;
pub mod online_wikipedia;
pub mod strategy;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use chronicle_common::progress::steps;
use chronicle_common::{ProgressReporter, SourceArticle};

pub use dataset::{
    DatasetWikipediaEnHybridStrategy, DatasetWikipediaEnStrategy, DatasetWikipediaStrategy,
};
pub use online_wikinews::OnlineWikinewsStrategy;
pub use online_wikipedia::OnlineWikipediaStrategy;
pub use strategy::{
    AcquisitionQuery, ArticleAcquisitionConfig, ArticleStrategy, SearchMode,
    STRATEGY_DATASET_WIKIPEDIA_EN, STRATEGY_ONLINE_WIKINEWS, STRATEGY_ONLINE_WIKIPEDIA,
};

pub const DEFAULT_DATA_SOURCE: &str = STRATEGY_ONLINE_WIKIPEDIA;

/// Registry of acquisition strategies keyed by source name. Selection is by
/// name from `data_source_preference`; the dataset entry resolves its
/// semantic vs. hybrid implementation per task from the config.
pub struct ArticleAcquisitionService {
    strategies: HashMap<String, Arc<dyn ArticleStrategy>>,
}

impl ArticleAcquisitionService {
    pub fn new() -> Self {
        Self { strategies: HashMap::new() }
    }

    pub fn register(mut self, name: &str, strategy: Arc<dyn ArticleStrategy>) -> Self {
        self.strategies.insert(name.to_string(), strategy);
        self
    }

    pub fn has_strategy(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Run the strategies named in `data_source_preference` (CSV)
    /// concurrently, tolerate per-strategy failures, and deduplicate the
    /// union by source URL (first hit wins).
    pub async fn acquire(
        &self,
        query: &AcquisitionQuery,
        data_source_preference: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<SourceArticle>> {
        let names: Vec<&str> = data_source_preference
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let names = if names.is_empty() { vec![DEFAULT_DATA_SOURCE] } else { names };

        let mut tasks = Vec::new();
        for name in &names {
            match self.strategies.get(*name) {
                Some(strategy) => {
                    let strategy = Arc::clone(strategy);
                    let query = query.clone();
                    let name = name.to_string();
                    tasks.push(async move {
                        let result = strategy.get_articles(&query).await;
                        (name, result)
                    });
                }
                None => warn!(strategy = name, "unknown data source, skipping"),
            }
        }

        let mut all_articles = Vec::new();
        for (name, result) in join_all(tasks).await {
            match result {
                Ok(articles) => {
                    progress
                        .report(
                            steps::ARTICLE_STRATEGY_RESULT,
                            format!("{name} returned {} articles", articles.len()),
                            Some(json!({ "strategy": name, "article_count": articles.len() })),
                        )
                        .await;
                    all_articles.extend(articles);
                }
                Err(e) => {
                    warn!(strategy = %name, error = %e, "acquisition strategy failed");
                    progress
                        .report(
                            steps::ARTICLE_STRATEGY_RESULT,
                            format!("{name} failed: {e}"),
                            Some(json!({ "strategy": name, "article_count": 0, "error": e.to_string() })),
                        )
                        .await;
                }
            }
        }

        let before = all_articles.len();
        let articles = dedup_by_url(all_articles);
        info!(
            strategies = names.len(),
            before,
            after = articles.len(),
            "article acquisition complete"
        );
        Ok(articles)
    }
}

impl Default for ArticleAcquisitionService {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep the first article seen for each source URL.
fn dedup_by_url(articles: Vec<SourceArticle>) -> Vec<SourceArticle> {
    let mut seen = std::collections::HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.source_url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, title: &str) -> SourceArticle {
        SourceArticle {
            source_name: "test".into(),
            source_identifier: url.to_string(),
            title: title.to_string(),
            source_url: url.to_string(),
            language: "en".into(),
            source_type: "wikipedia".into(),
            text_content: "text".into(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let deduped = dedup_by_url(vec![
            article("https://a", "first"),
            article("https://b", "other"),
            article("https://a", "second"),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
    }
}
