//! Wikinews search strategy: one search per keyword in the user's language.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use chronicle_common::SourceArticle;

use crate::traits::WikiFetcher;

use super::strategy::{AcquisitionQuery, ArticleStrategy, STRATEGY_ONLINE_WIKINEWS};

pub struct OnlineWikinewsStrategy {
    wiki: Arc<dyn WikiFetcher>,
}

impl OnlineWikinewsStrategy {
    pub fn new(wiki: Arc<dyn WikiFetcher>) -> Self {
        Self { wiki }
    }
}

#[async_trait]
impl ArticleStrategy for OnlineWikinewsStrategy {
    fn name(&self) -> &str {
        STRATEGY_ONLINE_WIKINEWS
    }

    async fn get_articles(&self, query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
        let lang = query.user_language.clone();

        let searches = query.keywords.iter().map(|keyword| {
            let wiki = Arc::clone(&self.wiki);
            let keyword = keyword.clone();
            let lang = lang.clone();
            async move { (keyword.clone(), wiki.search_news(&keyword, &lang).await) }
        });

        let mut articles = Vec::new();
        for (keyword, result) in join_all(searches).await {
            match result {
                Ok(news) => {
                    for item in news {
                        if item.text.trim().is_empty() {
                            continue;
                        }
                        articles.push(SourceArticle {
                            source_name: STRATEGY_ONLINE_WIKINEWS.to_string(),
                            source_identifier: format!("{lang}:{}", item.url),
                            title: item.title,
                            source_url: item.url,
                            language: lang.clone(),
                            source_type: "wikinews".to_string(),
                            text_content: item.text,
                        });
                    }
                }
                Err(e) => debug!(keyword, error = %e, "wikinews search yielded nothing"),
            }
        }
        Ok(articles)
    }
}
