//! Multilingual online Wikipedia strategy.
//!
//! For every keyword: the user's native-language page (when not English),
//! plus the English page — via the aligned english keyword when available,
//! falling back to cross-lingual link navigation. All fetches run
//! concurrently; the wiki client's adaptive semaphore does the throttling.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use chronicle_common::SourceArticle;
use wiki_client::WikiPage;

use crate::traits::WikiFetcher;

use super::strategy::{AcquisitionQuery, ArticleStrategy, STRATEGY_ONLINE_WIKIPEDIA};

pub struct OnlineWikipediaStrategy {
    wiki: Arc<dyn WikiFetcher>,
}

impl OnlineWikipediaStrategy {
    pub fn new(wiki: Arc<dyn WikiFetcher>) -> Self {
        Self { wiki }
    }

    fn to_article(page: WikiPage) -> Option<SourceArticle> {
        if page.text.trim().is_empty() {
            return None;
        }
        let source_identifier = match page.page_id {
            Some(id) => format!("{}:{}", page.language, id),
            None => format!("{}:{}", page.language, page.title),
        };
        Some(SourceArticle {
            source_name: STRATEGY_ONLINE_WIKIPEDIA.to_string(),
            source_identifier,
            title: page.title,
            source_url: page.url,
            language: page.language,
            source_type: "wikipedia".to_string(),
            text_content: page.text,
        })
    }
}

#[async_trait]
impl ArticleStrategy for OnlineWikipediaStrategy {
    fn name(&self) -> &str {
        STRATEGY_ONLINE_WIKIPEDIA
    }

    async fn get_articles(&self, query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
        let user_lang = query.user_language.as_str();
        let mut fetches = Vec::new();

        for (i, keyword) in query.keywords.iter().enumerate() {
            // Native-language page for non-English users.
            if user_lang != "en" {
                let wiki = Arc::clone(&self.wiki);
                let keyword = keyword.clone();
                let lang = user_lang.to_string();
                fetches.push(tokio::spawn(async move {
                    wiki.get_page(&keyword, &lang).await.map(Some)
                }));
            }

            // English page: aligned english keyword when present, otherwise
            // cross-lingual navigation from the native title.
            let english_keyword = if user_lang == "en" {
                Some(keyword.clone())
            } else {
                query.english_keywords.get(i).cloned().filter(|k| !k.trim().is_empty())
            };
            let wiki = Arc::clone(&self.wiki);
            let keyword = keyword.clone();
            let lang = user_lang.to_string();
            fetches.push(tokio::spawn(async move {
                match english_keyword {
                    Some(en_kw) => wiki.get_page(&en_kw, "en").await.map(Some),
                    None => wiki
                        .get_page_for_target_lang(&keyword, &lang, "en")
                        .await
                        .map(|cross| Some(cross.page)),
                }
            }));
        }

        let mut articles = Vec::new();
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(Ok(Some(page))) => {
                    if let Some(article) = Self::to_article(page) {
                        articles.push(article);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => debug!(error = %e, "wikipedia fetch yielded no page"),
                Err(e) => warn!(error = %e, "wikipedia fetch task panicked"),
            }
        }
        Ok(articles)
    }
}
