//! Acquisition strategies against a mock wiki: cross-lingual fetch plan,
//! langlink fallback, URL dedup, and per-strategy failure tolerance.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chronicle_common::{ProgressReporter, SourceArticle};
use chronicle_engine::acquisition::{
    AcquisitionQuery, ArticleAcquisitionConfig, ArticleAcquisitionService, ArticleStrategy,
    OnlineWikipediaStrategy,
};
use chronicle_engine::testing::MockWiki;
use chronicle_engine::traits::WikiFetcher;
use uuid::Uuid;

fn query(lang: &str, keywords: &[&str], english: &[&str]) -> AcquisitionQuery {
    AcquisitionQuery {
        viewpoint_text: "viewpoint".to_string(),
        translated_viewpoint: "translated viewpoint".to_string(),
        user_language: lang.to_string(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        english_keywords: english.iter().map(|s| s.to_string()).collect(),
        config: ArticleAcquisitionConfig::default(),
        parent_request_id: "req".to_string(),
    }
}

fn reporter() -> ProgressReporter {
    ProgressReporter::new(Uuid::new_v4(), "req")
}

/// A Chinese user gets the zh-native page plus the English page resolved
/// through the aligned english keyword.
#[tokio::test]
async fn cross_lingual_fetches_native_and_english_pages() {
    let wiki: Arc<dyn WikiFetcher> = Arc::new(
        MockWiki::new()
            .on_page("太平洋战争", "zh", "太平洋战争的正文。")
            .on_page("Pacific War", "en", "The Pacific War article body."),
    );
    let strategy = OnlineWikipediaStrategy::new(wiki);

    let articles = strategy
        .get_articles(&query("zh", &["太平洋战争"], &["Pacific War"]))
        .await
        .unwrap();

    assert_eq!(articles.len(), 2);
    let languages: Vec<&str> = articles.iter().map(|a| a.language.as_str()).collect();
    assert!(languages.contains(&"zh"));
    assert!(languages.contains(&"en"));
}

/// With no aligned english keyword, the English page comes from langlink
/// navigation off the native title.
#[tokio::test]
async fn missing_english_keyword_uses_langlink_navigation() {
    let wiki: Arc<dyn WikiFetcher> = Arc::new(
        MockWiki::new()
            .on_page("中途岛海战", "zh", "中途岛海战正文。")
            .on_langlink("中途岛海战", "zh", "en", "Battle of Midway")
            .on_page("Battle of Midway", "en", "The Battle of Midway article."),
    );
    let strategy = OnlineWikipediaStrategy::new(wiki);

    let articles = strategy
        .get_articles(&query("zh", &["中途岛海战"], &[""]))
        .await
        .unwrap();

    assert_eq!(articles.len(), 2);
    assert!(articles
        .iter()
        .any(|a| a.language == "en" && a.title == "Battle of Midway"));
}

/// English users fetch each keyword once, no native duplicate.
#[tokio::test]
async fn english_user_fetches_only_english_pages() {
    let wiki: Arc<dyn WikiFetcher> = Arc::new(
        MockWiki::new().on_page("Apollo program", "en", "The Apollo program article."),
    );
    let strategy = OnlineWikipediaStrategy::new(wiki);

    let articles = strategy
        .get_articles(&query("en", &["Apollo program"], &["Apollo program"]))
        .await
        .unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].language, "en");
}

/// Missing pages are tolerated; the strategy returns what it found.
#[tokio::test]
async fn missing_pages_do_not_fail_the_strategy() {
    let wiki: Arc<dyn WikiFetcher> =
        Arc::new(MockWiki::new().on_page("Pacific War", "en", "body"));
    let strategy = OnlineWikipediaStrategy::new(wiki);

    let articles = strategy
        .get_articles(&query("zh", &["不存在的条目"], &["Pacific War"]))
        .await
        .unwrap();
    // The zh page is missing; only the english one lands.
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].language, "en");
}

/// The service dedups overlapping strategy results by URL and survives a
/// failing strategy.
#[tokio::test]
async fn service_dedups_and_tolerates_strategy_failure() {
    struct Fixed(Vec<SourceArticle>);

    #[async_trait]
    impl ArticleStrategy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn get_articles(&self, _query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl ArticleStrategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn get_articles(&self, _query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
            anyhow::bail!("backend down")
        }
    }

    let article = |url: &str| SourceArticle {
        source_name: "fixed".to_string(),
        source_identifier: url.to_string(),
        title: url.to_string(),
        source_url: url.to_string(),
        language: "en".to_string(),
        source_type: "wikipedia".to_string(),
        text_content: "body".to_string(),
    };

    let service = ArticleAcquisitionService::new()
        .register("a", Arc::new(Fixed(vec![article("https://x/1"), article("https://x/2")])))
        .register("b", Arc::new(Fixed(vec![article("https://x/2"), article("https://x/3")])))
        .register("c", Arc::new(Failing));

    let articles = service
        .acquire(&query("en", &["kw"], &["kw"]), "a,b,c", &reporter())
        .await
        .unwrap();

    let mut urls: Vec<&str> = articles.iter().map(|a| a.source_url.as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec!["https://x/1", "https://x/2", "https://x/3"]);
}
