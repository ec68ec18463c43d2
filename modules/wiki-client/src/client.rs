use std::sync::Arc;
use std::time::{Duration, Instant};

use llm_client::retry::retry_classified;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::WikiError;
use crate::extract::{extract_article_text, normalize_title};
use crate::metrics::FetchMetrics;
use crate::semaphore::AdaptiveSemaphore;

/// Max articles collected per wikinews search query.
pub const SEARCH_RESULT_LIMIT: usize = 3;

const PAGE_CACHE_CAPACITY: usize = 512;
const NEWS_CACHE_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub struct WikiClientConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub semaphore_initial: usize,
    pub semaphore_min: usize,
    pub semaphore_max: usize,
    pub initial_retry_delay: Duration,
}

impl Default for WikiClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "ChronicleTimelineBot/0.1 (https://github.com/chronicle)".to_string(),
            timeout: Duration::from_secs(30),
            semaphore_initial: 5,
            semaphore_min: 1,
            semaphore_max: 10,
            initial_retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedirectInfo {
    pub from: String,
    pub to: String,
}

/// A fetched wiki page with extracted plain text.
#[derive(Debug, Clone)]
pub struct WikiPage {
    pub title: String,
    pub url: String,
    pub page_id: Option<u64>,
    pub text: String,
    pub language: String,
    pub redirect: Option<RedirectInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossLingualOutcome {
    /// Source and target language were the same; fetched directly.
    Direct,
    /// A cross-lingual language link led to the target-language page.
    ViaLangLink,
    /// No langlink; the exact title happened to exist on the target wiki.
    FallbackExactTitle,
}

#[derive(Debug, Clone)]
pub struct CrossLingualPage {
    pub page: WikiPage,
    pub outcome: CrossLingualOutcome,
}

#[derive(Debug, Clone)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub text: String,
}

/// MediaWiki client: page text, cross-lingual resolution, wikinews search.
///
/// Every HTTP round-trip goes through the adaptive semaphore and the shared
/// retry policy; results (including NotFound) are cached with TTL.
pub struct WikiClient {
    http: reqwest::Client,
    semaphore: AdaptiveSemaphore,
    metrics: Arc<FetchMetrics>,
    page_cache: TtlCache<(String, String), Result<WikiPage, WikiError>>,
    news_cache: TtlCache<(String, String), Vec<NewsArticle>>,
    initial_retry_delay: Duration,
}

impl WikiClient {
    pub fn new(config: WikiClientConfig) -> Result<Self, WikiError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| WikiError::Unknown(e.to_string()))?;
        Ok(Self {
            http,
            semaphore: AdaptiveSemaphore::new(
                config.semaphore_initial,
                config.semaphore_min,
                config.semaphore_max,
            ),
            metrics: Arc::new(FetchMetrics::new()),
            page_cache: TtlCache::new(PAGE_CACHE_CAPACITY),
            news_cache: TtlCache::new(NEWS_CACHE_CAPACITY),
            initial_retry_delay: config.initial_retry_delay,
        })
    }

    pub fn metrics(&self) -> Arc<FetchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fetch a wikipedia page and extract its plain text.
    pub async fn get_wiki_page_text(
        &self,
        title: &str,
        lang: &str,
    ) -> Result<WikiPage, WikiError> {
        let canonical = normalize_title(title);
        let key = (canonical.clone(), lang.to_string());

        if let Some(cached) = self.page_cache.get(&key) {
            self.metrics.record_cache_hit();
            return cached;
        }
        self.metrics.record_cache_miss();

        let result = self.fetch_page(&canonical, lang).await;
        match &result {
            Ok(page) => self.page_cache.put_ok(key, Ok(page.clone())),
            // Semantic misses are cached briefly; transient errors are not.
            Err(WikiError::NotFound(_)) => self.page_cache.put_err(key, result.clone()),
            Err(_) => {}
        }
        result
    }

    /// Resolve a page in `target_lang` starting from a title known in
    /// `source_lang`, preferring cross-lingual language links.
    pub async fn get_wiki_page_text_for_target_lang(
        &self,
        source_title: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<CrossLingualPage, WikiError> {
        if source_lang == target_lang {
            let page = self.get_wiki_page_text(source_title, source_lang).await?;
            return Ok(CrossLingualPage { page, outcome: CrossLingualOutcome::Direct });
        }

        match self.find_langlink(source_title, source_lang, target_lang).await {
            Ok(Some(target_title)) => {
                debug!(source_title, target_title, target_lang, "langlink resolved");
                let page = self.get_wiki_page_text(&target_title, target_lang).await?;
                return Ok(CrossLingualPage { page, outcome: CrossLingualOutcome::ViaLangLink });
            }
            Ok(None) => {}
            Err(e) => warn!(source_title, error = %e, "langlink lookup failed, trying exact title"),
        }

        let page = self.get_wiki_page_text(source_title, target_lang).await?;
        Ok(CrossLingualPage { page, outcome: CrossLingualOutcome::FallbackExactTitle })
    }

    /// Search wikinews and fetch up to [`SEARCH_RESULT_LIMIT`] articles by
    /// full text. Per-article fetch failures are skipped, not fatal.
    pub async fn get_wikinews(
        &self,
        search_query: &str,
        lang: &str,
    ) -> Result<Vec<NewsArticle>, WikiError> {
        let key = (search_query.to_string(), lang.to_string());
        if let Some(cached) = self.news_cache.get(&key) {
            self.metrics.record_cache_hit();
            return Ok(cached);
        }
        self.metrics.record_cache_miss();

        let host = format!("https://{lang}.wikinews.org");
        let search_url = format!(
            "{host}/w/api.php?action=query&list=search&srsearch={}&srlimit={SEARCH_RESULT_LIMIT}&format=json&formatversion=2",
            urlencoding::encode(search_query)
        );
        let body = self.request_with_retry("wikinews_search", &search_url).await?;

        let hits = body["query"]["search"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut articles = Vec::new();
        for hit in hits.iter().take(SEARCH_RESULT_LIMIT) {
            let Some(page_id) = hit["pageid"].as_u64() else { continue };
            let title = hit["title"].as_str().unwrap_or_default().to_string();
            match self.fetch_parsed_text(&host, None, Some(page_id), lang).await {
                Ok((text, _, _)) if !text.is_empty() => articles.push(NewsArticle {
                    title,
                    url: format!("{host}/?curid={page_id}"),
                    text,
                }),
                Ok(_) => debug!(title, "empty wikinews article skipped"),
                Err(e) => warn!(title, error = %e, "wikinews article fetch failed"),
            }
        }

        info!(query = search_query, lang, count = articles.len(), "wikinews search complete");
        self.news_cache.put_ok(key, articles.clone());
        Ok(articles)
    }

    // --- internals ---

    async fn fetch_page(&self, title: &str, lang: &str) -> Result<WikiPage, WikiError> {
        let host = format!("https://{lang}.wikipedia.org");
        let (text, page_id, parse) =
            self.fetch_parsed_text(&host, Some(title), None, lang).await?;

        let resolved_title = parse["title"].as_str().unwrap_or(title).to_string();
        let redirect = parse["redirects"]
            .as_array()
            .and_then(|r| r.first())
            .map(|r| RedirectInfo {
                from: r["from"].as_str().unwrap_or_default().to_string(),
                to: r["to"].as_str().unwrap_or_default().to_string(),
            });
        if let Some(r) = &redirect {
            debug!(from = %r.from, to = %r.to, "followed redirect");
        }

        // Standardized stable URL once the page id is known.
        let url = match page_id {
            Some(id) => format!("{host}/?curid={id}"),
            None => format!("{host}/wiki/{}", urlencoding::encode(&resolved_title.replace(' ', "_"))),
        };

        Ok(WikiPage {
            title: resolved_title,
            url,
            page_id,
            text,
            language: lang.to_string(),
            redirect,
        })
    }

    /// Shared `action=parse` fetch + HTML extraction. Returns
    /// (plain_text, page_id, parse_object).
    async fn fetch_parsed_text(
        &self,
        host: &str,
        title: Option<&str>,
        page_id: Option<u64>,
        lang: &str,
    ) -> Result<(String, Option<u64>, Value), WikiError> {
        let selector = match (title, page_id) {
            (Some(t), _) => format!("page={}", urlencoding::encode(t)),
            (None, Some(id)) => format!("pageid={id}"),
            (None, None) => return Err(WikiError::Malformed("no page selector".to_string())),
        };
        let url = format!(
            "{host}/w/api.php?action=parse&{selector}&prop=text&redirects=1&format=json&formatversion=2"
        );

        let body = self.request_with_retry("wiki_parse", &url).await?;

        if let Some(error) = body.get("error") {
            let code = error["code"].as_str().unwrap_or("unknown");
            return match code {
                "missingtitle" | "nosuchpageid" | "invalidtitle" => {
                    Err(WikiError::NotFound(format!("{lang}: {selector}")))
                }
                _ => Err(WikiError::Unknown(format!("wiki API error: {code}"))),
            };
        }

        let parse = body.get("parse").cloned().ok_or_else(|| {
            WikiError::Malformed("response missing parse object".to_string())
        })?;
        let html = parse["text"].as_str().unwrap_or_default().to_string();
        let found_page_id = parse["pageid"].as_u64();

        // HTML parsing is CPU-bound; keep it off the scheduler.
        let text = tokio::task::spawn_blocking(move || extract_article_text(&html))
            .await
            .map_err(|e| WikiError::Unknown(format!("extraction task failed: {e}")))?;

        Ok((text, found_page_id, parse))
    }

    async fn find_langlink(
        &self,
        title: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Option<String>, WikiError> {
        let url = format!(
            "https://{source_lang}.wikipedia.org/w/api.php?action=query&prop=langlinks&titles={}&lllang={target_lang}&redirects=1&format=json&formatversion=2",
            urlencoding::encode(&normalize_title(title))
        );
        let body = self.request_with_retry("wiki_langlinks", &url).await?;

        let pages = body["query"]["pages"].as_array().cloned().unwrap_or_default();
        for page in pages {
            if page.get("missing").is_some() {
                return Err(WikiError::NotFound(format!("{source_lang}:{title}")));
            }
            if let Some(link) = page["langlinks"].as_array().and_then(|l| l.first()) {
                if let Some(target_title) = link["title"].as_str() {
                    return Ok(Some(target_title.to_string()));
                }
            }
        }
        Ok(None)
    }

    /// One GET through the semaphore and the shared retry policy, with
    /// per-outcome metrics and semaphore feedback.
    async fn request_with_retry(&self, label: &str, url: &str) -> Result<Value, WikiError> {
        retry_classified(label, self.initial_retry_delay, WikiError::class, || async {
            let _permit = self.semaphore.acquire().await;
            let started = Instant::now();
            let result = self.request_once(url).await;
            match &result {
                Ok(_) => {
                    self.semaphore.record_success();
                    self.metrics.record_success(started.elapsed());
                }
                Err(e) => {
                    // A NotFound is an answer, not an upstream health signal.
                    if e.class() != llm_client::ErrorClass::NotFound {
                        self.semaphore.record_failure();
                    }
                    self.metrics.record_failure(e.class(), started.elapsed());
                }
            }
            result
        })
        .await
    }

    async fn request_once(&self, url: &str) -> Result<Value, WikiError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(WikiError::from_reqwest)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(WikiError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(WikiError::from_status(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| WikiError::Malformed(e.to_string()))
    }
}
