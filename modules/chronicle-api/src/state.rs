//! Shared application state: store, orchestrator, wiki client, websocket
//! registry, and the wiring that builds them from config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use chronicle_common::Config;
use chronicle_engine::acquisition::{
    ArticleAcquisitionService, DatasetWikipediaStrategy, OnlineWikinewsStrategy,
    OnlineWikipediaStrategy, STRATEGY_DATASET_WIKIPEDIA_EN, STRATEGY_ONLINE_WIKINEWS,
    STRATEGY_ONLINE_WIKIPEDIA,
};
use chronicle_engine::canonical::CanonicalViewpointService;
use chronicle_engine::date_parser::DateParser;
use chronicle_engine::embedder::{Embedder, TextEmbedder};
use chronicle_engine::entity_linker::EntityLinker;
use chronicle_engine::event_extractor::{EventExtractor, ExtractorConfig};
use chronicle_engine::keyword_extractor::KeywordExtractor;
use chronicle_engine::merger::embedding::{EmbeddingEventMerger, EmbeddingMergerConfig};
use chronicle_engine::merger::{EventMerger, MergerConfig};
use chronicle_engine::orchestrator::{MergerStrategy, OrchestratorConfig, TimelineOrchestrator};
use chronicle_engine::relevance::RelevanceScorer;
use chronicle_engine::traits::{Llm, TimelineStore, WikiFetcher};
use chronicle_store::PgTimelineStore;
use llm_client::providers::{Gemini, Ollama, OpenAi};
use llm_client::{LlmClient, LlmRegistry};
use wiki_client::{WikiClient, WikiClientConfig};

use crate::ws::WsRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<PgTimelineStore>,
    pub orchestrator: Arc<TimelineOrchestrator>,
    pub wiki: Arc<dyn WikiFetcher>,
    pub ws: Arc<WsRegistry>,
}

impl AppState {
    pub async fn build(config: Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to application database")?;
        chronicle_store::migrate(&pool).await?;
        let store = Arc::new(PgTimelineStore::new(pool));

        let registry = build_llm_registry(&config);
        let provider = registry
            .get(&config.default_llm_provider)
            .or_else(|_| registry.default_provider())
            .context("resolve default LLM provider")?;

        let score_llm: Arc<dyn Llm> = Arc::new(
            LlmClient::new(Arc::clone(&provider))
                .with_timeout(Duration::from_secs(config.llm_timeout_score_seconds)),
        );
        let extract_llm: Arc<dyn Llm> = Arc::new(
            LlmClient::new(Arc::clone(&provider))
                .with_timeout(Duration::from_secs(config.llm_timeout_extract_seconds)),
        );
        let date_llm: Arc<dyn Llm> = Arc::new(
            LlmClient::new(Arc::clone(&provider))
                .with_timeout(Duration::from_secs(config.llm_timeout_date_parse_seconds)),
        );

        let wiki = Arc::new(
            WikiClient::new(WikiClientConfig {
                user_agent: config.wiki_user_agent.clone(),
                timeout: Duration::from_secs(config.wiki_api_timeout_seconds),
                semaphore_initial: config.wiki_semaphore_initial,
                semaphore_min: config.wiki_semaphore_min,
                semaphore_max: config.wiki_semaphore_max,
                initial_retry_delay: Duration::from_millis(config.wiki_initial_retry_delay_ms),
            })
            .context("build wiki client")?,
        );

        let store_dyn: Arc<dyn TimelineStore> = Arc::clone(&store) as Arc<dyn TimelineStore>;
        let wiki_dyn: Arc<dyn WikiFetcher> = Arc::clone(&wiki) as Arc<dyn WikiFetcher>;

        let mut acquisition = ArticleAcquisitionService::new()
            .register(
                STRATEGY_ONLINE_WIKIPEDIA,
                Arc::new(OnlineWikipediaStrategy::new(Arc::clone(&wiki_dyn))),
            )
            .register(
                STRATEGY_ONLINE_WIKINEWS,
                Arc::new(OnlineWikinewsStrategy::new(Arc::clone(&wiki_dyn))),
            );

        let embedder: Arc<dyn TextEmbedder> = Arc::new(Embedder::new(
            config.embedding_api_key.as_deref().unwrap_or_default(),
            &config.embedding_base_url,
            &config.embedding_model,
            config.embedding_dim,
        ));

        if let Some(dataset_url) = &config.dataset_database_url {
            let dataset_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(dataset_url)
                .await
                .context("connect to dataset database")?;
            acquisition = acquisition.register(
                STRATEGY_DATASET_WIKIPEDIA_EN,
                Arc::new(DatasetWikipediaStrategy::new(dataset_pool, Arc::clone(&embedder))),
            );
        }

        let extractor = EventExtractor::new(
            Arc::clone(&extract_llm),
            DateParser::new(Arc::clone(&date_llm)),
            ExtractorConfig {
                chunk_threshold: config.text_chunk_size_threshold,
                chunk_size: config.text_chunk_size,
                chunk_overlap: config.text_chunk_overlap,
                max_tokens: config.llm_event_extraction_max_tokens,
                retry_max_tokens: config.llm_event_extraction_retry_max_tokens,
            },
        );
        let canonical = CanonicalViewpointService::new(
            Arc::clone(&store_dyn),
            extractor,
            EntityLinker::new(Arc::clone(&store_dyn)),
            config.reuse_base_viewpoint,
        );

        let merger_config = MergerConfig {
            min_common_entities: config.event_merger_min_common_entities,
            llm_score_threshold: config.event_merger_llm_score_threshold,
            rule_overlap_ratio: config.event_merger_rule_overlap_ratio,
            window_size: config.event_merger_concurrent_window_size,
            max_concurrent_requests: config.event_merger_max_concurrent_requests,
            user_language: "en".to_string(),
        };
        let merger = match config.event_merger_strategy.as_str() {
            "embedding" => MergerStrategy::Embedding(EmbeddingEventMerger::new(
                Arc::clone(&score_llm),
                Arc::clone(&embedder),
                merger_config,
                EmbeddingMergerConfig {
                    sim_threshold: config.embedding_merger_sim_threshold,
                    llm_band_threshold: config.embedding_merger_llm_band_threshold,
                    hybrid: config.embedding_merger_hybrid,
                },
            )),
            _ => MergerStrategy::RuleLlm(EventMerger::new(Arc::clone(&score_llm), merger_config)),
        };

        let orchestrator = TimelineOrchestrator::new(
            Arc::clone(&store_dyn),
            KeywordExtractor::new(Arc::clone(&score_llm)),
            acquisition,
            RelevanceScorer::new(Arc::clone(&score_llm)),
            canonical,
            merger,
            OrchestratorConfig {
                reuse_composite_viewpoint: config.reuse_composite_viewpoint,
                article_filter_relevance_threshold: config.article_filter_relevance_threshold,
                timeline_relevance_threshold: config.timeline_relevance_threshold,
                timeline_batch_size: config.timeline_batch_size,
                min_successful_articles: config.min_successful_articles_threshold,
                single_article_timeout: Duration::from_secs(config.single_article_timeout_seconds),
                ..OrchestratorConfig::default()
            },
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            orchestrator: Arc::new(orchestrator),
            wiki: wiki_dyn,
            ws: Arc::new(WsRegistry::new()),
        })
    }
}

fn build_llm_registry(config: &Config) -> LlmRegistry {
    let mut registry = LlmRegistry::new();
    if let Some(key) = &config.openai_api_key {
        let mut provider = OpenAi::new(key, &config.default_openai_model);
        if let Some(base_url) = &config.openai_base_url {
            provider = provider.with_base_url(base_url);
        }
        registry = registry.register(Arc::new(provider));
    }
    if let Some(key) = &config.gemini_api_key {
        registry = registry.register(Arc::new(Gemini::new(key, &config.default_gemini_model)));
    }
    // Ollama needs no credentials; it is always registered and serves as
    // the last-resort default.
    registry.register(Arc::new(
        Ollama::new(&config.default_ollama_model).with_base_url(&config.ollama_base_url),
    ))
}
