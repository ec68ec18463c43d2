use std::env;

/// Application configuration loaded from environment variables.
///
/// Required vars panic with a clear message at startup; everything else has
/// a centralized default here.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    /// Optional second pool for the local wikipedia dataset (chunk + BM25 index).
    pub dataset_database_url: Option<String>,

    // LLM providers
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub default_openai_model: String,
    pub gemini_api_key: Option<String>,
    pub default_gemini_model: String,
    pub ollama_base_url: String,
    pub default_ollama_model: String,
    pub default_llm_provider: String,

    // Embeddings
    pub embedding_api_key: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_dim: usize,

    // Reuse protocol
    pub reuse_composite_viewpoint: bool,
    pub reuse_base_viewpoint: bool,

    // LLM budgets
    pub llm_timeout_extract_seconds: u64,
    pub llm_timeout_score_seconds: u64,
    pub llm_timeout_date_parse_seconds: u64,
    pub llm_default_max_tokens: u32,
    pub llm_event_extraction_max_tokens: u32,
    pub llm_event_extraction_retry_max_tokens: u32,

    // Article text chunking
    pub text_chunk_size_threshold: usize,
    pub text_chunk_size: usize,
    pub text_chunk_overlap: usize,

    // Pipeline budgets
    pub timeline_generation_timeout_seconds: u64,
    pub single_article_timeout_seconds: u64,
    pub min_successful_articles_threshold: usize,
    pub stuck_task_timeout_hours: i64,
    pub default_article_limit: usize,

    // Wiki client
    pub wiki_initial_retry_delay_ms: u64,
    pub wiki_semaphore_initial: usize,
    pub wiki_semaphore_min: usize,
    pub wiki_semaphore_max: usize,
    pub wiki_api_timeout_seconds: u64,
    pub wiki_user_agent: String,

    // Relevance
    pub article_filter_relevance_threshold: f64,
    pub timeline_relevance_threshold: f64,
    pub timeline_batch_size: usize,

    // Event merger
    pub event_merger_min_common_entities: usize,
    pub event_merger_llm_score_threshold: f64,
    pub event_merger_rule_overlap_ratio: f64,
    pub event_merger_concurrent_window_size: usize,
    pub event_merger_max_concurrent_requests: usize,
    pub event_merger_strategy: String,
    pub embedding_merger_sim_threshold: f64,
    pub embedding_merger_llm_band_threshold: f64,
    pub embedding_merger_hybrid: bool,

    // Web server
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("APP_DATABASE_URL"),
            dataset_database_url: env::var("DATASET_DATABASE_URL").ok(),

            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            default_openai_model: env_or("DEFAULT_OPENAI_MODEL", "gpt-4o-mini"),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            default_gemini_model: env_or("DEFAULT_GEMINI_MODEL", "gemini-2.0-flash"),
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            default_ollama_model: env_or("DEFAULT_OLLAMA_MODEL", "llama3.1"),
            default_llm_provider: env_or("DEFAULT_LLM_PROVIDER", "openai"),

            embedding_api_key: env::var("EMBEDDING_API_KEY").ok(),
            embedding_base_url: env_or("EMBEDDING_BASE_URL", "https://api.openai.com/v1"),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dim: env_parse("EMBEDDING_DIM", 768),

            reuse_composite_viewpoint: env_parse("REUSE_COMPOSITE_VIEWPOINT", true),
            reuse_base_viewpoint: env_parse("REUSE_BASE_VIEWPOINT", true),

            llm_timeout_extract_seconds: env_parse("LLM_TIMEOUT_EXTRACT", 120),
            llm_timeout_score_seconds: env_parse("LLM_TIMEOUT_SCORE", 45),
            llm_timeout_date_parse_seconds: env_parse("LLM_TIMEOUT_DATE_PARSE", 120),
            llm_default_max_tokens: env_parse("LLM_DEFAULT_MAX_TOKENS", 4096),
            llm_event_extraction_max_tokens: env_parse("LLM_EVENT_EXTRACTION_MAX_TOKENS", 8000),
            llm_event_extraction_retry_max_tokens: env_parse(
                "LLM_EVENT_EXTRACTION_RETRY_MAX_TOKENS",
                16000,
            ),

            text_chunk_size_threshold: env_parse("TEXT_CHUNK_SIZE_THRESHOLD", 30_000),
            text_chunk_size: env_parse("TEXT_CHUNK_SIZE", 25_000),
            text_chunk_overlap: env_parse("TEXT_CHUNK_OVERLAP", 200),

            timeline_generation_timeout_seconds: env_parse(
                "TIMELINE_GENERATION_TIMEOUT_SECONDS",
                600,
            ),
            single_article_timeout_seconds: env_parse("SINGLE_ARTICLE_TIMEOUT_SECONDS", 120),
            min_successful_articles_threshold: env_parse("MIN_SUCCESSFUL_ARTICLES_THRESHOLD", 1),
            stuck_task_timeout_hours: env_parse("STUCK_TASK_TIMEOUT_HOURS", 1),
            default_article_limit: env_parse("DEFAULT_ARTICLE_LIMIT", 10),

            wiki_initial_retry_delay_ms: env_parse("INITIAL_WIKI_RETRY_DELAY_MS", 1000),
            wiki_semaphore_initial: env_parse("WIKI_API_SEMAPHORE_LIMIT", 5),
            wiki_semaphore_min: env_parse("WIKI_API_SEMAPHORE_MIN", 1),
            wiki_semaphore_max: env_parse("WIKI_API_SEMAPHORE_MAX", 10),
            wiki_api_timeout_seconds: env_parse("WIKI_API_TIMEOUT", 30),
            wiki_user_agent: env_or(
                "WIKI_API_USER_AGENT",
                "ChronicleTimelineBot/0.1 (https://github.com/chronicle)",
            ),

            article_filter_relevance_threshold: env_parse(
                "ARTICLE_FILTER_RELEVANCE_THRESHOLD",
                0.35,
            ),
            timeline_relevance_threshold: env_parse("TIMELINE_RELEVANCE_THRESHOLD", 0.6),
            timeline_batch_size: env_parse("TIMELINE_BATCH_SIZE", 10),

            event_merger_min_common_entities: env_parse("EVENT_MERGER_MIN_COMMON_ENTITIES", 1),
            event_merger_llm_score_threshold: env_parse("EVENT_MERGER_LLM_SCORE_THRESHOLD", 15.0),
            event_merger_rule_overlap_ratio: env_parse("EVENT_MERGER_RULE_OVERLAP_RATIO", 0.75),
            event_merger_concurrent_window_size: env_parse(
                "EVENT_MERGER_CONCURRENT_WINDOW_SIZE",
                3,
            ),
            event_merger_max_concurrent_requests: env_parse(
                "EVENT_MERGER_MAX_CONCURRENT_REQUESTS",
                10,
            ),
            event_merger_strategy: env_or("EVENT_MERGER_STRATEGY", "rule_llm"),
            embedding_merger_sim_threshold: env_parse("EMBEDDING_MERGER_SIM_THRESHOLD", 0.85),
            embedding_merger_llm_band_threshold: env_parse(
                "EMBEDDING_MERGER_LLM_BAND_THRESHOLD",
                0.70,
            ),
            embedding_merger_hybrid: env_parse("EMBEDDING_MERGER_HYBRID", false),

            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_parse("SERVER_PORT", 8080),
        }
    }

    /// Log the presence of each sensitive env var without its value.
    pub fn log_redacted(&self) {
        let vars = [
            ("APP_DATABASE_URL", Some(self.database_url.as_str())),
            ("DATASET_DATABASE_URL", self.dataset_database_url.as_deref()),
            ("OPENAI_API_KEY", self.openai_api_key.as_deref()),
            ("GEMINI_API_KEY", self.gemini_api_key.as_deref()),
            ("EMBEDDING_API_KEY", self.embedding_api_key.as_deref()),
        ];
        for (name, value) in vars {
            match value {
                Some(v) if !v.is_empty() => tracing::info!("{name} = ({} chars)", v.len()),
                _ => tracing::info!("{name} = (empty)"),
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
