use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chronicle_common::SourceArticle;

pub const STRATEGY_ONLINE_WIKIPEDIA: &str = "online_wikipedia";
pub const STRATEGY_ONLINE_WIKINEWS: &str = "online_wikinews";
pub const STRATEGY_DATASET_WIKIPEDIA_EN: &str = "dataset_wikipedia_en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Semantic,
    HybridTitleSearch,
}

/// Typed view of the task config JSON. Unknown fields are ignored; defaults
/// are centralized here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleAcquisitionConfig {
    pub search_mode: SearchMode,
    pub vector_weight: f64,
    pub bm25_weight: f64,
    pub article_limit: usize,
    pub data_source_preference: Option<String>,
}

impl Default for ArticleAcquisitionConfig {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::Semantic,
            vector_weight: 0.7,
            bm25_weight: 0.3,
            article_limit: 10,
            data_source_preference: None,
        }
    }
}

impl ArticleAcquisitionConfig {
    /// Parse and validate the opaque task config.
    pub fn from_task_config(config: &serde_json::Value) -> Result<Self, String> {
        let parsed: Self = serde_json::from_value(config.clone())
            .map_err(|e| format!("invalid task config: {e}"))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.vector_weight) {
            return Err(format!("vector_weight {} outside [0,1]", self.vector_weight));
        }
        if !(0.0..=1.0).contains(&self.bm25_weight) {
            return Err(format!("bm25_weight {} outside [0,1]", self.bm25_weight));
        }
        if self.article_limit == 0 {
            return Err("article_limit must be positive".to_string());
        }
        if self.search_mode == SearchMode::HybridTitleSearch
            && self.vector_weight == 0.0
            && self.bm25_weight == 0.0
        {
            return Err("hybrid search requires a non-zero weight".to_string());
        }
        Ok(())
    }
}

/// Everything a strategy needs to discover articles for one task.
#[derive(Debug, Clone)]
pub struct AcquisitionQuery {
    pub viewpoint_text: String,
    pub translated_viewpoint: String,
    pub user_language: String,
    pub keywords: Vec<String>,
    pub english_keywords: Vec<String>,
    pub config: ArticleAcquisitionConfig,
    pub parent_request_id: String,
}

impl AcquisitionQuery {
    /// Query-text selection for the dataset strategies:
    /// original English viewpoint → translated viewpoint → english keywords
    /// joined → original text fallback.
    pub fn dataset_query_text(&self) -> String {
        if self.user_language == "en" && !self.viewpoint_text.trim().is_empty() {
            return self.viewpoint_text.clone();
        }
        if !self.translated_viewpoint.trim().is_empty() {
            return self.translated_viewpoint.clone();
        }
        if !self.english_keywords.is_empty() {
            return self.english_keywords.join(" ");
        }
        self.viewpoint_text.clone()
    }
}

/// An interchangeable article discovery backend.
#[async_trait]
pub trait ArticleStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn get_articles(&self, query: &AcquisitionQuery) -> Result<Vec<SourceArticle>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_on_empty_config() {
        let config = ArticleAcquisitionConfig::from_task_config(&json!({})).unwrap();
        assert_eq!(config.search_mode, SearchMode::Semantic);
        assert_eq!(config.article_limit, 10);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config =
            ArticleAcquisitionConfig::from_task_config(&json!({ "future_knob": true, "article_limit": 5 }))
                .unwrap();
        assert_eq!(config.article_limit, 5);
    }

    #[test]
    fn zero_article_limit_is_rejected() {
        assert!(ArticleAcquisitionConfig::from_task_config(&json!({ "article_limit": 0 })).is_err());
    }

    #[test]
    fn hybrid_with_both_weights_zero_is_rejected() {
        let err = ArticleAcquisitionConfig::from_task_config(&json!({
            "search_mode": "hybrid_title_search",
            "vector_weight": 0.0,
            "bm25_weight": 0.0,
        }))
        .unwrap_err();
        assert!(err.contains("non-zero weight"));
    }

    #[test]
    fn out_of_range_weight_is_rejected() {
        assert!(ArticleAcquisitionConfig::from_task_config(&json!({ "vector_weight": 1.5 })).is_err());
    }

    fn query(lang: &str, viewpoint: &str, translated: &str, english: &[&str]) -> AcquisitionQuery {
        AcquisitionQuery {
            viewpoint_text: viewpoint.to_string(),
            translated_viewpoint: translated.to_string(),
            user_language: lang.to_string(),
            keywords: Vec::new(),
            english_keywords: english.iter().map(|s| s.to_string()).collect(),
            config: ArticleAcquisitionConfig::default(),
            parent_request_id: "req".to_string(),
        }
    }

    #[test]
    fn dataset_query_prefers_english_viewpoint() {
        let q = query("en", "The Apollo program", "", &[]);
        assert_eq!(q.dataset_query_text(), "The Apollo program");
    }

    #[test]
    fn dataset_query_falls_back_to_translation_then_keywords() {
        let q = query("zh", "二战", "World War II in the Pacific", &["Pacific War"]);
        assert_eq!(q.dataset_query_text(), "World War II in the Pacific");

        let q = query("zh", "二战", "", &["Pacific War", "Midway"]);
        assert_eq!(q.dataset_query_text(), "Pacific War Midway");

        let q = query("zh", "二战", "", &[]);
        assert_eq!(q.dataset_query_text(), "二战");
    }
}
