use std::sync::Arc;

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use llm_client::json::extract_json;
use llm_client::{ChatRequest, Message};

use crate::traits::Llm;

/// What the LLM returns for a research viewpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeywordExtraction {
    /// ISO 639-1 code of the viewpoint text, e.g. "en", "zh".
    pub detected_language: String,
    #[serde(default)]
    pub original_keywords: Vec<String>,
    #[serde(default)]
    pub english_keywords: Vec<String>,
    /// English rendering of the viewpoint; empty when already English.
    #[serde(default)]
    pub translated_viewpoint: String,
}

impl KeywordExtraction {
    /// Keyword lists must stay pairwise aligned; a length mismatch empties
    /// both rather than guessing an alignment.
    pub fn validated(mut self) -> Self {
        if self.original_keywords.len() != self.english_keywords.len() {
            warn!(
                original = self.original_keywords.len(),
                english = self.english_keywords.len(),
                "keyword list length mismatch, clearing both"
            );
            self.original_keywords.clear();
            self.english_keywords.clear();
        }
        self
    }
}

pub struct KeywordExtractor {
    llm: Arc<dyn Llm>,
}

impl KeywordExtractor {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    /// One JSON-mode call: language detection, keyword pairs, translation.
    pub async fn extract(&self, viewpoint_text: &str) -> Result<KeywordExtraction> {
        let request = ChatRequest::new(vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!("Viewpoint: {viewpoint_text}")),
        ])
        .temperature(0.0)
        .max_tokens(1024)
        .json_mode();

        let response = self.llm.chat(request).await.context("keyword extraction call")?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::anyhow!("no JSON in keyword extraction response"))?;
        let extraction: KeywordExtraction =
            serde_json::from_value(value).context("keyword extraction schema")?;
        let extraction = extraction.validated();

        info!(
            language = %extraction.detected_language,
            keywords = extraction.original_keywords.len(),
            "keywords extracted"
        );
        Ok(extraction)
    }
}

const SYSTEM_PROMPT: &str = r#"You analyze a historical research viewpoint and return JSON:

{
  "detected_language": "<ISO 639-1 code of the viewpoint text>",
  "original_keywords": ["<search keywords in the original language>"],
  "english_keywords": ["<the same keywords translated to English, same order, same count>"],
  "translated_viewpoint": "<the viewpoint translated to English, or empty string if it is already English>"
}

Rules:
- Keywords are encyclopedia article titles a researcher would look up: proper nouns, named periods, places, institutions.
- 2 to 6 keywords. original_keywords and english_keywords MUST have the same length and align position by position.
- For English viewpoints, original_keywords and english_keywords are identical.
- Return JSON only."#;

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(original: &[&str], english: &[&str]) -> KeywordExtraction {
        KeywordExtraction {
            detected_language: "zh".into(),
            original_keywords: original.iter().map(|s| s.to_string()).collect(),
            english_keywords: english.iter().map(|s| s.to_string()).collect(),
            translated_viewpoint: "The Pacific War".into(),
        }
    }

    #[test]
    fn aligned_lists_pass_validation() {
        let e = extraction(&["太平洋战争", "中途岛海战"], &["Pacific War", "Battle of Midway"])
            .validated();
        assert_eq!(e.original_keywords.len(), 2);
        assert_eq!(e.english_keywords.len(), 2);
    }

    #[test]
    fn mismatched_lists_are_both_cleared() {
        let e = extraction(&["太平洋战争", "中途岛海战"], &["Pacific War"]).validated();
        assert!(e.original_keywords.is_empty());
        assert!(e.english_keywords.is_empty());
        // The rest of the extraction survives.
        assert_eq!(e.detected_language, "zh");
    }
}
