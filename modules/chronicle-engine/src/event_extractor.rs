//! Article text → atomic historical events.
//!
//! One JSON-mode extraction call per text chunk, a batched date parse over
//! every raw date string, a join, and a within-article dedup by
//! sha256(description || date_str). Provider refusals and timeouts yield an
//! empty list so a bad article never poisons the rest of the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use chronicle_common::{extraction_signature, EntityMention, ProcessedEvent};
use llm_client::json::{extract_json, truncate_to_char_boundary};
use llm_client::{ChatRequest, LlmError, Message};

use crate::date_parser::DateParser;
use crate::traits::Llm;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub chunk_threshold: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_tokens: u32,
    pub retry_max_tokens: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 30_000,
            chunk_size: 25_000,
            chunk_overlap: 200,
            max_tokens: 8_000,
            retry_max_tokens: 16_000,
        }
    }
}

/// What the LLM returns for each extracted event.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RawExtractedEvent {
    pub event_description: String,
    #[serde(default)]
    pub event_date_str: String,
    #[serde(default)]
    pub enhanced_event_date_str: Option<String>,
    #[serde(default)]
    pub main_entities: Vec<EntityMention>,
    #[serde(default)]
    pub source_text_snippet: Option<String>,
}

pub struct EventExtractor {
    llm: Arc<dyn Llm>,
    date_parser: DateParser,
    config: ExtractorConfig,
}

impl EventExtractor {
    pub fn new(llm: Arc<dyn Llm>, date_parser: DateParser, config: ExtractorConfig) -> Self {
        Self { llm, date_parser, config }
    }

    /// Extract deduplicated processed events from article text.
    pub async fn extract(&self, text: &str, language: &str) -> Result<Vec<ProcessedEvent>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        // 1. Raw extraction, chunked for oversized articles.
        let mut raw_events: Vec<RawExtractedEvent> = Vec::new();
        for chunk in chunk_text(text, &self.config) {
            match self.extract_chunk(chunk, language).await {
                Ok(events) => raw_events.extend(events),
                Err(e) => match e.downcast_ref::<LlmError>() {
                    Some(LlmError::ContentFilter(_)) => {
                        warn!("extraction refused by provider, returning no events");
                        return Ok(Vec::new());
                    }
                    Some(LlmError::Timeout(_)) => {
                        tracing::error!(error = %e, "extraction timed out, skipping article");
                        return Ok(Vec::new());
                    }
                    _ => return Err(e),
                },
            }
        }
        if raw_events.is_empty() {
            return Ok(Vec::new());
        }

        // 2. Batch date parse. The enhanced string is a parser hint layered
        //    onto the raw one; the raw string stays authoritative.
        let date_items: Vec<(String, String)> = raw_events
            .iter()
            .enumerate()
            .map(|(i, e)| (i.to_string(), combined_date_str(e)))
            .collect();
        let parsed_dates = self
            .date_parser
            .parse_batch(&date_items)
            .await
            .context("batch date parse")?;

        // 3. Join + 4. within-article dedup.
        let mut seen = HashSet::new();
        let mut processed = Vec::with_capacity(raw_events.len());
        for (i, raw) in raw_events.into_iter().enumerate() {
            let signature = extraction_signature(&raw.event_description, &raw.event_date_str);
            if !seen.insert(signature) {
                continue;
            }
            processed.push(ProcessedEvent {
                date_info: parsed_dates.get(&i.to_string()).cloned(),
                description: raw.event_description,
                event_date_str: raw.event_date_str,
                main_entities: raw.main_entities,
                source_text_snippet: raw.source_text_snippet,
            });
        }

        info!(events = processed.len(), "article extraction complete");
        Ok(processed)
    }

    async fn extract_chunk(&self, chunk: &str, language: &str) -> Result<Vec<RawExtractedEvent>> {
        match self.extract_chunk_once(chunk, language, self.config.max_tokens).await {
            Ok(events) => Ok(events),
            // A truncated response shows up as malformed JSON; one retry
            // with a larger budget.
            Err(e) if matches!(e.downcast_ref::<LlmError>(), Some(LlmError::Malformed(_))) => {
                warn!("extraction response unparseable, retrying with larger token budget");
                self.extract_chunk_once(chunk, language, self.config.retry_max_tokens)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn extract_chunk_once(
        &self,
        chunk: &str,
        language: &str,
        max_tokens: u32,
    ) -> Result<Vec<RawExtractedEvent>> {
        let request = ChatRequest::new(vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!("Article language: {language}\n\n---\n\n{chunk}")),
        ])
        .temperature(0.0)
        .max_tokens(max_tokens)
        .json_mode();

        let response = self.llm.chat(request).await.map_err(anyhow::Error::new)?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::Error::new(LlmError::Malformed("no JSON in extraction response".into())))?;

        // The model may return a bare array or wrap it in {"events": [...]}.
        let list = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::Object(ref obj) => obj
                .get("events")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new())),
            _ => serde_json::Value::Array(Vec::new()),
        };
        serde_json::from_value(list)
            .map_err(|e| anyhow::Error::new(LlmError::Malformed(e.to_string())))
    }
}

fn combined_date_str(event: &RawExtractedEvent) -> String {
    match event.enhanced_event_date_str.as_deref() {
        Some(enhanced) if !enhanced.trim().is_empty() => {
            format!("{}({})", event.event_date_str, enhanced)
        }
        _ => event.event_date_str.clone(),
    }
}

/// Split text above the threshold into overlapping chunks on char
/// boundaries. The within-article dedup absorbs overlap duplicates.
fn chunk_text<'a>(text: &'a str, config: &ExtractorConfig) -> Vec<&'a str> {
    if text.len() <= config.chunk_threshold {
        return vec![text];
    }
    let step = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < text.len() {
        let remainder = &text[start..];
        let chunk = truncate_to_char_boundary(remainder, config.chunk_size);
        chunks.push(chunk);
        if start + chunk.len() >= text.len() {
            break;
        }
        start += step.min(chunk.len());
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
    }
    chunks
}

const SYSTEM_PROMPT: &str = r#"You extract atomic historical events from encyclopedia or news article text.

Return JSON: a list of events, each:

{
  "event_description": "<one self-contained sentence describing a single event>",
  "event_date_str": "<the date expression exactly as the text gives it>",
  "enhanced_event_date_str": "<a more precise restatement of the date if surrounding context allows, else null>",
  "main_entities": [{"name": "...", "type": "person|organization|location|event|work|other", "language": "<ISO 639-1>"}],
  "source_text_snippet": "<the sentence(s) the event was taken from>"
}

Rules:
- An atomic event has one subject, one happening, one date expression. Split compound sentences.
- Keep descriptions in the article's language; do not translate.
- Only include events with an explicit or strongly implied date expression.
- enhanced_event_date_str is a hint, not a replacement: use it when the text says "the following year" and context fixes the year.
- Use [] when the text contains no datable events.
- Return JSON only."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_one_chunk() {
        let config = ExtractorConfig::default();
        assert_eq!(chunk_text("short text", &config).len(), 1);
    }

    #[test]
    fn oversized_text_is_chunked_with_overlap() {
        let config = ExtractorConfig {
            chunk_threshold: 100,
            chunk_size: 60,
            chunk_overlap: 10,
            ..ExtractorConfig::default()
        };
        let text = "a".repeat(200);
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.len() <= 60));
        let covered: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(covered >= text.len());
    }

    #[test]
    fn chunking_respects_multibyte_boundaries() {
        let config = ExtractorConfig {
            chunk_threshold: 50,
            chunk_size: 31,
            chunk_overlap: 5,
            ..ExtractorConfig::default()
        };
        let text = "界".repeat(40);
        // Must not panic on non-boundary offsets.
        let chunks = chunk_text(&text, &config);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn combined_date_uses_enhanced_hint() {
        let event = RawExtractedEvent {
            event_description: "x".into(),
            event_date_str: "the following year".into(),
            enhanced_event_date_str: Some("1942".into()),
            main_entities: Vec::new(),
            source_text_snippet: None,
        };
        assert_eq!(combined_date_str(&event), "the following year(1942)");
    }

    #[test]
    fn combined_date_ignores_blank_hint() {
        let event = RawExtractedEvent {
            event_description: "x".into(),
            event_date_str: "1942".into(),
            enhanced_event_date_str: Some("  ".into()),
            main_entities: Vec::new(),
            source_text_snippet: None,
        };
        assert_eq!(combined_date_str(&event), "1942");
    }
}
