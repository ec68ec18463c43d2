//! LLM relevance scoring: articles before extraction, events after.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use llm_client::json::{extract_json, truncate_to_char_boundary};
use llm_client::{ChatRequest, Message};

use crate::traits::Llm;

const ARTICLE_CONTENT_PREVIEW: usize = 1500;

pub struct RelevanceScorer {
    llm: Arc<dyn Llm>,
}

impl RelevanceScorer {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    /// Score articles against the viewpoint in one call.
    /// Returns title → score clamped to [0,1]; titles the model skipped
    /// score 0.
    pub async fn score_articles(
        &self,
        viewpoint: &str,
        articles: &[(String, String)],
    ) -> Result<HashMap<String, f64>> {
        if articles.is_empty() {
            return Ok(HashMap::new());
        }

        let listing: Vec<serde_json::Value> = articles
            .iter()
            .map(|(title, content)| {
                serde_json::json!({
                    "title": title,
                    "content": truncate_to_char_boundary(content, ARTICLE_CONTENT_PREVIEW),
                })
            })
            .collect();

        let request = ChatRequest::new(vec![
            Message::system(ARTICLE_PROMPT),
            Message::user(format!(
                "Viewpoint: {viewpoint}\n\nArticles:\n{}",
                serde_json::to_string(&listing).context("serialize article listing")?
            )),
        ])
        .temperature(0.0)
        .max_tokens(2048)
        .json_mode();

        let response = self.llm.chat(request).await.context("article scoring call")?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::anyhow!("no JSON in article scoring response"))?;
        let raw: HashMap<String, f64> =
            serde_json::from_value(value).context("article scoring schema")?;

        let scores = articles
            .iter()
            .map(|(title, _)| {
                let score = raw.get(title).copied().unwrap_or(0.0).clamp(0.0, 1.0);
                (title.clone(), score)
            })
            .collect();
        Ok(scores)
    }

    /// Score event descriptions in batches. Returns input index → score for
    /// every event the model produced a valid score for; batch failures fall
    /// back to per-event calls so one bad batch cannot zero out ten events.
    pub async fn score_events(
        &self,
        viewpoint: &str,
        descriptions: &[String],
        batch_size: usize,
    ) -> Result<HashMap<usize, f64>> {
        let batch_size = batch_size.max(1);
        let mut scores = HashMap::with_capacity(descriptions.len());

        for (batch_index, batch) in descriptions.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            match self.score_event_batch(viewpoint, batch).await {
                Ok(batch_scores) => {
                    for (local_index, score) in batch_scores {
                        scores.insert(offset + local_index, score);
                    }
                }
                Err(e) => {
                    warn!(batch_index, error = %e, "event batch scoring failed, falling back to per-event calls");
                    for (local_index, description) in batch.iter().enumerate() {
                        match self.score_single_event(viewpoint, description).await {
                            Ok(score) => {
                                scores.insert(offset + local_index, score);
                            }
                            Err(e) => {
                                warn!(error = %e, "single event scoring failed, leaving unscored");
                            }
                        }
                    }
                }
            }
        }
        Ok(scores)
    }

    /// One batch call. Indexes in the response are 1-based within the batch;
    /// out-of-range indexes and out-of-range scores are discarded.
    async fn score_event_batch(
        &self,
        viewpoint: &str,
        batch: &[String],
    ) -> Result<HashMap<usize, f64>> {
        #[derive(Deserialize)]
        struct Scored {
            event_index: i64,
            relevance_score: f64,
        }

        let listing: Vec<serde_json::Value> = batch
            .iter()
            .enumerate()
            .map(|(i, d)| serde_json::json!({ "event_index": i + 1, "description": d }))
            .collect();

        let request = ChatRequest::new(vec![
            Message::system(EVENT_PROMPT),
            Message::user(format!(
                "Viewpoint: {viewpoint}\n\nEvents:\n{}",
                serde_json::to_string(&listing).context("serialize event listing")?
            )),
        ])
        .temperature(0.0)
        .max_tokens(2048)
        .json_mode();

        let response = self.llm.chat(request).await.context("event batch scoring call")?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::anyhow!("no JSON in event scoring response"))?;
        let entries: Vec<Scored> = serde_json::from_value(value).context("event scoring schema")?;

        let mut out = HashMap::new();
        for entry in entries {
            if entry.event_index < 1 || entry.event_index as usize > batch.len() {
                debug!(index = entry.event_index, "discarding out-of-range event index");
                continue;
            }
            if !(0.0..=1.0).contains(&entry.relevance_score) {
                debug!(score = entry.relevance_score, "discarding out-of-range score");
                continue;
            }
            out.insert(entry.event_index as usize - 1, entry.relevance_score);
        }
        Ok(out)
    }

    async fn score_single_event(&self, viewpoint: &str, description: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct Single {
            relevance_score: f64,
        }

        let request = ChatRequest::new(vec![
            Message::system(SINGLE_EVENT_PROMPT),
            Message::user(format!("Viewpoint: {viewpoint}\n\nEvent: {description}")),
        ])
        .temperature(0.0)
        .max_tokens(256)
        .json_mode();

        let response = self.llm.chat(request).await.context("single event scoring call")?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::anyhow!("no JSON in single event scoring response"))?;
        let single: Single = serde_json::from_value(value).context("single event schema")?;
        Ok(single.relevance_score.clamp(0.0, 1.0))
    }
}

const ARTICLE_PROMPT: &str = r#"You judge how relevant each article is to a research viewpoint.

Return JSON: an object mapping each article title to a relevance score between 0.0 and 1.0.
1.0 = the article is centrally about the viewpoint; 0.0 = unrelated.
Return JSON only, every input title as a key."#;

const EVENT_PROMPT: &str = r#"You judge how relevant each historical event is to a research viewpoint.

Return JSON: an array of {"event_index": <1-based index from the input>, "relevance_score": <0.0..1.0>}.
Score 1.0 for events central to the viewpoint, 0.0 for unrelated ones.
Return JSON only, one entry per input event."#;

const SINGLE_EVENT_PROMPT: &str = r#"You judge how relevant a historical event is to a research viewpoint.

Return JSON: {"relevance_score": <0.0..1.0>}. Return JSON only."#;
