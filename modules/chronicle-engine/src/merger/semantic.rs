//! The yes/no LLM oracle for "do these two descriptions name the same
//! real-world event?", with an order-independent verdict cache.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lru::LruCache;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use llm_client::json::extract_json;
use llm_client::{ChatRequest, Message};

use crate::traits::Llm;

use super::candidates::short_description_hash;
use super::MergerInput;

const VERDICT_CACHE_CAPACITY: usize = 1000;
const CONFIDENCE_THRESHOLD: f64 = 0.75;

#[derive(Debug, Deserialize, JsonSchema)]
struct MatchVerdict {
    is_same_event: bool,
    confidence_score: f64,
    #[allow(dead_code)]
    #[serde(default)]
    reasoning: String,
}

pub(crate) struct SemanticMatcher {
    llm: Arc<dyn Llm>,
    cache: Mutex<LruCache<String, bool>>,
}

impl SemanticMatcher {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        let capacity = NonZeroUsize::new(VERDICT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { llm, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Adjudicate a pair. Returns (same_event, served_from_cache).
    pub async fn is_same_event(
        &self,
        a: &MergerInput,
        b: &MergerInput,
    ) -> Result<(bool, bool)> {
        let key = pair_cache_key(a, b);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(verdict) = cache.get(&key) {
                return Ok((*verdict, true));
            }
        }

        let request = ChatRequest::new(vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Event A:\n{}\n\nEvent B:\n{}",
                serialize_event(a),
                serialize_event(b)
            )),
        ])
        .temperature(0.0)
        .max_tokens(512)
        .json_mode();

        let response = self.llm.chat(request).await.context("semantic match call")?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::anyhow!("no JSON in semantic match response"))?;
        let verdict: MatchVerdict = serde_json::from_value(value).context("semantic match schema")?;

        let same = verdict.is_same_event && verdict.confidence_score >= CONFIDENCE_THRESHOLD;
        debug!(
            same,
            confidence = verdict.confidence_score,
            "semantic match adjudicated"
        );
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, same);
        }
        Ok((same, false))
    }
}

/// Canonical feature tuple for one event: (md5(desc)[:8], sorted entity
/// uuids, year).
pub(crate) fn event_feature_key(input: &MergerInput) -> String {
    let hash = short_description_hash(&input.event.description);
    let uuids: BTreeSet<Uuid> = input.entities.iter().map(|e| e.id).collect();
    let uuid_list = uuids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let year = input
        .event
        .date_info
        .as_ref()
        .and_then(|d| d.event_year())
        .map(|y| y.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("{hash}|{uuid_list}|{year}")
}

/// Order-independent cache key: the two feature tuples, sorted.
pub(crate) fn pair_cache_key(a: &MergerInput, b: &MergerInput) -> String {
    let mut keys = [event_feature_key(a), event_feature_key(b)];
    keys.sort();
    format!("{}||{}", keys[0], keys[1])
}

fn serialize_event(input: &MergerInput) -> String {
    let mut out = String::new();
    out.push_str(&format!("description: {}\n", input.event.description));
    out.push_str(&format!("date: {}\n", input.event.event_date_str));
    if let Some(range) = input.event.date_info.as_ref().and_then(|d| d.to_date_range()) {
        out.push_str(&format!("date_range: {} .. {}\n", range.start, range.end));
    }
    if !input.entities.is_empty() {
        let entities = input
            .entities
            .iter()
            .map(|e| format!("({}, {}, {})", e.entity_name, e.entity_type, e.id))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("entities: {entities}\n"));
    }
    if let Some(source) = input.sources.first() {
        out.push_str(&format!("language: {}\n", source.source_language));
        if let Some(snippet) = &source.snippet {
            out.push_str(&format!("snippet: {snippet}\n"));
        }
    }
    out
}

const SYSTEM_PROMPT: &str = r#"You decide whether two extracted descriptions refer to the SAME real-world historical event.

Same event means: same happening, same actors, same time — even when the two descriptions come from different sources, languages, or levels of detail. Different phases or consequences of a larger development are DIFFERENT events.

Return JSON:
{"is_same_event": true|false, "confidence_score": <0.0..1.0>, "reasoning": "<one sentence>"}

Return JSON only."#;

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_common::{Entity, Event};
    use chronicle_store::EventSourceInfo;

    fn input(description: &str, entity_ids: &[u128]) -> MergerInput {
        MergerInput {
            event: Event {
                id: Uuid::new_v4(),
                description: description.to_string(),
                event_date_str: "1969".to_string(),
                date_info: None,
            },
            entities: entity_ids
                .iter()
                .map(|n| Entity {
                    id: Uuid::from_u128(*n),
                    entity_name: format!("e{n}"),
                    entity_type: "thing".to_string(),
                    language: "en".to_string(),
                    is_verified_existent: None,
                })
                .collect(),
            sources: vec![EventSourceInfo {
                raw_event_id: Uuid::new_v4(),
                source_url: "https://example.org".to_string(),
                source_page_title: "Example".to_string(),
                source_language: "en".to_string(),
                snippet: None,
            }],
            relevance: None,
        }
    }

    #[test]
    fn pair_key_is_order_independent() {
        let a = input("Apollo 11 lands on the Moon", &[1, 2]);
        let b = input("First crewed Moon landing", &[2, 3]);
        assert_eq!(pair_cache_key(&a, &b), pair_cache_key(&b, &a));
    }

    #[test]
    fn pair_key_ignores_entity_order() {
        let a = input("Apollo 11 lands", &[1, 2]);
        let b = input("Apollo 11 lands", &[2, 1]);
        assert_eq!(event_feature_key(&a), event_feature_key(&b));
    }

    #[test]
    fn different_descriptions_have_different_keys() {
        let a = input("Apollo 11 lands", &[1]);
        let b = input("Apollo 12 lands", &[1]);
        assert_ne!(event_feature_key(&a), event_feature_key(&b));
    }
}
