//! Representative selection for merged groups: LLM pick with a
//! deterministic heuristic fallback, plus repair of missing date fields.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use chronicle_common::{DatePrecision, EntityMention};
use llm_client::json::extract_json;
use llm_client::{ChatRequest, Message};

use crate::traits::Llm;

use super::{MergerInput, RepresentativeEvent};

#[derive(Debug, Deserialize)]
struct PickResponse {
    best_event_id: Uuid,
}

/// Pick the most comprehensive contributor of a multi-event group.
/// Returns an index into `contributors`.
pub(crate) async fn select_representative(
    llm: &Arc<dyn Llm>,
    contributors: &[&MergerInput],
    user_language: &str,
) -> usize {
    if contributors.len() == 1 {
        return 0;
    }

    match llm_pick(llm, contributors).await {
        Some(index) => index,
        None => {
            debug!("representative pick fell back to heuristic");
            heuristic_pick(contributors, user_language)
        }
    }
}

async fn llm_pick(llm: &Arc<dyn Llm>, contributors: &[&MergerInput]) -> Option<usize> {
    let listing = contributors
        .iter()
        .map(|c| {
            format!(
                "- id: {} | date: {} | description: {}",
                c.event.id, c.event.event_date_str, c.event.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let request = ChatRequest::new(vec![
        Message::system(PICK_PROMPT),
        Message::user(listing),
    ])
    .temperature(0.0)
    .max_tokens(256)
    .json_mode();

    let response = match llm.chat(request).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "representative pick call failed");
            return None;
        }
    };
    let value = extract_json(&response.content)?;
    let pick: PickResponse = serde_json::from_value(value).ok()?;
    contributors.iter().position(|c| c.event.id == pick.best_event_id)
}

/// Deterministic fallback: prefer the user's language, then English; longer
/// descriptions and finer date precision win ties.
pub(crate) fn heuristic_pick(contributors: &[&MergerInput], user_language: &str) -> usize {
    let mut best_index = 0usize;
    let mut best_score = f64::MIN;

    for (index, contributor) in contributors.iter().enumerate() {
        let language = contributor
            .sources
            .first()
            .map(|s| s.source_language.as_str())
            .unwrap_or("");
        let mut score = if language == user_language {
            100.0
        } else if language == "en" {
            50.0
        } else {
            0.0
        };
        score += contributor.event.description.chars().count() as f64 * 0.1;
        score += match contributor.event.date_info.as_ref().map(|d| d.precision) {
            Some(DatePrecision::Day) => 30.0,
            Some(DatePrecision::Month) => 20.0,
            Some(DatePrecision::Year) => 10.0,
            _ => 0.0,
        };
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }
    best_index
}

/// Build the group's public face from the chosen contributor, repairing
/// missing date fields from the other members.
pub(crate) fn build_representative(
    contributors: &[&MergerInput],
    chosen: usize,
) -> RepresentativeEvent {
    let primary = contributors[chosen];

    let mut date_info = primary.event.date_info.clone();
    if date_info.as_ref().and_then(|d| d.to_date_range()).is_none() {
        if let Some(donor) = contributors
            .iter()
            .find(|c| c.event.date_info.as_ref().and_then(|d| d.to_date_range()).is_some())
        {
            date_info = donor.event.date_info.clone();
        }
    }

    let mut event_date_str = primary.event.event_date_str.clone();
    if event_date_str.trim().is_empty() {
        if let Some(donor) = contributors
            .iter()
            .find(|c| !c.event.event_date_str.trim().is_empty())
        {
            event_date_str = donor.event.event_date_str.clone();
        }
    }
    if event_date_str.trim().is_empty() {
        event_date_str = date_info
            .as_ref()
            .and_then(|d| d.event_year())
            .map(|y| y.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
    }

    let main_entities: Vec<EntityMention> = primary
        .entities
        .iter()
        .map(|e| EntityMention {
            name: e.entity_name.clone(),
            entity_type: e.entity_type.clone(),
            language: e.language.clone(),
        })
        .collect();

    let source = primary.sources.first();
    RepresentativeEvent {
        event_id: primary.event.id,
        description: primary.event.description.clone(),
        timestamp: date_info.as_ref().and_then(|d| d.start_timestamp()),
        event_date_str,
        date_info,
        main_entities,
        snippet: source.and_then(|s| s.snippet.clone()),
        source_url: source.map(|s| s.source_url.clone()).unwrap_or_default(),
        source_page_title: source.map(|s| s.source_page_title.clone()).unwrap_or_default(),
        source_language: source.map(|s| s.source_language.clone()).unwrap_or_default(),
    }
}

const PICK_PROMPT: &str = r#"Several extracted descriptions refer to the same historical event. Pick the single most comprehensive one: the description that is most complete, most precisely dated, and most informative.

Return JSON: {"best_event_id": "<the id of the best entry>"}. Return JSON only."#;
