//! LLM-backed date normalization (raw date strings → [`ParsedDate`]).
//!
//! The parser never converts calendars itself; it trusts the model's
//! structured output and only validates shape. Unparseable or too-vague
//! inputs come back as `precision=unknown` rather than errors.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use chronicle_common::{DatePrecision, ParsedDate};
use llm_client::json::extract_json;
use llm_client::{ChatRequest, Message};

use crate::traits::Llm;

pub struct DateParser {
    llm: Arc<dyn Llm>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BatchEntry {
    id: String,
    #[serde(flatten)]
    date: ParsedDate,
}

impl DateParser {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm, max_tokens: 4096 }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub async fn parse_single(&self, raw: &str) -> Result<Option<ParsedDate>> {
        let mut map = self
            .parse_batch(&[("0".to_string(), raw.to_string())])
            .await?;
        Ok(map.remove("0"))
    }

    /// Parse many date strings in one call. The result maps each input id to
    /// its parsed date; ids the model failed on map to `precision=unknown`.
    pub async fn parse_batch(
        &self,
        items: &[(String, String)],
    ) -> Result<HashMap<String, ParsedDate>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        let payload: Vec<serde_json::Value> = items
            .iter()
            .map(|(id, date_str)| serde_json::json!({ "id": id, "date_str": date_str }))
            .collect();

        let request = ChatRequest::new(vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(
                serde_json::to_string(&payload).context("serialize date batch")?,
            ),
        ])
        .temperature(0.0)
        .max_tokens(self.max_tokens)
        .json_mode();

        let response = self.llm.chat(request).await.context("batch date parse call")?;
        let value = extract_json(&response.content)
            .ok_or_else(|| anyhow::anyhow!("no JSON in date parse response"))?;

        let entries: Vec<BatchEntry> = serde_json::from_value(value)
            .context("date parse schema")?;

        let mut out = HashMap::with_capacity(items.len());
        for entry in entries {
            out.insert(entry.id, sanitize(entry.date));
        }
        // Fill gaps so callers always get an answer per input.
        for (id, raw) in items {
            if !out.contains_key(id) {
                warn!(id, raw, "date parser omitted an input, marking unknown");
                out.insert(id.clone(), ParsedDate::unknown(raw.clone()));
            }
        }
        debug!(requested = items.len(), parsed = out.len(), "batch date parse complete");
        Ok(out)
    }
}

/// Shape validation on top of the model output. A date claiming precision
/// but missing its start year is demoted to unknown; BCE must be negative.
fn sanitize(mut date: ParsedDate) -> ParsedDate {
    if date.precision != DatePrecision::Unknown && date.start_year.is_none() {
        warn!(original = %date.original_text, "precision without start_year, demoting to unknown");
        return ParsedDate::unknown(date.original_text);
    }
    if date.is_bce {
        if let Some(y) = date.start_year {
            if y > 0 {
                date.start_year = Some(-y);
            }
        }
        if let Some(y) = date.end_year {
            if y > 0 {
                date.end_year = Some(-y);
            }
        }
    }
    date
}

const SYSTEM_PROMPT: &str = r#"You normalize raw historical date expressions into structured JSON.

Input: a JSON array of {"id": "...", "date_str": "..."}.
Output: a JSON array, one object per input, each:

{
  "id": "<input id>",
  "original_text": "<input date_str>",
  "display_text": "<clean human-readable form>",
  "precision": "day" | "month" | "year" | "decade" | "century" | "millennium" | "era" | "unknown",
  "start_year": int or null, "start_month": int or null, "start_day": int or null,
  "end_year": int or null, "end_month": int or null, "end_day": int or null,
  "is_bce": true | false
}

Rules:
- BCE years are NEGATIVE integers (450 BCE → -450) and is_bce is true.
- Century N CE spans (N-1)*100+1 .. N*100 (19th century → start_year 1801, end_year 1900).
- Century N BCE spans -(N*100) .. -((N-1)*100+1) (5th century BCE → start_year -500, end_year -401).
- A bare year gets precision "year" with start_year = end_year = that year.
- Date ranges ("1939-1945") keep precision of their endpoints and set both bounds.
- If the expression is too vague to anchor ("ancient times", "long ago"), use precision "unknown" and null all numeric fields.
- Never invent month or day values that are not in the input.
- Return JSON only."#;
