use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::LlmError;
use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, MessageRole, ResponseFormat};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini backend (`generateContent` API).
///
/// System messages map to `system_instruction`; the remaining turns become
/// `contents` with roles `user`/`model`.
#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LlmError::Unavailable("gemini".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[async_trait]
impl LlmProvider for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let mut system_parts: Vec<serde_json::Value> = Vec::new();
        let mut contents: Vec<serde_json::Value> = Vec::new();
        for m in &request.messages {
            match m.role {
                MessageRole::System => system_parts.push(json!({ "text": m.content })),
                MessageRole::User => {
                    contents.push(json!({ "role": "user", "parts": [{ "text": m.content }] }))
                }
                MessageRole::Assistant => {
                    contents.push(json!({ "role": "model", "parts": [{ "text": m.content }] }))
                }
            }
        }

        let mut generation_config = json!({});
        if let Some(t) = request.temperature {
            generation_config["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(m);
        }
        if request.response_format == ResponseFormat::Json {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut body = json!({ "contents": contents, "generationConfig": generation_config });
        if !system_parts.is_empty() {
            body["system_instruction"] = json!({ "parts": system_parts });
        }

        debug!(model = %self.model, "Gemini chat request");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(LlmError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, &text));
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Malformed(e.to_string()))?;

        if let Some(feedback) = parsed.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                return Err(LlmError::ContentFilter(reason));
            }
        }

        let candidate = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| LlmError::Malformed("no candidates".to_string()))?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(LlmError::ContentFilter("finishReason=SAFETY".to_string()));
        }

        let content = candidate
            .content
            .and_then(|c| c.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            truncated: candidate.finish_reason.as_deref() == Some("MAX_TOKENS"),
            model: self.model.clone(),
        })
    }
}
