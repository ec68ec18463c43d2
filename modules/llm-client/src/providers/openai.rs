use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::LlmError;
use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, MessageRole, ResponseFormat};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat backend. Also fronts any service speaking the same
/// wire protocol (set `with_base_url`).
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: String,
    embedding_model: Option<String>,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
            embedding_model: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Unavailable("openai".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single text via the `/embeddings` endpoint.
    pub async fn embed(&self, text: String) -> Result<Vec<f32>, LlmError> {
        let mut batch = self.embed_batch(vec![text]).await?;
        if batch.is_empty() {
            return Err(LlmError::Malformed("empty embedding response".to_string()));
        }
        Ok(batch.remove(0))
    }

    /// Embed multiple texts in one call. Output order matches input order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self.embedding_model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": model, "input": texts });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(LlmError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, &text));
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            index: usize,
            embedding: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Malformed(e.to_string()))?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    model: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAi {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let messages: Vec<WireMessage<'_>> = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        let mut body = json!({ "model": self.model, "messages": messages });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if request.response_format == ResponseFormat::Json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        debug!(model = %self.model, "OpenAI chat request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(LlmError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, &text));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Malformed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("empty choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::ContentFilter("finish_reason=content_filter".to_string()));
        }

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            truncated: choice.finish_reason.as_deref() == Some("length"),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}
