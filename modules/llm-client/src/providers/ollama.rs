use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::LlmError;
use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, MessageRole, ResponseFormat};

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Local Ollama backend (`/api/chat`, non-streaming). No credentials; the
/// daemon being unreachable classifies as a network error.
#[derive(Clone)]
pub struct Ollama {
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl Ollama {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: OLLAMA_DEFAULT_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| OLLAMA_DEFAULT_URL.to_string());
        Self::new(model).with_base_url(base_url)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut options = json!({});
        if let Some(t) = request.temperature {
            options["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            options["num_predict"] = json!(m);
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": options,
        });
        if request.response_format == ResponseFormat::Json {
            body["format"] = json!("json");
        }

        debug!(model = %self.model, "Ollama chat request");

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

        let parsed: OllamaResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Malformed(e.to_string()))?;

        Ok(ChatResponse {
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            truncated: parsed.done_reason.as_deref() == Some("length"),
            model: self.model.clone(),
        })
    }
}
