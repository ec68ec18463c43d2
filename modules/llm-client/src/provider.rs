use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::LlmError;
use crate::json::extract_json;
use crate::retry::retry_with_policy;
use crate::types::{ChatRequest, ChatResponse, Message};

/// Uniform completion capability over a single backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One chat completion round-trip, no retries. Implementations classify
    /// transport and status failures into [`LlmError`].
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Providers keyed by name. Callers name a provider; missing credentials
/// mean the name is absent and lookups fail with `Unavailable`.
#[derive(Clone, Default)]
pub struct LlmRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: Option<String>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        if self.default_provider.is_none() {
            self.default_provider = Some(provider.name().to_string());
        }
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_default(mut self, name: &str) -> Self {
        self.default_provider = Some(name.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::Unavailable(name.to_string()))
    }

    pub fn default_provider(&self) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let name = self
            .default_provider
            .as_deref()
            .ok_or_else(|| LlmError::Unavailable("default".to_string()))?;
        self.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Retrying, timeout-bounded front door over an [`LlmProvider`].
///
/// This is what pipeline components hold: `generate_text` and
/// `generate_chat_completion` mirror the two capability operations, and
/// `extract` layers tolerant JSON parsing on top for structured calls.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
    initial_retry_delay: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(60),
            initial_retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn generate_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<ChatResponse, LlmError> {
        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;
        let label = format!("llm:{}", provider.name());
        retry_with_policy(&label, self.initial_retry_delay, || {
            let provider = Arc::clone(&provider);
            let request = request.clone();
            async move {
                match tokio::time::timeout(timeout, provider.chat(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout(timeout)),
                }
            }
        })
        .await
    }

    pub async fn generate_text(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = ChatRequest::new(vec![Message::user(prompt)])
            .temperature(temperature)
            .max_tokens(max_tokens);
        Ok(self.generate_chat_completion(request).await?.content)
    }

    /// JSON-mode call deserialized into `T`. Content-filter refusals
    /// propagate as [`LlmError::ContentFilter`] so callers can degrade to an
    /// empty result for that input.
    pub async fn extract<T: DeserializeOwned>(
        &self,
        request: ChatRequest,
    ) -> Result<T, LlmError> {
        let response = self.generate_chat_completion(request.json_mode()).await?;
        let value = extract_json(&response.content).ok_or_else(|| {
            LlmError::Malformed(format!(
                "no JSON value in {} response ({} bytes)",
                self.provider.name(),
                response.content.len()
            ))
        })?;
        debug!(provider = self.provider.name(), truncated = response.truncated, "parsed JSON response");
        serde_json::from_value(value).map_err(|e| LlmError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse { content: r#"{"ok": true}"#.into(), truncated: false, model: "m".into() })
        }
    }

    #[test]
    fn missing_provider_is_unavailable() {
        let registry = LlmRegistry::new();
        assert!(matches!(registry.get("openai"), Err(LlmError::Unavailable(_))));
    }

    #[test]
    fn first_registered_becomes_default() {
        let registry = LlmRegistry::new()
            .register(Arc::new(Fixed("gemini")))
            .register(Arc::new(Fixed("ollama")));
        assert_eq!(registry.default_provider().unwrap().name(), "gemini");
        assert_eq!(registry.provider_names(), vec!["gemini", "ollama"]);
    }

    #[tokio::test]
    async fn extract_deserializes_json_mode() {
        #[derive(serde::Deserialize)]
        struct Out {
            ok: bool,
        }
        let client = LlmClient::new(Arc::new(Fixed("test")));
        let out: Out = client
            .extract(ChatRequest::new(vec![Message::user("go")]))
            .await
            .unwrap();
        assert!(out.ok);
    }
}
