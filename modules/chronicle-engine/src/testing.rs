//! Test doubles for the pipeline trait boundaries.
//!
//! MockLlm — needle-routed scripted responses with a call log.
//! MockWiki — HashMap-backed pages, langlinks and news results.
//! InMemoryStore — a stateful TimelineStore; no database.
//! FixedEmbedder — deterministic vectors with per-text overrides.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use chronicle_common::{
    raw_event_signature, Entity, Event, ProcessingStatus, ProgressEvent, SourceArticle,
    SourceDocument, Task, TaskStatus, TaskType, Viewpoint, ViewpointStatus, ViewpointType,
};
use chronicle_store::{CanonicalEventInput, EventContext, EventSourceInfo, NewViewpointEvent};
use llm_client::{ChatRequest, ChatResponse, LlmError};
use wiki_client::{CrossLingualOutcome, CrossLingualPage, NewsArticle, WikiError, WikiPage};

use crate::embedder::TextEmbedder;
use crate::traits::{Llm, TimelineStore, WikiFetcher};

// ---------------------------------------------------------------------------
// MockLlm
// ---------------------------------------------------------------------------

/// Routes each chat call to the first registered rule whose needles all
/// appear in the request's concatenated message content. Calls are logged
/// for activity assertions.
pub struct MockLlm {
    rules: Vec<(Vec<String>, String)>,
    fallback: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self { rules: Vec::new(), fallback: None, calls: Mutex::new(Vec::new()) }
    }

    /// Respond with `response` when the request contains `needle`.
    pub fn on(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((vec![needle.to_string()], response.to_string()));
        self
    }

    /// Respond with `response` when the request contains every needle.
    pub fn on_all(mut self, needles: &[&str], response: &str) -> Self {
        self.rules
            .push((needles.iter().map(|n| n.to_string()).collect(), response.to_string()));
        self
    }

    pub fn fallback(mut self, response: &str) -> Self {
        self.fallback = Some(response.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of logged calls containing every given needle.
    pub fn calls_matching(&self, needles: &[&str]) -> usize {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|content| needles.iter().all(|n| content.contains(n)))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let content: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(content.clone());
        }

        for (needles, response) in &self.rules {
            if needles.iter().all(|n| content.contains(n.as_str())) {
                return Ok(ChatResponse {
                    content: response.clone(),
                    truncated: false,
                    model: "mock".to_string(),
                });
            }
        }
        match &self.fallback {
            Some(response) => Ok(ChatResponse {
                content: response.clone(),
                truncated: false,
                model: "mock".to_string(),
            }),
            None => Err(LlmError::BadRequest(format!(
                "MockLlm: no rule matches request: {}",
                llm_client::json::truncate_to_char_boundary(&content, 120)
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockWiki
// ---------------------------------------------------------------------------

pub struct MockWiki {
    pages: HashMap<(String, String), WikiPage>,
    langlinks: HashMap<(String, String, String), String>,
    news: HashMap<(String, String), Vec<NewsArticle>>,
}

impl MockWiki {
    pub fn new() -> Self {
        Self { pages: HashMap::new(), langlinks: HashMap::new(), news: HashMap::new() }
    }

    pub fn on_page(mut self, title: &str, lang: &str, text: &str) -> Self {
        let page = WikiPage {
            title: title.to_string(),
            url: format!("https://{lang}.wikipedia.org/wiki/{}", title.replace(' ', "_")),
            page_id: Some(self.pages.len() as u64 + 1),
            text: text.to_string(),
            language: lang.to_string(),
            redirect: None,
        };
        self.pages.insert((title.to_string(), lang.to_string()), page);
        self
    }

    pub fn on_langlink(mut self, title: &str, source_lang: &str, target_lang: &str, target_title: &str) -> Self {
        self.langlinks.insert(
            (title.to_string(), source_lang.to_string(), target_lang.to_string()),
            target_title.to_string(),
        );
        self
    }

    pub fn on_news(mut self, query: &str, lang: &str, articles: Vec<NewsArticle>) -> Self {
        self.news.insert((query.to_string(), lang.to_string()), articles);
        self
    }
}

impl Default for MockWiki {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WikiFetcher for MockWiki {
    async fn get_page(&self, title: &str, lang: &str) -> Result<WikiPage, WikiError> {
        self.pages
            .get(&(title.to_string(), lang.to_string()))
            .cloned()
            .ok_or_else(|| WikiError::NotFound(format!("{lang}:{title}")))
    }

    async fn get_page_for_target_lang(
        &self,
        source_title: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<CrossLingualPage, WikiError> {
        if source_lang == target_lang {
            let page = self.get_page(source_title, source_lang).await?;
            return Ok(CrossLingualPage { page, outcome: CrossLingualOutcome::Direct });
        }
        let key = (source_title.to_string(), source_lang.to_string(), target_lang.to_string());
        if let Some(target_title) = self.langlinks.get(&key) {
            let page = self.get_page(target_title, target_lang).await?;
            return Ok(CrossLingualPage { page, outcome: CrossLingualOutcome::ViaLangLink });
        }
        let page = self.get_page(source_title, target_lang).await?;
        Ok(CrossLingualPage { page, outcome: CrossLingualOutcome::FallbackExactTitle })
    }

    async fn search_news(&self, query: &str, lang: &str) -> Result<Vec<NewsArticle>, WikiError> {
        Ok(self
            .news
            .get(&(query.to_string(), lang.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    documents: HashMap<(String, String), SourceDocument>,
    raw_events: HashMap<Uuid, (Uuid, String, Option<String>)>,
    events: HashMap<Uuid, Event>,
    entities: HashMap<(String, String, String), Entity>,
    viewpoints: HashMap<Uuid, Viewpoint>,
    viewpoint_events: Vec<(Uuid, Uuid, Option<f64>)>,
    event_raw: Vec<(Uuid, Uuid)>,
    event_entities: Vec<(Uuid, Uuid)>,
    tasks: HashMap<Uuid, Task>,
    progress: Vec<ProgressEvent>,
    fail_persist_for: HashSet<String>,
}

/// Stateful in-memory TimelineStore for deterministic pipeline tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `persist_canonical` fail for a given source_identifier, to
    /// exercise per-article failure isolation.
    pub fn fail_persist_for(&self, source_identifier: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_persist_for.insert(source_identifier.to_string());
        }
    }

    pub fn insert_task(&self, task: Task) {
        if let Ok(mut state) = self.state.lock() {
            state.tasks.insert(task.id, task);
        }
    }

    pub fn insert_completed_synthetic(&self, topic: &str, data_source_preference: &str) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut state) = self.state.lock() {
            state.viewpoints.insert(
                id,
                Viewpoint {
                    id,
                    topic: topic.to_string(),
                    viewpoint_type: ViewpointType::Synthetic,
                    status: ViewpointStatus::Completed,
                    data_source_preference: data_source_preference.to_string(),
                    canonical_source_id: None,
                },
            );
        }
        id
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.state.lock().ok()?.tasks.get(&id).cloned()
    }

    pub fn viewpoint(&self, id: Uuid) -> Option<Viewpoint> {
        self.state.lock().ok()?.viewpoints.get(&id).cloned()
    }

    pub fn viewpoint_event_scores(&self, viewpoint_id: Uuid) -> Vec<(Uuid, Option<f64>)> {
        self.state
            .lock()
            .map(|state| {
                state
                    .viewpoint_events
                    .iter()
                    .filter(|(v, _, _)| *v == viewpoint_id)
                    .map(|(_, e, s)| (*e, *s))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn progress_steps(&self, step: &str) -> Vec<ProgressEvent> {
        self.state
            .lock()
            .map(|state| {
                state
                    .progress
                    .iter()
                    .filter(|p| p.step == step)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn document_status(&self, source_identifier: &str) -> Option<ProcessingStatus> {
        let state = self.state.lock().ok()?;
        state
            .documents
            .values()
            .find(|d| d.source_identifier == source_identifier)
            .map(|d| d.processing_status)
    }

    pub fn event(&self, id: Uuid) -> Option<Event> {
        self.state.lock().ok()?.events.get(&id).cloned()
    }

    pub fn raw_event_ids_for_event(&self, event_id: Uuid) -> Vec<Uuid> {
        self.state
            .lock()
            .map(|state| {
                state
                    .event_raw
                    .iter()
                    .filter(|(e, _)| *e == event_id)
                    .map(|(_, r)| *r)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl TimelineStore for InMemoryStore {
    async fn upsert_source_document(&self, article: &SourceArticle) -> Result<SourceDocument> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        let key = (article.source_name.clone(), article.source_identifier.clone());
        let document = state.documents.entry(key).or_insert_with(|| SourceDocument {
            id: Uuid::new_v4(),
            source_name: article.source_name.clone(),
            source_identifier: article.source_identifier.clone(),
            title: article.title.clone(),
            url: article.source_url.clone(),
            language: article.language.clone(),
            source_type: article.source_type.clone(),
            processing_status: ProcessingStatus::Pending,
        });
        Ok(document.clone())
    }

    async fn set_source_document_status(&self, id: Uuid, status: ProcessingStatus) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        for document in state.documents.values_mut() {
            if document.id == id {
                document.processing_status = status;
            }
        }
        Ok(())
    }

    async fn find_completed_canonical(
        &self,
        source_document_id: Uuid,
    ) -> Result<Option<Viewpoint>> {
        let state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        Ok(state
            .viewpoints
            .values()
            .find(|v| {
                v.canonical_source_id == Some(source_document_id)
                    && v.status == ViewpointStatus::Completed
            })
            .cloned())
    }

    async fn event_ids_for_viewpoint(&self, viewpoint_id: Uuid) -> Result<Vec<Uuid>> {
        let state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        Ok(state
            .viewpoint_events
            .iter()
            .filter(|(v, _, _)| *v == viewpoint_id)
            .map(|(_, e, _)| *e)
            .collect())
    }

    async fn persist_canonical(
        &self,
        document: &SourceDocument,
        inputs: &[CanonicalEventInput],
        data_source_preference: &str,
    ) -> Result<Vec<Uuid>> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;

        if state.fail_persist_for.contains(&document.source_identifier) {
            for doc in state.documents.values_mut() {
                if doc.id == document.id {
                    doc.processing_status = ProcessingStatus::Failed;
                }
            }
            anyhow::bail!("simulated persistence failure");
        }

        let viewpoint_id = Uuid::new_v4();
        state.viewpoints.insert(
            viewpoint_id,
            Viewpoint {
                id: viewpoint_id,
                topic: document.title.clone(),
                viewpoint_type: ViewpointType::Canonical,
                status: ViewpointStatus::Completed,
                data_source_preference: data_source_preference.to_string(),
                canonical_source_id: Some(document.id),
            },
        );

        let mut seen = HashSet::new();
        let mut event_ids = Vec::new();
        for input in inputs {
            let signature = raw_event_signature(
                document.id,
                &input.event.description,
                &input.event.event_date_str,
            );
            if !seen.insert(signature.clone()) {
                continue;
            }
            let raw_event_id = Uuid::new_v4();
            state.raw_events.insert(
                raw_event_id,
                (document.id, signature, input.event.source_text_snippet.clone()),
            );
            let event_id = Uuid::new_v4();
            state.events.insert(
                event_id,
                Event {
                    id: event_id,
                    description: input.event.description.clone(),
                    event_date_str: input.event.event_date_str.clone(),
                    date_info: input.event.date_info.clone(),
                },
            );
            state.event_raw.push((event_id, raw_event_id));
            for entity_id in &input.entity_ids {
                if !state.event_entities.contains(&(event_id, *entity_id)) {
                    state.event_entities.push((event_id, *entity_id));
                }
            }
            state.viewpoint_events.push((viewpoint_id, event_id, None));
            event_ids.push(event_id);
        }

        for doc in state.documents.values_mut() {
            if doc.id == document.id {
                doc.processing_status = ProcessingStatus::Completed;
            }
        }
        Ok(event_ids)
    }

    async fn get_or_create_entities(
        &self,
        mentions: &[(String, String, String)],
    ) -> Result<Vec<Entity>> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        Ok(mentions
            .iter()
            .map(|(name, entity_type, language)| {
                state
                    .entities
                    .entry((name.clone(), entity_type.clone(), language.clone()))
                    .or_insert_with(|| Entity {
                        id: Uuid::new_v4(),
                        entity_name: name.clone(),
                        entity_type: entity_type.clone(),
                        language: language.clone(),
                        is_verified_existent: None,
                    })
                    .clone()
            })
            .collect())
    }

    async fn load_event_contexts(&self, event_ids: &[Uuid]) -> Result<Vec<EventContext>> {
        let state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        let entity_by_id: HashMap<Uuid, Entity> =
            state.entities.values().map(|e| (e.id, e.clone())).collect();

        Ok(event_ids
            .iter()
            .filter_map(|id| {
                let event = state.events.get(id)?.clone();
                let entities = state
                    .event_entities
                    .iter()
                    .filter(|(e, _)| e == id)
                    .filter_map(|(_, entity_id)| entity_by_id.get(entity_id).cloned())
                    .collect();
                let sources = state
                    .event_raw
                    .iter()
                    .filter(|(e, _)| e == id)
                    .filter_map(|(_, raw_id)| {
                        let (doc_id, _, snippet) = state.raw_events.get(raw_id)?;
                        let document = state.documents.values().find(|d| d.id == *doc_id)?;
                        Some(EventSourceInfo {
                            raw_event_id: *raw_id,
                            source_url: document.url.clone(),
                            source_page_title: document.title.clone(),
                            source_language: document.language.clone(),
                            snippet: snippet.clone(),
                        })
                    })
                    .collect();
                Some(EventContext { event, entities, sources })
            })
            .collect())
    }

    async fn find_reusable_synthetic(
        &self,
        topic: &str,
        data_source_preference: &str,
    ) -> Result<Option<Viewpoint>> {
        let state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        Ok(state
            .viewpoints
            .values()
            .find(|v| {
                v.topic == topic
                    && v.data_source_preference == data_source_preference
                    && v.viewpoint_type == ViewpointType::Synthetic
                    && v.status == ViewpointStatus::Completed
            })
            .cloned())
    }

    async fn create_viewpoint(
        &self,
        topic: &str,
        viewpoint_type: ViewpointType,
        data_source_preference: &str,
    ) -> Result<Viewpoint> {
        let viewpoint = Viewpoint {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            viewpoint_type,
            status: ViewpointStatus::Populating,
            data_source_preference: data_source_preference.to_string(),
            canonical_source_id: None,
        };
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        state.viewpoints.insert(viewpoint.id, viewpoint.clone());
        Ok(viewpoint)
    }

    async fn set_viewpoint_status(&self, id: Uuid, status: ViewpointStatus) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        if let Some(viewpoint) = state.viewpoints.get_mut(&id) {
            viewpoint.status = status;
        }
        Ok(())
    }

    async fn materialize_synthetic(
        &self,
        viewpoint_id: Uuid,
        items: &[NewViewpointEvent],
    ) -> Result<usize> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        let mut written = 0usize;
        for item in items {
            let event_id = match item.existing_event_id {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    state.events.insert(
                        id,
                        Event {
                            id,
                            description: item.description.clone(),
                            event_date_str: item.event_date_str.clone(),
                            date_info: item.date_info.clone(),
                        },
                    );
                    id
                }
            };
            for raw_id in &item.raw_event_ids {
                if !state.event_raw.contains(&(event_id, *raw_id)) {
                    state.event_raw.push((event_id, *raw_id));
                }
            }
            for entity_id in &item.entity_ids {
                if !state.event_entities.contains(&(event_id, *entity_id)) {
                    state.event_entities.push((event_id, *entity_id));
                }
            }
            state
                .viewpoint_events
                .push((viewpoint_id, event_id, item.relevance_score));
            written += 1;
        }
        let status = if written > 0 { ViewpointStatus::Completed } else { ViewpointStatus::Failed };
        if let Some(viewpoint) = state.viewpoints.get_mut(&viewpoint_id) {
            viewpoint.status = status;
        }
        Ok(written)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn attach_viewpoint(&self, task_id: Uuid, viewpoint_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.viewpoint_id = Some(viewpoint_id);
        }
        Ok(())
    }

    async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        notes: Option<&str>,
        processing_duration_seconds: Option<f64>,
    ) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        if let Some(task) = state.tasks.get_mut(&id) {
            task.status = status;
            if let Some(notes) = notes {
                task.notes = Some(notes.chars().take(500).collect());
            }
            if processing_duration_seconds.is_some() {
                task.processing_duration_seconds = processing_duration_seconds;
            }
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_progress(&self, event: &ProgressEvent) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        state.progress.push(event.clone());
        Ok(())
    }
}

/// A pending synthetic-viewpoint task for tests.
pub fn test_task(topic: &str, config: serde_json::Value) -> Task {
    Task {
        id: Uuid::new_v4(),
        task_type: TaskType::SyntheticViewpoint,
        topic_text: topic.to_string(),
        status: TaskStatus::Pending,
        config,
        owner: None,
        is_public: false,
        viewpoint_id: None,
        processing_duration_seconds: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

pub const TEST_EMBEDDING_DIM: usize = 8;

/// Deterministic hash-based vectors, with per-text overrides for tests that
/// need controlled similarities.
pub struct FixedEmbedder {
    overrides: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self { overrides: HashMap::new() }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.to_string(), vector);
        self
    }
}

impl Default for FixedEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn encode(&self, text: &str, normalize: bool, _add_query_prefix: bool) -> Vec<f32> {
        if let Some(vector) = self.overrides.get(text) {
            return vector.clone();
        }
        let mut vector = vec![0.0f32; TEST_EMBEDDING_DIM];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % TEST_EMBEDDING_DIM] += byte as f32;
        }
        if normalize {
            crate::embedder::normalize_in_place(&mut vector);
        }
        vector
    }

    fn dim(&self) -> usize {
        TEST_EMBEDDING_DIM
    }
}
