// Trait abstractions for pipeline dependencies.
//
// Llm — one chat round-trip behind the retry/timeout front door.
// WikiFetcher — the three wiki operations the acquisition strategies need.
// TimelineStore — all persistence the pipeline touches.
//
// These enable deterministic testing with MockLlm, MockWiki and
// InMemoryStore: no network, no database.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use chronicle_common::{
    Entity, ProcessingStatus, ProgressEvent, SourceArticle, SourceDocument, Task, TaskStatus,
    Viewpoint, ViewpointStatus, ViewpointType,
};
use chronicle_store::{CanonicalEventInput, EventContext, NewViewpointEvent, PgTimelineStore};
use llm_client::{ChatRequest, ChatResponse, LlmClient, LlmError};
use wiki_client::{CrossLingualPage, NewsArticle, WikiClient, WikiError, WikiPage};

// ---------------------------------------------------------------------------
// Llm
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Llm: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[async_trait]
impl Llm for LlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.generate_chat_completion(request).await
    }
}

// ---------------------------------------------------------------------------
// WikiFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait WikiFetcher: Send + Sync {
    /// Fetch a wikipedia page and its extracted plain text.
    async fn get_page(&self, title: &str, lang: &str) -> Result<WikiPage, WikiError>;

    /// Resolve a page in the target language via cross-lingual links.
    async fn get_page_for_target_lang(
        &self,
        source_title: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<CrossLingualPage, WikiError>;

    /// Search wikinews, returning full-text articles.
    async fn search_news(&self, query: &str, lang: &str) -> Result<Vec<NewsArticle>, WikiError>;
}

#[async_trait]
impl WikiFetcher for WikiClient {
    async fn get_page(&self, title: &str, lang: &str) -> Result<WikiPage, WikiError> {
        self.get_wiki_page_text(title, lang).await
    }

    async fn get_page_for_target_lang(
        &self,
        source_title: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<CrossLingualPage, WikiError> {
        self.get_wiki_page_text_for_target_lang(source_title, source_lang, target_lang)
            .await
    }

    async fn search_news(&self, query: &str, lang: &str) -> Result<Vec<NewsArticle>, WikiError> {
        self.get_wikinews(query, lang).await
    }
}

// ---------------------------------------------------------------------------
// TimelineStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TimelineStore: Send + Sync {
    // --- Source documents ---
    async fn upsert_source_document(&self, article: &SourceArticle) -> Result<SourceDocument>;
    async fn set_source_document_status(&self, id: Uuid, status: ProcessingStatus) -> Result<()>;

    // --- Canonical viewpoints ---
    async fn find_completed_canonical(&self, source_document_id: Uuid)
        -> Result<Option<Viewpoint>>;
    async fn event_ids_for_viewpoint(&self, viewpoint_id: Uuid) -> Result<Vec<Uuid>>;
    async fn persist_canonical(
        &self,
        document: &SourceDocument,
        inputs: &[CanonicalEventInput],
        data_source_preference: &str,
    ) -> Result<Vec<Uuid>>;

    // --- Entities ---
    async fn get_or_create_entities(
        &self,
        mentions: &[(String, String, String)],
    ) -> Result<Vec<Entity>>;

    // --- Event loading ---
    async fn load_event_contexts(&self, event_ids: &[Uuid]) -> Result<Vec<EventContext>>;

    // --- Synthetic viewpoints ---
    async fn find_reusable_synthetic(
        &self,
        topic: &str,
        data_source_preference: &str,
    ) -> Result<Option<Viewpoint>>;
    async fn create_viewpoint(
        &self,
        topic: &str,
        viewpoint_type: ViewpointType,
        data_source_preference: &str,
    ) -> Result<Viewpoint>;
    async fn set_viewpoint_status(&self, id: Uuid, status: ViewpointStatus) -> Result<()>;
    async fn materialize_synthetic(
        &self,
        viewpoint_id: Uuid,
        items: &[NewViewpointEvent],
    ) -> Result<usize>;

    // --- Tasks & progress ---
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>>;
    async fn attach_viewpoint(&self, task_id: Uuid, viewpoint_id: Uuid) -> Result<()>;
    async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        notes: Option<&str>,
        processing_duration_seconds: Option<f64>,
    ) -> Result<()>;
    async fn append_progress(&self, event: &ProgressEvent) -> Result<()>;
}

#[async_trait]
impl TimelineStore for PgTimelineStore {
    async fn upsert_source_document(&self, article: &SourceArticle) -> Result<SourceDocument> {
        self.upsert_source_document(article).await
    }

    async fn set_source_document_status(&self, id: Uuid, status: ProcessingStatus) -> Result<()> {
        self.set_source_document_status(id, status).await
    }

    async fn find_completed_canonical(
        &self,
        source_document_id: Uuid,
    ) -> Result<Option<Viewpoint>> {
        self.find_completed_canonical(source_document_id).await
    }

    async fn event_ids_for_viewpoint(&self, viewpoint_id: Uuid) -> Result<Vec<Uuid>> {
        self.event_ids_for_viewpoint(viewpoint_id).await
    }

    async fn persist_canonical(
        &self,
        document: &SourceDocument,
        inputs: &[CanonicalEventInput],
        data_source_preference: &str,
    ) -> Result<Vec<Uuid>> {
        self.persist_canonical(document, inputs, data_source_preference)
            .await
    }

    async fn get_or_create_entities(
        &self,
        mentions: &[(String, String, String)],
    ) -> Result<Vec<Entity>> {
        self.get_or_create_entities(mentions).await
    }

    async fn load_event_contexts(&self, event_ids: &[Uuid]) -> Result<Vec<EventContext>> {
        self.load_event_contexts(event_ids).await
    }

    async fn find_reusable_synthetic(
        &self,
        topic: &str,
        data_source_preference: &str,
    ) -> Result<Option<Viewpoint>> {
        self.find_reusable_synthetic(topic, data_source_preference)
            .await
    }

    async fn create_viewpoint(
        &self,
        topic: &str,
        viewpoint_type: ViewpointType,
        data_source_preference: &str,
    ) -> Result<Viewpoint> {
        self.create_viewpoint(topic, viewpoint_type, data_source_preference)
            .await
    }

    async fn set_viewpoint_status(&self, id: Uuid, status: ViewpointStatus) -> Result<()> {
        self.set_viewpoint_status(id, status).await
    }

    async fn materialize_synthetic(
        &self,
        viewpoint_id: Uuid,
        items: &[NewViewpointEvent],
    ) -> Result<usize> {
        self.materialize_synthetic(viewpoint_id, items).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.get_task(id).await
    }

    async fn attach_viewpoint(&self, task_id: Uuid, viewpoint_id: Uuid) -> Result<()> {
        self.attach_viewpoint(task_id, viewpoint_id).await
    }

    async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        notes: Option<&str>,
        processing_duration_seconds: Option<f64>,
    ) -> Result<()> {
        self.set_task_status(id, status, notes, processing_duration_seconds)
            .await
    }

    async fn append_progress(&self, event: &ProgressEvent) -> Result<()> {
        self.append_progress(event).await
    }
}

// ---------------------------------------------------------------------------
// Progress sink backed by the store
// ---------------------------------------------------------------------------

/// Appends every progress event to the task's database log. Uses its own
/// statement per event so pipeline transactions never hold the log hostage.
pub struct StoreProgressSink {
    store: std::sync::Arc<dyn TimelineStore>,
}

impl StoreProgressSink {
    pub fn new(store: std::sync::Arc<dyn TimelineStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl chronicle_common::ProgressSink for StoreProgressSink {
    async fn report(&self, event: &ProgressEvent) -> Result<()> {
        self.store.append_progress(event).await
    }
}
