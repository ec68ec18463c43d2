//! Canonical viewpoint protocol: one source document → its persisted
//! event set, with content-addressed reuse and per-article atomicity.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

use chronicle_common::{EntityMention, ProcessingStatus, SourceArticle};
use chronicle_store::CanonicalEventInput;

use crate::entity_linker::EntityLinker;
use crate::event_extractor::EventExtractor;
use crate::traits::TimelineStore;

/// Result of the canonical protocol for one article.
#[derive(Debug, Clone)]
pub struct CanonicalOutcome {
    pub document: chronicle_common::SourceDocument,
    pub event_ids: Vec<Uuid>,
    pub reused: bool,
}

pub struct CanonicalViewpointService {
    store: Arc<dyn TimelineStore>,
    extractor: EventExtractor,
    linker: EntityLinker,
    reuse_base_viewpoint: bool,
}

impl CanonicalViewpointService {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        extractor: EventExtractor,
        linker: EntityLinker,
        reuse_base_viewpoint: bool,
    ) -> Self {
        Self { store, extractor, linker, reuse_base_viewpoint }
    }

    /// Return the event ids of the article's canonical viewpoint, creating
    /// it if needed. Reuse short-circuits extraction entirely when the
    /// document was already processed to completion.
    pub async fn get_or_create_canonical(
        &self,
        article: &SourceArticle,
        data_source_preference: &str,
    ) -> Result<CanonicalOutcome> {
        // 1. Upsert the document identity.
        let document = self
            .store
            .upsert_source_document(article)
            .await
            .context("upsert source document")?;

        // 2. Reuse hit: the events already exist.
        if self.reuse_base_viewpoint && document.processing_status == ProcessingStatus::Completed {
            if let Some(viewpoint) = self.store.find_completed_canonical(document.id).await? {
                let event_ids = self.store.event_ids_for_viewpoint(viewpoint.id).await?;
                info!(
                    document_id = %document.id,
                    events = event_ids.len(),
                    "reusing canonical viewpoint"
                );
                return Ok(CanonicalOutcome { document, event_ids, reused: true });
            }
        }

        // 3. Extract events from the article text.
        let events = self
            .extractor
            .extract(&article.text_content, &article.language)
            .await
            .context("event extraction")?;
        if events.is_empty() {
            debug!(document_id = %document.id, "article produced no events");
            return Ok(CanonicalOutcome { document, event_ids: Vec::new(), reused: false });
        }

        // 4. Resolve entities for the whole article in one batch.
        let mentions: Vec<EntityMention> = events
            .iter()
            .flat_map(|e| e.main_entities.iter().cloned())
            .collect();
        let responses = self
            .linker
            .batch_get_or_create(&mentions)
            .await
            .context("entity linking")?;

        // Re-slice the flat response list back onto events.
        let mut cursor = 0usize;
        let mut inputs = Vec::with_capacity(events.len());
        for event in events {
            let count = event.main_entities.len();
            let entity_ids = responses[cursor..cursor + count]
                .iter()
                .filter_map(|r| r.entity_id)
                .collect();
            cursor += count;
            inputs.push(CanonicalEventInput { event, entity_ids });
        }

        // 5.–6. Single transaction with rollback-to-failed semantics,
        // owned by the store.
        let event_ids = self
            .store
            .persist_canonical(&document, &inputs, data_source_preference)
            .await
            .context("persist canonical viewpoint")?;
        Ok(CanonicalOutcome { document, event_ids, reused: false })
    }
}
