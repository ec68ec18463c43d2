//! Store-boundary value types.

use chronicle_common::{Entity, Event, ParsedDate, ProcessedEvent};
use uuid::Uuid;

/// One unique processed event ready for canonical persistence, with its
/// resolved entity ids (order matches the event's mention list, deduplicated).
#[derive(Debug, Clone)]
pub struct CanonicalEventInput {
    pub event: ProcessedEvent,
    pub entity_ids: Vec<Uuid>,
}

/// Provenance of one raw-event contribution, denormalized for the merger.
#[derive(Debug, Clone)]
pub struct EventSourceInfo {
    pub raw_event_id: Uuid,
    pub source_url: String,
    pub source_page_title: String,
    pub source_language: String,
    pub snippet: Option<String>,
}

/// An event loaded with everything the merger needs in one batch.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event: Event,
    pub entities: Vec<Entity>,
    pub sources: Vec<EventSourceInfo>,
}

/// One row of the final synthetic viewpoint, produced from a merged group.
///
/// `existing_event_id` reuses a single-contributor event as-is; otherwise a
/// new consolidated event is created from the description/date fields.
/// `relevance_score = None` means unknown, which is distinct from 0.0.
#[derive(Debug, Clone)]
pub struct NewViewpointEvent {
    pub existing_event_id: Option<Uuid>,
    pub description: String,
    pub event_date_str: String,
    pub date_info: Option<ParsedDate>,
    pub raw_event_ids: Vec<Uuid>,
    pub entity_ids: Vec<Uuid>,
    pub relevance_score: Option<f64>,
}
