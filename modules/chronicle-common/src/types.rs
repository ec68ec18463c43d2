use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::dates::ParsedDate;

// --- Statuses ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ProcessingStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewpointStatus {
    Populating,
    Completed,
    Failed,
}

impl std::fmt::Display for ViewpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewpointStatus::Populating => write!(f, "populating"),
            ViewpointStatus::Completed => write!(f, "completed"),
            ViewpointStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ViewpointStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "populating" => Ok(Self::Populating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ViewpointStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewpointType {
    Canonical,
    Synthetic,
}

impl std::fmt::Display for ViewpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewpointType::Canonical => write!(f, "canonical"),
            ViewpointType::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl std::str::FromStr for ViewpointType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canonical" => Ok(Self::Canonical),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(format!("unknown ViewpointType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown TaskStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SyntheticViewpoint,
    EntityCanonical,
    DocumentCanonical,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::SyntheticViewpoint => write!(f, "synthetic_viewpoint"),
            TaskType::EntityCanonical => write!(f, "entity_canonical"),
            TaskType::DocumentCanonical => write!(f, "document_canonical"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthetic_viewpoint" => Ok(Self::SyntheticViewpoint),
            "entity_canonical" => Ok(Self::EntityCanonical),
            "document_canonical" => Ok(Self::DocumentCanonical),
            other => Err(format!("unknown TaskType: {other}")),
        }
    }
}

// --- Persisted entities (§3 data model) ---

/// An external article, uniquely identified by (source_name, source_identifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: Uuid,
    pub source_name: String,
    pub source_identifier: String,
    pub title: String,
    pub url: String,
    pub language: String,
    pub source_type: String,
    pub processing_status: ProcessingStatus,
}

/// An event as asserted by one source document. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    pub source_document_id: Uuid,
    pub original_description: String,
    pub event_date_str: String,
    pub date_info: Option<ParsedDate>,
    pub source_text_snippet: Option<String>,
    pub deduplication_signature: String,
}

/// A consolidated event usable in viewpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub description: String,
    pub event_date_str: String,
    pub date_info: Option<ParsedDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub entity_name: String,
    pub entity_type: String,
    pub language: String,
    pub is_verified_existent: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewpoint {
    pub id: Uuid,
    pub topic: String,
    pub viewpoint_type: ViewpointType,
    pub status: ViewpointStatus,
    pub data_source_preference: String,
    /// Set only for canonical viewpoints: the owning source document.
    pub canonical_source_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub topic_text: String,
    pub status: TaskStatus,
    pub config: serde_json::Value,
    pub owner: Option<String>,
    pub is_public: bool,
    pub viewpoint_id: Option<Uuid>,
    pub processing_duration_seconds: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only progress log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub task_id: Uuid,
    pub step_name: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub event_timestamp: DateTime<Utc>,
    pub request_id: String,
}

// --- In-flight pipeline values ---

/// A named thing mentioned by an event, before entity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EntityMention {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub language: String,
}

/// Extractor output after date parsing and joining (one per atomic event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub description: String,
    pub event_date_str: String,
    pub date_info: Option<ParsedDate>,
    pub main_entities: Vec<EntityMention>,
    pub source_text_snippet: Option<String>,
}

/// An article discovered by an acquisition strategy, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArticle {
    pub source_name: String,
    pub source_identifier: String,
    pub title: String,
    pub source_url: String,
    pub language: String,
    pub source_type: String,
    pub text_content: String,
}

// --- Deduplication signatures ---

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signature making a raw event unique within its source document.
pub fn raw_event_signature(source_document_id: Uuid, description: &str, date_str: &str) -> String {
    sha256_hex(&format!("{source_document_id}-{description}-{date_str}"))
}

/// Within-article extraction dedup key.
pub fn extraction_signature(description: &str, date_str: &str) -> String {
    sha256_hex(&format!("{description}-{date_str}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_stable_and_distinct() {
        let doc = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let a = raw_event_signature(doc, "Apollo 11 lands", "July 20, 1969");
        let b = raw_event_signature(doc, "Apollo 11 lands", "July 20, 1969");
        let c = raw_event_signature(doc, "Apollo 11 launches", "July 16, 1969");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn extraction_signature_separates_date_variants() {
        let a = extraction_signature("The armistice was signed", "November 11, 1918");
        let b = extraction_signature("The armistice was signed", "1918");
        assert_ne!(a, b);
    }

    #[test]
    fn status_round_trips() {
        for s in ["pending", "processing", "completed", "failed"] {
            let parsed: TaskStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        for s in ["populating", "completed", "failed"] {
            let parsed: ViewpointStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }
}
