use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChronicleError {
    #[error("database error: {0}")]
    Database(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("article acquisition error: {0}")]
    Acquisition(String),

    #[error("event merge error: {0}")]
    Merge(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("viewpoint not found: {0}")]
    ViewpointNotFound(uuid::Uuid),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
