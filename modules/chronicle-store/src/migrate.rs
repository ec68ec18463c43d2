//! Schema bootstrap. Idempotent DDL run at startup.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS source_documents (
        id UUID PRIMARY KEY,
        source_name TEXT NOT NULL,
        source_identifier TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL DEFAULT '',
        language TEXT NOT NULL DEFAULT 'en',
        source_type TEXT NOT NULL DEFAULT '',
        processing_status TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (source_name, source_identifier)
    )",
    "CREATE TABLE IF NOT EXISTS raw_events (
        id UUID PRIMARY KEY,
        source_document_id UUID NOT NULL REFERENCES source_documents(id),
        original_description TEXT NOT NULL,
        event_date_str TEXT NOT NULL DEFAULT '',
        date_info JSONB,
        source_text_snippet TEXT,
        deduplication_signature TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (source_document_id, deduplication_signature)
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id UUID PRIMARY KEY,
        description TEXT NOT NULL,
        event_date_str TEXT NOT NULL DEFAULT '',
        date_info JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS entities (
        id UUID PRIMARY KEY,
        entity_name TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        language TEXT NOT NULL DEFAULT 'en',
        is_verified_existent BOOLEAN,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (entity_name, entity_type, language)
    )",
    "CREATE TABLE IF NOT EXISTS viewpoints (
        id UUID PRIMARY KEY,
        topic TEXT NOT NULL,
        viewpoint_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'populating',
        data_source_preference TEXT NOT NULL DEFAULT '',
        canonical_source_id UUID REFERENCES source_documents(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS event_raw_event_associations (
        event_id UUID NOT NULL REFERENCES events(id),
        raw_event_id UUID NOT NULL REFERENCES raw_events(id),
        PRIMARY KEY (event_id, raw_event_id)
    )",
    "CREATE TABLE IF NOT EXISTS event_entity_associations (
        event_id UUID NOT NULL REFERENCES events(id),
        entity_id UUID NOT NULL REFERENCES entities(id),
        PRIMARY KEY (event_id, entity_id)
    )",
    "CREATE TABLE IF NOT EXISTS viewpoint_event_associations (
        viewpoint_id UUID NOT NULL REFERENCES viewpoints(id),
        event_id UUID NOT NULL REFERENCES events(id),
        relevance_score DOUBLE PRECISION,
        PRIMARY KEY (viewpoint_id, event_id)
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id UUID PRIMARY KEY,
        task_type TEXT NOT NULL,
        topic_text TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        config JSONB NOT NULL DEFAULT '{}',
        owner TEXT,
        is_public BOOLEAN NOT NULL DEFAULT false,
        viewpoint_id UUID REFERENCES viewpoints(id),
        processing_duration_seconds DOUBLE PRECISION,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS task_progress_steps (
        id BIGSERIAL PRIMARY KEY,
        task_id UUID NOT NULL REFERENCES tasks(id),
        step_name TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        data JSONB,
        event_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        request_id TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_progress_task ON task_progress_steps (task_id, event_timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_viewpoints_reuse ON viewpoints (topic, data_source_preference, status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status, updated_at)",
];

pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = DDL.len(), "schema migration complete");
    Ok(())
}
