//! Postgres persistence for the timeline data model.
//!
//! All writes that must be atomic are scoped to either the per-article
//! canonical transaction ([`PgTimelineStore::persist_canonical`]) or the
//! orchestrator's final materialization transaction
//! ([`PgTimelineStore::materialize_synthetic`]). Progress rows use their own
//! short-lived statements so a failed pipeline stage never loses its log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use chronicle_common::{
    raw_event_signature, Entity, Event, ParsedDate, ProcessingStatus, ProgressEvent, ProgressStep,
    SourceArticle, SourceDocument, Task, TaskStatus, TaskType, Viewpoint, ViewpointStatus,
    ViewpointType,
};

use crate::models::{CanonicalEventInput, EventContext, EventSourceInfo, NewViewpointEvent};

#[derive(Clone)]
pub struct PgTimelineStore {
    pool: PgPool,
}

impl PgTimelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // --- Source documents ---

    /// Get-or-create by (source_name, source_identifier). Metadata fields are
    /// refreshed on conflict; processing_status is never clobbered here.
    pub async fn upsert_source_document(&self, article: &SourceArticle) -> Result<SourceDocument> {
        let row = sqlx::query(
            r#"
            INSERT INTO source_documents
                (id, source_name, source_identifier, title, url, language, source_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_name, source_identifier)
            DO UPDATE SET title = EXCLUDED.title, url = EXCLUDED.url
            RETURNING id, source_name, source_identifier, title, url, language,
                      source_type, processing_status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&article.source_name)
        .bind(&article.source_identifier)
        .bind(&article.title)
        .bind(&article.source_url)
        .bind(&article.language)
        .bind(&article.source_type)
        .fetch_one(&self.pool)
        .await
        .context("upsert source document")?;

        row_to_source_document(&row)
    }

    pub async fn set_source_document_status(
        &self,
        id: Uuid,
        status: ProcessingStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE source_documents SET processing_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- Canonical viewpoints ---

    /// The completed canonical viewpoint owned by a source document, if any.
    pub async fn find_completed_canonical(
        &self,
        source_document_id: Uuid,
    ) -> Result<Option<Viewpoint>> {
        let row = sqlx::query(
            r#"
            SELECT id, topic, viewpoint_type, status, data_source_preference, canonical_source_id
            FROM viewpoints
            WHERE canonical_source_id = $1 AND viewpoint_type = 'canonical' AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(source_document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_viewpoint(&r)).transpose()
    }

    pub async fn event_ids_for_viewpoint(&self, viewpoint_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            "SELECT event_id FROM viewpoint_event_associations WHERE viewpoint_id = $1",
        )
        .bind(viewpoint_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Persist a source document's canonical viewpoint in one transaction:
    /// viewpoint, raw events (deduplicated by signature), consolidated
    /// events, and all associations. On success the viewpoint and document
    /// flip to completed; on any error everything rolls back and the
    /// document is marked failed.
    pub async fn persist_canonical(
        &self,
        document: &SourceDocument,
        inputs: &[CanonicalEventInput],
        data_source_preference: &str,
    ) -> Result<Vec<Uuid>> {
        match self
            .persist_canonical_tx(document, inputs, data_source_preference)
            .await
        {
            Ok(ids) => Ok(ids),
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "canonical persistence failed, marking document failed");
                if let Err(status_err) = self
                    .set_source_document_status(document.id, ProcessingStatus::Failed)
                    .await
                {
                    warn!(document_id = %document.id, error = %status_err, "failed to record document failure");
                }
                Err(e)
            }
        }
    }

    async fn persist_canonical_tx(
        &self,
        document: &SourceDocument,
        inputs: &[CanonicalEventInput],
        data_source_preference: &str,
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let viewpoint_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO viewpoints (id, topic, viewpoint_type, status, data_source_preference, canonical_source_id)
            VALUES ($1, $2, 'canonical', 'populating', $3, $4)
            "#,
        )
        .bind(viewpoint_id)
        .bind(&document.title)
        .bind(data_source_preference)
        .bind(document.id)
        .execute(&mut *tx)
        .await?;

        let mut event_ids = Vec::with_capacity(inputs.len());
        let mut seen_signatures = std::collections::HashSet::new();

        for input in inputs {
            let signature = raw_event_signature(
                document.id,
                &input.event.description,
                &input.event.event_date_str,
            );
            // Within-article dedup: one raw event per signature.
            if !seen_signatures.insert(signature.clone()) {
                continue;
            }

            let date_info = date_info_json(&input.event.date_info)?;
            let (raw_event_id,): (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO raw_events
                    (id, source_document_id, original_description, event_date_str, date_info,
                     source_text_snippet, deduplication_signature)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source_document_id, deduplication_signature)
                DO UPDATE SET original_description = EXCLUDED.original_description
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(document.id)
            .bind(&input.event.description)
            .bind(&input.event.event_date_str)
            .bind(&date_info)
            .bind(&input.event.source_text_snippet)
            .bind(&signature)
            .fetch_one(&mut *tx)
            .await?;

            let event_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO events (id, description, event_date_str, date_info) VALUES ($1, $2, $3, $4)",
            )
            .bind(event_id)
            .bind(&input.event.description)
            .bind(&input.event.event_date_str)
            .bind(&date_info)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO event_raw_event_associations (event_id, raw_event_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(event_id)
            .bind(raw_event_id)
            .execute(&mut *tx)
            .await?;

            let mut seen_entities = std::collections::HashSet::new();
            for entity_id in &input.entity_ids {
                if !seen_entities.insert(*entity_id) {
                    continue;
                }
                sqlx::query(
                    "INSERT INTO event_entity_associations (event_id, entity_id) VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(event_id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                "INSERT INTO viewpoint_event_associations (viewpoint_id, event_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(viewpoint_id)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

            event_ids.push(event_id);
        }

        sqlx::query("UPDATE viewpoints SET status = 'completed' WHERE id = $1")
            .bind(viewpoint_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE source_documents SET processing_status = 'completed' WHERE id = $1")
            .bind(document.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(document_id = %document.id, events = event_ids.len(), "canonical viewpoint persisted");
        Ok(event_ids)
    }

    // --- Entities ---

    /// Get-or-create one entity per unique (name, type, language).
    /// Output order matches input order.
    pub async fn get_or_create_entities(
        &self,
        mentions: &[(String, String, String)],
    ) -> Result<Vec<Entity>> {
        let mut out = Vec::with_capacity(mentions.len());
        for (name, entity_type, language) in mentions {
            let row = sqlx::query(
                r#"
                INSERT INTO entities (id, entity_name, entity_type, language)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (entity_name, entity_type, language)
                DO UPDATE SET entity_name = EXCLUDED.entity_name
                RETURNING id, entity_name, entity_type, language, is_verified_existent
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(entity_type)
            .bind(language)
            .fetch_one(&self.pool)
            .await?;
            out.push(Entity {
                id: row.try_get("id")?,
                entity_name: row.try_get("entity_name")?,
                entity_type: row.try_get("entity_type")?,
                language: row.try_get("language")?,
                is_verified_existent: row.try_get("is_verified_existent")?,
            });
        }
        Ok(out)
    }

    pub async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        let row = sqlx::query(
            "SELECT id, entity_name, entity_type, language, is_verified_existent FROM entities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok(Entity {
                id: r.try_get("id")?,
                entity_name: r.try_get("entity_name")?,
                entity_type: r.try_get("entity_type")?,
                language: r.try_get("language")?,
                is_verified_existent: r.try_get("is_verified_existent")?,
            })
        })
        .transpose()
    }

    pub async fn get_source_document(&self, id: Uuid) -> Result<Option<SourceDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, source_name, source_identifier, title, url, language,
                   source_type, processing_status
            FROM source_documents WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_source_document(&r)).transpose()
    }

    /// (event_id, relevance_score) pairs for a viewpoint.
    pub async fn viewpoint_events_with_scores(
        &self,
        viewpoint_id: Uuid,
    ) -> Result<Vec<(Uuid, Option<f64>)>> {
        let rows = sqlx::query_as::<_, (Uuid, Option<f64>)>(
            "SELECT event_id, relevance_score FROM viewpoint_event_associations WHERE viewpoint_id = $1",
        )
        .bind(viewpoint_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_viewpoint(&self, id: Uuid) -> Result<Option<Viewpoint>> {
        let row = sqlx::query(
            r#"
            SELECT id, topic, viewpoint_type, status, data_source_preference, canonical_source_id
            FROM viewpoints WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_viewpoint(&r)).transpose()
    }

    // --- Event loading for the merger ---

    /// Load events with their entity and provenance associations in three
    /// batched queries (no per-event round-trips).
    pub async fn load_event_contexts(&self, event_ids: &[Uuid]) -> Result<Vec<EventContext>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = event_ids.to_vec();

        let event_rows = sqlx::query(
            "SELECT id, description, event_date_str, date_info FROM events WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let entity_rows = sqlx::query(
            r#"
            SELECT a.event_id, e.id, e.entity_name, e.entity_type, e.language, e.is_verified_existent
            FROM event_entity_associations a
            JOIN entities e ON e.id = a.entity_id
            WHERE a.event_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let source_rows = sqlx::query(
            r#"
            SELECT a.event_id, r.id AS raw_event_id, r.source_text_snippet,
                   d.url, d.title, d.language
            FROM event_raw_event_associations a
            JOIN raw_events r ON r.id = a.raw_event_id
            JOIN source_documents d ON d.id = r.source_document_id
            WHERE a.event_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut entities_by_event: std::collections::HashMap<Uuid, Vec<Entity>> =
            std::collections::HashMap::new();
        for row in &entity_rows {
            let event_id: Uuid = row.try_get("event_id")?;
            entities_by_event.entry(event_id).or_default().push(Entity {
                id: row.try_get("id")?,
                entity_name: row.try_get("entity_name")?,
                entity_type: row.try_get("entity_type")?,
                language: row.try_get("language")?,
                is_verified_existent: row.try_get("is_verified_existent")?,
            });
        }

        let mut sources_by_event: std::collections::HashMap<Uuid, Vec<EventSourceInfo>> =
            std::collections::HashMap::new();
        for row in &source_rows {
            let event_id: Uuid = row.try_get("event_id")?;
            sources_by_event.entry(event_id).or_default().push(EventSourceInfo {
                raw_event_id: row.try_get("raw_event_id")?,
                source_url: row.try_get("url")?,
                source_page_title: row.try_get("title")?,
                source_language: row.try_get("language")?,
                snippet: row.try_get("source_text_snippet")?,
            });
        }

        let mut contexts = Vec::with_capacity(event_rows.len());
        for row in &event_rows {
            let id: Uuid = row.try_get("id")?;
            contexts.push(EventContext {
                event: Event {
                    id,
                    description: row.try_get("description")?,
                    event_date_str: row.try_get("event_date_str")?,
                    date_info: date_info_from_json(row.try_get("date_info")?)?,
                },
                entities: entities_by_event.remove(&id).unwrap_or_default(),
                sources: sources_by_event.remove(&id).unwrap_or_default(),
            });
        }
        Ok(contexts)
    }

    // --- Synthetic viewpoints ---

    pub async fn find_reusable_synthetic(
        &self,
        topic: &str,
        data_source_preference: &str,
    ) -> Result<Option<Viewpoint>> {
        let row = sqlx::query(
            r#"
            SELECT id, topic, viewpoint_type, status, data_source_preference, canonical_source_id
            FROM viewpoints
            WHERE topic = $1 AND data_source_preference = $2
              AND viewpoint_type = 'synthetic' AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(topic)
        .bind(data_source_preference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_viewpoint(&r)).transpose()
    }

    pub async fn create_viewpoint(
        &self,
        topic: &str,
        viewpoint_type: ViewpointType,
        data_source_preference: &str,
    ) -> Result<Viewpoint> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO viewpoints (id, topic, viewpoint_type, status, data_source_preference)
            VALUES ($1, $2, $3, 'populating', $4)
            "#,
        )
        .bind(id)
        .bind(topic)
        .bind(viewpoint_type.to_string())
        .bind(data_source_preference)
        .execute(&self.pool)
        .await?;
        Ok(Viewpoint {
            id,
            topic: topic.to_string(),
            viewpoint_type,
            status: ViewpointStatus::Populating,
            data_source_preference: data_source_preference.to_string(),
            canonical_source_id: None,
        })
    }

    pub async fn set_viewpoint_status(&self, id: Uuid, status: ViewpointStatus) -> Result<()> {
        sqlx::query("UPDATE viewpoints SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Write the merged groups into the synthetic viewpoint in one
    /// transaction: new consolidated events for merged groups, provenance
    /// and entity associations copied over, and per-event relevance. The
    /// viewpoint flips to completed when at least one event landed.
    pub async fn materialize_synthetic(
        &self,
        viewpoint_id: Uuid,
        items: &[NewViewpointEvent],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for item in items {
            let event_id = match item.existing_event_id {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    sqlx::query(
                        "INSERT INTO events (id, description, event_date_str, date_info) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(id)
                    .bind(&item.description)
                    .bind(&item.event_date_str)
                    .bind(date_info_json(&item.date_info)?)
                    .execute(&mut *tx)
                    .await?;
                    id
                }
            };

            for raw_event_id in &item.raw_event_ids {
                sqlx::query(
                    "INSERT INTO event_raw_event_associations (event_id, raw_event_id) VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(event_id)
                .bind(raw_event_id)
                .execute(&mut *tx)
                .await?;
            }

            for entity_id in &item.entity_ids {
                sqlx::query(
                    "INSERT INTO event_entity_associations (event_id, entity_id) VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(event_id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                r#"
                INSERT INTO viewpoint_event_associations (viewpoint_id, event_id, relevance_score)
                VALUES ($1, $2, $3)
                ON CONFLICT (viewpoint_id, event_id) DO UPDATE SET relevance_score = EXCLUDED.relevance_score
                "#,
            )
            .bind(viewpoint_id)
            .bind(event_id)
            .bind(item.relevance_score)
            .execute(&mut *tx)
            .await?;

            written += 1;
        }

        let status = if written > 0 { "completed" } else { "failed" };
        sqlx::query("UPDATE viewpoints SET status = $2 WHERE id = $1")
            .bind(viewpoint_id)
            .bind(status)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(%viewpoint_id, events = written, status, "synthetic viewpoint materialized");
        Ok(written)
    }

    // --- Tasks ---

    pub async fn create_task(
        &self,
        task_type: TaskType,
        topic_text: &str,
        config: serde_json::Value,
        owner: Option<&str>,
        is_public: bool,
    ) -> Result<Task> {
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (id, task_type, topic_text, status, config, owner, is_public)
            VALUES ($1, $2, $3, 'pending', $4, $5, $6)
            RETURNING id, task_type, topic_text, status, config, owner, is_public,
                      viewpoint_id, processing_duration_seconds, notes, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task_type.to_string())
        .bind(topic_text)
        .bind(&config)
        .bind(owner)
        .bind(is_public)
        .fetch_one(&self.pool)
        .await?;
        row_to_task(&row)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT id, task_type, topic_text, status, config, owner, is_public,
                   viewpoint_id, processing_duration_seconds, notes, created_at, updated_at
            FROM tasks WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn attach_viewpoint(&self, task_id: Uuid, viewpoint_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE tasks SET viewpoint_id = $2, updated_at = now() WHERE id = $1")
            .bind(task_id)
            .bind(viewpoint_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_task_sharing(&self, task_id: Uuid, is_public: bool) -> Result<()> {
        sqlx::query("UPDATE tasks SET is_public = $2, updated_at = now() WHERE id = $1")
            .bind(task_id)
            .bind(is_public)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Terminal notes are truncated to 500 characters.
    pub async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        notes: Option<&str>,
        processing_duration_seconds: Option<f64>,
    ) -> Result<()> {
        let notes = notes.map(|n| {
            let mut end = n.len().min(500);
            while !n.is_char_boundary(end) {
                end -= 1;
            }
            n[..end].to_string()
        });
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                notes = COALESCE($3, notes),
                processing_duration_seconds = COALESCE($4, processing_duration_seconds),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(notes)
        .bind(processing_duration_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_public_completed(&self, limit: i64, offset: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, task_type, topic_text, status, config, owner, is_public,
                   viewpoint_id, processing_duration_seconds, notes, created_at, updated_at
            FROM tasks
            WHERE is_public AND status = 'completed'
            ORDER BY updated_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Mark tasks stuck in `processing` beyond the cutoff as failed.
    pub async fn reap_stuck_tasks(&self, cutoff_hours: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed', notes = 'reaped: stuck in processing', updated_at = now()
            WHERE status = 'processing' AND updated_at < now() - ($1 || ' hours')::interval
            "#,
        )
        .bind(cutoff_hours.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // --- Progress log ---

    pub async fn append_progress(&self, event: &ProgressEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_progress_steps (task_id, step_name, message, data, event_timestamp, request_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.task_id)
        .bind(&event.step)
        .bind(&event.message)
        .bind(&event.data)
        .bind(event.timestamp)
        .bind(&event.request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn progress_for_task(&self, task_id: Uuid) -> Result<Vec<ProgressStep>> {
        let rows = sqlx::query(
            r#"
            SELECT task_id, step_name, message, data, event_timestamp, request_id
            FROM task_progress_steps
            WHERE task_id = $1
            ORDER BY event_timestamp ASC, id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(ProgressStep {
                    task_id: row.try_get("task_id")?,
                    step_name: row.try_get("step_name")?,
                    message: row.try_get("message")?,
                    data: row.try_get("data")?,
                    event_timestamp: row.try_get("event_timestamp")?,
                    request_id: row.try_get("request_id")?,
                })
            })
            .collect()
    }
}

// --- Row conversions ---

fn row_to_source_document(row: &sqlx::postgres::PgRow) -> Result<SourceDocument> {
    let status: String = row.try_get("processing_status")?;
    Ok(SourceDocument {
        id: row.try_get("id")?,
        source_name: row.try_get("source_name")?,
        source_identifier: row.try_get("source_identifier")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        language: row.try_get("language")?,
        source_type: row.try_get("source_type")?,
        processing_status: status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
    })
}

fn row_to_viewpoint(row: &sqlx::postgres::PgRow) -> Result<Viewpoint> {
    let viewpoint_type: String = row.try_get("viewpoint_type")?;
    let status: String = row.try_get("status")?;
    Ok(Viewpoint {
        id: row.try_get("id")?,
        topic: row.try_get("topic")?,
        viewpoint_type: viewpoint_type.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        status: status.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        data_source_preference: row.try_get("data_source_preference")?,
        canonical_source_id: row.try_get("canonical_source_id")?,
    })
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task> {
    let task_type: String = row.try_get("task_type")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(Task {
        id: row.try_get("id")?,
        task_type: task_type.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        topic_text: row.try_get("topic_text")?,
        status: status.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        config: row.try_get("config")?,
        owner: row.try_get("owner")?,
        is_public: row.try_get("is_public")?,
        viewpoint_id: row.try_get("viewpoint_id")?,
        processing_duration_seconds: row.try_get("processing_duration_seconds")?,
        notes: row.try_get("notes")?,
        created_at,
        updated_at,
    })
}

fn date_info_json(date_info: &Option<ParsedDate>) -> Result<Option<serde_json::Value>> {
    date_info
        .as_ref()
        .map(|d| serde_json::to_value(d).context("serialize date_info"))
        .transpose()
}

fn date_info_from_json(value: Option<serde_json::Value>) -> Result<Option<ParsedDate>> {
    value
        .map(|v| serde_json::from_value(v).context("deserialize date_info"))
        .transpose()
}
