//! Pipeline orchestrator: wires keyword extraction → acquisition →
//! article filter → canonical sources → event filter → merge → materialize,
//! with progress fan-out, per-article isolation, and reuse short-circuits.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use chronicle_common::progress::steps;
use chronicle_common::{
    ProgressReporter, SourceArticle, Task, TaskStatus, ViewpointStatus, ViewpointType,
};
use chronicle_store::NewViewpointEvent;

use crate::acquisition::{AcquisitionQuery, ArticleAcquisitionConfig, ArticleAcquisitionService};
use crate::canonical::CanonicalViewpointService;
use crate::keyword_extractor::KeywordExtractor;
use crate::merger::embedding::EmbeddingEventMerger;
use crate::merger::{EventMerger, MergedEventGroup, MergerCounters, MergerInput};
use crate::relevance::RelevanceScorer;
use crate::traits::TimelineStore;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_data_source: String,
    pub reuse_composite_viewpoint: bool,
    pub article_filter_relevance_threshold: f64,
    pub timeline_relevance_threshold: f64,
    pub timeline_batch_size: usize,
    pub min_successful_articles: usize,
    pub single_article_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_data_source: crate::acquisition::DEFAULT_DATA_SOURCE.to_string(),
            reuse_composite_viewpoint: true,
            article_filter_relevance_threshold: 0.35,
            timeline_relevance_threshold: 0.6,
            timeline_batch_size: 10,
            min_successful_articles: 1,
            single_article_timeout: Duration::from_secs(120),
        }
    }
}

/// Exchangeable merger implementations behind one call shape.
pub enum MergerStrategy {
    RuleLlm(EventMerger),
    Embedding(EmbeddingEventMerger),
}

impl MergerStrategy {
    async fn merge(
        &self,
        inputs: Vec<MergerInput>,
    ) -> Result<(Vec<MergedEventGroup>, MergerCounters)> {
        match self {
            MergerStrategy::RuleLlm(merger) => merger.merge(inputs).await,
            MergerStrategy::Embedding(merger) => merger.merge(inputs).await,
        }
    }
}

pub struct TimelineOrchestrator {
    store: Arc<dyn TimelineStore>,
    keyword_extractor: KeywordExtractor,
    acquisition: ArticleAcquisitionService,
    relevance: RelevanceScorer,
    canonical: CanonicalViewpointService,
    merger: MergerStrategy,
    config: OrchestratorConfig,
}

impl TimelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TimelineStore>,
        keyword_extractor: KeywordExtractor,
        acquisition: ArticleAcquisitionService,
        relevance: RelevanceScorer,
        canonical: CanonicalViewpointService,
        merger: MergerStrategy,
        config: OrchestratorConfig,
    ) -> Self {
        Self { store, keyword_extractor, acquisition, relevance, canonical, merger, config }
    }

    /// Run a synthetic-viewpoint task end to end. Terminal task status and
    /// notes are always written; errors inside any stage fail the task
    /// rather than propagating.
    pub async fn run_timeline_generation_task(
        &self,
        task: &Task,
        request_id: &str,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let started = Instant::now();

        // 1. Validate the opaque config before touching anything else.
        let acquisition_config = match ArticleAcquisitionConfig::from_task_config(&task.config) {
            Ok(config) => config,
            Err(message) => {
                warn!(task_id = %task.id, message, "task config validation failed");
                self.store
                    .set_task_status(task.id, TaskStatus::Failed, Some(&message), None)
                    .await?;
                return Ok(());
            }
        };

        // 2. Effective data source.
        let data_source_preference = acquisition_config
            .data_source_preference
            .clone()
            .unwrap_or_else(|| self.config.default_data_source.clone());

        // 3. Composite reuse short-circuit.
        if self.config.reuse_composite_viewpoint {
            if let Some(existing) = self
                .store
                .find_reusable_synthetic(&task.topic_text, &data_source_preference)
                .await?
            {
                info!(task_id = %task.id, viewpoint_id = %existing.id, "reusing composite viewpoint");
                self.store.attach_viewpoint(task.id, existing.id).await?;
                self.store
                    .set_task_status(
                        task.id,
                        TaskStatus::Completed,
                        Some("reused existing viewpoint"),
                        Some(started.elapsed().as_secs_f64()),
                    )
                    .await?;
                progress
                    .report(steps::TASK_COMPLETED, "reused existing viewpoint", None)
                    .await;
                return Ok(());
            }
        }

        let viewpoint = self
            .store
            .create_viewpoint(&task.topic_text, ViewpointType::Synthetic, &data_source_preference)
            .await?;
        self.store.attach_viewpoint(task.id, viewpoint.id).await?;

        // 4. Task enters processing.
        self.store
            .set_task_status(task.id, TaskStatus::Processing, None, None)
            .await?;

        // 5.–6. Guarded pipeline: any stage error fails the task cleanly.
        let outcome = self
            .run_pipeline(task, &acquisition_config, &data_source_preference, viewpoint.id, request_id, progress)
            .await;

        let duration = started.elapsed().as_secs_f64();
        match outcome {
            Ok(PipelineOutcome::Completed { events }) => {
                self.store
                    .set_task_status(
                        task.id,
                        TaskStatus::Completed,
                        Some(&format!("timeline generated with {events} events")),
                        Some(duration),
                    )
                    .await?;
                progress
                    .report(
                        steps::TASK_COMPLETED,
                        format!("timeline generated with {events} events"),
                        Some(json!({ "event_count": events })),
                    )
                    .await;
            }
            Ok(PipelineOutcome::Failed { reason }) => {
                self.fail(task.id, viewpoint.id, &reason, duration, progress).await;
            }
            Err(e) => {
                let reason = format!("pipeline error: {e:#}");
                self.fail(task.id, viewpoint.id, &reason, duration, progress).await;
            }
        }
        Ok(())
    }

    /// Run an entity- or document-anchored canonical task: only the
    /// canonical sub-pipeline, attaching the resulting canonical viewpoint
    /// to the task. The caller resolves the anchor into a [`SourceArticle`].
    pub async fn run_canonical_anchor_task(
        &self,
        task: &Task,
        article: &SourceArticle,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let started = Instant::now();
        self.store
            .set_task_status(task.id, TaskStatus::Processing, None, None)
            .await?;
        progress
            .report(steps::CANONICAL_SOURCES_START, "processing anchor document", None)
            .await;

        let outcome = self
            .canonical
            .get_or_create_canonical(article, &self.config.default_data_source)
            .await;
        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok(canonical) if !canonical.event_ids.is_empty() => {
                if let Some(viewpoint) = self
                    .store
                    .find_completed_canonical(canonical.document.id)
                    .await?
                {
                    self.store.attach_viewpoint(task.id, viewpoint.id).await?;
                }
                self.store
                    .set_task_status(
                        task.id,
                        TaskStatus::Completed,
                        Some(&format!("canonical viewpoint with {} events", canonical.event_ids.len())),
                        Some(duration),
                    )
                    .await?;
                progress
                    .report(
                        steps::TASK_COMPLETED,
                        format!("canonical viewpoint with {} events", canonical.event_ids.len()),
                        Some(json!({ "event_count": canonical.event_ids.len(), "reused": canonical.reused })),
                    )
                    .await;
            }
            Ok(_) => {
                self.store
                    .set_task_status(task.id, TaskStatus::Failed, Some("document produced no events"), Some(duration))
                    .await?;
                progress
                    .report(steps::TASK_FAILED, "document produced no events", None)
                    .await;
            }
            Err(e) => {
                let reason = format!("canonical processing failed: {e:#}");
                self.store
                    .set_task_status(task.id, TaskStatus::Failed, Some(&reason), Some(duration))
                    .await?;
                progress.report(steps::TASK_FAILED, reason, None).await;
            }
        }
        Ok(())
    }

    async fn run_pipeline(
        &self,
        task: &Task,
        acquisition_config: &ArticleAcquisitionConfig,
        data_source_preference: &str,
        viewpoint_id: Uuid,
        request_id: &str,
        progress: &ProgressReporter,
    ) -> Result<PipelineOutcome> {
        // a. Keywords and language.
        progress
            .report(steps::KEYWORD_EXTRACTION_START, "extracting keywords", None)
            .await;
        let extraction = self
            .keyword_extractor
            .extract(&task.topic_text)
            .await
            .context("keyword extraction")?;
        let user_language = if extraction.detected_language.is_empty() {
            "en".to_string()
        } else {
            extraction.detected_language.clone()
        };
        // English viewpoints may legitimately come back untranslated.
        let translated_viewpoint = if extraction.translated_viewpoint.trim().is_empty()
            && user_language == "en"
        {
            task.topic_text.clone()
        } else {
            extraction.translated_viewpoint.clone()
        };
        // A cleared keyword pair (length-mismatch invariant) degrades to
        // searching the viewpoint text itself.
        let (keywords, english_keywords) = if extraction.original_keywords.is_empty() {
            (vec![task.topic_text.clone()], vec![translated_viewpoint.clone()])
        } else {
            (extraction.original_keywords.clone(), extraction.english_keywords.clone())
        };
        progress
            .report(
                steps::KEYWORD_EXTRACTION_COMPLETE,
                format!("{} keywords, language {user_language}", keywords.len()),
                Some(json!({ "keywords": keywords, "language": user_language })),
            )
            .await;

        // b. Article acquisition.
        progress
            .report(steps::ARTICLE_ACQUISITION_START, "acquiring articles", None)
            .await;
        let query = AcquisitionQuery {
            viewpoint_text: task.topic_text.clone(),
            translated_viewpoint: translated_viewpoint.clone(),
            user_language: user_language.clone(),
            keywords,
            english_keywords,
            config: acquisition_config.clone(),
            parent_request_id: request_id.to_string(),
        };
        let articles = self
            .acquisition
            .acquire(&query, data_source_preference, progress)
            .await
            .context("article acquisition")?;
        progress
            .report(
                steps::ARTICLE_ACQUISITION_COMPLETE,
                format!("{} unique articles", articles.len()),
                Some(json!({ "article_count": articles.len() })),
            )
            .await;
        if articles.is_empty() {
            return Ok(PipelineOutcome::Failed { reason: "no articles found".to_string() });
        }

        // c. Article relevance filter.
        progress
            .report(steps::ARTICLE_RELEVANCE_SCORING_START, "scoring articles", None)
            .await;
        let scoring_viewpoint = if translated_viewpoint.trim().is_empty() {
            task.topic_text.clone()
        } else {
            translated_viewpoint.clone()
        };
        let listing: Vec<(String, String)> = articles
            .iter()
            .map(|a| (a.title.clone(), a.text_content.clone()))
            .collect();
        let scores = self
            .relevance
            .score_articles(&scoring_viewpoint, &listing)
            .await
            .context("article relevance scoring")?;

        let mut relevant: Vec<(f64, SourceArticle)> = articles
            .into_iter()
            .filter_map(|article| {
                let score = scores.get(&article.title).copied().unwrap_or(0.0);
                (score >= self.config.article_filter_relevance_threshold).then_some((score, article))
            })
            .collect();
        relevant.sort_by(|a, b| b.0.total_cmp(&a.0));
        relevant.truncate(acquisition_config.article_limit);
        progress
            .report(
                steps::ARTICLE_RELEVANCE_SCORING_COMPLETE,
                format!("{} relevant articles", relevant.len()),
                Some(json!({ "relevant_article_count": relevant.len() })),
            )
            .await;
        if relevant.is_empty() {
            return Ok(PipelineOutcome::Failed { reason: "no relevant articles".to_string() });
        }

        // d. Canonical viewpoints per article; failures stay local.
        progress
            .report(
                steps::CANONICAL_SOURCES_START,
                format!("processing {} articles", relevant.len()),
                None,
            )
            .await;
        let mut event_ids: HashSet<Uuid> = HashSet::new();
        let mut successful_articles = 0usize;
        let total = relevant.len();
        for (index, (_, article)) in relevant.iter().enumerate() {
            let outcome = tokio::time::timeout(
                self.config.single_article_timeout,
                self.canonical.get_or_create_canonical(article, data_source_preference),
            )
            .await;
            match outcome {
                Ok(Ok(canonical)) => {
                    successful_articles += 1;
                    event_ids.extend(canonical.event_ids);
                }
                Ok(Err(e)) => {
                    warn!(url = %article.source_url, error = %e, "article processing failed, continuing")
                }
                Err(_) => {
                    warn!(url = %article.source_url, "article processing timed out, continuing")
                }
            }
            progress
                .report(
                    steps::CANONICAL_SOURCES_PROGRESS,
                    format!("processed article {}/{total}", index + 1),
                    Some(json!({ "processed": index + 1, "total": total, "events": event_ids.len() })),
                )
                .await;
        }
        progress
            .report(
                steps::CANONICAL_SOURCES_COMPLETE,
                format!("{} events from {successful_articles} articles", event_ids.len()),
                Some(json!({ "event_count": event_ids.len(), "article_count": successful_articles })),
            )
            .await;
        if successful_articles < self.config.min_successful_articles || event_ids.is_empty() {
            return Ok(PipelineOutcome::Failed {
                reason: format!(
                    "insufficient sources: {successful_articles} articles, {} events",
                    event_ids.len()
                ),
            });
        }

        // e. Event relevance filter. Events with no score stay in with an
        // unknown relevance rather than being treated as irrelevant.
        progress
            .report(steps::EVENT_RELEVANCE_SCORING_START, "scoring events", None)
            .await;
        let ids: Vec<Uuid> = event_ids.into_iter().collect();
        let contexts = self
            .store
            .load_event_contexts(&ids)
            .await
            .context("load events for scoring")?;
        let descriptions: Vec<String> =
            contexts.iter().map(|c| c.event.description.clone()).collect();
        let event_scores = self
            .relevance
            .score_events(&scoring_viewpoint, &descriptions, self.config.timeline_batch_size)
            .await
            .context("event relevance scoring")?;

        let mut merger_inputs: Vec<MergerInput> = Vec::new();
        for (index, context) in contexts.into_iter().enumerate() {
            match event_scores.get(&index) {
                Some(&score) if score < self.config.timeline_relevance_threshold => {}
                Some(&score) => merger_inputs.push(MergerInput::from_context(context, Some(score))),
                None => merger_inputs.push(MergerInput::from_context(context, None)),
            }
        }
        progress
            .report(
                steps::EVENT_RELEVANCE_SCORING_COMPLETE,
                format!("{} relevant events", merger_inputs.len()),
                Some(json!({ "relevant_event_count": merger_inputs.len() })),
            )
            .await;
        if merger_inputs.is_empty() {
            return Ok(PipelineOutcome::Failed { reason: "no relevant events".to_string() });
        }

        // f. Merge.
        progress
            .report(
                steps::EVENT_MERGING_START,
                format!("merging {} events", merger_inputs.len()),
                None,
            )
            .await;
        let (groups, counters) = self.merger.merge(merger_inputs).await.context("event merge")?;
        progress
            .report(
                steps::EVENT_MERGING_COMPLETE,
                format!("{} merged groups", groups.len()),
                serde_json::to_value(&counters).ok(),
            )
            .await;

        // g.–h. Materialize the synthetic viewpoint.
        progress
            .report(steps::VIEWPOINT_MATERIALIZE_START, "writing viewpoint", None)
            .await;
        let items = materialize_items(&groups);
        let written = self
            .store
            .materialize_synthetic(viewpoint_id, &items)
            .await
            .context("materialize viewpoint")?;
        progress
            .report(
                steps::VIEWPOINT_MATERIALIZE_COMPLETE,
                format!("{written} events written"),
                Some(json!({ "event_count": written })),
            )
            .await;

        if written == 0 {
            return Ok(PipelineOutcome::Failed { reason: "no events after merging".to_string() });
        }
        Ok(PipelineOutcome::Completed { events: written })
    }

    async fn fail(
        &self,
        task_id: Uuid,
        viewpoint_id: Uuid,
        reason: &str,
        duration: f64,
        progress: &ProgressReporter,
    ) {
        warn!(%task_id, reason, "timeline task failed");
        if let Err(e) = self
            .store
            .set_viewpoint_status(viewpoint_id, ViewpointStatus::Failed)
            .await
        {
            warn!(%viewpoint_id, error = %e, "failed to mark viewpoint failed");
        }
        if let Err(e) = self
            .store
            .set_task_status(task_id, TaskStatus::Failed, Some(reason), Some(duration))
            .await
        {
            warn!(%task_id, error = %e, "failed to mark task failed");
        }
        progress
            .report(steps::TASK_FAILED, reason.to_string(), None)
            .await;
    }
}

enum PipelineOutcome {
    Completed { events: usize },
    Failed { reason: String },
}

/// Convert merged groups into store rows. Unmerged groups reuse their
/// existing event; merged groups get a fresh consolidated event carrying
/// the union of provenance and entities.
fn materialize_items(groups: &[MergedEventGroup]) -> Vec<NewViewpointEvent> {
    groups
        .iter()
        .map(|group| {
            if group.is_merged {
                let mut raw_event_ids: Vec<Uuid> = Vec::new();
                let mut entity_ids: Vec<Uuid> = Vec::new();
                for contribution in &group.source_contributions {
                    for source in &contribution.sources {
                        if !raw_event_ids.contains(&source.raw_event_id) {
                            raw_event_ids.push(source.raw_event_id);
                        }
                    }
                    for entity in &contribution.entities {
                        if !entity_ids.contains(&entity.id) {
                            entity_ids.push(entity.id);
                        }
                    }
                }
                NewViewpointEvent {
                    existing_event_id: None,
                    description: group.representative.description.clone(),
                    event_date_str: group.representative.event_date_str.clone(),
                    date_info: group.representative.date_info.clone(),
                    raw_event_ids,
                    entity_ids,
                    relevance_score: group.relevance,
                }
            } else {
                NewViewpointEvent {
                    existing_event_id: Some(group.representative.event_id),
                    description: group.representative.description.clone(),
                    event_date_str: group.representative.event_date_str.clone(),
                    date_info: group.representative.date_info.clone(),
                    raw_event_ids: Vec::new(),
                    entity_ids: Vec::new(),
                    relevance_score: group.relevance,
                }
            }
        })
        .collect()
}
