//! Progress reporting for long-running timeline tasks.
//!
//! Every pipeline stage reports named steps through a [`ProgressReporter`],
//! which fans out to its sinks (database log, websocket push). Sink failures
//! are logged and swallowed: progress is observability, never control flow.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Step-name vocabulary used in the progress log and over the websocket.
pub mod steps {
    pub const KEYWORD_EXTRACTION_START: &str = "keyword_extraction_start";
    pub const KEYWORD_EXTRACTION_COMPLETE: &str = "keyword_extraction_complete";
    pub const ARTICLE_ACQUISITION_START: &str = "article_acquisition_start";
    pub const ARTICLE_STRATEGY_RESULT: &str = "article_strategy_result";
    pub const ARTICLE_ACQUISITION_COMPLETE: &str = "article_acquisition_complete";
    pub const ARTICLE_RELEVANCE_SCORING_START: &str = "article_relevance_scoring_start";
    pub const ARTICLE_RELEVANCE_SCORING_COMPLETE: &str = "article_relevance_scoring_complete";
    pub const CANONICAL_SOURCES_START: &str = "canonical_sources_start";
    pub const CANONICAL_SOURCES_PROGRESS: &str = "canonical_sources_progress";
    pub const CANONICAL_SOURCES_COMPLETE: &str = "canonical_sources_complete";
    pub const EVENT_RELEVANCE_SCORING_START: &str = "event_relevance_scoring_start";
    pub const EVENT_RELEVANCE_SCORING_COMPLETE: &str = "event_relevance_scoring_complete";
    pub const EVENT_MERGING_START: &str = "event_merging_start";
    pub const EVENT_MERGING_COMPLETE: &str = "event_merging_complete";
    pub const VIEWPOINT_MATERIALIZE_START: &str = "viewpoint_materialize_start";
    pub const VIEWPOINT_MATERIALIZE_COMPLETE: &str = "viewpoint_materialize_complete";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const TASK_FAILED: &str = "task_failed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: Uuid,
    pub step: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, event: &ProgressEvent) -> anyhow::Result<()>;
}

/// Fan-out reporter handed down the pipeline. Cloning is cheap.
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: Uuid,
    request_id: String,
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl ProgressReporter {
    pub fn new(task_id: Uuid, request_id: impl Into<String>) -> Self {
        Self { task_id, request_id: request_id.into(), sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub async fn report(
        &self,
        step: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let event = ProgressEvent {
            task_id: self.task_id,
            step: step.to_string(),
            message: message.into(),
            data,
            timestamp: Utc::now(),
            request_id: self.request_id.clone(),
        };
        for sink in &self.sinks {
            if let Err(e) = sink.report(&event).await {
                warn!(step = %event.step, error = %e, "progress sink failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collector(Mutex<Vec<ProgressEvent>>);

    #[async_trait]
    impl ProgressSink for Collector {
        async fn report(&self, event: &ProgressEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ProgressSink for Failing {
        async fn report(&self, _event: &ProgressEvent) -> anyhow::Result<()> {
            anyhow::bail!("sink down")
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_all_sinks_despite_failures() {
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let reporter = ProgressReporter::new(Uuid::new_v4(), "req-1")
            .with_sink(Arc::new(Failing))
            .with_sink(collector.clone());

        reporter
            .report(steps::KEYWORD_EXTRACTION_START, "starting", None)
            .await;
        reporter
            .report(
                steps::KEYWORD_EXTRACTION_COMPLETE,
                "done",
                Some(serde_json::json!({ "keywords": 3 })),
            )
            .await;

        let events = collector.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].step, steps::KEYWORD_EXTRACTION_START);
        assert_eq!(events[1].data.as_ref().unwrap()["keywords"], 3);
        assert_eq!(events[1].request_id, "req-1");
    }
}
