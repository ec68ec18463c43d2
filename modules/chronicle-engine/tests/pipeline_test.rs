//! End-to-end orchestrator scenarios against mocks: happy path, zero-yield
//! failure, composite reuse, and per-article failure isolation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chronicle_common::{ProgressReporter, SourceArticle, TaskStatus, ViewpointStatus};
use chronicle_engine::acquisition::{
    AcquisitionQuery, ArticleAcquisitionService, ArticleStrategy,
};
use chronicle_engine::canonical::CanonicalViewpointService;
use chronicle_engine::date_parser::DateParser;
use chronicle_engine::entity_linker::EntityLinker;
use chronicle_engine::event_extractor::{EventExtractor, ExtractorConfig};
use chronicle_engine::keyword_extractor::KeywordExtractor;
use chronicle_engine::merger::{EventMerger, MergerConfig};
use chronicle_engine::orchestrator::{MergerStrategy, OrchestratorConfig, TimelineOrchestrator};
use chronicle_engine::relevance::RelevanceScorer;
use chronicle_engine::testing::{test_task, InMemoryStore, MockLlm};
use chronicle_engine::traits::{Llm, StoreProgressSink, TimelineStore};

struct FixedStrategy {
    articles: Vec<SourceArticle>,
}

#[async_trait]
impl ArticleStrategy for FixedStrategy {
    fn name(&self) -> &str {
        "online_wikipedia"
    }

    async fn get_articles(&self, _query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
        Ok(self.articles.clone())
    }
}

fn article(identifier: &str, title: &str, marker: &str) -> SourceArticle {
    SourceArticle {
        source_name: "online_wikipedia".to_string(),
        source_identifier: identifier.to_string(),
        title: title.to_string(),
        source_url: format!("https://en.wikipedia.org/?curid={identifier}"),
        language: "en".to_string(),
        source_type: "wikipedia".to_string(),
        text_content: format!("{marker} body text about {title}."),
    }
}

fn orchestrator(
    store: Arc<InMemoryStore>,
    llm: Arc<dyn Llm>,
    articles: Vec<SourceArticle>,
) -> TimelineOrchestrator {
    let store: Arc<dyn TimelineStore> = store;
    let extractor = EventExtractor::new(
        Arc::clone(&llm),
        DateParser::new(Arc::clone(&llm)),
        ExtractorConfig::default(),
    );
    let canonical = CanonicalViewpointService::new(
        Arc::clone(&store),
        extractor,
        EntityLinker::new(Arc::clone(&store)),
        true,
    );
    let acquisition = ArticleAcquisitionService::new()
        .register("online_wikipedia", Arc::new(FixedStrategy { articles }));
    TimelineOrchestrator::new(
        Arc::clone(&store),
        KeywordExtractor::new(Arc::clone(&llm)),
        acquisition,
        RelevanceScorer::new(Arc::clone(&llm)),
        canonical,
        MergerStrategy::RuleLlm(EventMerger::new(Arc::clone(&llm), MergerConfig::default())),
        OrchestratorConfig::default(),
    )
}

fn reporter(store: &Arc<InMemoryStore>, task_id: uuid::Uuid) -> ProgressReporter {
    let sink = StoreProgressSink::new(Arc::clone(store) as Arc<dyn TimelineStore>);
    ProgressReporter::new(task_id, "req-test").with_sink(Arc::new(sink))
}

const KEYWORDS_EN: &str = r#"{
    "detected_language": "en",
    "original_keywords": ["Apollo program"],
    "english_keywords": ["Apollo program"],
    "translated_viewpoint": ""
}"#;

const PARSE_A: &str = r#"[
    {"id": "0", "original_text": "July 20, 1969", "display_text": "July 20, 1969",
     "precision": "day", "start_year": 1969, "start_month": 7, "start_day": 20,
     "end_year": 1969, "end_month": 7, "end_day": 20, "is_bce": false},
    {"id": "1", "original_text": "1961", "display_text": "1961",
     "precision": "year", "start_year": 1961, "start_month": null, "start_day": null,
     "end_year": 1961, "end_month": null, "end_day": null, "is_bce": false}
]"#;

const PARSE_B: &str = r#"[
    {"id": "0", "original_text": "20 July 1969", "display_text": "July 20, 1969",
     "precision": "day", "start_year": 1969, "start_month": 7, "start_day": 20,
     "end_year": 1969, "end_month": 7, "end_day": 20, "is_bce": false}
]"#;

const PARSE_C: &str = r#"[
    {"id": "0", "original_text": "November 9, 1967", "display_text": "November 9, 1967",
     "precision": "day", "start_year": 1967, "start_month": 11, "start_day": 9,
     "end_year": 1967, "end_month": 11, "end_day": 9, "is_bce": false}
]"#;

const EXTRACT_A: &str = r#"[
    {"event_description": "Apollo 11 landed on the Moon",
     "event_date_str": "July 20, 1969", "enhanced_event_date_str": null,
     "main_entities": [{"name": "Apollo 11", "type": "mission", "language": "en"}],
     "source_text_snippet": "Apollo 11 landed on the Moon on July 20, 1969."},
    {"event_description": "The Apollo program was announced",
     "event_date_str": "1961", "enhanced_event_date_str": null,
     "main_entities": [{"name": "Apollo program", "type": "program", "language": "en"}],
     "source_text_snippet": "The program was announced in 1961."}
]"#;

const EXTRACT_B: &str = r#"[
    {"event_description": "Apollo 11 landed humans on the Moon",
     "event_date_str": "20 July 1969", "enhanced_event_date_str": null,
     "main_entities": [{"name": "Apollo 11", "type": "mission", "language": "en"}],
     "source_text_snippet": "Apollo 11 landed two humans on the Moon."}
]"#;

const EXTRACT_C: &str = r#"[
    {"event_description": "Saturn V flew for the first time",
     "event_date_str": "November 9, 1967", "enhanced_event_date_str": null,
     "main_entities": [{"name": "Saturn V", "type": "rocket", "language": "en"}],
     "source_text_snippet": "Saturn V first flew on November 9, 1967."}
]"#;

const EVENT_SCORES_ALL_HIGH: &str = r#"[
    {"event_index": 1, "relevance_score": 0.9},
    {"event_index": 2, "relevance_score": 0.9},
    {"event_index": 3, "relevance_score": 0.9},
    {"event_index": 4, "relevance_score": 0.9}
]"#;

fn happy_path_llm() -> MockLlm {
    MockLlm::new()
        .on("analyze a historical research viewpoint", KEYWORDS_EN)
        .on(
            "how relevant each article",
            r#"{"Apollo program overview": 0.9, "Apollo 11": 0.8, "Saturn V": 0.7}"#,
        )
        .on_all(&["extract atomic historical events", "APOLLO_MAIN"], EXTRACT_A)
        .on_all(&["extract atomic historical events", "APOLLO11"], EXTRACT_B)
        .on_all(&["extract atomic historical events", "SATURNV"], EXTRACT_C)
        .on_all(&["normalize raw historical date", "1961"], PARSE_A)
        .on_all(&["normalize raw historical date", "20 July 1969"], PARSE_B)
        .on_all(&["normalize raw historical date", "November 9, 1967"], PARSE_C)
        .on("how relevant each historical event", EVENT_SCORES_ALL_HIGH)
        .fallback(r#"{"is_same_event": false, "confidence_score": 0.0, "reasoning": "n/a"}"#)
}

/// S1 — English happy path: three articles, four events, the two landing
/// descriptions merge, output is chronological and fully attributed.
#[tokio::test]
async fn english_happy_path_builds_sorted_timeline() {
    let store = Arc::new(InMemoryStore::new());
    let llm: Arc<dyn Llm> = Arc::new(happy_path_llm());
    let articles = vec![
        article("en:1", "Apollo program overview", "APOLLO_MAIN"),
        article("en:2", "Apollo 11", "APOLLO11"),
        article("en:3", "Saturn V", "SATURNV"),
    ];
    let orchestrator = orchestrator(Arc::clone(&store), llm, articles);

    let task = test_task("The Apollo program", serde_json::json!({}));
    store.insert_task(task.clone());
    let progress = reporter(&store, task.id);

    orchestrator
        .run_timeline_generation_task(&task, "req-test", &progress)
        .await
        .unwrap();

    let task = store.task(task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let viewpoint_id = task.viewpoint_id.unwrap();
    assert_eq!(store.viewpoint(viewpoint_id).unwrap().status, ViewpointStatus::Completed);

    // Four extracted events merged into three timeline entries.
    let associations = store.viewpoint_event_scores(viewpoint_id);
    assert_eq!(associations.len(), 3);
    assert!(associations.iter().all(|(_, score)| *score == Some(0.9)));

    // Chronological order: 1961, 1967, 1969.
    let mut events: Vec<_> = associations
        .iter()
        .map(|(id, _)| store.event(*id).unwrap())
        .collect();
    events.sort_by_key(|e| {
        e.date_info
            .as_ref()
            .and_then(|d| d.event_year())
            .unwrap_or(i32::MIN)
    });
    assert!(events[0].description.contains("announced"));
    assert!(events[2].description.contains("Moon"));

    // The merged landing event carries provenance from both articles.
    let merged = events
        .iter()
        .find(|e| e.description.contains("Moon"))
        .unwrap();
    assert_eq!(store.raw_event_ids_for_event(merged.id).len(), 2);

    // Documents completed.
    for identifier in ["en:1", "en:2", "en:3"] {
        assert_eq!(
            store.document_status(identifier),
            Some(chronicle_common::ProcessingStatus::Completed)
        );
    }
}

/// S3 — no relevant articles: both score below the 0.35 threshold.
#[tokio::test]
async fn no_relevant_articles_fails_cleanly() {
    let store = Arc::new(InMemoryStore::new());
    let llm: Arc<dyn Llm> = Arc::new(
        MockLlm::new()
            .on("analyze a historical research viewpoint", KEYWORDS_EN)
            .on(
                "how relevant each article",
                r#"{"Apollo program overview": 0.1, "Apollo 11": 0.2}"#,
            ),
    );
    let articles = vec![
        article("en:1", "Apollo program overview", "APOLLO_MAIN"),
        article("en:2", "Apollo 11", "APOLLO11"),
    ];
    let orchestrator = orchestrator(Arc::clone(&store), llm, articles);

    let task = test_task("completely obscure proper noun", serde_json::json!({}));
    store.insert_task(task.clone());
    let progress = reporter(&store, task.id);

    orchestrator
        .run_timeline_generation_task(&task, "req-test", &progress)
        .await
        .unwrap();

    let task = store.task(task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.notes.unwrap().contains("no relevant articles"));
    let viewpoint_id = task.viewpoint_id.unwrap();
    assert_eq!(store.viewpoint(viewpoint_id).unwrap().status, ViewpointStatus::Failed);

    // Exactly one scoring-complete progress event, reporting zero articles.
    let scoring_events = store.progress_steps("article_relevance_scoring_complete");
    assert_eq!(scoring_events.len(), 1);
    assert_eq!(scoring_events[0].data.as_ref().unwrap()["relevant_article_count"], 0);
}

/// S6 — reuse hit: identical (topic, data_source_preference) short-circuits
/// the entire pipeline with zero LLM traffic.
#[tokio::test]
async fn composite_reuse_short_circuits_pipeline() {
    let store = Arc::new(InMemoryStore::new());
    let existing = store.insert_completed_synthetic("The Apollo program", "online_wikipedia");

    let mock = Arc::new(MockLlm::new());
    let llm: Arc<dyn Llm> = mock.clone();
    let orchestrator = orchestrator(Arc::clone(&store), llm, Vec::new());

    let task = test_task("The Apollo program", serde_json::json!({}));
    store.insert_task(task.clone());
    let progress = reporter(&store, task.id);

    orchestrator
        .run_timeline_generation_task(&task, "req-test", &progress)
        .await
        .unwrap();

    let task = store.task(task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.viewpoint_id, Some(existing));
    assert_eq!(mock.call_count(), 0, "reuse must not touch the LLM");
}

/// Invalid task config fails validation before any pipeline work.
#[tokio::test]
async fn invalid_config_fails_before_pipeline() {
    let store = Arc::new(InMemoryStore::new());
    let mock = Arc::new(MockLlm::new());
    let llm: Arc<dyn Llm> = mock.clone();
    let orchestrator = orchestrator(Arc::clone(&store), llm, Vec::new());

    let task = test_task("anything", serde_json::json!({ "article_limit": 0 }));
    store.insert_task(task.clone());
    let progress = reporter(&store, task.id);

    orchestrator
        .run_timeline_generation_task(&task, "req-test", &progress)
        .await
        .unwrap();

    let task = store.task(task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.notes.unwrap().contains("article_limit"));
    assert_eq!(mock.call_count(), 0);
}

/// A failing article rolls back alone; the rest of the pipeline completes.
#[tokio::test]
async fn article_failure_is_isolated() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_persist_for("en:2");

    let llm: Arc<dyn Llm> = Arc::new(happy_path_llm());
    let articles = vec![
        article("en:1", "Apollo program overview", "APOLLO_MAIN"),
        article("en:2", "Apollo 11", "APOLLO11"),
        article("en:3", "Saturn V", "SATURNV"),
    ];
    let orchestrator = orchestrator(Arc::clone(&store), llm, articles);

    let task = test_task("The Apollo program", serde_json::json!({}));
    store.insert_task(task.clone());
    let progress = reporter(&store, task.id);

    orchestrator
        .run_timeline_generation_task(&task, "req-test", &progress)
        .await
        .unwrap();

    let task = store.task(task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(
        store.document_status("en:2"),
        Some(chronicle_common::ProcessingStatus::Failed)
    );
    // Three events from the two surviving articles.
    let associations = store.viewpoint_event_scores(task.viewpoint_id.unwrap());
    assert_eq!(associations.len(), 3);
}
