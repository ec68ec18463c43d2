//! Merger behavior: windowed LLM adjudication with early termination,
//! rule-based merges, idempotence, soundness, and output ordering.

use std::sync::Arc;

use chronicle_common::{DatePrecision, Entity, Event, ParsedDate};
use chronicle_engine::merger::{EventMerger, MergerConfig, MergerInput};
use chronicle_engine::testing::MockLlm;
use chronicle_store::EventSourceInfo;
use uuid::Uuid;

const SAME_EVENT_TRUE: &str =
    r#"{"is_same_event": true, "confidence_score": 0.92, "reasoning": "same incident"}"#;
const SAME_EVENT_FALSE: &str =
    r#"{"is_same_event": false, "confidence_score": 0.9, "reasoning": "different"}"#;
const SEMANTIC_MARKER: &str = "SAME real-world historical event";

fn year_date(year: i32) -> ParsedDate {
    ParsedDate {
        original_text: year.to_string(),
        display_text: year.to_string(),
        precision: DatePrecision::Year,
        start_year: Some(year),
        start_month: None,
        start_day: None,
        end_year: Some(year),
        end_month: None,
        end_day: None,
        is_bce: false,
    }
}

fn entity(id: u128, name: &str) -> Entity {
    Entity {
        id: Uuid::from_u128(id),
        entity_name: name.to_string(),
        entity_type: "person".to_string(),
        language: "en".to_string(),
        is_verified_existent: None,
    }
}

fn input(description: &str, entity_ids: &[u128], year: Option<i32>) -> MergerInput {
    MergerInput {
        event: Event {
            id: Uuid::new_v4(),
            description: description.to_string(),
            event_date_str: year.map(|y| y.to_string()).unwrap_or_default(),
            date_info: year.map(year_date),
        },
        entities: entity_ids
            .iter()
            .map(|id| entity(*id, &format!("entity-{id}")))
            .collect(),
        sources: vec![EventSourceInfo {
            raw_event_id: Uuid::new_v4(),
            source_url: "https://en.wikipedia.org/?curid=1".to_string(),
            source_page_title: "Test".to_string(),
            source_language: "en".to_string(),
            snippet: Some(format!("snippet for {description}")),
        }],
        relevance: Some(0.8),
    }
}

/// Five eligible candidates, window of three: the second candidate confirms,
/// the third's in-flight result is discarded, the second window never runs.
#[tokio::test]
async fn window_early_termination_saves_llm_calls() {
    let llm = Arc::new(
        MockLlm::new()
            .on_all(&["probe event description", "g1 anchor event"], SAME_EVENT_TRUE)
            .fallback(SAME_EVENT_FALSE),
    );
    let merger = EventMerger::new(llm.clone(), MergerConfig::default());

    let inputs = vec![
        input("g0 anchor event", &[10, 11, 90], Some(1950)),
        input("g1 anchor event", &[21, 91], Some(1950)),
        input("g2 anchor event", &[22, 92], Some(1949)),
        input("g3 anchor event", &[23, 93], Some(1948)),
        input("g4 anchor event", &[24, 94], Some(1948)),
        input("probe event description", &[10, 11, 21, 22, 23, 24], Some(1950)),
    ];
    let (groups, counters) = merger.merge(inputs).await.unwrap();

    assert_eq!(groups.len(), 5);
    let merged: Vec<_> = groups.iter().filter(|g| g.is_merged).collect();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].source_contributions.len(), 2);

    assert_eq!(counters.total_events, 6);
    assert_eq!(counters.rule_based_merges, 0);
    assert_eq!(counters.concurrent_windows_processed, 1);
    assert_eq!(counters.llm_candidates, 3);
    assert_eq!(counters.llm_confirmed_merges, 1);
    assert_eq!(counters.concurrent_llm_calls_saved, 1);
    assert_eq!(counters.quick_exclusions, 0);

    // The second window's candidates were never adjudicated.
    assert_eq!(llm.calls_matching(&[SEMANTIC_MARKER, "probe event description", "g3 anchor event"]), 0);
    assert_eq!(llm.calls_matching(&[SEMANTIC_MARKER, "probe event description", "g4 anchor event"]), 0);
    // The first window ran all three concurrently.
    assert_eq!(llm.calls_matching(&[SEMANTIC_MARKER, "probe event description"]), 3);
}

/// Heavy entity overlap with compatible dates merges without any LLM call.
#[tokio::test]
async fn rule_based_merge_skips_llm() {
    let llm = Arc::new(MockLlm::new().fallback(SAME_EVENT_FALSE));
    let merger = EventMerger::new(llm.clone(), MergerConfig::default());

    let inputs = vec![
        input("the treaty was signed in the palace", &[1, 2, 3], Some(1919)),
        input("signing of the treaty ended the war", &[1, 2, 3, 4], Some(1919)),
    ];
    let (groups, counters) = merger.merge(inputs).await.unwrap();

    assert_eq!(groups.len(), 1);
    assert!(groups[0].is_merged);
    assert_eq!(counters.rule_based_merges, 1);
    assert_eq!(counters.llm_candidates, 0);
    assert_eq!(llm.calls_matching(&[SEMANTIC_MARKER]), 0);
}

/// Distant years never reach the LLM.
#[tokio::test]
async fn distant_years_quick_exclude() {
    let llm = Arc::new(MockLlm::new().fallback(SAME_EVENT_FALSE));
    let merger = EventMerger::new(llm.clone(), MergerConfig::default());

    let inputs = vec![
        input("first coronation of the king", &[1], Some(1500)),
        input("second coronation of the king", &[1], Some(1520)),
    ];
    let (groups, counters) = merger.merge(inputs).await.unwrap();

    assert_eq!(groups.len(), 2);
    assert!(counters.quick_exclusions >= 1);
    assert_eq!(llm.calls_matching(&[SEMANTIC_MARKER]), 0);
}

/// Every input lands in exactly one group; contributions cover the input
/// set with multiplicity.
#[tokio::test]
async fn merge_is_sound() {
    let llm = Arc::new(
        MockLlm::new()
            .on_all(&["moon landing reported", "landing on the moon"], SAME_EVENT_TRUE)
            .fallback(SAME_EVENT_FALSE),
    );
    let merger = EventMerger::new(llm, MergerConfig::default());

    let inputs = vec![
        input("landing on the moon", &[1, 50], Some(1969)),
        input("moon landing reported", &[1, 51], Some(1969)),
        input("launch of the rocket", &[2, 52], Some(1969)),
        input("undated commemoration", &[3], None),
    ];
    let descriptions: Vec<String> =
        inputs.iter().map(|i| i.event.description.clone()).collect();
    let (groups, _) = merger.merge(inputs).await.unwrap();

    let mut seen: Vec<String> = groups
        .iter()
        .flat_map(|g| g.source_contributions.iter().map(|c| c.event.description.clone()))
        .collect();
    seen.sort();
    let mut expected = descriptions.clone();
    expected.sort();
    assert_eq!(seen, expected);
}

/// Same input twice yields the same partition; the verdict cache only
/// changes LLM traffic, not groupings.
#[tokio::test]
async fn merge_is_idempotent_and_cache_kicks_in() {
    let llm = Arc::new(
        MockLlm::new()
            .on_all(&["moon landing reported", "landing on the moon"], SAME_EVENT_TRUE)
            .fallback(SAME_EVENT_FALSE),
    );
    let merger = EventMerger::new(llm, MergerConfig::default());

    let make_inputs = || {
        vec![
            input("landing on the moon", &[1, 50], Some(1969)),
            input("moon landing reported", &[1, 51], Some(1969)),
            input("launch of the rocket", &[2, 52], Some(1969)),
        ]
    };

    let partition = |groups: &[chronicle_engine::merger::MergedEventGroup]| {
        let mut parts: Vec<Vec<String>> = groups
            .iter()
            .map(|g| {
                let mut members: Vec<String> = g
                    .source_contributions
                    .iter()
                    .map(|c| c.event.description.clone())
                    .collect();
                members.sort();
                members
            })
            .collect();
        parts.sort();
        parts
    };

    let (first, counters_first) = merger.merge(make_inputs()).await.unwrap();
    let (second, counters_second) = merger.merge(make_inputs()).await.unwrap();

    assert_eq!(partition(&first), partition(&second));
    assert_eq!(counters_first.cache_hits, 0);
    assert!(counters_second.cache_hits > 0, "second run should hit the verdict cache");
}

/// Output is ordered by representative timestamp ascending, undated first.
#[tokio::test]
async fn output_ordering_undated_first_then_chronological() {
    let llm = Arc::new(MockLlm::new().fallback(SAME_EVENT_FALSE));
    let merger = EventMerger::new(llm, MergerConfig::default());

    let inputs = vec![
        input("late event", &[1], Some(1990)),
        input("early event", &[2], Some(1900)),
        input("undated event", &[3], None),
        input("middle event", &[4], Some(1950)),
    ];
    let (groups, _) = merger.merge(inputs).await.unwrap();

    let order: Vec<&str> = groups
        .iter()
        .map(|g| g.representative.description.as_str())
        .collect();
    assert_eq!(order, vec!["undated event", "early event", "middle event", "late event"]);
}

/// Group relevance is the max over scored contributors; all-unscored groups
/// stay unknown.
#[tokio::test]
async fn group_relevance_is_max_of_contributors() {
    let llm = Arc::new(
        MockLlm::new()
            .on_all(&["moon landing reported", "landing on the moon"], SAME_EVENT_TRUE)
            .fallback(SAME_EVENT_FALSE),
    );
    let merger = EventMerger::new(llm, MergerConfig::default());

    let mut a = input("landing on the moon", &[1, 50], Some(1969));
    a.relevance = Some(0.7);
    let mut b = input("moon landing reported", &[1, 51], Some(1969));
    b.relevance = Some(0.9);
    let mut c = input("launch of the rocket", &[2, 52], Some(1969));
    c.relevance = None;

    let (groups, _) = merger.merge(vec![a, b, c]).await.unwrap();
    let merged = groups.iter().find(|g| g.is_merged).unwrap();
    assert_eq!(merged.relevance, Some(0.9));
    let single = groups.iter().find(|g| !g.is_merged).unwrap();
    assert_eq!(single.relevance, None);
}
