//! Event merger: multi-dimensional indexing, rule-based matching, and
//! windowed concurrent LLM adjudication with early termination.
//!
//! Events are processed in chronological order. For each event, candidate
//! groups come from the union of four indexes, get scored 0–100, and are
//! then walked in windows: cheap verdicts (quick exclude / rule match)
//! first, one concurrent LLM adjudication per surviving candidate in the
//! window. The first confirmed match wins; later results in the window are
//! discarded (their verdicts stay cached for next time).

mod candidates;
pub mod embedding;
mod representative;
mod semantic;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chronicle_common::{EntityMention, Event, ParsedDate};
use chronicle_store::EventContext;

use crate::traits::Llm;

use candidates::{prefilter, score_candidate, EventFeatures, GroupState, Indexes, PreFilter};
use semantic::SemanticMatcher;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One event entering the merger, with its loaded associations and the
/// relevance score it carried out of the event filter (None = unknown).
#[derive(Debug, Clone)]
pub struct MergerInput {
    pub event: Event,
    pub entities: Vec<chronicle_common::Entity>,
    pub sources: Vec<chronicle_store::EventSourceInfo>,
    pub relevance: Option<f64>,
}

impl MergerInput {
    pub fn from_context(context: EventContext, relevance: Option<f64>) -> Self {
        Self {
            event: context.event,
            entities: context.entities,
            sources: context.sources,
            relevance,
        }
    }
}

/// The chosen public face of a merged group.
#[derive(Debug, Clone, Serialize)]
pub struct RepresentativeEvent {
    pub event_id: Uuid,
    pub description: String,
    pub event_date_str: String,
    pub date_info: Option<ParsedDate>,
    pub main_entities: Vec<EntityMention>,
    /// Midnight-UTC timestamp of the range start, when representable.
    pub timestamp: Option<DateTime<Utc>>,
    pub snippet: Option<String>,
    pub source_url: String,
    pub source_page_title: String,
    pub source_language: String,
}

#[derive(Debug, Clone)]
pub struct MergedEventGroup {
    pub representative: RepresentativeEvent,
    pub is_merged: bool,
    /// Contributions in arrival order from the merge pipeline.
    pub source_contributions: Vec<MergerInput>,
    /// Max over contributor scores; None when no contributor was scored.
    pub relevance: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MergerConfig {
    pub min_common_entities: usize,
    pub llm_score_threshold: f64,
    pub rule_overlap_ratio: f64,
    pub window_size: usize,
    pub max_concurrent_requests: usize,
    pub user_language: String,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            min_common_entities: 1,
            llm_score_threshold: 15.0,
            rule_overlap_ratio: 0.75,
            window_size: 3,
            max_concurrent_requests: 10,
            user_language: "en".to_string(),
        }
    }
}

/// Monitoring counters for one merge run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergerCounters {
    pub total_events: u64,
    pub quick_exclusions: u64,
    pub rule_based_merges: u64,
    pub llm_candidates: u64,
    pub llm_confirmed_merges: u64,
    pub low_score_rejections: u64,
    pub index_lookups: u64,
    pub cache_hits: u64,
    pub concurrent_windows_processed: u64,
    pub concurrent_llm_calls_saved: u64,
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

pub struct EventMerger {
    llm: Arc<dyn Llm>,
    matcher: SemanticMatcher,
    config: MergerConfig,
}

impl EventMerger {
    pub fn new(llm: Arc<dyn Llm>, config: MergerConfig) -> Self {
        let matcher = SemanticMatcher::new(Arc::clone(&llm));
        Self { llm, matcher, config }
    }

    /// Deduplicate events into groups. Every input lands in exactly one
    /// group; output is ordered by representative timestamp ascending with
    /// undated groups first, stable by group creation order.
    pub async fn merge(
        &self,
        inputs: Vec<MergerInput>,
    ) -> Result<(Vec<MergedEventGroup>, MergerCounters)> {
        let mut counters = MergerCounters { total_events: inputs.len() as u64, ..Default::default() };

        let features: Vec<EventFeatures> = inputs
            .iter()
            .enumerate()
            .map(|(idx, input)| EventFeatures::from_input(idx, input))
            .collect();

        // Chronological processing order; undated events last so dated
        // groups exist before undated stragglers look for a home.
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        order.sort_by_key(|&i| (features[i].event_year.is_none(), features[i].event_year));

        let mut groups: Vec<GroupState> = Vec::new();
        let mut indexes = Indexes::default();

        for idx in order {
            let event_features = &features[idx];
            let assigned = self
                .assign_event(idx, event_features, &inputs, &groups, &indexes, &mut counters)
                .await?;

            match assigned {
                Some(group_id) => {
                    groups[group_id].absorb(event_features);
                    indexes.register(group_id, event_features);
                }
                None => {
                    let group = GroupState::new(groups.len(), event_features);
                    indexes.register(group.id, event_features);
                    groups.push(group);
                }
            }
        }

        let merged = self.build_groups(groups, inputs).await;
        info!(
            events = counters.total_events,
            groups = merged.len(),
            rule_merges = counters.rule_based_merges,
            llm_merges = counters.llm_confirmed_merges,
            "event merge complete"
        );
        Ok((merged, counters))
    }

    /// Find the group event `idx` belongs to, if any.
    async fn assign_event(
        &self,
        idx: usize,
        event_features: &EventFeatures,
        inputs: &[MergerInput],
        groups: &[GroupState],
        indexes: &Indexes,
        counters: &mut MergerCounters,
    ) -> Result<Option<usize>> {
        let (candidate_ids, lookups) = indexes.candidates(event_features);
        counters.index_lookups += lookups;
        if candidate_ids.is_empty() {
            return Ok(None);
        }

        // Score and order candidates, best first; group id breaks ties for
        // deterministic grouping.
        let mut scored: Vec<(f64, usize)> = candidate_ids
            .into_iter()
            .map(|group_id| (score_candidate(event_features, &groups[group_id]), group_id))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let window_size = self.config.window_size.clamp(1, self.config.max_concurrent_requests.max(1));

        for window in scored.chunks(window_size) {
            let mut eligible: Vec<usize> = Vec::new();
            let mut rule_matched: Option<usize> = None;

            for &(score, group_id) in window {
                match prefilter(event_features, &groups[group_id], score, &self.config) {
                    PreFilter::QuickExclude => counters.quick_exclusions += 1,
                    PreFilter::Reject => counters.low_score_rejections += 1,
                    PreFilter::RuleMatch => {
                        counters.rule_based_merges += 1;
                        counters.concurrent_llm_calls_saved += eligible.len() as u64;
                        rule_matched = Some(group_id);
                        break;
                    }
                    PreFilter::LlmEligible => eligible.push(group_id),
                }
            }

            if let Some(group_id) = rule_matched {
                debug!(event = idx, group = group_id, "rule-based merge");
                return Ok(Some(group_id));
            }
            if eligible.is_empty() {
                continue;
            }

            // Concurrent adjudication of the whole window; results consumed
            // in score order with early termination.
            counters.concurrent_windows_processed += 1;
            counters.llm_candidates += eligible.len() as u64;

            let adjudications = eligible.iter().map(|&group_id| {
                let representative = &inputs[groups[group_id].representative_idx];
                let candidate = &inputs[idx];
                self.matcher.is_same_event(representative, candidate)
            });
            let results = join_all(adjudications).await;

            for (position, result) in results.iter().enumerate() {
                match result {
                    Ok((true, cached)) => {
                        if *cached {
                            counters.cache_hits += 1;
                        }
                        counters.llm_confirmed_merges += 1;
                        counters.concurrent_llm_calls_saved +=
                            (results.len() - position - 1) as u64;
                        let group_id = eligible[position];
                        debug!(event = idx, group = group_id, "llm-confirmed merge");
                        return Ok(Some(group_id));
                    }
                    Ok((false, cached)) => {
                        if *cached {
                            counters.cache_hits += 1;
                        }
                    }
                    Err(e) => warn!(event = idx, error = %e, "semantic match failed, treating as no-match"),
                }
            }
        }

        Ok(None)
    }

    async fn build_groups(
        &self,
        groups: Vec<GroupState>,
        inputs: Vec<MergerInput>,
    ) -> Vec<MergedEventGroup> {
        let mut out = Vec::with_capacity(groups.len());

        for group in &groups {
            let contributors: Vec<&MergerInput> =
                group.members.iter().map(|&i| &inputs[i]).collect();
            let chosen = representative::select_representative(
                &self.llm,
                &contributors,
                &self.config.user_language,
            )
            .await;
            let rep = representative::build_representative(&contributors, chosen);

            let relevance = contributors
                .iter()
                .filter_map(|c| c.relevance)
                .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

            out.push((
                group.id,
                MergedEventGroup {
                    representative: rep,
                    is_merged: group.members.len() > 1,
                    source_contributions: group.members.iter().map(|&i| inputs[i].clone()).collect(),
                    relevance,
                },
            ));
        }

        // Timestamp ascending, undated first; stable by group creation order.
        out.sort_by(|(id_a, a), (id_b, b)| {
            match (a.representative.timestamp, b.representative.timestamp) {
                (None, None) => id_a.cmp(id_b),
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y).then(id_a.cmp(id_b)),
            }
        });
        out.into_iter().map(|(_, group)| group).collect()
    }
}
