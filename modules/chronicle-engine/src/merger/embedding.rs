//! Alternate merger strategy: embedding similarity with an optional LLM
//! verification band. Exchangeable with [`super::EventMerger`] — identical
//! output schema, different grouping mechanics.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, info};

use crate::embedder::{cosine_similarity, TextEmbedder};
use crate::traits::Llm;

use super::representative;
use super::semantic::SemanticMatcher;
use super::{MergedEventGroup, MergerConfig, MergerCounters, MergerInput};

#[derive(Debug, Clone)]
pub struct EmbeddingMergerConfig {
    /// Cosine similarity at or above which events merge directly.
    pub sim_threshold: f64,
    /// Lower bound of the LLM verification band (hybrid mode only).
    pub llm_band_threshold: f64,
    /// When true, pairs in [llm_band_threshold, sim_threshold) go to the
    /// LLM; when false they stay separate.
    pub hybrid: bool,
}

impl Default for EmbeddingMergerConfig {
    fn default() -> Self {
        Self { sim_threshold: 0.85, llm_band_threshold: 0.70, hybrid: false }
    }
}

pub struct EmbeddingEventMerger {
    llm: Arc<dyn Llm>,
    embedder: Arc<dyn TextEmbedder>,
    matcher: SemanticMatcher,
    config: MergerConfig,
    embedding_config: EmbeddingMergerConfig,
}

impl EmbeddingEventMerger {
    pub fn new(
        llm: Arc<dyn Llm>,
        embedder: Arc<dyn TextEmbedder>,
        config: MergerConfig,
        embedding_config: EmbeddingMergerConfig,
    ) -> Self {
        let matcher = SemanticMatcher::new(Arc::clone(&llm));
        Self { llm, embedder, matcher, config, embedding_config }
    }

    pub async fn merge(
        &self,
        inputs: Vec<MergerInput>,
    ) -> Result<(Vec<MergedEventGroup>, MergerCounters)> {
        let mut counters = MergerCounters { total_events: inputs.len() as u64, ..Default::default() };

        let embeddings = join_all(
            inputs
                .iter()
                .map(|input| self.embedder.encode(&input.event.description, true, false)),
        )
        .await;

        // Chronological processing order, undated last (same as the
        // rule/LLM strategy).
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        order.sort_by_key(|&i| {
            let year = inputs[i].event.date_info.as_ref().and_then(|d| d.event_year());
            (year.is_none(), year)
        });

        // groups[g] = (member indices, anchor index for similarity).
        let mut groups: Vec<(Vec<usize>, usize)> = Vec::new();

        for idx in order {
            let mut assigned = None;
            let mut band_candidates: Vec<usize> = Vec::new();

            for (group_id, (_, anchor)) in groups.iter().enumerate() {
                let sim = cosine_similarity(&embeddings[idx], &embeddings[*anchor]);
                if sim >= self.embedding_config.sim_threshold {
                    assigned = Some(group_id);
                    counters.rule_based_merges += 1;
                    break;
                }
                if self.embedding_config.hybrid && sim >= self.embedding_config.llm_band_threshold {
                    band_candidates.push(group_id);
                }
            }

            if assigned.is_none() && !band_candidates.is_empty() {
                // Verify the ambiguous band in windows, best-first arrival
                // order, early termination on the first confirmation.
                let window_size = self.config.window_size.max(1);
                'windows: for window in band_candidates.chunks(window_size) {
                    counters.concurrent_windows_processed += 1;
                    counters.llm_candidates += window.len() as u64;
                    let adjudications = window.iter().map(|&group_id| {
                        let anchor = groups[group_id].1;
                        self.matcher.is_same_event(&inputs[anchor], &inputs[idx])
                    });
                    let results = join_all(adjudications).await;
                    for (position, result) in results.iter().enumerate() {
                        if let Ok((true, cached)) = result {
                            if *cached {
                                counters.cache_hits += 1;
                            }
                            counters.llm_confirmed_merges += 1;
                            counters.concurrent_llm_calls_saved +=
                                (results.len() - position - 1) as u64;
                            assigned = Some(window[position]);
                            break 'windows;
                        }
                        if let Ok((false, true)) = result {
                            counters.cache_hits += 1;
                        }
                    }
                }
            }

            match assigned {
                Some(group_id) => {
                    debug!(event = idx, group = group_id, "embedding merge");
                    groups[group_id].0.push(idx);
                }
                None => groups.push((vec![idx], idx)),
            }
        }

        let mut out = Vec::with_capacity(groups.len());
        for (group_id, (members, _)) in groups.iter().enumerate() {
            let contributors: Vec<&MergerInput> = members.iter().map(|&i| &inputs[i]).collect();
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
                group_id,
                MergedEventGroup {
                    representative: rep,
                    is_merged: members.len() > 1,
                    source_contributions: members.iter().map(|&i| inputs[i].clone()).collect(),
                    relevance,
                },
            ));
        }

        out.sort_by(|(id_a, a), (id_b, b)| {
            match (a.representative.timestamp, b.representative.timestamp) {
                (None, None) => id_a.cmp(id_b),
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y).then(id_a.cmp(id_b)),
            }
        });

        info!(
            events = counters.total_events,
            groups = out.len(),
            "embedding event merge complete"
        );
        Ok((out.into_iter().map(|(_, group)| group).collect(), counters))
    }
}
