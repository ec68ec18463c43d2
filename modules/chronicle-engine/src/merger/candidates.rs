//! Pure candidate machinery for the merger: per-event features, the four
//! lookup indexes, candidate scoring, and the pre-LLM filter verdicts.

use std::collections::{BTreeSet, HashMap, HashSet};

use chronicle_common::DateRange;
use uuid::Uuid;

use super::{MergerConfig, MergerInput};

/// Precomputed comparison features for one input event.
#[derive(Debug, Clone)]
pub(crate) struct EventFeatures {
    pub idx: usize,
    pub entity_uuids: BTreeSet<Uuid>,
    pub entity_types: BTreeSet<String>,
    pub date_range: Option<DateRange>,
    pub event_year: Option<i32>,
    /// md5(description)[:8]
    pub description_hash: String,
    pub description_len: usize,
    pub language: Option<String>,
}

impl EventFeatures {
    pub fn from_input(idx: usize, input: &MergerInput) -> Self {
        let date_range = input.event.date_info.as_ref().and_then(|d| d.to_date_range());
        let event_year = input.event.date_info.as_ref().and_then(|d| d.event_year());
        Self {
            idx,
            entity_uuids: input.entities.iter().map(|e| e.id).collect(),
            entity_types: input.entities.iter().map(|e| e.entity_type.clone()).collect(),
            date_range,
            event_year,
            description_hash: short_description_hash(&input.event.description),
            description_len: input.event.description.chars().count(),
            language: input.sources.first().map(|s| s.source_language.clone()),
        }
    }
}

pub(crate) fn short_description_hash(description: &str) -> String {
    format!("{:x}", md5::compute(description.as_bytes()))[..8].to_string()
}

/// A forming group: members plus accumulated feature summaries used for
/// candidate scoring.
#[derive(Debug, Clone)]
pub(crate) struct GroupState {
    pub id: usize,
    pub members: Vec<usize>,
    pub representative_idx: usize,
    pub entity_uuids: BTreeSet<Uuid>,
    pub entity_types: BTreeSet<String>,
    pub year: Option<i32>,
    pub date_range: Option<DateRange>,
    pub languages: BTreeSet<String>,
    pub description_hashes: BTreeSet<String>,
    pub representative_description_len: usize,
}

impl GroupState {
    pub fn new(id: usize, features: &EventFeatures) -> Self {
        Self {
            id,
            members: vec![features.idx],
            representative_idx: features.idx,
            entity_uuids: features.entity_uuids.clone(),
            entity_types: features.entity_types.clone(),
            year: features.event_year,
            date_range: features.date_range,
            languages: features.language.iter().cloned().collect(),
            description_hashes: [features.description_hash.clone()].into_iter().collect(),
            representative_description_len: features.description_len,
        }
    }

    pub fn absorb(&mut self, features: &EventFeatures) {
        self.members.push(features.idx);
        self.entity_uuids.extend(features.entity_uuids.iter().copied());
        self.entity_types.extend(features.entity_types.iter().cloned());
        if self.year.is_none() {
            self.year = features.event_year;
        }
        if self.date_range.is_none() {
            self.date_range = features.date_range;
        }
        self.languages.extend(features.language.iter().cloned());
        self.description_hashes.insert(features.description_hash.clone());
    }
}

/// The four lookup indexes, all mapping to group ids.
#[derive(Default)]
pub(crate) struct Indexes {
    entity: HashMap<Uuid, Vec<usize>>,
    entity_type: HashMap<String, Vec<usize>>,
    year: HashMap<i32, Vec<usize>>,
    hybrid: HashMap<(Uuid, i32), Vec<usize>>,
}

impl Indexes {
    /// Register a group under one member's features. Safe to call again when
    /// the group absorbs new members.
    pub fn register(&mut self, group_id: usize, features: &EventFeatures) {
        for uuid in &features.entity_uuids {
            push_unique(self.entity.entry(*uuid).or_default(), group_id);
        }
        for entity_type in &features.entity_types {
            push_unique(self.entity_type.entry(entity_type.clone()).or_default(), group_id);
        }
        if let Some(year) = features.event_year {
            push_unique(self.year.entry(year).or_default(), group_id);
            for uuid in &features.entity_uuids {
                push_unique(self.hybrid.entry((*uuid, year)).or_default(), group_id);
            }
        }
    }

    /// Union of all index hits for an event. Returns sorted group ids and
    /// the number of individual index lookups performed.
    pub fn candidates(&self, features: &EventFeatures) -> (Vec<usize>, u64) {
        let mut lookups = 0u64;
        let mut hits: HashSet<usize> = HashSet::new();

        for uuid in &features.entity_uuids {
            lookups += 1;
            if let Some(groups) = self.entity.get(uuid) {
                hits.extend(groups.iter().copied());
            }
        }
        for entity_type in &features.entity_types {
            lookups += 1;
            if let Some(groups) = self.entity_type.get(entity_type) {
                hits.extend(groups.iter().copied());
            }
        }
        if let Some(year) = features.event_year {
            for y in [year - 1, year, year + 1] {
                lookups += 1;
                if let Some(groups) = self.year.get(&y) {
                    hits.extend(groups.iter().copied());
                }
            }
            for uuid in &features.entity_uuids {
                lookups += 1;
                if let Some(groups) = self.hybrid.get(&(*uuid, year)) {
                    hits.extend(groups.iter().copied());
                }
            }
        }

        let mut out: Vec<usize> = hits.into_iter().collect();
        out.sort_unstable();
        (out, lookups)
    }
}

fn push_unique(groups: &mut Vec<usize>, group_id: usize) {
    if groups.last() != Some(&group_id) && !groups.contains(&group_id) {
        groups.push(group_id);
    }
}

/// Candidate score 0–100: entity overlap ×10, type overlap ×5, year
/// proximity 30/20/10, language match +10, description-hash match +10.
pub(crate) fn score_candidate(features: &EventFeatures, group: &GroupState) -> f64 {
    let entity_overlap = features.entity_uuids.intersection(&group.entity_uuids).count();
    let type_overlap = features.entity_types.intersection(&group.entity_types).count();

    let mut score = entity_overlap as f64 * 10.0 + type_overlap as f64 * 5.0;

    if let (Some(a), Some(b)) = (features.event_year, group.year) {
        score += match (a - b).abs() {
            0 => 30.0,
            1 => 20.0,
            2 => 10.0,
            _ => 0.0,
        };
    }
    if let Some(lang) = &features.language {
        if group.languages.contains(lang) {
            score += 10.0;
        }
    }
    if group.description_hashes.contains(&features.description_hash) {
        score += 10.0;
    }
    score
}

/// Pre-LLM verdict for one (event, candidate group) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreFilter {
    /// Cheap negative: no LLM, no merge.
    QuickExclude,
    /// Cheap positive: merge immediately, no LLM.
    RuleMatch,
    /// Worth an LLM adjudication.
    LlmEligible,
    /// Not excluded outright, but below the LLM bar.
    Reject,
}

pub(crate) fn prefilter(
    features: &EventFeatures,
    group: &GroupState,
    score: f64,
    config: &MergerConfig,
) -> PreFilter {
    let entity_overlap = features.entity_uuids.intersection(&group.entity_uuids).count();
    let type_overlap = features.entity_types.intersection(&group.entity_types).count();

    // Quick exclusions.
    if let (Some(a), Some(b)) = (features.event_year, group.year) {
        if (a - b).abs() > 2 {
            return PreFilter::QuickExclude;
        }
    }
    if entity_overlap == 0 && type_overlap == 0 {
        return PreFilter::QuickExclude;
    }
    let (longer, shorter) = (
        features.description_len.max(group.representative_description_len),
        features.description_len.min(group.representative_description_len),
    );
    if shorter > 0 && longer / shorter > 5 {
        return PreFilter::QuickExclude;
    }

    // Rule-based positive: heavy entity overlap relative to the smaller set
    // plus compatible dates.
    let smaller = features.entity_uuids.len().min(group.entity_uuids.len());
    if smaller > 0 {
        let overlap_ratio = entity_overlap as f64 / smaller as f64;
        let dates_compatible = match (&features.date_range, &group.date_range) {
            (Some(a), Some(b)) => a.overlaps(b),
            (None, None) => true,
            _ => false,
        };
        if overlap_ratio >= config.rule_overlap_ratio && dates_compatible {
            return PreFilter::RuleMatch;
        }
    }

    // LLM eligibility.
    if entity_overlap < config.min_common_entities {
        return PreFilter::Reject;
    }
    if let (Some(a), Some(b)) = (features.event_year, group.year) {
        if (a - b).abs() > 3 {
            return PreFilter::Reject;
        }
    }
    if score < config.llm_score_threshold {
        return PreFilter::Reject;
    }
    PreFilter::LlmEligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn features(idx: usize, uuids: &[u128], types: &[&str], year: Option<i32>) -> EventFeatures {
        EventFeatures {
            idx,
            entity_uuids: uuids.iter().map(|n| uuid(*n)).collect(),
            entity_types: types.iter().map(|s| s.to_string()).collect(),
            date_range: year.map(|y| DateRange {
                start: NaiveDate::from_ymd_opt(y, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(y, 12, 31).unwrap(),
            }),
            event_year: year,
            description_hash: format!("hash{idx:04}"),
            description_len: 50,
            language: Some("en".to_string()),
        }
    }

    fn config() -> MergerConfig {
        MergerConfig::default()
    }

    #[test]
    fn indexes_find_groups_by_entity_year_and_hybrid() {
        let mut indexes = Indexes::default();
        let f0 = features(0, &[1, 2], &["person"], Some(1969));
        let group = GroupState::new(0, &f0);
        indexes.register(group.id, &f0);

        // Same entity, different year.
        let (hits, _) = indexes.candidates(&features(1, &[1], &["place"], Some(1980)));
        assert_eq!(hits, vec![0]);

        // Adjacent year only.
        let (hits, _) = indexes.candidates(&features(2, &[9], &["thing"], Some(1970)));
        assert_eq!(hits, vec![0]);

        // Entity type only.
        let (hits, _) = indexes.candidates(&features(3, &[9], &["person"], None));
        assert_eq!(hits, vec![0]);

        // Nothing shared.
        let (hits, _) = indexes.candidates(&features(4, &[9], &["place"], Some(1500)));
        assert!(hits.is_empty());
    }

    #[test]
    fn candidate_lookup_counts_index_probes() {
        let indexes = Indexes::default();
        // 2 entities + 1 type + 3 year probes + 2 hybrid probes
        let (_, lookups) = indexes.candidates(&features(0, &[1, 2], &["person"], Some(1969)));
        assert_eq!(lookups, 8);
    }

    #[test]
    fn score_rewards_overlap_and_proximity() {
        let f0 = features(0, &[1, 2], &["person", "place"], Some(1969));
        let group = GroupState::new(0, &f0);

        // Same year, both entities, both types, language matches.
        let same = features(1, &[1, 2], &["person", "place"], Some(1969));
        // 2*10 + 2*5 + 30 + 10(lang) + 0(hash differs)
        assert_eq!(score_candidate(&same, &group), 70.0);

        // One entity, one year off.
        let near = features(2, &[1], &["person"], Some(1970));
        // 10 + 5 + 20 + 10
        assert_eq!(score_candidate(&near, &group), 45.0);

        // Identical description hash adds ten.
        let mut twin = features(3, &[1], &[], Some(1969));
        twin.description_hash = "hash0000".to_string();
        assert_eq!(score_candidate(&twin, &group), 10.0 + 30.0 + 10.0 + 10.0);
    }

    #[test]
    fn quick_exclude_on_distant_years() {
        let group = GroupState::new(0, &features(0, &[1], &["person"], Some(1940)));
        let far = features(1, &[1], &["person"], Some(1950));
        let score = score_candidate(&far, &group);
        assert_eq!(prefilter(&far, &group, score, &config()), PreFilter::QuickExclude);
    }

    #[test]
    fn quick_exclude_on_zero_overlap() {
        let group = GroupState::new(0, &features(0, &[1], &["person"], Some(1940)));
        let stranger = features(1, &[2], &["place"], Some(1940));
        assert_eq!(
            prefilter(&stranger, &group, 30.0, &config()),
            PreFilter::QuickExclude
        );
    }

    #[test]
    fn quick_exclude_on_description_length_ratio() {
        let group = GroupState::new(0, &features(0, &[1], &["person"], Some(1940)));
        let mut verbose = features(1, &[1], &["person"], Some(1940));
        verbose.description_len = 500;
        let score = score_candidate(&verbose, &group);
        assert_eq!(prefilter(&verbose, &group, score, &config()), PreFilter::QuickExclude);
    }

    #[test]
    fn rule_match_on_heavy_overlap_and_compatible_dates() {
        let group = GroupState::new(0, &features(0, &[1, 2, 3, 4], &["person"], Some(1940)));
        let candidate = features(1, &[1, 2, 3], &["person"], Some(1940));
        let score = score_candidate(&candidate, &group);
        // 3/3 = 1.0 overlap relative to the smaller set, ranges overlap.
        assert_eq!(prefilter(&candidate, &group, score, &config()), PreFilter::RuleMatch);
    }

    #[test]
    fn rule_match_requires_date_compatibility() {
        let mut group = GroupState::new(0, &features(0, &[1, 2], &["person"], Some(1940)));
        group.date_range = None;
        group.year = None;
        let candidate = features(1, &[1, 2], &["person"], Some(1941));
        // One side dated, one not → dates incompatible, but entity overlap
        // keeps it LLM-eligible.
        let score = score_candidate(&candidate, &group);
        assert_eq!(prefilter(&candidate, &group, score, &config()), PreFilter::LlmEligible);
    }

    #[test]
    fn both_undated_counts_as_compatible() {
        let mut f0 = features(0, &[1, 2], &["person"], None);
        f0.date_range = None;
        let group = GroupState::new(0, &f0);
        let mut candidate = features(1, &[1, 2], &["person"], None);
        candidate.date_range = None;
        let score = score_candidate(&candidate, &group);
        assert_eq!(prefilter(&candidate, &group, score, &config()), PreFilter::RuleMatch);
    }

    #[test]
    fn low_score_is_rejected_not_excluded() {
        let group = GroupState::new(0, &features(0, &[1], &["person"], None));
        let mut candidate = features(1, &[2], &["person"], None);
        candidate.date_range = None;
        // Type overlap only: score 5 + 10(lang) = 15 but no common entity.
        let score = score_candidate(&candidate, &group);
        assert_eq!(prefilter(&candidate, &group, score, &config()), PreFilter::Reject);
    }

    #[test]
    fn group_absorb_extends_feature_summaries() {
        let mut group = GroupState::new(0, &features(0, &[1], &["person"], Some(1969)));
        group.absorb(&features(1, &[2], &["place"], Some(1969)));
        assert_eq!(group.members.len(), 2);
        assert!(group.entity_uuids.contains(&uuid(1)));
        assert!(group.entity_uuids.contains(&uuid(2)));
        assert!(group.entity_types.contains("place"));
    }
}
