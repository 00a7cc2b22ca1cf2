//! Maps a scout's completed requirements onto another version of the same checklist
//!
//! Matching is tried in order:
//!
//! 1. identical requirement number (`exact`)
//! 2. identical external key (`exact`)
//! 3. best word-set Jaccard similarity of the descriptions, accepted only when
//!    strictly above the threshold (`likely`)
//!
//! Anything else maps to nothing (`none`). The result is a recommendation for a
//! human reviewer; nothing here touches progress records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::models::Requirement;

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.5;

/// How certain a cross-version match is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Exact,
    Likely,
    /// Chosen by the reviewer
    Manual,
    None,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Exact => write!(f, "exact"),
            Confidence::Likely => write!(f, "likely"),
            Confidence::Manual => write!(f, "manual"),
            Confidence::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementMapping {
    pub source_number: String,
    pub target_requirement_id: Option<Uuid>,
    pub target_number: Option<String>,
    pub confidence: Confidence,
    pub source_description: String,
    pub target_description: Option<String>,
}

impl RequirementMapping {
    fn unmatched(source: &Requirement) -> Self {
        Self {
            source_number: source.requirement_number.clone(),
            target_requirement_id: None,
            target_number: None,
            confidence: Confidence::None,
            source_description: source.description.clone(),
            target_description: None,
        }
    }

    fn matched(source: &Requirement, target: &Requirement, confidence: Confidence) -> Self {
        Self {
            source_number: source.requirement_number.clone(),
            target_requirement_id: Some(target.id),
            target_number: Some(target.requirement_number.clone()),
            confidence,
            source_description: source.description.clone(),
            target_description: Some(target.description.clone()),
        }
    }

    /// Reviewer override pointing this mapping at `target`
    pub fn assign_manual(&mut self, target: &Requirement) {
        self.target_requirement_id = Some(target.id);
        self.target_number = Some(target.requirement_number.clone());
        self.target_description = Some(target.description.clone());
        self.confidence = Confidence::Manual;
    }

    /// Reviewer decision to drop this requirement's history
    pub fn clear(&mut self) {
        self.target_requirement_id = None;
        self.target_number = None;
        self.target_description = None;
        self.confidence = Confidence::None;
    }

    pub fn needs_attention(&self) -> bool {
        self.confidence == Confidence::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOptions {
    /// Similarity a fuzzy match must strictly exceed
    pub min_similarity: f64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// Counts of mappings per confidence level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingSummary {
    pub exact: usize,
    pub likely: usize,
    pub manual: usize,
    pub none: usize,
}

impl MappingSummary {
    pub fn from_mappings(mappings: &[RequirementMapping]) -> Self {
        let mut summary = Self::default();
        for mapping in mappings {
            match mapping.confidence {
                Confidence::Exact => summary.exact += 1,
                Confidence::Likely => summary.likely += 1,
                Confidence::Manual => summary.manual += 1,
                Confidence::None => summary.none += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.exact + self.likely + self.manual + self.none
    }
}

/// Case-folded, whitespace-separated word set
fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// `|A ∩ B| / |A ∪ B|` over the word sets of two descriptions; 0.0 when both
/// are empty
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    set_similarity(&word_set(a), &word_set(b))
}

fn set_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Maps every completed source requirement onto the target version.
///
/// Output follows source order. Fuzzy ties go to the target encountered
/// first, so results are deterministic for a fixed target order. Either
/// requirement set being empty yields an empty list.
pub fn reconcile(
    source: &[Requirement],
    target: &[Requirement],
    completed_source_numbers: &BTreeSet<String>,
    options: &ReconcileOptions,
) -> Vec<RequirementMapping> {
    if source.is_empty() || target.is_empty() {
        return Vec::new();
    }

    // First occurrence wins for duplicated numbers or keys
    let mut by_number: BTreeMap<&str, &Requirement> = BTreeMap::new();
    let mut by_key: BTreeMap<&str, &Requirement> = BTreeMap::new();
    for req in target {
        by_number.entry(req.requirement_number.as_str()).or_insert(req);
        if let Some(key) = req.external_key.as_deref() {
            by_key.entry(key).or_insert(req);
        }
    }
    let target_words: Vec<HashSet<String>> =
        target.iter().map(|r| word_set(&r.description)).collect();

    source
        .iter()
        .filter(|req| completed_source_numbers.contains(&req.requirement_number))
        .map(|req| {
            if let Some(hit) = by_number.get(req.requirement_number.as_str()) {
                return RequirementMapping::matched(req, hit, Confidence::Exact);
            }

            if let Some(hit) = req.external_key.as_deref().and_then(|k| by_key.get(k)) {
                return RequirementMapping::matched(req, hit, Confidence::Exact);
            }

            match best_fuzzy_match(req, target, &target_words) {
                Some((hit, score)) if score > options.min_similarity => {
                    log::debug!(
                        "requirement {} likely matches {} (similarity {:.2})",
                        req.requirement_number,
                        hit.requirement_number,
                        score
                    );
                    RequirementMapping::matched(req, hit, Confidence::Likely)
                }
                _ => RequirementMapping::unmatched(req),
            }
        })
        .collect()
}

fn best_fuzzy_match<'a>(
    source: &Requirement,
    target: &'a [Requirement],
    target_words: &[HashSet<String>],
) -> Option<(&'a Requirement, f64)> {
    let source_words = word_set(&source.description);

    let mut best: Option<(&Requirement, f64)> = None;
    for (req, words) in target.iter().zip(target_words) {
        let score = set_similarity(&source_words, words);
        // Strictly greater keeps the first-encountered target on ties
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((req, score));
        }
    }
    best
}
