//! LLM classification of a new proposition against stored candidates and
//! the rule turning classifications into a decision.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::langbase::parse_structured;
use crate::model::Proposition;
use crate::storage::Scored;

/// How a stored proposition relates to the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropositionRelation {
    Identical,
    Similar,
    Contradictory,
    Generalizes,
    #[serde(other)]
    Unrelated,
}

/// One classifier verdict for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub candidate_id: String,
    pub relation: PropositionRelation,
    #[serde(default)]
    pub similarity: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl Classification {
    pub fn new(candidate_id: impl Into<String>, relation: PropositionRelation, similarity: f64) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            relation,
            similarity,
            reasoning: String::new(),
        }
    }
}

/// What to do with a new proposition; targets are stored proposition ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    New { generalizes: Vec<String> },
    Merge(String),
    Reinforce(String),
    Contradict(String),
}

/// Apply the outcome priority to a set of classifications.
///
/// The first IDENTICAL (in classification order) wins; otherwise the first
/// CONTRADICTORY; otherwise the SIMILAR with the highest similarity, ties
/// going to the lowest candidate id; otherwise New, carrying any
/// GENERALIZES ids. Verdicts about ids outside `candidate_ids` are ignored.
pub fn decide(classifications: &[Classification], candidate_ids: &BTreeSet<&str>) -> Decision {
    let known: Vec<&Classification> = classifications
        .iter()
        .filter(|c| candidate_ids.contains(c.candidate_id.as_str()))
        .collect();

    let first = |relation: PropositionRelation| {
        known
            .iter()
            .find(|c| c.relation == relation)
            .map(|c| c.candidate_id.clone())
    };

    if let Some(id) = first(PropositionRelation::Identical) {
        return Decision::Merge(id);
    }
    if let Some(id) = first(PropositionRelation::Contradictory) {
        return Decision::Contradict(id);
    }

    let best_similar = known
        .iter()
        .filter(|c| c.relation == PropositionRelation::Similar)
        .min_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
    if let Some(similar) = best_similar {
        return Decision::Reinforce(similar.candidate_id.clone());
    }

    let generalizes: BTreeSet<String> = known
        .iter()
        .filter(|c| c.relation == PropositionRelation::Generalizes)
        .map(|c| c.candidate_id.clone())
        .collect();
    Decision::New {
        generalizes: generalizes.into_iter().collect(),
    }
}

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    #[serde(default)]
    classifications: Vec<Classification>,
}

#[derive(Debug, Deserialize)]
struct BatchEntry {
    proposition_index: usize,
    #[serde(default)]
    classifications: Vec<Classification>,
}

#[derive(Debug, Deserialize)]
struct BatchReply {
    #[serde(default)]
    results: Vec<BatchEntry>,
}

pub(crate) fn single_prompt(proposition: &Proposition, candidates: &[Scored<Proposition>]) -> String {
    format!(
        "NEW proposition: {}\n\nEXISTING propositions:\n{}",
        proposition.text,
        list_candidates(candidates)
    )
}

pub(crate) fn batch_prompt(items: &[(usize, &Proposition, &[Scored<Proposition>])]) -> String {
    let sections: Vec<String> = items
        .iter()
        .map(|(index, proposition, candidates)| {
            format!(
                "proposition_index {}\nNEW proposition: {}\nEXISTING propositions:\n{}",
                index,
                proposition.text,
                list_candidates(candidates)
            )
        })
        .collect();
    sections.join("\n\n")
}

fn list_candidates(candidates: &[Scored<Proposition>]) -> String {
    candidates
        .iter()
        .map(|(p, score)| format!("- candidate_id: {} | score: {:.2} | {}", p.id, score, p.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn parse_single(completion: &str) -> Option<Vec<Classification>> {
    parse_structured::<ClassificationReply>(completion)
        .ok()
        .map(|reply| reply.classifications)
}

/// Classifications keyed by `proposition_index`; the first entry per index
/// wins.
pub(crate) fn parse_batch(completion: &str) -> BTreeMap<usize, Vec<Classification>> {
    let mut out = BTreeMap::new();
    if let Ok(reply) = parse_structured::<BatchReply>(completion) {
        for entry in reply.results {
            out.entry(entry.proposition_index)
                .or_insert(entry.classifications);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use PropositionRelation::*;

    fn ids<'a>(ids: &[&'a str]) -> BTreeSet<&'a str> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_first_identical_wins_over_score() {
        let decision = decide(
            &[
                Classification::new("p2", Identical, 0.7),
                Classification::new("p1", Identical, 0.99),
                Classification::new("p3", Contradictory, 0.9),
            ],
            &ids(&["p1", "p2", "p3"]),
        );
        assert_eq!(decision, Decision::Merge("p2".to_string()));
    }

    #[test]
    fn test_contradiction_beats_similarity() {
        let decision = decide(
            &[
                Classification::new("p1", Similar, 0.9),
                Classification::new("p2", Contradictory, 0.4),
            ],
            &ids(&["p1", "p2"]),
        );
        assert_eq!(decision, Decision::Contradict("p2".to_string()));
    }

    #[test]
    fn test_similar_tie_breaks_on_lowest_id() {
        let decision = decide(
            &[
                Classification::new("p9", Similar, 0.8),
                Classification::new("p3", Similar, 0.8),
                Classification::new("p5", Similar, 0.6),
            ],
            &ids(&["p3", "p5", "p9"]),
        );
        assert_eq!(decision, Decision::Reinforce("p3".to_string()));
    }

    #[test]
    fn test_generalizes_falls_to_new() {
        let decision = decide(
            &[
                Classification::new("p1", Generalizes, 0.8),
                Classification::new("p2", Unrelated, 0.1),
            ],
            &ids(&["p1", "p2"]),
        );
        assert_eq!(
            decision,
            Decision::New {
                generalizes: vec!["p1".to_string()]
            }
        );
    }

    #[test]
    fn test_unknown_candidate_ids_are_ignored() {
        let decision = decide(&[Classification::new("ghost", Identical, 1.0)], &ids(&["p1"]));
        assert_eq!(decision, Decision::New { generalizes: vec![] });
    }

    #[test]
    fn test_unknown_relation_reads_as_unrelated() {
        let parsed = parse_single(
            r#"{"classifications": [{"candidate_id": "p1", "relation": "OVERLAPS", "similarity": 0.4}]}"#,
        )
        .unwrap();
        assert_eq!(parsed[0].relation, Unrelated);
    }

    #[test]
    fn test_parse_batch_maps_by_index() {
        let completion = r#"```json
{"results": [
  {"proposition_index": 2, "classifications": [{"candidate_id": "p7", "relation": "SIMILAR", "similarity": 0.8}]},
  {"proposition_index": 0, "classifications": []},
  {"proposition_index": 2, "classifications": []}
]}
```"#;
        let parsed = parse_batch(completion);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&2][0].candidate_id, "p7");
        assert!(parsed[&0].is_empty());
        assert!(parse_batch("garbage").is_empty());
    }
}
