//! Candidate searchers.
//!
//! A searcher looks up stored entities that might be the same as a
//! suggestion. It is `confident` only when exactly one stored entity
//! qualifies; two or more plausible hits are handed back as candidates for
//! arbitration instead of being broken by picking one.
//!
//! Searchers never fail: store or LLM errors are logged and turn into an
//! empty result, so the resolver simply moves on to the next mechanism.

mod agentic;
mod heuristic;
mod vector;

pub use agentic::AgenticSearcher;
pub use heuristic::{
    ByExactNameSearcher, ByIdSearcher, FuzzyNameSearcher, NormalizedNameSearcher, TextSearcher,
};
pub use vector::VectorSearcher;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::ResolutionConfig;
use crate::model::{NamedEntityData, ResolutionLevel, SuggestedEntity};
use crate::schema::DataDictionary;
use crate::storage::EntityRepository;

/// A stored entity with the score the searcher found it at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub entity: NamedEntityData,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn new(entity: NamedEntityData, score: f64) -> Self {
        Self { entity, score }
    }
}

/// What one searcher found for one suggestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    /// Accept immediately when set.
    pub confident: Option<NamedEntityData>,
    /// Plausible matches to pool for arbitration.
    pub candidates: Vec<ScoredCandidate>,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn confident(entity: NamedEntityData) -> Self {
        Self {
            confident: Some(entity),
            candidates: Vec::new(),
        }
    }

    pub fn candidates(candidates: Vec<ScoredCandidate>) -> Self {
        Self {
            confident: None,
            candidates,
        }
    }

    /// Confident iff exactly one hit survived filtering; otherwise every
    /// hit becomes a candidate.
    pub fn from_unique(mut hits: Vec<ScoredCandidate>) -> Self {
        if hits.len() == 1 {
            if let Some(hit) = hits.pop() {
                return Self::confident(hit.entity);
            }
        }
        Self::candidates(hits)
    }

    pub fn is_empty(&self) -> bool {
        self.confident.is_none() && self.candidates.is_empty()
    }
}

/// One mechanism for finding stored entities matching a suggestion.
#[async_trait]
pub trait CandidateSearcher: Send + Sync {
    /// Searcher name for logs.
    fn name(&self) -> &'static str;

    /// Level recorded when this searcher is confident.
    fn level(&self) -> ResolutionLevel;

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult;
}

/// ById, ExactName, NormalizedName, FuzzyName, Text and Vector, cheapest
/// first, all reading `repo`.
pub fn default_candidate_searchers(
    repo: Arc<dyn EntityRepository>,
    config: &ResolutionConfig,
) -> Vec<Arc<dyn CandidateSearcher>> {
    vec![
        Arc::new(ByIdSearcher::new(repo.clone())),
        Arc::new(ByExactNameSearcher::new(repo.clone(), config.text_top_k)),
        Arc::new(NormalizedNameSearcher::new(repo.clone(), config.text_top_k)),
        Arc::new(FuzzyNameSearcher::new(repo.clone(), config)),
        Arc::new(TextSearcher::new(repo.clone(), config)),
        Arc::new(VectorSearcher::new(repo, config)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate::new(NamedEntityData::new(id, id, ["Person"]), score)
    }

    #[test]
    fn test_from_unique_gate() {
        assert!(SearchResult::from_unique(vec![]).is_empty());

        let single = SearchResult::from_unique(vec![hit("e1", 1.0)]);
        assert_eq!(single.confident.unwrap().id, "e1");
        assert!(single.candidates.is_empty());

        let tied = SearchResult::from_unique(vec![hit("e1", 1.0), hit("e2", 1.0)]);
        assert!(tied.confident.is_none());
        assert_eq!(tied.candidates.len(), 2);
    }

    #[test]
    fn test_default_searcher_order() {
        let repo: Arc<dyn EntityRepository> = Arc::new(crate::storage::InMemoryEntityStore::new());
        let names: Vec<&str> = default_candidate_searchers(repo, &ResolutionConfig::default())
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(
            names,
            vec!["by_id", "by_exact_name", "normalized_name", "fuzzy_name", "text", "vector"]
        );
    }
}
