use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CandidateSearcher, ScoredCandidate, SearchResult};
use crate::config::ResolutionConfig;
use crate::matching::LabelCompatibilityMatch;
use crate::model::{ResolutionLevel, SuggestedEntity};
use crate::schema::DataDictionary;
use crate::storage::EntityRepository;

/// Embedding similarity search.
///
/// Hits at or above `candidate_threshold` that are label-compatible become
/// candidates. The searcher is confident only when exactly one hit reaches
/// `auto_accept_threshold` and that hit is label-compatible.
pub struct VectorSearcher {
    repo: Arc<dyn EntityRepository>,
    top_k: usize,
    candidate_threshold: f64,
    auto_accept_threshold: f64,
}

impl VectorSearcher {
    pub fn new(repo: Arc<dyn EntityRepository>, config: &ResolutionConfig) -> Self {
        Self {
            repo,
            top_k: config.vector_top_k,
            candidate_threshold: config.vector_candidate_threshold,
            auto_accept_threshold: config.vector_auto_accept_threshold,
        }
    }

    pub fn with_thresholds(mut self, candidate: f64, auto_accept: f64) -> Self {
        self.candidate_threshold = candidate;
        self.auto_accept_threshold = auto_accept;
        self
    }
}

#[async_trait]
impl CandidateSearcher for VectorSearcher {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::EmbeddingMatch
    }

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult {
        let query = suggested.embedding_text();
        let hits = match self
            .repo
            .vector_search(&query, &[], self.top_k, self.candidate_threshold)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(searcher = self.name(), entity = %suggested.name, error = %e, "Vector search failed");
                return SearchResult::empty();
            }
        };

        let above_auto: Vec<_> = hits
            .iter()
            .filter(|(_, score)| *score >= self.auto_accept_threshold)
            .collect();

        let confident = match above_auto.as_slice() {
            [(entity, score)]
                if LabelCompatibilityMatch::compatible(&suggested.labels, &entity.labels, schema) =>
            {
                debug!(entity = %suggested.name, matched = %entity.id, score, "Vector auto-accept");
                Some(entity.clone())
            }
            _ => None,
        };
        if let Some(entity) = confident {
            return SearchResult::confident(entity);
        }

        let candidates = hits
            .into_iter()
            .filter(|(entity, _)| {
                LabelCompatibilityMatch::compatible(&suggested.labels, &entity.labels, schema)
            })
            .map(|(entity, score)| ScoredCandidate::new(entity, score))
            .collect();
        SearchResult::candidates(candidates)
    }
}
