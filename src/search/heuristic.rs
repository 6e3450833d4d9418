use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CandidateSearcher, ScoredCandidate, SearchResult};
use crate::config::ResolutionConfig;
use crate::matching::{
    normalize_name, ExactNameMatch, FuzzyNameMatch, LabelCompatibilityMatch, MatchResult,
    MatchStrategy, NormalizedNameMatch, StrategyChain,
};
use crate::model::{NamedEntityData, ResolutionLevel, SuggestedEntity};
use crate::schema::DataDictionary;
use crate::storage::{exact_phrase_query, EntityRepository, Scored};

/// Confident when the suggestion carries an id that is already stored.
pub struct ByIdSearcher {
    repo: Arc<dyn EntityRepository>,
}

impl ByIdSearcher {
    pub fn new(repo: Arc<dyn EntityRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CandidateSearcher for ByIdSearcher {
    fn name(&self) -> &'static str {
        "by_id"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::ExactMatch
    }

    async fn search(&self, suggested: &SuggestedEntity, _schema: &DataDictionary) -> SearchResult {
        let Some(id) = suggested.id.as_deref() else {
            return SearchResult::empty();
        };
        match self.repo.find_by_id(id).await {
            Ok(Some(entity)) => SearchResult::confident(entity),
            Ok(None) => SearchResult::empty(),
            Err(e) => {
                warn!(searcher = self.name(), id = %id, error = %e, "Lookup failed");
                SearchResult::empty()
            }
        }
    }
}

/// Exact, case-insensitive name (or alias) equality via a quoted text query.
///
/// Confident only for a single label-compatible hit; several hits are all
/// returned as candidates.
pub struct ByExactNameSearcher {
    repo: Arc<dyn EntityRepository>,
    top_k: usize,
}

impl ByExactNameSearcher {
    pub fn new(repo: Arc<dyn EntityRepository>, top_k: usize) -> Self {
        Self { repo, top_k }
    }
}

#[async_trait]
impl CandidateSearcher for ByExactNameSearcher {
    fn name(&self) -> &'static str {
        "by_exact_name"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::ExactMatch
    }

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult {
        let name = suggested.name.trim();
        if name.is_empty() {
            return SearchResult::empty();
        }
        let query = exact_phrase_query(name);
        let Some(hits) = text_hits(self.name(), self.repo.as_ref(), &query, self.top_k, 0.0).await
        else {
            return SearchResult::empty();
        };

        let exact: Vec<ScoredCandidate> = hits
            .into_iter()
            .filter(|(entity, _)| names_equal(name, entity))
            .filter(|(entity, _)| {
                LabelCompatibilityMatch::compatible(&suggested.labels, &entity.labels, schema)
            })
            .map(|(entity, score)| ScoredCandidate::new(entity, score))
            .collect();

        SearchResult::from_unique(exact)
    }
}

fn names_equal(name: &str, entity: &NamedEntityData) -> bool {
    let name = name.to_lowercase();
    entity.name.trim().to_lowercase() == name
        || entity
            .aliases()
            .iter()
            .any(|alias| alias.trim().to_lowercase() == name)
}

/// Retrieve by text and keep the hits a strategy chain calls a Match.
struct ChainFilter {
    chain: StrategyChain,
    top_k: usize,
    threshold: f64,
    /// Pool hits the chain could not decide on as candidates.
    pool_inconclusive: bool,
}

impl ChainFilter {
    async fn search(
        &self,
        searcher: &'static str,
        repo: &dyn EntityRepository,
        query: &str,
        suggested: &SuggestedEntity,
        schema: &DataDictionary,
    ) -> SearchResult {
        if query.trim().is_empty() {
            return SearchResult::empty();
        }
        let Some(hits) = text_hits(searcher, repo, query, self.top_k, self.threshold).await else {
            return SearchResult::empty();
        };

        let mut matched = Vec::new();
        let mut undecided = Vec::new();
        for (entity, score) in hits {
            match self.chain.evaluate(suggested, &entity, schema) {
                MatchResult::Match => matched.push(ScoredCandidate::new(entity, score)),
                MatchResult::Inconclusive if self.pool_inconclusive => {
                    undecided.push(ScoredCandidate::new(entity, score))
                }
                _ => {}
            }
        }

        debug!(
            searcher,
            entity = %suggested.name,
            matched = matched.len(),
            undecided = undecided.len(),
            "Filtered text hits"
        );

        let mut result = SearchResult::from_unique(matched);
        result.candidates.extend(undecided);
        result
    }
}

/// Normalized-name equality over text hits ("Dr. Watson" ~ "Watson").
pub struct NormalizedNameSearcher {
    repo: Arc<dyn EntityRepository>,
    filter: ChainFilter,
}

impl NormalizedNameSearcher {
    pub fn new(repo: Arc<dyn EntityRepository>, top_k: usize) -> Self {
        Self {
            repo,
            filter: ChainFilter {
                chain: StrategyChain::new(vec![
                    Arc::new(LabelCompatibilityMatch),
                    Arc::new(NormalizedNameMatch),
                ]),
                top_k,
                threshold: 0.0,
                pool_inconclusive: false,
            },
        }
    }
}

#[async_trait]
impl CandidateSearcher for NormalizedNameSearcher {
    fn name(&self) -> &'static str {
        "normalized_name"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::HeuristicMatch
    }

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult {
        let query = normalize_name(&suggested.name);
        self.filter
            .search(self.name(), self.repo.as_ref(), &query, suggested, schema)
            .await
    }
}

/// Edit-distance matching over text hits ("Jon Smith" ~ "John Smith").
pub struct FuzzyNameSearcher {
    repo: Arc<dyn EntityRepository>,
    filter: ChainFilter,
}

impl FuzzyNameSearcher {
    pub fn new(repo: Arc<dyn EntityRepository>, config: &ResolutionConfig) -> Self {
        Self {
            repo,
            filter: ChainFilter {
                chain: StrategyChain::new(vec![
                    Arc::new(LabelCompatibilityMatch),
                    Arc::new(FuzzyNameMatch::new(
                        config.fuzzy_max_distance_ratio,
                        config.fuzzy_min_length,
                    )),
                ]),
                top_k: config.text_top_k,
                threshold: 0.0,
                pool_inconclusive: false,
            },
        }
    }
}

#[async_trait]
impl CandidateSearcher for FuzzyNameSearcher {
    fn name(&self) -> &'static str {
        "fuzzy_name"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::HeuristicMatch
    }

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult {
        let query = normalize_name(&suggested.name);
        self.filter
            .search(self.name(), self.repo.as_ref(), &query, suggested, schema)
            .await
    }
}

/// Free-text search on name and summary through the full name chain.
///
/// Hits the chain cannot decide on are still pooled as candidates for the
/// arbiter.
pub struct TextSearcher {
    repo: Arc<dyn EntityRepository>,
    filter: ChainFilter,
}

impl TextSearcher {
    pub fn new(repo: Arc<dyn EntityRepository>, config: &ResolutionConfig) -> Self {
        let strategies: Vec<Arc<dyn MatchStrategy>> = vec![
            Arc::new(LabelCompatibilityMatch),
            Arc::new(ExactNameMatch),
            Arc::new(NormalizedNameMatch),
            Arc::new(FuzzyNameMatch::new(
                config.fuzzy_max_distance_ratio,
                config.fuzzy_min_length,
            )),
        ];
        Self {
            repo,
            filter: ChainFilter {
                chain: StrategyChain::new(strategies),
                top_k: config.text_top_k,
                threshold: config.text_threshold,
                pool_inconclusive: true,
            },
        }
    }
}

#[async_trait]
impl CandidateSearcher for TextSearcher {
    fn name(&self) -> &'static str {
        "text"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::HeuristicMatch
    }

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult {
        let query = suggested.name.trim();
        self.filter
            .search(self.name(), self.repo.as_ref(), query, suggested, schema)
            .await
    }
}

async fn text_hits(
    searcher: &'static str,
    repo: &dyn EntityRepository,
    query: &str,
    top_k: usize,
    threshold: f64,
) -> Option<Vec<Scored<NamedEntityData>>> {
    match repo.text_search(query, &[], top_k, threshold).await {
        Ok(hits) => Some(hits),
        Err(e) => {
            warn!(searcher, query = %query, error = %e, "Text search failed");
            None
        }
    }
}
