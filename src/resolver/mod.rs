//! Entity resolution: decide, per suggested entity, whether it is new, an
//! existing entity, a reference to a reference-only entity, or vetoed.
//!
//! [`EscalatingEntityResolver`] tries searchers cheapest first and stops at
//! the first confident one. Candidates from inconclusive searchers are
//! pooled and, when an arbiter is configured, handed to it once all
//! searchers are exhausted. Whatever remains unmatched goes through the
//! creation policy of the schema.

mod bakeoff;

pub use bakeoff::{parse_selection, parse_verification, CandidateArbiter, LlmCandidateBakeoff};

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ResolutionConfig;
use crate::langbase::LlmClient;
use crate::model::{EntityResolution, NamedEntityData, ResolutionLevel, Resolutions, SuggestedEntity};
use crate::schema::DataDictionary;
use crate::search::{default_candidate_searchers, AgenticSearcher, CandidateSearcher, ScoredCandidate};
use crate::storage::EntityRepository;

/// Resolves a batch of suggestions taken from the given chunks.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Items are resolved independently; the result keeps input order.
    async fn resolve(
        &self,
        suggested: Vec<SuggestedEntity>,
        chunk_ids: BTreeSet<String>,
        source_text: Option<&str>,
        schema: &DataDictionary,
    ) -> Resolutions<EntityResolution>;
}

/// Builds a resolver reading a particular repository, so a pipeline can
/// point resolution at its per-batch session.
pub trait ResolverFactory: Send + Sync {
    fn resolver_for(&self, repo: Arc<dyn EntityRepository>) -> Arc<dyn EntityResolver>;
}

/// Searchers in order, then optional arbitration, then the creation policy.
pub struct EscalatingEntityResolver {
    searchers: Vec<Arc<dyn CandidateSearcher>>,
    arbiter: Option<Arc<dyn CandidateArbiter>>,
    heuristic_only: bool,
}

impl EscalatingEntityResolver {
    pub fn new(
        searchers: Vec<Arc<dyn CandidateSearcher>>,
        arbiter: Option<Arc<dyn CandidateArbiter>>,
        config: &ResolutionConfig,
    ) -> Self {
        Self {
            searchers,
            arbiter,
            heuristic_only: config.heuristic_only,
        }
    }

    /// Never consults an LLM; pooled candidates are dropped.
    pub fn heuristic_only(searchers: Vec<Arc<dyn CandidateSearcher>>) -> Self {
        Self {
            searchers,
            arbiter: None,
            heuristic_only: true,
        }
    }

    /// Searcher names in escalation order.
    pub fn searcher_names(&self) -> Vec<&'static str> {
        self.searchers.iter().map(|s| s.name()).collect()
    }

    /// Resolve a single suggestion.
    pub async fn resolve_one(
        &self,
        suggested: SuggestedEntity,
        source_text: Option<&str>,
        schema: &DataDictionary,
    ) -> EntityResolution {
        let mut pool: Vec<ScoredCandidate> = Vec::new();

        for searcher in &self.searchers {
            let result = searcher.search(&suggested, schema).await;
            if let Some(entity) = result.confident {
                debug!(
                    entity = %suggested.name,
                    searcher = searcher.name(),
                    matched = %entity.id,
                    "Confident match"
                );
                return matched(suggested, entity, searcher.level(), schema);
            }
            pool_candidates(&mut pool, result.candidates);
        }

        if pool.is_empty() {
            debug!(entity = %suggested.name, "No candidates");
            return creation_policy(suggested, schema);
        }

        let arbiter = match (&self.arbiter, self.heuristic_only) {
            (Some(arbiter), false) => arbiter,
            _ => {
                debug!(entity = %suggested.name, candidates = pool.len(), "Candidates left unarbitrated");
                return creation_policy(suggested, schema);
            }
        };

        let level = if pool.len() == 1 {
            ResolutionLevel::LlmVerification
        } else {
            ResolutionLevel::LlmBakeoff
        };
        match arbiter.select_best_match(&suggested, &pool, source_text).await {
            // only accept a pick that came from the pool
            Some(pick) if pool.iter().any(|c| c.entity.id == pick.id) => {
                let stored = pool
                    .into_iter()
                    .find(|c| c.entity.id == pick.id)
                    .map(|c| c.entity)
                    .unwrap_or(pick);
                matched(suggested, stored, level, schema)
            }
            _ => creation_policy(suggested, schema),
        }
    }
}

#[async_trait]
impl EntityResolver for EscalatingEntityResolver {
    async fn resolve(
        &self,
        suggested: Vec<SuggestedEntity>,
        chunk_ids: BTreeSet<String>,
        source_text: Option<&str>,
        schema: &DataDictionary,
    ) -> Resolutions<EntityResolution> {
        let count = suggested.len();
        let resolutions = join_all(
            suggested
                .into_iter()
                .map(|s| self.resolve_one(s, source_text, schema)),
        )
        .await;

        for resolution in &resolutions {
            debug!(
                entity = %resolution.suggested().name,
                outcome = resolution.kind(),
                level = %resolution.level(),
                "Resolved entity"
            );
        }

        let resolutions = Resolutions::new(chunk_ids, resolutions);
        info!(
            chunks = resolutions.chunk_ids.len(),
            entities = count,
            levels = %resolutions.level_counts(),
            "Entity resolution complete"
        );
        resolutions
    }
}

/// Builds [`EscalatingEntityResolver`]s with the default searchers, plus the
/// agentic searcher and an arbiter when configured.
#[derive(Clone)]
pub struct EscalatingResolverFactory {
    config: ResolutionConfig,
    arbiter: Option<Arc<dyn CandidateArbiter>>,
    agentic: Option<(Arc<dyn LlmClient>, String)>,
}

impl EscalatingResolverFactory {
    pub fn new(config: ResolutionConfig) -> Self {
        Self {
            config,
            arbiter: None,
            agentic: None,
        }
    }

    pub fn with_arbiter(mut self, arbiter: Arc<dyn CandidateArbiter>) -> Self {
        self.arbiter = Some(arbiter);
        self
    }

    /// Append an [`AgenticSearcher`] after the default searchers.
    pub fn with_agentic(mut self, llm: Arc<dyn LlmClient>, pipe_name: impl Into<String>) -> Self {
        self.agentic = Some((llm, pipe_name.into()));
        self
    }

    pub fn build(&self, repo: Arc<dyn EntityRepository>) -> EscalatingEntityResolver {
        let mut searchers = default_candidate_searchers(repo.clone(), &self.config);
        if !self.config.heuristic_only {
            if let Some((llm, pipe)) = &self.agentic {
                searchers.push(Arc::new(AgenticSearcher::new(
                    repo,
                    llm.clone(),
                    pipe.clone(),
                    &self.config,
                )));
            }
        }
        EscalatingEntityResolver::new(searchers, self.arbiter.clone(), &self.config)
    }
}

impl ResolverFactory for EscalatingResolverFactory {
    fn resolver_for(&self, repo: Arc<dyn EntityRepository>) -> Arc<dyn EntityResolver> {
        Arc::new(self.build(repo))
    }
}

fn matched(
    suggested: SuggestedEntity,
    existing: NamedEntityData,
    level: ResolutionLevel,
    schema: &DataDictionary,
) -> EntityResolution {
    if schema.is_reference_only(&existing.labels) {
        EntityResolution::reference_only(suggested, existing, level)
    } else {
        EntityResolution::existing(suggested, existing, level)
    }
}

fn creation_policy(suggested: SuggestedEntity, schema: &DataDictionary) -> EntityResolution {
    if schema.creation_permitted(&suggested.labels) {
        EntityResolution::new_entity(suggested)
    } else {
        debug!(entity = %suggested.name, labels = ?suggested.labels, "Creation not permitted");
        EntityResolution::vetoed(suggested)
    }
}

/// Add candidates, keeping one entry per id at its best score.
fn pool_candidates(pool: &mut Vec<ScoredCandidate>, incoming: Vec<ScoredCandidate>) {
    for candidate in incoming {
        match pool.iter_mut().find(|c| c.entity.id == candidate.entity.id) {
            Some(existing) if existing.score < candidate.score => existing.score = candidate.score,
            Some(_) => {}
            None => pool.push(candidate),
        }
    }
}
