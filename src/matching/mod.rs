//! Heuristic match strategies.
//!
//! A strategy compares one suggestion with one stored candidate and returns
//! a three-valued verdict. Strategies are pure: no I/O and no state, so the
//! same inputs always yield the same verdict.

mod strategies;
mod text;

pub use strategies::{ExactNameMatch, FuzzyNameMatch, LabelCompatibilityMatch, NormalizedNameMatch};
pub use strsim::levenshtein;
pub use text::normalize_name;

use std::sync::Arc;

use crate::config::ResolutionConfig;
use crate::model::{NamedEntityData, SuggestedEntity};
use crate::schema::DataDictionary;

/// Verdict of one strategy for one (suggestion, candidate) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Same entity.
    Match,
    /// Definitely not the same entity.
    NoMatch,
    /// This strategy cannot tell.
    Inconclusive,
}

impl MatchResult {
    pub fn is_decisive(self) -> bool {
        !matches!(self, MatchResult::Inconclusive)
    }
}

/// A pure comparison between a suggestion and a stored entity.
pub trait MatchStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        suggested: &SuggestedEntity,
        candidate: &NamedEntityData,
        schema: &DataDictionary,
    ) -> MatchResult;
}

/// Ordered strategies; the first decisive verdict wins.
#[derive(Clone)]
pub struct StrategyChain {
    strategies: Vec<Arc<dyn MatchStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run strategies in order, returning the first Match or NoMatch.
    ///
    /// Returns Inconclusive if every strategy is inconclusive or the chain
    /// is empty.
    pub fn evaluate(
        &self,
        suggested: &SuggestedEntity,
        candidate: &NamedEntityData,
        schema: &DataDictionary,
    ) -> MatchResult {
        for strategy in &self.strategies {
            let verdict = strategy.evaluate(suggested, candidate, schema);
            if verdict.is_decisive() {
                tracing::trace!(
                    strategy = strategy.name(),
                    suggested = %suggested.name,
                    candidate = %candidate.id,
                    verdict = ?verdict,
                    "Strategy verdict"
                );
                return verdict;
            }
        }
        MatchResult::Inconclusive
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyChain")
            .field("strategies", &self.names())
            .finish()
    }
}

/// Default ordering: the veto first, then names from strict to loose.
pub fn default_matching_strategies(config: &ResolutionConfig) -> StrategyChain {
    StrategyChain::new(vec![
        Arc::new(LabelCompatibilityMatch),
        Arc::new(ExactNameMatch),
        Arc::new(NormalizedNameMatch),
        Arc::new(FuzzyNameMatch::new(
            config.fuzzy_max_distance_ratio,
            config.fuzzy_min_length,
        )),
    ])
}
