//! Proposition revision: fold each new proposition into memory as new,
//! merged, reinforced or contradicting.
//!
//! Per proposition: gather ACTIVE candidates from the same context (vector
//! search plus exact canonical text), merge straight away when the best
//! candidate clears the auto-merge threshold, drop candidates that share no
//! entity with the new proposition, then let the LLM classify what is left.
//! LLM trouble of any kind leaves the proposition New.

mod classify;

pub use classify::{decide, Classification, Decision, PropositionRelation};

use futures::future::join_all;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RevisionConfig;
use crate::error::StorageResult;
use crate::langbase::{complete_with_timeout, LlmClient, Message, PipeRequest};
use crate::model::Proposition;
use crate::prompts::PROPOSITION_CLASSIFICATION_PROMPT;
use crate::storage::{PropositionRepository, Scored};

/// Outcome of revising one proposition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevisionResult {
    /// Stored as a fresh proposition. `generalizes` lists stored
    /// propositions the classifier judged broader than this one.
    New {
        proposition: Proposition,
        generalizes: Vec<String>,
    },
    /// Absorbed into an identical stored proposition.
    Merged {
        original: Proposition,
        revised: Proposition,
    },
    /// Strengthened a similar stored proposition.
    Reinforced {
        original: Proposition,
        revised: Proposition,
    },
    /// Stored, and the contradicted original was weakened.
    Contradicted {
        original: Proposition,
        revised: Proposition,
        new: Proposition,
    },
}

impl RevisionResult {
    /// The proposition that now carries this claim in the store.
    pub fn proposition(&self) -> &Proposition {
        match self {
            RevisionResult::New { proposition, .. } => proposition,
            RevisionResult::Merged { revised, .. } | RevisionResult::Reinforced { revised, .. } => {
                revised
            }
            RevisionResult::Contradicted { new, .. } => new,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RevisionResult::New { .. } => "new",
            RevisionResult::Merged { .. } => "merged",
            RevisionResult::Reinforced { .. } => "reinforced",
            RevisionResult::Contradicted { .. } => "contradicted",
        }
    }
}

/// Per-outcome tallies for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevisionCounts {
    pub new: usize,
    pub merged: usize,
    pub reinforced: usize,
    pub contradicted: usize,
}

impl RevisionCounts {
    pub fn of(results: &[RevisionResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result {
                RevisionResult::New { .. } => counts.new += 1,
                RevisionResult::Merged { .. } => counts.merged += 1,
                RevisionResult::Reinforced { .. } => counts.reinforced += 1,
                RevisionResult::Contradicted { .. } => counts.contradicted += 1,
            }
        }
        counts
    }
}

/// Where a proposition stands after retrieval and the cheap checks.
enum Plan {
    Decided(Decision),
    Classify(Vec<Scored<Proposition>>),
}

/// Revises propositions against a [`PropositionRepository`].
pub struct PropositionReviser {
    repo: Arc<dyn PropositionRepository>,
    llm: Option<(Arc<dyn LlmClient>, String)>,
    config: RevisionConfig,
}

impl PropositionReviser {
    /// A reviser without a classifier: only the canonical-text and
    /// auto-merge paths can match.
    pub fn new(repo: Arc<dyn PropositionRepository>, config: RevisionConfig) -> Self {
        Self {
            repo,
            llm: None,
            config,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>, pipe_name: impl Into<String>) -> Self {
        self.llm = Some((llm, pipe_name.into()));
        self
    }

    /// Revise one proposition and persist the outcome.
    pub async fn revise(&self, proposition: Proposition) -> StorageResult<RevisionResult> {
        let decision = match self.plan(&proposition).await {
            Plan::Decided(decision) => decision,
            Plan::Classify(candidates) => self.classify_one(&proposition, &candidates).await,
        };
        let result = self.apply(proposition, decision).await?;
        debug!(outcome = result.kind(), id = %result.proposition().id, "Revised proposition");
        Ok(result)
    }

    /// Revise a batch, classifying every undecided item in one LLM call.
    ///
    /// Results come back in input order. Outcomes are persisted in input
    /// order too, each against a fresh read of its target.
    pub async fn revise_all(&self, propositions: Vec<Proposition>) -> StorageResult<Vec<RevisionResult>> {
        if propositions.is_empty() {
            return Ok(Vec::new());
        }

        let plans = join_all(propositions.iter().map(|p| self.plan(p))).await;

        let mut decisions: BTreeMap<usize, Decision> = BTreeMap::new();
        let mut pending: Vec<(usize, &Proposition, Vec<Scored<Proposition>>)> = Vec::new();
        for (index, (proposition, plan)) in propositions.iter().zip(plans).enumerate() {
            match plan {
                Plan::Decided(decision) => {
                    decisions.insert(index, decision);
                }
                Plan::Classify(candidates) => pending.push((index, proposition, candidates)),
            }
        }

        if pending.len() == 1 {
            let (index, proposition, candidates) = &pending[0];
            decisions.insert(*index, self.classify_one(proposition, candidates).await);
        } else if !pending.is_empty() {
            let mut batch = self.classify_batch(&pending).await;
            for (index, proposition, candidates) in &pending {
                let decision = match batch.remove(index) {
                    Some(classifications) => decide(&classifications, &candidate_ids(candidates)),
                    None => {
                        debug!(index, "Missing from batch classification, retrying alone");
                        self.classify_one(proposition, candidates).await
                    }
                };
                decisions.insert(*index, decision);
            }
        }

        let mut results = Vec::with_capacity(propositions.len());
        for (index, proposition) in propositions.into_iter().enumerate() {
            let decision = decisions
                .remove(&index)
                .unwrap_or(Decision::New { generalizes: Vec::new() });
            results.push(self.apply(proposition, decision).await?);
        }

        let counts = RevisionCounts::of(&results);
        info!(
            propositions = results.len(),
            new = counts.new,
            merged = counts.merged,
            reinforced = counts.reinforced,
            contradicted = counts.contradicted,
            "Proposition revision complete"
        );
        Ok(results)
    }

    async fn plan(&self, proposition: &Proposition) -> Plan {
        let candidates = self.candidates(proposition).await;
        let Some((top, top_score)) = candidates.first() else {
            return Plan::Decided(Decision::New { generalizes: Vec::new() });
        };

        if *top_score >= self.config.auto_merge_threshold {
            debug!(candidate = %top.id, score = top_score, "Auto-merge");
            return Plan::Decided(Decision::Merge(top.id.clone()));
        }

        let overlapping: Vec<Scored<Proposition>> = candidates
            .into_iter()
            .filter(|(candidate, _)| shares_entities(proposition, candidate))
            .collect();
        if overlapping.is_empty() {
            return Plan::Decided(Decision::New { generalizes: Vec::new() });
        }
        Plan::Classify(overlapping)
    }

    /// Vector hits plus exact canonical-text hits (scored 1.0), ACTIVE only,
    /// one per id, best first.
    async fn candidates(&self, proposition: &Proposition) -> Vec<Scored<Proposition>> {
        let mut by_id: BTreeMap<String, Scored<Proposition>> = BTreeMap::new();
        let mut add = |candidate: Proposition, score: f64| {
            if candidate.id == proposition.id || !candidate.is_active() {
                return;
            }
            match by_id.get(&candidate.id) {
                Some((_, existing)) if *existing >= score => {}
                _ => {
                    by_id.insert(candidate.id.clone(), (candidate, score));
                }
            }
        };

        match self
            .repo
            .vector_search(
                &proposition.text,
                &proposition.context_id,
                self.config.top_k,
                self.config.min_similarity,
            )
            .await
        {
            Ok(hits) => hits.into_iter().for_each(|(p, score)| add(p, score)),
            Err(e) => warn!(error = %e, "Proposition vector search failed"),
        }

        match self
            .repo
            .find_by_canonical_text(&proposition.context_id, &proposition.canonical_text())
            .await
        {
            Ok(exact) => exact.into_iter().for_each(|p| add(p, 1.0)),
            Err(e) => warn!(error = %e, "Canonical text lookup failed"),
        }

        let mut candidates: Vec<Scored<Proposition>> = by_id.into_values().collect();
        candidates.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates
    }

    async fn classify_one(
        &self,
        proposition: &Proposition,
        candidates: &[Scored<Proposition>],
    ) -> Decision {
        let prompt = classify::single_prompt(proposition, candidates);
        let classifications = self
            .complete(prompt)
            .await
            .and_then(|completion| classify::parse_single(&completion));
        match classifications {
            Some(classifications) => decide(&classifications, &candidate_ids(candidates)),
            None => Decision::New { generalizes: Vec::new() },
        }
    }

    async fn classify_batch(
        &self,
        pending: &[(usize, &Proposition, Vec<Scored<Proposition>>)],
    ) -> BTreeMap<usize, Vec<Classification>> {
        let items: Vec<(usize, &Proposition, &[Scored<Proposition>])> = pending
            .iter()
            .map(|(index, proposition, candidates)| (*index, *proposition, candidates.as_slice()))
            .collect();
        match self.complete(classify::batch_prompt(&items)).await {
            Some(completion) => classify::parse_batch(&completion),
            None => BTreeMap::new(),
        }
    }

    async fn complete(&self, prompt: String) -> Option<String> {
        let (llm, pipe) = self.llm.as_ref()?;
        let request = PipeRequest::new(
            pipe.as_str(),
            vec![
                Message::system(PROPOSITION_CLASSIFICATION_PROMPT),
                Message::user(prompt),
            ],
        );
        match complete_with_timeout(llm.as_ref(), request, self.config.llm_timeout_ms).await {
            Ok(completion) => Some(completion),
            Err(e) => {
                warn!(pipe = %pipe, error = %e, "Classification call failed");
                None
            }
        }
    }

    /// Persist a decision, re-reading the target so earlier outcomes in the
    /// same batch are not overwritten. A target that is no longer ACTIVE
    /// turns the decision into New.
    async fn apply(&self, proposition: Proposition, decision: Decision) -> StorageResult<RevisionResult> {
        let target_id = match &decision {
            Decision::New { .. } => None,
            Decision::Merge(id) | Decision::Reinforce(id) | Decision::Contradict(id) => Some(id.clone()),
        };
        let original = match target_id {
            Some(id) => self
                .repo
                .find_by_id(&id)
                .await?
                .filter(Proposition::is_active),
            None => None,
        };

        match (decision, original) {
            (Decision::Merge(_), Some(original)) => {
                let revised = original.merged_with(&proposition);
                self.repo.update(&revised).await?;
                Ok(RevisionResult::Merged { original, revised })
            }
            (Decision::Reinforce(_), Some(original)) => {
                let revised = original.reinforced_with(&proposition);
                self.repo.update(&revised).await?;
                Ok(RevisionResult::Reinforced { original, revised })
            }
            (Decision::Contradict(_), Some(original)) => {
                let revised = original.contradicted();
                self.repo.update(&revised).await?;
                self.repo.save(&proposition).await?;
                Ok(RevisionResult::Contradicted {
                    original,
                    revised,
                    new: proposition,
                })
            }
            (Decision::New { generalizes }, _) => {
                self.repo.save(&proposition).await?;
                Ok(RevisionResult::New {
                    proposition,
                    generalizes,
                })
            }
            (_, None) => {
                warn!(id = %proposition.id, "Revision target gone or no longer active, storing as new");
                self.repo.save(&proposition).await?;
                Ok(RevisionResult::New {
                    proposition,
                    generalizes: Vec::new(),
                })
            }
        }
    }
}

fn candidate_ids(candidates: &[Scored<Proposition>]) -> BTreeSet<&str> {
    candidates.iter().map(|(p, _)| p.id.as_str()).collect()
}

/// Entity-overlap pre-filter.
///
/// Always true when the new proposition has no mentions. Otherwise the two
/// must share a resolved entity id, or, when neither side has resolved
/// ids, a mention span (case-insensitive).
pub fn shares_entities(new: &Proposition, candidate: &Proposition) -> bool {
    if new.mentions.is_empty() {
        return true;
    }
    let new_ids = new.resolved_entity_ids();
    let candidate_ids = candidate.resolved_entity_ids();
    if new_ids.is_empty() && candidate_ids.is_empty() {
        let spans: BTreeSet<String> = new
            .mentions
            .iter()
            .map(|m| m.span.trim().to_lowercase())
            .collect();
        return candidate
            .mentions
            .iter()
            .any(|m| spans.contains(&m.span.trim().to_lowercase()));
    }
    !new_ids.is_disjoint(&candidate_ids)
}
