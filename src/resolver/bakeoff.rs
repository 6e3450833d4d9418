//! LLM arbitration over a pooled candidate set.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{PipeConfig, ResolutionConfig};
use crate::langbase::{
    complete_with_timeout, extract_json_from_completion, LlmClient, Message, PipeRequest,
};
use crate::model::{NamedEntityData, SuggestedEntity};
use crate::prompts::{ENTITY_BAKEOFF_PROMPT, ENTITY_VERIFICATION_PROMPT};
use crate::search::ScoredCandidate;

/// Picks which candidate, if any, a suggestion refers to.
///
/// Implementations fail closed: any doubt or error yields `None`.
#[async_trait]
pub trait CandidateArbiter: Send + Sync {
    async fn select_best_match(
        &self,
        suggested: &SuggestedEntity,
        candidates: &[ScoredCandidate],
        source_text: Option<&str>,
    ) -> Option<NamedEntityData>;
}

/// One candidate: a yes/no verification call. Several: a numbered bakeoff.
///
/// Calls are bounded by a timeout and never retried here.
pub struct LlmCandidateBakeoff {
    llm: Arc<dyn LlmClient>,
    verification_pipe: String,
    bakeoff_pipe: String,
    timeout_ms: u64,
}

impl LlmCandidateBakeoff {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        verification_pipe: impl Into<String>,
        bakeoff_pipe: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            llm,
            verification_pipe: verification_pipe.into(),
            bakeoff_pipe: bakeoff_pipe.into(),
            timeout_ms,
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, pipes: &PipeConfig, config: &ResolutionConfig) -> Self {
        Self::new(
            llm,
            pipes.verification.clone(),
            pipes.bakeoff.clone(),
            config.llm_timeout_ms,
        )
    }

    async fn ask(&self, pipe: &str, system: &str, user: String) -> Option<String> {
        let request = PipeRequest::new(pipe, vec![Message::system(system), Message::user(user)]);
        match complete_with_timeout(self.llm.as_ref(), request, self.timeout_ms).await {
            Ok(completion) => Some(completion),
            Err(e) => {
                warn!(pipe = %pipe, error = %e, "Arbitration call failed");
                None
            }
        }
    }

    async fn verify(
        &self,
        suggested: &SuggestedEntity,
        candidate: &ScoredCandidate,
        source_text: Option<&str>,
    ) -> Option<NamedEntityData> {
        let prompt = format!(
            "NEW mention:\n{}{}\n\nEXISTING entity:\n{}",
            describe_suggested(suggested),
            source_context(source_text),
            describe_candidate(candidate)
        );
        let completion = self
            .ask(&self.verification_pipe, ENTITY_VERIFICATION_PROMPT, prompt)
            .await?;

        let verdict = parse_verification(&completion);
        debug!(entity = %suggested.name, candidate = %candidate.entity.id, verdict = ?verdict, "Verification");
        match verdict {
            Some(true) => Some(candidate.entity.clone()),
            _ => None,
        }
    }

    async fn bakeoff(
        &self,
        suggested: &SuggestedEntity,
        candidates: &[ScoredCandidate],
        source_text: Option<&str>,
    ) -> Option<NamedEntityData> {
        // numbered in input order so the ordinal maps straight back
        let listing: Vec<String> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, describe_candidate(c)))
            .collect();
        let prompt = format!(
            "NEW mention:\n{}{}\n\nEXISTING candidates:\n{}",
            describe_suggested(suggested),
            source_context(source_text),
            listing.join("\n")
        );
        let completion = self
            .ask(&self.bakeoff_pipe, ENTITY_BAKEOFF_PROMPT, prompt)
            .await?;

        let selection = parse_selection(&completion, candidates.len());
        debug!(entity = %suggested.name, candidates = candidates.len(), selection = ?selection, "Bakeoff");
        selection.map(|index| candidates[index].entity.clone())
    }
}

#[async_trait]
impl CandidateArbiter for LlmCandidateBakeoff {
    async fn select_best_match(
        &self,
        suggested: &SuggestedEntity,
        candidates: &[ScoredCandidate],
        source_text: Option<&str>,
    ) -> Option<NamedEntityData> {
        match candidates {
            [] => None,
            [only] => self.verify(suggested, only, source_text).await,
            _ => self.bakeoff(suggested, candidates, source_text).await,
        }
    }
}

fn describe_suggested(suggested: &SuggestedEntity) -> String {
    format!(
        "name: {} | type: {} | description: {}",
        suggested.name,
        suggested.labels.join(", "),
        suggested.summary
    )
}

fn describe_candidate(candidate: &ScoredCandidate) -> String {
    format!(
        "name: {} | type: {} | description: {} | score: {:.2}",
        candidate.entity.name,
        candidate.entity.labels.join(", "),
        candidate.entity.description,
        candidate.score
    )
}

fn source_context(source_text: Option<&str>) -> String {
    match source_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => format!("\n\nSource text:\n{}", text),
        None => String::new(),
    }
}

#[derive(Deserialize)]
struct VerificationReply {
    same_entity: bool,
}

#[derive(Deserialize)]
struct SelectionReply {
    #[serde(default)]
    selected: serde_json::Value,
}

/// `Some(true)` / `Some(false)` for a clear answer, `None` otherwise.
///
/// Accepts `{"same_entity": bool}` or a reply starting with yes/no.
pub fn parse_verification(completion: &str) -> Option<bool> {
    if let Ok(json) = extract_json_from_completion(completion) {
        if let Ok(reply) = serde_json::from_str::<VerificationReply>(json) {
            return Some(reply.same_entity);
        }
    }
    let answer = completion.trim().to_lowercase();
    if answer.starts_with("yes") || answer.starts_with("true") {
        Some(true)
    } else if answer.starts_with("no") || answer.starts_with("false") {
        Some(false)
    } else {
        None
    }
}

/// Zero-based index picked by a bakeoff reply over `count` candidates.
///
/// Accepts `{"selected": n | null}` with a 1-based `n`, a reply starting
/// with the ordinal (`"2 - reason"`), or one starting with "none". Anything
/// else, including out-of-range ordinals, is `None`.
pub fn parse_selection(completion: &str, count: usize) -> Option<usize> {
    if let Ok(json) = extract_json_from_completion(completion) {
        if let Ok(reply) = serde_json::from_str::<SelectionReply>(json) {
            let ordinal = match &reply.selected {
                serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
                serde_json::Value::String(s) => leading_ordinal(s),
                _ => None,
            };
            return ordinal.and_then(|n| to_index(n, count));
        }
    }

    let answer = completion.trim();
    if answer.to_lowercase().starts_with("none") {
        return None;
    }
    leading_ordinal(answer).and_then(|n| to_index(n, count))
}

fn leading_ordinal(text: &str) -> Option<usize> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn to_index(ordinal: usize, count: usize) -> Option<usize> {
    (1..=count).contains(&ordinal).then(|| ordinal - 1)
}
