use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CandidateSearcher, ScoredCandidate, SearchResult};
use crate::config::ResolutionConfig;
use crate::error::LangbaseResult;
use crate::langbase::{complete_with_timeout, parse_structured, LlmClient, Message, PipeRequest};
use crate::matching::LabelCompatibilityMatch;
use crate::model::{NamedEntityData, ResolutionLevel, SuggestedEntity};
use crate::prompts::AGENTIC_SEARCH_PROMPT;
use crate::schema::DataDictionary;
use crate::storage::{EntityRepository, Scored};

/// One step requested by the model.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
enum AgentAction {
    TextSearch {
        query: String,
    },
    VectorSearch {
        query: String,
    },
    Final {
        #[serde(default)]
        matched_id: Option<String>,
        #[serde(default)]
        reason: String,
    },
}

/// LLM-driven search: the model formulates text and vector queries against
/// the store, then names the match.
///
/// The pick is accepted only if the model saw it in its own results and it
/// is label-compatible. Any LLM failure ends the search with no result.
pub struct AgenticSearcher {
    repo: Arc<dyn EntityRepository>,
    llm: Arc<dyn LlmClient>,
    pipe_name: String,
    max_steps: usize,
    top_k: usize,
    timeout_ms: u64,
}

impl AgenticSearcher {
    pub fn new(
        repo: Arc<dyn EntityRepository>,
        llm: Arc<dyn LlmClient>,
        pipe_name: impl Into<String>,
        config: &ResolutionConfig,
    ) -> Self {
        Self {
            repo,
            llm,
            pipe_name: pipe_name.into(),
            max_steps: config.agentic_max_steps,
            top_k: config.text_top_k,
            timeout_ms: config.llm_timeout_ms,
        }
    }

    async fn next_action(&self, messages: &[Message]) -> LangbaseResult<(String, AgentAction)> {
        let request = PipeRequest::new(&self.pipe_name, messages.to_vec());
        let completion = complete_with_timeout(self.llm.as_ref(), request, self.timeout_ms).await?;
        let action = parse_structured(&completion)?;
        Ok((completion, action))
    }

    async fn run_tool(&self, action: &AgentAction) -> Vec<Scored<NamedEntityData>> {
        let result = match action {
            AgentAction::TextSearch { query } => {
                self.repo.text_search(query, &[], self.top_k, 0.0).await
            }
            AgentAction::VectorSearch { query } => {
                self.repo.vector_search(query, &[], self.top_k, 0.0).await
            }
            AgentAction::Final { .. } => return Vec::new(),
        };
        result.unwrap_or_else(|e| {
            warn!(searcher = "agentic", error = %e, "Tool call failed");
            Vec::new()
        })
    }
}

#[async_trait]
impl CandidateSearcher for AgenticSearcher {
    fn name(&self) -> &'static str {
        "agentic"
    }

    fn level(&self) -> ResolutionLevel {
        ResolutionLevel::LlmVerification
    }

    async fn search(&self, suggested: &SuggestedEntity, schema: &DataDictionary) -> SearchResult {
        let mut messages = vec![
            Message::system(AGENTIC_SEARCH_PROMPT),
            Message::user(format!(
                "NEW mention: {}\nYou may run at most {} searches.",
                suggested.embedding_text(),
                self.max_steps
            )),
        ];
        let mut seen: BTreeMap<String, ScoredCandidate> = BTreeMap::new();
        let mut searches = 0;

        loop {
            let (completion, action) = match self.next_action(&messages).await {
                Ok(step) => step,
                Err(e) => {
                    warn!(entity = %suggested.name, error = %e, "Agentic search abandoned");
                    return SearchResult::empty();
                }
            };

            if let AgentAction::Final { matched_id, reason } = &action {
                let matched_id = matched_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case("null"));
                debug!(entity = %suggested.name, matched = ?matched_id, reason = %reason, "Agentic search finished");
                return finish(suggested, schema, matched_id, seen);
            }

            if searches >= self.max_steps {
                debug!(entity = %suggested.name, searches, "Agentic search out of steps");
                return finish(suggested, schema, None, seen);
            }
            searches += 1;

            let hits = self.run_tool(&action).await;
            let mut report = String::from("Results:\n");
            if hits.is_empty() {
                report.push_str("(none)\n");
            }
            for (entity, score) in hits {
                report.push_str(&format!(
                    "- id: {} | name: {} | labels: {} | score: {:.2} | {}\n",
                    entity.id,
                    entity.name,
                    entity.labels.join(", "),
                    score,
                    entity.description
                ));
                let keep = seen
                    .get(&entity.id)
                    .map(|existing| existing.score < score)
                    .unwrap_or(true);
                if keep {
                    seen.insert(entity.id.clone(), ScoredCandidate::new(entity, score));
                }
            }
            messages.push(Message::assistant(completion));
            messages.push(Message::user(report));
        }
    }
}

fn finish(
    suggested: &SuggestedEntity,
    schema: &DataDictionary,
    matched_id: Option<&str>,
    seen: BTreeMap<String, ScoredCandidate>,
) -> SearchResult {
    let compatible: Vec<ScoredCandidate> = seen
        .into_values()
        .filter(|c| LabelCompatibilityMatch::compatible(&suggested.labels, &c.entity.labels, schema))
        .collect();

    if let Some(id) = matched_id {
        match compatible.iter().find(|c| c.entity.id == id) {
            Some(pick) => return SearchResult::confident(pick.entity.clone()),
            None => warn!(entity = %suggested.name, matched = %id, "Agent picked an id it never saw"),
        }
    }
    SearchResult::candidates(compatible)
}
