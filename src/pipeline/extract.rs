use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::langbase::{complete_with_timeout, parse_structured, LlmClient, Message, PipeRequest};
use crate::model::{EntityMention, Proposition, SuggestedEntity, SuggestedRelationship};
use crate::prompts::EXTRACTION_PROMPT;
use crate::schema::DataDictionary;

/// A unit of input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Tenant or session scope propositions are stored under.
    pub context_id: String,
    pub text: String,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        context_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            text: text.into(),
        }
    }
}

fn default_confidence() -> f64 {
    0.7
}

fn default_decay() -> f64 {
    0.1
}

/// A claim proposed by the extractor, before it has a context or an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedProposition {
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_decay")]
    pub decay: f64,
    #[serde(default)]
    pub mentions: Vec<EntityMention>,
}

impl SuggestedProposition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: default_confidence(),
            decay: default_decay(),
            mentions: Vec::new(),
        }
    }

    pub fn with_mentions(mut self, mentions: Vec<EntityMention>) -> Self {
        self.mentions = mentions;
        self
    }

    /// A fresh proposition scoped to the chunk's context and grounded in it.
    pub fn into_proposition(self, chunk: &Chunk) -> Proposition {
        Proposition::new(&chunk.context_id, self.text.trim(), self.confidence, self.decay)
            .with_mentions(self.mentions)
            .with_grounding([chunk.id.clone()])
    }
}

/// Everything the extractor proposed for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default)]
    pub entities: Vec<SuggestedEntity>,
    #[serde(default)]
    pub relationships: Vec<SuggestedRelationship>,
    #[serde(default)]
    pub propositions: Vec<SuggestedProposition>,
}

/// Produces candidate entities, relationships and propositions from a chunk.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, chunk: &Chunk, schema: &DataDictionary) -> PipelineResult<Suggestions>;
}

/// Extraction through a Langbase pipe using [`EXTRACTION_PROMPT`].
pub struct LangbaseExtractor {
    llm: Arc<dyn LlmClient>,
    pipe_name: String,
    timeout_ms: u64,
}

impl LangbaseExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, pipe_name: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            llm,
            pipe_name: pipe_name.into(),
            timeout_ms,
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, config: &Config) -> Self {
        Self::new(llm, config.pipes.extraction.clone(), config.request.timeout_ms)
    }

    fn prompt(chunk: &Chunk, schema: &DataDictionary) -> String {
        let types = schema.type_names();
        if types.is_empty() {
            format!("Text:\n{}", chunk.text)
        } else {
            format!("Schema types: {}\n\nText:\n{}", types.join(", "), chunk.text)
        }
    }
}

#[async_trait]
impl TextExtractor for LangbaseExtractor {
    async fn extract(&self, chunk: &Chunk, schema: &DataDictionary) -> PipelineResult<Suggestions> {
        let request = PipeRequest::new(
            &self.pipe_name,
            vec![
                Message::system(EXTRACTION_PROMPT),
                Message::user(Self::prompt(chunk, schema)),
            ],
        );
        let extraction_error = |message: String| PipelineError::Extraction {
            chunk_id: chunk.id.clone(),
            message,
        };

        let completion = complete_with_timeout(self.llm.as_ref(), request, self.timeout_ms)
            .await
            .map_err(|e| extraction_error(e.to_string()))?;
        let mut suggestions: Suggestions =
            parse_structured(&completion).map_err(|e| extraction_error(e.to_string()))?;

        suggestions.entities.retain(|e| !e.name.trim().is_empty());
        for entity in &mut suggestions.entities {
            entity.chunk_id = Some(chunk.id.clone());
        }
        suggestions.propositions.retain(|p| !p.text.trim().is_empty());

        debug!(
            chunk = %chunk.id,
            entities = suggestions.entities.len(),
            relationships = suggestions.relationships.len(),
            propositions = suggestions.propositions.len(),
            "Extracted chunk"
        );
        Ok(suggestions)
    }
}
