use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::PipeConfig;
use crate::prompts::{
    AGENTIC_SEARCH_PROMPT, ENTITY_BAKEOFF_PROMPT, ENTITY_VERIFICATION_PROMPT, EXTRACTION_PROMPT,
    PROPOSITION_CLASSIFICATION_PROMPT,
};

/// Message in a Langbase conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Request to run a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name (required by Langbase API)
    pub name: String,
    pub messages: Vec<Message>,
    /// Disable streaming (default: false for non-streaming response)
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, String>>,
}

/// Response from a Langbase pipe
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    pub raw: Option<RawResponse>,
}

/// Raw model response details
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl PipeRequest {
    /// Create a new pipe request with name and messages
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
            variables: None,
        }
    }

    /// Add a single variable
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Text of the last user message, if any
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// One of the pipes resolution and revision call, with the system prompt
/// it is created from.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeDefinition {
    pub name: String,
    pub description: &'static str,
    pub prompt: &'static str,
}

impl PipeDefinition {
    /// Model every DICE pipe runs on.
    pub const MODEL: &'static str = "openai:gpt-4o-mini";
    pub const MAX_TOKENS: u32 = 2000;

    /// The five pipes, named as configured.
    pub fn all(pipes: &PipeConfig) -> Vec<Self> {
        let define = |name: &String, description, prompt| Self {
            name: name.clone(),
            description,
            prompt,
        };
        vec![
            define(&pipes.extraction, "Entity and proposition extraction", EXTRACTION_PROMPT),
            define(
                &pipes.verification,
                "Single candidate entity verification",
                ENTITY_VERIFICATION_PROMPT,
            ),
            define(&pipes.bakeoff, "Multi candidate entity bakeoff", ENTITY_BAKEOFF_PROMPT),
            define(&pipes.agentic_search, "Tool-driven entity search", AGENTIC_SEARCH_PROMPT),
            define(
                &pipes.classification,
                "Proposition relation classification",
                PROPOSITION_CLASSIFICATION_PROMPT,
            ),
        ]
    }
}

/// Body of `POST /v1/pipes`.
///
/// Pipes are always upserted with JSON output at temperature zero; the
/// completions are parsed, not read.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeRequest {
    pub name: String,
    pub description: String,
    pub model: String,
    pub upsert: bool,
    pub json: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

impl From<&PipeDefinition> for CreatePipeRequest {
    fn from(definition: &PipeDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            description: definition.description.to_string(),
            model: PipeDefinition::MODEL.to_string(),
            upsert: true,
            json: true,
            temperature: 0.0,
            max_tokens: PipeDefinition::MAX_TOKENS,
            messages: vec![Message::system(definition.prompt)],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipeResponse {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub url: String,
}

/// Request body for the embed endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub chunks: Vec<String>,
    #[serde(rename = "embeddingModel")]
    pub embedding_model: String,
}
