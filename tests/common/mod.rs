//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use dice::error::{LangbaseError, LangbaseResult};
use dice::langbase::{Embedder, LlmClient, PipeRequest};
use dice::schema::{DataDictionary, TypeSpec};

/// LLM returning queued replies per pipe name and recording every request.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<BTreeMap<String, VecDeque<LangbaseResult<String>>>>,
    requests: Mutex<Vec<PipeRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, pipe: &str, completion: &str) -> Self {
        self.push(pipe, Ok(completion.to_string()));
        self
    }

    pub fn fail(self, pipe: &str) -> Self {
        self.push(
            pipe,
            Err(LangbaseError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            }),
        );
        self
    }

    fn push(&self, pipe: &str, reply: LangbaseResult<String>) {
        self.replies
            .lock()
            .unwrap()
            .entry(pipe.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Requests sent to `pipe`, in order.
    pub fn requests_to(&self, pipe: &str) -> Vec<PipeRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == pipe)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: PipeRequest) -> LangbaseResult<String> {
        let pipe = request.name.clone();
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .get_mut(&pipe)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(LangbaseError::InvalidResponse {
                    message: format!("no scripted reply for {}", pipe),
                })
            })
    }
}

const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: texts with the same word set embed identically.
pub struct FakeEmbedder;

impl FakeEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> LangbaseResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Person > Detective, a reference-only Place, and a Work that may not be
/// created.
pub fn detective_schema() -> DataDictionary {
    DataDictionary::builder()
        .add_type(TypeSpec::new("NamedEntity"))
        .add_type(TypeSpec::new("Person").with_parents(["NamedEntity"]))
        .add_type(TypeSpec::new("Detective").with_parents(["Person"]))
        .add_type(TypeSpec::new("Place").with_parents(["NamedEntity"]).as_reference_only())
        .add_type(TypeSpec::new("Work").with_parents(["NamedEntity"]).forbid_creation())
        .build()
        .expect("valid schema")
}
