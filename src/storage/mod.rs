//! Storage layer for entities, relationships and propositions.
//!
//! The core only depends on [`EntityRepository`] and
//! [`PropositionRepository`]. Two implementations ship here: in-memory
//! stores for tests and single-process use, and a SQLite store.
//!
//! Both share the scoring helpers below so that text and vector search
//! behave identically whichever backend is configured.

mod memory;
mod sqlite;

#[cfg(test)]
#[path = "scoring_tests.rs"]
mod scoring_tests;

pub use memory::{InMemoryEntityStore, InMemoryPropositionStore};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::{LangbaseError, StorageError, StorageResult};
use crate::langbase::Embedder;
use crate::model::{NamedEntityData, Proposition, RelationshipInstance};
use crate::schema::normalize_label;

/// A search hit with its score in [0, 1].
pub type Scored<T> = (T, f64);

/// Read/write contract for entities and the relationships between them.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Get an entity by id.
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<NamedEntityData>>;

    /// Text search over names, aliases and descriptions.
    ///
    /// A query wrapped in double quotes is an exact phrase on the name.
    /// An empty `labels` filter admits every entity.
    async fn text_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>>;

    /// Embedding similarity search. Returns nothing when the store has no
    /// embedder.
    async fn vector_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>>;

    /// Insert or overwrite an entity.
    async fn save(&self, entity: &NamedEntityData) -> StorageResult<()>;

    /// Overwrite an existing entity; fails with `EntityNotFound` otherwise.
    async fn update(&self, entity: &NamedEntityData) -> StorageResult<()>;

    async fn delete(&self, id: &str) -> StorageResult<()>;

    async fn find_relationship(
        &self,
        source_id: &str,
        relationship_type: &str,
        target_id: &str,
    ) -> StorageResult<Option<RelationshipInstance>>;

    /// Insert or overwrite the edge keyed by (source, type, target).
    async fn save_relationship(&self, relationship: &RelationshipInstance) -> StorageResult<()>;
}

/// Read/write contract for propositions.
#[async_trait]
pub trait PropositionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Proposition>>;

    /// Similar ACTIVE propositions in one context, best first.
    async fn vector_search(
        &self,
        text: &str,
        context_id: &str,
        top_k: usize,
        min_similarity: f64,
    ) -> StorageResult<Vec<Scored<Proposition>>>;

    /// Propositions in `context_id` whose canonical text equals `canonical`,
    /// in any status.
    async fn find_by_canonical_text(
        &self,
        context_id: &str,
        canonical: &str,
    ) -> StorageResult<Vec<Proposition>>;

    /// Insert or overwrite a proposition.
    async fn save(&self, proposition: &Proposition) -> StorageResult<()>;

    /// Overwrite an existing proposition; fails with `PropositionNotFound`
    /// otherwise.
    async fn update(&self, proposition: &Proposition) -> StorageResult<()>;

    async fn delete(&self, id: &str) -> StorageResult<()>;
}

/// Score an entity against a text query.
///
/// Quoted queries: 1.0 when the name or an alias equals the phrase
/// case-insensitively, 0.9 when the name contains it, else 0.
/// Unquoted queries: the share of query tokens found in the name or
/// aliases, with tokens found only in the description counting half.
pub fn text_score(query: &str, entity: &NamedEntityData) -> f64 {
    let query = query.trim();

    if let Some(phrase) = quoted_phrase(query) {
        let phrase = phrase.to_lowercase();
        if phrase.is_empty() {
            return 0.0;
        }
        let name = entity.name.trim().to_lowercase();
        if name == phrase
            || entity
                .aliases()
                .iter()
                .any(|alias| alias.trim().to_lowercase() == phrase)
        {
            return 1.0;
        }
        if name.contains(&phrase) {
            return 0.9;
        }
        return 0.0;
    }

    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let mut name_tokens = tokens(&entity.name);
    for alias in entity.aliases() {
        name_tokens.extend(tokens(&alias));
    }
    let description_tokens = tokens(&entity.description);

    let hits: f64 = query_tokens
        .iter()
        .map(|token| {
            if name_tokens.contains(token) {
                1.0
            } else if description_tokens.contains(token) {
                0.5
            } else {
                0.0
            }
        })
        .sum();

    hits / query_tokens.len() as f64
}

/// `Some(inner)` for a query wrapped in double quotes.
pub fn quoted_phrase(query: &str) -> Option<&str> {
    let query = query.trim();
    if query.len() >= 2 && query.starts_with('"') && query.ends_with('"') {
        Some(query[1..query.len() - 1].trim())
    } else {
        None
    }
}

/// Wrap a name as an exact-phrase query.
pub fn exact_phrase_query(name: &str) -> String {
    format!("\"{}\"", name.trim().replace('"', ""))
}

/// Whether an entity passes a label filter; empty filters admit everything.
pub fn matches_label_filter(filter: &[String], entity: &NamedEntityData) -> bool {
    if filter.is_empty() {
        return true;
    }
    let wanted: BTreeSet<String> = filter.iter().map(|l| normalize_label(l)).collect();
    entity
        .labels
        .iter()
        .any(|label| wanted.contains(&normalize_label(label)))
}

/// Cosine similarity of two embeddings; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Keep hits with a positive score at or above `threshold`, best first,
/// ties by key ascending, at most `top_k`.
pub(crate) fn rank<T>(
    mut hits: Vec<Scored<T>>,
    top_k: usize,
    threshold: f64,
    key: impl Fn(&T) -> &str,
) -> Vec<Scored<T>> {
    hits.retain(|(_, score)| *score > 0.0 && *score >= threshold);
    hits.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| key(a).cmp(key(b)))
    });
    hits.truncate(top_k);
    hits
}

/// Embed a single text.
pub(crate) async fn embed_one(embedder: &dyn Embedder, text: &str) -> StorageResult<Vec<f32>> {
    let mut vectors = embedder
        .embed(&[text.to_string()])
        .await
        .map_err(embedding_error)?;
    vectors.pop().ok_or_else(|| StorageError::Embedding {
        message: "Embedder returned no vector".to_string(),
    })
}

fn embedding_error(err: LangbaseError) -> StorageError {
    StorageError::Embedding {
        message: err.to_string(),
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
