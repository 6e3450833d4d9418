//! # DICE
//!
//! Entity resolution and proposition revision for an incrementally
//! maintained knowledge store.
//!
//! ## Features
//!
//! - **Match strategies**: exact, normalized, fuzzy and label-compatibility
//!   predicates composed into early-exit chains
//! - **Candidate searchers**: id, exact name, normalized name, fuzzy, text,
//!   vector and LLM-agentic lookups gated on "exactly one" confidence
//! - **Escalating resolver**: cheapest searcher first, LLM bakeoff over the
//!   pooled candidates, schema-driven creation policy
//! - **Proposition revision**: canonical-text and vector candidates, entity
//!   overlap filter, LLM classification, confidence/decay update rules
//! - **Pipelines**: cross-chunk identity within a batch and an auditable
//!   knowledge-graph delta
//!
//! ## Architecture
//!
//! ```text
//! Chunk → Extractor (Langbase) → Resolver → Merge policy → Delta → Store
//!                                   ↓
//!                     Searchers (SQLite / memory, embeddings)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dice::pipeline::{Chunk, KnowledgePipeline, LangbaseExtractor, apply_delta};
//! use dice::resolver::EscalatingResolverFactory;
//! use dice::schema::DataDictionary;
//! use dice::storage::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = dice::Config::from_env()?;
//!     let llm = Arc::new(dice::langbase::LangbaseClient::new(&config.langbase, config.request.clone())?);
//!     let store = Arc::new(SqliteStore::new(&config.database).await?.with_embedder(llm.clone()));
//!     let pipeline = KnowledgePipeline::new(
//!         Arc::new(LangbaseExtractor::from_config(llm.clone(), &config)),
//!         Arc::new(EscalatingResolverFactory::new(config.resolution.clone())),
//!         store.clone(),
//!         DataDictionary::open_world(),
//!     );
//!     let delta = pipeline.process(&[Chunk::new("c1", "ctx", "Holmes met Watson.")]).await?;
//!     apply_delta(store.as_ref(), &delta).await?;
//!     Ok(())
//! }
//! ```

/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Langbase client and the LLM/embedding seams.
pub mod langbase;
/// Pure predicates comparing a suggestion with a stored entity.
pub mod matching;
/// Entities, resolutions, relationships, propositions and deltas.
pub mod model;
/// Batch pipelines over chunks.
pub mod pipeline;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Entity resolution and LLM arbitration.
pub mod resolver;
/// Proposition revision.
pub mod revision;
/// Domain type hierarchy and creation policy.
pub mod schema;
/// Candidate searchers.
pub mod search;
/// Entity and proposition repositories.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
