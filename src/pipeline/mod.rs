//! Batch pipelines turning chunks into a knowledge-graph delta and revised
//! propositions.
//!
//! [`KnowledgePipeline`] walks chunks in order: extract, filter mentions,
//! consolidate, resolve against a [`BatchSession`], apply the merge policy,
//! resolve relationships, then write the outcome into the session so the
//! next chunk sees it. Nothing reaches the backing store until
//! [`apply_delta`] is called.
//!
//! [`PropositionPipeline`] binds extracted propositions to the entities the
//! delta settled on and revises them chunk by chunk.

mod consolidate;
mod extract;
mod filter;
mod merge;
mod session;

pub use consolidate::consolidate;
pub use extract::{Chunk, LangbaseExtractor, SuggestedProposition, Suggestions, TextExtractor};
pub use filter::{filter_mentions, BasicMentionFilter, MentionFilter, ObservableMentionFilter};
pub use merge::{DefaultMergePolicy, MergePolicy};
pub use session::BatchSession;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult, StorageResult};
use crate::langbase::Embedder;
use crate::matching::normalize_name;
use crate::model::{
    normalize_relationship_type, EntityMerge, EntityResolution, KnowledgeGraphDelta, Merge,
    Proposition, RelationshipInstance, RelationshipMerge, RelationshipResolution,
    SuggestedRelationship,
};
use crate::resolver::ResolverFactory;
use crate::revision::{PropositionReviser, RevisionCounts, RevisionResult};
use crate::schema::DataDictionary;
use crate::storage::EntityRepository;

/// Propositions extracted from one chunk, ready for revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkPropositions {
    pub chunk_id: String,
    pub propositions: Vec<Proposition>,
}

/// What [`KnowledgePipeline::ingest`] produced for a batch.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub delta: KnowledgeGraphDelta,
    /// Extracted propositions per chunk, in chunk order.
    pub propositions: Vec<ChunkPropositions>,
    /// Chunks whose extraction failed and were skipped.
    pub failed_chunks: Vec<String>,
}

/// Entity and relationship resolution over a batch of chunks.
pub struct KnowledgePipeline {
    extractor: Arc<dyn TextExtractor>,
    resolvers: Arc<dyn ResolverFactory>,
    repo: Arc<dyn EntityRepository>,
    schema: DataDictionary,
    mention_filter: Arc<dyn MentionFilter>,
    merge_policy: Arc<dyn MergePolicy>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl KnowledgePipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        resolvers: Arc<dyn ResolverFactory>,
        repo: Arc<dyn EntityRepository>,
        schema: DataDictionary,
    ) -> Self {
        Self {
            extractor,
            resolvers,
            repo,
            schema,
            mention_filter: Arc::new(BasicMentionFilter::default()),
            merge_policy: Arc::new(DefaultMergePolicy),
            embedder: None,
        }
    }

    pub fn with_mention_filter(mut self, filter: Arc<dyn MentionFilter>) -> Self {
        self.mention_filter = filter;
        self
    }

    pub fn with_merge_policy(mut self, policy: Arc<dyn MergePolicy>) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Embed entities written during a batch so later chunks can find them
    /// by vector search.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn schema(&self) -> &DataDictionary {
        &self.schema
    }

    /// Resolve a batch and return its delta.
    pub async fn process(&self, chunks: &[Chunk]) -> PipelineResult<KnowledgeGraphDelta> {
        Ok(self.ingest(chunks).await?.delta)
    }

    /// Resolve a batch, also returning the extracted propositions.
    ///
    /// Chunks are processed strictly in order. A chunk whose extraction
    /// fails is logged and skipped; storage errors abort the batch.
    pub async fn ingest(&self, chunks: &[Chunk]) -> PipelineResult<Ingested> {
        validate_chunks(chunks)?;

        let mut session = BatchSession::new(self.repo.clone());
        if let Some(embedder) = &self.embedder {
            session = session.with_embedder(embedder.clone());
        }
        let session = Arc::new(session);
        let resolver = self.resolvers.resolver_for(session.clone());

        let mut chunk_ids = BTreeSet::new();
        let mut entity_merges: Vec<EntityMerge> = Vec::new();
        let mut relationship_merges: Vec<RelationshipMerge> = Vec::new();
        let mut propositions = Vec::new();
        let mut failed_chunks = Vec::new();

        for chunk in chunks {
            let suggestions = match self.extractor.extract(chunk, &self.schema).await {
                Ok(suggestions) => suggestions,
                Err(e) => {
                    warn!(chunk = %chunk.id, error = %e, "Skipping chunk");
                    failed_chunks.push(chunk.id.clone());
                    continue;
                }
            };
            chunk_ids.insert(chunk.id.clone());

            let entities = consolidate(filter_mentions(
                self.mention_filter.as_ref(),
                suggestions.entities,
            ));
            let resolutions = resolver
                .resolve(
                    entities,
                    BTreeSet::from([chunk.id.clone()]),
                    Some(&chunk.text),
                    &self.schema,
                )
                .await;

            let mut chunk_merges = Vec::with_capacity(resolutions.len());
            for resolution in resolutions {
                let mut target = self.merge_policy.converge(&resolution);
                if let Some(entity) = target.take() {
                    let entity = match resolution {
                        EntityResolution::ReferenceOnly { .. } => entity,
                        EntityResolution::Existing { .. } => {
                            // mentions resolved concurrently may share a target
                            let folded = match session.find_by_id(&entity.id).await? {
                                Some(current) => current.absorb(&entity),
                                None => entity,
                            };
                            session.save(&folded).await?;
                            folded
                        }
                        _ => {
                            session.save(&entity).await?;
                            entity
                        }
                    };
                    target = Some(entity);
                }
                chunk_merges.push(Merge::new(resolution, target));
            }

            let endpoints = EndpointIndex::new(&chunk_merges);
            for suggested in suggestions.relationships {
                let merge = resolve_relationship(session.as_ref(), &endpoints, suggested).await?;
                if let Some(edge) = &merge.convergence_target {
                    session.save_relationship(edge).await?;
                }
                relationship_merges.push(merge);
            }
            entity_merges.extend(chunk_merges);

            propositions.push(ChunkPropositions {
                chunk_id: chunk.id.clone(),
                propositions: suggestions
                    .propositions
                    .into_iter()
                    .map(|p| p.into_proposition(chunk))
                    .collect(),
            });
        }

        let delta = KnowledgeGraphDelta::new(chunk_ids, entity_merges, relationship_merges);
        let summary = delta.summary();
        info!(
            chunks = summary.chunks,
            failed = failed_chunks.len(),
            new_entities = summary.new_entities,
            merged_entities = summary.merged_entities,
            reference_only = summary.reference_only_entities,
            vetoed = summary.vetoed_entities,
            new_relationships = summary.new_relationships,
            merged_relationships = summary.merged_relationships,
            "Knowledge pipeline complete"
        );

        Ok(Ingested {
            delta,
            propositions,
            failed_chunks,
        })
    }
}

fn validate_chunks(chunks: &[Chunk]) -> PipelineResult<()> {
    let mut seen = BTreeSet::new();
    for chunk in chunks {
        if chunk.id.trim().is_empty() {
            return Err(PipelineError::Validation {
                field: "chunk.id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(PipelineError::Validation {
                field: "chunk.id".to_string(),
                reason: format!("duplicate id {}", chunk.id),
            });
        }
    }
    Ok(())
}

/// Where relationship endpoints named in a chunk point to.
///
/// Keys are normalized names and ids; `None` marks a vetoed entity.
struct EndpointIndex {
    by_key: BTreeMap<String, Option<String>>,
}

impl EndpointIndex {
    fn new(merges: &[EntityMerge]) -> Self {
        let mut by_key = BTreeMap::new();
        for merge in merges {
            let suggested = merge.resolution.suggested();
            let target = merge.convergence_target.as_ref().map(|e| e.id.clone());
            by_key
                .entry(normalize_name(&suggested.name))
                .or_insert_with(|| target.clone());
            if let Some(id) = &suggested.id {
                by_key.entry(id.clone()).or_insert_with(|| target.clone());
            }
            if let Some(id) = &target {
                by_key.entry(id.clone()).or_insert_with(|| target.clone());
            }
        }
        Self { by_key }
    }

    fn lookup(&self, endpoint: &str) -> Option<&Option<String>> {
        self.by_key
            .get(endpoint.trim())
            .or_else(|| self.by_key.get(&normalize_name(endpoint)))
    }
}

async fn resolve_endpoint(
    session: &dyn EntityRepository,
    endpoints: &EndpointIndex,
    endpoint: &str,
) -> StorageResult<Result<String, String>> {
    match endpoints.lookup(endpoint) {
        Some(Some(id)) => Ok(Ok(id.clone())),
        Some(None) => Ok(Err(format!("endpoint {} was vetoed", endpoint))),
        None => match session.find_by_id(endpoint.trim()).await? {
            Some(entity) => Ok(Ok(entity.id)),
            None => Ok(Err(format!("endpoint {} is unresolved", endpoint))),
        },
    }
}

async fn resolve_relationship(
    session: &dyn EntityRepository,
    endpoints: &EndpointIndex,
    suggested: SuggestedRelationship,
) -> StorageResult<RelationshipMerge> {
    let source = resolve_endpoint(session, endpoints, &suggested.source).await?;
    let target = resolve_endpoint(session, endpoints, &suggested.target).await?;

    let (source_id, target_id) = match (source, target) {
        (Ok(source_id), Ok(target_id)) => (source_id, target_id),
        (Err(reason), _) | (_, Err(reason)) => {
            debug!(relationship = %suggested.relationship_type, reason = %reason, "Relationship vetoed");
            return Ok(Merge::new(
                RelationshipResolution::Vetoed { suggested, reason },
                None,
            ));
        }
    };

    let kind = normalize_relationship_type(&suggested.relationship_type);
    if kind.is_empty() {
        return Ok(Merge::new(
            RelationshipResolution::Vetoed {
                suggested,
                reason: "empty relationship type".to_string(),
            },
            None,
        ));
    }

    let resolution = match session.find_relationship(&source_id, &kind, &target_id).await? {
        Some(existing) => {
            let recommended = existing.merge_with(&suggested);
            RelationshipResolution::Existing {
                suggested,
                existing,
                recommended,
            }
        }
        None => {
            let recommended = RelationshipInstance::from_suggested(&suggested, source_id, target_id);
            RelationshipResolution::New {
                suggested,
                recommended,
            }
        }
    };
    let target = match &resolution {
        RelationshipResolution::New { recommended, .. }
        | RelationshipResolution::Existing { recommended, .. } => Some(recommended.clone()),
        RelationshipResolution::Vetoed { .. } => None,
    };
    Ok(Merge::new(resolution, target))
}

/// Counts of what [`apply_delta`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedDelta {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub relationships_saved: usize,
}

/// Persist a delta: new entities are saved, merged ones updated; vetoed
/// and reference-only entities are left alone.
pub async fn apply_delta(
    repo: &dyn EntityRepository,
    delta: &KnowledgeGraphDelta,
) -> StorageResult<AppliedDelta> {
    let mut applied = AppliedDelta::default();

    for entity in delta.new_or_modified_entities() {
        if repo.find_by_id(&entity.id).await?.is_some() {
            repo.update(&entity).await?;
            applied.entities_updated += 1;
        } else {
            repo.save(&entity).await?;
            applied.entities_created += 1;
        }
    }

    // later sightings of an edge carry the accumulated merge
    let mut edges: BTreeMap<(String, String, String), &RelationshipInstance> = BTreeMap::new();
    for merge in &delta.relationship_merges {
        if let Some(edge) = &merge.convergence_target {
            let (source, kind, target) = edge.key();
            edges.insert((source.to_string(), kind.to_string(), target.to_string()), edge);
        }
    }
    for edge in edges.values() {
        repo.save_relationship(edge).await?;
        applied.relationships_saved += 1;
    }

    info!(
        created = applied.entities_created,
        updated = applied.entities_updated,
        relationships = applied.relationships_saved,
        "Delta applied"
    );
    Ok(applied)
}

/// Revisions for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRevisions {
    pub chunk_id: String,
    pub results: Vec<RevisionResult>,
}

/// Everything the proposition pipeline decided for a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropositionDelta {
    pub chunk_ids: BTreeSet<String>,
    pub revisions: Vec<ChunkRevisions>,
}

impl PropositionDelta {
    pub fn results(&self) -> impl Iterator<Item = &RevisionResult> {
        self.revisions.iter().flat_map(|r| r.results.iter())
    }

    pub fn counts(&self) -> RevisionCounts {
        let results: Vec<RevisionResult> = self.results().cloned().collect();
        RevisionCounts::of(&results)
    }
}

/// Proposition extraction and revision over a batch of chunks.
pub struct PropositionPipeline {
    extractor: Arc<dyn TextExtractor>,
    reviser: PropositionReviser,
    schema: DataDictionary,
}

impl PropositionPipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        reviser: PropositionReviser,
        schema: DataDictionary,
    ) -> Self {
        Self {
            extractor,
            reviser,
            schema,
        }
    }

    /// Extract propositions from `chunks` and revise them against memory,
    /// binding mentions to the entities in `entities`.
    pub async fn process(
        &self,
        chunks: &[Chunk],
        entities: &KnowledgeGraphDelta,
    ) -> PipelineResult<PropositionDelta> {
        validate_chunks(chunks)?;
        let mut extracted = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match self.extractor.extract(chunk, &self.schema).await {
                Ok(suggestions) => extracted.push(ChunkPropositions {
                    chunk_id: chunk.id.clone(),
                    propositions: suggestions
                        .propositions
                        .into_iter()
                        .map(|p| p.into_proposition(chunk))
                        .collect(),
                }),
                Err(e) => warn!(chunk = %chunk.id, error = %e, "Skipping chunk"),
            }
        }
        self.revise(extracted, entities).await
    }

    /// Revise propositions that were already extracted, e.g. by
    /// [`KnowledgePipeline::ingest`]. Chunks are revised in order so each
    /// sees the outcome of the previous one.
    pub async fn revise(
        &self,
        extracted: Vec<ChunkPropositions>,
        entities: &KnowledgeGraphDelta,
    ) -> PipelineResult<PropositionDelta> {
        let names = entity_names(entities);
        let mut delta = PropositionDelta::default();

        for chunk in extracted {
            let propositions: Vec<Proposition> = chunk
                .propositions
                .into_iter()
                .map(|p| bind_mentions(p, &names))
                .collect();
            let results = self.reviser.revise_all(propositions).await?;
            delta.chunk_ids.insert(chunk.chunk_id.clone());
            delta.revisions.push(ChunkRevisions {
                chunk_id: chunk.chunk_id,
                results,
            });
        }
        Ok(delta)
    }
}

/// Lowercased names, aliases and suggested names mapped to the entity id
/// they converged on. First binding wins.
fn entity_names(delta: &KnowledgeGraphDelta) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    for merge in &delta.entity_merges {
        let Some(target) = &merge.convergence_target else {
            continue;
        };
        let mut keys = vec![
            merge.resolution.suggested().name.clone(),
            target.name.clone(),
        ];
        keys.extend(target.aliases());
        for key in keys {
            let key = key.trim().to_lowercase();
            if !key.is_empty() {
                names.entry(key).or_insert_with(|| target.id.clone());
            }
        }
    }
    names
}

fn bind_mentions(mut proposition: Proposition, names: &BTreeMap<String, String>) -> Proposition {
    for mention in &mut proposition.mentions {
        if mention.resolved_id.is_none() {
            mention.resolved_id = names.get(&mention.span.trim().to_lowercase()).cloned();
        }
    }
    proposition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityMention, MentionRole, NamedEntityData, ResolutionLevel, SuggestedEntity};

    fn delta() -> KnowledgeGraphDelta {
        let holmes = SuggestedEntity::new(["Person"], "Holmes");
        let stored = NamedEntityData::new("e1", "Sherlock Holmes", ["Person"]);
        let existing = EntityResolution::existing(holmes, stored, ResolutionLevel::ExactMatch);
        let target = existing.recommended().cloned();
        let vetoed = EntityResolution::vetoed(SuggestedEntity::new(["Work"], "A Study in Scarlet"));
        KnowledgeGraphDelta::new(
            BTreeSet::from(["c1".to_string()]),
            vec![Merge::new(existing, target), Merge::new(vetoed, None)],
            vec![],
        )
    }

    #[test]
    fn test_mentions_bind_by_name_and_alias() {
        let names = entity_names(&delta());
        let proposition = Proposition::new("ctx", "Holmes wrote about A Study in Scarlet", 0.7, 0.1)
            .with_mentions(vec![
                EntityMention::new("holmes", "Person", MentionRole::Subject),
                EntityMention::new("A Study in Scarlet", "Work", MentionRole::Object),
                EntityMention::new("Sherlock Holmes", "Person", MentionRole::Other),
            ]);
        let bound = bind_mentions(proposition, &names);
        assert_eq!(bound.mentions[0].resolved_id.as_deref(), Some("e1"));
        assert_eq!(bound.mentions[1].resolved_id, None);
        assert_eq!(bound.mentions[2].resolved_id.as_deref(), Some("e1"));
    }

    #[test]
    fn test_endpoint_index_marks_vetoed() {
        let merges = delta().entity_merges;
        let index = EndpointIndex::new(&merges);
        assert_eq!(index.lookup("Holmes"), Some(&Some("e1".to_string())));
        assert_eq!(index.lookup("e1"), Some(&Some("e1".to_string())));
        assert_eq!(index.lookup("a study in scarlet"), Some(&None));
        assert_eq!(index.lookup("Moriarty"), None);
    }

    #[test]
    fn test_chunk_validation() {
        assert!(validate_chunks(&[Chunk::new("c1", "ctx", "a"), Chunk::new("c2", "ctx", "b")]).is_ok());
        assert!(validate_chunks(&[Chunk::new("c1", "ctx", "a"), Chunk::new("c1", "ctx", "b")]).is_err());
        assert!(validate_chunks(&[Chunk::new(" ", "ctx", "a")]).is_err());
    }
}
