use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::entity::{NamedEntityData, SuggestedEntity};
use super::relationship::{RelationshipInstance, RelationshipResolution};
use super::resolution::EntityResolution;

/// A resolution paired with what is actually written for it.
///
/// `convergence_target` is `None` when nothing is persisted (vetoed items).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merge<R, T> {
    pub resolution: R,
    pub convergence_target: Option<T>,
}

impl<R, T> Merge<R, T> {
    pub fn new(resolution: R, convergence_target: Option<T>) -> Self {
        Self {
            resolution,
            convergence_target,
        }
    }
}

/// A batch of merges with the chunks they derive from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merges<R, T> {
    pub chunk_ids: BTreeSet<String>,
    pub merges: Vec<Merge<R, T>>,
}

impl<R, T> Default for Merges<R, T> {
    fn default() -> Self {
        Self {
            chunk_ids: BTreeSet::new(),
            merges: Vec::new(),
        }
    }
}

pub type EntityMerge = Merge<EntityResolution, NamedEntityData>;
pub type RelationshipMerge = Merge<RelationshipResolution, RelationshipInstance>;

/// Everything one batch decided to change in the knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeGraphDelta {
    pub chunk_ids: BTreeSet<String>,
    pub entity_merges: Vec<EntityMerge>,
    pub relationship_merges: Vec<RelationshipMerge>,
}

/// Counts describing a delta, for logs and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    pub chunks: usize,
    pub new_entities: usize,
    pub merged_entities: usize,
    pub reference_only_entities: usize,
    pub vetoed_entities: usize,
    pub new_relationships: usize,
    pub merged_relationships: usize,
}

impl KnowledgeGraphDelta {
    pub fn new(
        chunk_ids: BTreeSet<String>,
        entity_merges: Vec<EntityMerge>,
        relationship_merges: Vec<RelationshipMerge>,
    ) -> Self {
        Self {
            chunk_ids,
            entity_merges,
            relationship_merges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_merges.is_empty() && self.relationship_merges.is_empty()
    }

    /// Targets of `New` resolutions.
    pub fn new_entities(&self) -> Vec<&NamedEntityData> {
        self.entity_targets(|r| matches!(r, EntityResolution::New { .. }))
    }

    /// Targets of `Existing` resolutions.
    pub fn merged_entities(&self) -> Vec<&NamedEntityData> {
        self.entity_targets(|r| matches!(r, EntityResolution::Existing { .. }))
    }

    /// Existing entities referenced but left unchanged.
    pub fn reference_only_entities(&self) -> Vec<&NamedEntityData> {
        self.entity_targets(|r| matches!(r, EntityResolution::ReferenceOnly { .. }))
    }

    /// Suggestions the creation policy rejected.
    pub fn vetoed_entities(&self) -> Vec<&SuggestedEntity> {
        self.entity_merges
            .iter()
            .filter(|m| matches!(m.resolution, EntityResolution::Vetoed { .. }))
            .map(|m| m.resolution.suggested())
            .collect()
    }

    /// Entities to write: merged targets plus new entities, one per id.
    ///
    /// A merged entry always wins over a new entry with the same id. Several
    /// merges of one id are folded in order, so no merge loses the labels
    /// another one added.
    pub fn new_or_modified_entities(&self) -> Vec<NamedEntityData> {
        let mut out: Vec<NamedEntityData> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for entity in self.merged_entities() {
            match index.get(&entity.id) {
                Some(&i) => out[i] = out[i].absorb(entity),
                None => {
                    index.insert(entity.id.clone(), out.len());
                    out.push(entity.clone());
                }
            }
        }
        for entity in self.new_entities() {
            if !index.contains_key(&entity.id) {
                index.insert(entity.id.clone(), out.len());
                out.push(entity.clone());
            }
        }
        out
    }

    pub fn new_relationships(&self) -> Vec<&RelationshipInstance> {
        self.relationship_targets(|r| matches!(r, RelationshipResolution::New { .. }))
    }

    pub fn merged_relationships(&self) -> Vec<&RelationshipInstance> {
        self.relationship_targets(|r| matches!(r, RelationshipResolution::Existing { .. }))
    }

    pub fn summary(&self) -> DeltaSummary {
        DeltaSummary {
            chunks: self.chunk_ids.len(),
            new_entities: self.new_entities().len(),
            merged_entities: self.merged_entities().len(),
            reference_only_entities: self.reference_only_entities().len(),
            vetoed_entities: self.vetoed_entities().len(),
            new_relationships: self.new_relationships().len(),
            merged_relationships: self.merged_relationships().len(),
        }
    }

    fn entity_targets(&self, keep: impl Fn(&EntityResolution) -> bool) -> Vec<&NamedEntityData> {
        self.entity_merges
            .iter()
            .filter(|m| keep(&m.resolution))
            .filter_map(|m| m.convergence_target.as_ref())
            .collect()
    }

    fn relationship_targets(
        &self,
        keep: impl Fn(&RelationshipResolution) -> bool,
    ) -> Vec<&RelationshipInstance> {
        self.relationship_merges
            .iter()
            .filter(|m| keep(&m.resolution))
            .filter_map(|m| m.convergence_target.as_ref())
            .collect()
    }
}
