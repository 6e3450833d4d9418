use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    cosine_similarity, embed_one, matches_label_filter, rank, text_score, EntityRepository,
    PropositionRepository, Scored,
};
use crate::error::{StorageError, StorageResult};
use crate::langbase::Embedder;
use crate::model::{NamedEntityData, Proposition, RelationshipInstance};

type RelationshipKey = (String, String, String);

#[derive(Debug, Clone)]
struct StoredEntity {
    entity: NamedEntityData,
    embedding: Option<Vec<f32>>,
}

/// Entity store held in process memory.
///
/// Vector search needs an [`Embedder`]; without one it returns nothing.
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<BTreeMap<String, StoredEntity>>,
    relationships: RwLock<BTreeMap<RelationshipKey, RelationshipInstance>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Seed the store, e.g. in tests.
    pub async fn with_entities(self, entities: Vec<NamedEntityData>) -> StorageResult<Self> {
        for entity in &entities {
            self.save(entity).await?;
        }
        Ok(self)
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    pub async fn relationships(&self) -> Vec<RelationshipInstance> {
        self.relationships.read().await.values().cloned().collect()
    }

    async fn embedding_for(&self, entity: &NamedEntityData) -> StorageResult<Option<Vec<f32>>> {
        match &self.embedder {
            Some(embedder) => Ok(Some(
                embed_one(embedder.as_ref(), &entity.embedding_text()).await?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EntityRepository for InMemoryEntityStore {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<NamedEntityData>> {
        Ok(self
            .entities
            .read()
            .await
            .get(id)
            .map(|stored| stored.entity.clone()))
    }

    async fn text_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>> {
        let entities = self.entities.read().await;
        let hits = entities
            .values()
            .filter(|stored| matches_label_filter(labels, &stored.entity))
            .map(|stored| (stored.entity.clone(), text_score(query, &stored.entity)))
            .collect();
        Ok(rank(hits, top_k, threshold, |e| e.id.as_str()))
    }

    async fn vector_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let query_vector = embed_one(embedder.as_ref(), query).await?;

        let entities = self.entities.read().await;
        let hits = entities
            .values()
            .filter(|stored| matches_label_filter(labels, &stored.entity))
            .filter_map(|stored| {
                stored.embedding.as_ref().map(|embedding| {
                    (
                        stored.entity.clone(),
                        cosine_similarity(&query_vector, embedding),
                    )
                })
            })
            .collect();
        Ok(rank(hits, top_k, threshold, |e| e.id.as_str()))
    }

    async fn save(&self, entity: &NamedEntityData) -> StorageResult<()> {
        let embedding = self.embedding_for(entity).await?;
        self.entities.write().await.insert(
            entity.id.clone(),
            StoredEntity {
                entity: entity.clone(),
                embedding,
            },
        );
        Ok(())
    }

    async fn update(&self, entity: &NamedEntityData) -> StorageResult<()> {
        if !self.entities.read().await.contains_key(&entity.id) {
            return Err(StorageError::EntityNotFound {
                entity_id: entity.id.clone(),
            });
        }
        let embedding = self.embedding_for(entity).await?;

        let mut entities = self.entities.write().await;
        match entities.get_mut(&entity.id) {
            Some(stored) => {
                stored.entity = entity.clone();
                stored.embedding = embedding;
                Ok(())
            }
            None => Err(StorageError::EntityNotFound {
                entity_id: entity.id.clone(),
            }),
        }
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.entities.write().await.remove(id);
        Ok(())
    }

    async fn find_relationship(
        &self,
        source_id: &str,
        relationship_type: &str,
        target_id: &str,
    ) -> StorageResult<Option<RelationshipInstance>> {
        let key = (
            source_id.to_string(),
            relationship_type.to_string(),
            target_id.to_string(),
        );
        Ok(self.relationships.read().await.get(&key).cloned())
    }

    async fn save_relationship(&self, relationship: &RelationshipInstance) -> StorageResult<()> {
        let (source, kind, target) = relationship.key();
        self.relationships.write().await.insert(
            (source.to_string(), kind.to_string(), target.to_string()),
            relationship.clone(),
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredProposition {
    proposition: Proposition,
    embedding: Option<Vec<f32>>,
}

/// Proposition store held in process memory.
#[derive(Default)]
pub struct InMemoryPropositionStore {
    propositions: RwLock<BTreeMap<String, StoredProposition>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl InMemoryPropositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub async fn len(&self) -> usize {
        self.propositions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.propositions.read().await.is_empty()
    }

    async fn embedding_for(&self, proposition: &Proposition) -> StorageResult<Option<Vec<f32>>> {
        match &self.embedder {
            Some(embedder) => Ok(Some(embed_one(embedder.as_ref(), &proposition.text).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PropositionRepository for InMemoryPropositionStore {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Proposition>> {
        Ok(self
            .propositions
            .read()
            .await
            .get(id)
            .map(|stored| stored.proposition.clone()))
    }

    async fn vector_search(
        &self,
        text: &str,
        context_id: &str,
        top_k: usize,
        min_similarity: f64,
    ) -> StorageResult<Vec<Scored<Proposition>>> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let query_vector = embed_one(embedder.as_ref(), text).await?;

        let propositions = self.propositions.read().await;
        let hits = propositions
            .values()
            .filter(|stored| {
                stored.proposition.context_id == context_id && stored.proposition.is_active()
            })
            .filter_map(|stored| {
                stored.embedding.as_ref().map(|embedding| {
                    (
                        stored.proposition.clone(),
                        cosine_similarity(&query_vector, embedding),
                    )
                })
            })
            .collect();
        Ok(rank(hits, top_k, min_similarity, |p| p.id.as_str()))
    }

    async fn find_by_canonical_text(
        &self,
        context_id: &str,
        canonical: &str,
    ) -> StorageResult<Vec<Proposition>> {
        let propositions = self.propositions.read().await;
        let mut found: Vec<Proposition> = propositions
            .values()
            .filter(|stored| {
                stored.proposition.context_id == context_id
                    && stored.proposition.canonical_text() == canonical
            })
            .map(|stored| stored.proposition.clone())
            .collect();
        found.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn save(&self, proposition: &Proposition) -> StorageResult<()> {
        let embedding = self.embedding_for(proposition).await?;
        self.propositions.write().await.insert(
            proposition.id.clone(),
            StoredProposition {
                proposition: proposition.clone(),
                embedding,
            },
        );
        Ok(())
    }

    async fn update(&self, proposition: &Proposition) -> StorageResult<()> {
        let not_found = || StorageError::PropositionNotFound {
            proposition_id: proposition.id.clone(),
        };
        let same_text = match self.propositions.read().await.get(&proposition.id) {
            Some(stored) => stored.proposition.text == proposition.text,
            None => return Err(not_found()),
        };
        // revision keeps the text, so the stored embedding usually stays valid
        let fresh_embedding = if same_text {
            None
        } else {
            Some(self.embedding_for(proposition).await?)
        };

        let mut propositions = self.propositions.write().await;
        let stored = propositions.get_mut(&proposition.id).ok_or_else(not_found)?;
        stored.proposition = proposition.clone();
        if let Some(embedding) = fresh_embedding {
            stored.embedding = embedding;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.propositions.write().await.remove(id);
        Ok(())
    }
}
