use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::langbase::Embedder;
use crate::model::{NamedEntityData, RelationshipInstance};
use crate::storage::{rank, EntityRepository, InMemoryEntityStore, Scored};

/// Read-your-writes overlay for one pipeline batch.
///
/// Writes land in an in-memory overlay and are visible to every later read
/// through the session; the backing repository is only read. Overlay
/// values shadow backing values with the same id.
pub struct BatchSession {
    backing: Arc<dyn EntityRepository>,
    overlay: InMemoryEntityStore,
    deleted: RwLock<BTreeSet<String>>,
}

impl BatchSession {
    pub fn new(backing: Arc<dyn EntityRepository>) -> Self {
        Self {
            backing,
            overlay: InMemoryEntityStore::new(),
            deleted: RwLock::new(BTreeSet::new()),
        }
    }

    /// Embed overlay entities so vector search sees them.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.overlay = InMemoryEntityStore::new().with_embedder(embedder);
        self
    }

    async fn is_deleted(&self, id: &str) -> bool {
        self.deleted.read().await.contains(id)
    }

    /// Overlay hits, plus backing hits not shadowed by the overlay.
    async fn combine(
        &self,
        overlay_hits: Vec<Scored<NamedEntityData>>,
        backing_hits: Vec<Scored<NamedEntityData>>,
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>> {
        let deleted = self.deleted.read().await;
        let mut by_id: BTreeMap<String, Scored<NamedEntityData>> = overlay_hits
            .into_iter()
            .map(|(entity, score)| (entity.id.clone(), (entity, score)))
            .collect();

        for (entity, score) in backing_hits {
            if by_id.contains_key(&entity.id) || deleted.contains(&entity.id) {
                continue;
            }
            if self.overlay.find_by_id(&entity.id).await?.is_some() {
                // the overlay copy scored below the cut
                continue;
            }
            by_id.insert(entity.id.clone(), (entity, score));
        }
        Ok(rank(by_id.into_values().collect(), top_k, threshold, |e| {
            e.id.as_str()
        }))
    }
}

#[async_trait]
impl EntityRepository for BatchSession {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<NamedEntityData>> {
        if self.is_deleted(id).await {
            return Ok(None);
        }
        match self.overlay.find_by_id(id).await? {
            Some(entity) => Ok(Some(entity)),
            None => self.backing.find_by_id(id).await,
        }
    }

    async fn text_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>> {
        let overlay = self.overlay.text_search(query, labels, top_k, threshold).await?;
        let backing = self.backing.text_search(query, labels, top_k, threshold).await?;
        self.combine(overlay, backing, top_k, threshold).await
    }

    async fn vector_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>> {
        let overlay = self.overlay.vector_search(query, labels, top_k, threshold).await?;
        let backing = self.backing.vector_search(query, labels, top_k, threshold).await?;
        self.combine(overlay, backing, top_k, threshold).await
    }

    async fn save(&self, entity: &NamedEntityData) -> StorageResult<()> {
        self.deleted.write().await.remove(&entity.id);
        self.overlay.save(entity).await
    }

    async fn update(&self, entity: &NamedEntityData) -> StorageResult<()> {
        if self.find_by_id(&entity.id).await?.is_none() {
            return Err(StorageError::EntityNotFound {
                entity_id: entity.id.clone(),
            });
        }
        self.overlay.save(entity).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.overlay.delete(id).await?;
        self.deleted.write().await.insert(id.to_string());
        Ok(())
    }

    async fn find_relationship(
        &self,
        source_id: &str,
        relationship_type: &str,
        target_id: &str,
    ) -> StorageResult<Option<RelationshipInstance>> {
        match self
            .overlay
            .find_relationship(source_id, relationship_type, target_id)
            .await?
        {
            Some(relationship) => Ok(Some(relationship)),
            None => {
                self.backing
                    .find_relationship(source_id, relationship_type, target_id)
                    .await
            }
        }
    }

    async fn save_relationship(&self, relationship: &RelationshipInstance) -> StorageResult<()> {
        self.overlay.save_relationship(relationship).await
    }
}
