use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::{
    cosine_similarity, embed_one, matches_label_filter, rank, text_score, EntityRepository,
    PropositionRepository, Scored,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::langbase::Embedder;
use crate::model::{
    EntityMention, NamedEntityData, Properties, Proposition, PropositionStatus,
    RelationshipInstance,
};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed store for entities, relationships and propositions.
///
/// Embeddings are kept as JSON arrays next to each row and compared in
/// process, so vector search scans the table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `config.path` and migrate it.
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());
        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self {
            pool,
            embedder: None,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// A private in-memory database, mainly for tests.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self {
            pool,
            embedder: None,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Compute embeddings on write and enable vector search.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn embedding_json(&self, text: &str) -> StorageResult<Option<String>> {
        match &self.embedder {
            Some(embedder) => {
                let vector = embed_one(embedder.as_ref(), text).await?;
                Ok(Some(serde_json::to_string(&vector)?))
            }
            None => Ok(None),
        }
    }

    async fn all_entities(&self) -> StorageResult<Vec<(NamedEntityData, Option<Vec<f32>>)>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, labels, properties, embedding
            FROM entities
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntityRow::into_parts).collect()
    }
}

#[async_trait]
impl EntityRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<NamedEntityData>> {
        let row: Option<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, labels, properties, embedding
            FROM entities
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_parts().map(|(entity, _)| entity))
            .transpose()
    }

    async fn text_search(
        &self,
        query: &str,
        labels: &[String],
        top_k: usize,
        threshold: f64,
    ) -> StorageResult<Vec<Scored<NamedEntityData>>> {
        let hits = self
            .all_entities()
            .await?
            .into_iter()
            .filter(|(entity, _)| matches_label_filter(labels, entity))
            .map(|(entity, _)| {
                let score = text_score(query, &entity);
                (entity, score)
            })
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

        let hits = self
            .all_entities()
            .await?
            .into_iter()
            .filter(|(entity, _)| matches_label_filter(labels, entity))
            .filter_map(|(entity, embedding)| {
                embedding.map(|embedding| {
                    let score = cosine_similarity(&query_vector, &embedding);
                    (entity, score)
                })
            })
            .collect();
        Ok(rank(hits, top_k, threshold, |e| e.id.as_str()))
    }

    async fn save(&self, entity: &NamedEntityData) -> StorageResult<()> {
        let embedding = self.embedding_json(&entity.embedding_text()).await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO entities (id, name, description, labels, properties, embedding, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                labels = excluded.labels,
                properties = excluded.properties,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(serde_json::to_string(&entity.labels)?)
        .bind(serde_json::to_string(&entity.properties)?)
        .bind(&embedding)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, entity: &NamedEntityData) -> StorageResult<()> {
        let embedding = self.embedding_json(&entity.embedding_text()).await?;

        let result = sqlx::query(
            r#"
            UPDATE entities
            SET name = ?, description = ?, labels = ?, properties = ?, embedding = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(serde_json::to_string(&entity.labels)?)
        .bind(serde_json::to_string(&entity.properties)?)
        .bind(&embedding)
        .bind(Utc::now().to_rfc3339())
        .bind(&entity.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::EntityNotFound {
                entity_id: entity.id.clone(),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_relationship(
        &self,
        source_id: &str,
        relationship_type: &str,
        target_id: &str,
    ) -> StorageResult<Option<RelationshipInstance>> {
        let row: Option<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT source_id, relationship_type, target_id, description, properties
            FROM relationships
            WHERE source_id = ? AND relationship_type = ? AND target_id = ?
            "#,
        )
        .bind(source_id)
        .bind(relationship_type)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RelationshipRow::try_into_instance).transpose()
    }

    async fn save_relationship(&self, relationship: &RelationshipInstance) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO relationships (source_id, relationship_type, target_id, description, properties, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, relationship_type, target_id) DO UPDATE SET
                description = excluded.description,
                properties = excluded.properties,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relationship.source_id)
        .bind(&relationship.relationship_type)
        .bind(&relationship.target_id)
        .bind(&relationship.description)
        .bind(serde_json::to_string(&relationship.properties)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

const PROPOSITION_COLUMNS: &str = "id, context_id, text, mentions, confidence, decay, status, \
     grounding, reinforce_count, level, embedding, created, revised";

#[async_trait]
impl PropositionRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Proposition>> {
        let row: Option<PropositionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM propositions WHERE id = ?",
            PROPOSITION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_parts().map(|(p, _)| p)).transpose()
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

        let rows: Vec<PropositionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM propositions WHERE context_id = ? AND status = ?",
            PROPOSITION_COLUMNS
        ))
        .bind(context_id)
        .bind(PropositionStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let (proposition, embedding) = row.into_parts()?;
            if let Some(embedding) = embedding {
                let score = cosine_similarity(&query_vector, &embedding);
                hits.push((proposition, score));
            }
        }
        Ok(rank(hits, top_k, min_similarity, |p| p.id.as_str()))
    }

    async fn find_by_canonical_text(
        &self,
        context_id: &str,
        canonical: &str,
    ) -> StorageResult<Vec<Proposition>> {
        let rows: Vec<PropositionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM propositions WHERE context_id = ? AND canonical_text = ? \
             ORDER BY created ASC, id ASC",
            PROPOSITION_COLUMNS
        ))
        .bind(context_id)
        .bind(canonical)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_parts().map(|(p, _)| p))
            .collect()
    }

    async fn save(&self, proposition: &Proposition) -> StorageResult<()> {
        let embedding = self.embedding_json(&proposition.text).await?;

        sqlx::query(
            r#"
            INSERT INTO propositions (id, context_id, text, canonical_text, mentions, confidence, decay,
                                      status, grounding, reinforce_count, level, embedding, created, revised)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                context_id = excluded.context_id,
                text = excluded.text,
                canonical_text = excluded.canonical_text,
                mentions = excluded.mentions,
                confidence = excluded.confidence,
                decay = excluded.decay,
                status = excluded.status,
                grounding = excluded.grounding,
                reinforce_count = excluded.reinforce_count,
                level = excluded.level,
                embedding = excluded.embedding,
                revised = excluded.revised
            "#,
        )
        .bind(&proposition.id)
        .bind(&proposition.context_id)
        .bind(&proposition.text)
        .bind(proposition.canonical_text())
        .bind(serde_json::to_string(&proposition.mentions)?)
        .bind(proposition.confidence)
        .bind(proposition.decay)
        .bind(proposition.status.as_str())
        .bind(serde_json::to_string(&proposition.grounding)?)
        .bind(i64::from(proposition.reinforce_count))
        .bind(i64::from(proposition.level))
        .bind(&embedding)
        .bind(proposition.created.to_rfc3339())
        .bind(proposition.revised.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, proposition: &Proposition) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE propositions
            SET mentions = ?, confidence = ?, decay = ?, status = ?, grounding = ?,
                reinforce_count = ?, level = ?, revised = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(&proposition.mentions)?)
        .bind(proposition.confidence)
        .bind(proposition.decay)
        .bind(proposition.status.as_str())
        .bind(serde_json::to_string(&proposition.grounding)?)
        .bind(i64::from(proposition.reinforce_count))
        .bind(i64::from(proposition.level))
        .bind(proposition.revised.to_rfc3339())
        .bind(&proposition.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PropositionNotFound {
                proposition_id: proposition.id.clone(),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM propositions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct EntityRow {
    id: String,
    name: String,
    description: String,
    labels: String,
    properties: String,
    embedding: Option<String>,
}

impl EntityRow {
    fn into_parts(self) -> StorageResult<(NamedEntityData, Option<Vec<f32>>)> {
        let labels: Vec<String> = serde_json::from_str(&self.labels)?;
        let properties: Properties = serde_json::from_str(&self.properties)?;
        let embedding = self
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()?;

        let entity = NamedEntityData {
            id: self.id,
            name: self.name,
            description: self.description,
            labels,
            properties,
        };
        Ok((entity, embedding))
    }
}

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    source_id: String,
    relationship_type: String,
    target_id: String,
    description: String,
    properties: String,
}

impl RelationshipRow {
    fn try_into_instance(self) -> StorageResult<RelationshipInstance> {
        Ok(RelationshipInstance {
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type: self.relationship_type,
            description: self.description,
            properties: serde_json::from_str(&self.properties)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PropositionRow {
    id: String,
    context_id: String,
    text: String,
    mentions: String,
    confidence: f64,
    decay: f64,
    status: String,
    grounding: String,
    reinforce_count: i64,
    level: i64,
    embedding: Option<String>,
    created: String,
    revised: String,
}

impl PropositionRow {
    fn into_parts(self) -> StorageResult<(Proposition, Option<Vec<f32>>)> {
        let status = PropositionStatus::from_str(&self.status)
            .map_err(|message| StorageError::Query { message })?;
        let mentions: Vec<EntityMention> = serde_json::from_str(&self.mentions)?;
        let grounding: Vec<String> = serde_json::from_str(&self.grounding)?;
        let embedding = self
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()?;

        let proposition = Proposition {
            id: self.id,
            context_id: self.context_id,
            text: self.text,
            mentions,
            confidence: self.confidence,
            decay: self.decay,
            status,
            grounding,
            reinforce_count: u32::try_from(self.reinforce_count).unwrap_or(0),
            level: u32::try_from(self.level).unwrap_or(0),
            created: parse_timestamp(&self.created),
            revised: parse_timestamp(&self.revised),
        };
        Ok((proposition, embedding))
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
