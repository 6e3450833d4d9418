//! Integration tests for the SQLite store.
//!
//! Most tests use an in-memory database; persistence is checked against a
//! temporary file.

mod common;

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use common::FakeEmbedder;
use dice::config::DatabaseConfig;
use dice::error::StorageError;
use dice::model::{
    EntityMention, MentionRole, NamedEntityData, Proposition, PropositionStatus,
    RelationshipInstance,
};
use dice::storage::{EntityRepository, PropositionRepository, SqliteStore};

async fn create_test_store() -> SqliteStore {
    SqliteStore::new_in_memory()
        .await
        .expect("Failed to create in-memory store")
        .with_embedder(Arc::new(FakeEmbedder))
}

fn holmes() -> NamedEntityData {
    NamedEntityData::new("e1", "Sherlock Holmes", ["Detective", "Person"])
        .with_description("Consulting detective of Baker Street")
}

mod entity_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_find() {
        let store = create_test_store().await;
        EntityRepository::save(&store, &holmes()).await.unwrap();

        let loaded = EntityRepository::find_by_id(&store, "e1").await.unwrap();
        assert_eq!(loaded, Some(holmes()));
        assert!(EntityRepository::find_by_id(&store, "nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = create_test_store().await;
        EntityRepository::save(&store, &holmes()).await.unwrap();
        let renamed = holmes().with_property("aliases", json!(["Holmes"]));
        EntityRepository::save(&store, &renamed).await.unwrap();

        let loaded = EntityRepository::find_by_id(&store, "e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.aliases(), vec!["Holmes"]);
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let store = create_test_store().await;
        let err = EntityRepository::update(&store, &holmes())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::EntityNotFound { .. }));

        EntityRepository::save(&store, &holmes()).await.unwrap();
        let updated = holmes().with_description("Retired to Sussex");
        EntityRepository::update(&store, &updated).await.unwrap();
        let loaded = EntityRepository::find_by_id(&store, "e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.description, "Retired to Sussex");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = create_test_store().await;
        EntityRepository::save(&store, &holmes()).await.unwrap();
        EntityRepository::delete(&store, "e1").await.unwrap();
        assert!(EntityRepository::find_by_id(&store, "e1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_text_search_phrase_and_labels() {
        let store = create_test_store().await;
        for entity in [
            holmes(),
            NamedEntityData::new("e2", "Mycroft Holmes", ["Person"]),
            NamedEntityData::new("p1", "Holmes Street", ["Place"]),
        ] {
            EntityRepository::save(&store, &entity).await.unwrap();
        }

        let exact = store
            .text_search("\"sherlock holmes\"", &[], 10, 0.0)
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].0.id, "e1");
        assert!((exact[0].1 - 1.0).abs() < 1e-9);

        let people = store
            .text_search("Holmes", &["Person".to_string()], 10, 0.0)
            .await
            .unwrap();
        let ids: Vec<&str> = people.iter().map(|(e, _)| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        let limited = store.text_search("Holmes", &[], 1, 0.0).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_prefers_closest() {
        let store = create_test_store().await;
        EntityRepository::save(&store, &holmes()).await.unwrap();
        EntityRepository::save(
            &store,
            &NamedEntityData::new("e2", "Irene Adler", ["Person"]).with_description("Opera singer"),
        )
        .await
        .unwrap();

        let hits = EntityRepository::vector_search(&store, "consulting detective", &[], 5, 0.1)
            .await
            .unwrap();
        assert_eq!(hits[0].0.id, "e1");
    }

    #[tokio::test]
    async fn test_relationship_upsert() {
        let store = create_test_store().await;
        let edge = RelationshipInstance {
            source_id: "e1".to_string(),
            target_id: "e2".to_string(),
            relationship_type: "SIBLING_OF".to_string(),
            description: "brothers".to_string(),
            properties: Default::default(),
        };
        store.save_relationship(&edge).await.unwrap();
        let mut changed = edge.clone();
        changed.description = "elder brother".to_string();
        store.save_relationship(&changed).await.unwrap();

        let loaded = store
            .find_relationship("e1", "SIBLING_OF", "e2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.description, "elder brother");
        assert!(store
            .find_relationship("e2", "SIBLING_OF", "e1")
            .await
            .unwrap()
            .is_none());
    }
}

mod proposition_tests {
    use super::*;

    fn proposition(id: &str, context: &str, text: &str) -> Proposition {
        Proposition::new(context, text, 0.7, 0.1)
            .with_id(id)
            .with_grounding(["c1"])
            .with_mentions(vec![
                EntityMention::new("Holmes", "Person", MentionRole::Subject).resolved_to("e1"),
            ])
    }

    #[tokio::test]
    async fn test_round_trip_keeps_mentions() {
        let store = create_test_store().await;
        let original = proposition("p1", "ctx", "Holmes plays the violin");
        PropositionRepository::save(&store, &original).await.unwrap();

        let loaded = PropositionRepository::find_by_id(&store, "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.text, original.text);
        assert_eq!(loaded.mentions, original.mentions);
        assert_eq!(loaded.grounding, vec!["c1"]);
        assert_eq!(loaded.status, PropositionStatus::Active);
    }

    #[tokio::test]
    async fn test_vector_search_is_scoped_and_active_only() {
        let store = create_test_store().await;
        PropositionRepository::save(&store, &proposition("p1", "ctx", "Holmes plays the violin"))
            .await
            .unwrap();
        PropositionRepository::save(&store, &proposition("p2", "other", "Holmes plays the violin"))
            .await
            .unwrap();
        PropositionRepository::save(
            &store,
            &proposition("p3", "ctx", "Holmes plays the violin badly")
                .with_status(PropositionStatus::Contradicted),
        )
        .await
        .unwrap();

        let hits = PropositionRepository::vector_search(&store, "Holmes plays violin", "ctx", 5, 0.1)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|(p, _)| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_canonical_lookup_is_scoped_to_context() {
        let store = create_test_store().await;
        PropositionRepository::save(&store, &proposition("p1", "ctx", "Alice works at Acme."))
            .await
            .unwrap();
        PropositionRepository::save(&store, &proposition("p2", "ctx", "Bob works at Acme"))
            .await
            .unwrap();

        let found = store
            .find_by_canonical_text("ctx", "alice works at acme")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p1");
        assert!(store
            .find_by_canonical_text("empty", "alice works at acme")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let store = create_test_store().await;
        let err = PropositionRepository::update(&store, &proposition("p9", "ctx", "Nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PropositionNotFound { .. }));
    }
}

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("dice.db"),
            max_connections: 2,
        };

        {
            let store = SqliteStore::new(&config).await.unwrap();
            EntityRepository::save(&store, &holmes()).await.unwrap();
            let pipe = Proposition::new("ctx", "Holmes smokes a pipe", 0.7, 0.1).with_id("p1");
            PropositionRepository::save(&store, &pipe).await.unwrap();
        }

        let reopened = SqliteStore::new(&config).await.unwrap();
        assert!(EntityRepository::find_by_id(&reopened, "e1")
            .await
            .unwrap()
            .is_some());
        assert!(PropositionRepository::find_by_id(&reopened, "p1")
            .await
            .unwrap()
            .is_some());
    }
}
