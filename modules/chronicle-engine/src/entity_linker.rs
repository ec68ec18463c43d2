//! Batch entity resolution.
//!
//! Unique (name, type) pairs are resolved once and the results re-broadcast
//! to every occurrence, preserving input order.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use chronicle_common::EntityMention;

use crate::traits::TimelineStore;

#[derive(Debug, Clone)]
pub struct EntityResponse {
    pub entity_id: Option<Uuid>,
    pub status_code: u16,
    pub message: String,
    pub is_verified_existent: Option<bool>,
}

pub struct EntityLinker {
    store: Arc<dyn TimelineStore>,
}

impl EntityLinker {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self { store }
    }

    /// Resolve a batch of mentions to stable entity ids. The output is
    /// position-aligned with the input.
    pub async fn batch_get_or_create(
        &self,
        mentions: &[EntityMention],
    ) -> Result<Vec<EntityResponse>> {
        if mentions.is_empty() {
            return Ok(Vec::new());
        }

        // Dedup by (name, type) before hitting the store.
        let mut unique: Vec<(String, String, String)> = Vec::new();
        let mut index_of: HashMap<(String, String), usize> = HashMap::new();
        for mention in mentions {
            let key = (mention.name.clone(), mention.entity_type.clone());
            if !index_of.contains_key(&key) {
                index_of.insert(key, unique.len());
                unique.push((
                    mention.name.clone(),
                    mention.entity_type.clone(),
                    mention.language.clone(),
                ));
            }
        }

        debug!(mentions = mentions.len(), unique = unique.len(), "resolving entities");
        let entities = self.store.get_or_create_entities(&unique).await?;

        let responses: Vec<EntityResponse> = mentions
            .iter()
            .map(|mention| {
                let key = (mention.name.clone(), mention.entity_type.clone());
                match index_of.get(&key).and_then(|&i| entities.get(i)) {
                    Some(entity) => EntityResponse {
                        entity_id: Some(entity.id),
                        status_code: 200,
                        message: "ok".to_string(),
                        is_verified_existent: entity.is_verified_existent,
                    },
                    None => EntityResponse {
                        entity_id: None,
                        status_code: 500,
                        message: format!("entity resolution failed for {}", mention.name),
                        is_verified_existent: None,
                    },
                }
            })
            .collect();

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;

    fn mention(name: &str, entity_type: &str) -> EntityMention {
        EntityMention {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicates_resolve_to_the_same_entity() {
        let store = Arc::new(InMemoryStore::new());
        let linker = EntityLinker::new(store);
        let mentions = vec![
            mention("NASA", "organization"),
            mention("Apollo 11", "event"),
            mention("NASA", "organization"),
        ];
        let responses = linker.batch_get_or_create(&mentions).await.unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].entity_id, responses[2].entity_id);
        assert_ne!(responses[0].entity_id, responses[1].entity_id);
        assert!(responses.iter().all(|r| r.status_code == 200));
    }

    #[tokio::test]
    async fn same_name_different_type_stays_distinct() {
        let store = Arc::new(InMemoryStore::new());
        let linker = EntityLinker::new(store);
        let mentions = vec![mention("Apollo", "event"), mention("Apollo", "person")];
        let responses = linker.batch_get_or_create(&mentions).await.unwrap();
        assert_ne!(responses[0].entity_id, responses[1].entity_id);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        let linker = EntityLinker::new(store);
        assert!(linker.batch_get_or_create(&[]).await.unwrap().is_empty());
    }
}
