//! In-memory entity graph
//!
//! Holds the whole graph behind a `RwLock`. Loaded from a [`GraphSeed`], it
//! behaves like the SQLite store and is what tests and offline demos use.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;

use super::entity::{Entity, EntityContext, Label, LabelKind};
use super::resolver::NameProbe;
use super::seed::{GraphSeed, SeedReport};
use super::store::GraphStore;

#[derive(Debug, Clone)]
struct Node {
    entity: Entity,
    labels: BTreeSet<Label>,
    connects_to: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct GraphData {
    nodes: Vec<Node>,
    labels: BTreeSet<Label>,
}

impl GraphData {
    fn position(&self, name: &str, collection_id: Option<&str>) -> Option<usize> {
        self.nodes.iter().position(|node| {
            node.entity.name == name && node.entity.collection_id.as_deref() == collection_id
        })
    }

    fn apply(&mut self, seed: &GraphSeed) -> SeedReport {
        let mut report = SeedReport {
            collections: seed.collections.len(),
            ..Default::default()
        };

        let labels = seed.all_labels();
        report.labels = labels.len();
        self.labels.extend(labels);

        for (scope, entity_seed) in seed.scoped_entities() {
            let slot = match self.position(&entity_seed.name, scope) {
                Some(slot) => slot,
                None => {
                    let mut entity = Entity::new(entity_seed.name.clone());
                    entity.collection_id = scope.map(str::to_string);
                    self.nodes.push(Node {
                        entity,
                        labels: BTreeSet::new(),
                        connects_to: BTreeSet::new(),
                    });
                    self.nodes.len() - 1
                }
            };

            let node = &mut self.nodes[slot];
            if entity_seed.external_id.is_some() {
                node.entity.external_id = entity_seed.external_id.clone();
            }
            if entity_seed.description.is_some() {
                node.entity.description = entity_seed.description.clone();
            }
            for label in entity_seed.labels() {
                if node.labels.insert(label) {
                    report.relations += 1;
                }
            }
            report.entities += 1;
        }

        // Links need every entity in place first
        for (scope, entity_seed) in seed.scoped_entities() {
            let Some(source) = self.position(&entity_seed.name, scope) else {
                continue;
            };
            for target in &entity_seed.connects_to {
                if self.position(target, scope).is_none() {
                    warn!(
                        source = %entity_seed.name,
                        target = %target,
                        "Skipping link to unknown entity"
                    );
                    report.skipped_links += 1;
                    continue;
                }
                if self.nodes[source].connects_to.insert(target.clone()) {
                    report.relations += 1;
                }
            }
        }

        report
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    data: Arc<RwLock<GraphData>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph containing only `entities`, with no labels or links
    pub fn with_entities(entities: Vec<Entity>) -> Self {
        let nodes = entities
            .into_iter()
            .map(|entity| Node {
                entity,
                labels: BTreeSet::new(),
                connects_to: BTreeSet::new(),
            })
            .collect();

        Self {
            data: Arc::new(RwLock::new(GraphData {
                nodes,
                labels: BTreeSet::new(),
            })),
        }
    }

    pub fn from_seed(seed: &GraphSeed) -> Self {
        let mut data = GraphData::default();
        data.apply(seed);
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Merge `seed` into the graph
    pub async fn load(&self, seed: &GraphSeed) -> SeedReport {
        self.data.write().await.apply(seed)
    }

    pub async fn entity_count(&self) -> usize {
        self.data.read().await.nodes.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn entity_candidates(
        &self,
        probe: &NameProbe,
        scope: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let data = self.data.read().await;
        Ok(data
            .nodes
            .iter()
            .filter(|node| node.entity.in_scope(scope))
            .filter(|node| probe.tier(&node.entity).is_some())
            .map(|node| node.entity.clone())
            .collect())
    }

    async fn entity_context(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Option<EntityContext>> {
        let data = self.data.read().await;

        // Unscoped lookups take the lowest collection id for determinism
        let node = data
            .nodes
            .iter()
            .filter(|node| node.entity.name == name && node.entity.in_scope(scope))
            .min_by(|a, b| a.entity.collection_id.cmp(&b.entity.collection_id));

        Ok(node.map(|node| {
            let names_of = |kind: LabelKind| -> Vec<String> {
                node.labels
                    .iter()
                    .filter(|label| label.kind == kind)
                    .map(|label| label.name.clone())
                    .collect()
            };

            EntityContext {
                name: node.entity.name.clone(),
                description: node.entity.description.clone(),
                functions: names_of(LabelKind::Function),
                processes: names_of(LabelKind::Process),
                connects_to: node.connects_to.iter().cloned().collect(),
                collection_id: node.entity.collection_id.clone(),
            }
            .normalized()
        }))
    }

    async fn labels(&self) -> Result<Vec<Label>> {
        Ok(self.data.read().await.labels.iter().cloned().collect())
    }

    async fn label_owners(&self, label: &Label) -> Result<Vec<Entity>> {
        let data = self.data.read().await;
        Ok(data
            .nodes
            .iter()
            .filter(|node| node.labels.contains(label))
            .map(|node| node.entity.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::seed::{CollectionSeed, EntitySeed};

    fn entity(name: &str) -> EntitySeed {
        EntitySeed {
            name: name.to_string(),
            external_id: None,
            description: None,
            performs: Vec::new(),
            part_of: Vec::new(),
            connects_to: Vec::new(),
        }
    }

    fn seed() -> GraphSeed {
        GraphSeed {
            collections: vec![CollectionSeed {
                id: "jet-engine-v1".into(),
                name: "Jet Engine".into(),
                subject: Some("Aerospace".into()),
                entities: vec![
                    EntitySeed {
                        description: Some("Chamber where fuel ignites.".into()),
                        performs: vec!["Fuel Burning".into()],
                        part_of: vec!["Combustion".into()],
                        connects_to: vec!["Turbine Blades".into(), "Carburetor".into()],
                        ..entity("Combustion Canister")
                    },
                    EntitySeed {
                        performs: vec!["Energy Extraction".into()],
                        ..entity("Turbine Blades")
                    },
                ],
            }],
            entities: vec![entity("Divider")],
            functions: Vec::new(),
            processes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_from_seed_builds_context() {
        let store = InMemoryGraphStore::from_seed(&seed());

        let context = store
            .entity_context("Combustion Canister", Some("jet-engine-v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.functions, vec!["Fuel Burning"]);
        assert_eq!(context.processes, vec!["Combustion"]);
        assert_eq!(context.connects_to, vec!["Turbine Blades"]);
        assert_eq!(context.collection_id.as_deref(), Some("jet-engine-v1"));

        assert!(store.entity_context("Combustion Canister", Some("v8")).await.unwrap().is_none());
        assert!(store.entity_context("Divider", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let first = store.load(&seed()).await;
        assert_eq!(first.entities, 3);
        assert_eq!(first.skipped_links, 1);
        assert_eq!(first.relations, 4);

        let second = store.load(&seed()).await;
        assert_eq!(second.relations, 0);
        assert_eq!(store.entity_count().await, 3);
    }

    #[tokio::test]
    async fn test_with_entities_serves_descriptions() {
        let store = InMemoryGraphStore::with_entities(vec![
            Entity::new("Fan")
                .with_description("Draws air into the engine.")
                .in_collection("jet-engine-v1"),
        ]);

        let context = store.entity_context("Fan", None).await.unwrap().unwrap();
        assert_eq!(context.description.as_deref(), Some("Draws air into the engine."));
        assert!(context.functions.is_empty());
        assert!(store.labels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_label_owners() {
        let store = InMemoryGraphStore::from_seed(&seed());
        let owners = store.label_owners(&Label::process("Combustion")).await.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].name, "Combustion Canister");

        assert!(store.label_owners(&Label::function("Combustion")).await.unwrap().is_empty());
        assert_eq!(store.labels().await.unwrap().len(), 3);
    }
}
