//! Graph fact fetching and entity inference
//!
//! The graph is advisory: every store failure is caught here and reported as
//! [`GraphLookup::Unavailable`], never as an error.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

use super::entity::{Entity, EntityContext, Label};
use super::resolver::EntityResolver;
use super::store::GraphStore;

/// Outcome of a graph query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum GraphLookup<T> {
    Found(T),
    NotFound,
    /// The store could not be queried; carries the reason
    Unavailable(String),
}

impl<T> GraphLookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            GraphLookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_found(&self) -> Option<&T> {
        match self {
            GraphLookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, GraphLookup::Found(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, GraphLookup::Unavailable(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GraphLookup<U> {
        match self {
            GraphLookup::Found(value) => GraphLookup::Found(f(value)),
            GraphLookup::NotFound => GraphLookup::NotFound,
            GraphLookup::Unavailable(reason) => GraphLookup::Unavailable(reason),
        }
    }

    /// Status without the payload
    pub fn status(&self) -> GraphLookup<()> {
        match self {
            GraphLookup::Found(_) => GraphLookup::Found(()),
            GraphLookup::NotFound => GraphLookup::NotFound,
            GraphLookup::Unavailable(reason) => GraphLookup::Unavailable(reason.clone()),
        }
    }

    fn absorb(result: Result<Option<T>>, operation: &str) -> Self {
        match result {
            Ok(Some(value)) => GraphLookup::Found(value),
            Ok(None) => GraphLookup::NotFound,
            Err(e) => {
                warn!(operation = operation, error = %e, "Graph store query failed");
                GraphLookup::Unavailable(e.to_string())
            }
        }
    }
}

/// Fetches entity facts and infers entities from free text
#[derive(Clone)]
pub struct GraphFactFetcher {
    store: Arc<dyn GraphStore>,
    resolver: EntityResolver,
}

impl GraphFactFetcher {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        let resolver = EntityResolver::new(store.clone());
        Self { store, resolver }
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Resolve a noisy name, absorbing store failures
    pub async fn resolve(&self, raw_name: &str, scope: Option<&str>) -> GraphLookup<String> {
        GraphLookup::absorb(self.resolver.resolve(raw_name, scope).await, "resolve")
    }

    /// Description and relations of a canonical entity
    pub async fn fetch_context(
        &self,
        entity_name: &str,
        scope: Option<&str>,
    ) -> GraphLookup<EntityContext> {
        GraphLookup::absorb(
            self.store.entity_context(entity_name, scope).await,
            "entity_context",
        )
    }

    /// Entity owning the longest Function/Process label mentioned in `free_text`
    pub async fn infer_entity(&self, free_text: &str, scope: Option<&str>) -> GraphLookup<String> {
        GraphLookup::absorb(self.infer_owner(free_text, scope).await, "infer_entity")
            .map(|entity| entity.name)
    }

    /// The graph branch: resolve `hint` if given, otherwise infer an entity
    /// from `question`, then fetch its facts.
    ///
    /// A hint that resolves to nothing falls back to inference.
    pub async fn resolve_and_fetch(
        &self,
        hint: Option<&str>,
        question: &str,
        scope: Option<&str>,
    ) -> GraphLookup<EntityContext> {
        if let Some(hint) = hint {
            match GraphLookup::absorb(self.resolver.resolve_entity(hint, scope).await, "resolve") {
                GraphLookup::Found((entity, _)) => return self.fetch_entity(&entity).await,
                GraphLookup::Unavailable(reason) => return GraphLookup::Unavailable(reason),
                GraphLookup::NotFound => {
                    debug!(hint = hint, "Entity hint did not resolve, inferring from question");
                }
            }
        }

        match GraphLookup::absorb(self.infer_owner(question, scope).await, "infer_entity") {
            GraphLookup::Found(owner) => self.fetch_entity(&owner).await,
            GraphLookup::NotFound => GraphLookup::NotFound,
            GraphLookup::Unavailable(reason) => GraphLookup::Unavailable(reason),
        }
    }

    /// Facts of exactly this entity, looked up in its own collection, which
    /// may lie outside the request scope
    async fn fetch_entity(&self, entity: &Entity) -> GraphLookup<EntityContext> {
        self.fetch_context(&entity.name, entity.collection_id.as_deref())
            .await
    }

    async fn infer_owner(&self, free_text: &str, scope: Option<&str>) -> Result<Option<Entity>> {
        let text = free_text.to_lowercase();
        if text.trim().is_empty() {
            return Ok(None);
        }

        let labels = self.store.labels().await?;
        let Some(label) = longest_mentioned_label(labels, &text) else {
            return Ok(None);
        };

        let owners = self.store.label_owners(&label).await?;
        let owner = owners.into_iter().min_by_key(|entity| {
            (
                !entity.in_scope(scope),
                entity.name.chars().count(),
                entity.name.clone(),
            )
        });

        debug!(
            label = %label.name,
            kind = %label.kind,
            owner = owner.as_ref().map(|e| e.name.as_str()).unwrap_or(""),
            "Inferred entity from question"
        );

        Ok(owner)
    }
}

/// Longest label whose name occurs in `text` (already lowercase); ties go to
/// name order.
fn longest_mentioned_label(labels: Vec<Label>, text: &str) -> Option<Label> {
    labels
        .into_iter()
        .filter(|label| {
            let name = label.name.trim().to_lowercase();
            !name.is_empty() && text.contains(&name)
        })
        .min_by_key(|label| (Reverse(label.name.chars().count()), label.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::{Error, StoreKind};
    use crate::graph::memory::InMemoryGraphStore;
    use crate::graph::resolver::NameProbe;
    use crate::graph::seed::GraphSeed;

    fn fetcher() -> GraphFactFetcher {
        let seed = GraphSeed::from_json(
            r#"{
            "collections": [
                {"id": "jet-engine-v1", "name": "Jet Engine", "entities": [
                    {"name": "Combustion Canister", "external_id": "canister_turbine_011",
                     "description": "Chamber where fuel mixes with compressed air and ignites.",
                     "performs": ["Fuel Burning"], "part_of": ["Combustion"],
                     "connects_to": ["Turbine Blades"]},
                    {"name": "Turbine Blades", "performs": ["Energy Extraction"]},
                    {"name": "Fuel and Oil Lines", "performs": ["Fuel Transport", "Oil Transport"]}
                ]},
                {"id": "v8-engine", "name": "V8", "entities": [
                    {"name": "Cylinder", "part_of": ["Combustion"]}
                ]}
            ],
            "entities": [{"name": "Divider", "performs": ["Flow Guidance"]}],
            "processes": ["Lubrication"]
        }"#,
        )
        .unwrap();
        GraphFactFetcher::new(Arc::new(InMemoryGraphStore::from_seed(&seed)))
    }

    struct DownGraph;

    #[async_trait]
    impl GraphStore for DownGraph {
        async fn entity_candidates(&self, _: &NameProbe, _: Option<&str>) -> Result<Vec<Entity>> {
            Err(Error::unavailable(StoreKind::Graph, "connection refused"))
        }
        async fn entity_context(&self, _: &str, _: Option<&str>) -> Result<Option<EntityContext>> {
            Err(Error::unavailable(StoreKind::Graph, "connection refused"))
        }
        async fn labels(&self) -> Result<Vec<Label>> {
            Err(Error::unavailable(StoreKind::Graph, "connection refused"))
        }
        async fn label_owners(&self, _: &Label) -> Result<Vec<Entity>> {
            Err(Error::unavailable(StoreKind::Graph, "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_infer_from_process_keyword() {
        let fetcher = fetcher();
        let inferred = fetcher
            .infer_entity("Where does combustion happen?", Some("jet-engine-v1"))
            .await;
        assert_eq!(inferred, GraphLookup::Found("Combustion Canister".to_string()));

        // Same label, other collection
        let inferred = fetcher.infer_entity("where does combustion happen?", Some("v8-engine")).await;
        assert_eq!(inferred, GraphLookup::Found("Cylinder".to_string()));
    }

    #[tokio::test]
    async fn test_infer_prefers_longest_label() {
        let fetcher = fetcher();
        // "oil transport" outranks "fuel burning"
        let inferred = fetcher
            .infer_entity("is fuel burning related to oil transport?", None)
            .await;
        assert_eq!(inferred, GraphLookup::Found("Fuel and Oil Lines".to_string()));

        let inferred = fetcher.infer_entity("fuel burning", None).await;
        assert_eq!(inferred, GraphLookup::Found("Combustion Canister".to_string()));
    }

    #[tokio::test]
    async fn test_infer_not_found() {
        let fetcher = fetcher();
        assert_eq!(fetcher.infer_entity("what color is it?", None).await, GraphLookup::NotFound);
        // Label exists but nothing owns it
        assert_eq!(fetcher.infer_entity("how does lubrication work", None).await, GraphLookup::NotFound);
        assert_eq!(fetcher.infer_entity("   ", None).await, GraphLookup::NotFound);
    }

    #[tokio::test]
    async fn test_infer_falls_back_outside_scope() {
        let fetcher = fetcher();
        let inferred = fetcher.infer_entity("flow guidance", Some("jet-engine-v1")).await;
        assert_eq!(inferred, GraphLookup::Found("Divider".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_and_fetch_uses_hint() {
        let fetcher = fetcher();
        let context = fetcher
            .resolve_and_fetch(Some("turbine blade"), "tell me about this", Some("jet-engine-v1"))
            .await
            .found()
            .unwrap();
        assert_eq!(context.name, "Turbine Blades");
        assert_eq!(context.functions, vec!["Energy Extraction"]);
    }

    #[tokio::test]
    async fn test_unresolved_hint_falls_back_to_inference() {
        let fetcher = fetcher();
        let context = fetcher
            .resolve_and_fetch(Some("carburetor"), "where does combustion happen?", Some("jet-engine-v1"))
            .await
            .found()
            .unwrap();
        assert_eq!(context.name, "Combustion Canister");
        assert!(context.snippet().contains("Connects to: Turbine Blades"));
    }

    #[tokio::test]
    async fn test_store_failure_is_absorbed() {
        let fetcher = GraphFactFetcher::new(Arc::new(DownGraph));

        assert!(fetcher.resolve("Fan", None).await.is_unavailable());
        assert!(fetcher.fetch_context("Fan", None).await.is_unavailable());
        assert!(fetcher.infer_entity("combustion", None).await.is_unavailable());
        assert!(
            fetcher
                .resolve_and_fetch(Some("Fan"), "combustion", None)
                .await
                .is_unavailable()
        );
    }

    #[tokio::test]
    async fn test_hint_fetches_the_resolved_entity() {
        let seed = GraphSeed::from_json(
            r#"{
            "collections": [
                {"id": "a-front", "name": "Front", "entities": [
                    {"name": "Fan", "external_id": "fan_front_001", "description": "Front intake fan."}
                ]},
                {"id": "b-rear", "name": "Rear", "entities": [
                    {"name": "Fan", "external_id": "fan_rear_002", "description": "Rear cooling fan."}
                ]}
            ]
        }"#,
        )
        .unwrap();
        let fetcher = GraphFactFetcher::new(Arc::new(InMemoryGraphStore::from_seed(&seed)));

        let context = fetcher
            .resolve_and_fetch(Some("fan_rear_002"), "what is this?", None)
            .await
            .found()
            .unwrap();
        assert_eq!(context.collection_id.as_deref(), Some("b-rear"));
        assert_eq!(context.description.as_deref(), Some("Rear cooling fan."));
    }

    #[test]
    fn test_lookup_helpers() {
        let found = GraphLookup::Found(2);
        assert_eq!(found.as_found(), Some(&2));
        assert!(found.is_found());
        assert_eq!(found.clone().map(|v| v * 2), GraphLookup::Found(4));
        assert_eq!(found.status(), GraphLookup::Found(()));
        assert_eq!(GraphLookup::<i32>::NotFound.found(), None);
        assert!(!GraphLookup::<i32>::NotFound.is_found());

        let down = GraphLookup::<i32>::Unavailable("x".into());
        assert!(down.is_unavailable());
        assert_eq!(down.as_found(), None);
    }
}
