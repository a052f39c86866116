//! Ranked result shapes shared by the dense branch, the graph branch and fusion

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Passage / hit metadata (scoping tags, provenance)
pub type Metadata = BTreeMap<String, String>;

/// Metadata key marking where a hit came from
pub const SOURCE_KEY: &str = "source";
/// `source` value carried by graph-derived hits
pub const GRAPH_SOURCE: &str = "graph";
/// Metadata key holding the canonical entity name of a graph hit
pub const ENTITY_NAME_KEY: &str = "entity_name";
/// Metadata key used to scope passages and graph hits to one collection
pub const COLLECTION_KEY: &str = "collection_id";
/// Metadata key used to scope passages to one scene of a model
pub const SCENE_KEY: &str = "scene";

/// Native score given to every graph hit; graph facts count as a perfect match
pub const GRAPH_HIT_SCORE: f32 = 1.0;

/// Prefix of synthesized graph hit ids
pub const GRAPH_ID_PREFIX: &str = "graph::";

/// A passage returned by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageHit {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Cosine similarity in [-1, 1], higher is better
    pub score: f32,
}

impl PassageHit {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            score,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A stored passage row with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl PassageRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            embedding,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn to_hit(&self, score: f32) -> PassageHit {
        PassageHit {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            score,
        }
    }
}

/// A pseudo-result carrying one graph-derived fact snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl GraphHit {
    /// Build the hit for an entity's fact snippet
    pub fn new(entity_name: &str, snippet: impl Into<String>, collection_id: Option<&str>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), GRAPH_SOURCE.to_string());
        metadata.insert(ENTITY_NAME_KEY.to_string(), entity_name.to_string());
        if let Some(collection_id) = collection_id {
            metadata.insert(COLLECTION_KEY.to_string(), collection_id.to_string());
        }

        Self {
            id: format!("{}{}", GRAPH_ID_PREFIX, entity_name),
            text: snippet.into(),
            metadata,
            score: GRAPH_HIT_SCORE,
        }
    }

    pub fn entity_name(&self) -> Option<&str> {
        self.metadata.get(ENTITY_NAME_KEY).map(String::as_str)
    }
}

/// A passage or graph hit annotated with its combined RRF score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub fusion_score: f64,
}

impl FusedResult {
    /// Whether this entry was synthesized from the graph
    pub fn is_graph_sourced(&self) -> bool {
        is_graph_sourced(&self.metadata)
    }
}

pub fn is_graph_sourced(metadata: &Metadata) -> bool {
    metadata.get(SOURCE_KEY).map(String::as_str) == Some(GRAPH_SOURCE)
}

/// Exact-match metadata filters, AND-ed together.
///
/// A filter whose value is `None` is kept but ignored, so callers can pass
/// optional request fields straight through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    fields: BTreeMap<String, Option<String>>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.fields.insert(key.into(), value.map(Into::into));
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        self.fields.insert(key.into(), value);
    }

    /// Filters that actually constrain the result
    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.active()
            .all(|(key, value)| metadata.get(key).map(String::as_str) == Some(value))
    }
}
