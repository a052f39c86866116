//! Graph seed documents
//!
//! A seed is a JSON document describing collections, their entities and the
//! Function/Process labels those entities link to. Loading is an upsert:
//! re-seeding the same document leaves the graph unchanged.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::entity::Label;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSeed {
    #[serde(default)]
    pub collections: Vec<CollectionSeed>,
    /// Entities that belong to no collection
    #[serde(default)]
    pub entities: Vec<EntitySeed>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub processes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntitySeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeed {
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Function labels (`PERFORMS`)
    #[serde(default)]
    pub performs: Vec<String>,
    /// Process labels (`PART_OF`)
    #[serde(default)]
    pub part_of: Vec<String>,
    /// Neighbor entity names in the same collection (`CONNECTS_TO`)
    #[serde(default)]
    pub connects_to: Vec<String>,
}

/// Counts reported after applying a seed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub collections: usize,
    pub entities: usize,
    pub labels: usize,
    pub relations: usize,
    /// `CONNECTS_TO` targets that did not exist
    pub skipped_links: usize,
}

impl GraphSeed {
    pub fn from_json(json: &str) -> Result<Self> {
        let seed: GraphSeed = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid graph seed: {}", e)))?;
        seed.validate()?;
        Ok(seed)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Reject blank names and blank collection ids
    pub fn validate(&self) -> Result<()> {
        for collection in &self.collections {
            if collection.id.trim().is_empty() {
                return Err(Error::InvalidInput("collection id must not be blank".into()));
            }
        }
        for (scope, entity) in self.scoped_entities() {
            if entity.name.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "entity with blank name in {}",
                    scope.unwrap_or("unscoped entities")
                )));
            }
        }
        Ok(())
    }

    /// Every entity paired with its collection id
    pub fn scoped_entities(&self) -> impl Iterator<Item = (Option<&str>, &EntitySeed)> {
        self.collections
            .iter()
            .flat_map(|c| c.entities.iter().map(move |e| (Some(c.id.as_str()), e)))
            .chain(self.entities.iter().map(|e| (None, e)))
    }

    /// Declared labels plus any label an entity refers to
    pub fn all_labels(&self) -> BTreeSet<Label> {
        let mut labels: BTreeSet<Label> = self
            .functions
            .iter()
            .map(Label::function)
            .chain(self.processes.iter().map(Label::process))
            .collect();

        for (_, entity) in self.scoped_entities() {
            labels.extend(entity.performs.iter().map(Label::function));
            labels.extend(entity.part_of.iter().map(Label::process));
        }

        labels.retain(|label| !label.name.trim().is_empty());
        labels
    }
}

impl EntitySeed {
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.performs
            .iter()
            .map(Label::function)
            .chain(self.part_of.iter().map(Label::process))
            .filter(|label| !label.name.trim().is_empty())
    }
}
