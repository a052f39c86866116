//! Entity graph domain types

use std::fmt;

use serde::{Deserialize, Serialize};

/// A part of a modeled system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical name, unique within its collection
    pub name: String,
    /// Identifier used by the rendering side (e.g. a scene object id)
    pub external_id: Option<String>,
    pub description: Option<String>,
    pub collection_id: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_id: None,
            description: None,
            collection_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn in_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    /// Whether the entity is visible under `scope`.
    ///
    /// No scope sees everything.
    pub fn in_scope(&self, scope: Option<&str>) -> bool {
        match scope {
            Some(scope) => self.collection_id.as_deref() == Some(scope),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    /// Linked from entities by `PERFORMS`
    Function,
    /// Linked from entities by `PART_OF`
    Process,
}

impl LabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Function => "function",
            LabelKind::Process => "process",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LabelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(LabelKind::Function),
            "process" => Ok(LabelKind::Process),
            other => Err(format!("unknown label kind: {}", other)),
        }
    }
}

/// A Function or Process node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub kind: LabelKind,
}

impl Label {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LabelKind::Function,
        }
    }

    pub fn process(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LabelKind::Process,
        }
    }
}

/// Facts about one entity, as handed to the prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityContext {
    pub name: String,
    pub description: Option<String>,
    pub functions: Vec<String>,
    pub processes: Vec<String>,
    pub connects_to: Vec<String>,
    pub collection_id: Option<String>,
}

impl EntityContext {
    /// Sort, de-duplicate and drop blank names from every relation list
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.functions,
            &mut self.processes,
            &mut self.connects_to,
        ] {
            list.retain(|name| !name.trim().is_empty());
            list.sort();
            list.dedup();
        }
        self.description = self.description.filter(|d| !d.trim().is_empty());
        self
    }

    /// One-line fact summary
    pub fn snippet(&self) -> String {
        format!(
            "Entity: {}. Functions: {}. Processes: {}. Connects to: {}. Description: {}",
            self.name,
            join_or_none(&self.functions),
            join_or_none(&self.processes),
            join_or_none(&self.connects_to),
            self.description.as_deref().unwrap_or("none"),
        )
    }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
