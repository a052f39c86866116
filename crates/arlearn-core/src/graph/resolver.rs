//! Tolerant entity name resolution
//!
//! Callers rarely spell a part the way the graph does: "dividers" for
//! "Divider", a scene object id instead of a name, or just "canister". The
//! resolver ranks every plausible candidate by how it matched and returns the
//! best canonical name.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;

use super::entity::Entity;
use super::store::GraphStore;

/// How a candidate matched, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    PluralFlip,
    ExternalId,
    Substring,
}

/// Normalized forms of a raw entity reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameProbe {
    normalized: String,
    flipped: String,
}

impl NameProbe {
    /// `None` for blank input
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        // One-step singular/plural toggle, not real morphology
        let flipped = match normalized.strip_suffix('s') {
            Some(stem) => stem.to_string(),
            None => format!("{}s", normalized),
        };

        Some(Self {
            normalized,
            flipped,
        })
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn flipped(&self) -> &str {
        &self.flipped
    }

    /// Best tier at which `entity` matches, if any
    pub fn tier(&self, entity: &Entity) -> Option<MatchTier> {
        let name = entity.name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }

        if name == self.normalized {
            return Some(MatchTier::Exact);
        }
        if !self.flipped.is_empty() && name == self.flipped {
            return Some(MatchTier::PluralFlip);
        }
        let external_match = entity
            .external_id
            .as_deref()
            .map(|id| id.trim().to_lowercase() == self.normalized)
            .unwrap_or(false);
        if external_match {
            return Some(MatchTier::ExternalId);
        }
        if name.contains(&self.normalized) || self.normalized.contains(&name) {
            return Some(MatchTier::Substring);
        }
        None
    }
}

/// Maps noisy names onto canonical graph entities
#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn GraphStore>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Canonical name for `raw_name`, or `None` when nothing matches
    pub async fn resolve(&self, raw_name: &str, scope: Option<&str>) -> Result<Option<String>> {
        Ok(self
            .resolve_entity(raw_name, scope)
            .await?
            .map(|(entity, _)| entity.name))
    }

    /// Best matching entity together with the tier it matched at.
    ///
    /// Within a tier the shortest name wins, then name order.
    pub async fn resolve_entity(
        &self,
        raw_name: &str,
        scope: Option<&str>,
    ) -> Result<Option<(Entity, MatchTier)>> {
        let Some(probe) = NameProbe::new(raw_name) else {
            return Ok(None);
        };

        let candidates = self.store.entity_candidates(&probe, scope).await?;
        let candidate_count = candidates.len();

        let best = candidates
            .into_iter()
            .filter_map(|entity| probe.tier(&entity).map(|tier| (entity, tier)))
            .min_by(|(a, a_tier), (b, b_tier)| {
                a_tier
                    .cmp(b_tier)
                    .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
                    .then_with(|| a.name.cmp(&b.name))
            });

        debug!(
            raw = raw_name,
            scope = scope.unwrap_or("*"),
            candidates = candidate_count,
            resolved = best.as_ref().map(|(e, _)| e.name.as_str()).unwrap_or(""),
            "Resolved entity name"
        );

        Ok(best)
    }
}
