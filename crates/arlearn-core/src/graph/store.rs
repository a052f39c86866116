//! Read interface over the entity graph

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{Entity, EntityContext, Label};
use super::resolver::NameProbe;

/// Read-only queries the resolver and the fact fetcher need.
///
/// `scope` restricts results to one collection; `None` searches everything.
/// Backend failures are reported as [`crate::Error::StoreUnavailable`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Every entity that matches `probe` at some tier. Ranking is left to
    /// the caller.
    async fn entity_candidates(&self, probe: &NameProbe, scope: Option<&str>)
    -> Result<Vec<Entity>>;

    /// Description and relations of the entity called exactly `name`
    async fn entity_context(&self, name: &str, scope: Option<&str>)
    -> Result<Option<EntityContext>>;

    /// All known Function and Process labels
    async fn labels(&self) -> Result<Vec<Label>>;

    /// Entities linked to `label` by `PERFORMS` or `PART_OF`
    async fn label_owners(&self, label: &Label) -> Result<Vec<Entity>>;
}
