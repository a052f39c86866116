//! In-memory vector store
//!
//! Brute-force cosine scan over records held behind a `RwLock`. Used by tests,
//! demos and small corpora.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::dense::{VectorStore, cosine_similarity, sort_by_score_desc};
use super::types::{PassageHit, PassageRecord, SearchFilters};

#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    records: Arc<RwLock<Vec<PassageRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing records
    pub fn from_records(records: Vec<PassageRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Insert or replace a record by id
    pub async fn upsert(&self, record: PassageRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(Error::InvalidInput(format!(
                "passage '{}' has an empty embedding",
                record.id
            )));
        }

        let mut guard = self.records.write().await;
        match guard.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => guard.push(record),
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn nearest(
        &self,
        vector: &[f32],
        top_n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<PassageHit>> {
        let guard = self.records.read().await;
        let mut hits: Vec<PassageHit> = guard
            .iter()
            .filter(|record| record.embedding.len() == vector.len())
            .filter(|record| filters.matches(&record.metadata))
            .map(|record| record.to_hit(cosine_similarity(vector, &record.embedding)))
            .collect();

        sort_by_score_desc(&mut hits);
        hits.truncate(top_n);
        Ok(hits)
    }
}
