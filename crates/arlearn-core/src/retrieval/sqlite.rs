//! SQLite implementation of the passage index
//!
//! Embeddings are stored as JSON. Metadata filters run in SQL through
//! `json_extract`; similarity is computed in Rust over the filtered rows.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::error::{Error, Result, StoreKind};

use super::dense::{VectorStore, cosine_similarity, sort_by_score_desc};
use super::types::{Metadata, PassageHit, PassageRecord, SearchFilters};

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a passage
    pub async fn upsert(&self, record: &PassageRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(Error::InvalidInput(format!(
                "passage '{}' has an empty embedding",
                record.id
            )));
        }

        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize metadata: {}", e)))?;
        let embedding_json = serde_json::to_string(&record.embedding)
            .map_err(|e| Error::Other(format!("Failed to serialize embedding: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO passages (id, text, metadata, embedding, dimensions, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                dimensions = excluded.dimensions
            "#,
        )
        .bind(&record.id)
        .bind(&record.text)
        .bind(&metadata_json)
        .bind(&embedding_json)
        .bind(record.embedding.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(passage_id = %record.id, "Passage saved");
        Ok(())
    }

    /// Number of stored passages
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM passages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[derive(FromRow)]
struct PassageRow {
    id: String,
    text: String,
    metadata: String,
    embedding: String,
}

impl PassageRow {
    fn score_against(self, vector: &[f32]) -> Option<PassageHit> {
        let embedding: Vec<f32> = match serde_json::from_str(&self.embedding) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(passage_id = %self.id, error = %e, "Skipping passage with corrupt embedding");
                return None;
            }
        };
        let metadata: Metadata = serde_json::from_str(&self.metadata).unwrap_or_else(|e| {
            warn!(passage_id = %self.id, error = %e, "Ignoring corrupt passage metadata");
            Metadata::new()
        });

        Some(PassageHit {
            score: cosine_similarity(vector, &embedding),
            id: self.id,
            text: self.text,
            metadata,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn nearest(
        &self,
        vector: &[f32],
        top_n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<PassageHit>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, text, metadata, embedding FROM passages WHERE dimensions = ",
        );
        query.push_bind(vector.len() as i64);

        for (key, value) in filters.active() {
            query.push(" AND json_extract(metadata, ");
            query.push_bind(json_path(key));
            query.push(") = ");
            query.push_bind(value.to_string());
        }

        let rows: Vec<PassageRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::unavailable(StoreKind::Vector, e.to_string()))?;

        let mut hits: Vec<PassageHit> = rows
            .into_iter()
            .filter_map(|row| row.score_against(vector))
            .collect();

        sort_by_score_desc(&mut hits);
        hits.truncate(top_n);
        Ok(hits)
    }
}

/// JSON path selecting a top-level key, quoted so any key text is accepted
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}
