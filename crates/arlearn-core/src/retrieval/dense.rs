//! Dense retrieval over a vector store

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{PassageHit, SearchFilters};

/// Vector index holding `{id, text, metadata, embedding}` rows
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `top_n` passages passing `filters`, scored by cosine
    /// similarity to `vector`.
    ///
    /// Connectivity and query failures are reported as
    /// [`Error::StoreUnavailable`].
    async fn nearest(
        &self,
        vector: &[f32],
        top_n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<PassageHit>>;
}

/// Validates queries and enforces ordering / size guarantees on top of a
/// [`VectorStore`].
#[derive(Clone)]
pub struct DenseRetriever {
    store: Arc<dyn VectorStore>,
    dimensions: usize,
}

impl std::fmt::Debug for DenseRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseRetriever")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl DenseRetriever {
    pub fn new(store: Arc<dyn VectorStore>, dimensions: usize) -> Self {
        Self { store, dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top-`top_n` passages most similar to `query_vector`, best first
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<PassageHit>> {
        validate_query_vector(query_vector, self.dimensions)?;

        if top_n == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.store.nearest(query_vector, top_n, filters).await?;
        sort_by_score_desc(&mut hits);
        hits.truncate(top_n);

        debug!(
            top_n = top_n,
            filters = filters.active().count(),
            results = hits.len(),
            "Dense retrieval completed"
        );

        Ok(hits)
    }
}

/// Reject vectors the index cannot be compared against
pub fn validate_query_vector(vector: &[f32], dimensions: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::InvalidQuery("query vector is empty".to_string()));
    }
    if vector.len() != dimensions {
        return Err(Error::InvalidQuery(format!(
            "query vector has {} dimensions, index expects {}",
            vector.len(),
            dimensions
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidQuery(
            "query vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Descending score order with NaN ranked below every number
pub(crate) fn score_desc(a: f32, b: f32) -> Ordering {
    let key = |score: f32| if score.is_nan() { f32::NEG_INFINITY } else { score };
    key(b).total_cmp(&key(a))
}

/// Stable descending sort, so equal scores keep their input order
pub(crate) fn sort_by_score_desc(hits: &mut [PassageHit]) {
    hits.sort_by(|a, b| score_desc(a.score, b.score));
}

/// Cosine similarity, accumulated in f64 so large components cannot
/// overflow into a NaN score
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreKind;

    /// Returns its canned rows unsorted and ignores `top_n`
    struct CannedStore(Vec<PassageHit>);

    #[async_trait]
    impl VectorStore for CannedStore {
        async fn nearest(
            &self,
            _vector: &[f32],
            _top_n: usize,
            _filters: &SearchFilters,
        ) -> Result<Vec<PassageHit>> {
            Ok(self.0.clone())
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn nearest(
            &self,
            _vector: &[f32],
            _top_n: usize,
            _filters: &SearchFilters,
        ) -> Result<Vec<PassageHit>> {
            Err(Error::unavailable(StoreKind::Vector, "connection refused"))
        }
    }

    fn retriever(rows: Vec<PassageHit>) -> DenseRetriever {
        DenseRetriever::new(Arc::new(CannedStore(rows)), 3)
    }

    #[tokio::test]
    async fn test_results_sorted_and_truncated() {
        let retriever = retriever(vec![
            PassageHit::new("low", "a", 0.1),
            PassageHit::new("high", "b", 0.9),
            PassageHit::new("mid", "c", 0.5),
        ]);

        let hits = retriever
            .search(&[1.0, 0.0, 0.0], 2, &SearchFilters::new())
            .await
            .unwrap();

        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_store_order() {
        let retriever = retriever(vec![
            PassageHit::new("first", "a", 0.5),
            PassageHit::new("second", "b", 0.5),
        ]);

        let hits = retriever
            .search(&[1.0, 0.0, 0.0], 5, &SearchFilters::new())
            .await
            .unwrap();

        assert_eq!(hits[0].id, "first");
        assert_eq!(hits[1].id, "second");
    }

    #[tokio::test]
    async fn test_wrong_dimensions_is_invalid_query() {
        let retriever = retriever(Vec::new());
        let err = retriever
            .search(&[1.0, 0.0], 3, &SearchFilters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));

        let err = retriever
            .search(&[f32::NAN, 0.0, 0.0], 3, &SearchFilters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_zero_top_n_returns_nothing() {
        let retriever = DenseRetriever::new(Arc::new(DownStore), 3);
        let hits = retriever
            .search(&[1.0, 0.0, 0.0], 0, &SearchFilters::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let retriever = DenseRetriever::new(Arc::new(DownStore), 3);
        let err = retriever
            .search(&[1.0, 0.0, 0.0], 3, &SearchFilters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_survives_large_components() {
        let big = vec![f32::MAX / 2.0, f32::MAX / 2.0, 0.0];
        let score = cosine_similarity(&big, &big);
        assert!(score.is_finite());
        assert!((score - 1.0).abs() < 0.001);

        let opposite = vec![-f32::MAX / 2.0, -f32::MAX / 2.0, 0.0];
        assert!((cosine_similarity(&big, &opposite) + 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_nan_scores_rank_last() {
        let rows: Vec<PassageHit> = (0..40)
            .map(|i| {
                let score = if i % 2 == 0 { f32::NAN } else { i as f32 / 40.0 };
                PassageHit::new(format!("d{i}"), "", score)
            })
            .collect();
        let retriever = retriever(rows);
        assert_eq!(retriever.dimensions(), 3);

        let hits = retriever
            .search(&[1.0, 0.0, 0.0], 5, &SearchFilters::new())
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["d39", "d37", "d35", "d33", "d31"]);
    }
}
