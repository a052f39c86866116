//! Deterministic embedder that needs no network
//!
//! Hashes lowercase word tokens into a fixed number of buckets and
//! L2-normalizes the counts. Texts sharing words land close together, which
//! is enough for tests and offline demos.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::traits::Embedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        text_to_vec(text, self.dimensions)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(Error::EmbeddingFailed(
                "embedder configured with zero dimensions".to_string(),
            ));
        }
        Ok(self.vectorize(text))
    }
}

fn text_to_vec(text: &str, dims: usize) -> Vec<f32> {
    let mut vec = vec![0.0; dims];
    if dims == 0 {
        return vec;
    }

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let idx = (fnv1a(&token.to_lowercase()) % dims as u64) as usize;
        vec[idx] += 1.0;
    }

    // Normalize
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

/// 64-bit FNV-1a, stable across platforms and releases
fn fnv1a(token: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    token
        .bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.dimensions(), 64);
        let a = embedder.embed("Where does combustion happen?").await.unwrap();
        let b = embedder.embed("where does COMBUSTION happen").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.vectorize("combustion chamber fuel");
        let close = embedder.vectorize("fuel burns in the combustion chamber");
        let far = embedder.vectorize("panel screws");

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_blank_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8);
        assert_eq!(embedder.embed("  ").await.unwrap(), vec![0.0; 8]);
        assert!(HashEmbedder::new(0).embed("x").await.is_err());
    }

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(fnv1a(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
    }
}
