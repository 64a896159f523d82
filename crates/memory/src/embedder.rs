//! Local embedders.
//!
//! [`HashingEmbedder`] is a deterministic bag-of-words feature hasher that
//! needs no network; [`NoEmbedder`] turns the embedding tier off.
//! The model-backed embedder lives in `switchyard-llm`.

use async_trait::async_trait;
use switchyard_core::{Embedder, MemoryError};

/// Signed feature hashing over lowercase word tokens, L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Synchronous core, shared by the trait impl and tests.
    pub fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        let mut any = false;

        for token in tokens(text) {
            let h = fnv1a(token.as_bytes());
            let index = (h % self.dims as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
            any = true;
        }

        if !any {
            return None;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Some(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.embed_text(text)
            .ok_or_else(|| MemoryError::EmbeddingFailed("text has no indexable tokens".into()))
    }
}

/// Always unavailable; similarity search then returns nothing.
#[derive(Debug, Clone, Default)]
pub struct NoEmbedder;

#[async_trait]
impl Embedder for NoEmbedder {
    fn name(&self) -> &str {
        "none"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Err(MemoryError::EmbeddingUnavailable("embeddings are disabled".into()))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ *b as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn deterministic_and_normalised() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_text("Weather in Lisbon").unwrap();
        let b = e.embed_text("weather in lisbon").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_texts_are_closer_than_unrelated() {
        let e = HashingEmbedder::default();
        let q = e.embed_text("rain forecast for Lisbon").unwrap();
        let near = e.embed_text("Lisbon rain forecast tomorrow").unwrap();
        let far = e.embed_text("vegetarian restaurants downtown").unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn empty_text_fails_and_none_is_unavailable() {
        assert!(HashingEmbedder::default().embed("  ?! ").await.is_err());
        let err = NoEmbedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));
    }
}
