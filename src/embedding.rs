//! Embeddings via Feature Hashing
//!
//! Maps text to fixed-length vectors for semantic search. The default
//! implementation uses the hashing trick to produce fixed-size vectors
//! without maintaining a vocabulary map, so embeddings are stable: the
//! same text always produces the same vector regardless of what other
//! documents exist.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Default dimensionality of the embedding vectors.
pub const EMBEDDING_DIM: usize = 256;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),
}

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Maps text to fixed-length vectors. All vectors produced by one
/// embedder share the same dimensionality.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embed several texts, order-preserving. Equivalent to mapping
    /// `embed` over each element.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Term-frequency feature-hash embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Hash a token to a bucket index in `[0, dimension)`.
    fn hash_token(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimension
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Each token is hashed to a fixed bucket; the resulting
    /// term-frequency vector is L2-normalized. Pure function — the same
    /// input always produces the same output.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut tf = vec![0.0f32; self.dimension];

        if tokens.is_empty() {
            return Ok(tf);
        }

        for token in &tokens {
            let idx = self.hash_token(token);
            tf[idx] += 1.0;
        }

        // L2 normalize
        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }

        Ok(tf)
    }
}

/// Cosine similarity between two embeddings. Zero for mismatched or
/// zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
