//! Embedding Service: deterministic, offline vector representations of
//! code text, used by the Retriever's semantic-similarity signal.
//!
//! The default and only bundled implementation, [`HashingEmbedder`], uses
//! feature hashing (the "hashing trick") rather than a learned model: no
//! network call, no model weights to ship, fully reproducible across
//! machines. `EmbeddingVector::cosine_similarity` assumes L2-normalized
//! components, so every embedder must normalize before returning.

use crate::object_id::ObjectId;
use crate::types::EmbeddingVector;

/// Something that can turn code text into a fixed-dimension embedding.
pub trait EmbeddingService {
    /// Embeds `text` as the representation of `target_id`.
    fn embed(&self, target_id: ObjectId, text: &str) -> EmbeddingVector;

    /// The fixed dimension every vector this service produces will have.
    fn dimension(&self) -> usize;
}

/// Deterministic feature-hashing embedder. Each token is hashed into one
/// of `dimension` buckets; the hash's top bit picks a +1/-1 sign (the
/// standard hashing-trick construction), and the result is L2-normalized.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }
}

impl EmbeddingService for HashingEmbedder {
    fn embed(&self, target_id: ObjectId, text: &str) -> EmbeddingVector {
        let mut components = vec![0f32; self.dimension];

        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as usize % self.dimension;
            let sign = if bytes[8] & 1 == 1 { 1.0 } else { -1.0 };
            components[bucket] += sign;
        }

        normalize(&mut components);

        EmbeddingVector { target_id, components }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn normalize(components: &mut [f32]) {
    let norm: f32 = components.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for c in components.iter_mut() {
            *c /= norm;
        }
    }
}

/// Splits text into lowercase alphanumeric/underscore tokens of length >= 2,
/// matching the tokenization the Retriever uses for its term-match fallback
/// so both signals key off the same vocabulary.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}
