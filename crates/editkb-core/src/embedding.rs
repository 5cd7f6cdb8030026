//! Embedding encoder trait and vector utilities.
//!
//! Defines the [`Encoder`] trait that all embedding backends implement,
//! the default [`HashingEncoder`], and pure helper functions for
//! similarity computation.
//!
//! The hashing encoder needs no model files and no network: it maps
//! unigrams and adjacent bigrams into a fixed number of signed buckets
//! and L2-normalizes the result, so identical text always produces an
//! identical vector on every platform.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Default dimensionality of [`HashingEncoder`].
pub const DEFAULT_DIMS: usize = 512;

/// Trait for embedding encoders.
///
/// Implementations must be deterministic: the cache stores vectors keyed
/// by [`model_name`](Encoder::model_name) and [`dims`](Encoder::dims) and
/// reuses them across runs.
pub trait Encoder: Send + Sync {
    /// Returns the encoder identifier recorded in the cache manifest.
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Encode text into a unit-length vector of length [`dims`](Encoder::dims).
    ///
    /// Text with no usable tokens yields the zero vector.
    fn encode(&self, text: &str) -> Vec<f32>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "into", "is", "it", "its", "of", "on", "or", "that", "the", "their", "then", "there", "these",
    "this", "to", "was", "were", "will", "with",
];

/// Feature-hashing encoder over unigrams and adjacent bigrams.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dims: usize,
}

impl HashingEncoder {
    pub const MODEL_NAME: &'static str = "hashing-v1";

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

impl Encoder for HashingEncoder {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for tok in &tokens {
            *counts.entry(tok.clone()).or_default() += 1;
        }
        for pair in tokens.windows(2) {
            *counts.entry(format!("{} {}", pair[0], pair[1])).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dims];
        for (feature, count) in &counts {
            let (bucket, sign) = hash_feature(feature, self.dims);
            let weight = 1.0 + (*count as f32).ln();
            vector[bucket] += sign * weight;
        }
        normalize(&mut vector);
        vector
    }
}

/// Lowercase alphanumeric tokens with stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Bucket from the low 63 bits of the digest prefix, sign from the top bit.
fn hash_feature(feature: &str, dims: usize) -> (usize, f32) {
    let digest = Sha256::digest(feature.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let h = u64::from_be_bytes(prefix);
    let bucket = ((h & (u64::MAX >> 1)) % dims as u64) as usize;
    let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
    (bucket, sign)
}

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Dot product. Returns `0.0` for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
