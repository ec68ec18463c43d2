use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use tracing::warn;

use chronicle_common::sha256_hex;
use llm_client::providers::OpenAi;

const EMBEDDING_CACHE_CAPACITY: usize = 2048;

/// Prefix applied to retrieval queries; dataset chunks were indexed bare.
const QUERY_PREFIX: &str = "query: ";

// --- TextEmbedder trait ---

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a text into a fixed-dimension vector. Never fails: embedding
    /// errors degrade to a zero vector so callers can keep going.
    async fn encode(&self, text: &str, normalize: bool, add_query_prefix: bool) -> Vec<f32>;

    fn dim(&self) -> usize;
}

/// Wrapper around an OpenAI-compatible embeddings endpoint with a
/// sha256-keyed LRU cache.
pub struct Embedder {
    client: OpenAi,
    dim: usize,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Embedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, dim: usize) -> Self {
        let client = OpenAi::new(api_key, model)
            .with_base_url(base_url)
            .with_embedding_model(model);
        let capacity = NonZeroUsize::new(EMBEDDING_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { client, dim, cache: Mutex::new(LruCache::new(capacity)) }
    }
}

#[async_trait]
impl TextEmbedder for Embedder {
    async fn encode(&self, text: &str, normalize: bool, add_query_prefix: bool) -> Vec<f32> {
        let input = if add_query_prefix {
            format!("{QUERY_PREFIX}{text}")
        } else {
            text.to_string()
        };
        let key = sha256_hex(&format!("{normalize}:{input}"));

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let mut vector = match self.client.embed(input).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding failed, returning zero vector");
                return vec![0.0; self.dim];
            }
        };
        if vector.len() != self.dim {
            warn!(got = vector.len(), want = self.dim, "unexpected embedding dimension");
            vector.resize(self.dim, 0.0);
        }
        if normalize {
            normalize_in_place(&mut vector);
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, vector.clone());
        }
        vector
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

pub fn normalize_in_place(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na < f64::EPSILON || nb < f64::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

/// Render a vector as a pgvector literal: `[v0,v1,…]`.
pub fn pgvector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_yields_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_in_place(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.2, -0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn pgvector_literal_format() {
        assert_eq!(pgvector_literal(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
        assert_eq!(pgvector_literal(&[]), "[]");
    }
}
