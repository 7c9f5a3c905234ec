//! `Embedder` implementations (§6, C1).
//!
//! The real embedding model is out of scope (§1); `HashEmbedder` is a
//! deterministic stand-in suitable for tests and for wiring the pipeline
//! end-to-end without a network call. `CachingEmbedder` wraps any
//! `Embedder` with the process-wide LRU cache required by §5 ("Embedder
//! cache: process-wide LRU (capacity ≈1000). Thread-safe; reads do not
//! block writes."), grounded on the pack's `lru`-backed memory index
//! (`danielmriley-aigent`'s `memory::index`).

use crate::capabilities::Embedder;
use crate::error::CoreError;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const DEFAULT_DIMENSION: usize = 64;
const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Deterministic, content-hash-derived embedding. Two calls with the same
/// text always produce the same vector; unrelated texts are
/// near-orthogonal often enough for tests exercising similarity ranking,
/// but this is not a semantic embedder.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut state: u64 = 1469598103934665603; // FNV offset basis
        for byte in text.bytes() {
            state ^= byte as u64;
            state = state.wrapping_mul(1099511628211); // FNV prime
            let idx = (state as usize) % self.dimension;
            vector[idx] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Wraps an inner `Embedder` with a process-wide LRU cache keyed on the
/// input text (§5).
pub struct CachingEmbedder<E: Embedder> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachingEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        if let Some(cached) = self.cache.lock().unwrap().get(text) {
            return Ok(cached.clone());
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.lock().unwrap().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_produces_same_vector() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_produces_different_vector() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("the goblin attacks").await.unwrap();
        let b = embedder.embed("the merchant waves").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn caching_embedder_returns_consistent_results() {
        let cached = CachingEmbedder::new(HashEmbedder::default());
        let a = cached.embed("a torch flickers").await.unwrap();
        let b = cached.embed("a torch flickers").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn caching_embedder_respects_small_capacity() {
        let cached = CachingEmbedder::with_capacity(HashEmbedder::default(), 1);
        let first = cached.embed("one").await.unwrap();
        let _second = cached.embed("two").await.unwrap();
        let refetched = cached.embed("one").await.unwrap();
        // Eviction may force a recompute, but recompute is deterministic.
        assert_eq!(first, refetched);
    }
}
