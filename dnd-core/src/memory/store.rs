//! A reference, in-process `MemoryStore` implementation.
//!
//! The real vector database is out of scope (§1); this store exists so the
//! pipeline can be exercised end to end without one, the way the teacher's
//! `dm::story_memory::store` keeps everything in a `HashMap`/`Vec` rather
//! than talking to an external index.

use crate::capabilities::MemoryStore;
use crate::error::CoreError;
use crate::memory::types::{Memory, MemoryFilter, MemoryType};
use async_trait::async_trait;
use std::sync::RwLock;

/// `short_term` memories expire automatically 7 days after `created_at`
/// (spec's tiered-memory invariant). `now`/`created_at` are the same
/// day-count digit strings `pipeline::current_timestamp` produces.
const SHORT_TERM_TTL_DAYS: i64 = 7;

fn days_since(created_at: &str, now: &str) -> i64 {
    let parse_ord = |s: &str| -> i64 {
        let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().unwrap_or(0)
    };
    (parse_ord(now) - parse_ord(created_at)).max(0)
}

/// Deletes every `short_term` memory older than [`SHORT_TERM_TTL_DAYS`].
/// Call once per turn (or on whatever cadence a deployment's maintenance
/// loop uses) against any `MemoryStore` implementation; returns the number
/// evicted.
pub async fn sweep_expired_short_term(store: &dyn MemoryStore, now: &str) -> Result<usize, CoreError> {
    let filter = MemoryFilter {
        memory_type: Some(MemoryType::ShortTerm),
        ..Default::default()
    };
    let hits = store.search(&[], &filter, usize::MAX, -1.0).await?;
    let mut evicted = 0;
    for (memory, _) in hits {
        if days_since(&memory.created_at, now) >= SHORT_TERM_TTL_DAYS {
            store.delete(&memory.memory_id).await?;
            evicted += 1;
        }
    }
    Ok(evicted)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Thread-safe in-memory `MemoryStore`. Suitable as the reference
/// implementation and in tests; a real deployment swaps in a vector
/// database behind the same trait.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    memories: RwLock<Vec<Memory>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn upsert(&self, memory: Memory) -> Result<(), CoreError> {
        let mut guard = self.memories.write().expect("memory store lock poisoned");
        if let Some(existing) = guard.iter_mut().find(|m| m.memory_id == memory.memory_id) {
            *existing = memory;
        } else {
            guard.push(memory);
        }
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &MemoryFilter,
        k: usize,
        min_sim: f32,
    ) -> Result<Vec<(Memory, f32)>, CoreError> {
        let guard = self.memories.read().expect("memory store lock poisoned");
        let mut scored: Vec<(Memory, f32)> = guard
            .iter()
            .filter(|m| filter.matches(m))
            .map(|m| (m.clone(), cosine_similarity(query_embedding, &m.embedding)))
            .filter(|(_, sim)| *sim >= min_sim)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn update_payload(&self, memory_id: &str, kv: serde_json::Value) -> Result<(), CoreError> {
        let mut guard = self.memories.write().expect("memory store lock poisoned");
        let memory = guard
            .iter_mut()
            .find(|m| m.memory_id == memory_id)
            .ok_or_else(|| CoreError::InvariantViolation(format!("no such memory: {memory_id}")))?;
        if let Some(is_summarized) = kv.get("is_summarized").and_then(|v| v.as_bool()) {
            memory.is_summarized = is_summarized;
        }
        if let Some(summary_id) = kv.get("summary_id").and_then(|v| v.as_str()) {
            memory.summary_id = Some(summary_id.to_string());
        }
        if let Some(last_accessed) = kv.get("last_accessed").and_then(|v| v.as_str()) {
            memory.last_accessed = last_accessed.to_string();
        }
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> Result<(), CoreError> {
        let mut guard = self.memories.write().expect("memory store lock poisoned");
        guard.retain(|m| m.memory_id != memory_id);
        Ok(())
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize, CoreError> {
        let guard = self.memories.read().expect("memory store lock poisoned");
        Ok(guard.iter().filter(|m| filter.matches(m)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemorySender, MemoryType};

    #[tokio::test]
    async fn upsert_is_idempotent_on_memory_id() {
        let store = InMemoryMemoryStore::new();
        let mut m = Memory::new_episodic("s1", "hello", vec![1.0, 0.0], 5, MemorySender::Player, "t0");
        store.upsert(m.clone()).await.unwrap();
        m.content = "hello again".to_string();
        store.upsert(m.clone()).await.unwrap();

        let filter = MemoryFilter {
            session_id: Some("s1".to_string()),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_respects_min_sim() {
        let store = InMemoryMemoryStore::new();
        store
            .upsert(Memory::new_episodic("s1", "close", vec![1.0, 0.0], 5, MemorySender::Player, "t0"))
            .await
            .unwrap();
        store
            .upsert(Memory::new_episodic("s1", "far", vec![0.0, 1.0], 5, MemorySender::Player, "t0"))
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.0], &MemoryFilter::default(), 5, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.content, "close");
    }

    #[tokio::test]
    async fn sweep_expired_short_term_evicts_only_memories_past_the_ttl() {
        let store = InMemoryMemoryStore::new();
        let mut fresh = Memory::new_episodic("s1", "fresh", vec![1.0], 5, MemorySender::Player, "0");
        fresh.memory_type = MemoryType::ShortTerm;
        let mut stale = Memory::new_episodic("s1", "stale", vec![1.0], 5, MemorySender::Player, "0");
        stale.memory_type = MemoryType::ShortTerm;
        store.upsert(fresh).await.unwrap();
        store.upsert(stale).await.unwrap();

        let evicted = sweep_expired_short_term(&store, "3").await.unwrap();
        assert_eq!(evicted, 0, "3 days old is within the 7-day TTL");

        let evicted = sweep_expired_short_term(&store, "7").await.unwrap();
        assert_eq!(evicted, 2, "7 days old has hit the TTL");

        let filter = MemoryFilter {
            memory_type: Some(MemoryType::ShortTerm),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_expired_short_term_leaves_other_tiers_alone() {
        let store = InMemoryMemoryStore::new();
        store
            .upsert(Memory::new_episodic("s1", "event", vec![1.0], 5, MemorySender::Player, "0"))
            .await
            .unwrap();

        sweep_expired_short_term(&store, "100").await.unwrap();

        let filter = MemoryFilter {
            memory_type: Some(MemoryType::EpisodicEvent),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_payload_marks_summarized() {
        let store = InMemoryMemoryStore::new();
        let m = Memory::new_episodic("s1", "x", vec![1.0], 5, MemorySender::Player, "t0");
        let id = m.memory_id.clone();
        store.upsert(m).await.unwrap();
        store
            .update_payload(&id, serde_json::json!({"is_summarized": true, "summary_id": "sum1"}))
            .await
            .unwrap();

        let filter = MemoryFilter {
            memory_type: Some(MemoryType::EpisodicEvent),
            is_summarized: Some(true),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }
}
