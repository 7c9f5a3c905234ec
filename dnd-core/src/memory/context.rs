//! Context assembly and scoring (§4.10), invoked by the AIDM node to build
//! the memory block of the prompt.
//!
//! Grounded on `dm::story_memory::store`'s scored-entity-context assembly
//! and `dm::memory::DmMemory::build_context`'s tier-prefixed text blocks.

use crate::capabilities::{Embedder, MemoryStore};
use crate::error::CoreError;
use crate::memory::types::{Memory, MemoryFilter, MemoryType};
use crate::state::Session;

/// `len(text)/4`, per §4.10's token estimation note.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn days_old(created_at: &str, now: &str) -> f64 {
    // Both timestamps are ISO-8601 date-prefixed strings produced by this
    // crate's own clock; a full calendar diff is unnecessary for scoring
    // purposes, a lexical day-count approximation is sufficient and avoids
    // depending on a datetime crate the teacher doesn't carry.
    let parse_ord = |s: &str| -> i64 {
        let digits: String = s.chars().take(10).filter(|c| c.is_ascii_digit()).collect();
        digits.parse().unwrap_or(0)
    };
    let diff = parse_ord(now) - parse_ord(created_at);
    diff.max(0) as f64
}

fn recency(created_at: &str, now: &str) -> f64 {
    let age = days_old(created_at, now);
    (0.9f64.powf(age)).max(0.1)
}

/// `similarity*0.6 + recency*0.2 + importance/10*0.2` (§4.10 step 4).
pub fn score_memory(similarity: f32, memory: &Memory, now: &str) -> f64 {
    similarity as f64 * 0.6 + recency(&memory.created_at, now) * 0.2 + (memory.importance as f64 / 10.0) * 0.2
}

/// Token budget for the memory block after reserving the other prompt
/// sections (§4.5's budget table: 1000 + 800 + 400 + 600 + 200 reserved
/// out of whatever total window the caller configures).
pub struct MemoryBudget {
    pub total_tokens: usize,
}

impl MemoryBudget {
    pub const RESERVED_REPLY: usize = 1000;
    pub const RESERVED_SYSTEM: usize = 800;
    pub const RESERVED_CHARACTER: usize = 400;
    pub const RESERVED_NARRATIVE: usize = 600;
    pub const RESERVED_PLAYER_INPUT: usize = 200;

    pub fn memory_block_budget(&self) -> usize {
        self.total_tokens.saturating_sub(
            Self::RESERVED_REPLY
                + Self::RESERVED_SYSTEM
                + Self::RESERVED_CHARACTER
                + Self::RESERVED_NARRATIVE
                + Self::RESERVED_PLAYER_INPUT,
        )
    }
}

/// Assembles the memory block of the AIDM prompt under the session's
/// token budget (§4.10).
pub async fn assemble_context(
    session: &Session,
    query_embedding: &[f32],
    memory_store: &dyn MemoryStore,
    budget: &MemoryBudget,
    now: &str,
) -> Result<String, CoreError> {
    let mut block = String::new();
    let mut used = 0usize;
    let total_budget = budget.memory_block_budget();

    // Step 1: rolling summary, capped at 25% of the block.
    if let Some(summary) = &session.summary {
        let cap = total_budget / 4;
        let cost = estimate_tokens(summary);
        if cost <= cap {
            block.push_str("Summary: ");
            block.push_str(summary);
            block.push('\n');
            used += cost;
        }
    }

    // Step 2: pinned memories, always included, in pinned order, capped at 5.
    for pin in session.pinned_memories.iter().take(5) {
        let line = format!(
            "PINNED: {}\n",
            pin.note.clone().unwrap_or_else(|| pin.memory_id.clone())
        );
        let cost = estimate_tokens(&line);
        if used + cost > total_budget {
            break;
        }
        block.push_str(&line);
        used += cost;
    }

    // Step 3-5: per-tier retrieval, scored, sorted, packed.
    let tiers = [
        (MemoryType::ShortTerm, Some(session.session_id.clone())),
        (MemoryType::EpisodicEvent, Some(session.session_id.clone())),
        (MemoryType::EntityFact, Some("semantic".to_string())),
    ];

    let mut candidates: Vec<(Memory, f64)> = Vec::new();
    for (tier, session_filter) in tiers {
        let filter = MemoryFilter {
            session_id: session_filter,
            memory_type: Some(tier),
            is_summarized: Some(false),
            ..Default::default()
        };
        let hits = memory_store.search(query_embedding, &filter, 10, 0.7).await?;
        for (memory, similarity) in hits {
            let score = score_memory(similarity, &memory, now);
            candidates.push((memory, score));
        }
    }
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (memory, _score) in candidates {
        let line = format!("{} {}\n", memory.memory_type.tier_prefix(), memory.content);
        let cost = estimate_tokens(&line);
        if used + cost > total_budget {
            break;
        }
        block.push_str(&line);
        used += cost;
    }

    Ok(block)
}

/// Embeds `text` through the given [`Embedder`], converting capability
/// errors into `CoreError::CapabilityUnavailable`.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, CoreError> {
    embedder.embed(text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemorySender;

    #[test]
    fn recency_decays_with_age() {
        let fresh = recency("2024010100", "2024010100");
        let old = recency("2024010100", "2024013100");
        assert!(fresh > old);
        assert!(old >= 0.1);
    }

    #[test]
    fn memory_block_budget_subtracts_reserved_sections() {
        let budget = MemoryBudget { total_tokens: 10_000 };
        assert_eq!(budget.memory_block_budget(), 10_000 - 3000);
    }

    #[tokio::test]
    async fn assemble_context_respects_budget_ceiling() {
        use crate::memory::store::InMemoryMemoryStore;
        let store = InMemoryMemoryStore::new();
        crate::capabilities::MemoryStore::upsert(
            &store,
            Memory::new_episodic("s1", &"x".repeat(10_000), vec![1.0], 9, MemorySender::Player, "2024010100"),
        )
        .await
        .unwrap();

        let session = Session::new("s1", "u1", "c1");
        let budget = MemoryBudget { total_tokens: 3100 };
        let block = assemble_context(&session, &[1.0], &store, &budget, "2024010100")
            .await
            .unwrap();
        assert!(estimate_tokens(&block) <= budget.memory_block_budget() + 50);
    }
}
