//! Capability traits the pipeline is parameterized over (§6, §9's
//! injected-capability design note).
//!
//! `Core` (see [`crate::pipeline`]) holds a `Capabilities` bundle of these
//! trait objects rather than reaching for module-level globals, the way
//! the teacher's `DungeonMaster` holds a concrete `claude::Claude` client.
//! Unlike the teacher, this crate has more than one capability that needs
//! more than one implementation (production vs. in-memory test doubles),
//! so the traits are `async_trait`-based rather than a single concrete
//! struct.

use crate::character::CharacterView;
use crate::error::CoreError;
use crate::memory::types::{Memory, MemoryFilter};
use async_trait::async_trait;
use serde_json::Value;

/// text -> fixed-dimension embedding vector, with batch support (§6).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    /// Dimensionality of vectors this embedder produces, known at init.
    fn dimension(&self) -> usize;
}

/// A chat-completion capability (§6). `AIDM` (§4.5) is the only caller.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        history: &[(String, String)],
        user_message: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<GeneratedReply, CoreError>;
}

#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub tokens_used: usize,
}

/// Vector store for memories (§6, §4.10).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn upsert(&self, memory: Memory) -> Result<(), CoreError>;
    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &MemoryFilter,
        k: usize,
        min_sim: f32,
    ) -> Result<Vec<(Memory, f32)>, CoreError>;
    async fn update_payload(&self, memory_id: &str, kv: Value) -> Result<(), CoreError>;
    async fn delete(&self, memory_id: &str) -> Result<(), CoreError>;
    async fn count(&self, filter: &MemoryFilter) -> Result<usize, CoreError>;
}

/// Session checkpoint persistence (§6).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<crate::state::Session>, CoreError>;
    async fn save(&self, session: &crate::state::Session) -> Result<(), CoreError>;
    async fn list(&self, user_id: &str) -> Result<Vec<String>, CoreError>;
}

/// Read-only campaign-module lookups (§6). Only the handful of record
/// kinds the pipeline dereferences by id are modeled; full campaign
/// authoring is out of scope (§1).
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn location(&self, id: &str) -> Result<Option<crate::campaign::Location>, CoreError>;
    async fn npc(&self, id: &str) -> Result<Option<crate::campaign::Npc>, CoreError>;
    async fn item(&self, id: &str) -> Result<Option<crate::campaign::CampaignItem>, CoreError>;
    async fn quest(&self, id: &str) -> Result<Option<crate::campaign::Quest>, CoreError>;
    async fn event(&self, id: &str) -> Result<Option<crate::campaign::Event>, CoreError>;
    /// All events reachable from the given location, for trigger
    /// evaluation (§4.6).
    async fn events_for_location(&self, location_id: &str) -> Result<Vec<crate::campaign::Event>, CoreError>;
    async fn global_events(&self) -> Result<Vec<crate::campaign::Event>, CoreError>;
}

/// The single point through which Validation and ApplyMechanics read/write
/// character state (§3, §9's cyclic-update decision). The core never
/// caches a `CharacterView` across turns.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn load(&self, character_id: &str) -> Result<CharacterView, CoreError>;
    async fn save(&self, character_id: &str, view: &CharacterView) -> Result<(), CoreError>;
}

/// text -> (is_significant, importance) for the memory-persistence node
/// (§4.9, §6).
#[async_trait]
pub trait SignificanceClassifier: Send + Sync {
    async fn score(&self, text: &str, context: &str) -> Result<SignificanceScore, CoreError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SignificanceScore {
    pub is_significant: bool,
    pub importance: u8,
}

/// text -> `{intent, slots, confidence}` (§4.2, §6).
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<crate::pipeline::intent::IntentResult, CoreError>;
}

/// The capability bundle `Core` is constructed with, mirroring the
/// teacher's "one struct owns every collaborator" composition but over
/// trait objects instead of one concrete `Claude` field.
pub struct Capabilities {
    pub embedder: Box<dyn Embedder>,
    pub generator: Box<dyn Generator>,
    pub memory_store: Box<dyn MemoryStore>,
    pub session_store: Box<dyn SessionStore>,
    pub campaign_store: Box<dyn CampaignStore>,
    pub character_store: Box<dyn CharacterStore>,
    pub significance_classifier: Box<dyn SignificanceClassifier>,
    pub intent_classifier: Box<dyn IntentClassifier>,
}
