//! Deterministic test doubles for every capability (§10.4), generalizing
//! the teacher's `MockDm`/`TestHarness` pattern from a single mocked DM to
//! the full capability set this spec requires.

use crate::campaign::{CampaignItem, Event, Location, Npc, Quest};
use crate::capabilities::{
    CampaignStore, CharacterStore, GeneratedReply, Generator, IntentClassifier, SessionStore,
    SignificanceClassifier, SignificanceScore,
};
use crate::character::CharacterView;
use crate::error::CoreError;
use crate::pipeline::embedder::HashEmbedder;
use crate::pipeline::intent::{HeuristicIntentClassifier, IntentResult};
use crate::state::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A mock generator that returns scripted responses in order, falling
/// back to a fixed default once the script is exhausted. Mirrors the
/// teacher's `MockDm`, generalized to the `Generator` capability.
pub struct MockGenerator {
    responses: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).rev().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Player-visible messages passed to each `complete` call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn complete(
        &self,
        _system: &str,
        _history: &[(String, String)],
        user_message: &str,
        _temperature: f32,
        _max_tokens: usize,
    ) -> Result<GeneratedReply, CoreError> {
        self.calls.lock().unwrap().push(user_message.to_string());
        let text = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| "The DM has no more scripted responses.".to_string());
        Ok(GeneratedReply { text, tokens_used: 0 })
    }
}

/// In-memory `SessionStore` keyed by `session_id`.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Session>, CoreError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), CoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.session_id.clone())
            .collect())
    }
}

/// In-memory `CampaignStore`, populated directly by tests rather than
/// loaded from JSON (contrast with the production `JsonCampaignStore`).
#[derive(Default)]
pub struct InMemoryCampaignStore {
    pub locations: Mutex<HashMap<String, Location>>,
    pub npcs: Mutex<HashMap<String, Npc>>,
    pub items: Mutex<HashMap<String, CampaignItem>>,
    pub quests: Mutex<HashMap<String, Quest>>,
    pub events: Mutex<HashMap<String, Event>>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(self, location: Location) -> Self {
        self.locations.lock().unwrap().insert(location.id.clone(), location);
        self
    }

    pub fn with_event(self, event: Event) -> Self {
        self.events.lock().unwrap().insert(event.id.clone(), event);
        self
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn location(&self, id: &str) -> Result<Option<Location>, CoreError> {
        Ok(self.locations.lock().unwrap().get(id).cloned())
    }

    async fn npc(&self, id: &str) -> Result<Option<Npc>, CoreError> {
        Ok(self.npcs.lock().unwrap().get(id).cloned())
    }

    async fn item(&self, id: &str) -> Result<Option<CampaignItem>, CoreError> {
        Ok(self.items.lock().unwrap().get(id).cloned())
    }

    async fn quest(&self, id: &str) -> Result<Option<Quest>, CoreError> {
        Ok(self.quests.lock().unwrap().get(id).cloned())
    }

    async fn event(&self, id: &str) -> Result<Option<Event>, CoreError> {
        Ok(self.events.lock().unwrap().get(id).cloned())
    }

    async fn events_for_location(&self, location_id: &str) -> Result<Vec<Event>, CoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.location_id.as_deref() == Some(location_id))
            .cloned()
            .collect())
    }

    async fn global_events(&self) -> Result<Vec<Event>, CoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.location_id.is_none())
            .cloned()
            .collect())
    }
}

/// In-memory `CharacterStore` keyed by `character_id`.
#[derive(Default)]
pub struct InMemoryCharacterStore {
    characters: Mutex<HashMap<String, CharacterView>>,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_character(self, view: CharacterView) -> Self {
        self.characters.lock().unwrap().insert(view.character_id.clone(), view);
        self
    }
}

#[async_trait]
impl CharacterStore for InMemoryCharacterStore {
    async fn load(&self, character_id: &str) -> Result<CharacterView, CoreError> {
        self.characters
            .lock()
            .unwrap()
            .get(character_id)
            .cloned()
            .ok_or_else(|| CoreError::InvariantViolation(format!("unknown character {character_id}")))
    }

    async fn save(&self, character_id: &str, view: &CharacterView) -> Result<(), CoreError> {
        self.characters
            .lock()
            .unwrap()
            .insert(character_id.to_string(), view.clone());
        Ok(())
    }
}

/// A significance classifier that always reports significant, for tests
/// that want every message persisted as an episodic event.
pub struct AlwaysSignificant;

#[async_trait]
impl SignificanceClassifier for AlwaysSignificant {
    async fn score(&self, _text: &str, _context: &str) -> Result<SignificanceScore, CoreError> {
        Ok(SignificanceScore { is_significant: true, importance: 7 })
    }
}

/// Wraps the real heuristic classifier so tests exercise production
/// intent-detection logic through the `IntentClassifier` trait object.
pub struct TestIntentClassifier(HeuristicIntentClassifier);

impl Default for TestIntentClassifier {
    fn default() -> Self {
        Self(HeuristicIntentClassifier)
    }
}

#[async_trait]
impl IntentClassifier for TestIntentClassifier {
    async fn classify(&self, text: &str) -> Result<IntentResult, CoreError> {
        Ok(self.0.classify_sync(text))
    }
}

/// Convenience: a fully-wired `MemoryStore` + `Embedder` pair using the
/// production in-memory store and the deterministic hash embedder,
/// suitable for exercising `assemble_context`/`summarization` without a
/// network call.
pub fn test_memory_store() -> crate::memory::store::InMemoryMemoryStore {
    crate::memory::store::InMemoryMemoryStore::default()
}

pub fn test_embedder() -> HashEmbedder {
    HashEmbedder::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_generator_returns_scripted_responses_in_order() {
        let generator = MockGenerator::new(vec!["first", "second"]);
        let a = generator.complete("sys", &[], "hi", 0.8, 100).await.unwrap();
        let b = generator.complete("sys", &[], "hi again", 0.8, 100).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(generator.calls(), vec!["hi".to_string(), "hi again".to_string()]);
    }

    #[tokio::test]
    async fn mock_generator_falls_back_once_exhausted() {
        let generator = MockGenerator::new(Vec::<String>::new());
        let reply = generator.complete("sys", &[], "hi", 0.8, 100).await.unwrap();
        assert!(reply.text.contains("no more scripted responses"));
    }

    #[tokio::test]
    async fn in_memory_session_store_round_trips() {
        let store = InMemorySessionStore::new();
        let session = Session::new("s1", "u1", "c1");
        store.save(&session).await.unwrap();
        let loaded = store.load("s1").await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().session_id, "s1");
    }

    #[tokio::test]
    async fn in_memory_character_store_errors_on_unknown_id() {
        let store = InMemoryCharacterStore::new();
        let result = store.load("nope").await;
        assert!(result.is_err());
    }
}
