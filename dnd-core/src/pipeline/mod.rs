//! The turn-processing pipeline (§2, §4.1, C12/C15).
//!
//! `Core::process_message` is the single entry point: it runs the six
//! nodes in the fixed order the spec requires, routing around Validation
//! and Narrative for conversational intents and skipping Narrative (but
//! not AIDM) on a failed validation, then checkpoints the session.
//! Mirrors `session::GameSession::player_action`'s role as the one
//! orchestration method callers use, generalized to the capability-
//! injected design this spec requires in place of a single concrete
//! `DungeonMaster` field.

pub mod aidm;
pub mod embedder;
pub mod entities;
pub mod generator;
pub mod intent;
pub mod mechanics;
pub mod narrative;
pub mod travel;
pub mod triggers;
pub mod validation;

use crate::campaign::Location;
use crate::capabilities::{
    CampaignStore, Capabilities, CharacterStore, Embedder, IntentClassifier, MemoryStore,
    SessionStore, SignificanceClassifier, SignificanceScore,
};
use crate::character::CharacterView;
use crate::error::CoreError;
use crate::memory::context::{assemble_context, embed_query, MemoryBudget};
use crate::memory::store::sweep_expired_short_term;
use crate::memory::summarization;
use crate::memory::types::{Memory, MemorySender};
use crate::pipeline::entities::extract_entities;
use crate::pipeline::intent::Intent;
use crate::pipeline::mechanics::{apply_mechanic, recheck_mode_transition, Mechanic, RestType};
use crate::pipeline::narrative::{
    advance_time, apply_direct_state_edits, apply_movement, minutes_to_advance, movement_destination,
    player_driven_transition,
};
use crate::pipeline::travel::TravelMode;
use crate::pipeline::triggers::{apply_outcome, select_fired_events, TriggerContext};
use crate::pipeline::validation::{validate, ValidationContext, ValidationResult};
use crate::state::{Sender, Session};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument, warn};

const HARMFUL_SPELL_KEYWORDS: &[&str] = &[
    "fire", "flame", "burn", "bolt", "missile", "lightning", "frost", "shock", "smite", "poison",
    "acid", "necro", "toxic",
];

/// One turn's request (§6: `ProcessMessage(session_id, message, user_id,
/// character_id, world_id?, campaign_module_id?)`).
#[derive(Debug, Clone)]
pub struct ProcessMessageRequest {
    pub session_id: String,
    pub message: String,
    pub user_id: String,
    pub character_id: String,
    pub world_id: Option<String>,
    pub campaign_module_id: Option<String>,
}

/// The turn's result (§6: `{ok, dm_response, new_state}`).
#[derive(Debug, Clone)]
pub struct ProcessMessageResponse {
    pub ok: bool,
    pub dm_response: String,
    pub new_state: Session,
}

/// Days since the Unix epoch, formatted as a 10-digit string — this
/// crate's "now" unit for memory recency scoring (§4.10's day-granularity
/// `0.9^days_old` decay), without taking on a datetime crate dependency
/// the teacher never carries.
fn current_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{:010}", secs / 86_400)
}

fn is_offensive_spell(spell_name: &str) -> bool {
    let lower = spell_name.to_lowercase();
    HARMFUL_SPELL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// The engine: a bundle of capabilities plus the fixed node pipeline.
/// Holds no mutable state of its own beyond what `Capabilities`
/// implementations choose to cache (e.g. the embedder's LRU, §5).
pub struct Core {
    pub capabilities: Capabilities,
}

impl Core {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// Runs one turn end-to-end (§4.1). Node failures degrade to a
    /// fallback rather than propagating, except checkpoint-write failure,
    /// which is fatal for the turn (§4.1's failure semantics).
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn process_message(
        &self,
        request: ProcessMessageRequest,
    ) -> Result<ProcessMessageResponse, CoreError> {
        let now = current_timestamp();

        let mut session = match self.capabilities.session_store.load(&request.session_id).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                let mut s = Session::new(&request.session_id, &request.user_id, &request.character_id);
                if let Some(world_id) = &request.world_id {
                    s = s.with_world(world_id.clone());
                }
                if let Some(module_id) = &request.campaign_module_id {
                    s = s.with_campaign_module(module_id.clone());
                }
                s
            }
            Err(e) => {
                warn!(error = %e, "session load failed, starting fresh state");
                Session::new(&request.session_id, &request.user_id, &request.character_id)
            }
        };

        session.push_history(Sender::Player, request.message.clone());
        info!(mode = %session.game_mode, "turn started");

        // --- Intent ---
        let intent_result = match self.capabilities.intent_classifier.classify(&request.message).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "intent classification failed, falling back to general");
                crate::pipeline::intent::IntentResult::general_fallback()
            }
        };
        let intent = intent_result.intent;

        // --- Validation + Narrative (skipped for conversational intents) ---
        let mut validation = ValidationResult::ok();
        let mut character: Option<CharacterView> = None;

        if !intent.skips_validation() {
            let loaded_character = match self.capabilities.character_store.load(&request.character_id).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, "character load failed, treating validation as passed");
                    None
                }
            };

            if let Some(c) = &loaded_character {
                let location_id = session.current_location_id.clone().unwrap_or_default();
                let location_has_item = |item_name: &str| -> bool {
                    let taken_flag = format!("item_{item_name}_Take");
                    session.tracked_narrative_state.location_flag(&location_id, &taken_flag).is_none()
                };
                let ctx = ValidationContext {
                    location_at_current: true,
                    location_has_item: &location_has_item,
                    minutes_since_last_long_rest: session.tracked_narrative_state.minutes_since_last_long_rest(),
                };
                validation = validate(&intent, &session, c, &ctx);
            }
            character = loaded_character;

            if validation.ok {
                self.run_narrative(&mut session, &intent, &request.message).await;
            }
        }

        // --- AIDM ---
        let location = self.current_location(&session).await;
        let location_description = location.as_ref().map(|l| l.description.as_str());
        let known_entities_block = self.known_entities_block(&session).await;

        let memory_block = self
            .memory_block(&session, &request.message, &now)
            .await
            .unwrap_or_default();

        let fallback_character = CharacterView::placeholder(&request.character_id);
        let character_view = character.clone().unwrap_or(fallback_character);

        let aidm_request = aidm::AidmRequest {
            session: &session,
            character: &character_view,
            intent: &intent,
            validation: &validation,
            location_description,
            memory_block: &memory_block,
            known_entities_block: &known_entities_block,
            player_input: &request.message,
        };
        let aidm_response = aidm::run_aidm(self.capabilities.generator.as_ref(), &aidm_request).await;

        // --- ApplyMechanics ---
        let mut mechanics = aidm_response.parsed_mechanics;
        if mechanics.is_empty() {
            mechanics = crate::pipeline::mechanics::regex_fallback_mechanics(&aidm_response.narrative_text);
        }

        if let Some(mut c) = character {
            let mut completed_long_rest = false;
            for mechanic in &mechanics {
                apply_mechanic(&mut c, mechanic);
                if matches!(mechanic, Mechanic::RestComplete { rest_type: RestType::Long }) {
                    completed_long_rest = true;
                }
            }
            if completed_long_rest {
                session.tracked_narrative_state.record_long_rest();
            }
            if let Err(e) = self.capabilities.character_store.save(&request.character_id, &c).await {
                warn!(error = %e, "character save failed");
            }
        }

        recheck_mode_transition(&mut session, &aidm_response.narrative_text);

        session.push_history(Sender::Dm, aidm_response.narrative_text.clone());

        // --- MemoryPersistence ---
        self.persist_memory(&session, &request.message, Sender::Player, MemorySender::Player, &now)
            .await;
        self.persist_memory(&session, &aidm_response.narrative_text, Sender::Dm, MemorySender::Dm, &now)
            .await;
        self.persist_entity_facts(&aidm_response.narrative_text, &now).await;

        if let Err(e) = sweep_expired_short_term(self.capabilities.memory_store.as_ref(), &now).await {
            warn!(error = %e, "short-term memory expiry sweep failed");
        }

        if let Err(e) = summarization::run_once(
            &session.session_id,
            self.capabilities.memory_store.as_ref(),
            self.capabilities.generator.as_ref(),
            self.capabilities.embedder.as_ref(),
            &now,
        )
        .await
        {
            warn!(error = %e, "summarization batch failed");
        }

        // --- Checkpoint ---
        session.revision += 1;
        self.capabilities.session_store.save(&session).await?;

        info!(mode = %session.game_mode, "turn complete");

        Ok(ProcessMessageResponse {
            ok: true,
            dm_response: aidm_response.narrative_text,
            new_state: session,
        })
    }

    async fn run_narrative(&self, session: &mut Session, intent: &Intent, raw_message: &str) {
        let offensive_spell = matches!(intent, Intent::CastSpell { spell_name, .. } if is_offensive_spell(spell_name));
        let npc_referenced = self.npc_referenced(session, raw_message).await;

        if let Some(to) = player_driven_transition(session, intent, offensive_spell, npc_referenced) {
            crate::pipeline::narrative::apply_transition(session, to);
        }

        apply_direct_state_edits(session, intent);

        let destination = movement_destination(intent, raw_message);
        if let Some(destination_name) = destination {
            let location = self.current_location(session).await;
            let minutes = apply_movement(session, location.as_ref(), destination_name, TravelMode::Walk);
            advance_time(session, minutes);
        } else {
            let minutes = minutes_to_advance(intent, false);
            advance_time(session, minutes);
        }

        self.evaluate_triggers(session, raw_message).await;
    }

    async fn evaluate_triggers(&self, session: &mut Session, raw_message: &str) {
        let location_id = session.current_location_id.clone().unwrap_or_default();
        let mut candidates = self
            .capabilities
            .campaign_store
            .events_for_location(&location_id)
            .await
            .unwrap_or_default();
        candidates.extend(self.capabilities.campaign_store.global_events().await.unwrap_or_default());

        let npc_names = self.npc_names_at(session).await;
        let no_item = |_: &str| false;
        let ctx = TriggerContext {
            player_message: raw_message,
            npc_names_present: &npc_names,
            player_has_item: &no_item,
            hp_ratio: 1.0,
        };

        let fired: Vec<_> = select_fired_events(&candidates, session, &ctx).into_iter().cloned().collect();
        for event in &fired {
            for outcome in &event.outcomes {
                apply_outcome(session, outcome);
            }
            if event.first_time {
                session.tracked_narrative_state.set_event_fired(&event.id);
            }
        }
    }

    async fn npc_names_at(&self, session: &Session) -> Vec<String> {
        let Some(location_id) = session.current_location_id.clone() else {
            return Vec::new();
        };
        let Ok(Some(location)) = self.capabilities.campaign_store.location(&location_id).await else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for npc_id in &location.npc_ids {
            if let Ok(Some(npc)) = self.capabilities.campaign_store.npc(npc_id).await {
                names.push(npc.name);
            }
        }
        names
    }

    async fn npc_referenced(&self, session: &Session, raw_message: &str) -> bool {
        let names = self.npc_names_at(session).await;
        names.iter().any(|n| crate::pipeline::triggers::contains_word(raw_message, n))
    }

    async fn current_location(&self, session: &Session) -> Option<Location> {
        let location_id = session.current_location_id.as_deref()?;
        self.capabilities.campaign_store.location(location_id).await.ok().flatten()
    }

    async fn known_entities_block(&self, session: &Session) -> String {
        let names = self.npc_names_at(session).await;
        if names.is_empty() {
            return String::new();
        }
        names.iter().map(|n| format!("- {n}\n")).collect()
    }

    async fn memory_block(&self, session: &Session, player_message: &str, now: &str) -> Result<String, CoreError> {
        let query_embedding = embed_query(self.capabilities.embedder.as_ref(), player_message).await?;
        let budget = MemoryBudget { total_tokens: 8000 };
        assemble_context(session, &query_embedding, self.capabilities.memory_store.as_ref(), &budget, now).await
    }

    async fn persist_memory(
        &self,
        session: &Session,
        text: &str,
        _sender: Sender,
        memory_sender: MemorySender,
        now: &str,
    ) {
        let score = match self.capabilities.significance_classifier.score(text, &session.session_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "significance scoring failed, treating as insignificant");
                SignificanceScore { is_significant: false, importance: 0 }
            }
        };
        if !score.is_significant {
            return;
        }
        let embedding = match self.capabilities.embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding failed, skipping memory write");
                return;
            }
        };
        let memory = Memory::new_episodic(&session.session_id, text, embedding, score.importance, memory_sender, now);
        if let Err(e) = self.capabilities.memory_store.upsert(memory).await {
            warn!(error = %e, "memory upsert failed");
        }
    }

    async fn persist_entity_facts(&self, dm_response: &str, now: &str) {
        for fact in extract_entities(dm_response) {
            let embedding = match self.capabilities.embedder.embed(&fact.content).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "entity fact embedding failed, skipping");
                    continue;
                }
            };
            let memory = Memory::new_entity_fact(&fact.content, embedding, &fact.entity_name, fact.entity_type, now);
            if let Err(e) = self.capabilities.memory_store.upsert(memory).await {
                warn!(error = %e, "entity fact upsert failed");
            }
        }
    }
}

/// A generic placeholder used when no real character was loaded for this
/// turn (§4.2's `general`/`recall`/`ask_rule` skip Validation and never
/// touch `CharacterStore`, but AIDM still wants a character block).
impl CharacterView {
    fn placeholder(character_id: &str) -> Self {
        CharacterView {
            character_id: character_id.to_string(),
            name: "Adventurer".to_string(),
            race: String::new(),
            class: String::new(),
            level: 1,
            background: String::new(),
            abilities: crate::character::AbilityScores::default(),
            skills: std::collections::HashMap::new(),
            hit_points: crate::character::HitPoints::new(10),
            conditions: Vec::new(),
            spellcasting: crate::character::SpellcastingData::default(),
            inventory: crate::character::Inventory::default(),
            features: Vec::new(),
            pending_ability_check: None,
            pending_combat_roll: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{Event, EventOutcome, Location};
    use crate::capabilities::Capabilities;
    use crate::pipeline::embedder::HashEmbedder;
    use crate::pipeline::intent::HeuristicIntentClassifier;
    use crate::pipeline::triggers::Trigger;
    use crate::testing::{
        AlwaysSignificant, InMemoryCampaignStore, InMemoryCharacterStore, InMemorySessionStore, MockGenerator,
        TestIntentClassifier,
    };

    fn test_character() -> CharacterView {
        let mut slots = std::collections::HashMap::new();
        slots.insert(1, crate::character::SpellSlot { available: 2, maximum: 2 });
        CharacterView {
            character_id: "c1".into(),
            name: "Thorin".into(),
            race: "Dwarf".into(),
            class: "Fighter".into(),
            level: 3,
            background: "Soldier".into(),
            abilities: crate::character::AbilityScores::default(),
            skills: std::collections::HashMap::new(),
            hit_points: crate::character::HitPoints::new(30),
            conditions: Vec::new(),
            spellcasting: crate::character::SpellcastingData {
                slots,
                known_spells: vec!["fireball".to_string()],
            },
            inventory: crate::character::Inventory::default(),
            features: Vec::new(),
            pending_ability_check: None,
            pending_combat_roll: None,
        }
    }

    fn build_core(responses: Vec<&str>) -> Core {
        let capabilities = Capabilities {
            embedder: Box::new(HashEmbedder::default()),
            generator: Box::new(MockGenerator::new(responses)),
            memory_store: Box::new(crate::memory::store::InMemoryMemoryStore::default()),
            session_store: Box::new(InMemorySessionStore::new()),
            campaign_store: Box::new(
                InMemoryCampaignStore::new().with_location(Location {
                    id: "tavern".into(),
                    name: "The Rusty Flagon".into(),
                    description: "A smoky tavern crowded with travelers.".into(),
                    connections: Vec::new(),
                    npc_ids: Vec::new(),
                    area_flags: Vec::new(),
                }),
            ),
            character_store: Box::new(InMemoryCharacterStore::new().with_character(test_character())),
            significance_classifier: Box::new(AlwaysSignificant),
            intent_classifier: Box::new(TestIntentClassifier::default()),
        };
        Core::new(capabilities)
    }

    #[tokio::test]
    async fn first_turn_starts_in_intro_mode_and_checkpoints() {
        let core = build_core(vec!["You awaken in a dim tavern."]);
        let response = core
            .process_message(ProcessMessageRequest {
                session_id: "s1".into(),
                message: "I look around.".into(),
                user_id: "u1".into(),
                character_id: "c1".into(),
                world_id: None,
                campaign_module_id: None,
            })
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.new_state.history.len(), 2);
        assert_eq!(response.dm_response, "You awaken in a dim tavern.");
    }

    #[tokio::test]
    async fn offensive_spell_transitions_to_combat_mode() {
        let core = build_core(vec!["The fireball scorches the bandit."]);
        let response = core
            .process_message(ProcessMessageRequest {
                session_id: "s2".into(),
                message: "I cast fireball.".into(),
                user_id: "u1".into(),
                character_id: "c1".into(),
                world_id: None,
                campaign_module_id: None,
            })
            .await
            .unwrap();
        assert_eq!(response.new_state.game_mode, crate::state::GameMode::Combat);
    }

    #[tokio::test]
    async fn validation_failure_still_advances_conversation() {
        let core = build_core(vec!["You have no such weapon to swing."]);
        let response = core
            .process_message(ProcessMessageRequest {
                session_id: "s3".into(),
                message: "I attack with my greatsword".into(),
                user_id: "u1".into(),
                character_id: "c1".into(),
                world_id: None,
                campaign_module_id: None,
            })
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.new_state.history.len(), 2);
    }

    #[tokio::test]
    async fn triggered_event_fires_and_sets_global_flag() {
        let mut capabilities_core = build_core(vec!["The floor creaks as you step in."]);
        capabilities_core.capabilities.campaign_store = Box::new(
            InMemoryCampaignStore::new()
                .with_location(Location {
                    id: "crypt".into(),
                    name: "Old Crypt".into(),
                    description: "A cold, dust-choked crypt.".into(),
                    connections: Vec::new(),
                    npc_ids: Vec::new(),
                    area_flags: Vec::new(),
                })
                .with_event(Event {
                    id: "crypt_entered".into(),
                    trigger: Trigger::EnterLocation { location_id: "crypt".into() },
                    first_time: true,
                    outcomes: vec![EventOutcome::SetGlobalFlag { flag: "crypt_discovered".into() }],
                    location_id: Some("crypt".into()),
                }),
        );

        let mut session = Session::new("s4", "u1", "c1");
        session.current_location_id = Some("crypt".into());
        capabilities_core.capabilities.session_store.save(&session).await.unwrap();

        let response = capabilities_core
            .process_message(ProcessMessageRequest {
                session_id: "s4".into(),
                message: "I step into the crypt".into(),
                user_id: "u1".into(),
                character_id: "c1".into(),
                world_id: None,
                campaign_module_id: None,
            })
            .await
            .unwrap();

        assert!(response
            .new_state
            .tracked_narrative_state
            .global_flags
            .contains("crypt_discovered"));
        assert!(response.new_state.tracked_narrative_state.event_has_fired("crypt_entered"));
    }

    #[tokio::test]
    async fn intro_classifier_is_usable_directly() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I cast fireball at the dragon");
        assert!(matches!(result.intent, Intent::CastSpell { .. }));
    }
}
