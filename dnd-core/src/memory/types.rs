//! Memory payload shapes owned by `MemoryStore` (§3, §6 wire format).
//!
//! `EntityType` is carried over from the teacher's
//! `dm::story_memory::entity::EntityType` naming; `MemoryType` generalizes
//! the teacher's flat `CampaignFact`/`FactCategory` pair into the spec's
//! four tiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryType {
    ShortTerm,
    EpisodicEvent,
    Summary,
    EntityFact,
}

impl MemoryType {
    pub fn tier_prefix(&self) -> &'static str {
        match self {
            MemoryType::ShortTerm => "Recent memory:",
            MemoryType::EpisodicEvent => "Important memory:",
            MemoryType::Summary => "Important memory:",
            MemoryType::EntityFact => "Known fact:",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Npc,
    Location,
    Item,
    Quest,
    Organization,
    Event,
    Creature,
}

impl EntityType {
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Npc => "NPC",
            EntityType::Location => "Location",
            EntityType::Item => "Item",
            EntityType::Quest => "Quest",
            EntityType::Organization => "Organization",
            EntityType::Event => "Event",
            EntityType::Creature => "Creature",
        }
    }

    /// Importance assigned to entity facts of this type (§4.9: "6-8
    /// depending on entity type").
    pub fn default_importance(&self) -> u8 {
        match self {
            EntityType::Npc => 8,
            EntityType::Quest => 8,
            EntityType::Location => 7,
            EntityType::Organization => 7,
            EntityType::Event => 7,
            EntityType::Item => 6,
            EntityType::Creature => 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityReference {
    pub entity_name: String,
    pub entity_type: EntityType,
}

/// The sender that produced the content this memory captures, carried in
/// `metadata` (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemorySender {
    Player,
    Dm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub memory_id: String,
    /// Owning session, or the literal "semantic" for entity facts (§3).
    pub session_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub memory_type: MemoryType,
    pub character_id: Option<String>,
    pub user_id: Option<String>,
    pub importance: u8,
    pub created_at: String,
    pub last_accessed: String,
    pub entity_references: Vec<EntityReference>,
    pub narrative_context: serde_json::Value,
    pub is_summarized: bool,
    pub summary_id: Option<String>,
    pub summary_of: Vec<String>,
    pub sender: Option<MemorySender>,
}

impl Memory {
    pub fn new_episodic(
        session_id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        importance: u8,
        sender: MemorySender,
        created_at: impl Into<String>,
    ) -> Self {
        let now = created_at.into();
        Self {
            memory_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            content: content.into(),
            embedding,
            memory_type: MemoryType::EpisodicEvent,
            character_id: None,
            user_id: None,
            importance,
            created_at: now.clone(),
            last_accessed: now,
            entity_references: Vec::new(),
            narrative_context: serde_json::Value::Null,
            is_summarized: false,
            summary_id: None,
            summary_of: Vec::new(),
            sender: Some(sender),
        }
    }

    pub fn new_entity_fact(
        content: impl Into<String>,
        embedding: Vec<f32>,
        entity_name: impl Into<String>,
        entity_type: EntityType,
        created_at: impl Into<String>,
    ) -> Self {
        let now = created_at.into();
        let importance = entity_type.default_importance();
        Self {
            memory_id: Uuid::new_v4().to_string(),
            session_id: "semantic".to_string(),
            content: content.into(),
            embedding,
            memory_type: MemoryType::EntityFact,
            character_id: None,
            user_id: None,
            importance,
            created_at: now.clone(),
            last_accessed: now,
            entity_references: vec![EntityReference {
                entity_name: entity_name.into(),
                entity_type,
            }],
            narrative_context: serde_json::Value::Null,
            is_summarized: false,
            summary_id: None,
            summary_of: Vec::new(),
            sender: None,
        }
    }

    pub fn new_summary(
        session_id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        summary_of: Vec<String>,
        created_at: impl Into<String>,
    ) -> Self {
        let now = created_at.into();
        Self {
            memory_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            content: content.into(),
            embedding,
            memory_type: MemoryType::Summary,
            character_id: None,
            user_id: None,
            importance: 8,
            created_at: now.clone(),
            last_accessed: now,
            entity_references: Vec::new(),
            narrative_context: serde_json::Value::Null,
            is_summarized: false,
            summary_id: None,
            summary_of,
            sender: None,
        }
    }
}

/// Search/count filter (§4.10, §6: "Filters support equality on
/// `{session_id, character_id, user_id, memory_type, is_summarized,
/// summary_id}` and existence on `entity_references.entity_name`").
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub session_id: Option<String>,
    pub character_id: Option<String>,
    pub user_id: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub is_summarized: Option<bool>,
    pub summary_id: Option<String>,
    pub entity_name: Option<String>,
}

impl MemoryFilter {
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(sid) = &self.session_id {
            if &memory.session_id != sid {
                return false;
            }
        }
        if let Some(cid) = &self.character_id {
            if memory.character_id.as_deref() != Some(cid.as_str()) {
                return false;
            }
        }
        if let Some(uid) = &self.user_id {
            if memory.user_id.as_deref() != Some(uid.as_str()) {
                return false;
            }
        }
        if let Some(mt) = self.memory_type {
            if memory.memory_type != mt {
                return false;
            }
        }
        if let Some(summarized) = self.is_summarized {
            if memory.is_summarized != summarized {
                return false;
            }
        }
        if let Some(summary_id) = &self.summary_id {
            if memory.summary_id.as_deref() != Some(summary_id.as_str()) {
                return false;
            }
        }
        if let Some(name) = &self.entity_name {
            if !memory
                .entity_references
                .iter()
                .any(|r| r.entity_name.eq_ignore_ascii_case(name))
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_fact_gets_session_id_semantic() {
        let m = Memory::new_entity_fact("Elandra runs the tavern", vec![0.1], "Elandra", EntityType::Npc, "now");
        assert_eq!(m.session_id, "semantic");
        assert_eq!(m.importance, 8);
    }

    #[test]
    fn filter_matches_on_entity_name_case_insensitively() {
        let m = Memory::new_entity_fact("desc", vec![], "Elandra", EntityType::Npc, "now");
        let filter = MemoryFilter {
            entity_name: Some("elandra".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&m));
    }

    #[test]
    fn filter_rejects_on_memory_type_mismatch() {
        let m = Memory::new_episodic("s1", "x", vec![], 5, MemorySender::Player, "now");
        let filter = MemoryFilter {
            memory_type: Some(MemoryType::Summary),
            ..Default::default()
        };
        assert!(!filter.matches(&m));
    }
}
