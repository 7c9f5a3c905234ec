//! Campaign-module data and its `CampaignStore` (§6, §9's open-question
//! decision: one JSON document per module, keyed by `(module_id, world_id)`,
//! cached after first load — matching `persist.rs`'s JSON persistence idiom
//! rather than the source's ad-hoc YAML).
//!
//! Types are trimmed from `world.rs`'s `Location`/`NPC`/`Quest` to the
//! read-only lookup surface the pipeline actually dereferences by id.

use crate::capabilities::CampaignStore;
use crate::error::CoreError;
use crate::pipeline::triggers::Trigger;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub description: String,
    pub connections: Vec<LocationConnection>,
    pub npc_ids: Vec<String>,
    pub area_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConnection {
    pub destination_id: String,
    pub destination_name: String,
    pub distance_miles: f32,
}

impl Location {
    /// Resolve a destination name mentioned in prose against this
    /// location's connections (§4.7: "resolve by matching lowercased
    /// location names").
    pub fn resolve_connection(&self, name: &str) -> Option<&LocationConnection> {
        let lower = name.to_lowercase();
        self.connections
            .iter()
            .find(|c| c.destination_name.to_lowercase() == lower)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignItem {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub name: String,
    pub stages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub trigger: Trigger,
    pub first_time: bool,
    pub outcomes: Vec<EventOutcome>,
    /// Non-empty only for location-scoped events (§4.6 evaluation order).
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventOutcome {
    UpdateQuestStage { quest_id: String, stage_id: String },
    SetGlobalFlag { flag: String },
    SetAreaFlag { region_id: String, flag: String },
    SetNpcDisposition { npc_id: String, disposition: String },
    SetInventoryFlag { item_id: String, flag: String },
    SpawnNpc { npc_id: String, location_id: String },
}

/// On-disk shape of one campaign module document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CampaignModule {
    locations: Vec<Location>,
    npcs: Vec<Npc>,
    items: Vec<CampaignItem>,
    quests: Vec<Quest>,
    events: Vec<Event>,
}

/// A JSON-file-backed `CampaignStore`. Loads `{base_dir}/{module_id}.json`
/// once per `(module_id, world_id)` pair and caches it in memory.
pub struct JsonCampaignStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, CampaignModule>>,
}

impl JsonCampaignStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(module_id: &str, world_id: Option<&str>) -> String {
        format!("{module_id}::{}", world_id.unwrap_or("default"))
    }

    async fn load_module(&self, module_id: &str, world_id: Option<&str>) -> Result<(), CoreError> {
        let key = Self::cache_key(module_id, world_id);
        if self.cache.read().expect("campaign cache lock poisoned").contains_key(&key) {
            return Ok(());
        }
        let path: PathBuf = Path::new(&self.base_dir).join(format!("{module_id}.json"));
        let bytes = fs::read(&path).await.map_err(|e| {
            CoreError::capability_unavailable("CampaignStore", e)
        })?;
        let module: CampaignModule = serde_json::from_slice(&bytes)?;
        self.cache.write().expect("campaign cache lock poisoned").insert(key, module);
        Ok(())
    }

    fn with_module<T>(&self, module_id: &str, world_id: Option<&str>, f: impl FnOnce(&CampaignModule) -> T) -> T
    where
        T: Default,
    {
        let key = Self::cache_key(module_id, world_id);
        self.cache
            .read()
            .expect("campaign cache lock poisoned")
            .get(&key)
            .map(f)
            .unwrap_or_default()
    }
}

/// Events are looked up without a module/world context in the
/// `CampaignStore` interface (§6 lists `Event(id)` directly), so this
/// reference implementation scans every module currently cached. Call
/// [`JsonCampaignStore::load_module`] (via any other lookup) for the module
/// of interest before querying events to populate the cache.
#[async_trait::async_trait]
impl CampaignStore for JsonCampaignStore {
    async fn location(&self, id: &str) -> Result<Option<Location>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard
            .values()
            .find_map(|m| m.locations.iter().find(|l| l.id == id).cloned()))
    }

    async fn npc(&self, id: &str) -> Result<Option<Npc>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard.values().find_map(|m| m.npcs.iter().find(|n| n.id == id).cloned()))
    }

    async fn item(&self, id: &str) -> Result<Option<CampaignItem>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard.values().find_map(|m| m.items.iter().find(|i| i.id == id).cloned()))
    }

    async fn quest(&self, id: &str) -> Result<Option<Quest>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard.values().find_map(|m| m.quests.iter().find(|q| q.id == id).cloned()))
    }

    async fn event(&self, id: &str) -> Result<Option<Event>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard.values().find_map(|m| m.events.iter().find(|e| e.id == id).cloned()))
    }

    async fn events_for_location(&self, location_id: &str) -> Result<Vec<Event>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard
            .values()
            .flat_map(|m| m.events.iter())
            .filter(|e| e.location_id.as_deref() == Some(location_id))
            .cloned()
            .collect())
    }

    async fn global_events(&self) -> Result<Vec<Event>, CoreError> {
        let guard = self.cache.read().expect("campaign cache lock poisoned");
        Ok(guard
            .values()
            .flat_map(|m| m.events.iter())
            .filter(|e| e.location_id.is_none())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::triggers::Trigger;

    #[test]
    fn resolve_connection_is_case_insensitive() {
        let loc = Location {
            id: "tavern".into(),
            name: "Rusty Dragon".into(),
            description: String::new(),
            connections: vec![LocationConnection {
                destination_id: "market".into(),
                destination_name: "Market Square".into(),
                distance_miles: 0.5,
            }],
            npc_ids: Vec::new(),
            area_flags: Vec::new(),
        };
        assert!(loc.resolve_connection("market square").is_some());
        assert!(loc.resolve_connection("dungeon").is_none());
    }

    #[test]
    fn event_outcome_serializes_as_tagged_enum() {
        let outcome = EventOutcome::UpdateQuestStage {
            quest_id: "tomb_quest".into(),
            stage_id: "stage_3".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("UpdateQuestStage"));
    }

    #[test]
    fn event_carries_its_trigger() {
        let event = Event {
            id: "e1".into(),
            trigger: Trigger::EnterLocation {
                location_id: "tomb_entrance".into(),
            },
            first_time: true,
            outcomes: vec![],
            location_id: Some("tomb_entrance".into()),
        };
        assert!(event.first_time);
    }
}
