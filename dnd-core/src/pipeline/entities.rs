//! Entity extraction from DM prose (§4.15), feeding `entity_fact` writes
//! in the MemoryPersistence node (§4.9).
//!
//! Pattern-based, grounded on `dm::story_memory::store`'s regex-driven
//! extraction idiom (the teacher extracts NPC mentions the same way,
//! word-boundary matching via `contains_word`).

use crate::memory::types::EntityType;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NPC_IS_A: Regex =
        Regex::new(r"\b([A-Z][a-zA-Z']+(?: [A-Z][a-zA-Z']+)?) is (?:a|an|the) ([^.\n]+)").unwrap();
    static ref NPC_MEET: Regex =
        Regex::new(r"meet ([A-Z][a-zA-Z']+(?: [A-Z][a-zA-Z']+)?), (?:a|an|the) ([^.\n]+)").unwrap();
    static ref NPC_SAYS: Regex = Regex::new(
        r"\b([A-Z][a-zA-Z']+(?: [A-Z][a-zA-Z']+)?) (?:tells|says|explains)(?: you)?(?: that)? ([^.\n]+)"
    )
    .unwrap();
    static ref LOCATION_ARRIVE: Regex =
        Regex::new(r"arrive (?:at|in) ([A-Z][a-zA-Z' ]+)").unwrap();
    static ref QUEST_TO: Regex =
        Regex::new(r"(?:quest|mission) to ([^.\n]+)").unwrap();
    static ref QUEST_ASKS: Regex =
        Regex::new(r"asks you to ([^.\n]+)").unwrap();
    static ref ITEM_FIND: Regex =
        Regex::new(r"(?:find|discover|obtain) (?:a|an|the) ([a-zA-Z][a-zA-Z' ]+)").unwrap();
}

const PRONOUNS: &[&str] = &["He", "She", "They", "It", "You", "I", "We", "This", "That"];

fn is_pronoun(name: &str) -> bool {
    PRONOUNS.iter().any(|p| p.eq_ignore_ascii_case(name))
}

/// One extracted fact, ready to become an `entity_fact` memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub entity_name: String,
    pub entity_type: EntityType,
    pub content: String,
}

fn trim_sentence(s: &str) -> String {
    s.trim().trim_end_matches(['.', ',']).to_string()
}

/// Run all §4.15 patterns against one block of DM prose. Order follows
/// the spec's listing; duplicate `(entity_name, content)` pairs across
/// patterns are not de-duplicated here — callers persist by content hash
/// if dedup is desired.
pub fn extract_entities(prose: &str) -> Vec<ExtractedFact> {
    let mut out = Vec::new();

    for caps in NPC_IS_A.captures_iter(prose) {
        let name = caps.get(1).unwrap().as_str().to_string();
        if is_pronoun(&name) {
            continue;
        }
        let desc = trim_sentence(caps.get(2).unwrap().as_str());
        out.push(ExtractedFact {
            entity_name: name.clone(),
            entity_type: EntityType::Npc,
            content: format!("{name} is {desc}"),
        });
    }

    for caps in NPC_MEET.captures_iter(prose) {
        let name = caps.get(1).unwrap().as_str().to_string();
        if is_pronoun(&name) {
            continue;
        }
        let desc = trim_sentence(caps.get(2).unwrap().as_str());
        out.push(ExtractedFact {
            entity_name: name.clone(),
            entity_type: EntityType::Npc,
            content: format!("{name}, {desc}"),
        });
    }

    for caps in NPC_SAYS.captures_iter(prose) {
        let name = caps.get(1).unwrap().as_str().to_string();
        if is_pronoun(&name) {
            continue;
        }
        let content = trim_sentence(caps.get(2).unwrap().as_str());
        out.push(ExtractedFact {
            entity_name: name.clone(),
            entity_type: EntityType::Npc,
            content: format!("{name} said: {content}"),
        });
    }

    for caps in LOCATION_ARRIVE.captures_iter(prose) {
        let name = trim_sentence(caps.get(1).unwrap().as_str());
        if is_pronoun(&name) {
            continue;
        }
        out.push(ExtractedFact {
            entity_name: name.clone(),
            entity_type: EntityType::Location,
            content: format!("The party arrived at {name}"),
        });
    }

    for caps in QUEST_TO.captures_iter(prose) {
        let objective = trim_sentence(caps.get(1).unwrap().as_str());
        out.push(ExtractedFact {
            entity_name: objective.clone(),
            entity_type: EntityType::Quest,
            content: format!("Quest: {objective}"),
        });
    }

    for caps in QUEST_ASKS.captures_iter(prose) {
        let objective = trim_sentence(caps.get(1).unwrap().as_str());
        out.push(ExtractedFact {
            entity_name: objective.clone(),
            entity_type: EntityType::Quest,
            content: format!("Asked to {objective}"),
        });
    }

    for caps in ITEM_FIND.captures_iter(prose) {
        let name = trim_sentence(caps.get(1).unwrap().as_str());
        out.push(ExtractedFact {
            entity_name: name.clone(),
            entity_type: EntityType::Item,
            content: format!("Found {name}"),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_npc_is_a_pattern() {
        let facts = extract_entities("Gregor is a grizzled blacksmith who distrusts outsiders.");
        assert!(facts
            .iter()
            .any(|f| f.entity_name == "Gregor" && f.entity_type == EntityType::Npc));
    }

    #[test]
    fn skips_pronoun_subjects() {
        let facts = extract_entities("He is a tall man with a scar.");
        assert!(facts.is_empty());
    }

    #[test]
    fn extracts_meet_pattern() {
        let facts = extract_entities("You meet Elara, a traveling merchant with rare wares.");
        assert!(facts.iter().any(|f| f.entity_name == "Elara"));
    }

    #[test]
    fn extracts_location_arrival() {
        let facts = extract_entities("You arrive at Millhaven as the sun sets.");
        assert!(facts
            .iter()
            .any(|f| f.entity_type == EntityType::Location && f.entity_name.starts_with("Millhaven")));
    }

    #[test]
    fn extracts_quest_pattern() {
        let facts = extract_entities("The elder gives you a quest to retrieve the lost sigil.");
        assert!(facts.iter().any(|f| f.entity_type == EntityType::Quest));
    }

    #[test]
    fn extracts_item_find_pattern() {
        let facts = extract_entities("You find a rusted dagger beneath the floorboards.");
        assert!(facts
            .iter()
            .any(|f| f.entity_type == EntityType::Item && f.entity_name.contains("rusted dagger")));
    }
}
