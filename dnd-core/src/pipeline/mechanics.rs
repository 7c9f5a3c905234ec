//! Mechanics extraction and application (§4.8, C11).
//!
//! Narrowed from `rules.rs`'s `Resolution`/`apply_effect` dispatch-on-
//! variant idiom down to the spec's seven mechanic types. The structured
//! `[MECHANICS]` channel is authoritative; regex matching over the DM's
//! prose is only a fallback for responses that omit it (§4.8, REDESIGN
//! FLAGS note in §9).

use crate::character::{CharacterView, Condition};
use crate::error::CoreError;
use crate::pipeline::narrative::prose_driven_transition;
use crate::state::{GameMode, Session};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestType {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatRollKind {
    Attack,
    Initiative,
}

/// One parsed mechanical effect (§4.8's seven types).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mechanic {
    Damage { amount: i32 },
    Healing { amount: i32 },
    Condition { name: String, action: ConditionAction },
    ResourceChange { resource_type: String, resource_key: String, delta: i32 },
    RestComplete { rest_type: RestType },
    AbilityCheck { check_type: String },
    CombatRoll { roll_type: CombatRollKind },
}

/// Strip `[MECHANICS]...[/MECHANICS]` blocks out of the DM's raw reply,
/// returning the player-visible text and the parsed mechanics (§4.5).
/// Unparseable blocks are logged and skipped, never aborting the rest.
pub fn extract_structured_mechanics(raw_text: &str) -> (String, Vec<Mechanic>) {
    let block_re = Regex::new(r"(?s)\[MECHANICS\]\s*type:\s*(\w+)\s*data:\s*(\{.*?\})\s*\[/MECHANICS\]")
        .expect("static regex is valid");

    let mut mechanics = Vec::new();
    for caps in block_re.captures_iter(raw_text) {
        let kind = &caps[1];
        let data = &caps[2];
        match parse_mechanic(kind, data) {
            Ok(mechanic) => mechanics.push(mechanic),
            Err(e) => warn!(kind, %e, "failed to parse [MECHANICS] block, skipping"),
        }
    }
    let stripped = block_re.replace_all(raw_text, "").trim().to_string();
    (stripped, mechanics)
}

fn parse_mechanic(kind: &str, data: &str) -> Result<Mechanic, CoreError> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    match kind {
        "damage" => Ok(Mechanic::Damage {
            amount: value.get("amount").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
        }),
        "healing" => Ok(Mechanic::Healing {
            amount: value.get("amount").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
        }),
        "condition" => {
            let name = value.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let action = match value.get("action").and_then(|v| v.as_str()) {
                Some("remove") => ConditionAction::Remove,
                _ => ConditionAction::Add,
            };
            Ok(Mechanic::Condition { name, action })
        }
        "resource_change" => Ok(Mechanic::ResourceChange {
            resource_type: value.get("resource_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            resource_key: value.get("resource_key").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            delta: value.get("delta").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
        }),
        "rest_complete" => {
            let rest_type = match value.get("rest_type").and_then(|v| v.as_str()) {
                Some("long") => RestType::Long,
                _ => RestType::Short,
            };
            Ok(Mechanic::RestComplete { rest_type })
        }
        "ability_check" => Ok(Mechanic::AbilityCheck {
            check_type: value.get("check_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        }),
        "combat_roll" => {
            let roll_type = match value.get("roll_type").and_then(|v| v.as_str()) {
                Some("initiative") => CombatRollKind::Initiative,
                _ => CombatRollKind::Attack,
            };
            Ok(Mechanic::CombatRoll { roll_type })
        }
        other => Err(CoreError::Extraction(format!("unknown mechanic type: {other}"))),
    }
}

/// Regex fallback patterns for responses that omit the structured channel
/// (§4.8). Intentionally conservative: it only catches the clearest
/// phrasing and defers everything else to the structured channel.
pub fn regex_fallback_mechanics(prose: &str) -> Vec<Mechanic> {
    let mut found = Vec::new();

    let damage_re = Regex::new(r"(?i)takes? (\d+) damage").expect("static regex is valid");
    if let Some(caps) = damage_re.captures(prose) {
        if let Ok(amount) = caps[1].parse() {
            found.push(Mechanic::Damage { amount });
        }
    }

    let heal_re = Regex::new(r"(?i)heals? (\d+) (?:hit points|hp)").expect("static regex is valid");
    if let Some(caps) = heal_re.captures(prose) {
        if let Ok(amount) = caps[1].parse() {
            found.push(Mechanic::Healing { amount });
        }
    }

    if prose.to_lowercase().contains("roll a d20 for attack") {
        found.push(Mechanic::CombatRoll { roll_type: CombatRollKind::Attack });
    }
    if prose.to_lowercase().contains("roll initiative") {
        found.push(Mechanic::CombatRoll { roll_type: CombatRollKind::Initiative });
    }

    found
}

/// Apply one mechanic to the character view, clamping invariant
/// violations rather than failing the turn (§7's `InvariantViolation`
/// handling: "clamp and log; do not fail the turn").
pub fn apply_mechanic(character: &mut CharacterView, mechanic: &Mechanic) {
    match mechanic {
        Mechanic::Damage { amount } => {
            character.hit_points.apply_damage(*amount);
            character.hit_points.clamp();
        }
        Mechanic::Healing { amount } => {
            character.hit_points.apply_healing(*amount);
            character.hit_points.clamp();
        }
        Mechanic::Condition { name, action } => match action {
            ConditionAction::Add => {
                if let Some(cond) = Condition::from_name(name) {
                    if !character.conditions.contains(&cond) {
                        character.conditions.push(cond);
                    }
                } else {
                    warn!(name, "unknown condition in [MECHANICS] block, skipping");
                }
            }
            ConditionAction::Remove => {
                if let Some(cond) = Condition::from_name(name) {
                    character.conditions.retain(|c| *c != cond);
                }
            }
        },
        Mechanic::ResourceChange { resource_type, resource_key, delta } => {
            if resource_type == "spell_slot" {
                if let Ok(level) = resource_key.parse::<u8>() {
                    if let Some(slot) = character.spellcasting.slots.get_mut(&level) {
                        let new_value = (slot.available as i32 + delta).clamp(0, slot.maximum as i32);
                        slot.available = new_value as u8;
                    }
                }
            }
        }
        Mechanic::RestComplete { rest_type } => match rest_type {
            RestType::Long => {
                character.hit_points.current = character.hit_points.maximum;
                for slot in character.spellcasting.slots.values_mut() {
                    slot.restore();
                }
                character.conditions.retain(|c| matches!(c, Condition::Exhaustion));
            }
            RestType::Short => {
                let bonus = character.level as i32 * 2;
                character.hit_points.apply_healing(bonus);
            }
        },
        Mechanic::AbilityCheck { check_type } => {
            character.pending_ability_check = Some(check_type.clone());
        }
        Mechanic::CombatRoll { roll_type } => {
            character.pending_combat_roll = Some(match roll_type {
                CombatRollKind::Attack => crate::character::CombatRollType::Attack,
                CombatRollKind::Initiative => crate::character::CombatRollType::Initiative,
            });
        }
    }
}

/// Re-check DM prose for implicit mode transitions and apply the winning
/// one, if any (§4.8's final paragraph, §4.12).
pub fn recheck_mode_transition(session: &mut Session, dm_prose: &str) {
    if let Some(to) = prose_driven_transition(session, dm_prose) {
        crate::pipeline::narrative::apply_transition(session, to);
    }
}

/// Also exported for callers that need to distinguish "no transition" from
/// "transitioned to the same mode" in tests; unused in production code.
#[allow(dead_code)]
pub fn game_mode_unchanged(session: &Session, before: GameMode) -> bool {
    session.game_mode == before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, HitPoints, Inventory, SpellSlot, SpellcastingData};
    use std::collections::HashMap;

    fn character() -> CharacterView {
        let mut slots = HashMap::new();
        slots.insert(1, SpellSlot { available: 2, maximum: 4 });
        CharacterView {
            character_id: "c1".into(),
            name: "Thorin".into(),
            race: "Dwarf".into(),
            class: "Fighter".into(),
            level: 3,
            background: "Soldier".into(),
            abilities: AbilityScores::default(),
            skills: HashMap::new(),
            hit_points: HitPoints::new(30),
            conditions: Vec::new(),
            spellcasting: SpellcastingData { slots, known_spells: Vec::new() },
            inventory: Inventory::default(),
            features: Vec::new(),
            pending_ability_check: None,
            pending_combat_roll: None,
        }
    }

    #[test]
    fn extracts_and_strips_structured_block() {
        let raw = "You take a swing! [MECHANICS]\ntype: damage\ndata: {\"amount\": 7}\n[/MECHANICS]\nThe goblin reels.";
        let (stripped, mechanics) = extract_structured_mechanics(raw);
        assert!(!stripped.contains("MECHANICS"));
        assert!(stripped.contains("The goblin reels."));
        assert_eq!(mechanics.len(), 1);
        matches!(mechanics[0], Mechanic::Damage { amount: 7 });
    }

    #[test]
    fn unknown_mechanic_type_is_skipped_not_fatal() {
        let raw = "[MECHANICS]\ntype: teleport\ndata: {}\n[/MECHANICS]\n[MECHANICS]\ntype: healing\ndata: {\"amount\": 4}\n[/MECHANICS]";
        let (_, mechanics) = extract_structured_mechanics(raw);
        assert_eq!(mechanics.len(), 1);
    }

    #[test]
    fn damage_never_drops_hp_below_zero() {
        let mut c = character();
        apply_mechanic(&mut c, &Mechanic::Damage { amount: 1000 });
        assert_eq!(c.hit_points.current, 0);
    }

    #[test]
    fn healing_clamps_to_maximum() {
        let mut c = character();
        c.hit_points.current = 25;
        apply_mechanic(&mut c, &Mechanic::Healing { amount: 1000 });
        assert_eq!(c.hit_points.current, 30);
    }

    #[test]
    fn long_rest_restores_hp_slots_and_clears_conditions_except_exhaustion() {
        let mut c = character();
        c.hit_points.current = 1;
        c.conditions.push(Condition::Poisoned);
        c.conditions.push(Condition::Exhaustion);
        apply_mechanic(&mut c, &Mechanic::RestComplete { rest_type: RestType::Long });
        assert_eq!(c.hit_points.current, c.hit_points.maximum);
        assert_eq!(c.spellcasting.slots[&1].available, 4);
        assert_eq!(c.conditions, vec![Condition::Exhaustion]);
    }

    #[test]
    fn regex_fallback_detects_damage_phrase() {
        let mechanics = regex_fallback_mechanics("The bandit takes 6 damage from your blow.");
        assert!(matches!(mechanics[0], Mechanic::Damage { amount: 6 }));
    }

    #[test]
    fn no_op_mechanics_leave_character_unchanged() {
        let c = character();
        let before = c.hit_points.current;
        let mut c2 = c.clone();
        // empty list applies nothing
        for m in Vec::<Mechanic>::new() {
            apply_mechanic(&mut c2, &m);
        }
        assert_eq!(c2.hit_points.current, before);
    }
}
