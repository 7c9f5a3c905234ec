//! Narrative node (§4.4, §4.12). Mode-transition table grounded on
//! `world::GameMode`/`GameTime` mechanics; the table itself is new since
//! the teacher has no `social`/`resting`/`intro` modes.

use crate::pipeline::intent::{Intent, RestDuration};
use crate::pipeline::travel::{resolve_travel, TravelMode};
use crate::state::{GameMode, Session};
use crate::campaign::Location;

const COMBAT_START_PHRASES: &[&str] = &["roll initiative", "combat begins", "attacks you", "ambush"];
const COMBAT_END_PHRASES: &[&str] = &["the last enemy falls", "combat ends", "peace returns"];
const REST_END_PHRASES: &[&str] = &["finish your rest", "you wake refreshed"];
const SOCIAL_END_PHRASES: &[&str] = &["the conversation ends", "walks away", "says goodbye"];
const SOCIAL_VERBS: &[&str] = &["talk", "speak", "persuade", "intimidate", "deceive"];

fn prose_matches(prose: &str, phrases: &[&str]) -> bool {
    let lower = prose.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

/// Idempotent mode-transition application (§9's decision: safe to call
/// twice per turn, once from player intent in Narrative and once from DM
/// prose in the Mechanics node re-check). No-ops if `to == current_mode`.
pub fn apply_transition(session: &mut Session, to: GameMode) {
    session.transition_mode(to);
}

/// Player-driven transition detection (Narrative pass, §4.4 step 1 / §4.12
/// first block of rows).
pub fn player_driven_transition(session: &Session, intent: &Intent, offensive_spell: bool, hostile_target: bool) -> Option<GameMode> {
    let mode = session.game_mode;

    if mode != GameMode::Combat {
        let offense = match intent {
            Intent::CastSpell { .. } => offensive_spell,
            Intent::WeaponAttack { .. } => hostile_target,
            _ => false,
        };
        if offense {
            return Some(GameMode::Combat);
        }
    }

    if mode == GameMode::Combat {
        if let Intent::Action { action, .. } = intent {
            if matches!(action.as_str(), "flee" | "escape" | "run") {
                return Some(GameMode::Exploration);
            }
        }
    }

    if matches!(intent, Intent::Rest { .. }) {
        return Some(GameMode::Resting);
    }

    if mode == GameMode::Exploration {
        if let Intent::Action { action, .. } = intent {
            if SOCIAL_VERBS.contains(&action.as_str()) && hostile_target {
                // `hostile_target` is reused here as "an NPC is
                // present/referenced" by the caller's context check.
                return Some(GameMode::Social);
            }
        }
    }

    None
}

/// DM-prose-driven transition re-check (Mechanics node pass, §4.12 second
/// source of transitions).
pub fn prose_driven_transition(session: &Session, dm_prose: &str) -> Option<GameMode> {
    let mode = session.game_mode;
    if mode != GameMode::Combat && prose_matches(dm_prose, COMBAT_START_PHRASES) {
        return Some(GameMode::Combat);
    }
    if mode == GameMode::Combat && prose_matches(dm_prose, COMBAT_END_PHRASES) {
        return Some(GameMode::Exploration);
    }
    if mode == GameMode::Resting && prose_matches(dm_prose, REST_END_PHRASES) {
        return Some(GameMode::Exploration);
    }
    if mode == GameMode::Social && prose_matches(dm_prose, SOCIAL_END_PHRASES) {
        return Some(GameMode::Exploration);
    }
    None
}

/// Time advancement rule (§4.4 step 3).
pub fn minutes_to_advance(intent: &Intent, is_movement: bool) -> u32 {
    match intent {
        Intent::Rest { duration: RestDuration::Short } => 60,
        Intent::Rest { duration: RestDuration::Long } => 480,
        Intent::Explore { .. } => 20,
        _ if is_movement => 0, // caller supplies the travel-time minutes instead
        _ => 5,
    }
}

/// Direct tracked-state edits for non-movement, non-rest intents (§4.4
/// step 2).
pub fn apply_direct_state_edits(session: &mut Session, intent: &Intent) {
    match intent {
        Intent::ManageItem { item_name, action_type } => {
            let location_id = session.current_location_id.clone().unwrap_or_default();
            session.tracked_narrative_state.set_location_flag(
                &location_id,
                format!("item_{item_name}_{:?}", action_type),
                "true",
            );
        }
        Intent::Explore { sensory_type } => {
            let location_id = session.current_location_id.clone().unwrap_or_default();
            session.tracked_narrative_state.set_location_flag(
                &location_id,
                format!("explored_{sensory_type}"),
                "true",
            );
        }
        Intent::UseFeature { feature_name, .. } => {
            session.tracked_narrative_state.global_flags.insert(format!("used_feature_{feature_name}"));
            *session
                .tracked_narrative_state
                .feature_use_counts
                .entry(feature_name.clone())
                .or_insert(0) += 1;
        }
        Intent::UseItem { item_name } => {
            session.tracked_narrative_state.global_flags.insert(format!("used_item_{item_name}"));
        }
        Intent::CastSpell { spell_name, .. } => {
            session.tracked_narrative_state.global_flags.insert(format!("spell_cast_{spell_name}"));
            *session
                .tracked_narrative_state
                .spell_cast_counts
                .entry(spell_name.clone())
                .or_insert(0) += 1;
        }
        Intent::Action { action, skill } => {
            session.tracked_narrative_state.global_flags.insert(format!("action_performed_{action}"));
            if let Some(skill) = skill {
                session.tracked_narrative_state.global_flags.insert(format!("skill_used_{skill}"));
            }
        }
        _ => {}
    }
}

/// Movement detection helper: an `action` intent naming a movement verb,
/// or an `explore` intent carrying movement-ish phrasing.
pub fn movement_destination<'a>(intent: &'a Intent, raw_message: &'a str) -> Option<&'a str> {
    if let Intent::Action { action, .. } = intent {
        if matches!(action.as_str(), "go" | "walk" | "travel" | "head" | "move") {
            if let Some(idx) = raw_message.to_lowercase().find(" to ") {
                return Some(raw_message[idx + 4..].trim());
            }
        }
    }
    None
}

/// Advance the session clock and recompute day phase (§4.4 step 3, §4.13).
pub fn advance_time(session: &mut Session, minutes: u32) {
    session
        .tracked_narrative_state
        .environment_state
        .current_datetime
        .advance_minutes(minutes);
    session.tracked_narrative_state.total_elapsed_minutes += minutes as u64;
}

/// Resolve a named movement destination against the current location, if
/// known to the `CampaignStore` (§4.7).
pub fn apply_movement(session: &mut Session, current_location: Option<&Location>, destination_name: &str, mode: TravelMode) -> u32 {
    let Some(location) = current_location else {
        return 5;
    };
    let resolution = resolve_travel(location, destination_name, mode);
    if let Some(dest_id) = &resolution.destination_id {
        session.current_location_id = Some(dest_id.clone());
    }
    resolution.minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offensive_spell_transitions_to_combat() {
        let session = Session::new("s1", "u1", "c1");
        let intent = Intent::CastSpell { spell_name: "Fire Bolt".into(), is_ritual: false };
        let to = player_driven_transition(&session, &intent, true, false);
        assert_eq!(to, Some(GameMode::Combat));
    }

    #[test]
    fn flee_action_exits_combat() {
        let mut session = Session::new("s1", "u1", "c1");
        session.game_mode = GameMode::Combat;
        let intent = Intent::Action { action: "flee".into(), skill: None };
        let to = player_driven_transition(&session, &intent, false, false);
        assert_eq!(to, Some(GameMode::Exploration));
    }

    #[test]
    fn apply_transition_is_idempotent() {
        let mut session = Session::new("s1", "u1", "c1");
        apply_transition(&mut session, GameMode::Combat);
        let previous_after_first = session.previous_game_mode;
        apply_transition(&mut session, GameMode::Combat);
        assert_eq!(session.previous_game_mode, previous_after_first);
        assert_eq!(session.game_mode, GameMode::Combat);
    }

    #[test]
    fn prose_driven_transition_detects_combat_end() {
        let mut session = Session::new("s1", "u1", "c1");
        session.game_mode = GameMode::Combat;
        let to = prose_driven_transition(&session, "The last enemy falls, and silence returns.");
        assert_eq!(to, Some(GameMode::Exploration));
    }

    #[test]
    fn rest_minutes_match_spec_table() {
        assert_eq!(minutes_to_advance(&Intent::Rest { duration: RestDuration::Short }, false), 60);
        assert_eq!(minutes_to_advance(&Intent::Rest { duration: RestDuration::Long }, false), 480);
        assert_eq!(minutes_to_advance(&Intent::Explore { sensory_type: "visual".into() }, false), 20);
        assert_eq!(minutes_to_advance(&Intent::General, false), 5);
    }
}
