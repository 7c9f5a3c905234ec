//! The trigger evaluator (§4.6, a narrative tool invoked from
//! [`crate::pipeline::narrative`]).
//!
//! `contains_word` is ported verbatim (behavior-for-behavior) from
//! `dm::story_memory::store::contains_word` — the same word-boundary
//! matching this crate needs for both keyword/name triggers here and
//! entity-mention detection in memory-persistence (§4.15).

use crate::campaign::{Event, EventOutcome};
use crate::capabilities::CampaignStore;
use crate::state::Session;
use serde::{Deserialize, Serialize};

/// Check if a byte is alphanumeric (a-z, A-Z, 0-9).
fn is_alphanumeric(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

/// Check if `text` contains `word` at word boundaries.
///
/// A word boundary is the start/end of string or a non-alphanumeric
/// character — this keeps `"Thor"` from matching inside `"Thorin"`.
pub fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }

    let text_bytes = text.as_bytes();
    let word_bytes = word.as_bytes();
    let text_len = text_bytes.len();
    let word_len = word_bytes.len();

    if word_len > text_len {
        return false;
    }

    let mut i = 0;
    while i + word_len <= text_len {
        if &text_bytes[i..i + word_len] == word_bytes {
            let left_ok = i == 0 || !is_alphanumeric(text_bytes[i - 1]);
            let right_ok = i + word_len == text_len || !is_alphanumeric(text_bytes[i + word_len]);
            if left_ok && right_ok {
                return true;
            }
        }
        i += 1;
    }

    false
}

fn contains_word_ci(text: &str, word: &str) -> bool {
    contains_word(&text.to_lowercase(), &word.to_lowercase())
}

/// Trigger types and their typed parameters (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Trigger {
    EnterLocation { location_id: String },
    SpeakToNpc { npc_id: String, keywords: Vec<String> },
    UseItemOnTarget { item_id: String, target_id: String },
    QuestStageReached { quest_id: String, stage_id: String },
    FlagSet { required_flags: Vec<String> },
    TimeBased { day_phase: Option<String>, hour_start: Option<u8>, hour_end: Option<u8> },
    InventoryChange { item_id: String, acquire: bool },
    CombatStart,
    CombatEnd,
    HealthThreshold { threshold: f64, above: bool },
    KeywordInInput { keywords: Vec<String>, match_all: bool },
}

/// Inputs the evaluator needs beyond the session and campaign lookups,
/// gathered by the narrative node before calling [`evaluate`].
pub struct TriggerContext<'a> {
    pub player_message: &'a str,
    pub npc_names_present: &'a [String],
    pub player_has_item: &'a dyn Fn(&str) -> bool,
    pub hp_ratio: f64,
}

pub fn trigger_fires(trigger: &Trigger, session: &Session, ctx: &TriggerContext) -> bool {
    match trigger {
        Trigger::EnterLocation { location_id } => {
            session.current_location_id.as_deref() == Some(location_id.as_str())
        }
        Trigger::SpeakToNpc { npc_id, keywords } => {
            let npc_present = ctx.npc_names_present.iter().any(|n| n == npc_id);
            npc_present
                && (contains_word_ci(ctx.player_message, npc_id)
                    || keywords.iter().any(|k| contains_word_ci(ctx.player_message, k)))
        }
        Trigger::UseItemOnTarget { item_id, target_id } => {
            (ctx.player_has_item)(item_id) && contains_word_ci(ctx.player_message, target_id)
        }
        Trigger::QuestStageReached { quest_id, stage_id } => {
            session.tracked_narrative_state.quest_status.get(quest_id).map(|s| s.as_str())
                == Some(stage_id.as_str())
        }
        Trigger::FlagSet { required_flags } => required_flags
            .iter()
            .all(|f| session.tracked_narrative_state.global_flags.contains(f)),
        Trigger::TimeBased { day_phase, hour_start, hour_end } => {
            let dt = &session.tracked_narrative_state.environment_state.current_datetime;
            let phase_ok = day_phase
                .as_ref()
                .map(|p| dt.day_phase().name().eq_ignore_ascii_case(p))
                .unwrap_or(true);
            let range_ok = match (hour_start, hour_end) {
                (Some(start), Some(end)) => dt.hour >= *start && dt.hour < *end,
                _ => true,
            };
            phase_ok && range_ok
        }
        Trigger::InventoryChange { item_id, acquire } => {
            let has_it = (ctx.player_has_item)(item_id);
            has_it == *acquire
        }
        Trigger::CombatStart => session.game_mode == crate::state::GameMode::Combat,
        Trigger::CombatEnd => {
            session.previous_game_mode == crate::state::GameMode::Combat
                && session.game_mode != crate::state::GameMode::Combat
        }
        Trigger::HealthThreshold { threshold, above } => {
            if *above {
                ctx.hp_ratio > *threshold
            } else {
                ctx.hp_ratio < *threshold
            }
        }
        Trigger::KeywordInInput { keywords, match_all } => {
            if *match_all {
                keywords.iter().all(|k| contains_word_ci(ctx.player_message, k))
            } else {
                keywords.iter().any(|k| contains_word_ci(ctx.player_message, k))
            }
        }
    }
}

/// A fired event's outcomes are applied by the caller (narrative node);
/// this function only decides which events fire this turn (§4.6,
/// evaluated in order: location, active-quest-stage, NPC dialogue, global).
pub fn select_fired_events<'a>(
    candidates: &'a [Event],
    session: &Session,
    ctx: &TriggerContext,
) -> Vec<&'a Event> {
    candidates
        .iter()
        .filter(|event| {
            if event.first_time && session.tracked_narrative_state.event_has_fired(&event.id) {
                return false;
            }
            trigger_fires(&event.trigger, session, ctx)
        })
        .collect()
}

pub fn apply_outcome(session: &mut Session, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::UpdateQuestStage { quest_id, stage_id } => {
            session
                .tracked_narrative_state
                .quest_status
                .insert(quest_id.clone(), stage_id.clone());
        }
        EventOutcome::SetGlobalFlag { flag } => {
            session.tracked_narrative_state.global_flags.insert(flag.clone());
        }
        EventOutcome::SetAreaFlag { region_id, flag } => {
            session
                .tracked_narrative_state
                .environment_state
                .area_flags
                .entry(region_id.clone())
                .or_default()
                .insert(flag.clone());
        }
        EventOutcome::SetNpcDisposition { npc_id, disposition } => {
            session
                .tracked_narrative_state
                .npc_dispositions
                .insert(npc_id.clone(), disposition.clone());
        }
        EventOutcome::SetInventoryFlag { item_id, flag } => {
            session
                .tracked_narrative_state
                .set_location_flag("inventory", item_id, flag);
        }
        EventOutcome::SpawnNpc { npc_id, location_id } => {
            session
                .tracked_narrative_state
                .npc_dispositions
                .entry(npc_id.clone())
                .or_insert_with(|| "neutral".to_string());
            session
                .tracked_narrative_state
                .set_location_flag(location_id, format!("npc_present_{npc_id}"), "true");
        }
    }
}

/// Placeholder used purely so `CampaignStore` stays referenced for
/// documentation purposes in doctests; the real lookups happen in
/// `pipeline::narrative`.
#[allow(dead_code)]
async fn _unused_campaign_store_marker(_store: &dyn CampaignStore) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_word_does_not_match_substring_of_longer_word() {
        assert!(!contains_word("Thorin enters", "Thor"));
        assert!(contains_word("Thor enters", "Thor"));
    }

    #[test]
    fn contains_word_matches_multi_word_phrase() {
        assert!(contains_word("I approach Old Tom at the bar", "Old Tom"));
        assert!(!contains_word("I approach Old Tomfoolery", "Old Tom"));
    }

    #[test]
    fn enter_location_trigger_fires_on_current_location() {
        let mut session = Session::new("s1", "u1", "c1");
        session.current_location_id = Some("tomb_entrance".to_string());
        let trigger = Trigger::EnterLocation { location_id: "tomb_entrance".to_string() };
        let ctx = TriggerContext {
            player_message: "",
            npc_names_present: &[],
            player_has_item: &|_| false,
            hp_ratio: 1.0,
        };
        assert!(trigger_fires(&trigger, &session, &ctx));
    }

    #[test]
    fn first_time_event_skipped_once_flag_is_set() {
        let mut session = Session::new("s1", "u1", "c1");
        session.current_location_id = Some("tomb_entrance".to_string());
        session.tracked_narrative_state.set_event_fired("e1");
        let event = Event {
            id: "e1".into(),
            trigger: Trigger::EnterLocation { location_id: "tomb_entrance".into() },
            first_time: true,
            outcomes: vec![],
            location_id: Some("tomb_entrance".into()),
        };
        let ctx = TriggerContext {
            player_message: "",
            npc_names_present: &[],
            player_has_item: &|_| false,
            hp_ratio: 1.0,
        };
        let fired = select_fired_events(&[event], &session, &ctx);
        assert!(fired.is_empty());
    }

    #[test]
    fn apply_outcome_updates_quest_stage() {
        let mut session = Session::new("s1", "u1", "c1");
        apply_outcome(
            &mut session,
            &EventOutcome::UpdateQuestStage { quest_id: "tomb_quest".into(), stage_id: "stage_3".into() },
        );
        assert_eq!(
            session.tracked_narrative_state.quest_status.get("tomb_quest").map(String::as_str),
            Some("stage_3")
        );
    }
}
