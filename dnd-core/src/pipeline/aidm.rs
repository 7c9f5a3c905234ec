//! AIDM node (§4.5, C5/C13): prompt assembly and the single `Generator`
//! call. Never mutates persistent stores.
//!
//! Prompt-fragment concatenation is grounded directly on
//! `dm::agent::DungeonMaster::build_system_prompt`'s `include_str!`
//! sectioning; `describe_hp_status` is generalized into
//! `CharacterView::hp_status_term`.

use crate::capabilities::{Generator, GeneratedReply};
use crate::character::CharacterView;
use crate::error::CoreError;
use crate::memory::context::{estimate_tokens, MemoryBudget};
use crate::pipeline::intent::Intent;
use crate::pipeline::mechanics::{extract_structured_mechanics, Mechanic};
use crate::pipeline::validation::ValidationResult;
use crate::state::{GameMode, Session};
use std::time::Duration;
use tracing::warn;

const BASE_PROMPT: &str = include_str!("../prompts/base.txt");
const INTRO_PROMPT: &str = include_str!("../prompts/intro.txt");
const EXPLORATION_PROMPT: &str = include_str!("../prompts/exploration.txt");
const COMBAT_PROMPT: &str = include_str!("../prompts/combat.txt");
const SOCIAL_PROMPT: &str = include_str!("../prompts/social.txt");
const CONFLICT_RULES_PROMPT: &str = include_str!("../prompts/conflict_rules.txt");
const STRUCTURED_OUTPUT_PROMPT: &str = include_str!("../prompts/structured_output.txt");

/// The DM is given 30 seconds to respond; a timeout falls back to a fixed
/// apology (§4.5, §5).
pub const GENERATOR_SOFT_TIMEOUT: Duration = Duration::from_secs(30);

const FALLBACK_APOLOGY: &str = "The Dungeon Master pauses, momentarily lost in thought. \
    (Something went wrong generating a response — please try again.)";

/// Token caps for the two prompt sections not already covered by
/// `MemoryBudget` (§4.5's overflow-trim cascade: documents -> entities ->
/// history, never system/character). `memory_block` is capped upstream by
/// the caller's `MemoryBudget`; these two are trimmed here, right before
/// `user_message` assembly.
const ENTITIES_TOKEN_BUDGET: usize = 400;
const HISTORY_TOKEN_BUDGET: usize = 1200;

/// Drops trailing `known_entities_block` lines once the running token cost
/// would exceed `budget`.
fn trim_entities_block(block: &str, budget: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for line in block.lines() {
        let cost = estimate_tokens(line) + 1;
        if used + cost > budget {
            break;
        }
        out.push_str(line);
        out.push('\n');
        used += cost;
    }
    out
}

/// Drops the oldest turns first, keeping the history's tail, once the
/// running token cost would exceed `budget`.
fn trim_history(mut history: Vec<(String, String)>, budget: usize) -> Vec<(String, String)> {
    let mut used: usize = history.iter().map(|(_, m)| estimate_tokens(m)).sum();
    while used > budget && !history.is_empty() {
        let (_, msg) = history.remove(0);
        used -= estimate_tokens(&msg);
    }
    history
}

fn mode_addendum(mode: GameMode) -> &'static str {
    match mode {
        GameMode::Intro => INTRO_PROMPT,
        GameMode::Exploration => EXPLORATION_PROMPT,
        GameMode::Combat => COMBAT_PROMPT,
        GameMode::Social => SOCIAL_PROMPT,
        // `resting` reuses the exploration addendum (§4.14).
        GameMode::Resting => EXPLORATION_PROMPT,
    }
}

fn build_system_prompt(mode: GameMode, wants_structured_output: bool) -> String {
    let mut prompt = String::new();
    prompt.push_str(BASE_PROMPT);
    prompt.push_str("\n\n");
    prompt.push_str(mode_addendum(mode));
    prompt.push_str("\n\n");
    prompt.push_str(CONFLICT_RULES_PROMPT);
    if wants_structured_output || mode == GameMode::Combat {
        prompt.push_str("\n\n");
        prompt.push_str(STRUCTURED_OUTPUT_PROMPT);
    }
    prompt
}

fn character_info_block(character: &CharacterView) -> String {
    let mut block = format!(
        "## {}\n{} {} (level {}), {} background.\n",
        character.name, character.race, character.class, character.level, character.background
    );
    for ability in crate::character::Ability::all() {
        let modifier = character.abilities.modifier(ability);
        let sign = if modifier >= 0 { "+" } else { "" };
        block.push_str(&format!("{}: {}{} ", ability.abbreviation(), sign, modifier));
    }
    block.push('\n');
    block.push_str(&format!(
        "HP: {}/{} ({})\n",
        character.hit_points.current,
        character.hit_points.maximum,
        character.hp_status_term()
    ));
    if !character.conditions.is_empty() {
        let names: Vec<&str> = character.conditions.iter().map(|c| c.name()).collect();
        block.push_str(&format!("Conditions: {}\n", names.join(", ")));
    }
    block
}

fn narrative_context_block(session: &Session, location_description: Option<&str>) -> String {
    let dt = &session.tracked_narrative_state.environment_state.current_datetime;
    let mut block = String::new();
    if let Some(desc) = location_description {
        block.push_str(&format!("Current location: {desc}\n"));
    }
    block.push_str(&format!(
        "Time: {:02}:{:02}, {}\n",
        dt.hour,
        dt.minute,
        dt.day_phase()
    ));
    block
}

pub struct AidmRequest<'a> {
    pub session: &'a Session,
    pub character: &'a CharacterView,
    pub intent: &'a Intent,
    pub validation: &'a ValidationResult,
    pub location_description: Option<&'a str>,
    pub memory_block: &'a str,
    pub known_entities_block: &'a str,
    pub player_input: &'a str,
}

pub struct AidmResponse {
    pub narrative_text: String,
    pub parsed_mechanics: Vec<Mechanic>,
    pub timed_out: bool,
    pub tokens_used: usize,
}

/// Run the AIDM node: assemble the prompt in the exact order specified by
/// §4.5, call the `Generator`, and parse/strip the structured-output
/// channel. A Generator failure or timeout returns the fixed fallback text
/// rather than propagating an error, matching §7's CapabilityTimeout
/// recovery action.
pub async fn run_aidm(generator: &dyn Generator, req: &AidmRequest<'_>) -> AidmResponse {
    let system = build_system_prompt(req.session.game_mode, req.intent.wants_structured_output());

    let mut user_message = String::new();
    user_message.push_str(&character_info_block(req.character));
    user_message.push('\n');
    user_message.push_str(&narrative_context_block(req.session, req.location_description));
    if !req.validation.ok {
        user_message.push_str(&format!(
            "\n## ACTION FAILED:\n{}\n",
            req.validation.reason.as_deref().unwrap_or("The action is not possible.")
        ));
    }
    if !req.known_entities_block.is_empty() {
        user_message.push_str("\n## Known Entities\n");
        user_message.push_str(&trim_entities_block(req.known_entities_block, ENTITIES_TOKEN_BUDGET));
    }
    if !req.memory_block.is_empty() {
        user_message.push_str("\n## Relevant Memory\n");
        user_message.push_str(req.memory_block);
    }
    user_message.push_str(&format!("\n## Player\n{}\n", req.player_input));

    let history: Vec<(String, String)> = req
        .session
        .recent_history(20)
        .iter()
        .map(|h| {
            let role = match h.sender {
                crate::state::Sender::Player => "user",
                crate::state::Sender::Dm => "assistant",
            };
            (role.to_string(), h.message.clone())
        })
        .collect();
    let history = trim_history(history, HISTORY_TOKEN_BUDGET);

    let call = generator.complete(&system, &history, &user_message, 0.8, MemoryBudget::RESERVED_REPLY);
    let result = tokio::time::timeout(GENERATOR_SOFT_TIMEOUT, call).await;

    match result {
        Ok(Ok(GeneratedReply { text, tokens_used })) => {
            let (stripped, mechanics) = extract_structured_mechanics(&text);
            AidmResponse {
                narrative_text: stripped,
                parsed_mechanics: mechanics,
                timed_out: false,
                tokens_used,
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Generator call failed, using fallback text");
            AidmResponse {
                narrative_text: FALLBACK_APOLOGY.to_string(),
                parsed_mechanics: Vec::new(),
                timed_out: false,
                tokens_used: 0,
            }
        }
        Err(_) => {
            warn!(session_id = %req.session.session_id, "Generator call exceeded soft timeout");
            AidmResponse {
                narrative_text: FALLBACK_APOLOGY.to_string(),
                parsed_mechanics: Vec::new(),
                timed_out: true,
                tokens_used: 0,
            }
        }
    }
}

/// A `CoreError` variant callers may want to surface when the turn as a
/// whole must fail because the Generator is entirely unconfigured (§7:
/// "CapabilityUnavailable on Generator" reaches the caller).
pub fn generator_unavailable(source: impl std::error::Error + Send + Sync + 'static) -> CoreError {
    CoreError::capability_unavailable("Generator", source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resting_mode_reuses_exploration_addendum() {
        assert_eq!(mode_addendum(GameMode::Resting), mode_addendum(GameMode::Exploration));
    }

    #[test]
    fn system_prompt_includes_structured_output_block_in_combat() {
        let prompt = build_system_prompt(GameMode::Combat, false);
        assert!(prompt.contains("Structured Output"));
    }

    #[test]
    fn system_prompt_omits_structured_output_when_not_needed() {
        let prompt = build_system_prompt(GameMode::Exploration, false);
        assert!(!prompt.contains("Structured Output"));
    }

    #[test]
    fn trim_entities_block_drops_lines_past_budget() {
        let block: String = (0..50).map(|i| format!("- npc_{i}\n")).collect();
        let trimmed = trim_entities_block(&block, 20);
        assert!(trimmed.lines().count() < 50);
        assert!(estimate_tokens(&trimmed) <= 20 + 10);
    }

    #[test]
    fn trim_history_keeps_most_recent_turns() {
        let history: Vec<(String, String)> = (0..30)
            .map(|i| ("user".to_string(), "x".repeat(40) + &i.to_string()))
            .collect();
        let trimmed = trim_history(history.clone(), 100);
        assert!(trimmed.len() < history.len());
        assert_eq!(trimmed.last(), history.last());
    }

    #[test]
    fn validation_failure_appends_action_failed_block() {
        let mut message = String::new();
        let validation = ValidationResult::fail("Area is unsafe; cannot long rest here.");
        if !validation.ok {
            message.push_str(&format!("## ACTION FAILED:\n{}\n", validation.reason.unwrap()));
        }
        assert!(message.contains("ACTION FAILED"));
        assert!(message.contains("Area is unsafe"));
    }
}
