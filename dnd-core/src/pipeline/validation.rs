//! Validation node (§4.3, C10).
//!
//! Per-intent validators narrowed from `rules.rs`'s much larger
//! `RulesEngine::resolve` match to the spec's smaller intent set. Each
//! validator reads the fresh `CharacterView` the caller loaded via
//! `CharacterStore::load` (§9's cyclic-update decision) — validators never
//! receive a cached copy.

use crate::character::{is_known_skill, CharacterView};
use crate::pipeline::intent::{Intent, ManageItemAction, RestDuration};
use crate::state::{GameMode, Session};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub ok: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self { ok: false, reason: Some(reason.into()) }
    }
}

/// Extra facts a validator needs beyond the character view, gathered by
/// the pipeline before calling [`validate`].
pub struct ValidationContext<'a> {
    pub location_at_current: bool,
    pub location_has_item: &'a dyn Fn(&str) -> bool,
    pub minutes_since_last_long_rest: u32,
}

pub fn validate(intent: &Intent, session: &Session, character: &CharacterView, ctx: &ValidationContext) -> ValidationResult {
    match intent {
        Intent::CastSpell { spell_name, is_ritual } => validate_cast_spell(spell_name, *is_ritual, session, character),
        Intent::WeaponAttack { weapon_name } => validate_weapon_attack(weapon_name, character),
        Intent::UseFeature { feature_name, resource } => validate_use_feature(feature_name, resource.as_deref(), character),
        Intent::UseItem { item_name } => validate_use_item(item_name, character),
        Intent::ManageItem { item_name, action_type } => validate_manage_item(item_name, *action_type, character, ctx),
        Intent::Rest { duration } => validate_rest(*duration, session, ctx),
        Intent::Action { action, skill } => validate_action(action, skill.as_deref()),
        Intent::Explore { .. } | Intent::Recall | Intent::AskRule | Intent::General => ValidationResult::ok(),
    }
}

fn validate_cast_spell(spell_name: &str, is_ritual: bool, session: &Session, character: &CharacterView) -> ValidationResult {
    if !character.spellcasting.knows(spell_name) {
        return ValidationResult::fail(format!("{} doesn't know a spell called {spell_name}.", character.name));
    }
    let has_slot = character
        .spellcasting
        .slots
        .values()
        .any(|slot| slot.available > 0);
    if !has_slot {
        return ValidationResult::fail("No spell slots remaining.");
    }
    if is_ritual && session.game_mode == GameMode::Combat {
        return ValidationResult::fail("Ritual casting is not allowed in combat.");
    }
    if character.conditions.iter().any(|c| matches!(c, crate::character::Condition::Unconscious | crate::character::Condition::Paralyzed | crate::character::Condition::Stunned)) {
        return ValidationResult::fail(format!("{} cannot cast spells in this condition.", character.name));
    }
    ValidationResult::ok()
}

fn validate_weapon_attack(weapon_name: &str, character: &CharacterView) -> ValidationResult {
    if character.is_incapacitated() {
        return ValidationResult::fail(format!("{} cannot act while incapacitated.", character.name));
    }
    let equipped_or_held = character.inventory.find(weapon_name).is_some();
    if !equipped_or_held {
        return ValidationResult::fail(format!("{} isn't carrying a {weapon_name}.", character.name));
    }
    ValidationResult::ok()
}

fn validate_use_feature(feature_name: &str, resource: Option<&str>, character: &CharacterView) -> ValidationResult {
    let feature = character.feature(feature_name);
    match feature {
        None => ValidationResult::fail(format!("{} doesn't have a feature called {feature_name}.", character.name)),
        Some(f) if f.uses_remaining == 0 => {
            ValidationResult::fail(format!("No uses of {feature_name} remaining."))
        }
        Some(f) => {
            if let Some(res) = resource {
                if !f.recharge.eq_ignore_ascii_case(res) {
                    return ValidationResult::fail(format!("{feature_name} does not recharge on {res}."));
                }
            }
            ValidationResult::ok()
        }
    }
}

fn validate_use_item(item_name: &str, character: &CharacterView) -> ValidationResult {
    match character.inventory.find(item_name) {
        None => ValidationResult::fail(format!("{} doesn't have a {item_name}.", character.name)),
        Some(item) if item.consumable && item.quantity == 0 => {
            ValidationResult::fail(format!("No {item_name} left."))
        }
        Some(_) => ValidationResult::ok(),
    }
}

fn validate_manage_item(
    item_name: &str,
    action_type: ManageItemAction,
    character: &CharacterView,
    ctx: &ValidationContext,
) -> ValidationResult {
    match action_type {
        ManageItemAction::Take => {
            if (ctx.location_has_item)(item_name) {
                ValidationResult::ok()
            } else {
                ValidationResult::fail(format!("There's no {item_name} here to take."))
            }
        }
        ManageItemAction::Drop | ManageItemAction::Equip | ManageItemAction::Unequip => {
            if character.inventory.find(item_name).is_some() {
                ValidationResult::ok()
            } else {
                ValidationResult::fail(format!("{} isn't carrying a {item_name}.", character.name))
            }
        }
        ManageItemAction::Inventory => ValidationResult::ok(),
    }
}

fn validate_rest(duration: RestDuration, session: &Session, ctx: &ValidationContext) -> ValidationResult {
    if session.game_mode == GameMode::Combat {
        return ValidationResult::fail("Cannot rest while in combat.");
    }
    let location_id = session.current_location_id.as_deref().unwrap_or("");
    let unsafe_here = session
        .tracked_narrative_state
        .environment_state
        .area_has_flag(location_id, "hostile")
        || session
            .tracked_narrative_state
            .environment_state
            .area_has_flag(location_id, "unsafe");
    if unsafe_here {
        return ValidationResult::fail("Area is unsafe; cannot long rest here.");
    }
    if matches!(duration, RestDuration::Long) {
        if ctx.minutes_since_last_long_rest < 60 {
            return ValidationResult::fail("Not enough time has passed since your last long rest.");
        }
        let phase = session.tracked_narrative_state.environment_state.current_datetime.day_phase();
        if !matches!(phase, crate::state::DayPhase::Evening | crate::state::DayPhase::Night) {
            return ValidationResult::fail("A long rest must be taken in the evening or overnight.");
        }
    }
    ValidationResult::ok()
}

fn validate_action(action: &str, skill: Option<&str>) -> ValidationResult {
    if action.trim().is_empty() {
        return ValidationResult::fail("No action specified.");
    }
    if let Some(skill_name) = skill {
        if !is_known_skill(skill_name) {
            return ValidationResult::fail(format!("{skill_name} isn't a known skill."));
        }
    }
    ValidationResult::ok()
}
