//! The character view the core reads and partially writes through
//! `CharacterStore` (§3). Narrowed from the teacher's full `world::Character`
//! (which also owns class resources, spellbooks, and item catalogs — all
//! out of scope per spec §1's "character-sheet CRUD" exclusion) down to the
//! fields the pipeline actually touches.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The six ability scores, matching `world::Ability`'s naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    /// D&D 5e modifier: floor((score - 10) / 2).
    pub fn modifier(&self, ability: Ability) -> i8 {
        let score = self.get(ability) as i8;
        (score - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

/// A known D&D skill name, used only for validating the `action.skill` slot
/// (§4.3) — the core does not compute skill checks itself.
pub const KNOWN_SKILLS: &[&str] = &[
    "athletics",
    "acrobatics",
    "sleight of hand",
    "stealth",
    "arcana",
    "history",
    "investigation",
    "nature",
    "religion",
    "animal handling",
    "insight",
    "medicine",
    "perception",
    "survival",
    "deception",
    "intimidation",
    "performance",
    "persuasion",
];

pub fn is_known_skill(name: &str) -> bool {
    KNOWN_SKILLS.contains(&name.to_lowercase().as_str())
}

/// D&D 5e conditions the mechanics node may add/remove (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    Exhaustion,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Blinded => "Blinded",
            Condition::Charmed => "Charmed",
            Condition::Deafened => "Deafened",
            Condition::Frightened => "Frightened",
            Condition::Grappled => "Grappled",
            Condition::Incapacitated => "Incapacitated",
            Condition::Invisible => "Invisible",
            Condition::Paralyzed => "Paralyzed",
            Condition::Petrified => "Petrified",
            Condition::Poisoned => "Poisoned",
            Condition::Prone => "Prone",
            Condition::Restrained => "Restrained",
            Condition::Stunned => "Stunned",
            Condition::Unconscious => "Unconscious",
            Condition::Exhaustion => "Exhaustion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "blinded" => Some(Condition::Blinded),
            "charmed" => Some(Condition::Charmed),
            "deafened" => Some(Condition::Deafened),
            "frightened" => Some(Condition::Frightened),
            "grappled" => Some(Condition::Grappled),
            "incapacitated" => Some(Condition::Incapacitated),
            "invisible" => Some(Condition::Invisible),
            "paralyzed" => Some(Condition::Paralyzed),
            "petrified" => Some(Condition::Petrified),
            "poisoned" => Some(Condition::Poisoned),
            "prone" => Some(Condition::Prone),
            "restrained" => Some(Condition::Restrained),
            "stunned" => Some(Condition::Stunned),
            "unconscious" => Some(Condition::Unconscious),
            "exhaustion" => Some(Condition::Exhaustion),
            _ => None,
        }
    }

    /// Conditions that bar casting/attacking per §4.3's validators.
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            Condition::Incapacitated
                | Condition::Paralyzed
                | Condition::Petrified
                | Condition::Stunned
                | Condition::Unconscious
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }

    /// Clamp into `[0, maximum]`; an out-of-range value entering here is an
    /// `InvariantViolation` the caller must have already logged (§7).
    pub fn clamp(&mut self) {
        self.current = self.current.clamp(0, self.maximum);
    }

    pub fn apply_damage(&mut self, amount: i32) {
        self.current = (self.current - amount).max(0);
    }

    pub fn apply_healing(&mut self, amount: i32) {
        self.current = (self.current + amount).min(self.maximum);
    }

    pub fn ratio(&self) -> f64 {
        if self.maximum <= 0 {
            0.0
        } else {
            self.current as f64 / self.maximum as f64
        }
    }
}

/// A single spell-slot level's availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellSlot {
    pub available: u8,
    pub maximum: u8,
}

impl SpellSlot {
    pub fn restore(&mut self) {
        self.available = self.maximum;
    }

    pub fn spend(&mut self) -> bool {
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpellcastingData {
    /// spell level (0 = cantrip) -> slot
    pub slots: HashMap<u8, SpellSlot>,
    pub known_spells: Vec<String>,
}

impl SpellcastingData {
    pub fn knows(&self, spell_name: &str) -> bool {
        self.known_spells
            .iter()
            .any(|s| s.eq_ignore_ascii_case(spell_name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Inventory {
    pub items: Vec<InventoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: u32,
    pub equipped: bool,
    pub consumable: bool,
}

impl Inventory {
    pub fn find(&self, name: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut InventoryItem> {
        self.items
            .iter_mut()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn has_equipped(&self, name: &str) -> bool {
        self.find(name).map(|i| i.equipped).unwrap_or(false)
    }
}

/// A feature (class/race/background) the character can expend uses of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub uses_remaining: u32,
    pub recharge: String,
}

/// The transient, per-turn "the DM is waiting on a roll" flags (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatRollType {
    Attack,
    Initiative,
}

/// The read-only-plus-write-back view the core exchanges with
/// `CharacterStore` (§3). The core never caches this across turns; each node
/// that needs it calls `CharacterStore::load` fresh (§4.3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterView {
    pub character_id: String,
    pub name: String,
    pub race: String,
    pub class: String,
    pub level: u8,
    pub background: String,
    pub abilities: AbilityScores,
    /// skill name (lowercase) -> proficient
    pub skills: HashMap<String, bool>,
    pub hit_points: HitPoints,
    pub conditions: Vec<Condition>,
    pub spellcasting: SpellcastingData,
    pub inventory: Inventory,
    pub features: Vec<Feature>,

    /// Set by ApplyMechanics when the DM output requires a player roll;
    /// cleared once the pipeline observes the player supplying one.
    pub pending_ability_check: Option<String>,
    pub pending_combat_roll: Option<CombatRollType>,
}

impl CharacterView {
    pub fn is_incapacitated(&self) -> bool {
        self.conditions.iter().any(Condition::is_incapacitating)
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn feature_mut(&mut self, name: &str) -> Option<&mut Feature> {
        self.features
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// A coarse narrative term for HP ratio, used by AIDM prompt assembly;
    /// grounded on the teacher's `DungeonMaster::describe_hp_status`.
    pub fn hp_status_term(&self) -> &'static str {
        let ratio = self.hit_points.ratio();
        if self.hit_points.current <= 0 {
            "down"
        } else if ratio <= 0.25 {
            "critically wounded"
        } else if ratio <= 0.5 {
            "badly hurt"
        } else if ratio <= 0.75 {
            "wounded"
        } else {
            "healthy"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CharacterView {
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
            spellcasting: SpellcastingData::default(),
            inventory: Inventory::default(),
            features: Vec::new(),
            pending_ability_check: None,
            pending_combat_roll: None,
        }
    }

    #[test]
    fn ability_modifier_matches_5e_table() {
        let mut abilities = AbilityScores::default();
        abilities.strength = 8;
        assert_eq!(abilities.modifier(Ability::Strength), -1);
        abilities.strength = 20;
        assert_eq!(abilities.modifier(Ability::Strength), 5);
    }

    #[test]
    fn hit_points_never_leave_valid_range() {
        let mut hp = HitPoints::new(10);
        hp.apply_damage(100);
        assert_eq!(hp.current, 0);
        hp.apply_healing(1000);
        assert_eq!(hp.current, 10);
    }

    #[test]
    fn hp_status_term_reflects_ratio() {
        let mut c = sample();
        c.hit_points.current = 5; // 5/30 ~ 0.17
        assert_eq!(c.hp_status_term(), "critically wounded");
        c.hit_points.current = 0;
        assert_eq!(c.hp_status_term(), "down");
    }

    #[test]
    fn is_incapacitated_checks_condition_set() {
        let mut c = sample();
        assert!(!c.is_incapacitated());
        c.conditions.push(Condition::Stunned);
        assert!(c.is_incapacitated());
    }

    #[test]
    fn known_skill_lookup_is_case_insensitive() {
        assert!(is_known_skill("Persuasion"));
        assert!(!is_known_skill("juggling"));
    }
}
