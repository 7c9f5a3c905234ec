//! Session state: game mode, tracked narrative state, and the in-game clock.
//!
//! Mirrors `world.rs`'s `GameMode`/`GameTime` shape, generalized to the
//! five conversational modes and the richer tracked-state fields this
//! engine's pipeline reads and writes each turn.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Conversational game mode. Transitions are governed by
/// [`crate::pipeline::narrative::apply_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GameMode {
    #[default]
    Intro,
    Exploration,
    Combat,
    Social,
    Resting,
}

impl GameMode {
    pub fn name(&self) -> &'static str {
        match self {
            GameMode::Intro => "intro",
            GameMode::Exploration => "exploration",
            GameMode::Combat => "combat",
            GameMode::Social => "social",
            GameMode::Resting => "resting",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Time-of-day bucket, a pure function of `GameTime::hour` (§4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayPhase {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl DayPhase {
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            5..=11 => DayPhase::Morning,
            12..=16 => DayPhase::Afternoon,
            17..=20 => DayPhase::Evening,
            _ => DayPhase::Night,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DayPhase::Morning => "Morning",
            DayPhase::Afternoon => "Afternoon",
            DayPhase::Evening => "Evening",
            DayPhase::Night => "Night",
        }
    }
}

impl fmt::Display for DayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// In-game absolute clock. Carried over from the teacher's `world::GameTime`
/// cascading-advance logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl GameDateTime {
    pub fn new(year: i32, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    pub fn advance_minutes(&mut self, minutes: u32) {
        let total_minutes = self.minute as u32 + minutes;
        self.minute = (total_minutes % 60) as u8;
        let hours_to_add = total_minutes / 60;
        self.advance_hours(hours_to_add);
    }

    pub fn advance_hours(&mut self, hours: u32) {
        let total_hours = self.hour as u32 + hours;
        self.hour = (total_hours % 24) as u8;
        let days_to_add = total_hours / 24;
        self.advance_days(days_to_add);
    }

    pub fn advance_days(&mut self, days: u32) {
        if days == 0 {
            return;
        }
        let total_days = self.day as u32 + days;
        self.day = ((total_days - 1) % 30 + 1) as u8;
        let months_to_add = (total_days - 1) / 30;
        self.advance_months(months_to_add);
    }

    pub fn advance_months(&mut self, months: u32) {
        if months == 0 {
            return;
        }
        let total_months = self.month as u32 + months;
        self.month = ((total_months - 1) % 12 + 1) as u8;
        let years_to_add = (total_months - 1) / 12;
        self.year += years_to_add as i32;
    }

    pub fn day_phase(&self) -> DayPhase {
        DayPhase::from_hour(self.hour)
    }
}

impl Default for GameDateTime {
    fn default() -> Self {
        Self::new(1492, 3, 1, 10, 0)
    }
}

/// Per-region environmental flags plus the shared clock (§3
/// `environment_state`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentState {
    pub current_datetime: GameDateTime,
    pub area_flags: HashMap<String, HashSet<String>>,
}

impl EnvironmentState {
    pub fn current_day_phase(&self) -> DayPhase {
        self.current_datetime.day_phase()
    }

    pub fn area_has_flag(&self, region_id: &str, flag: &str) -> bool {
        self.area_flags
            .get(region_id)
            .map(|flags| flags.contains(flag))
            .unwrap_or(false)
    }
}

/// The mutable narrative ledger a session accumulates turn over turn (§3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackedNarrativeState {
    /// quest_id -> stage_id, or the literal "completed"/"failed".
    pub quest_status: HashMap<String, String>,
    /// npc_id -> disposition, or the literal "dead".
    pub npc_dispositions: HashMap<String, String>,
    /// location_id -> free-form flags/counters.
    pub location_states: HashMap<String, HashMap<String, String>>,
    pub global_flags: HashSet<String>,
    pub environment_state: EnvironmentState,
    pub feature_use_counts: HashMap<String, u32>,
    pub spell_cast_counts: HashMap<String, u32>,
    /// Running clock total since session start, for "time since X" checks
    /// like the long-rest cooldown (§4.3).
    pub total_elapsed_minutes: u64,
    pub last_long_rest_at_minutes: Option<u64>,
}

impl TrackedNarrativeState {
    pub fn set_event_fired(&mut self, event_id: &str) {
        self.global_flags.insert(format!("event_fired_{event_id}"));
    }

    /// Minutes since the last completed long rest, or `u32::MAX` if none
    /// has happened yet this session (so the first long rest is never
    /// blocked by the cooldown).
    pub fn minutes_since_last_long_rest(&self) -> u32 {
        match self.last_long_rest_at_minutes {
            Some(at) => self.total_elapsed_minutes.saturating_sub(at).min(u32::MAX as u64) as u32,
            None => u32::MAX,
        }
    }

    pub fn record_long_rest(&mut self) {
        self.last_long_rest_at_minutes = Some(self.total_elapsed_minutes);
    }

    pub fn event_has_fired(&self, event_id: &str) -> bool {
        self.global_flags
            .contains(&format!("event_fired_{event_id}"))
    }

    pub fn location_flag(&self, location_id: &str, key: &str) -> Option<&str> {
        self.location_states
            .get(location_id)
            .and_then(|m| m.get(key))
            .map(|s| s.as_str())
    }

    pub fn set_location_flag(&mut self, location_id: &str, key: impl Into<String>, value: impl Into<String>) {
        self.location_states
            .entry(location_id.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }
}

/// A single turn exchange for the bounded conversation window (§3 `history`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    Player,
    Dm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sender: Sender,
    pub message: String,
    pub timestamp: GameDateTime,
}

/// A pinned memory reference, ordered, always included in context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedMemory {
    pub memory_id: String,
    pub importance: u8,
    pub note: Option<String>,
}

/// The full per-session state persisted by `SessionStore` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub character_id: String,
    pub world_id: Option<String>,
    pub campaign_module_id: Option<String>,

    pub game_mode: GameMode,
    pub previous_game_mode: GameMode,
    pub current_location_id: Option<String>,

    pub history: Vec<HistoryEntry>,
    pub tracked_narrative_state: TrackedNarrativeState,

    pub summary: Option<String>,
    pub pinned_memories: Vec<PinnedMemory>,

    /// Monotonic revision used for optimistic-concurrency checkpoint writes.
    pub revision: u64,

    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        character_id: impl Into<String>,
    ) -> Self {
        let now = GameDateTime::default();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            character_id: character_id.into(),
            world_id: None,
            campaign_module_id: None,
            game_mode: GameMode::Intro,
            previous_game_mode: GameMode::Intro,
            current_location_id: None,
            history: Vec::new(),
            tracked_narrative_state: TrackedNarrativeState {
                environment_state: EnvironmentState {
                    current_datetime: now,
                    ..Default::default()
                },
                ..Default::default()
            },
            summary: None,
            pinned_memories: Vec::new(),
            revision: 0,
            created_at: "1492-03-01T10:00:00Z".to_string(),
            updated_at: "1492-03-01T10:00:00Z".to_string(),
        }
    }

    pub fn with_world(mut self, world_id: impl Into<String>) -> Self {
        self.world_id = Some(world_id.into());
        self
    }

    pub fn with_campaign_module(mut self, module_id: impl Into<String>) -> Self {
        self.campaign_module_id = Some(module_id.into());
        self
    }

    pub fn push_history(&mut self, sender: Sender, message: impl Into<String>) {
        let timestamp = self.tracked_narrative_state.environment_state.current_datetime.clone();
        self.history.push(HistoryEntry {
            sender,
            message: message.into(),
            timestamp,
        });
    }

    /// The last `n` history entries, for prompt assembly; never mutates
    /// the unbounded record.
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn transition_mode(&mut self, to: GameMode) {
        if to == self.game_mode {
            return;
        }
        self.previous_game_mode = self.game_mode;
        self.game_mode = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_phase_boundaries_match_spec_table() {
        assert_eq!(DayPhase::from_hour(5), DayPhase::Morning);
        assert_eq!(DayPhase::from_hour(11), DayPhase::Morning);
        assert_eq!(DayPhase::from_hour(12), DayPhase::Afternoon);
        assert_eq!(DayPhase::from_hour(16), DayPhase::Afternoon);
        assert_eq!(DayPhase::from_hour(17), DayPhase::Evening);
        assert_eq!(DayPhase::from_hour(20), DayPhase::Evening);
        assert_eq!(DayPhase::from_hour(21), DayPhase::Night);
        assert_eq!(DayPhase::from_hour(4), DayPhase::Night);
    }

    #[test]
    fn advance_minutes_cascades_into_hours_and_days() {
        let mut t = GameDateTime::new(1492, 3, 1, 23, 50);
        t.advance_minutes(20);
        assert_eq!((t.day, t.hour, t.minute), (2, 0, 10));
    }

    #[test]
    fn transition_mode_tracks_previous_distinct_mode() {
        let mut s = Session::new("s1", "u1", "c1");
        assert_eq!(s.game_mode, GameMode::Intro);
        s.transition_mode(GameMode::Exploration);
        assert_eq!(s.previous_game_mode, GameMode::Intro);
        s.transition_mode(GameMode::Exploration);
        // idempotent no-op: previous unchanged on a same-mode transition
        assert_eq!(s.previous_game_mode, GameMode::Intro);
        s.transition_mode(GameMode::Combat);
        assert_eq!(s.previous_game_mode, GameMode::Exploration);
    }

    #[test]
    fn event_fired_flag_round_trips() {
        let mut state = TrackedNarrativeState::default();
        assert!(!state.event_has_fired("tomb_opened"));
        state.set_event_fired("tomb_opened");
        assert!(state.event_has_fired("tomb_opened"));
    }

    #[test]
    fn long_rest_cooldown_is_unbounded_before_first_rest() {
        let state = TrackedNarrativeState::default();
        assert_eq!(state.minutes_since_last_long_rest(), u32::MAX);
    }

    #[test]
    fn long_rest_cooldown_tracks_elapsed_minutes() {
        let mut state = TrackedNarrativeState::default();
        state.total_elapsed_minutes = 100;
        state.record_long_rest();
        state.total_elapsed_minutes = 160;
        assert_eq!(state.minutes_since_last_long_rest(), 60);
    }
}
