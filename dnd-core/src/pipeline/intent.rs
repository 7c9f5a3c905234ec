//! Intent classification node (§4.2, C6).
//!
//! The spec allows "any equivalent classifier or rules fallback" as long
//! as the output contract holds; this reference implementation is a
//! keyword/pattern-driven classifier, in the spirit of the teacher's
//! `dm::relevance` cheap-classification calls but without a network round
//! trip, since intent classification runs on every single turn.

use crate::capabilities::IntentClassifier;
use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The exhaustive intent set (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "slots")]
pub enum Intent {
    CastSpell { spell_name: String, is_ritual: bool },
    WeaponAttack { weapon_name: String },
    UseFeature { feature_name: String, resource: Option<String> },
    UseItem { item_name: String },
    AskRule,
    Recall,
    Action { action: String, skill: Option<String> },
    Explore { sensory_type: String },
    ManageItem { item_name: String, action_type: ManageItemAction },
    Rest { duration: RestDuration },
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManageItemAction {
    Take,
    Drop,
    Equip,
    Unequip,
    Inventory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestDuration {
    Short,
    Long,
}

impl Intent {
    /// `general`/`recall`/`ask_rule` skip Validation/Narrative (§4.1 step 2).
    pub fn skips_validation(&self) -> bool {
        matches!(self, Intent::General | Intent::Recall | Intent::AskRule)
    }

    /// Whether AIDM should request the `[MECHANICS]` structured-output
    /// block (§4.5 step 8).
    pub fn wants_structured_output(&self) -> bool {
        matches!(
            self,
            Intent::CastSpell { .. }
                | Intent::WeaponAttack { .. }
                | Intent::UseFeature { .. }
                | Intent::UseItem { .. }
                | Intent::Rest { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
    pub ok: bool,
}

impl IntentResult {
    pub fn general_fallback() -> Self {
        Self {
            intent: Intent::General,
            confidence: 0.0,
            ok: true,
        }
    }
}

fn word_after(lower: &str, markers: &[&str]) -> Option<String> {
    for marker in markers {
        if let Some(idx) = lower.find(marker) {
            let rest = lower[idx + marker.len()..].trim();
            let word: String = rest
                .split(|c: char| matches!(c, '.' | ',' | '!' | '?'))
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if !word.is_empty() {
                return Some(word);
            }
        }
    }
    None
}

/// Keyword/pattern-driven reference `IntentClassifier`.
pub struct HeuristicIntentClassifier;

impl HeuristicIntentClassifier {
    pub fn classify_sync(&self, text: &str) -> IntentResult {
        let lower = text.to_lowercase();
        let is_ritual = lower.contains("ritual");

        if let Some(spell_name) = word_after(&lower, &["cast "]) {
            return IntentResult {
                intent: Intent::CastSpell { spell_name, is_ritual },
                confidence: 0.8,
                ok: true,
            };
        }
        if let Some(weapon_name) = word_after(&lower, &["attack ", "attack with ", "strike "]) {
            return IntentResult {
                intent: Intent::WeaponAttack { weapon_name },
                confidence: 0.75,
                ok: true,
            };
        }
        if let Some(feature_name) = word_after(&lower, &["use my "]) {
            return IntentResult {
                intent: Intent::UseFeature {
                    feature_name,
                    resource: None,
                },
                confidence: 0.7,
                ok: true,
            };
        }
        if let Some(item_name) = word_after(&lower, &["use the ", "drink the ", "use "]) {
            return IntentResult {
                intent: Intent::UseItem { item_name },
                confidence: 0.7,
                ok: true,
            };
        }
        if lower.starts_with("what") && (lower.contains("rule") || lower.contains("does") || lower.contains("mean")) {
            return IntentResult {
                intent: Intent::AskRule,
                confidence: 0.6,
                ok: true,
            };
        }
        if lower.contains("remind me") || lower.contains("what happened") || lower.contains("recall") {
            return IntentResult {
                intent: Intent::Recall,
                confidence: 0.6,
                ok: true,
            };
        }
        for (verb, action_type) in [
            ("take", ManageItemAction::Take),
            ("pick up", ManageItemAction::Take),
            ("drop", ManageItemAction::Drop),
            ("equip", ManageItemAction::Equip),
            ("unequip", ManageItemAction::Unequip),
        ] {
            if let Some(item_name) = word_after(&lower, &[&format!("{verb} ")]) {
                return IntentResult {
                    intent: Intent::ManageItem { item_name, action_type },
                    confidence: 0.7,
                    ok: true,
                };
            }
        }
        if lower.contains("inventory") || lower.contains("my items") {
            return IntentResult {
                intent: Intent::ManageItem {
                    item_name: String::new(),
                    action_type: ManageItemAction::Inventory,
                },
                confidence: 0.8,
                ok: true,
            };
        }
        if lower.contains("long rest") {
            return IntentResult {
                intent: Intent::Rest { duration: RestDuration::Long },
                confidence: 0.85,
                ok: true,
            };
        }
        if lower.contains("short rest") || lower.contains("rest") {
            return IntentResult {
                intent: Intent::Rest { duration: RestDuration::Short },
                confidence: 0.7,
                ok: true,
            };
        }
        if lower.contains("look around") || lower.contains("examine") || lower.contains("listen")
            || lower.contains("search")
        {
            let sensory_type = if lower.contains("listen") {
                "auditory"
            } else {
                "visual"
            };
            return IntentResult {
                intent: Intent::Explore { sensory_type: sensory_type.to_string() },
                confidence: 0.65,
                ok: true,
            };
        }
        for verb in ["talk to", "speak to", "persuade", "intimidate", "deceive", "ask"] {
            if lower.contains(verb) {
                return IntentResult {
                    intent: Intent::Action {
                        action: verb.to_string(),
                        skill: None,
                    },
                    confidence: 0.6,
                    ok: true,
                };
            }
        }
        // Movement verbs: `action` is set to the bare verb (not the whole
        // sentence) so `narrative::movement_destination` can recognize it
        // and resolve the " to <destination>" suffix against the map.
        for verb in ["go", "walk", "travel", "head", "move"] {
            if crate::pipeline::triggers::contains_word(&lower, verb) {
                return IntentResult {
                    intent: Intent::Action {
                        action: verb.to_string(),
                        skill: None,
                    },
                    confidence: 0.6,
                    ok: true,
                };
            }
        }
        if !text.trim().is_empty() {
            return IntentResult {
                intent: Intent::Action {
                    action: text.trim().to_string(),
                    skill: None,
                },
                confidence: 0.4,
                ok: true,
            };
        }

        IntentResult::general_fallback()
    }
}

#[async_trait]
impl IntentClassifier for HeuristicIntentClassifier {
    async fn classify(&self, text: &str) -> Result<IntentResult, CoreError> {
        Ok(self.classify_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_spell_extracts_name_and_ritual_flag() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I cast fire bolt at the bandit");
        match result.intent {
            Intent::CastSpell { spell_name, is_ritual } => {
                assert!(spell_name.starts_with("fire bolt"));
                assert!(!is_ritual);
            }
            other => panic!("expected CastSpell, got {other:?}"),
        }
    }

    #[test]
    fn ritual_keyword_sets_is_ritual() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I cast detect magic as a ritual");
        match result.intent {
            Intent::CastSpell { is_ritual, .. } => assert!(is_ritual),
            other => panic!("expected CastSpell, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_falls_back_to_general() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("");
        assert_eq!(result.intent, Intent::General);
        assert!(result.ok);
    }

    #[test]
    fn long_rest_detected_before_short_rest() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I take a long rest");
        assert_eq!(result.intent, Intent::Rest { duration: RestDuration::Long });
    }

    #[test]
    fn explore_defaults_sensory_type_to_visual() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I look around the room");
        assert_eq!(
            result.intent,
            Intent::Explore { sensory_type: "visual".to_string() }
        );
    }

    #[test]
    fn movement_phrase_yields_bare_verb_action() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I go to the market");
        assert_eq!(
            result.intent,
            Intent::Action { action: "go".to_string(), skill: None }
        );
    }

    #[test]
    fn movement_verb_does_not_match_substring_of_longer_word() {
        let classifier = HeuristicIntentClassifier;
        let result = classifier.classify_sync("I remove my helmet");
        assert_ne!(
            result.intent,
            Intent::Action { action: "move".to_string(), skill: None }
        );
    }

    #[test]
    fn skips_validation_for_conversational_intents() {
        assert!(Intent::General.skips_validation());
        assert!(Intent::Recall.skips_validation());
        assert!(Intent::AskRule.skips_validation());
        assert!(!Intent::Explore { sensory_type: "visual".into() }.skips_validation());
    }
}
