//! Significance classification (§4.9 step 1, §6's `SignificanceClassifier`).
//!
//! The LLM-backed variant follows `dm::relevance::RelevanceChecker`'s
//! idiom: a cheap model call with a "respond with ONLY a JSON object, no
//! markdown" instruction, then a tolerant parse that strips code fences.
//! The heuristic variant is deterministic and is what `testing` and the
//! default wiring use unless a real model is configured.

use crate::capabilities::{Generator, SignificanceClassifier, SignificanceScore};
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

/// Deterministic, keyword/length-based significance scoring. Grounded on
/// the same "cheap classifier, no network call" allowance the intent
/// classifier takes (§4.2).
pub struct HeuristicSignificanceClassifier;

const SIGNIFICANT_KEYWORDS: &[&str] = &[
    "die", "dies", "death", "killed", "quest", "reward", "discover", "found", "secret",
    "betray", "ally", "marry", "curse", "artifact", "prophecy",
];

#[async_trait]
impl SignificanceClassifier for HeuristicSignificanceClassifier {
    async fn score(&self, text: &str, _context: &str) -> Result<SignificanceScore, CoreError> {
        let lower = text.to_lowercase();
        let keyword_hits = SIGNIFICANT_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
        let length_bonus = if text.len() > 200 { 1 } else { 0 };

        let importance = (3 + keyword_hits as u8 * 2 + length_bonus).min(10);
        let is_significant = keyword_hits > 0 || text.len() > 120;

        Ok(SignificanceScore {
            is_significant,
            importance: importance.max(1),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SignificanceResponse {
    #[serde(default)]
    is_significant: bool,
    #[serde(default)]
    importance: u8,
}

fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// A `Generator`-backed significance classifier for deployments with a
/// fast/cheap model configured for this kind of call.
pub struct LlmSignificanceClassifier<'a> {
    pub generator: &'a dyn Generator,
}

#[async_trait]
impl<'a> SignificanceClassifier for LlmSignificanceClassifier<'a> {
    async fn score(&self, text: &str, context: &str) -> Result<SignificanceScore, CoreError> {
        let system = "You rate whether a D&D narrative beat is worth remembering long-term. \
            Respond with ONLY a JSON object (no markdown, no explanation outside the JSON): \
            {\"is_significant\": true|false, \"importance\": 1-10}.";
        let prompt = format!("Campaign context:\n{context}\n\nText to rate:\n{text}");

        let reply = self.generator.complete(system, &[], &prompt, 0.0, 200).await?;
        let cleaned = strip_code_fences(&reply.text);
        let parsed: SignificanceResponse = serde_json::from_str(cleaned)
            .map_err(|e| CoreError::Extraction(format!("significance response parse failed: {e}")))?;

        Ok(SignificanceScore {
            is_significant: parsed.is_significant,
            importance: parsed.importance.clamp(1, 10),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heuristic_flags_keyword_bearing_text_as_significant() {
        let classifier = HeuristicSignificanceClassifier;
        let score = classifier
            .score("The baron's secret is that he betrayed the king.", "")
            .await
            .unwrap();
        assert!(score.is_significant);
        assert!(score.importance >= 5);
    }

    #[tokio::test]
    async fn heuristic_treats_short_plain_text_as_insignificant() {
        let classifier = HeuristicSignificanceClassifier;
        let score = classifier.score("I nod.", "").await.unwrap();
        assert!(!score.is_significant);
    }

    #[test]
    fn strip_code_fences_removes_json_fence_markers() {
        let raw = "```json\n{\"is_significant\": true, \"importance\": 7}\n```";
        assert_eq!(
            strip_code_fences(raw),
            "{\"is_significant\": true, \"importance\": 7}"
        );
    }
}
