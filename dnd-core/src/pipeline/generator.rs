//! Concrete `Generator` implementation backed by `claude::Claude` (§6, §10.3).
//!
//! Mirrors `dm::agent::DungeonMaster`'s composition: a `Claude` client plus
//! a small config struct, constructed via `new`/`from_env`, builder methods
//! for the rest.

use crate::capabilities::{GeneratedReply, Generator};
use crate::error::CoreError;
use async_trait::async_trait;
use claude::{Claude, Message, Request};

/// Configuration for the Claude-backed generator (§10.3: builder-pattern,
/// matching `DmConfig`).
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub model: Option<String>,
    pub default_temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            default_temperature: 0.8,
        }
    }
}

impl GeneratorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }
}

pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(api_key: impl Into<String>, config: GeneratorConfig) -> Self {
        let mut client = Claude::new(api_key);
        if let Some(model) = &config.model {
            client = client.with_model(model.clone());
        }
        Self { client, config }
    }

    /// Construct from `ANTHROPIC_API_KEY`, matching `Claude::from_env`/
    /// `DungeonMaster::from_env` (§10.3).
    pub fn from_env(config: GeneratorConfig) -> Result<Self, claude::Error> {
        let mut client = Claude::from_env()?;
        if let Some(model) = &config.model {
            client = client.with_model(model.clone());
        }
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn complete(
        &self,
        system: &str,
        history: &[(String, String)],
        user_message: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<GeneratedReply, CoreError> {
        let mut messages: Vec<Message> = history
            .iter()
            .map(|(role, text)| {
                if role == "assistant" {
                    Message::assistant(text.clone())
                } else {
                    Message::user(text.clone())
                }
            })
            .collect();
        messages.push(Message::user(user_message.to_string()));

        let request = Request::new(messages)
            .with_system(system.to_string())
            .with_max_tokens(max_tokens)
            .with_temperature(if temperature > 0.0 { temperature } else { self.config.default_temperature });

        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| CoreError::capability_unavailable("Generator", e))?;

        Ok(GeneratedReply {
            text: response.text(),
            tokens_used: response.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_temperature() {
        let config = GeneratorConfig::default();
        assert_eq!(config.default_temperature, 0.8);
        assert!(config.model.is_none());
    }

    #[test]
    fn with_model_overrides_default() {
        let config = GeneratorConfig::default().with_model("claude-sonnet-4-20250514");
        assert_eq!(config.model.as_deref(), Some("claude-sonnet-4-20250514"));
    }
}
