//! Agent configuration value object.
//!
//! [`AgentConfiguration`] is the immutable bundle of settings attached to an
//! agent record: system prompt, LLM selection, conversation parameters,
//! toolset names, and template-specific keys. The orchestrator resolves it
//! into the flat mapping the executor receives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Metadata, ValidationError};

/// Conversation-config key holding the sampling temperature.
const KEY_TEMPERATURE: &str = "temperature";
/// Conversation-config key holding the completion token budget.
const KEY_MAX_TOKENS: &str = "max_tokens";
/// Legacy camelCase spelling normalized during resolution.
const KEY_HISTORY_LENGTH_CAMEL: &str = "historyLength";

/// Immutable configuration attached to an agent record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    /// System prompt injected ahead of every conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Identifier of the LLM configuration the template should use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_config_id: Option<String>,
    /// Conversation parameters; recognized keys are `temperature`
    /// (in `[0.0, 2.0]`), `max_tokens` (positive integer), and
    /// `historyLength`. Unrecognized keys pass through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_config: Option<Metadata>,
    /// Ordered toolset names the template may bind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toolsets: Vec<String>,
    /// Template-specific configuration keys.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub template_config: Metadata,
}

impl AgentConfiguration {
    /// Create a configuration, validating the recognized conversation keys.
    pub fn new(
        system_prompt: Option<String>,
        llm_config_id: Option<String>,
        conversation_config: Option<Metadata>,
        toolsets: Vec<String>,
        template_config: Metadata,
    ) -> Result<Self, ValidationError> {
        let config = Self {
            system_prompt,
            llm_config_id,
            conversation_config,
            toolsets,
            template_config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the recognized conversation-config keys.
    ///
    /// Temperature must be within `[0.0, 2.0]` and `max_tokens` must be a
    /// positive integer; both are optional.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let Some(conv) = &self.conversation_config else {
            return Ok(());
        };
        if let Some(value) = conv.get(KEY_TEMPERATURE) {
            let temp = value
                .as_f64()
                .ok_or(ValidationError::TemperatureOutOfRange(f64::NAN))?;
            if !(0.0..=2.0).contains(&temp) {
                return Err(ValidationError::TemperatureOutOfRange(temp));
            }
        }
        if let Some(value) = conv.get(KEY_MAX_TOKENS) {
            let max_tokens = value
                .as_i64()
                .ok_or(ValidationError::MaxTokensNotPositive(0))?;
            if max_tokens <= 0 {
                return Err(ValidationError::MaxTokensNotPositive(max_tokens));
            }
        }
        Ok(())
    }

    /// Default sampling temperature, when configured.
    pub fn temperature(&self) -> Option<f64> {
        self.conversation_config
            .as_ref()
            .and_then(|conv| conv.get(KEY_TEMPERATURE))
            .and_then(Value::as_f64)
    }

    /// Default completion token budget, when configured.
    pub fn max_tokens(&self) -> Option<u32> {
        self.conversation_config
            .as_ref()
            .and_then(|conv| conv.get(KEY_MAX_TOKENS))
            .and_then(Value::as_u64)
            .map(|tokens| tokens as u32)
    }

    /// Whether any toolsets are configured.
    pub fn has_toolsets(&self) -> bool {
        !self.toolsets.is_empty()
    }

    /// Resolve the flat mapping handed to the executor.
    ///
    /// `template_config` forms the base; the core fields (`system_prompt`,
    /// `llm_config_id`, `toolset_configs`) are layered on top, and the
    /// conversation config is merged last so its keys win. The legacy
    /// `historyLength` spelling is normalized to `history_length`.
    pub fn resolve_template_configuration(&self) -> Metadata {
        let mut merged = self.template_config.clone();
        if let Some(prompt) = &self.system_prompt {
            merged.insert("system_prompt".to_string(), Value::String(prompt.clone()));
        }
        if let Some(llm) = &self.llm_config_id {
            merged.insert("llm_config_id".to_string(), Value::String(llm.clone()));
        }
        if !self.toolsets.is_empty() {
            merged.insert(
                "toolset_configs".to_string(),
                Value::Array(
                    self.toolsets
                        .iter()
                        .map(|name| Value::String(name.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(conv) = &self.conversation_config {
            for (key, value) in conv {
                let key = if key == KEY_HISTORY_LENGTH_CAMEL {
                    "history_length".to_string()
                } else {
                    key.clone()
                };
                merged.insert(key, value.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conv(pairs: &[(&str, Value)]) -> Option<Metadata> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn accepts_boundary_temperatures() {
        for temp in [0.0, 2.0] {
            let config = AgentConfiguration::new(
                None,
                None,
                conv(&[(KEY_TEMPERATURE, json!(temp))]),
                vec![],
                Metadata::new(),
            );
            assert!(config.is_ok(), "temperature {temp} should be accepted");
        }
    }

    #[test]
    fn rejects_out_of_range_temperatures() {
        for temp in [-0.01, 2.01] {
            let config = AgentConfiguration::new(
                None,
                None,
                conv(&[(KEY_TEMPERATURE, json!(temp))]),
                vec![],
                Metadata::new(),
            );
            assert!(config.is_err(), "temperature {temp} should be rejected");
        }
    }

    #[test]
    fn rejects_non_positive_max_tokens() {
        let config = AgentConfiguration::new(
            None,
            None,
            conv(&[(KEY_MAX_TOKENS, json!(0))]),
            vec![],
            Metadata::new(),
        );
        assert_eq!(config.unwrap_err(), ValidationError::MaxTokensNotPositive(0));
    }

    #[test]
    fn resolution_merges_with_conversation_config_winning() {
        let mut template_config = Metadata::new();
        template_config.insert("style".to_string(), json!("terse"));
        template_config.insert("temperature".to_string(), json!(0.1));

        let config = AgentConfiguration::new(
            Some("be helpful".to_string()),
            Some("llm-1".to_string()),
            conv(&[
                (KEY_TEMPERATURE, json!(0.9)),
                (KEY_HISTORY_LENGTH_CAMEL, json!(20)),
            ]),
            vec!["files".to_string(), "web".to_string()],
            template_config,
        )
        .unwrap();

        let resolved = config.resolve_template_configuration();
        assert_eq!(resolved["style"], json!("terse"));
        assert_eq!(resolved["system_prompt"], json!("be helpful"));
        assert_eq!(resolved["llm_config_id"], json!("llm-1"));
        assert_eq!(resolved["toolset_configs"], json!(["files", "web"]));
        // Conversation config overrides the template key.
        assert_eq!(resolved["temperature"], json!(0.9));
        // camelCase key normalized.
        assert_eq!(resolved["history_length"], json!(20));
        assert!(!resolved.contains_key(KEY_HISTORY_LENGTH_CAMEL));
    }

    #[test]
    fn round_trips_through_json() {
        let config = AgentConfiguration::new(
            Some("prompt".to_string()),
            None,
            conv(&[(KEY_MAX_TOKENS, json!(512))]),
            vec!["calc".to_string()],
            Metadata::from([("depth".to_string(), json!(3))]),
        )
        .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: AgentConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
