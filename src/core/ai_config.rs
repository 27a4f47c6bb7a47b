//! Schema extraction prompt and chat-completion wire types
//!
//! This module provides:
//! - The instruction prompt sent ahead of the user's query
//! - Model / sampling parameters for the extraction request
//! - Request and response shapes of the chat-completions API

use serde::{Deserialize, Serialize};

/// Default chat-completions endpoint
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1/chat/completions";

/// Default model to use
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Low temperature: extraction, not creative writing
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

pub const DEFAULT_TOP_P: f32 = 1.0;

/// Instruction telling the model which JSON structure to produce
pub const DEFAULT_PARSE_INSTRUCTION: &str = r#"You extract database structure from SQL.

The user sends one or more SQL statements (queries, DDL or DML). Infer every table they touch and answer with a single JSON object, optionally wrapped in one ```json code block, and nothing else.

The object has exactly this shape:

{
  "tables": [
    {
      "table_name": "orders",
      "gpt_suggested_name": "Customer orders",
      "columns": [
        { "column_name": "id", "data_type": "int" },
        { "column_name": "status", "data_type": "enum", "enum": { "new": "Order placed", "paid": "Payment received" } }
      ],
      "relationships": [
        { "related_table": "users", "relationship_type": "many-to-one", "related_table_column": "id" }
      ]
    }
  ]
}

Rules:
1. Use the table and column names exactly as written in the SQL.
2. When a column's type cannot be inferred, use "unknown" as data_type. Never guess.
3. Only add "enum" when the SQL shows the full set of allowed values.
4. relationship_type is one of "one-to-one", "one-to-many", "many-to-one", "many-to-many", seen from the table that owns the relationship.
5. related_table_column is the referenced column, or null when it is not visible.
6. gpt_suggested_name is a short human-readable name for the table."#;

/// Settings for the extraction request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    /// Chat-completions endpoint
    pub api_base: String,

    /// Bearer token
    pub api_key: Option<String>,

    pub model: String,

    /// Prompt sent as the system message
    pub instruction: String,

    pub temperature: f32,

    pub top_p: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            instruction: DEFAULT_PARSE_INSTRUCTION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

impl AiConfig {
    /// Create a new config with custom settings
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    #[cfg(feature = "server")]
    pub fn from_env() -> Self {
        let api_base =
            std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let api_key = std::env::var("OPENAI_API_KEY").ok();

        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let temperature = parse_temperature(std::env::var("OPENAI_TEMPERATURE").ok().as_deref());

        Self::new(api_base, api_key, model).with_temperature(temperature)
    }

    /// Check if the configuration has a usable API key
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Chat request for one raw query
    pub fn build_request(&self, query: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.instruction.clone()),
                ChatMessage::user(query),
            ],
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[cfg(feature = "server")]
fn parse_temperature(raw: Option<&str>) -> f32 {
    match raw {
        None => DEFAULT_TEMPERATURE,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Ignoring invalid OPENAI_TEMPERATURE {:?}, using {}",
                value,
                DEFAULT_TEMPERATURE
            );
            DEFAULT_TEMPERATURE
        }),
    }
}

/// Chat message role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// A single chat message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Chat completion request body
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
}

/// Chat completion response body (only the parts we read)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Text of the last choice, if it has any
    pub fn last_content(&self) -> Option<&str> {
        self.choices
            .last()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = AiConfig::default();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.top_p, 1.0);
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_empty_api_key_is_missing() {
        let config = AiConfig::new(DEFAULT_API_BASE, Some(String::new()), DEFAULT_MODEL);
        assert!(!config.has_api_key());

        let config = AiConfig::new(DEFAULT_API_BASE, Some("sk-test".into()), DEFAULT_MODEL);
        assert!(config.has_api_key());
    }

    #[test]
    fn test_temperature_is_clamped() {
        assert_eq!(AiConfig::default().with_temperature(5.0).temperature, 2.0);
        assert_eq!(AiConfig::default().with_temperature(-1.0).temperature, 0.0);
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_parse_temperature() {
        assert_eq!(parse_temperature(None), 0.2);
        assert_eq!(parse_temperature(Some("0.7")), 0.7);
        assert_eq!(parse_temperature(Some(" 1 ")), 1.0);
        assert_eq!(parse_temperature(Some("warm")), 0.2);
    }

    #[test]
    fn test_build_request() {
        let config = AiConfig::default().with_instruction("extract");
        let request = config.build_request("SELECT * FROM users");

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "extract");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "SELECT * FROM users");
    }

    #[test]
    fn test_last_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "first" } },
                { "index": 1, "message": { "role": "assistant", "content": "second" } }
            ]
        }))
        .unwrap();
        assert_eq!(response.last_content(), Some("second"));

        let refusal: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        }))
        .unwrap();
        assert_eq!(refusal.last_content(), None);

        assert_eq!(ChatResponse::default().last_content(), None);
    }
}
