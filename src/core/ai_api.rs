//! Schema extraction through a chat-completion model
//!
//! The HTTP client is built once at startup and handed to [`ParseOrchestrator`];
//! the orchestrator sends the query, takes the last choice of the reply and turns
//! it into a candidate [`Schema`]. One attempt per query, no retries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::core::ai_config::{AiConfig, ChatRequest, ChatResponse};
use crate::core::fence::{FenceError, extract_json_block};
use crate::core::schema::Schema;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const LOG_BODY_LIMIT: usize = 500;

/// Failures between the query and a structured schema
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No API key configured. Please set OPENAI_API_KEY in .env")]
    MissingApiKey,

    #[error("Model request failed: {0}")]
    Upstream(String),

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Could not locate JSON in model reply: {0}")]
    Fence(#[from] FenceError),

    #[error("Model reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model reply has the wrong shape: {0}")]
    Shape(String),
}

/// Anything that can answer a chat-completion request
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ParseError>;
}

/// Chat-completions client over HTTPS
pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Result<Self, ParseError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ParseError::Upstream(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ParseError> {
        let api_key = self.api_key.as_ref().ok_or(ParseError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.api_base)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to model API: {}", e);
                ParseError::Upstream(format!("Failed to connect to model API: {}", e))
            })?;

        let status = response.status();
        tracing::info!("Model API response status: {}", status);

        let body = response.text().await.map_err(|e| {
            tracing::error!("Failed to read model API response: {}", e);
            ParseError::Upstream(format!("Failed to read response: {}", e))
        })?;
        tracing::debug!("Model API response body: {}", truncate_for_log(&body));

        if !status.is_success() {
            tracing::warn!("Model API error response: {}", truncate_for_log(&body));
            return Err(ParseError::Upstream(format!(
                "Model API answered {}",
                status
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Turns free-text queries into candidate schemas
#[derive(Clone)]
pub struct ParseOrchestrator {
    client: Arc<dyn CompletionClient>,
    config: AiConfig,
}

impl ParseOrchestrator {
    pub fn new(client: Arc<dyn CompletionClient>, config: AiConfig) -> Self {
        Self { client, config }
    }

    /// Ask the model for the structure behind `query`; nothing is persisted
    pub async fn parse(&self, query: &str) -> Result<Schema, ParseError> {
        tracing::info!(
            "Schema parse request: model={}, query_length={}",
            self.config.model,
            query.len()
        );

        let request = self.config.build_request(query);
        let response = self.client.complete(&request).await?;
        let content = response.last_content().ok_or(ParseError::EmptyResponse)?;

        let schema = parse_schema_reply(content)?;
        tracing::info!("Model extracted {} table(s)", schema.tables.len());
        Ok(schema)
    }
}

/// Strip the optional code fence and decode `{ "tables": [...] }`
pub fn parse_schema_reply(content: &str) -> Result<Schema, ParseError> {
    let body = extract_json_block(content)?;
    let value: serde_json::Value = serde_json::from_str(body)?;

    if !value.get("tables").is_some_and(serde_json::Value::is_array) {
        return Err(ParseError::Shape(
            "expected an object with a `tables` array".to_string(),
        ));
    }

    Ok(serde_json::from_value(value)?)
}

fn truncate_for_log(body: &str) -> String {
    match body.char_indices().nth(LOG_BODY_LIMIT) {
        Some((cut, _)) => format!(
            "{}... (truncated, total {} bytes)",
            &body[..cut],
            body.len()
        ),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai_config::{ChatChoice, MessageRole, ResponseMessage};
    use std::sync::Mutex;

    /// Replies with canned content and remembers the last request
    struct StubClient {
        reply: Option<String>,
        seen: Mutex<Option<ChatRequest>>,
    }

    impl StubClient {
        fn replying(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ParseError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(ChatResponse {
                choices: vec![ChatChoice {
                    message: ResponseMessage {
                        content: self.reply.clone(),
                    },
                }],
            })
        }
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "```json\n{\"tables\": [{\"table_name\": \"Users\", \"columns\": [{\"column_name\": \"id\", \"data_type\": \"int\"}]}]}\n```";

        let schema = parse_schema_reply(reply).unwrap();

        assert_eq!(schema.tables.len(), 1);
        // Candidate schemas keep the casing the model produced
        assert_eq!(schema.tables[0].table_name, "Users");
        assert_eq!(schema.tables[0].columns[0].data_type, "int");
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert!(matches!(
            parse_schema_reply("[{\"table_name\": \"users\"}]"),
            Err(ParseError::Shape(_))
        ));
        assert!(matches!(
            parse_schema_reply("{\"tables\": {}}"),
            Err(ParseError::Shape(_))
        ));
        assert!(matches!(
            parse_schema_reply("{\"tables\": [{\"columns\": []}]}"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_schema_reply("Sorry, I cannot help with that."),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            parse_schema_reply("```json\n{}"),
            Err(ParseError::Fence(FenceError::Unterminated))
        ));
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short"), "short");

        let long = "é".repeat(600);
        let logged = truncate_for_log(&long);
        assert!(logged.starts_with(&"é".repeat(500)));
        assert!(logged.ends_with("(truncated, total 1200 bytes)"));
    }

    #[tokio::test]
    async fn test_orchestrator_sends_instruction_and_query() {
        let stub = StubClient::replying(Some("{\"tables\": []}"));
        let config = AiConfig::default().with_instruction("extract tables");
        let orchestrator = ParseOrchestrator::new(stub.clone(), config);

        let schema = orchestrator.parse("SELECT 1 FROM dual").await.unwrap();
        assert!(schema.is_empty());

        let seen = stub.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.messages.len(), 2);
        assert_eq!(seen.messages[0].role, MessageRole::System);
        assert_eq!(seen.messages[0].content, "extract tables");
        assert_eq!(seen.messages[1].content, "SELECT 1 FROM dual");
    }

    #[tokio::test]
    async fn test_orchestrator_empty_reply() {
        let orchestrator = ParseOrchestrator::new(StubClient::replying(None), AiConfig::default());

        let result = orchestrator.parse("SELECT 1").await;
        assert!(matches!(result, Err(ParseError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_client_without_key_fails_before_network() {
        let client = OpenAiClient::new(&AiConfig::default()).unwrap();
        let request = AiConfig::default().build_request("SELECT 1");

        let result = client.complete(&request).await;
        assert!(matches!(result, Err(ParseError::MissingApiKey)));
    }
}
