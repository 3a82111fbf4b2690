//! OpenAI-compatible LLM client.
//!
//! This client works with any OpenAI-compatible API endpoint. Chat
//! completions produce summaries and the embeddings endpoint produces node
//! vectors; the embeddings endpoint may live on a different host.

use crate::config::{Config, LlmConfig};
use crate::embeddings::Embedder;
use crate::error::{Result, VelociraptorError};
use crate::summarizer::{SUMMARY_UNAVAILABLE, Summarizer};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Prompts;

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Request body for embeddings.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: Option<String>,
}

/// Response from an LLM call including metadata.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Whether generation stopped at the token limit.
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

#[derive(Debug, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Where embedding requests go.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingEndpoint {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    embedding: EmbeddingEndpoint,
}

impl LlmClient {
    /// Create a client that also sends embedding requests to the chat host.
    pub fn new(config: LlmConfig) -> Self {
        let embedding = EmbeddingEndpoint {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: crate::config::EmbeddingConfig::default().model,
        };
        Self::with_embedding(config, embedding)
    }

    /// Create a client with a separate embedding endpoint.
    pub fn with_embedding(config: LlmConfig, embedding: EmbeddingEndpoint) -> Self {
        Self {
            client: Client::new(),
            config,
            embedding,
        }
    }

    /// Create a client from the full configuration.
    pub fn from_config(config: &Config) -> Self {
        let embedding = EmbeddingEndpoint {
            api_base: config.embedding_api_base().to_string(),
            api_key: config.embedding_api_key().to_string(),
            model: config.embedding.model.clone(),
        };
        Self::with_embedding(config.llm.clone(), embedding)
    }

    /// Get the chat completion endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Get the embeddings endpoint URL.
    fn embeddings_endpoint(&self) -> String {
        let base = self.embedding.api_base.trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }

    /// Send a chat completion request.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        self.chat_with_limit(messages, self.config.max_tokens).await
    }

    /// Send a chat completion request with an explicit token limit.
    pub async fn chat_with_limit(&self, messages: Vec<Message>, max_tokens: u32) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(max_tokens),
            temperature: Some(self.config.temperature),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        parse_completion(&body)
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str, max_tokens: u32) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat_with_limit(messages, max_tokens).await?;
        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "completion usage"
            );
        }
        if response.truncated() {
            warn!(max_tokens, "completion cut off at the token limit");
        }
        Ok(response.content.trim().to_string())
    }

    /// Request an embedding vector for `text`.
    pub async fn create_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding.model,
            input: text,
        };

        let response = self
            .client
            .post(self.embeddings_endpoint())
            .header("Authorization", format!("Bearer {}", self.embedding.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| VelociraptorError::LlmApi("No embedding in response".to_string()))
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(VelociraptorError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}

fn parse_completion(body: &str) -> Result<LlmResponse> {
    let completion: ChatCompletionResponse = serde_json::from_str(body)?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| VelociraptorError::LlmApi("No choices in response".to_string()))?;

    Ok(LlmResponse {
        content: choice.message.content,
        finish_reason: choice.finish_reason,
        usage: completion.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

fn api_error(status: reqwest::StatusCode, body: &str) -> VelociraptorError {
    // Try to parse as API error
    if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
        return VelociraptorError::LlmApi(format!(
            "API error ({}): {}",
            status, api_error.error.message
        ));
    }
    VelociraptorError::LlmApi(format!("Request failed ({}): {}", status, body))
}

fn unavailable(error: &VelociraptorError) -> String {
    format!("{}: {}", SUMMARY_UNAVAILABLE, error)
}

#[async_trait]
impl Summarizer for LlmClient {
    async fn summarize(&self, content: &str, context: &str) -> String {
        if content.trim().is_empty() {
            return String::new();
        }

        let prompt = Prompts::render_summarize(content, context);
        match self
            .complete(Some(Prompts::system_summarizer()), &prompt, self.config.max_tokens)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "summary generation failed");
                unavailable(&e)
            }
        }
    }

    async fn synthesize(&self, child_summaries: &[String], page_range: &str) -> String {
        if child_summaries.is_empty() {
            return String::new();
        }

        let prompt = Prompts::render_synthesize(child_summaries, page_range);
        match self
            .complete(
                Some(Prompts::system_synthesizer()),
                &prompt,
                self.config.max_synthesis_tokens,
            )
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, page_range, "summary synthesis failed");
                unavailable(&e)
            }
        }
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            return None;
        }

        match self.create_embedding(text).await {
            Ok(vector) => {
                debug!(dimension = vector.len(), "received embedding");
                Some(vector)
            }
            Err(e) => {
                warn!(error = %e, "embedding generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(api_base: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: api_base.to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_message_creation() {
        let sys = Message::system("You are helpful.");
        let user = Message::user("Hello!");

        assert!(matches!(sys.role, Role::System));
        assert!(matches!(user.role, Role::User));
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            serde_json::json!({"role": "user", "content": "Hello!"})
        );
    }

    #[test]
    fn test_parse_completion_reads_usage_and_finish_reason() {
        let body = r#"{
            "choices": [{"message": {"content": "A summary"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 300, "total_tokens": 312}
        }"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.content, "A summary");
        assert!(response.truncated());
        assert_eq!(
            response.usage,
            Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 300,
                total_tokens: 312,
            })
        );

        let bare = parse_completion(r#"{"choices": [{"message": {"content": "ok"}}]}"#).unwrap();
        assert!(!bare.truncated());
        assert!(bare.usage.is_none());

        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(VelociraptorError::LlmApi(_))
        ));
    }

    #[test]
    fn test_endpoint_construction() {
        let client = test_client("https://api.example.com/");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
        assert_eq!(
            client.embeddings_endpoint(),
            "https://api.example.com/v1/embeddings"
        );

        // Without trailing slash
        let client2 = test_client("https://api.example.com");
        assert_eq!(client2.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_from_config_uses_embedding_overrides() {
        let mut config = Config::with_llm("https://llm.example.com", "k", "gpt-4");
        config.embedding.api_base = Some("https://embed.example.com/".to_string());
        config.embedding.model = "small".to_string();

        let client = LlmClient::from_config(&config);
        assert_eq!(
            client.embeddings_endpoint(),
            "https://embed.example.com/v1/embeddings"
        );
        assert_eq!(client.embedding.api_key, "k");
        assert_eq!(client.embedding.model, "small");
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error": {"message": "bad key", "type": "auth"}}"#;
        let err = api_error(reqwest::StatusCode::UNAUTHORIZED, body);
        assert!(err.to_string().contains("bad key"));

        let err = api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream");
        assert!(err.to_string().contains("upstream"));
    }

    #[tokio::test]
    async fn test_empty_input_skips_requests() {
        // Port 9 is discard; nothing is sent for empty input anyway.
        let client = test_client("http://127.0.0.1:9");
        assert_eq!(client.summarize("  ", "ctx").await, "");
        assert_eq!(client.synthesize(&[], "Pages 1-2").await, "");
        assert!(client.embed("").await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_provider_yields_placeholders() {
        let client = test_client("http://127.0.0.1:9");
        let summary = client.summarize("Some text.", "ctx").await;
        assert!(summary.starts_with(SUMMARY_UNAVAILABLE));
        assert!(client.embed("Some text.").await.is_none());
    }
}
