//! Answer Generation
//!
//! Builds a grounded prompt from retrieved context chunks and the user's
//! question, and issues exactly one call to the Anthropic Messages API.
//! Failures are surfaced to the caller as distinct error kinds; nothing
//! is retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

/// Messages API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default API base URL (overridable for testing)
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// System instruction: answers must stay grounded in the supplied context.
const SYSTEM_PROMPT: &str = "You are an expert assistant answering questions about a document.\n\
Guidelines:\n\
1. Answer using only the provided context excerpts\n\
2. Be precise and technical when appropriate\n\
3. If the context doesn't contain enough information to answer fully, acknowledge this\n\
4. Explain complex concepts clearly";

#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Network, auth, or service-side failure reaching the completion API
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),
    /// The service rejected the request contents
    #[error("Generation request rejected: {0}")]
    Rejected(String),
    /// The configured model identifier is not recognized by the service
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

/// Generation parameters forwarded with every call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token accounting reported by the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A generated answer plus the model that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Generates an answer grounded in the given context chunks.
///
/// Implementations issue at most one outbound call per invocation and
/// surface failures rather than masking them; retry policy belongs to
/// the caller. Calls consume quota on the external service.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        context_chunks: &[String],
        options: &GenerationOptions,
    ) -> Result<Answer, GeneratorError>;
}

/// Build the user message: numbered context blocks in their given order,
/// followed by the question.
pub fn build_prompt(question: &str, context_chunks: &[String]) -> String {
    let context = context_chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Context {}]:\n{}", i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the following excerpts from the document, please answer the question.\n\n\
         Context from the document:\n{}\n\n\
         Question: {}\n\n\
         Please provide a comprehensive answer based on the context above.",
        context, question
    )
}

/// Successful Messages API response payload.
#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: ApiUsage,
}

/// One content block of a response; only text blocks are used.
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Usage counters as reported by the API.
#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Error envelope returned by the API on non-2xx responses.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Map the service's error envelope to an error kind, keeping the
/// service message verbatim for diagnosability.
fn map_api_error(kind: &str, message: &str) -> GeneratorError {
    match kind {
        // Unknown model identifiers come back as not_found_error
        "not_found_error" => GeneratorError::InvalidModel(message.to_string()),
        "invalid_request_error" => GeneratorError::Rejected(message.to_string()),
        _ => GeneratorError::Unavailable(message.to_string()),
    }
}

/// Messages API client.
pub struct ClaudeGenerator {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ClaudeGenerator {
    pub fn new(api_key: String) -> Result<Self, GeneratorError> {
        if api_key.is_empty() {
            return Err(GeneratorError::Unavailable(
                "ANTHROPIC_API_KEY is not set".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_API_BASE.trim_end_matches('/').to_string(),
        })
    }

    /// Point the client at a different API base (used in testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AnswerGenerator for ClaudeGenerator {
    async fn generate(
        &self,
        question: &str,
        context_chunks: &[String],
        options: &GenerationOptions,
    ) -> Result<Answer, GeneratorError> {
        let user_message = build_prompt(question, context_chunks);

        let body = json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": SYSTEM_PROMPT,
            "messages": [
                { "role": "user", "content": user_message }
            ],
        });

        info!(model = %options.model, context_chunks = context_chunks.len(), "Calling completion API");
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Completion API error");
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => map_api_error(&envelope.error.kind, &envelope.error.message),
                Err(_) => GeneratorError::Unavailable(format!("{}: {}", status, text)),
            });
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| GeneratorError::Unavailable(format!("Bad response body: {}", e)))?;

        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| {
                GeneratorError::Rejected("Response contained no content".to_string())
            })?;

        debug!(answer_chars = text.len(), "Generated answer");
        Ok(Answer {
            text,
            model: parsed.model,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_numbers_context_in_order() {
        let chunks = vec!["first chunk".to_string(), "second chunk".to_string()];
        let prompt = build_prompt("What is this?", &chunks);

        let first = prompt.find("[Context 1]:\nfirst chunk").unwrap();
        let second = prompt.find("[Context 2]:\nsecond chunk").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Question: What is this?"));
    }

    #[test]
    fn test_build_prompt_empty_context() {
        let prompt = build_prompt("Anything?", &[]);
        assert!(prompt.contains("Question: Anything?"));
        assert!(!prompt.contains("[Context 1]"));
    }

    #[test]
    fn test_system_prompt_requires_grounding() {
        assert!(SYSTEM_PROMPT.contains("only the provided context"));
    }

    #[test]
    fn test_map_api_error_unknown_model() {
        let err = map_api_error("not_found_error", "model: claude-nope not found");
        match err {
            GeneratorError::InvalidModel(msg) => {
                assert_eq!(msg, "model: claude-nope not found");
            }
            other => panic!("expected InvalidModel, got {:?}", other),
        }
    }

    #[test]
    fn test_map_api_error_rejection() {
        assert!(matches!(
            map_api_error("invalid_request_error", "prompt blocked"),
            GeneratorError::Rejected(_)
        ));
    }

    #[test]
    fn test_map_api_error_unavailable_kinds() {
        for kind in [
            "authentication_error",
            "permission_error",
            "overloaded_error",
            "api_error",
            "rate_limit_error",
        ] {
            assert!(matches!(
                map_api_error(kind, "nope"),
                GeneratorError::Unavailable(_)
            ));
        }
    }

    #[test]
    fn test_new_with_empty_api_key() {
        assert!(matches!(
            ClaudeGenerator::new(String::new()),
            Err(GeneratorError::Unavailable(_))
        ));
    }

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let generator = ClaudeGenerator::new("key".to_string())
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(generator.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "The answer."}],
            "model": "claude-3-haiku-20240307",
            "usage": {"input_tokens": 42, "output_tokens": 7}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "The answer.");
        assert_eq!(parsed.usage.input_tokens, 42);
        assert_eq!(parsed.usage.output_tokens, 7);
    }

    #[test]
    fn test_error_envelope_parsing() {
        let raw = r#"{"type": "error", "error": {"type": "not_found_error", "message": "model: x"}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.error.kind, "not_found_error");
        assert_eq!(envelope.error.message, "model: x");
    }
}
