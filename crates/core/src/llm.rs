use crate::embeddings::endpoint_url;
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Opaque text-completion service.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Stands in when no completion endpoint is configured, so retrieval-only
/// commands still work; every completion fails with the stored reason.
#[derive(Debug, Clone)]
pub struct UnconfiguredModel {
    reason: String,
}

impl UnconfiguredModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompletionModel for UnconfiguredModel {
    async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::InvalidConfig(self.reason.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    /// No timeout when `None`; a stalled call then waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiChatConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::InvalidConfig("missing API key".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(GenerationError::InvalidConfig("missing model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| GenerationError::InvalidConfig("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint_url(&config.base_url, "chat/completions")?,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "calling completion endpoint");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        completion_text(status.as_u16(), &body)
    }
}

/// Text of the first choice in a `/chat/completions` reply.
fn completion_text(status: u16, body: &str) -> Result<String, GenerationError> {
    if !(200..300).contains(&status) {
        return Err(GenerationError::BackendResponse {
            backend: "chat-completions".to_string(),
            status,
            details: body.to_string(),
        });
    }

    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or(GenerationError::EmptyCompletion)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenAiChatConfig {
        OpenAiChatConfig {
            api_key: "sk-test".to_string(),
            base_url: "https://llm.example.com/v1".to_string(),
            model: "deepseek-r1-0528".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            timeout: None,
        }
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let model = OpenAiChatModel::new(config()).unwrap();
        assert_eq!(
            model.endpoint().as_str(),
            "https://llm.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn missing_key_or_bad_url_is_rejected() {
        let mut no_key = config();
        no_key.api_key = String::new();
        assert!(matches!(
            OpenAiChatModel::new(no_key),
            Err(GenerationError::InvalidConfig(_))
        ));

        let mut bad_url = config();
        bad_url.base_url = "not a url".to_string();
        assert!(matches!(
            OpenAiChatModel::new(bad_url),
            Err(GenerationError::Url(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_model_reports_its_reason() {
        let model = UnconfiguredModel::new("OPENAI_API_KEY is not set");
        let error = model.complete("anything").await.unwrap_err();
        assert!(error.to_string().contains("OPENAI_API_KEY is not set"));
    }

    #[test]
    fn request_omits_unset_max_tokens() {
        let body = ChatRequest {
            model: "m",
            temperature: 0.1,
            max_tokens: None,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn reply_takes_first_choice() {
        let text = completion_text(
            200,
            r#"{"choices":[
                {"message":{"role":"assistant","content":"An HDL."}},
                {"message":{"role":"assistant","content":"Ignored."}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(text, "An HDL.");
    }

    #[test]
    fn reply_without_choices_is_empty_completion() {
        assert!(matches!(
            completion_text(200, r#"{"choices":[]}"#),
            Err(GenerationError::EmptyCompletion)
        ));
        assert!(matches!(
            completion_text(200, "not json"),
            Err(GenerationError::Decode(_))
        ));
    }

    #[test]
    fn error_status_is_reported_with_body() {
        match completion_text(503, "upstream overloaded") {
            Err(GenerationError::BackendResponse {
                status, details, ..
            }) => {
                assert_eq!(status, 503);
                assert_eq!(details, "upstream overloaded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
