//! Wire types and client for an OpenAI-compatible chat completion API (OpenRouter by default).

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{ConversationMessage, ConversationRole};
use crate::error::Error;

// Chat Completion API
const CHAT_API: &str = "/chat/completions";

pub const DEFAULT_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

impl From<ConversationRole> for Role {
    fn from(role: ConversationRole) -> Self {
        match role {
            ConversationRole::User => Role::User,
            ConversationRole::Assistant => Role::Assistant,
            ConversationRole::System => Role::System,
        }
    }
}

impl From<&ConversationMessage> for Message {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role.into(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct MessageBody {
    /// ID of the model to use, e.g. `openai/gpt-4o-mini`.
    pub model: String,
    /// Sampling temperature. Higher values make the output more random, lower values make it
    /// more focused and deterministic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling probability mass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// The maximum number of tokens to generate in the completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// The conversation, system turn first.
    pub messages: Vec<Message>,
    /// Tokens are sent as data-only server-sent events, terminated by `data: [DONE]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl MessageBody {
    /// Creates a new streaming `MessageBody`.
    #[must_use]
    pub fn new(model: &str, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: Some(true),
            ..Default::default()
        }
    }
}

/// One streamed event payload. Every field is optional so keep-alive and role-only chunks
/// deserialize cleanly.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ChatCompletionChunk {
    /// Text delta of the first choice, if it carries any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Human readable text of an `error` member, which upstreams send either as a plain string or
/// as an object with a `message` field.
pub fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(object) => match object.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Auth {
    pub api_key: String,
}

impl Auth {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    pub auth: Auth,
    pub api_url: String,
    /// Sent as `HTTP-Referer`, used by OpenRouter for app attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    pub title: Option<String>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(auth: Auth, api_url: impl Into<String>) -> Self {
        Self {
            auth,
            api_url: api_url.into(),
            referer: None,
            title: None,
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        headers.insert(
            AUTHORIZATION,
            format!("Bearer {}", self.auth.api_key)
                .parse()
                .map_err(|e| Error::Header(format!("authorization: {e}")))?,
        );

        if let Some(referer) = &self.referer {
            headers.insert(
                "http-referer",
                referer
                    .parse()
                    .map_err(|e| Error::Header(format!("referer: {e}")))?,
            );
        }

        if let Some(title) = &self.title {
            headers.insert(
                "x-title",
                title
                    .parse()
                    .map_err(|e| Error::Header(format!("x-title: {e}")))?,
            );
        }

        Ok(headers)
    }

    /// Opens a streaming completion. The response is returned as soon as its headers arrive;
    /// callers check the status and read the body incrementally.
    pub async fn stream(&self, body: &MessageBody) -> Result<reqwest::Response, Error> {
        let url = self.api_url.clone() + CHAT_API;
        log::debug!("url: {}, model: {}", url, body.model);

        let response = self
            .http
            .post(&url)
            .headers(self.build_headers()?)
            .json(body)
            .send()
            .await?;

        log::debug!("upstream status: {}", response.status());

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_body_enables_streaming_and_skips_unset_options() -> Result<(), serde_json::Error>
    {
        let body = MessageBody::new(
            DEFAULT_MODEL,
            vec![Message {
                role: Role::User,
                content: "Hi".to_string(),
            }],
        );

        assert_eq!(
            serde_json::to_value(&body)?,
            json!({
                "model": "openai/gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hi"}],
                "stream": true,
            })
        );

        Ok(())
    }

    #[test]
    fn test_chunk_content_ignores_role_only_deltas() -> Result<(), serde_json::Error> {
        let role_only: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)?;
        let empty: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#)?;
        let text: ChatCompletionChunk =
            serde_json::from_str(r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#)?;

        assert_eq!(role_only.content(), None);
        assert_eq!(empty.content(), None);
        assert_eq!(text.content(), Some("Hel"));

        Ok(())
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!("insufficient credit")), "insufficient credit");
        assert_eq!(
            error_message(&json!({"message": "Rate limited", "code": 429})),
            "Rate limited"
        );
        assert_eq!(error_message(&json!({"code": 500})), r#"{"code":500}"#);
    }

    #[test]
    fn test_build_headers_includes_attribution() -> Result<(), Error> {
        let client = Client::new(Auth::new("sk-test".to_string()), DEFAULT_URL)
            .with_referer(Some("https://example.dev".to_string()))
            .with_title(Some("Portfolio".to_string()));

        let headers = client.build_headers()?;

        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers["http-referer"], "https://example.dev");
        assert_eq!(headers["x-title"], "Portfolio");

        Ok(())
    }
}
