//! OpenAI chat-completions client.
//!
//! Two modes: free-text completion, and schema-constrained JSON output via
//! `response_format`. Callers that can't rely on the model honoring the
//! schema still run the reply through [`strip_code_fences`] before parsing.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

const OPENAI_API_BASE: &str = "https://api.openai.com/";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(json)?").expect("fence regex"));

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Completions: Send + Sync {
    /// Plain free-text completion.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
    /// Completion constrained to a named JSON schema; returns the raw
    /// message content, which should parse as JSON when the model complies.
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        schema_name: &str,
        schema: &Value,
    ) -> Result<String>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        let base_url = Url::parse(OPENAI_API_BASE).expect("valid default OpenAI URL");
        Self::with_base_url(api_key, model, base_url)
    }

    pub fn with_base_url(api_key: String, model: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("postpilot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .context("invalid OpenAI base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build OpenAI request")
    }

    async fn execute(&self, body: Value) -> Result<String> {
        let request = self.build_request(&body)?;
        debug!(url = %request.url(), model = %self.model, "openai chat request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach OpenAI")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("openai error {}: {}", status, body));
        }
        let payload: ChatResponse = res.json().await.context("invalid OpenAI response JSON")?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai response contained no choices"))
    }
}

#[async_trait]
impl Completions for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.execute(chat_request(&self.model, messages, None)).await
    }

    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        schema_name: &str,
        schema: &Value,
    ) -> Result<String> {
        self.execute(chat_request(&self.model, messages, Some((schema_name, schema))))
            .await
    }
}

pub fn chat_request(
    model: &str,
    messages: &[ChatMessage],
    response_schema: Option<(&str, &Value)>,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some((name, schema)) = response_schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": true
            }
        });
    }
    body
}

/// Remove Markdown code-fence markers the model sometimes wraps JSON in.
pub fn strip_code_fences(content: &str) -> String {
    CODE_FENCE.replace_all(content, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_without_schema() {
        let messages = [
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("Hello"),
        ];
        let body = chat_request("gpt-4o", &messages, None);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn chat_request_with_schema() {
        let schema = json!({ "type": "object" });
        let messages = [ChatMessage::user("Summarize")];
        let body = chat_request("gpt-4o", &messages, Some(("site_summary", &schema)));
        let format = &body["response_format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "site_summary");
        assert_eq!(format["json_schema"]["strict"], true);
        assert_eq!(format["json_schema"]["schema"]["type"], "object");
    }

    #[test]
    fn build_request_sets_headers() {
        let client = OpenAiClient::new("sk-test".into(), "gpt-4o".into());
        let body = json!({ "sample": true });
        let request = client.build_request(&body).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/chat/completions");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer sk-test"
        );
    }

    #[test]
    fn strips_fences_around_json() {
        let fenced = "```json\n{\"niche\": \"bakery\"}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"niche\": \"bakery\"}");
        let bare = "{\"niche\": \"bakery\"}";
        assert_eq!(strip_code_fences(bare), bare);
    }
}
