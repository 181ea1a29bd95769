//! Remote LLM call. The daemon and runner only see the `LlmClient` trait;
//! the blocking HTTP implementation speaks the OpenAI-compatible
//! chat-completions shape.

use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use zeroize::Zeroizing;

use crate::conversation::{Message, Role};

pub const API_KEY_ENV: &str = "SEW_API_KEY";
pub const API_BASE_ENV: &str = "SEW_API_BASE";
const DEFAULT_API_BASE: &str = "https://api.x.ai/v1";

/// Request = ordered messages + model + temperature; response = one string.
/// The call blocks for however long the remote takes; there is no timeout
/// shorter than the transport's own, and no retry.
pub trait LlmClient: Send + Sync {
    fn complete(&self, messages: &[Message], model: &str, temperature: f64)
        -> anyhow::Result<String>;
}

pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Zeroizing<String>,
    http: reqwest::blocking::Client,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: Zeroizing::new(api_key.into()),
            http,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("API key is required via the {API_KEY_ENV} environment variable"))?;
        let base_url =
            std::env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(base_url, api_key)
    }
}

impl LlmClient for OpenAiCompatClient {
    fn complete(
        &self,
        messages: &[Message],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let body = json!({
            "model": model,
            "temperature": temperature,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        tracing::debug!("calling {url} with model {model}");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            let detail = detail.trim();
            if detail.is_empty() {
                anyhow::bail!("LLM request failed with status {status}");
            }
            anyhow::bail!("LLM request failed with status {status}: {detail}");
        }

        let value: serde_json::Value =
            response.json().context("LLM response is not valid JSON")?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .context("LLM response has no text content")?;
        Ok(content.to_string())
    }
}

/// Chat-completions message object. `name` only rides on user messages.
fn wire_message(message: &Message) -> serde_json::Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let mut obj = json!({
        "role": role,
        "content": message.content,
    });
    if message.role == Role::User {
        if let Some(name) = &message.name {
            obj["name"] = json!(name);
        }
    }
    obj
}
