use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models::chat::{ChatMessage, CompletionOptions};

const PROVIDER: &str = "openai";
const MAX_TOKENS: u32 = 1500;

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let request = OpenAIRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: options.temperature,
            response_format: options.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        // read the body once
        let text = response.text().await.map_err(|e| self.request_error(e))?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }
        extract_content(&text)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.request_error(e))?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: ModelList = serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    fn request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: PROVIDER,
                seconds: self.timeout.as_secs(),
            }
        } else {
            transport(&err)
        }
    }
}

fn transport(err: &reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: PROVIDER,
        message: err.to_string(),
    }
}

/// Pulls the first choice's message content out of a chat completion body.
pub fn extract_content(body: &str) -> Result<String, ProviderError> {
    let parsed: OpenAIResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        message: e.to_string(),
    })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ProviderError::MissingContent { provider: PROVIDER })
}
