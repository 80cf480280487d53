use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models::chat::{ChatMessage, CompletionOptions};

const PROVIDER: &str = "ollama";

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Client for a self-hosted Ollama server (`/api/chat`, non-streaming).
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: String, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let request = OllamaRequest {
            model: &self.model,
            messages,
            stream: false,
            format: options.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/chat", self.endpoint))
            .json(&request)
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
        extract_content(&text)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: String::new(),
            });
        }
        let tags: TagList = response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
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

pub fn extract_content(body: &str) -> Result<String, ProviderError> {
    let parsed: OllamaResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        message: e.to_string(),
    })?;
    parsed
        .message
        .and_then(|m| m.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ProviderError::MissingContent { provider: PROVIDER })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_removed() {
        let client = OllamaClient::new(
            "http://localhost:11434/",
            "llama3".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434");
    }

    #[test]
    fn extract_content_reads_message() {
        let body = r#"{"model":"llama3","created_at":"2026-01-01T00:00:00Z","message":{"role":"assistant","content":"{\"actions\":[]}"},"done":true}"#;
        assert_eq!(extract_content(body).unwrap(), "{\"actions\":[]}");
    }

    #[test]
    fn extract_content_requires_message_content() {
        let err = extract_content(r#"{"done":true}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MissingContent { .. }));
    }

    #[test]
    fn request_uses_json_format_and_disables_streaming() {
        let messages = vec![ChatMessage::system("rules"), ChatMessage::user("hi")];
        let request = OllamaRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
            format: Some("json"),
            options: OllamaOptions { temperature: 0.3 },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["format"], "json");
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "system");
    }
}
