use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::ollama_client::OllamaClient;
use crate::clients::openai_client::OpenAIClient;
use crate::config::{LlmProvider, LlmSettings};
use crate::error::ProviderError;
use crate::models::chat::{ChatMessage, CompletionOptions};

/// A completion backend: role-tagged messages in, raw text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn describe(&self) -> String;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError>;

    /// Models the backend reports as available; doubles as a connectivity check.
    async fn available_models(&self) -> Result<Vec<String>, ProviderError>;
}

pub struct OpenAIService {
    client: OpenAIClient,
}

impl OpenAIService {
    pub fn new(client: OpenAIClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageModel for OpenAIService {
    fn describe(&self) -> String {
        format!("openai ({})", self.client.model())
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        self.client.chat(messages, options).await
    }

    async fn available_models(&self) -> Result<Vec<String>, ProviderError> {
        self.client.list_models().await
    }
}

pub struct OllamaService {
    client: OllamaClient,
}

impl OllamaService {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageModel for OllamaService {
    fn describe(&self) -> String {
        format!("ollama ({} at {})", self.client.model(), self.client.endpoint())
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        self.client.chat(messages, options).await
    }

    async fn available_models(&self) -> Result<Vec<String>, ProviderError> {
        self.client.list_models().await
    }
}

pub fn build_language_model(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, ProviderError> {
    let model: Arc<dyn LanguageModel> = match &settings.provider {
        LlmProvider::OpenAI {
            api_key,
            base_url,
            model,
        } => {
            let api_key = api_key.clone().ok_or_else(|| ProviderError::NotConfigured {
                provider: "openai",
                message: "OPENAI_API_KEY is not set".to_string(),
            })?;
            let client = OpenAIClient::new(api_key, base_url, model.clone(), settings.timeout)?;
            Arc::new(OpenAIService::new(client))
        }
        LlmProvider::Ollama { endpoint, model } => {
            let client = OllamaClient::new(endpoint, model.clone(), settings.timeout)?;
            Arc::new(OllamaService::new(client))
        }
    };
    log::info!("event=llm_configured provider=\"{}\"", model.describe());
    Ok(model)
}
