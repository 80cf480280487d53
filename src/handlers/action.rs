use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::error::AiCreateError;
use crate::models::action::InterpretationReport;
use crate::models::chat::CompletionOptions;
use crate::service::action_interpreter::ActionInterpreter;
use crate::service::llm_service::LanguageModel;
use crate::service::prompt_composer::{PromptComposer, UPCOMING_WINDOW_DAYS};
use crate::store::EventStore;

/// Runs one natural-language request end to end:
/// snapshot upcoming events, compose, complete, interpret and apply.
pub struct ActionEngine {
    store: Arc<dyn EventStore>,
    llm: Arc<dyn LanguageModel>,
    composer: PromptComposer,
    interpreter: ActionInterpreter,
    temperature: f32,
}

impl ActionEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        llm: Arc<dyn LanguageModel>,
        timezone: Tz,
        temperature: f32,
    ) -> Self {
        Self {
            interpreter: ActionInterpreter::new(store.clone(), timezone),
            composer: PromptComposer::new(timezone),
            store,
            llm,
            temperature,
        }
    }

    pub async fn handle_prompt(
        &self,
        user_id: &str,
        prompt: &str,
    ) -> Result<InterpretationReport, AiCreateError> {
        self.handle_prompt_at(user_id, prompt, Utc::now()).await
    }

    pub async fn handle_prompt_at(
        &self,
        user_id: &str,
        prompt: &str,
        now: DateTime<Utc>,
    ) -> Result<InterpretationReport, AiCreateError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AiCreateError::Validation("Prompt is required".to_string()));
        }

        let upcoming = self
            .store
            .list_upcoming(user_id, now, now + Duration::days(UPCOMING_WINDOW_DAYS))
            .await?;
        let composed = self.composer.compose(now, &upcoming, prompt);
        log::debug!(
            "event=prompt_composed user_id={} upcoming={} prompt_chars={}",
            user_id,
            upcoming.len(),
            prompt.chars().count()
        );

        let options = CompletionOptions {
            json_mode: true,
            temperature: self.temperature,
        };
        let raw = match self.llm.complete(&composed.messages(), &options).await {
            Ok(raw) => raw,
            Err(err) => {
                log::error!(
                    "event=llm_failed user_id={} provider=\"{}\" error=\"{}\"",
                    user_id,
                    self.llm.describe(),
                    err
                );
                return Err(err.into());
            }
        };

        self.interpreter.interpret(user_id, &raw).await.map_err(|err| {
            log::warn!("event=interpretation_failed user_id={} error=\"{}\"", user_id, err);
            err.into()
        })
    }
}
