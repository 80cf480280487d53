use std::sync::Arc;

use warp::Filter;

use crate::config::Settings;
use crate::error::ProviderError;
use crate::handlers::action::ActionEngine;
use crate::handlers::auth::TokenAuthenticator;
use crate::handlers::http::{self, AppState};
use crate::service::llm_service::build_language_model;
use crate::store::EventStore;

pub async fn run_api(settings: Settings, store: Arc<dyn EventStore>) -> Result<(), ProviderError> {
    let llm = build_language_model(&settings.llm)?;
    let engine = ActionEngine::new(
        store.clone(),
        llm,
        settings.timezone,
        settings.llm.temperature,
    );

    let auth = TokenAuthenticator::new(settings.api_tokens.clone());
    if auth.is_empty() {
        log::warn!("event=api_tokens_empty message=\"every request will be rejected with 401\"");
    }

    let routes = http::routes(AppState::new(engine, store, auth)).with(warp::log("scheduleBot::http"));

    log::info!(
        "event=server_start addr={} timezone={}",
        settings.bind_addr,
        settings.timezone.name()
    );
    warp::serve(routes).run(settings.bind_addr).await;
    Ok(())
}
