use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use inquire::Text;

use crate::config::Settings;
use crate::handlers::action::ActionEngine;
use crate::models::action::ActionResult;
use crate::models::event::{Event, EventFilter, EventType, NewEvent};
use crate::service::action_interpreter::parse_timestamp;
use crate::service::llm_service::build_language_model;
use crate::store::EventStore;

#[derive(Parser)]
#[command(name = "scheduleBot", about = "Personal event scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an event directly.
    Create {
        title: String,
        #[arg(long = "type")]
        event_type: Option<EventType>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        urgency: Option<u8>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        importance: Option<u8>,
        /// Deadline; RFC 3339 or local `YYYY-MM-DD HH:MM`.
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        start: Option<String>,
    },
    /// Describe changes in plain language; asks interactively when TEXT is omitted.
    Prompt { text: Option<String> },
    List {
        #[arg(long)]
        completed: Option<bool>,
        #[arg(long = "type")]
        event_type: Option<EventType>,
    },
    /// Ask the configured model backend which models it serves.
    CheckProvider,
}

pub async fn cli(settings: Settings, store: Arc<dyn EventStore>) -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    run_command(cli.command, &settings, store).await
}

pub async fn run_command(
    command: Commands,
    settings: &Settings,
    store: Arc<dyn EventStore>,
) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Create {
            title,
            event_type,
            urgency,
            importance,
            due,
            start,
        } => {
            let user_id = default_user(settings)?;
            let mut fields = NewEvent::new(title);
            if let Some(event_type) = event_type {
                fields.event_type = event_type;
            }
            if let Some(urgency) = urgency {
                fields.urgency = urgency;
            }
            if let Some(importance) = importance {
                fields.importance = importance;
            }
            fields.due_date = due.as_deref().map(|v| cli_timestamp(v, settings)).transpose()?;
            fields.start_time = start.as_deref().map(|v| cli_timestamp(v, settings)).transpose()?;

            let event = store.create_event(user_id, fields).await?;
            println!("Created {}", describe(&event, settings));
        }
        Commands::Prompt { text } => {
            let user_id = default_user(settings)?;
            let prompt = match text {
                Some(text) => text,
                None => Text::new("What should change in your schedule?").prompt()?,
            };
            let llm = build_language_model(&settings.llm)?;
            let engine = ActionEngine::new(store, llm, settings.timezone, settings.llm.temperature);

            let report = engine.handle_prompt(user_id, &prompt).await?;
            println!("{}", report.message());
            for result in &report.results {
                match result {
                    ActionResult::Created { event, .. } => {
                        println!("  created  {}", describe(event, settings))
                    }
                    ActionResult::Updated { event, .. } => {
                        println!("  updated  {}", describe(event, settings))
                    }
                    ActionResult::Skipped { index, reason } => {
                        println!("  skipped  action #{}: {}", index + 1, reason)
                    }
                }
            }
            if report.summary.unresolved > 0 {
                println!("  ({} update(s) referred to unknown events)", report.summary.unresolved);
            }
        }
        Commands::List {
            completed,
            event_type,
        } => {
            let user_id = default_user(settings)?;
            let filter = EventFilter {
                completed,
                event_type,
                quadrant: None,
            };
            let events = store.list_events(user_id, &filter).await?;
            if events.is_empty() {
                println!("No events.");
            }
            for event in &events {
                println!("{}", describe(event, settings));
            }
        }
        Commands::CheckProvider => {
            let llm = build_language_model(&settings.llm)?;
            let models = llm.available_models().await?;
            println!("{} is reachable; {} model(s) available", llm.describe(), models.len());
            for model in models {
                println!("  {}", model);
            }
        }
    }
    Ok(())
}

fn default_user(settings: &Settings) -> Result<&str, Box<dyn Error>> {
    settings
        .default_user_id
        .as_deref()
        .ok_or_else(|| "DEFAULT_USER_ID must be set for cli mode".into())
}

fn cli_timestamp(value: &str, settings: &Settings) -> Result<chrono::DateTime<chrono::Utc>, Box<dyn Error>> {
    parse_timestamp(value, &settings.timezone).ok_or_else(|| format!("could not parse time `{}`", value).into())
}

fn describe(event: &Event, settings: &Settings) -> String {
    let when = event
        .anchor_time()
        .map(|t| t.with_timezone(&settings.timezone).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unscheduled".to_string());
    format!(
        "[{}] {} ({}, {}, u{}/i{}{}) {}",
        event.id,
        event.title,
        event.event_type,
        when,
        event.urgency,
        event.importance,
        if event.completed { ", done" } else { "" },
        event.quadrant()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEventStore;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(move |key| {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    fn create(title: &str, due: Option<&str>) -> Commands {
        Commands::Create {
            title: title.to_string(),
            event_type: None,
            urgency: None,
            importance: None,
            due: due.map(str::to_string),
            start: None,
        }
    }

    #[tokio::test]
    async fn failing_commands_return_an_error() {
        let store = MemoryEventStore::new();

        let err = run_command(create("Gym", None), &settings(&[]), Arc::new(store.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "DEFAULT_USER_ID must be set for cli mode");

        let with_user = settings(&[("DEFAULT_USER_ID", "user-a")]);
        let err = run_command(create("Gym", Some("someday")), &with_user, Arc::new(store.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "could not parse time `someday`");
        assert_eq!(store.len().await, 0);

        run_command(create("Gym", Some("2026-03-05 18:00")), &with_user, Arc::new(store.clone()))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }
}
