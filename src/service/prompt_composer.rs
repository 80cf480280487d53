//! Builds the exact messages sent to the language model.
//!
//! Output is a pure function of `(now, existing events, user prompt)`: the
//! same inputs always produce byte-identical text.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::chat::ChatMessage;
use crate::models::event::{Event, EventType, MAX_SCORE, MIN_SCORE};

/// How far ahead existing events are shown to the model.
pub const UPCOMING_WINDOW_DAYS: i64 = 30;

// Anchor examples are always rendered in UTC+8.
const ANCHOR_OFFSET_SECONDS: i32 = 8 * 3600;
const TOMORROW_ANCHOR_HOUR: u32 = 17;
const MONDAY_ANCHOR_HOUR: u32 = 14;

pub fn anchor_offset() -> FixedOffset {
    FixedOffset::east_opt(ANCHOR_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix())
}

/// `YYYY-MM-DDTHH:mm:ss+08:00`
pub fn format_anchor(value: &DateTime<FixedOffset>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

fn at_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::default()))
}

fn localize(local: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = local - Duration::seconds(offset.local_minus_utc() as i64);
    DateTime::from_naive_utc_and_offset(utc, offset)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorTimes {
    pub tomorrow_at_five_pm: DateTime<FixedOffset>,
    pub next_monday_at_two_pm: DateTime<FixedOffset>,
}

impl AnchorTimes {
    pub fn compute(now: DateTime<Utc>) -> Self {
        let offset = anchor_offset();
        let today = now.with_timezone(&offset).date_naive();

        let tomorrow = today + Duration::days(1);

        // A Monday rolls a full week so the example never lands on today.
        let days_from_monday = today.weekday().num_days_from_monday() as i64;
        let days_ahead = match (7 - days_from_monday) % 7 {
            0 => 7,
            n => n,
        };
        let next_monday = today + Duration::days(days_ahead);

        Self {
            tomorrow_at_five_pm: localize(at_hour(tomorrow, TOMORROW_ANCHOR_HOUR), offset),
            next_monday_at_two_pm: localize(at_hour(next_monday, MONDAY_ANCHOR_HOUR), offset),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventSnapshot<'a> {
    id: &'a str,
    title: &'a str,
    start_time: Option<String>,
    due_date: Option<String>,
    #[serde(rename = "type")]
    event_type: EventType,
}

impl<'a> EventSnapshot<'a> {
    fn from_event(event: &'a Event, offset: FixedOffset) -> Self {
        let render = |t: &DateTime<Utc>| format_anchor(&t.with_timezone(&offset));
        Self {
            id: &event.id,
            title: &event.title,
            start_time: event.start_time.as_ref().map(render),
            due_date: event.due_date.as_ref().map(render),
            event_type: event.event_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

impl ComposedPrompt {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    timezone: Tz,
}

impl PromptComposer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn compose(&self, now: DateTime<Utc>, existing: &[Event], user_prompt: &str) -> ComposedPrompt {
        ComposedPrompt {
            system: self.system_prompt(now, existing),
            user: self.user_message(now, user_prompt),
        }
    }

    pub fn system_prompt(&self, now: DateTime<Utc>, existing: &[Event]) -> String {
        let offset = anchor_offset();
        let anchors = AnchorTimes::compute(now);
        let snapshots: Vec<EventSnapshot<'_>> = existing
            .iter()
            .map(|e| EventSnapshot::from_event(e, offset))
            .collect();
        let existing_json = serde_json::to_string_pretty(&snapshots).unwrap_or_else(|_| "[]".to_string());
        let types = EventType::ALL.map(|t| format!("\"{}\"", t.as_str())).join(", ");

        format!(
            "You are a scheduling assistant that turns natural language into actions on the user's events.\n\
             Reply ONLY with a single JSON object, no prose, markdown, or code fences.\n\
             The JSON shape must be exactly:\n\
             {{\"actions\": [\n\
             \x20 {{\"action\": \"create\", \"data\": {{...event fields...}}}},\n\
             \x20 {{\"action\": \"update\", \"id\": \"<existing event id>\", \"data\": {{...only the fields to change...}}}}\n\
             ]}}\n\
             Event fields:\n\
             - title: string, required for create\n\
             - description: string, optional\n\
             - type: one of {types} (default \"event\")\n\
             - urgency: integer {min}-{max}, where {max} is most time-sensitive (default 3)\n\
             - importance: integer {min}-{max}, where {max} matters most to the user's goals (default 3)\n\
             - dueDate: ISO 8601 datetime, a deadline; use it for homework, tasks and reminders\n\
             - startTime: ISO 8601 datetime, when a scheduled event or meeting begins\n\
             - endTime: ISO 8601 datetime, only together with startTime\n\
             - completed: boolean, only for updates\n\
             Rules:\n\
             - Use \"update\" only when the user clearly refers to one of the existing events below, and copy its id exactly.\n\
             - Use \"create\" for anything new. One request may produce several actions.\n\
             - Compute relative dates from the current time given with the user's message.\n\
             - Write datetimes with an explicit offset, like these examples:\n\
             \x20 \"tomorrow at 5pm\" -> \"{tomorrow}\"\n\
             \x20 \"next Monday at 2pm\" -> \"{monday}\"\n\
             - If nothing should change, return {{\"actions\": []}}.\n\
             Existing events in the next {window} days:\n\
             {existing}",
            types = types,
            min = MIN_SCORE,
            max = MAX_SCORE,
            tomorrow = format_anchor(&anchors.tomorrow_at_five_pm),
            monday = format_anchor(&anchors.next_monday_at_two_pm),
            window = UPCOMING_WINDOW_DAYS,
            existing = existing_json,
        )
    }

    pub fn user_message(&self, now: DateTime<Utc>, user_prompt: &str) -> String {
        let local = now.with_timezone(&self.timezone);
        format!(
            "{prompt}\n\nCurrent time: {localized} ({zone}, {rfc3339})",
            prompt = user_prompt.trim(),
            localized = local.format("%A, %B %-d, %Y %H:%M:%S"),
            zone = self.timezone.name(),
            rfc3339 = local.to_rfc3339(),
        )
    }
}
