use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;
pub const DEFAULT_SCORE: u8 = 3;

// Scores at or above this value count as "high" on the priority matrix.
const QUADRANT_MIDPOINT: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[default]
    Event,
    Homework,
    Meeting,
    Task,
    Reminder,
    Other,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Event,
        EventType::Homework,
        EventType::Meeting,
        EventType::Task,
        EventType::Reminder,
        EventType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Event => "event",
            EventType::Homework => "homework",
            EventType::Meeting => "meeting",
            EventType::Task => "task",
            EventType::Reminder => "reminder",
            EventType::Other => "other",
        }
    }

    /// Case-insensitive lookup; `None` for anything outside the enumeration.
    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == lower)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::parse(s).ok_or_else(|| format!("unknown event type `{}`", s))
    }
}

/// Eisenhower-style placement of an event by urgency and importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quadrant {
    DoFirst,
    Schedule,
    Delegate,
    Eliminate,
}

impl Quadrant {
    pub fn classify(urgency: u8, importance: u8) -> Self {
        let urgent = urgency >= QUADRANT_MIDPOINT;
        let important = importance >= QUADRANT_MIDPOINT;
        match (urgent, important) {
            (true, true) => Quadrant::DoFirst,
            (false, true) => Quadrant::Schedule,
            (true, false) => Quadrant::Delegate,
            (false, false) => Quadrant::Eliminate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::DoFirst => "do-first",
            Quadrant::Schedule => "schedule",
            Quadrant::Delegate => "delegate",
            Quadrant::Eliminate => "eliminate",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quadrant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "do-first" | "do_first" => Ok(Quadrant::DoFirst),
            "schedule" => Ok(Quadrant::Schedule),
            "delegate" => Ok(Quadrant::Delegate),
            "eliminate" => Ok(Quadrant::Eliminate),
            other => Err(format!("unknown quadrant `{}`", other)),
        }
    }
}

pub fn clamp_score(value: i64) -> u8 {
    value.clamp(MIN_SCORE as i64, MAX_SCORE as i64) as u8
}

/// Timestamps must keep a four-digit UTC year to survive an RFC 3339 round trip.
pub fn is_storable_time(value: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&value.year())
}

pub fn new_event_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub urgency: u8,
    pub importance: u8,
    pub due_date: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
}

impl Event {
    pub fn quadrant(&self) -> Quadrant {
        Quadrant::classify(self.urgency, self.importance)
    }

    /// Earliest of `startTime` and `dueDate`, used to order upcoming events.
    pub fn anchor_time(&self) -> Option<DateTime<Utc>> {
        match (self.start_time, self.due_date) {
            (Some(start), Some(due)) => Some(start.min(due)),
            (start, due) => start.or(due),
        }
    }

    pub fn falls_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        let inside = |t: &DateTime<Utc>| *t >= from && *t <= to;
        self.start_time.as_ref().is_some_and(inside) || self.due_date.as_ref().is_some_and(inside)
    }

    /// The first timestamp field that cannot be persisted, if any.
    pub fn unstorable_field(&self) -> Option<&'static str> {
        [
            ("dueDate", self.due_date),
            ("startTime", self.start_time),
            ("endTime", self.end_time),
        ]
        .into_iter()
        .find_map(|(name, value)| value.filter(|t| !is_storable_time(t)).map(|_| name))
    }

    // endTime is only kept when it follows a startTime.
    fn normalize_interval(&mut self) {
        match (self.start_time, self.end_time) {
            (None, Some(_)) => self.end_time = None,
            (Some(start), Some(end)) if end < start => self.end_time = None,
            _ => {}
        }
    }
}

/// Listing order: due date ascending with undated events last, newest first on ties.
pub fn compare_for_listing(a: &Event, b: &Event) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
}

pub fn compare_upcoming(a: &Event, b: &Event) -> Ordering {
    a.anchor_time()
        .cmp(&b.anchor_time())
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Fields for a new event; the store assigns id, owner and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub urgency: u8,
    pub importance: u8,
    pub due_date: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed: bool,
}

impl NewEvent {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            event_type: EventType::default(),
            urgency: DEFAULT_SCORE,
            importance: DEFAULT_SCORE,
            due_date: None,
            start_time: None,
            end_time: None,
            completed: false,
        }
    }

    pub fn into_event(self, id: String, user_id: &str, now: DateTime<Utc>) -> Event {
        let mut event = Event {
            id,
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            event_type: self.event_type,
            urgency: clamp_score(self.urgency as i64),
            importance: clamp_score(self.importance as i64),
            due_date: self.due_date,
            start_time: self.start_time,
            end_time: self.end_time,
            completed: self.completed,
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
        };
        event.normalize_interval();
        event
    }
}

/// Partial update. `None` leaves a field alone; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub event_type: Option<EventType>,
    pub urgency: Option<u8>,
    pub importance: Option<u8>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub start_time: Option<Option<DateTime<Utc>>>,
    pub end_time: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }

    pub fn apply_to(&self, event: &mut Event, now: DateTime<Utc>) {
        if self.is_empty() {
            return;
        }
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            event.title = title.to_string();
        }
        if let Some(description) = &self.description {
            event.description = description.clone().filter(|d| !d.trim().is_empty());
        }
        if let Some(event_type) = self.event_type {
            event.event_type = event_type;
        }
        if let Some(urgency) = self.urgency {
            event.urgency = clamp_score(urgency as i64);
        }
        if let Some(importance) = self.importance {
            event.importance = clamp_score(importance as i64);
        }
        if let Some(due_date) = self.due_date {
            event.due_date = due_date;
        }
        if let Some(start_time) = self.start_time {
            event.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            event.end_time = end_time;
        }
        if let Some(completed) = self.completed {
            event.completed = completed;
        }
        event.normalize_interval();
        event.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub completed: Option<bool>,
    pub event_type: Option<EventType>,
    pub quadrant: Option<Quadrant>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.completed.is_none_or(|c| event.completed == c)
            && self.event_type.is_none_or(|t| event.event_type == t)
            && self.quadrant.is_none_or(|q| event.quadrant() == q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(now: DateTime<Utc>) -> Event {
        NewEvent::new("write report").into_event("e1".to_string(), "u1", now)
    }

    #[test]
    fn storable_time_keeps_four_digit_years() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(is_storable_time(&last));
        assert!(!is_storable_time(&(last + Duration::seconds(1))));

        let mut event = sample(last);
        assert_eq!(event.unstorable_field(), None);
        event.due_date = Some(last + Duration::hours(5));
        assert_eq!(event.unstorable_field(), Some("dueDate"));
    }

    #[test]
    fn event_type_parse_is_case_insensitive() {
        assert_eq!(EventType::parse(" Meeting "), Some(EventType::Meeting));
        assert_eq!(EventType::parse("lecture"), None);
        assert_eq!("homework".parse::<EventType>(), Ok(EventType::Homework));
    }

    #[test]
    fn clamp_score_bounds_values() {
        assert_eq!(clamp_score(-4), 1);
        assert_eq!(clamp_score(0), 1);
        assert_eq!(clamp_score(4), 4);
        assert_eq!(clamp_score(42), 5);
    }

    #[test]
    fn quadrant_uses_midpoint_three() {
        assert_eq!(Quadrant::classify(3, 3), Quadrant::DoFirst);
        assert_eq!(Quadrant::classify(2, 5), Quadrant::Schedule);
        assert_eq!(Quadrant::classify(5, 2), Quadrant::Delegate);
        assert_eq!(Quadrant::classify(1, 1), Quadrant::Eliminate);
    }

    #[test]
    fn into_event_drops_end_time_without_start() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut fields = NewEvent::new("  standup  ");
        fields.end_time = Some(now + Duration::hours(1));
        fields.urgency = 9;
        let event = fields.into_event("e1".to_string(), "u1", now);
        assert_eq!(event.title, "standup");
        assert_eq!(event.end_time, None);
        assert_eq!(event.urgency, 5);
        assert_eq!(event.created_at, now);
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut event = sample(now);
        event.description = Some("quarterly".to_string());
        let later = now + Duration::minutes(5);

        let patch = EventPatch {
            urgency: Some(5),
            due_date: Some(Some(now + Duration::days(2))),
            ..EventPatch::default()
        };
        patch.apply_to(&mut event, later);

        assert_eq!(event.urgency, 5);
        assert_eq!(event.importance, DEFAULT_SCORE);
        assert_eq!(event.description.as_deref(), Some("quarterly"));
        assert_eq!(event.due_date, Some(now + Duration::days(2)));
        assert_eq!(event.updated_at, later);
    }

    #[test]
    fn patch_can_clear_nullable_fields_but_not_title() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut event = sample(now);
        event.due_date = Some(now);

        let patch = EventPatch {
            title: Some("   ".to_string()),
            due_date: Some(None),
            ..EventPatch::default()
        };
        patch.apply_to(&mut event, now);

        assert_eq!(event.title, "write report");
        assert_eq!(event.due_date, None);
    }

    #[test]
    fn listing_order_puts_undated_last() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let undated = sample(now);
        let mut dated = sample(now - Duration::days(1));
        dated.id = "e2".to_string();
        dated.due_date = Some(now + Duration::days(3));

        let mut events = vec![undated, dated];
        events.sort_by(compare_for_listing);
        assert_eq!(events[0].id, "e2");
    }

    #[test]
    fn filter_matches_on_all_criteria() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let event = sample(now);
        let filter = EventFilter {
            completed: Some(false),
            event_type: Some(EventType::Event),
            quadrant: Some(Quadrant::DoFirst),
        };
        assert!(filter.matches(&event));
        let filter = EventFilter {
            event_type: Some(EventType::Task),
            ..EventFilter::default()
        };
        assert!(!filter.matches(&event));
    }
}
