//! Turns raw model output into applied event changes.
//!
//! Parsing the `{ "actions": [...] }` envelope is all-or-nothing. Past that
//! point every action stands alone: a bad action is skipped, its siblings
//! still run, and nothing already applied is rolled back.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::error::{InterpretationError, StoreError};
use crate::models::action::{Action, ActionResult, InterpretationReport, ParsedAction, SkipReason};
use crate::models::event::{EventPatch, EventType, NewEvent, clamp_score, is_storable_time};
use crate::store::EventStore;

type Fields = Map<String, Value>;

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses the model's text into one normalized entry per `actions` element.
pub fn parse_actions(raw: &str, timezone: &Tz) -> Result<Vec<ParsedAction>, InterpretationError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| InterpretationError::InvalidJson(e.to_string()))?;
    let envelope = value.as_object().ok_or(InterpretationError::NotAnObject)?;
    let actions = envelope
        .get("actions")
        .and_then(Value::as_array)
        .ok_or(InterpretationError::MissingActions)?;

    Ok(actions
        .iter()
        .map(|action| normalize_action(action, timezone))
        .collect())
}

fn normalize_action(value: &Value, timezone: &Tz) -> ParsedAction {
    let Some(action) = value.as_object() else {
        return ParsedAction::Rejected(SkipReason::NotAnObject);
    };
    // Models sometimes flatten the fields next to "action" instead of nesting them.
    let data = action.get("data").and_then(Value::as_object).unwrap_or(action);

    match action.get("action").and_then(Value::as_str) {
        Some("create") => normalize_create(data, timezone),
        Some("update") => {
            let target = action
                .get("id")
                .or_else(|| action.get("targetId"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty());
            match target {
                Some(id) => ParsedAction::Ready(Action::Update {
                    target_id: id.to_string(),
                    patch: normalize_patch(data, timezone),
                }),
                None => ParsedAction::Rejected(SkipReason::MissingTargetId),
            }
        }
        other => {
            log::debug!("event=action_unknown_kind kind={:?}", other);
            ParsedAction::Rejected(SkipReason::UnknownActionKind)
        }
    }
}

fn normalize_create(data: &Fields, timezone: &Tz) -> ParsedAction {
    let Some(title) = text_field(data, "title") else {
        return ParsedAction::Rejected(SkipReason::MissingTitle);
    };

    let mut fields = NewEvent::new(title);
    fields.description = text_field(data, "description");
    if let Some(event_type) = data.get("type").and_then(event_type_field) {
        fields.event_type = event_type;
    }
    if let Some(urgency) = data.get("urgency").and_then(parse_score) {
        fields.urgency = urgency;
    }
    if let Some(importance) = data.get("importance").and_then(parse_score) {
        fields.importance = importance;
    }
    fields.due_date = date_field(data, "dueDate", timezone);
    fields.start_time = date_field(data, "startTime", timezone);
    fields.end_time = date_field(data, "endTime", timezone);
    if let Some(completed) = data.get("completed").and_then(Value::as_bool) {
        fields.completed = completed;
    }

    ParsedAction::Ready(Action::Create { data: fields })
}

fn normalize_patch(data: &Fields, timezone: &Tz) -> EventPatch {
    EventPatch {
        title: text_field(data, "title"),
        description: data.get("description").and_then(|value| match value {
            Value::Null => Some(None),
            Value::String(s) => Some(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            _ => None,
        }),
        event_type: data.get("type").and_then(event_type_field),
        urgency: data.get("urgency").and_then(parse_score),
        importance: data.get("importance").and_then(parse_score),
        due_date: nullable_date_field(data, "dueDate", timezone),
        start_time: nullable_date_field(data, "startTime", timezone),
        end_time: nullable_date_field(data, "endTime", timezone),
        completed: data.get("completed").and_then(Value::as_bool),
    }
}

fn text_field(data: &Fields, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn event_type_field(value: &Value) -> Option<EventType> {
    let raw = value.as_str()?;
    let parsed = EventType::parse(raw);
    if parsed.is_none() {
        log::warn!("event=action_unknown_type value={:?}", raw);
    }
    parsed
}

fn date_field(data: &Fields, key: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
    data.get(key)
        .and_then(Value::as_str)
        .and_then(|raw| parse_timestamp(raw, timezone))
}

// Missing or unparsable means "leave alone"; an explicit null clears the field.
fn nullable_date_field(data: &Fields, key: &str, timezone: &Tz) -> Option<Option<DateTime<Utc>>> {
    match data.get(key)? {
        Value::Null => Some(None),
        Value::String(raw) => parse_timestamp(raw, timezone).map(Some),
        _ => None,
    }
}

/// Accepts integers, floats (rounded) and numeric strings; the result is clamped into 1..=5.
pub fn parse_score(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        _ => None,
    }?;
    Some(clamp_score(number))
}

/// RFC 3339 first; offset-less values are read as wall-clock time in `timezone`.
/// Instants outside the storable year range count as unparsable.
pub fn parse_timestamp(raw: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
    parse_any_timestamp(raw, timezone).filter(is_storable_time)
}

fn parse_any_timestamp(raw: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw.replacen(' ', "T", 1)) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

pub struct ActionInterpreter {
    store: Arc<dyn EventStore>,
    timezone: Tz,
}

impl ActionInterpreter {
    pub fn new(store: Arc<dyn EventStore>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    pub async fn interpret(
        &self,
        user_id: &str,
        raw: &str,
    ) -> Result<InterpretationReport, InterpretationError> {
        let actions = parse_actions(raw, &self.timezone)?;
        log::info!("event=actions_parsed user_id={} count={}", user_id, actions.len());
        Ok(self.apply(user_id, actions).await)
    }

    /// Applies actions one at a time, in order.
    pub async fn apply(&self, user_id: &str, actions: Vec<ParsedAction>) -> InterpretationReport {
        let mut report = InterpretationReport::default();

        for (index, parsed) in actions.into_iter().enumerate() {
            let action = match parsed {
                ParsedAction::Ready(action) => action,
                ParsedAction::Rejected(reason) => {
                    log::info!(
                        "event=action_skipped user_id={} index={} reason=\"{}\"",
                        user_id,
                        index,
                        reason.message()
                    );
                    report.push(skipped(index, reason));
                    continue;
                }
            };

            match action {
                Action::Create { data } => match self.store.create_event(user_id, data).await {
                    Ok(event) => {
                        log::info!(
                            "event=action_created user_id={} index={} event_id={}",
                            user_id,
                            index,
                            event.id
                        );
                        report.push(ActionResult::Created { index, event });
                    }
                    Err(err) => {
                        log::warn!(
                            "event=action_store_failed user_id={} index={} error=\"{}\"",
                            user_id,
                            index,
                            err
                        );
                        report.push(skipped(index, SkipReason::StoreFailure));
                    }
                },
                Action::Update { target_id, patch } => {
                    self.apply_update(user_id, index, &target_id, &patch, &mut report)
                        .await;
                }
            }
        }

        log::info!(
            "event=actions_applied user_id={} created={} updated={} skipped={} unresolved={}",
            user_id,
            report.summary.created,
            report.summary.updated,
            report.summary.skipped,
            report.summary.unresolved
        );
        report
    }

    async fn apply_update(
        &self,
        user_id: &str,
        index: usize,
        target_id: &str,
        patch: &EventPatch,
        report: &mut InterpretationReport,
    ) {
        let outcome = match self.store.find_owned(user_id, target_id).await {
            Ok(Some(_)) => self.store.update_event(user_id, target_id, patch).await.map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(Some(event)) => {
                log::info!(
                    "event=action_updated user_id={} index={} event_id={}",
                    user_id,
                    index,
                    event.id
                );
                report.push(ActionResult::Updated { index, event });
            }
            // Unknown ids and other users' events are dropped without a result entry.
            Ok(None) | Err(StoreError::NotFound(_)) => {
                log::info!(
                    "event=action_target_unresolved user_id={} index={} target_id={}",
                    user_id,
                    index,
                    target_id
                );
                report.summary.unresolved += 1;
            }
            Err(err) => {
                log::warn!(
                    "event=action_store_failed user_id={} index={} error=\"{}\"",
                    user_id,
                    index,
                    err
                );
                report.push(skipped(index, SkipReason::StoreFailure));
            }
        }
    }
}

fn skipped(index: usize, reason: SkipReason) -> ActionResult {
    ActionResult::Skipped {
        index,
        reason: reason.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Shanghai;
    use serde_json::json;

    fn ready(parsed: &ParsedAction) -> &Action {
        match parsed {
            ParsedAction::Ready(action) => action,
            ParsedAction::Rejected(reason) => panic!("unexpected rejection: {:?}", reason),
        }
    }

    #[test]
    fn envelope_errors_fail_the_whole_response() {
        assert!(matches!(
            parse_actions("Sure! Here you go", &Shanghai),
            Err(InterpretationError::InvalidJson(_))
        ));
        assert_eq!(parse_actions("[1, 2]", &Shanghai), Err(InterpretationError::NotAnObject));
        assert_eq!(
            parse_actions(r#"{"events": []}"#, &Shanghai),
            Err(InterpretationError::MissingActions)
        );
        assert_eq!(
            parse_actions(r#"{"actions": "create"}"#, &Shanghai),
            Err(InterpretationError::MissingActions)
        );
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let parsed = parse_actions("\n  {\"actions\": []}  \n", &Shanghai).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn each_action_is_normalized_independently() {
        let raw = json!({"actions": [
            {"action": "bogus"},
            "create",
            {"action": "create", "data": {"title": "  "}},
            {"action": "update", "data": {"title": "x"}},
            {"action": "create", "data": {"title": "Essay"}},
        ]})
        .to_string();
        let parsed = parse_actions(&raw, &Shanghai).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0], ParsedAction::Rejected(SkipReason::UnknownActionKind));
        assert_eq!(parsed[1], ParsedAction::Rejected(SkipReason::NotAnObject));
        assert_eq!(parsed[2], ParsedAction::Rejected(SkipReason::MissingTitle));
        assert_eq!(parsed[3], ParsedAction::Rejected(SkipReason::MissingTargetId));
        assert!(matches!(parsed[4], ParsedAction::Ready(Action::Create { .. })));
    }

    #[test]
    fn create_applies_defaults_and_clamps() {
        let raw = json!({"actions": [{"action": "create", "data": {
            "title": "Finish lab report",
            "type": "Homework",
            "urgency": 9,
            "importance": "0",
            "dueDate": "not a date",
        }}]})
        .to_string();
        let parsed = parse_actions(&raw, &Shanghai).unwrap();
        let Action::Create { data } = ready(&parsed[0]) else {
            panic!("expected create");
        };
        assert_eq!(data.title, "Finish lab report");
        assert_eq!(data.event_type, EventType::Homework);
        assert_eq!(data.urgency, 5);
        assert_eq!(data.importance, 1);
        assert_eq!(data.due_date, None);
    }

    #[test]
    fn unknown_type_falls_back_to_event() {
        let raw = json!({"actions": [{"action": "create", "data": {"title": "Gym", "type": "workout", "urgency": "high"}}]})
            .to_string();
        let parsed = parse_actions(&raw, &Shanghai).unwrap();
        let Action::Create { data } = ready(&parsed[0]) else {
            panic!("expected create");
        };
        assert_eq!(data.event_type, EventType::Event);
        assert_eq!(data.urgency, 3);
    }

    #[test]
    fn update_keeps_only_supplied_fields() {
        let raw = json!({"actions": [{"action": "update", "id": "abc", "data": {
            "startTime": "2026-03-05T16:00:00+08:00",
            "dueDate": null,
            "endTime": "tomorrow",
            "type": "nonsense",
            "completed": true,
        }}]})
        .to_string();
        let parsed = parse_actions(&raw, &Shanghai).unwrap();
        let Action::Update { target_id, patch } = ready(&parsed[0]) else {
            panic!("expected update");
        };
        assert_eq!(target_id, "abc");
        assert_eq!(
            patch.start_time,
            Some(Some(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap()))
        );
        assert_eq!(patch.due_date, Some(None));
        assert_eq!(patch.end_time, None);
        assert_eq!(patch.event_type, None);
        assert_eq!(patch.completed, Some(true));
        assert_eq!(patch.title, None);
        assert_eq!(patch.urgency, None);
    }

    #[test]
    fn flattened_fields_and_target_id_alias_are_accepted() {
        let raw = json!({"actions": [
            {"action": "create", "title": "Call mom"},
            {"action": "update", "targetId": "e9", "urgency": 4.6},
        ]})
        .to_string();
        let parsed = parse_actions(&raw, &Shanghai).unwrap();
        let Action::Create { data } = ready(&parsed[0]) else {
            panic!("expected create");
        };
        assert_eq!(data.title, "Call mom");
        let Action::Update { target_id, patch } = ready(&parsed[1]) else {
            panic!("expected update");
        };
        assert_eq!(target_id, "e9");
        assert_eq!(patch.urgency, Some(5));
    }

    #[test]
    fn timestamps_without_offset_use_the_configured_zone() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 5, 6, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-05T14:00:00", &Shanghai), Some(expected));
        assert_eq!(parse_timestamp("2026-03-05 14:00", &Shanghai), Some(expected));
        assert_eq!(parse_timestamp("2026-03-05T06:00:00Z", &Shanghai), Some(expected));
        assert_eq!(parse_timestamp("2026-03-05 14:00:00+08:00", &Shanghai), Some(expected));
        assert_eq!(
            parse_timestamp("2026-03-05", &Shanghai),
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 16, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("next friday", &Shanghai), None);
        assert_eq!(parse_timestamp("", &Shanghai), None);
    }

    #[test]
    fn timestamps_past_year_9999_in_utc_are_rejected() {
        assert_eq!(parse_timestamp("9999-12-31T23:00:00-05:00", &Shanghai), None);
        assert_eq!(
            parse_timestamp("9999-12-31T18:00:00-05:00", &Shanghai),
            Some(Utc.with_ymd_and_hms(9999, 12, 31, 23, 0, 0).unwrap())
        );
    }

    #[test]
    fn scores_accept_numbers_and_numeric_strings() {
        assert_eq!(parse_score(&json!(4)), Some(4));
        assert_eq!(parse_score(&json!(-2)), Some(1));
        assert_eq!(parse_score(&json!(2.4)), Some(2));
        assert_eq!(parse_score(&json!(" 7 ")), Some(5));
        assert_eq!(parse_score(&json!("urgent")), None);
        assert_eq!(parse_score(&json!(true)), None);
        assert_eq!(parse_score(&Value::Null), None);
    }
}
