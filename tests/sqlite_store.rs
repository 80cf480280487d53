use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Asia::Shanghai;
use scheduleBot::config::StoreLocation;
use scheduleBot::error::StoreError;
use scheduleBot::models::action::ActionResult;
use scheduleBot::models::event::{EventFilter, EventPatch, EventType, NewEvent, Quadrant};
use scheduleBot::service::action_interpreter::ActionInterpreter;
use scheduleBot::store::sqlite::latest_version;
use scheduleBot::store::{EventStore, SQLITE_FILE_NAME, SqliteEventStore, open_store};

#[tokio::test]
async fn events_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SQLITE_FILE_NAME);
    let due = Utc.with_ymd_and_hms(2026, 3, 6, 15, 59, 0).unwrap();

    let created = {
        let store = SqliteEventStore::open(&path).unwrap();
        let mut fields = NewEvent::new("Physics homework");
        fields.event_type = EventType::Homework;
        fields.due_date = Some(due);
        fields.urgency = 4;
        store.create_event("user-a", fields).await.unwrap()
    };

    let reopened = SqliteEventStore::open(&path).unwrap();
    assert_eq!(reopened.schema_version().await.unwrap(), latest_version());
    let found = reopened.find_owned("user-a", &created.id).await.unwrap().unwrap();
    assert_eq!(found, created);
    assert_eq!(found.due_date, Some(due));
    assert_eq!(found.event_type, EventType::Homework);
}

#[tokio::test]
async fn open_store_creates_the_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let location = dir.path().join("nested").join("data");
    let store = open_store(&StoreLocation::Sqlite(location.to_string_lossy().to_string())).unwrap();

    store.create_event("user-a", NewEvent::new("Ping")).await.unwrap();
    assert!(location.join(SQLITE_FILE_NAME).exists());
}

#[tokio::test]
async fn ownership_is_enforced_for_every_operation() {
    let store = SqliteEventStore::open_in_memory().unwrap();
    let event = store.create_event("user-a", NewEvent::new("Journal")).await.unwrap();

    assert_eq!(store.find_owned("user-b", &event.id).await.unwrap(), None);
    let patch = EventPatch {
        completed: Some(true),
        ..EventPatch::default()
    };
    let err = store.update_event("user-b", &event.id, &patch).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(!store.delete_event("user-b", &event.id).await.unwrap());

    let unchanged = store.find_owned("user-a", &event.id).await.unwrap().unwrap();
    assert!(!unchanged.completed);
    assert!(store.delete_event("user-a", &event.id).await.unwrap());
    assert_eq!(store.find_owned("user-a", &event.id).await.unwrap(), None);
}

#[tokio::test]
async fn upcoming_window_uses_start_or_due_and_orders_by_earliest() {
    let store = SqliteEventStore::open_in_memory().unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 4, 2, 0, 0).unwrap();

    let mut meeting = NewEvent::new("Standup");
    meeting.start_time = Some(now + Duration::days(3));
    let meeting = store.create_event("user-a", meeting).await.unwrap();

    let mut essay = NewEvent::new("Essay");
    essay.due_date = Some(now + Duration::days(1));
    let essay = store.create_event("user-a", essay).await.unwrap();

    let mut past = NewEvent::new("Yesterday");
    past.due_date = Some(now - Duration::days(1));
    store.create_event("user-a", past).await.unwrap();

    let mut later = NewEvent::new("Summer trip");
    later.start_time = Some(now + Duration::days(90));
    store.create_event("user-a", later).await.unwrap();

    store.create_event("user-a", NewEvent::new("Someday")).await.unwrap();

    let upcoming = store
        .list_upcoming("user-a", now, now + Duration::days(30))
        .await
        .unwrap();
    let ids: Vec<&str> = upcoming.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![essay.id.as_str(), meeting.id.as_str()]);
}

#[tokio::test]
async fn listing_filters_and_orders_by_due_date() {
    let store = SqliteEventStore::open_in_memory().unwrap();
    let base = Utc.with_ymd_and_hms(2026, 3, 4, 2, 0, 0).unwrap();

    let mut late = NewEvent::new("Late task");
    late.event_type = EventType::Task;
    late.due_date = Some(base + Duration::days(5));
    late.urgency = 1;
    late.importance = 5;
    let late = store.create_event("user-a", late).await.unwrap();

    let mut early = NewEvent::new("Early task");
    early.event_type = EventType::Task;
    early.due_date = Some(base + Duration::days(1));
    let early = store.create_event("user-a", early).await.unwrap();

    let undated = store.create_event("user-a", NewEvent::new("Undated")).await.unwrap();

    let all = store.list_events("user-a", &EventFilter::default()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![early.id.as_str(), late.id.as_str(), undated.id.as_str()]);

    let tasks = EventFilter {
        event_type: Some(EventType::Task),
        quadrant: Some(Quadrant::Schedule),
        ..EventFilter::default()
    };
    let scheduled = store.list_events("user-a", &tasks).await.unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].id, late.id);

    assert!(store.list_events("user-b", &EventFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_returns_the_persisted_row() {
    let store = SqliteEventStore::open_in_memory().unwrap();
    let start = Utc.with_ymd_and_hms(2026, 3, 5, 6, 0, 0).unwrap();
    let mut fields = NewEvent::new("Lab");
    fields.start_time = Some(start);
    fields.end_time = Some(start + Duration::hours(2));
    let event = store.create_event("user-a", fields).await.unwrap();

    let patch = EventPatch {
        title: Some("Chemistry lab".to_string()),
        start_time: Some(None),
        urgency: Some(5),
        ..EventPatch::default()
    };
    let updated = store.update_event("user-a", &event.id, &patch).await.unwrap();

    assert_eq!(updated.title, "Chemistry lab");
    assert_eq!(updated.start_time, None);
    // endTime cannot outlive its startTime.
    assert_eq!(updated.end_time, None);
    assert_eq!(updated.urgency, 5);
    assert!(updated.updated_at >= event.updated_at);
    assert_eq!(
        store.find_owned("user-a", &event.id).await.unwrap(),
        Some(updated)
    );
}

#[tokio::test]
async fn far_future_model_dates_are_dropped_and_listing_keeps_working() {
    let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
    let interpreter = ActionInterpreter::new(store.clone(), Shanghai);

    let report = interpreter
        .interpret(
            "user-a",
            r#"{"actions":[{"action":"create","data":{"title":"Far","dueDate":"9999-12-31T23:00:00-05:00"}}]}"#,
        )
        .await
        .unwrap();
    let ActionResult::Created { event, .. } = &report.results[0] else {
        panic!("expected a created entry, got {:?}", report.results[0]);
    };
    assert_eq!(event.due_date, None);

    let raw = format!(
        r#"{{"actions":[{{"action":"update","id":"{}","data":{{"startTime":"+10000-01-01T00:00:00Z","urgency":4}}}}]}}"#,
        event.id
    );
    let report = interpreter.interpret("user-a", &raw).await.unwrap();
    let updated = report.results[0].event().unwrap();
    assert_eq!(updated.start_time, None);
    assert_eq!(updated.urgency, 4);

    let listed = store.list_events("user-a", &EventFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    let now = Utc::now();
    assert!(store.list_upcoming("user-a", now, now + Duration::days(30)).await.is_ok());
}
