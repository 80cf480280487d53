use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::event::{
    compare_for_listing, compare_upcoming, new_event_id, Event, EventFilter, EventPatch, NewEvent,
};
use crate::store::EventStore;

pub type EventTable = HashMap<String, Event>;

/// Non-persistent store backed by a shared map; used for `DB_LOCATION=:memory:` and tests.
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    table: Arc<Mutex<EventTable>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> EventTable {
        self.table.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn list_upcoming(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let table = self.table.lock().await;
        let mut events: Vec<Event> = table
            .values()
            .filter(|e| e.user_id == user_id && e.falls_within(from, to))
            .cloned()
            .collect();
        events.sort_by(compare_upcoming);
        Ok(events)
    }

    async fn list_events(&self, user_id: &str, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let table = self.table.lock().await;
        let mut events: Vec<Event> = table
            .values()
            .filter(|e| e.user_id == user_id && filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(compare_for_listing);
        Ok(events)
    }

    async fn create_event(&self, user_id: &str, fields: NewEvent) -> Result<Event, StoreError> {
        let event = fields.into_event(new_event_id(), user_id, Utc::now());
        let mut table = self.table.lock().await;
        table.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn find_owned(&self, user_id: &str, id: &str) -> Result<Option<Event>, StoreError> {
        let table = self.table.lock().await;
        Ok(table.get(id).filter(|e| e.user_id == user_id).cloned())
    }

    async fn update_event(&self, user_id: &str, id: &str, patch: &EventPatch) -> Result<Event, StoreError> {
        let mut table = self.table.lock().await;
        let Some(event) = table.get_mut(id).filter(|e| e.user_id == user_id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        patch.apply_to(event, Utc::now());
        Ok(event.clone())
    }

    async fn delete_event(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut table = self.table.lock().await;
        let owned = table.get(id).is_some_and(|e| e.user_id == user_id);
        if owned {
            table.remove(id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn other_users_events_are_invisible() {
        let store = MemoryEventStore::new();
        let event = store.create_event("alice", NewEvent::new("dentist")).await.unwrap();

        assert!(store.find_owned("bob", &event.id).await.unwrap().is_none());
        let patch = EventPatch {
            completed: Some(true),
            ..EventPatch::default()
        };
        let err = store.update_event("bob", &event.id, &patch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!store.delete_event("bob", &event.id).await.unwrap());

        let untouched = store.find_owned("alice", &event.id).await.unwrap().unwrap();
        assert!(!untouched.completed);
    }

    #[tokio::test]
    async fn list_upcoming_matches_start_or_due_inside_window() {
        let store = MemoryEventStore::new();
        let now = Utc::now();

        let mut meeting = NewEvent::new("sync");
        meeting.start_time = Some(now + Duration::days(2));
        let mut essay = NewEvent::new("essay");
        essay.due_date = Some(now + Duration::days(1));
        let mut far = NewEvent::new("conference");
        far.start_time = Some(now + Duration::days(90));

        store.create_event("alice", meeting).await.unwrap();
        store.create_event("alice", essay).await.unwrap();
        store.create_event("alice", far).await.unwrap();
        store.create_event("alice", NewEvent::new("someday")).await.unwrap();

        let upcoming = store
            .list_upcoming("alice", now, now + Duration::days(30))
            .await
            .unwrap();
        let titles: Vec<&str> = upcoming.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["essay", "sync"]);
    }
}
