//! Event persistence behind the `EventStore` seam.
//!
//! Every operation takes the caller's user id; an event owned by someone else
//! behaves exactly like one that does not exist.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::StoreLocation;
use crate::error::StoreError;
use crate::models::event::{Event, EventFilter, EventPatch, NewEvent};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

pub const SQLITE_FILE_NAME: &str = "events.db";

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events with `startTime` or `dueDate` inside `[from, to]`, earliest first.
    async fn list_upcoming(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    async fn list_events(&self, user_id: &str, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;

    async fn create_event(&self, user_id: &str, fields: NewEvent) -> Result<Event, StoreError>;

    async fn find_owned(&self, user_id: &str, id: &str) -> Result<Option<Event>, StoreError>;

    /// Fails with `StoreError::NotFound` when `id` is not owned by `user_id`.
    async fn update_event(&self, user_id: &str, id: &str, patch: &EventPatch) -> Result<Event, StoreError>;

    async fn delete_event(&self, user_id: &str, id: &str) -> Result<bool, StoreError>;
}

pub fn open_store(location: &StoreLocation) -> Result<Arc<dyn EventStore>, StoreError> {
    match location {
        StoreLocation::Memory => {
            log::info!("event=store_open mode=memory");
            Ok(Arc::new(MemoryEventStore::new()))
        }
        StoreLocation::Sqlite(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Location {
                path: dir.clone(),
                message: e.to_string(),
            })?;
            let path = Path::new(dir).join(SQLITE_FILE_NAME);
            Ok(Arc::new(SqliteEventStore::open(path)?))
        }
    }
}
