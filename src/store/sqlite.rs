//! SQLite-backed event store.
//!
//! Timestamps are stored as RFC 3339 UTC strings with millisecond precision,
//! so lexical order in SQL matches chronological order. Queries run on the
//! blocking pool so disk I/O never stalls the async workers.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::models::event::{new_event_id, Event, EventFilter, EventPatch, EventType, NewEvent};
use crate::store::EventStore;

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL CHECK (length(title) > 0),
        description TEXT,
        type TEXT NOT NULL DEFAULT 'event',
        urgency INTEGER NOT NULL DEFAULT 3 CHECK (urgency BETWEEN 1 AND 5),
        importance INTEGER NOT NULL DEFAULT 3 CHECK (importance BETWEEN 1 AND 5),
        due_date TEXT,
        start_time TEXT,
        end_time TEXT,
        completed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_user_due ON events (user_id, due_date);
    CREATE INDEX IF NOT EXISTS idx_events_user_start ON events (user_id, start_time);",
}];

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    title,
    description,
    type,
    urgency,
    importance,
    due_date,
    start_time,
    end_time,
    completed,
    created_at,
    updated_at
FROM events";

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let started_at = Instant::now();
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        if let Err(err) = apply_migrations(&mut conn) {
            error!(
                "event=store_open mode=file status=error path={} error={}",
                path.display(),
                err
            );
            return Err(err);
        }
        info!(
            "event=store_open mode=file status=ok path={} duration_ms={}",
            path.display(),
            started_at.elapsed().as_millis()
        );
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn schema_version(&self) -> Result<u32, StoreError> {
        self.with_conn(|conn| current_user_version(conn)).await
    }

    async fn with_conn<T, F>(&self, task: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection lock poisoned".to_string()))?;
            task(&*guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// Refuse rows that could not be parsed back.
fn ensure_storable(event: &Event) -> Result<(), StoreError> {
    match event.unstorable_field() {
        Some(field) => Err(StoreError::OutOfRange(field)),
        None => Ok(()),
    }
}

fn apply_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let current = current_user_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;
    Ok(())
}

fn current_user_version(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

fn to_sql_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt_sql_time(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(to_sql_time)
}

fn parse_sql_time(column: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("{column} `{raw}`: {e}")))
}

fn parse_opt_sql_time(column: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|r| parse_sql_time(column, &r)).transpose()
}

/// Column values as read, before domain validation.
struct StoredRow {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    event_type: String,
    urgency: i64,
    importance: i64,
    due_date: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    completed: bool,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            event_type: row.get(4)?,
            urgency: row.get(5)?,
            importance: row.get(6)?,
            due_date: row.get(7)?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
            completed: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_event(self) -> Result<Event, StoreError> {
        let event_type = EventType::parse(&self.event_type)
            .ok_or_else(|| StoreError::InvalidData(format!("type `{}`", self.event_type)))?;
        let score = |column: &str, value: i64| {
            u8::try_from(value)
                .ok()
                .filter(|v| (1..=5).contains(v))
                .ok_or_else(|| StoreError::InvalidData(format!("{column} `{value}`")))
        };
        Ok(Event {
            urgency: score("urgency", self.urgency)?,
            importance: score("importance", self.importance)?,
            due_date: parse_opt_sql_time("due_date", self.due_date)?,
            start_time: parse_opt_sql_time("start_time", self.start_time)?,
            end_time: parse_opt_sql_time("end_time", self.end_time)?,
            created_at: parse_sql_time("created_at", &self.created_at)?,
            updated_at: parse_sql_time("updated_at", &self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            event_type,
            completed: self.completed,
        })
    }
}

fn query_events(
    conn: &Connection,
    sql: &str,
    values: Vec<Value>,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), StoredRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(StoredRow::into_event).collect()
}

fn select_owned(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Event>, StoreError> {
    let sql = format!("{EVENT_SELECT_SQL} WHERE id = ?1 AND user_id = ?2");
    let row = conn
        .query_row(&sql, params![id, user_id], StoredRow::from_row)
        .optional()?;
    row.map(StoredRow::into_event).transpose()
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn list_upcoming(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "{EVENT_SELECT_SQL}
             WHERE user_id = ?1
               AND ((start_time >= ?2 AND start_time <= ?3) OR (due_date >= ?2 AND due_date <= ?3))
             ORDER BY CASE
                 WHEN start_time IS NULL THEN due_date
                 WHEN due_date IS NULL THEN start_time
                 ELSE min(start_time, due_date)
             END ASC, created_at ASC"
        );
        let values = vec![
            Value::Text(user_id.to_string()),
            Value::Text(to_sql_time(&from)),
            Value::Text(to_sql_time(&to)),
        ];
        self.with_conn(move |conn| query_events(conn, &sql, values)).await
    }

    async fn list_events(&self, user_id: &str, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE user_id = ?");
        let mut values = vec![Value::Text(user_id.to_string())];
        if let Some(completed) = filter.completed {
            sql.push_str(" AND completed = ?");
            values.push(Value::Integer(completed as i64));
        }
        if let Some(event_type) = filter.event_type {
            sql.push_str(" AND type = ?");
            values.push(Value::Text(event_type.as_str().to_string()));
        }
        sql.push_str(" ORDER BY due_date IS NULL, due_date ASC, created_at DESC");

        let events = self.with_conn(move |conn| query_events(conn, &sql, values)).await?;
        // Quadrant is derived, so it is filtered after the query.
        Ok(events.into_iter().filter(|e| filter.matches(e)).collect())
    }

    async fn create_event(&self, user_id: &str, fields: NewEvent) -> Result<Event, StoreError> {
        let event = fields.into_event(new_event_id(), user_id, Utc::now());
        ensure_storable(&event)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO events (
                    id, user_id, title, description, type, urgency, importance,
                    due_date, start_time, end_time, completed, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    event.id,
                    event.user_id,
                    event.title,
                    event.description,
                    event.event_type.as_str(),
                    event.urgency,
                    event.importance,
                    opt_sql_time(&event.due_date),
                    opt_sql_time(&event.start_time),
                    opt_sql_time(&event.end_time),
                    event.completed,
                    to_sql_time(&event.created_at),
                    to_sql_time(&event.updated_at),
                ],
            )?;
            // Read back so callers see exactly what was persisted.
            select_owned(conn, &event.user_id, &event.id)?.ok_or(StoreError::NotFound(event.id))
        })
        .await
    }

    async fn find_owned(&self, user_id: &str, id: &str) -> Result<Option<Event>, StoreError> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.with_conn(move |conn| select_owned(conn, &user_id, &id)).await
    }

    async fn update_event(&self, user_id: &str, id: &str, patch: &EventPatch) -> Result<Event, StoreError> {
        let (user_id, id, patch) = (user_id.to_string(), id.to_string(), patch.clone());
        self.with_conn(move |conn| {
            let Some(mut event) = select_owned(conn, &user_id, &id)? else {
                return Err(StoreError::NotFound(id));
            };
            if patch.is_empty() {
                return Ok(event);
            }
            patch.apply_to(&mut event, Utc::now());
            ensure_storable(&event)?;
            let changed = conn.execute(
                "UPDATE events SET
                    title = ?1, description = ?2, type = ?3, urgency = ?4, importance = ?5,
                    due_date = ?6, start_time = ?7, end_time = ?8, completed = ?9, updated_at = ?10
                 WHERE id = ?11 AND user_id = ?12",
                params![
                    event.title,
                    event.description,
                    event.event_type.as_str(),
                    event.urgency,
                    event.importance,
                    opt_sql_time(&event.due_date),
                    opt_sql_time(&event.start_time),
                    opt_sql_time(&event.end_time),
                    event.completed,
                    to_sql_time(&event.updated_at),
                    id,
                    user_id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            select_owned(conn, &user_id, &id)?.ok_or(StoreError::NotFound(id))
        })
        .await
    }

    async fn delete_event(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM events WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
