//! Durable storage for calendar events, backed by SQLite.
//!
//! The store is the source of truth for locally-created events and keeps a
//! copy of device-calendar events the user has touched. One handle owns one
//! connection; clones share it, so writes from any clone serialize.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool};
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::error::{DataError, DataResult};
use crate::models::{day_window, Event};

pub mod events;

/// Handle to the event store.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Opens the store described by `config`, creating the database file
    /// and its parent directory on first run.
    pub async fn open(config: &StoreConfig) -> DataResult<Self> {
        let url = config.database_url.as_str();
        if let Some(dir) = database_parent_dir(url) {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        }
        let exists = Sqlite::database_exists(url)
            .await
            .context("Failed to check for the event database")?;
        if !exists {
            info!("Creating event database at {}", url);
            Sqlite::create_database(url)
                .await
                .context("Failed to create the event database")?;
        }
        Self::connect(url).await
    }

    /// Connects to an existing database URL and applies the schema.
    pub async fn connect(url: &str) -> DataResult<Self> {
        // One connection total. SQLite allows one writer anyway; funneling
        // every clone through the same connection makes that explicit.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        run_schema(&pool).await?;
        info!("Event store ready");
        Ok(Self { pool })
    }

    /// Store backed by an in-memory database. Contents vanish on drop.
    pub async fn in_memory() -> DataResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Closes the underlying connection. Reads after this degrade to empty
    /// results; writes fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts or fully replaces the event with this id.
    pub async fn save_event(&self, event: &Event) -> DataResult<()> {
        events::save(&self.pool, event).await
    }

    /// Deletes by id; deleting an absent event is not an error.
    pub async fn delete_event(&self, id: &str) -> DataResult<()> {
        events::delete(&self.pool, id).await
    }

    /// The event with this id, or `None` when it is absent or unreadable.
    pub async fn event(&self, id: &str) -> Option<Event> {
        events::fetch(&self.pool, id).await
    }

    /// Like [`event`](Self::event) but an absent id is an error, for call
    /// sites that know the event must exist.
    pub async fn require_event(&self, id: &str) -> DataResult<Event> {
        self.event(id)
            .await
            .ok_or_else(|| DataError::not_found(format!("event {}", id)))
    }

    /// Events overlapping `[start, end]`, ordered by start then end time.
    pub async fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Event> {
        events::fetch_in_range(&self.pool, start, end).await
    }

    /// Events overlapping the given day, midnight to midnight UTC.
    pub async fn events_for_day(&self, day: NaiveDate) -> Vec<Event> {
        let (start, end) = day_window(day);
        events::fetch_in_range(&self.pool, start, end).await
    }

    pub async fn events_in_calendar(&self, calendar_id: &str) -> Vec<Event> {
        events::fetch_in_calendar(&self.pool, calendar_id).await
    }

    pub async fn all_events(&self) -> Vec<Event> {
        events::fetch_all(&self.pool).await
    }

    pub async fn event_count(&self) -> DataResult<u64> {
        events::count(&self.pool).await
    }
}

async fn run_schema(pool: &SqlitePool) -> DataResult<()> {
    apply_schema(pool, include_str!("schema.sql")).await
}

/// Executes a schema script one statement at a time. Comment and blank
/// lines are dropped before accumulating, so a `;` inside a comment does
/// not end a statement; only a `;` at the end of a code line does.
async fn apply_schema(pool: &SqlitePool, schema: &str) -> DataResult<()> {
    let mut statement = String::new();
    for line in schema.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        statement.push_str(line);
        statement.push('\n');
        if trimmed.ends_with(';') {
            sqlx::query(&statement).execute(pool).await?;
            statement.clear();
        }
    }
    Ok(())
}

/// Directory holding the database file, if the URL names one on disk.
fn database_parent_dir(url: &str) -> Option<PathBuf> {
    let raw = url.strip_prefix("sqlite:")?;
    let raw = raw.strip_prefix("//").unwrap_or(raw);
    if raw.is_empty() || raw.starts_with(":memory:") {
        return None;
    }
    let path = raw.split('?').next()?;
    let parent = Path::new(path).parent()?;
    if parent.as_os_str().is_empty() {
        return None;
    }
    Some(parent.to_path_buf())
}
