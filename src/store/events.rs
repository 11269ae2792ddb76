//! SQL operations on the events table.
//!
//! Reads degrade: a failed query logs a warning and returns an empty result
//! so a corrupt row or closed pool never takes the calendar view down with
//! it. Writes surface their errors; the caller needs to know a save failed.

use chrono::{DateTime, Utc};
use log::warn;
use sqlx::SqlitePool;

use crate::error::DataResult;
use crate::models::Event;

/// Row image of an event. Reminders and the repeat rule stay in their
/// encoded forms here; [`Event`] decodes on the way out.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    is_all_day: bool,
    location: String,
    calendar_id: String,
    description: Option<String>,
    custom_color_hex: Option<String>,
    recurrence_rule: Option<String>,
    reminders_data: Option<Vec<u8>>,
    url: Option<String>,
    calendar_name: Option<String>,
    is_from_device_calendar: bool,
    device_event_id: Option<String>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        let reminders = row
            .reminders_data
            .as_deref()
            .map(|data| decode_reminders(&row.id, data))
            .unwrap_or_default();
        Event {
            id: row.id,
            title: row.title,
            start_time: row.start_time,
            end_time: row.end_time,
            is_all_day: row.is_all_day,
            location: row.location,
            calendar_id: row.calendar_id,
            description: row.description,
            custom_color_hex: row.custom_color_hex,
            recurrence_rule: row.recurrence_rule,
            reminders,
            url: row.url,
            calendar_name: row.calendar_name,
            is_from_device_calendar: row.is_from_device_calendar,
            device_event_id: row.device_event_id,
        }
    }
}

fn decode_reminders(event_id: &str, data: &[u8]) -> Vec<DateTime<Utc>> {
    match serde_json::from_slice::<Vec<DateTime<Utc>>>(data) {
        Ok(mut reminders) => {
            reminders.sort();
            reminders
        }
        Err(err) => {
            warn!("Discarding unreadable reminders for event {}: {}", event_id, err);
            Vec::new()
        }
    }
}

fn encode_reminders(reminders: &[DateTime<Utc>]) -> DataResult<Option<Vec<u8>>> {
    if reminders.is_empty() {
        return Ok(None);
    }
    let mut sorted = reminders.to_vec();
    sorted.sort();
    Ok(Some(serde_json::to_vec(&sorted)?))
}

/// Inserts the event or replaces every mutable column of an existing row
/// with the same id. `created_at` survives the upsert; `updated_at` does not.
pub async fn save(pool: &SqlitePool, event: &Event) -> DataResult<()> {
    let reminders_data = encode_reminders(&event.reminders)?;
    sqlx::query(
        r#"
        INSERT INTO events (
            id, title, start_time, end_time, is_all_day, location,
            calendar_id, description, custom_color_hex, recurrence_rule,
            reminders_data, url, calendar_name, is_from_device_calendar,
            device_event_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            is_all_day = excluded.is_all_day,
            location = excluded.location,
            calendar_id = excluded.calendar_id,
            description = excluded.description,
            custom_color_hex = excluded.custom_color_hex,
            recurrence_rule = excluded.recurrence_rule,
            reminders_data = excluded.reminders_data,
            url = excluded.url,
            calendar_name = excluded.calendar_name,
            is_from_device_calendar = excluded.is_from_device_calendar,
            device_event_id = excluded.device_event_id,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&event.id)
    .bind(&event.title)
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(event.is_all_day)
    .bind(&event.location)
    .bind(&event.calendar_id)
    .bind(&event.description)
    .bind(&event.custom_color_hex)
    .bind(&event.recurrence_rule)
    .bind(&reminders_data)
    .bind(&event.url)
    .bind(&event.calendar_name)
    .bind(event.is_from_device_calendar)
    .bind(&event.device_event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes by id. Removing an absent id succeeds; delete is idempotent.
pub async fn delete(pool: &SqlitePool, id: &str) -> DataResult<()> {
    sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch(pool: &SqlitePool, id: &str) -> Option<Event> {
    let result = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, start_time, end_time, is_all_day, location,
               calendar_id, description, custom_color_hex, recurrence_rule,
               reminders_data, url, calendar_name, is_from_device_calendar,
               device_event_id
        FROM events
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(row) => row.map(Event::from),
        Err(err) => {
            warn!("Lookup of event {} failed: {}", id, err);
            None
        }
    }
}

/// Events whose interval overlaps `[start, end]`, both comparisons
/// inclusive, ordered by start then end time.
pub async fn fetch_in_range(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<Event> {
    let result = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, start_time, end_time, is_all_day, location,
               calendar_id, description, custom_color_hex, recurrence_rule,
               reminders_data, url, calendar_name, is_from_device_calendar,
               device_event_id
        FROM events
        WHERE start_time <= ? AND end_time >= ?
        ORDER BY start_time ASC, end_time ASC
        "#,
    )
    .bind(end)
    .bind(start)
    .fetch_all(pool)
    .await;

    rows_or_empty(result, "range query")
}

pub async fn fetch_in_calendar(pool: &SqlitePool, calendar_id: &str) -> Vec<Event> {
    let result = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, start_time, end_time, is_all_day, location,
               calendar_id, description, custom_color_hex, recurrence_rule,
               reminders_data, url, calendar_name, is_from_device_calendar,
               device_event_id
        FROM events
        WHERE calendar_id = ?
        ORDER BY start_time ASC, end_time ASC
        "#,
    )
    .bind(calendar_id)
    .fetch_all(pool)
    .await;

    rows_or_empty(result, "calendar query")
}

pub async fn fetch_all(pool: &SqlitePool) -> Vec<Event> {
    let result = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, start_time, end_time, is_all_day, location,
               calendar_id, description, custom_color_hex, recurrence_rule,
               reminders_data, url, calendar_name, is_from_device_calendar,
               device_event_id
        FROM events
        ORDER BY start_time ASC, end_time ASC
        "#,
    )
    .fetch_all(pool)
    .await;

    rows_or_empty(result, "full scan")
}

pub async fn count(pool: &SqlitePool) -> DataResult<u64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?;
    Ok(total as u64)
}

fn rows_or_empty(result: sqlx::Result<Vec<EventRow>>, what: &str) -> Vec<Event> {
    match result {
        Ok(rows) => rows.into_iter().map(Event::from).collect(),
        Err(err) => {
            warn!("Event {} failed, returning no events: {}", what, err);
            Vec::new()
        }
    }
}
