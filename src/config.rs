//! Crate configuration: where the store lives and how wide the default
//! device-calendar fetch window is.

use chrono::{DateTime, Duration, Utc};
use std::env;
use std::path::PathBuf;

pub const DB_FILE_NAME: &str = "datebook.db";
pub const ADAPTER_STATE_FILE_NAME: &str = "device_calendar.json";

/// Default fetch window when a caller loads events without naming a range.
pub const DEFAULT_WINDOW_BACK_DAYS: i64 = 30;
pub const DEFAULT_WINDOW_FORWARD_DAYS: i64 = 90;

/// How far around "now" merged loads reach when the caller gives no range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub back_days: i64,
    pub forward_days: i64,
}

impl Default for SyncWindow {
    fn default() -> Self {
        Self {
            back_days: DEFAULT_WINDOW_BACK_DAYS,
            forward_days: DEFAULT_WINDOW_FORWARD_DAYS,
        }
    }
}

impl SyncWindow {
    pub fn new(back_days: i64, forward_days: i64) -> Self {
        Self {
            back_days,
            forward_days,
        }
    }

    /// The concrete range this window spans, anchored at the current instant.
    pub fn around_now(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (
            now - Duration::days(self.back_days),
            now + Duration::days(self.forward_days),
        )
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// sqlx connection URL for the event database.
    pub database_url: String,
    /// Where the device-calendar adapter persists its state between runs.
    /// `None` keeps the state in memory only.
    pub adapter_state_path: Option<PathBuf>,
    pub sync_window: SyncWindow,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            adapter_state_path: default_state_path(),
            sync_window: SyncWindow::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration with environment overrides applied:
    /// `DATEBOOK_DATABASE_URL` and `DATEBOOK_STATE_PATH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("DATEBOOK_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(path) = env::var("DATEBOOK_STATE_PATH") {
            config.adapter_state_path = Some(PathBuf::from(path));
        }
        config
    }

    /// Throwaway configuration backed by an in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            adapter_state_path: None,
            sync_window: SyncWindow::default(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datebook")
}

fn default_database_url() -> String {
    format!("sqlite:{}?mode=rwc", data_dir().join(DB_FILE_NAME).display())
}

fn default_state_path() -> Option<PathBuf> {
    Some(data_dir().join(ADAPTER_STATE_FILE_NAME))
}
